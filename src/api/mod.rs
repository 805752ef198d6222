//! HTTP layer - handlers and routing
//!
//! Public pages: `/login`, `/signup`. Everything else sits behind the
//! route guard and redirects to `/login` without a session.

pub mod auth;
pub mod feedback;
pub mod middleware;
pub mod news;
pub mod validate;

use axum::{
    http::{StatusCode, Uri},
    extract::State,
    middleware as axum_middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use tera::Context as TeraContext;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, CurrentSession, RouteGuard};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/news", get(news::show))
        .route("/news/search", get(news::search))
        .route("/news/refresh", post(news::refresh))
        .route("/news/latest", get(news::latest))
        .route("/validate", get(validate::show))
        .route("/feedback", get(feedback::show))
        .route("/logout", post(auth::logout))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .route("/", get(|| async { Redirect::to("/news") }))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/signup", get(auth::signup_page).post(auth::signup))
        .merge(protected)
        .fallback(not_found)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(State(state): State<AppState>, uri: Uri) -> Response {
    let mut context = TeraContext::new();
    context.insert("error_message", &format!("No page at {}", uri.path()));
    let vars = state.page_vars(uri.path(), None);
    let html = state.views.render_page("error.html", &vars, &context);
    (StatusCode::NOT_FOUND, Html(html)).into_response()
}
