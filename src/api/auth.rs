//! Login, signup and logout
//!
//! Forms post back to the same path. Failures re-render the form with an
//! inline message and the entered email kept; nothing here is fatal.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use super::middleware::{
    clear_session_cookie, extract_session_token, session_cookie, AppState, CurrentSession,
};

/// Shown when password and confirmation differ
pub const PASSWORD_MISMATCH: &str = "Passwords do not match";

/// Prefix of every signup failure message
pub const SIGNUP_FAILED: &str = "Failed to create an account";

const REGISTERED_NOTICE: &str = "Account created. Please sign in.";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub registered: Option<String>,
}

/// GET /login
pub async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Response {
    // Already signed in
    if let Some(client_id) = extract_session_token(&headers, state.cookie_name()) {
        if state.sessions.current_session(&client_id).is_some() {
            return Redirect::to("/news").into_response();
        }
    }

    let notice = query.registered.map(|_| REGISTERED_NOTICE);
    render_login(&state, "", None, notice).into_response()
}

/// POST /login
///
/// A successful login replaces whatever session the browser held before.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.sessions.login(form.email.trim(), &form.password).await {
        Ok(session) => {
            if let Some(previous) = extract_session_token(&headers, state.cookie_name()) {
                if let Err(e) = state.sessions.logout(&previous).await {
                    tracing::warn!("Provider sign-out failed for replaced session: {}", e);
                }
            }

            let cookie = session_cookie(
                state.cookie_name(),
                &session.client_id,
                state.config.session.max_age_secs,
            );
            ([(header::SET_COOKIE, cookie)], Redirect::to("/news")).into_response()
        }
        Err(e) => render_login(&state, &form.email, Some(e.to_string()), None).into_response(),
    }
}

/// GET /signup
pub async fn signup_page(State(state): State<AppState>) -> Html<String> {
    render_signup(&state, "", None)
}

/// POST /signup
///
/// The confirmation is checked here; a mismatch never reaches the
/// identity provider. Success leads to the login page, not a session.
pub async fn signup(State(state): State<AppState>, Form(form): Form<SignupForm>) -> Response {
    if form.password != form.confirm_password {
        return render_signup(&state, &form.email, Some(PASSWORD_MISMATCH.to_string()))
            .into_response();
    }

    match state.sessions.signup(form.email.trim(), &form.password).await {
        Ok(()) => Redirect::to("/login?registered=1").into_response(),
        Err(e) => {
            render_signup(&state, &form.email, Some(format!("{}. {}", SIGNUP_FAILED, e)))
                .into_response()
        }
    }
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Response {
    if let Err(e) = state.sessions.logout(&session.client_id).await {
        tracing::warn!("Provider sign-out failed for {}: {}", session.email, e);
    }

    (
        [(header::SET_COOKIE, clear_session_cookie(state.cookie_name()))],
        Redirect::to("/login"),
    )
        .into_response()
}

fn render_login(
    state: &AppState,
    email: &str,
    error: Option<String>,
    notice: Option<&str>,
) -> Html<String> {
    let mut context = TeraContext::new();
    context.insert("email", email);
    context.insert("error", &error);
    context.insert("notice", &notice);
    let vars = state.page_vars("/login", None);
    Html(state.views.render_page("login.html", &vars, &context))
}

fn render_signup(state: &AppState, email: &str, error: Option<String>) -> Html<String> {
    let mut context = TeraContext::new();
    context.insert("email", email);
    context.insert("error", &error);
    let vars = state.page_vars("/signup", None);
    Html(state.views.render_page("signup.html", &vars, &context))
}
