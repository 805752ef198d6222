//! News pages

use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
    Extension, Json,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use super::middleware::{ApiError, AppState, CurrentSession};
use crate::services::FeedSnapshot;
use crate::views::article_cards;

/// How often the page asks whether the view changed
const POLL_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /news
pub async fn show(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Html<String> {
    let view = state.feeds.mount(&session.client_id).await;
    let feed = view.snapshot();

    let mut context = TeraContext::new();
    context.insert("query", &feed.query);
    context.insert("articles", &article_cards(&feed.articles));
    context.insert("error", &feed.error);
    context.insert(
        "last_updated",
        &feed
            .last_updated
            .map(|t| t.format("%H:%M:%S UTC").to_string()),
    );
    context.insert("generation", &feed.generation);
    context.insert("poll_secs", &POLL_SECS);

    let vars = state.page_vars("/news", Some(&session));
    Html(state.views.render_page("news.html", &vars, &context))
}

/// GET /news/search?q=
///
/// A blank query goes back to top headlines.
pub async fn search(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Query(query): Query<SearchQuery>,
) -> Redirect {
    let view = state.feeds.mount(&session.client_id).await;
    view.search(&query.q).await;
    Redirect::to("/news")
}

/// POST /news/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Redirect {
    let view = state.feeds.mount(&session.client_id).await;
    view.load().await;
    Redirect::to("/news")
}

/// GET /news/latest
///
/// Current state of the client's view without triggering a load.
pub async fn latest(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Result<Json<FeedSnapshot>, ApiError> {
    let view = state
        .feeds
        .get(&session.client_id)
        .ok_or_else(|| ApiError::not_found("No news view is open for this session"))?;
    view.touch();
    Ok(Json(view.snapshot()))
}
