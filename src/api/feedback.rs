//! Feedback page: points to the external feedback form

use axum::{extract::State, response::Html, Extension};
use tera::Context as TeraContext;

use super::middleware::{AppState, CurrentSession};

/// GET /feedback
pub async fn show(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Html<String> {
    let mut context = TeraContext::new();
    context.insert("form_url", &state.config.feedback.form_url);

    let vars = state.page_vars("/feedback", Some(&session));
    Html(state.views.render_page("feedback.html", &vars, &context))
}
