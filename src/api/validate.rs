//! Claim validation page

use axum::{
    extract::{Query, State},
    response::Html,
    Extension,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use super::middleware::{AppState, CurrentSession};
use crate::views::{article_cards, ArticleCard};

#[derive(Debug, Default, Deserialize)]
pub struct ValidateQuery {
    #[serde(default)]
    pub claim: String,
}

/// GET /validate?claim=
pub async fn show(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Query(query): Query<ValidateQuery>,
) -> Html<String> {
    let report = state.validator.validate(&query.claim).await;
    let evidence: Vec<ArticleCard> = report
        .as_ref()
        .map(|r| article_cards(&r.evidence))
        .unwrap_or_default();

    let mut context = TeraContext::new();
    context.insert("claim", query.claim.trim());
    context.insert("report", &report);
    context.insert("evidence", &evidence);

    let vars = state.page_vars("/validate", Some(&session));
    Html(state.views.render_page("validate.html", &vars, &context))
}
