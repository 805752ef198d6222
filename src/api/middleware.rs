//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The route guard for protected pages (session cookie validation)
//! - The JSON error type

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::identity::IdentityProvider;
use crate::models::{ClientId, Session};
use crate::services::{ClaimValidator, FeedRegistry, HeadlineQuery, NewsSource, SessionStore};
use crate::views::{PageVars, ViewEngine, ViewError};

/// How often expired and over-age sessions are dropped
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub feeds: Arc<FeedRegistry>,
    pub validator: Arc<ClaimValidator>,
    pub views: Arc<ViewEngine>,
}

impl AppState {
    /// Wire the services together. Must be called inside a tokio runtime.
    pub fn new(
        config: Config,
        provider: Arc<dyn IdentityProvider>,
        news: Arc<dyn NewsSource>,
    ) -> Result<Self, ViewError> {
        let headlines = HeadlineQuery::from(&config.news);
        let feeds = FeedRegistry::new(
            news.clone(),
            headlines,
            Duration::from_secs(config.news.refresh_interval_secs),
        );
        let validator = ClaimValidator::new(news, config.news.page_size);

        Ok(Self {
            sessions: Arc::new(SessionStore::new(provider)),
            feeds: Arc::new(feeds),
            validator: Arc::new(validator),
            views: Arc::new(ViewEngine::new()?),
            config: Arc::new(config),
        })
    }

    /// Start the tasks that unmount news views: on session end, and when idle
    pub fn spawn_background_tasks(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            self.feeds
                .clone()
                .spawn_session_watcher(self.sessions.subscribe(), cancel.clone()),
            self.feeds.clone().spawn_idle_sweep(
                Duration::from_secs(self.config.news.idle_unmount_secs),
                cancel.clone(),
            ),
            self.sessions.clone().spawn_sweep(
                SESSION_SWEEP_INTERVAL,
                Duration::from_secs(self.config.session.max_age_secs),
                cancel.clone(),
            ),
        ]
    }

    /// Standard page variables for a request
    pub fn page_vars(&self, path: &str, session: Option<&Session>) -> PageVars {
        let vars = PageVars::new(&self.config.site.name, path);
        match session {
            Some(session) => vars.with_user(&session.email),
            None => vars,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.session.cookie_name
    }
}

/// Session of the client making the request, set by [`require_session`]
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

/// Outcome of checking a request against the session store
#[derive(Debug, Clone)]
pub enum RouteGuard {
    Authenticated(Session),
    Unauthenticated,
}

impl RouteGuard {
    pub fn evaluate(store: &SessionStore, client_id: Option<&ClientId>) -> Self {
        match client_id.and_then(|id| store.current_session(id)) {
            Some(session) => Self::Authenticated(session),
            None => Self::Unauthenticated,
        }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

/// Client id from the session cookie
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<ClientId> {
    let prefix = format!("{}=", cookie_name);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().strip_prefix(prefix.as_str()))
        .find(|token| !token.is_empty())
        .map(ClientId::from)
}

/// `Set-Cookie` value carrying the client id
pub fn session_cookie(cookie_name: &str, client_id: &ClientId, max_age_secs: u64) -> HeaderValue {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        cookie_name, client_id, max_age_secs
    );
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear_session_cookie(cookie_name))
}

/// `Set-Cookie` value removing the session cookie
pub fn clear_session_cookie(cookie_name: &str) -> HeaderValue {
    let cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", cookie_name);
    HeaderValue::from_str(&cookie)
        .unwrap_or_else(|_| HeaderValue::from_static("session=; Path=/; Max-Age=0"))
}

/// Route guard for protected pages.
///
/// Unauthenticated requests are redirected to `/login` and never reach
/// the handler.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let client_id = extract_session_token(request.headers(), state.cookie_name());

    match RouteGuard::evaluate(&state.sessions, client_id.as_ref()) {
        RouteGuard::Authenticated(session) => {
            request.extensions_mut().insert(CurrentSession(session));
            next.run(request).await
        }
        RouteGuard::Unauthenticated => {
            tracing::debug!("Redirecting unauthenticated request for {}", request.uri().path());
            Redirect::to("/login").into_response()
        }
    }
}
