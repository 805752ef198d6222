//! News API client
//!
//! Talks to a newsapi.org v2 compatible service. Both operations always
//! return a [`NewsResponse`]: any failure (transport, non-2xx status,
//! unusable body) is logged and collapsed into [`NewsResponse::error`].
//! No retries and no caching; every call is a fresh round-trip.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::NewsConfig;
use crate::models::{NewsResponse, PayloadError};

/// Parameters of a top-headlines request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlineQuery {
    pub country: String,
    pub category: String,
    pub page_size: u32,
}

impl Default for HeadlineQuery {
    fn default() -> Self {
        Self {
            country: "us".to_string(),
            category: "general".to_string(),
            page_size: 20,
        }
    }
}

impl From<&NewsConfig> for HeadlineQuery {
    fn from(config: &NewsConfig) -> Self {
        Self {
            country: config.country.clone(),
            category: config.category.clone(),
            page_size: config.page_size,
        }
    }
}

/// Something that can answer headline and search queries
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_headlines(&self, query: &HeadlineQuery) -> NewsResponse;

    async fn search(&self, query: &str, page_size: u32) -> NewsResponse;
}

/// Why a request produced no usable response
#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("news API answered {0}")]
    Status(reqwest::StatusCode),

    #[error("unusable response body: {0}")]
    MalformedPayload(String),
}

pub struct NewsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NewsClient {
    pub fn new(config: &NewsConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("newsdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;

        if config.api_key.is_empty() {
            tracing::warn!("news.api_key is empty; the news API will reject requests");
        }

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<NewsResponse, FetchError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::MalformedPayload(e.to_string()))?;
        NewsResponse::from_payload(&body)
            .map_err(|e: PayloadError| FetchError::MalformedPayload(e.to_string()))
    }

    fn settle(endpoint: &str, result: Result<NewsResponse, FetchError>) -> NewsResponse {
        match result {
            Ok(response) => {
                tracing::debug!(
                    "{} returned {} articles ({} total)",
                    endpoint,
                    response.articles.len(),
                    response.total_results
                );
                response
            }
            Err(e) => {
                tracing::warn!("News request to {} failed: {}", endpoint, e);
                NewsResponse::error()
            }
        }
    }
}

#[async_trait]
impl NewsSource for NewsClient {
    async fn fetch_headlines(&self, query: &HeadlineQuery) -> NewsResponse {
        let params = [
            ("country", query.country.clone()),
            ("category", query.category.clone()),
            ("pageSize", query.page_size.to_string()),
        ];
        Self::settle("top-headlines", self.get("top-headlines", &params).await)
    }

    async fn search(&self, query: &str, page_size: u32) -> NewsResponse {
        let params = [("q", query.to_string()), ("pageSize", page_size.to_string())];
        Self::settle("everything", self.get("everything", &params).await)
    }
}
