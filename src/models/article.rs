//! News article model
//!
//! Articles are read-only data from the news API. The wire payload is
//! duck-typed JSON where almost every field may be null, so it is parsed
//! into [`RawArticle`] first and then validated into [`Article`]; entries
//! without a title, a url, or a parseable publication time are rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome reported in a news response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsStatus {
    Ok,
    Error,
}

/// Publisher of an article
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// A validated news article
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub source: ArticleSource,
    pub author: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub url_to_image: Option<String>,
    pub published_at: DateTime<Utc>,
    pub content: Option<String>,
}

impl Article {
    /// Source name for display
    pub fn source_label(&self) -> &str {
        self.source
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Unknown Source")
    }
}

/// Article as it arrives on the wire, nothing guaranteed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    #[serde(default)]
    pub source: Option<ArticleSource>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_to_image: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Why a wire article was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArticleRejection {
    #[error("article has no title")]
    MissingTitle,
    #[error("article has no url")]
    MissingUrl,
    #[error("article has no valid publishedAt: {0:?}")]
    InvalidPublishedAt(Option<String>),
}

impl TryFrom<RawArticle> for Article {
    type Error = ArticleRejection;

    fn try_from(raw: RawArticle) -> Result<Self, Self::Error> {
        let title = non_blank(raw.title).ok_or(ArticleRejection::MissingTitle)?;
        let url = non_blank(raw.url).ok_or(ArticleRejection::MissingUrl)?;
        let published_at = raw
            .published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .ok_or_else(|| ArticleRejection::InvalidPublishedAt(raw.published_at.clone()))?;

        Ok(Self {
            source: raw.source.unwrap_or_default(),
            author: non_blank(raw.author),
            title,
            description: non_blank(raw.description),
            url,
            url_to_image: non_blank(raw.url_to_image),
            published_at,
            content: non_blank(raw.content),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Problems with a response body that make it unusable as a whole
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("response body has no article list")]
    MissingArticles,
    #[error("provider reported status {status:?}: {message}")]
    NotOk { status: Option<String>, message: String },
}

/// A list of articles returned by the news API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsResponse {
    pub status: NewsStatus,
    pub total_results: u64,
    pub articles: Vec<Article>,
}

impl NewsResponse {
    /// The normalized empty result used for every failure
    pub fn error() -> Self {
        Self {
            status: NewsStatus::Error,
            total_results: 0,
            articles: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == NewsStatus::Error
    }

    /// Validate a decoded JSON body.
    ///
    /// The body must carry an `articles` list; a `status` other than `"ok"`
    /// is rejected, a missing one is not. Entries
    /// that fail validation are skipped individually.
    pub fn from_payload(body: &Value) -> Result<Self, PayloadError> {
        let items = body
            .get("articles")
            .and_then(Value::as_array)
            .ok_or(PayloadError::MissingArticles)?;

        let status = body.get("status").filter(|s| !s.is_null());
        if let Some(status) = status.filter(|s| s.as_str() != Some("ok")) {
            return Err(PayloadError::NotOk {
                status: Some(status.as_str().map_or_else(|| status.to_string(), str::to_string)),
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        let articles: Vec<Article> = items
            .iter()
            .filter_map(|item| {
                let raw: RawArticle = match serde_json::from_value(item.clone()) {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::debug!("Skipping undecodable article: {}", e);
                        return None;
                    }
                };
                Article::try_from(raw)
                    .map_err(|e| tracing::debug!("Skipping article: {}", e))
                    .ok()
            })
            .collect();

        let total_results = body
            .get("totalResults")
            .and_then(Value::as_u64)
            .unwrap_or(articles.len() as u64);

        Ok(Self {
            status: NewsStatus::Ok,
            total_results,
            articles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bitcoin_body() -> Value {
        json!({
            "status": "ok",
            "totalResults": 1,
            "articles": [{
                "title": "X",
                "url": "http://x",
                "source": {"name": "S"},
                "publishedAt": "2024-01-01T00:00:00Z",
                "author": null,
                "description": null,
                "urlToImage": null,
                "content": null
            }]
        })
    }

    #[test]
    fn test_from_payload_accepts_nullable_fields() {
        let response = NewsResponse::from_payload(&bitcoin_body()).unwrap();

        assert_eq!(response.status, NewsStatus::Ok);
        assert_eq!(response.total_results, 1);
        assert_eq!(response.articles.len(), 1);

        let article = &response.articles[0];
        assert_eq!(article.title, "X");
        assert_eq!(article.source_label(), "S");
        assert_eq!(article.author, None);
        assert_eq!(article.url_to_image, None);
        assert_eq!(article.published_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_from_payload_missing_articles() {
        let body = json!({"status": "ok", "totalResults": 3});
        assert_eq!(
            NewsResponse::from_payload(&body),
            Err(PayloadError::MissingArticles)
        );
    }

    #[test]
    fn test_from_payload_articles_not_a_list() {
        let body = json!({"status": "ok", "articles": {"title": "X"}});
        assert_eq!(
            NewsResponse::from_payload(&body),
            Err(PayloadError::MissingArticles)
        );
    }

    #[test]
    fn test_from_payload_error_status() {
        let body = json!({"status": "error", "message": "apiKeyInvalid", "articles": []});
        let err = NewsResponse::from_payload(&body).unwrap_err();
        assert!(matches!(err, PayloadError::NotOk { .. }));
    }

    #[test]
    fn test_from_payload_without_status_keeps_articles() {
        let body = json!({
            "articles": [
                {"source": {"name": "Wire"}, "title": "A", "url": "https://a.example", "publishedAt": "2024-01-01T00:00:00Z"}
            ]
        });

        let response = NewsResponse::from_payload(&body).unwrap();

        assert_eq!(response.status, NewsStatus::Ok);
        assert_eq!(response.total_results, 1);
        assert_eq!(response.articles[0].title, "A");

        let numeric = json!({"status": 500, "articles": []});
        assert!(matches!(
            NewsResponse::from_payload(&numeric),
            Err(PayloadError::NotOk { .. })
        ));
    }

    #[test]
    fn test_from_payload_skips_invalid_entries() {
        let body = json!({
            "status": "ok",
            "articles": [
                {"title": null, "url": "http://a", "publishedAt": "2024-01-01T00:00:00Z"},
                {"title": "B", "url": "http://b", "publishedAt": "yesterday"},
                {"title": 42, "url": "http://c", "publishedAt": "2024-01-01T00:00:00Z"},
                {"title": "D", "url": "http://d", "publishedAt": "2024-02-03T04:05:06Z"}
            ]
        });

        let response = NewsResponse::from_payload(&body).unwrap();

        assert_eq!(response.articles.len(), 1);
        assert_eq!(response.articles[0].title, "D");
        // No totalResults in the body: falls back to the kept count
        assert_eq!(response.total_results, 1);
    }

    #[test]
    fn test_source_label_fallback() {
        let raw = RawArticle {
            title: Some("T".into()),
            url: Some("http://t".into()),
            published_at: Some("2024-01-01T00:00:00Z".into()),
            source: Some(ArticleSource { id: None, name: Some("  ".into()) }),
            ..Default::default()
        };
        let article = Article::try_from(raw).unwrap();
        assert_eq!(article.source_label(), "Unknown Source");
    }

    #[test]
    fn test_rejections() {
        let base = RawArticle {
            title: Some("T".into()),
            url: Some("http://t".into()),
            published_at: Some("2024-01-01T00:00:00Z".into()),
            ..Default::default()
        };

        let no_url = RawArticle { url: None, ..base.clone() };
        assert_eq!(Article::try_from(no_url), Err(ArticleRejection::MissingUrl));

        let blank_title = RawArticle { title: Some(" ".into()), ..base.clone() };
        assert_eq!(Article::try_from(blank_title), Err(ArticleRejection::MissingTitle));

        let no_date = RawArticle { published_at: None, ..base };
        assert_eq!(
            Article::try_from(no_date),
            Err(ArticleRejection::InvalidPublishedAt(None))
        );
    }

    #[test]
    fn test_error_shape_serialization() {
        let json = serde_json::to_value(NewsResponse::error()).unwrap();
        assert_eq!(json, json!({"status": "error", "totalResults": 0, "articles": []}));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn non_list_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z ]{0,12}".prop_map(Value::String),
            Just(json!({"title": "x"})),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn articles_not_a_list_is_rejected(
            articles in non_list_value(),
            status in prop_oneof![Just("ok"), Just("error")],
        ) {
            let body = json!({"status": status, "totalResults": 7, "articles": articles});
            prop_assert_eq!(NewsResponse::from_payload(&body), Err(PayloadError::MissingArticles));
        }

        #[test]
        fn kept_articles_always_have_required_fields(
            titles in prop::collection::vec(prop::option::of("[A-Za-z ]{0,8}"), 0..8),
        ) {
            let items: Vec<Value> = titles
                .iter()
                .map(|t| json!({"title": t, "url": "http://u", "publishedAt": "2024-01-01T00:00:00Z"}))
                .collect();
            let body = json!({"status": "ok", "articles": items});

            let response = NewsResponse::from_payload(&body).unwrap();
            for article in &response.articles {
                prop_assert!(!article.title.trim().is_empty());
                prop_assert!(!article.url.is_empty());
            }
        }
    }
}
