//! Claim validation
//!
//! Cross-checks a claim against current coverage: the claim text is run as
//! a news search and the number of distinct publishers reporting on it
//! decides the verdict.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::news::NewsSource;
use crate::models::Article;

/// Distinct publishers needed for a claim to count as corroborated
pub const CORROBORATION_THRESHOLD: usize = 3;

/// Articles shown as evidence under a report
const EVIDENCE_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Reported by at least [`CORROBORATION_THRESHOLD`] publishers
    Corroborated,
    /// Some coverage, from too few publishers
    Limited,
    /// No coverage found
    Unverified,
    /// The news API could not be queried
    Unavailable,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Corroborated => "Corroborated",
            Self::Limited => "Limited coverage",
            Self::Unverified => "Unverified",
            Self::Unavailable => "Unavailable",
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            Self::Corroborated => "Several independent publishers are reporting on this.",
            Self::Limited => "Only one or two publishers are reporting on this. Treat it with care.",
            Self::Unverified => "No coverage of this claim was found.",
            Self::Unavailable => "News sources could not be reached. Please try again later.",
        }
    }
}

/// Outcome of checking one claim
#[derive(Debug, Clone, Serialize)]
pub struct ClaimReport {
    pub claim: String,
    pub verdict: Verdict,
    pub verdict_label: &'static str,
    pub explanation: &'static str,
    pub total_results: u64,
    /// Distinct named publishers among the returned articles
    pub sources: Vec<String>,
    pub evidence: Vec<Article>,
}

pub struct ClaimValidator {
    source: Arc<dyn NewsSource>,
    page_size: u32,
}

impl ClaimValidator {
    pub fn new(source: Arc<dyn NewsSource>, page_size: u32) -> Self {
        Self { source, page_size }
    }

    /// Check a claim. Blank claims are not checked.
    pub async fn validate(&self, claim: &str) -> Option<ClaimReport> {
        let claim = claim.trim();
        if claim.is_empty() {
            return None;
        }

        let response = self.source.search(claim, self.page_size).await;
        if response.is_error() {
            return Some(report(claim, Verdict::Unavailable, 0, Vec::new(), Vec::new()));
        }

        let sources = distinct_sources(&response.articles);
        let verdict = match sources.len() {
            0 if response.articles.is_empty() => Verdict::Unverified,
            n if n >= CORROBORATION_THRESHOLD => Verdict::Corroborated,
            // Unnamed publishers still count as some coverage
            _ => Verdict::Limited,
        };
        tracing::debug!("Claim {:?}: {:?} ({} sources)", claim, verdict, sources.len());

        let evidence = response.articles.into_iter().take(EVIDENCE_LIMIT).collect();
        Some(report(claim, verdict, response.total_results, sources, evidence))
    }
}

fn report(
    claim: &str,
    verdict: Verdict,
    total_results: u64,
    sources: Vec<String>,
    evidence: Vec<Article>,
) -> ClaimReport {
    ClaimReport {
        claim: claim.to_string(),
        verdict,
        verdict_label: verdict.label(),
        explanation: verdict.explanation(),
        total_results,
        sources,
        evidence,
    }
}

/// Publisher names, case-insensitively deduplicated, in first-seen spelling
fn distinct_sources(articles: &[Article]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    articles
        .iter()
        .filter_map(|a| a.source.name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleSource, NewsResponse, NewsStatus};
    use crate::services::news::HeadlineQuery;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    struct FixedSource {
        response: NewsResponse,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NewsSource for FixedSource {
        async fn fetch_headlines(&self, _query: &HeadlineQuery) -> NewsResponse {
            unreachable!("validation only searches")
        }

        async fn search(&self, query: &str, _page_size: u32) -> NewsResponse {
            self.queries.lock().unwrap().push(query.to_string());
            self.response.clone()
        }
    }

    fn article(source: Option<&str>) -> Article {
        Article {
            source: ArticleSource {
                id: None,
                name: source.map(str::to_string),
            },
            author: None,
            title: "Title".to_string(),
            description: None,
            url: "https://example.com".to_string(),
            url_to_image: None,
            published_at: Utc::now(),
            content: None,
        }
    }

    fn validator(articles: Vec<Article>) -> (Arc<FixedSource>, ClaimValidator) {
        let source = Arc::new(FixedSource {
            response: NewsResponse {
                status: NewsStatus::Ok,
                total_results: articles.len() as u64,
                articles,
            },
            queries: Mutex::new(Vec::new()),
        });
        (source.clone(), ClaimValidator::new(source, 20))
    }

    #[tokio::test]
    async fn test_corroborated_by_distinct_sources() {
        let (_, validator) = validator(vec![
            article(Some("Reuters")),
            article(Some("reuters")),
            article(Some("AP")),
            article(Some("BBC News")),
        ]);

        let report = validator.validate("moon landing").await.unwrap();

        assert_eq!(report.verdict, Verdict::Corroborated);
        assert_eq!(report.sources, vec!["Reuters", "AP", "BBC News"]);
        assert_eq!(report.total_results, 4);
    }

    #[tokio::test]
    async fn test_limited_and_unverified() {
        let (_, limited) = validator(vec![article(Some("Blog")), article(None)]);
        assert_eq!(limited.validate("x").await.unwrap().verdict, Verdict::Limited);

        let (_, unnamed) = validator(vec![article(None)]);
        assert_eq!(unnamed.validate("x").await.unwrap().verdict, Verdict::Limited);

        let (_, none) = validator(Vec::new());
        assert_eq!(none.validate("x").await.unwrap().verdict, Verdict::Unverified);
    }

    #[tokio::test]
    async fn test_unavailable_on_error_result() {
        let source = Arc::new(FixedSource {
            response: NewsResponse::error(),
            queries: Mutex::new(Vec::new()),
        });
        let validator = ClaimValidator::new(source, 20);

        let report = validator.validate("x").await.unwrap();
        assert_eq!(report.verdict, Verdict::Unavailable);
        assert!(report.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_blank_claim_not_searched() {
        let (source, validator) = validator(vec![article(Some("AP"))]);

        assert!(validator.validate("   ").await.is_none());
        assert!(source.queries.lock().unwrap().is_empty());

        validator.validate("  trimmed claim ").await.unwrap();
        assert_eq!(*source.queries.lock().unwrap(), vec!["trimmed claim"]);
    }

    #[tokio::test]
    async fn test_evidence_is_capped() {
        let articles = (0..12).map(|i| article(Some(&format!("Source {}", i)))).collect();
        let (_, validator) = validator(articles);

        let report = validator.validate("x").await.unwrap();
        assert_eq!(report.evidence.len(), EVIDENCE_LIMIT);
        assert_eq!(report.sources.len(), 12);
    }
}
