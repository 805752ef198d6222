//! View engine
//!
//! Renders the pages with Tera. Templates ship inside the binary (embedded
//! from `templates/` with rust-embed) and are compiled once at startup.
//! Every page gets the standard variables from [`PageVars`].

use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera};

use crate::models::Article;

mod error;

pub use error::ViewError;

/// Page templates compiled into the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

/// Paths on which the navigation bar is never shown
const NAVLESS_PATHS: &[&str] = &["/login", "/signup"];

pub struct ViewEngine {
    tera: Tera,
}

impl ViewEngine {
    /// Build the engine from the embedded templates
    pub fn new() -> Result<Self, ViewError> {
        let mut templates = Vec::new();
        for name in EmbeddedTemplates::iter() {
            let file = EmbeddedTemplates::get(&name)
                .ok_or_else(|| ViewError::NotFound(name.to_string()))?;
            let source = std::str::from_utf8(&file.data)
                .map_err(|_| ViewError::InvalidEncoding(name.to_string()))?
                .to_string();
            templates.push((name.to_string(), source));
        }
        Self::from_templates(templates)
    }

    /// Build the engine from `(name, source)` pairs
    pub fn from_templates(templates: Vec<(String, String)>) -> Result<Self, ViewError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| ViewError::TemplateError(describe(&e)))?;
        tracing::debug!("Loaded {} templates", tera.get_template_names().count());
        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|t| t == name)
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, ViewError> {
        self.tera.render(template, context).map_err(|e| {
            ViewError::TemplateError(format!("Failed to render '{}': {}", template, describe(&e)))
        })
    }

    /// Render a page with the standard variables added.
    ///
    /// Never fails: falls back to `error.html`, then to a built-in page.
    pub fn render_page(&self, template: &str, vars: &PageVars, context: &TeraContext) -> String {
        let mut full_context = context.clone();
        vars.insert_into(&mut full_context);
        self.render_with_fallback(template, &full_context)
    }

    pub fn render_with_fallback(&self, template: &str, context: &TeraContext) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("{}, trying error template", e);

                let mut error_context = context.clone();
                error_context.insert("error_message", &e.to_string());
                error_context.insert("requested_template", template);

                match self.render("error.html", &error_context) {
                    Ok(html) => html,
                    Err(error_template_err) => {
                        tracing::warn!(
                            "Failed to render error template: {}, returning simple HTML error page",
                            error_template_err
                        );
                        simple_error_page(template, &e.to_string())
                    }
                }
            }
        }
    }
}

/// Variables every page receives
#[derive(Debug, Clone, Serialize)]
pub struct PageVars {
    pub site_name: String,
    pub request_path: String,
    /// Email of the signed-in user
    pub current_user: Option<String>,
    pub year: i32,
}

impl PageVars {
    pub fn new(site_name: impl Into<String>, request_path: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            request_path: request_path.into(),
            current_user: None,
            year: chrono::Utc::now().year(),
        }
    }

    pub fn with_user(mut self, email: impl Into<String>) -> Self {
        self.current_user = Some(email.into());
        self
    }

    /// Navbar is for signed-in users, and never on the auth pages
    pub fn show_nav(&self) -> bool {
        self.current_user.is_some() && !NAVLESS_PATHS.contains(&self.request_path.as_str())
    }

    fn insert_into(&self, context: &mut TeraContext) {
        context.insert("site_name", &self.site_name);
        context.insert("request_path", &self.request_path);
        context.insert("current_user", &self.current_user);
        context.insert("show_nav", &self.show_nav());
        context.insert("year", &self.year);
    }
}

/// An article as a card on a page
#[derive(Debug, Clone, Serialize)]
pub struct ArticleCard {
    pub title: String,
    /// Only http(s) links survive; anything else renders as plain text
    pub url: Option<String>,
    pub image: Option<String>,
    pub source: String,
    pub published: String,
    pub description: Option<String>,
}

impl From<&Article> for ArticleCard {
    fn from(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            url: web_link(&article.url),
            image: article.url_to_image.as_deref().and_then(web_link),
            source: article.source_label().to_string(),
            published: article.published_at.format("%b %-d, %Y").to_string(),
            description: article.description.clone(),
        }
    }
}

pub fn article_cards(articles: &[Article]) -> Vec<ArticleCard> {
    articles.iter().map(ArticleCard::from).collect()
}

fn web_link(raw: &str) -> Option<String> {
    let url = reqwest::Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| raw.trim().to_string())
}

fn describe(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

fn simple_error_page(template: &str, error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Something went wrong</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 50px auto; padding: 20px; background: #f5f5f5; }}
        .error-box {{ background: white; border-left: 4px solid #e74c3c; padding: 20px; border-radius: 4px; }}
        h1 {{ color: #e74c3c; margin-top: 0; }}
        .details {{ margin-top: 15px; padding-top: 15px; border-top: 1px solid #eee; color: #666; font-size: 0.9em; }}
    </style>
</head>
<body>
    <div class="error-box">
        <h1>Something went wrong</h1>
        <p>The page <code>{}</code> could not be rendered.</p>
        <div class="details"><strong>Error:</strong> {}</div>
        <p><a href="/news">Back to the news</a></p>
    </div>
</body>
</html>"#,
        escape_html(template),
        escape_html(error)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
