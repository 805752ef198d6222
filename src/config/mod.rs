//! Configuration management
//!
//! This module handles loading and parsing configuration for newsdesk.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Site presentation
    #[serde(default)]
    pub site: SiteConfig,
    /// Identity provider configuration
    #[serde(default)]
    pub identity: IdentityConfig,
    /// News API configuration
    #[serde(default)]
    pub news: NewsConfig,
    /// Session cookie configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Feedback page configuration
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Site presentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Name shown in the navbar and page titles
    #[serde(default = "default_site_name")]
    pub name: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
        }
    }
}

fn default_site_name() -> String {
    "NewsHub".to_string()
}

/// Identity provider driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityDriver {
    /// Firebase Identity Toolkit REST API (default)
    #[default]
    Firebase,
    /// In-process accounts, lost on restart
    Memory,
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub driver: IdentityDriver,
    /// Web API key of the Firebase project
    #[serde(default)]
    pub api_key: String,
    /// Base URL of the Identity Toolkit API
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    /// Base URL of the Secure Token API (token refresh)
    #[serde(default = "default_token_base_url")]
    pub token_base_url: String,
    /// Session lifetime for the memory driver, in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            driver: IdentityDriver::default(),
            api_key: String::new(),
            auth_base_url: default_auth_base_url(),
            token_base_url: default_token_base_url(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

fn default_auth_base_url() -> String {
    "https://identitytoolkit.googleapis.com".to_string()
}

fn default_token_base_url() -> String {
    "https://securetoken.googleapis.com".to_string()
}

fn default_session_ttl() -> u64 {
    3600
}

/// News API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    /// newsapi.org key, sent as the `apiKey` query parameter
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_news_base_url")]
    pub base_url: String,
    /// Default country for top headlines
    #[serde(default = "default_country")]
    pub country: String,
    /// Default category for top headlines
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Interval of the news view auto-refresh, in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Views not rendered for this long are unmounted
    #[serde(default = "default_idle_unmount")]
    pub idle_unmount_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_news_base_url(),
            country: default_country(),
            category: default_category(),
            page_size: default_page_size(),
            timeout_secs: default_timeout(),
            refresh_interval_secs: default_refresh_interval(),
            idle_unmount_secs: default_idle_unmount(),
        }
    }
}

fn default_news_base_url() -> String {
    "https://newsapi.org/v2".to_string()
}

fn default_country() -> String {
    "us".to_string()
}

fn default_category() -> String {
    "general".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_timeout() -> u64 {
    15
}

fn default_refresh_interval() -> u64 {
    5 * 60
}

fn default_idle_unmount() -> u64 {
    30 * 60
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Cookie Max-Age in seconds
    #[serde(default = "default_cookie_max_age")]
    pub max_age_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            max_age_secs: default_cookie_max_age(),
        }
    }
}

fn default_cookie_name() -> String {
    "session".to_string()
}

fn default_cookie_max_age() -> u64 {
    7 * 24 * 60 * 60 // 7 days
}

/// Feedback page configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// External form opened from the feedback page
    #[serde(default = "default_form_url")]
    pub form_url: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            form_url: default_form_url(),
        }
    }
}

fn default_form_url() -> String {
    "https://form.jotform.com/250648872846471".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `NEWSDESK_<SECTION>_<KEY>`:
    /// - NEWSDESK_SERVER_HOST, NEWSDESK_SERVER_PORT
    /// - NEWSDESK_SITE_NAME
    /// - NEWSDESK_IDENTITY_DRIVER, NEWSDESK_IDENTITY_API_KEY,
    ///   NEWSDESK_IDENTITY_AUTH_BASE_URL, NEWSDESK_IDENTITY_TOKEN_BASE_URL
    /// - NEWSDESK_NEWS_API_KEY, NEWSDESK_NEWS_BASE_URL, NEWSDESK_NEWS_COUNTRY,
    ///   NEWSDESK_NEWS_CATEGORY, NEWSDESK_NEWS_PAGE_SIZE,
    ///   NEWSDESK_NEWS_REFRESH_INTERVAL_SECS
    /// - NEWSDESK_FEEDBACK_FORM_URL
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("NEWSDESK_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parsed::<u16>("NEWSDESK_SERVER_PORT") {
            self.server.port = port;
        }

        if let Ok(name) = std::env::var("NEWSDESK_SITE_NAME") {
            self.site.name = name;
        }

        // Identity provider
        if let Ok(driver) = std::env::var("NEWSDESK_IDENTITY_DRIVER") {
            match driver.to_lowercase().as_str() {
                "firebase" => self.identity.driver = IdentityDriver::Firebase,
                "memory" => self.identity.driver = IdentityDriver::Memory,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(key) = std::env::var("NEWSDESK_IDENTITY_API_KEY") {
            self.identity.api_key = key;
        }
        if let Ok(url) = std::env::var("NEWSDESK_IDENTITY_AUTH_BASE_URL") {
            self.identity.auth_base_url = url;
        }
        if let Ok(url) = std::env::var("NEWSDESK_IDENTITY_TOKEN_BASE_URL") {
            self.identity.token_base_url = url;
        }

        // News API
        if let Ok(key) = std::env::var("NEWSDESK_NEWS_API_KEY") {
            self.news.api_key = key;
        }
        if let Ok(url) = std::env::var("NEWSDESK_NEWS_BASE_URL") {
            self.news.base_url = url;
        }
        if let Ok(country) = std::env::var("NEWSDESK_NEWS_COUNTRY") {
            self.news.country = country;
        }
        if let Ok(category) = std::env::var("NEWSDESK_NEWS_CATEGORY") {
            self.news.category = category;
        }
        if let Some(page_size) = env_parsed::<u32>("NEWSDESK_NEWS_PAGE_SIZE") {
            self.news.page_size = page_size;
        }
        if let Some(secs) = env_parsed::<u64>("NEWSDESK_NEWS_REFRESH_INTERVAL_SECS") {
            self.news.refresh_interval_secs = secs;
        }

        if let Ok(url) = std::env::var("NEWSDESK_FEEDBACK_FORM_URL") {
            self.feedback.form_url = url;
        }
    }
}

/// Read an environment variable and parse it, ignoring unparsable values
fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_KEYS: &[&str] = &[
        "NEWSDESK_SERVER_HOST",
        "NEWSDESK_SERVER_PORT",
        "NEWSDESK_SITE_NAME",
        "NEWSDESK_IDENTITY_DRIVER",
        "NEWSDESK_IDENTITY_API_KEY",
        "NEWSDESK_IDENTITY_AUTH_BASE_URL",
        "NEWSDESK_IDENTITY_TOKEN_BASE_URL",
        "NEWSDESK_NEWS_API_KEY",
        "NEWSDESK_NEWS_BASE_URL",
        "NEWSDESK_NEWS_COUNTRY",
        "NEWSDESK_NEWS_CATEGORY",
        "NEWSDESK_NEWS_PAGE_SIZE",
        "NEWSDESK_NEWS_REFRESH_INTERVAL_SECS",
        "NEWSDESK_FEEDBACK_FORM_URL",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_newsdesk_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.identity.driver, IdentityDriver::Firebase);
        assert_eq!(config.news.base_url, "https://newsapi.org/v2");
        assert_eq!(config.news.country, "us");
        assert_eq!(config.news.category, "general");
        assert_eq!(config.news.page_size, 20);
        assert_eq!(config.news.refresh_interval_secs, 300);
        assert_eq!(config.session.cookie_name, "session");
        assert_eq!(config.feedback.form_url, "https://form.jotform.com/250648872846471");
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "   \n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert!(config.news.api_key.is_empty());
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "news:\n  country: gb\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.news.country, "gb");
        assert_eq!(config.news.category, "general");
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9000
site:
  name: "Morning Wire"
identity:
  driver: memory
  api_key: "fb-key"
  session_ttl_secs: 60
news:
  api_key: "news-key"
  base_url: "http://localhost:4000/v2"
  country: "de"
  category: "technology"
  page_size: 10
  refresh_interval_secs: 30
session:
  cookie_name: "nd"
  max_age_secs: 120
feedback:
  form_url: "https://example.com/form"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.site.name, "Morning Wire");
        assert_eq!(config.identity.driver, IdentityDriver::Memory);
        assert_eq!(config.identity.api_key, "fb-key");
        assert_eq!(config.identity.session_ttl_secs, 60);
        assert_eq!(config.news.api_key, "news-key");
        assert_eq!(config.news.base_url, "http://localhost:4000/v2");
        assert_eq!(config.news.country, "de");
        assert_eq!(config.news.category, "technology");
        assert_eq!(config.news.page_size, 10);
        assert_eq!(config.news.refresh_interval_secs, 30);
        assert_eq!(config.session.cookie_name, "nd");
        assert_eq!(config.session.max_age_secs, 120);
        assert_eq!(config.feedback.form_url, "https://example.com/form");
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_load_malformed_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "news:\n  country: [invalid yaml").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_env_override_credentials() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "news:\n  api_key: from-file\n").unwrap();

        std::env::set_var("NEWSDESK_NEWS_API_KEY", "from-env");
        std::env::set_var("NEWSDESK_IDENTITY_API_KEY", "fb-env");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.news.api_key, "from-env");
        assert_eq!(config.identity.api_key, "fb-env");

        clear_env();
    }

    #[test]
    fn test_env_override_server_and_news() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("NEWSDESK_SERVER_PORT", "4000");
        std::env::set_var("NEWSDESK_NEWS_PAGE_SIZE", "50");
        std::env::set_var("NEWSDESK_IDENTITY_DRIVER", "MEMORY");

        let config = Config::load_with_env(std::path::Path::new("nonexistent.yml")).unwrap();

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.news.page_size, 50);
        assert_eq!(config.identity.driver, IdentityDriver::Memory);

        clear_env();
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("NEWSDESK_SERVER_PORT", "not-a-port");
        std::env::set_var("NEWSDESK_IDENTITY_DRIVER", "ldap");
        std::env::set_var("NEWSDESK_NEWS_REFRESH_INTERVAL_SECS", "-5");

        let config = Config::load_with_env(std::path::Path::new("nonexistent.yml")).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.identity.driver, IdentityDriver::Firebase);
        assert_eq!(config.news.refresh_interval_secs, 300);

        clear_env();
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn config_roundtrip_preserves_news_section(
            country in "[a-z]{2}",
            category in prop_oneof![Just("general"), Just("business"), Just("science")],
            page_size in 1u32..=100,
        ) {
            let mut config = Config::default();
            config.news.country = country.clone();
            config.news.category = category.to_string();
            config.news.page_size = page_size;

            let yaml = serde_yaml::to_string(&config).unwrap();
            let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

            prop_assert_eq!(parsed.news.country, country);
            prop_assert_eq!(parsed.news.category, category);
            prop_assert_eq!(parsed.news.page_size, page_size);
        }
    }
}
