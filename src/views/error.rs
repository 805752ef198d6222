//! View engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    /// Embedded template listed but not readable
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    /// Template parsing or rendering error
    #[error("Template error: {0}")]
    TemplateError(String),
}
