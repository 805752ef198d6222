//! Data models
//!
//! This module contains the data structures shared across newsdesk:
//! - Session state held by the session store
//! - News articles and responses from the news API

mod article;
mod session;

pub use article::{
    Article, ArticleRejection, ArticleSource, NewsResponse, NewsStatus, PayloadError, RawArticle,
};
pub use session::{ClientId, Session, SessionHandle};
