//! Services layer
//!
//! - `session`: who is logged in, per client
//! - `news`: the news API client
//! - `feed`: per-client news views with auto-refresh
//! - `validation`: claim corroboration
//! - `password`: hashing for the in-memory identity provider

pub mod feed;
pub mod news;
pub mod password;
pub mod session;
pub mod validation;

pub use feed::{FeedRegistry, FeedSnapshot, FeedView, LOAD_ERROR_MESSAGE};
pub use news::{HeadlineQuery, NewsClient, NewsSource};
pub use password::{hash_password, verify_password};
pub use session::{SessionEvent, SessionStore};
pub use validation::{ClaimReport, ClaimValidator, Verdict};
