//! Newsdesk - top headlines, news search and claim checks behind
//! delegated sign-in
//!
//! This library provides the core functionality of the newsdesk server.

pub mod api;
pub mod config;
pub mod identity;
pub mod models;
pub mod services;
pub mod views;
