//! Markdown blog backend with reader analytics.
//!
//! Posts are read from a directory of markdown files; page views, ratings
//! and reading sessions are ingested over HTTP and aggregated on demand
//! into dashboard reports.

pub mod application;
pub mod client;
pub mod config;
pub mod domain;
pub mod infra;
