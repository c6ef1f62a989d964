//! Application services layer.

pub mod analytics;
pub mod dashboard;
pub mod error;
pub mod ingest;
pub mod posts;
pub mod repos;
