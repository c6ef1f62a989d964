//! Infrastructure adapters and runtime bootstrap.

pub mod content;
pub mod db;
pub mod error;
pub mod http;
pub mod memory;
pub mod telemetry;
