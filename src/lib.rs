//! Shared integration shims: Google service-account tokens, S3 uploads,
//! Slack alerts and BigQuery queries.
//!
//! Each component is independent and owns its own HTTP client.

pub mod config;
pub mod errors;
pub mod google;
pub mod models;
pub mod notification;
pub mod storage;
pub mod warehouse;
