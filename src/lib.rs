//! RADAR: new-listing signal pipeline
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod clock;
pub mod config;
pub mod engine;
pub mod exchanges;
pub mod listings;
pub mod notify;
pub mod retry;
pub mod signal;
pub mod storage;
pub mod types;
