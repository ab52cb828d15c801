//! HTTP request handlers
//!
//! - `api` - Health check endpoint
//! - `assess` - Pronunciation assessment upload

pub mod api;
pub mod assess;

pub use assess::assess_handler;
