//! LURKER Library
//!
//! Early token signal scanner: collectors, signal store, tier classifier,
//! enrichment/gating, Telegram notifier and feed health check.

pub mod classifier;
pub mod cli;
pub mod collector;
pub mod config;
pub mod dexscreener;
pub mod enrich;
pub mod error;
pub mod health;
pub mod notify;
pub mod signal;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use signal::TokenSignal;
