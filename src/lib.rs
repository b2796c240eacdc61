//! # Grades Relay Library
//!
//! Caches grade records fetched from a token-authenticated student portal
//! and keeps one shared portal session alive for all callers.
//!
//! Modules:
//! - `config`: service configuration, loading and validation
//! - `cache`: cached session record and freshness policy
//! - `store`: credential store backends (memory, file)
//! - `upstream`: typed portal client
//! - `coordinator`: cache-and-refresh coordination, single-flight re-auth
//! - `server`: HTTP routes

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod helpers;
pub mod observability;
pub mod server;
pub mod store;
pub mod tests;
pub mod upstream;
pub mod utils;

pub use crate::config::upstream::ServiceConfig;
pub use crate::coordinator::Coordinator;
pub use crate::error::{RelayError, RelayResult};
