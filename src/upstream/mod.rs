/// Upstream module
///
/// Typed adapter over the portal's two calls. Raw upstream text is inspected
/// only here and turned into `FetchOutcome` / `RelayError`.
pub mod client;
pub mod dto;

use std::fmt;
use std::future::Future;

use crate::cache::session::Record;
use crate::error::RelayResult;

pub use client::HttpUpstream;

/// Message the portal returns when the session token is no longer valid.
pub const NOT_LOGGED_IN_MESSAGE: &str = "You are not logged in.";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Result of a grades fetch that reached the upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Vec<Record>),
    /// token stale or revoked
    NotAuthenticated,
    /// success status without the expected records field
    MalformedResponse(String),
}

/// The two upstream calls. Implementations must not retry or cache.
pub trait Upstream: Send + Sync {
    /// Exchange credentials for a session token.
    fn authenticate(&self, credentials: &Credentials) -> impl Future<Output = RelayResult<String>> + Send;

    fn fetch(&self, token: &str) -> impl Future<Output = RelayResult<FetchOutcome>> + Send;
}
