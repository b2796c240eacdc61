use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque item returned by the upstream; only counted and stored.
pub type Record = Value;

/// Cached state of the shared upstream identity.
///
/// Persisted as `{ "token", "payload", "lastFetchAt" }` where `lastFetchAt`
/// is epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CachedSession {
    /// absent means "must authenticate before use"
    pub token: Option<String>,
    /// last successfully fetched result set
    pub payload: Vec<Record>,
    /// invariant: set whenever `payload` is non-empty
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_fetch_at: Option<DateTime<Utc>>,
}

impl CachedSession {
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Store a freshly fetched payload unless a newer fetch already landed.
    ///
    /// `issued_at` is the moment the fetch request was sent. Returns `false`
    /// when the stored payload is newer and was kept.
    pub fn apply_fetch(&mut self, payload: Vec<Record>, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.last_fetch_at.is_some_and(|stored| stored > issued_at) {
            return false;
        }
        self.payload = payload;
        self.last_fetch_at = Some(now);
        true
    }

    /// Drop `token` only if it is still the stored one.
    pub fn clear_token_if(&mut self, token: &str) -> bool {
        if self.token.as_deref() == Some(token) {
            self.token = None;
            true
        } else {
            false
        }
    }

    /// New token with an empty cache, so the next read goes upstream.
    pub fn reset_with_token(&mut self, token: String) {
        self.token = Some(token);
        self.payload.clear();
        self.last_fetch_at = None;
    }
}
