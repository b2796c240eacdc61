use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::session::CachedSession;

pub const FRESHNESS_WINDOW_SECONDS_DEFAULT: u64 = 300;

/// What to do with a read request given the cached state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    ServeCached,
    Refetch(RefetchReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchReason {
    Forced,
    Empty,
    Expired,
}

impl RefetchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefetchReason::Forced => "forced",
            RefetchReason::Empty => "empty",
            RefetchReason::Expired => "expired",
        }
    }
}

/// Freshness policy for the shared payload. Pure, no I/O.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub freshness_window: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(FRESHNESS_WINDOW_SECONDS_DEFAULT))
    }
}

impl CachePolicy {
    pub fn new(freshness_window: Duration) -> Self {
        Self { freshness_window }
    }

    pub fn decide(&self, now: DateTime<Utc>, session: &CachedSession, force_refresh: bool) -> CacheDecision {
        if force_refresh {
            return CacheDecision::Refetch(RefetchReason::Forced);
        }
        if session.payload.is_empty() {
            return CacheDecision::Refetch(RefetchReason::Empty);
        }
        match session.last_fetch_at {
            Some(fetched_at) if self.is_fresh(now, fetched_at) => CacheDecision::ServeCached,
            _ => CacheDecision::Refetch(RefetchReason::Expired),
        }
    }

    /// `now - fetched_at < window`; a timestamp in the future counts as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, fetched_at: DateTime<Utc>) -> bool {
        match (now - fetched_at).to_std() {
            Ok(age) => age < self.freshness_window,
            Err(_) => true,
        }
    }
}
