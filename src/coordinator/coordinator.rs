use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::policy::{CacheDecision, CachePolicy};
use crate::cache::session::{CachedSession, Record};
use crate::error::{RelayError, RelayResult};
use crate::helpers::time::now_utc;
use crate::observability::metrics::get_metrics;
use crate::store::CredentialStore;
use crate::upstream::{Credentials, FetchOutcome, Upstream};

static SHARED_MSG: &str = "shared";
static OVERRIDE_MSG: &str = "override";
static READ_MSG: &str = "read";
static WRITE_MSG: &str = "write";

/// Serves grade records for the shared portal identity from a cache, and
/// keeps the shared session token alive.
///
/// Re-authentication of the shared identity is single-flight: `auth_lock`
/// admits one attempt at a time, and callers that queued while an attempt
/// was running take its outcome, token or error, instead of authenticating
/// again.
pub struct Coordinator<S, U> {
    store: S,
    upstream: U,
    identity: Credentials,
    policy: CachePolicy,
    auth_lock: Mutex<AuthAttempt>,
    /// mirrors `AuthAttempt::generation`, readable without the lock
    auth_generation: AtomicU64,
}

/// Latest finished shared authentication attempt.
#[derive(Default)]
struct AuthAttempt {
    generation: u64,
    outcome: Option<RelayResult<String>>,
}

impl AuthAttempt {
    fn record(&mut self, outcome: RelayResult<String>) -> u64 {
        self.generation += 1;
        self.outcome = Some(outcome);
        self.generation
    }
}

/// Operator view of the shared session. Never carries the token itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub has_token: bool,
    pub cached_records: usize,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub is_fresh: bool,
}

impl<S, U> Coordinator<S, U>
where
    S: CredentialStore,
    U: Upstream,
{
    pub fn new(store: S, upstream: U, identity: Credentials, policy: CachePolicy) -> Self {
        Self {
            store,
            upstream,
            identity,
            policy,
            auth_lock: Mutex::new(AuthAttempt::default()),
            auth_generation: AtomicU64::new(0),
        }
    }

    /// Records for the shared identity, or for `override_credentials` when
    /// given. The override path never reads or writes the shared session.
    pub async fn get_data(
        &self,
        force_refresh: bool,
        override_credentials: Option<Credentials>,
    ) -> RelayResult<Vec<Record>> {
        match override_credentials {
            Some(credentials) => self.get_with_override(&credentials).await,
            None => self.get_shared(force_refresh).await,
        }
    }

    /// Authenticate the shared identity now and reset the cache so the next
    /// read goes upstream. The store is left untouched on failure.
    pub async fn reauthenticate(&self) -> RelayResult<()> {
        let mut attempt = self.auth_lock.lock().await;
        let outcome = self.authenticate_and_reset().await;
        self.finish_attempt(&mut attempt, outcome).map(|_| ())
    }

    pub async fn status(&self) -> RelayResult<SessionStatus> {
        let session = self.read_store().await?;
        let is_fresh = self.policy.decide(now_utc(), &session, false) == CacheDecision::ServeCached;
        Ok(SessionStatus {
            has_token: session.has_token(),
            cached_records: session.payload.len(),
            last_fetch_at: session.last_fetch_at,
            is_fresh,
        })
    }

    async fn get_with_override(&self, credentials: &Credentials) -> RelayResult<Vec<Record>> {
        let metrics = get_metrics().await;
        metrics.authentications.with_label_values(&[OVERRIDE_MSG]).inc();
        debug!(username = %credentials.username, "fetching with override credentials");

        let token = self.upstream.authenticate(credentials).await?;
        match self.upstream.fetch(&token).await? {
            FetchOutcome::Success(records) => Ok(records),
            FetchOutcome::NotAuthenticated => Err(RelayError::InvalidCredentials(format!(
                "token issued for '{}' was rejected",
                credentials.username
            ))),
            FetchOutcome::MalformedResponse(reason) => Err(RelayError::MalformedResponse(reason)),
        }
    }

    async fn get_shared(&self, force_refresh: bool) -> RelayResult<Vec<Record>> {
        let metrics = get_metrics().await;
        let session = self.read_store().await?;

        match self.policy.decide(now_utc(), &session, force_refresh) {
            CacheDecision::ServeCached => {
                metrics.cache_hits.inc();
                debug!(records = session.payload.len(), "serving cached payload");
                return Ok(session.payload);
            }
            CacheDecision::Refetch(reason) => {
                metrics.cache_misses.with_label_values(&[reason.as_str()]).inc();
                debug!(reason = reason.as_str(), "cache miss, fetching upstream");
            }
        }

        let token = match session.token {
            Some(token) => token,
            None => self.refresh_token(None).await?,
        };

        let issued_at = now_utc();
        match self.upstream.fetch(&token).await? {
            FetchOutcome::Success(records) => self.commit(records, issued_at).await,
            FetchOutcome::MalformedResponse(reason) => Err(RelayError::MalformedResponse(reason)),
            FetchOutcome::NotAuthenticated => {
                warn!("shared token rejected by upstream, re-authenticating");
                let token = self.refresh_token(Some(&token)).await?;

                let issued_at = now_utc();
                match self.upstream.fetch(&token).await? {
                    FetchOutcome::Success(records) => self.commit(records, issued_at).await,
                    FetchOutcome::MalformedResponse(reason) => Err(RelayError::MalformedResponse(reason)),
                    FetchOutcome::NotAuthenticated => {
                        self.clear_token(&token).await?;
                        error!("renewed shared token rejected as well, giving up");
                        Err(RelayError::UpstreamAuthExpired)
                    }
                }
            }
        }
    }

    /// Token usable for the shared identity.
    ///
    /// `rejected` is the token the caller saw refused (or `None` when the
    /// store had no token). A caller that waited on the lock while another
    /// attempt finished returns that attempt's outcome, unless it produced
    /// the very token this caller saw rejected.
    async fn refresh_token(&self, rejected: Option<&str>) -> RelayResult<String> {
        let seen = self.auth_generation.load(Ordering::Acquire);
        let mut attempt = self.auth_lock.lock().await;

        if attempt.generation != seen {
            match &attempt.outcome {
                Some(Err(err)) => {
                    debug!(error = err.code(), "concurrent authentication failed, sharing its error");
                    return Err(err.clone());
                }
                Some(Ok(token)) if Some(token.as_str()) != rejected => {
                    debug!("reusing shared token renewed by a concurrent caller");
                    return Ok(token.clone());
                }
                _ => {}
            }
        }

        let outcome = self.renew_token(rejected).await;
        self.finish_attempt(&mut attempt, outcome)
    }

    /// Runs with `auth_lock` held.
    async fn renew_token(&self, rejected: Option<&str>) -> RelayResult<String> {
        let session = self.read_store().await?;
        if let Some(current) = session.token {
            if Some(current.as_str()) != rejected {
                debug!("stored shared token already renewed");
                return Ok(current);
            }
            self.clear_token(&current).await?;
        }

        let token = self.authenticate_shared().await?;
        let stored = token.clone();
        self.write_store(move |mut session| {
            session.token = Some(stored);
            session
        })
        .await?;
        info!("shared session token renewed");
        Ok(token)
    }

    /// Runs with `auth_lock` held.
    async fn authenticate_and_reset(&self) -> RelayResult<String> {
        let token = self.authenticate_shared().await?;
        let stored = token.clone();
        self.write_store(move |mut session| {
            session.reset_with_token(stored);
            session
        })
        .await?;

        get_metrics().await.cached_records.set(0);
        info!("shared session re-authenticated, cache reset");
        Ok(token)
    }

    fn finish_attempt(&self, attempt: &mut AuthAttempt, outcome: RelayResult<String>) -> RelayResult<String> {
        if let Err(err) = &outcome {
            warn!(error = err.code(), "shared authentication attempt failed");
        }
        let generation = attempt.record(outcome.clone());
        self.auth_generation.store(generation, Ordering::Release);
        outcome
    }

    async fn authenticate_shared(&self) -> RelayResult<String> {
        let metrics = get_metrics().await;
        metrics.authentications.with_label_values(&[SHARED_MSG]).inc();
        self.upstream.authenticate(&self.identity).await
    }

    async fn clear_token(&self, token: &str) -> RelayResult<()> {
        let token = token.to_owned();
        self.write_store(move |mut session| {
            session.clear_token_if(&token);
            session
        })
        .await
        .map(|_| ())
    }

    /// Last-writer-wins on `lastFetchAt`: the payload is stored only if no
    /// fetch completed after this one was issued. The caller gets its own
    /// records either way.
    async fn commit(&self, records: Vec<Record>, issued_at: DateTime<Utc>) -> RelayResult<Vec<Record>> {
        let mut applied = false;
        let fetched = records.clone();
        let stored = self
            .write_store(|mut session| {
                applied = session.apply_fetch(fetched, issued_at, now_utc());
                session
            })
            .await?;

        if applied {
            let metrics = get_metrics().await;
            metrics.cached_records.set(stored.payload.len() as i64);
            if let Some(at) = stored.last_fetch_at {
                metrics.last_fetch_unix.set(at.timestamp());
            }
            info!(records = stored.payload.len(), "shared payload refreshed");
        } else {
            debug!("newer payload already stored, keeping it");
        }
        Ok(records)
    }

    async fn read_store(&self) -> RelayResult<CachedSession> {
        match self.store.read().await {
            Ok(session) => Ok(session),
            Err(err) => {
                get_metrics().await.store_failures.with_label_values(&[READ_MSG]).inc();
                Err(err)
            }
        }
    }

    async fn write_store<F>(&self, mutator: F) -> RelayResult<CachedSession>
    where
        F: FnOnce(CachedSession) -> CachedSession + Send,
    {
        match self.store.update(mutator).await {
            Ok(session) => Ok(session),
            Err(err) => {
                get_metrics().await.store_failures.with_label_values(&[WRITE_MSG]).inc();
                Err(err)
            }
        }
    }
}
