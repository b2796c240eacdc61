// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::cache::policy::CachePolicy;
use crate::cache::session::{CachedSession, Record};
use crate::config::upstream::{IdentityConfig, SecretValue, UpstreamConfig};
use crate::coordinator::Coordinator;
use crate::error::{RelayError, RelayResult};
use crate::store::{CredentialStore, MemoryStore};
use crate::upstream::{Credentials, FetchOutcome, Upstream};

pub const SHARED_USERNAME: &str = "relay-user";
pub const SHARED_PASSWORD: &str = "relay-pass";
pub const TEST_STORE_KEY: &str = "test_session";

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

pub fn shared_identity() -> Credentials {
    Credentials::new(SHARED_USERNAME, SHARED_PASSWORD)
}

pub fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| json!({ "offer": { "subject": { "subject_no": format!("SUBJ {}", 100 + i) } } }))
        .collect()
}

pub fn upstream_config(base_url: &str) -> UpstreamConfig {
    UpstreamConfig {
        base_url: base_url.to_string(),
        sessions_path: "/sessions".to_string(),
        grades_path: "/grades".to_string(),
        query: HashMap::from([("sy_year".to_string(), "2024".to_string())]),
        timeout_ms: 2000,
        headers: HashMap::from([("Origin".to_string(), "https://my.portal.test".to_string())]),
        identity: IdentityConfig {
            username: SecretValue::Literal { value: SHARED_USERNAME.to_string() },
            password: SecretValue::Literal { value: SHARED_PASSWORD.to_string() },
        },
    }
}

pub fn coordinator(store: MemoryStore, upstream: ScriptedUpstream) -> Coordinator<MemoryStore, ScriptedUpstream> {
    Coordinator::new(store, upstream, shared_identity(), CachePolicy::new(Duration::from_secs(300)))
}

/// Behaviour of a [`ScriptedUpstream`].
#[derive(Default)]
pub struct Script {
    /// records returned on success; ignored when `tag_fetches` is set
    pub records: Vec<Record>,
    /// success payload is `[{"fetch": <call index>}]`
    pub tag_fetches: bool,
    /// tokens the upstream treats as revoked
    pub rejected_tokens: HashSet<String>,
    /// every token is rejected
    pub reject_all_tokens: bool,
    /// extra accepted identities besides the shared one
    pub extra_accounts: Vec<Credentials>,
    /// reject the shared identity as well
    pub shared_identity_invalid: bool,
    pub auth_delay: Duration,
    /// per fetch call index
    pub fetch_delays: Vec<Duration>,
    pub fetch_error: Option<RelayError>,
    pub malformed: bool,
}

/// In-process portal stand-in counting every call.
#[derive(Clone)]
pub struct ScriptedUpstream {
    script: Arc<Script>,
    state: Arc<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    authenticate_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    auth_in_flight: AtomicUsize,
    max_auth_in_flight: AtomicUsize,
    fetched_with: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            state: Arc::new(ScriptState::default()),
        }
    }

    pub fn returning(records: Vec<Record>) -> Self {
        Self::new(Script { records, ..Default::default() })
    }

    pub fn authenticate_calls(&self) -> usize {
        self.state.authenticate_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn max_auth_in_flight(&self) -> usize {
        self.state.max_auth_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetched_with(&self) -> Vec<String> {
        self.state.fetched_with.lock().unwrap().clone()
    }

    fn accepts(&self, credentials: &Credentials) -> bool {
        let shared = !self.script.shared_identity_invalid && *credentials == shared_identity();
        shared || self.script.extra_accounts.contains(credentials)
    }
}

impl Upstream for ScriptedUpstream {
    async fn authenticate(&self, credentials: &Credentials) -> RelayResult<String> {
        let n = self.state.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.state.auth_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_auth_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.script.auth_delay.is_zero() {
            tokio::time::sleep(self.script.auth_delay).await;
        }
        self.state.auth_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.accepts(credentials) {
            Ok(format!("token-{}", n + 1))
        } else {
            Err(RelayError::InvalidCredentials(format!("no token for '{}'", credentials.username)))
        }
    }

    async fn fetch(&self, token: &str) -> RelayResult<FetchOutcome> {
        let n = self.state.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.state.fetched_with.lock().unwrap().push(token.to_string());

        if let Some(delay) = self.script.fetch_delays.get(n) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(err) = &self.script.fetch_error {
            return Err(err.clone());
        }
        if self.script.reject_all_tokens || self.script.rejected_tokens.contains(token) {
            return Ok(FetchOutcome::NotAuthenticated);
        }
        if self.script.malformed {
            return Ok(FetchOutcome::MalformedResponse("grades field missing".to_string()));
        }
        if self.script.tag_fetches {
            return Ok(FetchOutcome::Success(vec![json!({ "fetch": n })]));
        }
        Ok(FetchOutcome::Success(self.script.records.clone()))
    }
}

/// Store whose every call fails.
#[derive(Clone, Default)]
pub struct FailingStore;

impl CredentialStore for FailingStore {
    async fn read(&self) -> RelayResult<CachedSession> {
        Err(RelayError::StoreUnavailable("disk on fire".to_string()))
    }

    async fn update<F>(&self, _mutator: F) -> RelayResult<CachedSession>
    where
        F: FnOnce(CachedSession) -> CachedSession + Send,
    {
        Err(RelayError::StoreUnavailable("disk on fire".to_string()))
    }
}

pub fn payload_of(value: &Value) -> Vec<Value> {
    value["grades"].as_array().cloned().unwrap_or_default()
}
