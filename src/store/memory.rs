use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::session::CachedSession;
use crate::error::RelayResult;
use crate::store::CredentialStore;

/// In-process store: store key -> session.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    key: String,
    inner: Arc<RwLock<HashMap<String, CachedSession>>>,
}

impl MemoryStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store pre-populated with `session`, mostly useful to seed tests.
    pub fn with_session(key: impl Into<String>, session: CachedSession) -> Self {
        let key = key.into();
        let mut map = HashMap::new();
        map.insert(key.clone(), session);
        Self {
            key,
            inner: Arc::new(RwLock::new(map)),
        }
    }
}

impl CredentialStore for MemoryStore {
    async fn read(&self) -> RelayResult<CachedSession> {
        let map = self.inner.read().await;
        Ok(map.get(&self.key).cloned().unwrap_or_default())
    }

    async fn update<F>(&self, mutator: F) -> RelayResult<CachedSession>
    where
        F: FnOnce(CachedSession) -> CachedSession + Send,
    {
        let mut map = self.inner.write().await;
        let current = map.remove(&self.key).unwrap_or_default();
        let updated = mutator(current);
        map.insert(self.key.clone(), updated.clone());
        Ok(updated)
    }
}
