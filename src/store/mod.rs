//! Credential store: durable holder of the shared session.
//!
//! The coordinator only relies on `update` being atomic for the store key and
//! on reads observing the last completed update.

pub mod file;
pub mod memory;

use std::future::Future;

use crate::cache::session::CachedSession;
use crate::error::RelayResult;

pub use file::FileStore;
pub use memory::MemoryStore;

pub const STORE_KEY_DEFAULT: &str = "app_session";

pub trait CredentialStore: Send + Sync {
    fn read(&self) -> impl Future<Output = RelayResult<CachedSession>> + Send;

    /// Apply `mutator` atomically and return the stored result.
    fn update<F>(&self, mutator: F) -> impl Future<Output = RelayResult<CachedSession>> + Send
    where
        F: FnOnce(CachedSession) -> CachedSession + Send;
}

/// Store backend selected at startup.
#[derive(Debug, Clone)]
pub enum SessionStore {
    Memory(MemoryStore),
    File(FileStore),
}

impl CredentialStore for SessionStore {
    async fn read(&self) -> RelayResult<CachedSession> {
        match self {
            SessionStore::Memory(s) => s.read().await,
            SessionStore::File(s) => s.read().await,
        }
    }

    async fn update<F>(&self, mutator: F) -> RelayResult<CachedSession>
    where
        F: FnOnce(CachedSession) -> CachedSession + Send,
    {
        match self {
            SessionStore::Memory(s) => s.update(mutator).await,
            SessionStore::File(s) => s.update(mutator).await,
        }
    }
}
