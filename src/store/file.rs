use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::cache::session::CachedSession;
use crate::error::{RelayError, RelayResult};
use crate::store::CredentialStore;

/// JSON file store, one file per store key: `<dir>/<key>.json`.
///
/// Updates are serialized by an async mutex and land through
/// write-to-temp + rename, so readers see either the old or the new record.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", key)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> RelayResult<CachedSession> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored session yet");
                return Ok(CachedSession::default());
            }
            Err(err) => return Err(store_failure("read", &self.path, err)),
        };
        serde_json::from_slice(&raw).map_err(|err| store_failure("read", &self.path, err))
    }

    async fn persist(&self, session: &CachedSession) -> RelayResult<()> {
        let body = serde_json::to_vec(session).map_err(|err| store_failure("write", &self.path, err))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| store_failure("write", &self.path, err))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &body)
            .await
            .map_err(|err| store_failure("write", &tmp, err))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|err| store_failure("write", &tmp, err))?;
        }
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| store_failure("write", &self.path, err))
    }
}

impl CredentialStore for FileStore {
    async fn read(&self) -> RelayResult<CachedSession> {
        self.load().await
    }

    async fn update<F>(&self, mutator: F) -> RelayResult<CachedSession>
    where
        F: FnOnce(CachedSession) -> CachedSession + Send,
    {
        let _guard = self.write_lock.lock().await;
        let updated = mutator(self.load().await?);
        self.persist(&updated).await?;
        Ok(updated)
    }
}

fn store_failure(op: &'static str, path: &Path, err: impl std::fmt::Display) -> RelayError {
    error!(op, path = %path.display(), "session store failure: {}", err);
    RelayError::StoreUnavailable(format!("{} {}: {}", op, path.display(), err))
}
