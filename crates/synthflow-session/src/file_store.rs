//! One JSON file per session under a data directory.
//!
//! Writes go through [`write_file_atomic`], so a reader never sees a
//! half-written session. Updates are serialized in-process by a single
//! mutex held across the read-modify-write.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::io::ErrorKind;
use tokio::sync::Mutex;
use tracing::debug;

use synthflow_utils::atomic_write::write_file_atomic;
use synthflow_utils::error::StoreError;

use crate::model::Session;
use crate::store::{Commit, Mutation, SessionStore};

const SESSION_EXTENSION: &str = "json";

#[derive(Debug)]
pub struct JsonFileStore {
    dir: Utf8PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) the store rooted at `dir`.
    pub fn open(dir: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
            id: dir.to_string(),
            reason: format!("cannot create data directory: {e}"),
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Session ids become file names, so only plain id characters are
    /// accepted; anything else cannot name a stored session.
    fn path_for(&self, id: &str) -> Result<Utf8PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(self.dir.join(format!("{id}.{SESSION_EXTENSION}")))
    }

    async fn read(&self, id: &str) -> Result<Session, StoreError> {
        let path = self.path_for(id)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound { id: id.to_string() });
            }
            Err(e) => {
                return Err(StoreError::Io {
                    id: id.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn write(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.path_for(&session.id)?;
        let id = session.id.clone();
        let json = serde_json::to_string_pretty(session).map_err(|e| StoreError::Io {
            id: id.clone(),
            reason: e.to_string(),
        })?;

        tokio::task::spawn_blocking(move || write_file_atomic(&path, &json))
            .await
            .map_err(|e| StoreError::Io {
                id: id.clone(),
                reason: e.to_string(),
            })?
            .map_err(|e| StoreError::Io {
                id: id.clone(),
                reason: format!("{e:#}"),
            })?;

        debug!(session_id = %id, "Session persisted");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(&session.id)?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::AlreadyExists {
                id: session.id.clone(),
            });
        }
        self.write(session).await
    }

    async fn get(&self, id: &str) -> Result<Session, StoreError> {
        self.read(id).await
    }

    async fn update<'a>(&self, id: &str, mutation: Mutation<'a>) -> Result<Session, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.read(id).await?;
        let original = session.clone();
        match mutation(&mut session) {
            Commit::Write => {
                session.touch();
                self.write(&session).await?;
                Ok(session)
            }
            Commit::Skip => Ok(original),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound { id: id.to_string() })
            }
            Err(e) => Err(StoreError::Io {
                id: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let io_err = |e: std::io::Error| StoreError::Io {
            id: self.dir.to_string(),
            reason: e.to_string(),
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.extension() == Some(SESSION_EXTENSION) {
                if let Some(stem) = path.file_stem() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
