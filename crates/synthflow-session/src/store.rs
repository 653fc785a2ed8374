//! Session persistence.
//!
//! Every state transition is one read-modify-write through
//! [`SessionStore::update`]. Implementations serialize updates to the same
//! store so two transitions never interleave within the process; nothing
//! here coordinates across processes.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use synthflow_utils::error::StoreError;

use crate::model::Session;

/// Whether an update's mutation should be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Write,
    Skip,
}

/// In-place edit applied under the store's write lock.
pub type Mutation<'a> = Box<dyn FnOnce(&mut Session) -> Commit + Send + 'a>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Session, StoreError>;

    /// Apply `mutation` to the stored session. On [`Commit::Write`] the
    /// result is persisted with a fresh `updated_at`; on [`Commit::Skip`]
    /// nothing changes. Returns the session as stored afterwards.
    async fn update<'a>(&self, id: &str, mutation: Mutation<'a>) -> Result<Session, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Run a fallible edit through [`SessionStore::update`].
///
/// `Ok` commits and returns the stored session with the closure's value;
/// `Err` leaves the session untouched and is returned as-is.
pub async fn mutate<T, E, F>(store: &dyn SessionStore, id: &str, edit: F) -> Result<(Session, T), E>
where
    F: FnOnce(&mut Session) -> Result<T, E> + Send,
    T: Send,
    E: From<StoreError> + Send,
{
    let mut outcome: Option<Result<T, E>> = None;
    let slot = &mut outcome;
    let session = store
        .update(
            id,
            Box::new(move |session| {
                let result = edit(session);
                let commit = if result.is_ok() {
                    Commit::Write
                } else {
                    Commit::Skip
                };
                *slot = Some(result);
                commit
            }),
        )
        .await?;

    match outcome {
        Some(Ok(value)) => Ok((session, value)),
        Some(Err(e)) => Err(e),
        None => Err(E::from(StoreError::Io {
            id: id.to_string(),
            reason: "update returned without applying the edit".to_string(),
        })),
    }
}

/// Volatile store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::AlreadyExists {
                id: session.id.clone(),
            });
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Session, StoreError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn update<'a>(&self, id: &str, mutation: Mutation<'a>) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        let Some(stored) = sessions.get_mut(id) else {
            return Err(StoreError::NotFound { id: id.to_string() });
        };
        let mut draft = stored.clone();
        match mutation(&mut draft) {
            Commit::Write => {
                draft.touch();
                *stored = draft.clone();
                Ok(draft)
            }
            Commit::Skip => Ok(stored.clone()),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
