//! Session store: maps an opaque upload token to its directory and artifacts.
//!
//! Sessions are created on upload with a fixed lifetime. The artifact set is
//! attached only when a pipeline run succeeds. Expired sessions are hidden
//! from lookups immediately and physically removed, directory included, by the
//! background sweeper started with [`spawn_sweeper`].

use crate::output::ArtifactSet;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Opaque session token (UUID v4), sent to clients in the `session_id` cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// One upload and everything produced from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub created: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// `<work dir>/<id>`; holds the upload and all artifacts.
    pub dir: PathBuf,
    /// Present only after a successful run.
    pub artifacts: Option<ArtifactSet>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
}

/// Storage for sessions. Injected into the HTTP layer as `Arc<dyn SessionStore>`.
pub trait SessionStore: Send + Sync {
    /// Register a new session whose directory is `<work_dir>/<id>`.
    fn create(&self, work_dir: &Path) -> Session;

    /// Attach the artifacts of a successful run.
    fn put(&self, id: &SessionId, artifacts: ArtifactSet) -> Result<(), SessionError>;

    /// Look up a live session. Expired sessions are not returned.
    fn get(&self, id: &SessionId) -> Option<Session>;

    fn remove(&self, id: &SessionId) -> Option<Session>;

    /// Drop every session expired at `now` and return them.
    fn purge_expired(&self, now: DateTime<Utc>) -> Vec<Session>;
}

/// In-process [`SessionStore`] over an `RwLock<HashMap>`.
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    ttl: chrono::Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365)),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self, work_dir: &Path) -> Session {
        let id = SessionId::new();
        let created = Utc::now();
        let session = Session {
            id,
            created,
            expires_at: created + self.ttl,
            dir: work_dir.join(id.to_string()),
            artifacts: None,
        };
        self.sessions.write().insert(id, session.clone());
        tracing::debug!(session_id = %id, "Created session");
        session
    }

    fn put(&self, id: &SessionId, artifacts: ArtifactSet) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound(*id))?;
        session.artifacts = Some(artifacts);
        Ok(())
    }

    fn get(&self, id: &SessionId) -> Option<Session> {
        let sessions = self.sessions.read();
        sessions
            .get(id)
            .filter(|s| !s.is_expired(Utc::now()))
            .cloned()
    }

    fn remove(&self, id: &SessionId) -> Option<Session> {
        self.sessions.write().remove(id)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Vec<Session> {
        let mut sessions = self.sessions.write();
        let expired: Vec<SessionId> = sessions
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.id)
            .collect();
        expired
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect()
    }
}

/// Purge expired sessions and delete their directories. Returns how many
/// sessions were purged.
pub async fn sweep_once(store: &dyn SessionStore, now: DateTime<Utc>) -> usize {
    let expired = store.purge_expired(now);
    for session in &expired {
        match tokio::fs::remove_dir_all(&session.dir).await {
            Ok(()) => tracing::debug!(session_id = %session.id, "Removed session directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                session_id = %session.id,
                dir = %session.dir.display(),
                "Could not remove session directory: {}",
                e
            ),
        }
    }
    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "Cleaned up expired sessions");
    }
    expired.len()
}

/// Start the background sweeper.
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            sweep_once(store.as_ref(), Utc::now()).await;
        }
    })
}
