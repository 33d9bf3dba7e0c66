//! Core types for offline-first synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of locally persisted record a mutation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Visit,
    TaskCompletion,
    ChallengeCreated,
    PhotoUpload,
}

/// Identity of a persisted record; the queue never holds the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadRef {
    pub kind: MutationKind,
    pub entity_id: String,
}

impl PayloadRef {
    pub fn new(kind: MutationKind, entity_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
        }
    }
}

/// A locally recorded change waiting for remote acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncableMutation {
    /// Stable across retries so the remote can drop duplicates.
    pub id: Uuid,
    pub payload: PayloadRef,
    pub enqueued_at: DateTime<Utc>,
    /// Failed flush attempts that included this mutation.
    pub retry_count: u32,
}

/// Process-wide sync status. Exactly one is active at a time.
///
/// ```text
/// idle --[pending>0 && online]--> syncing --[success]--> synced --[idle timeout]--> idle
///                                         \--[failure]--> error(reason)
/// any --[offline]--> offline --[online && pending>0]--> syncing
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Synced {
        at: DateTime<Utc>,
    },
    Offline,
    Error {
        reason: String,
    },
}

/// Everything the sync engine publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub pending_sync_count: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub online: bool,
}

/// What a single `try_sync` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    NothingPending,
    Offline,
    AlreadySyncing,
    Synced { flushed: usize },
    Failed { reason: String },
    /// Connectivity dropped while the flush was in flight; result ignored.
    Abandoned,
}

/// Remote collaborator failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote rejected flush: {0}")]
    Rejected(String),

    #[error("flush timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("remote unreachable: {0}")]
    Unreachable(String),
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
