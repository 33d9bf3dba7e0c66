//! Offline-first synchronization layer.
//!
//! Locally recorded visits and completions are queued by identity and
//! flushed to an opaque remote collaborator whenever connectivity allows.

pub mod remote;
pub mod sync_engine;
pub mod sync_queue;
pub mod types;

pub use remote::RemoteSyncTarget;
pub use sync_engine::SyncEngine;
pub use sync_queue::SyncQueue;
pub use types::{
    MutationKind, PayloadRef, RemoteError, SyncError, SyncOutcome, SyncSnapshot, SyncStatus,
    SyncableMutation,
};
