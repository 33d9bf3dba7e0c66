//! The remote sync collaborator.

use async_trait::async_trait;

use crate::sync::types::{RemoteError, SyncableMutation};

/// Opaque backend that acknowledges a batch of mutations as a whole.
///
/// Implementations must tolerate receiving a mutation id more than once:
/// a flush abandoned on connectivity loss is re-sent on the next trigger.
#[async_trait]
pub trait RemoteSyncTarget: Send + Sync {
    async fn flush(&self, mutations: &[SyncableMutation]) -> Result<(), RemoteError>;
}
