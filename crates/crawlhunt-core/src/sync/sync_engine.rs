//! Offline-first sync engine.
//!
//! Recording intent (`save_for_sync`) is separate from flushing
//! (`try_sync`). The `Syncing` status doubles as the reentrancy lock: any
//! number of triggers (resume, connectivity, manual retry) may call
//! `try_sync` concurrently and at most one flush runs.
//!
//! Going offline overrides every other status immediately. A flush still in
//! flight at that moment is abandoned: its result is discarded and the queue
//! is kept as-is for the next trigger.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::LifecycleEvent;
use crate::storage::SyncConfig;
use crate::sync::remote::RemoteSyncTarget;
use crate::sync::sync_queue::SyncQueue;
use crate::sync::types::{
    PayloadRef, RemoteError, SyncError, SyncOutcome, SyncSnapshot, SyncStatus, SyncableMutation,
};

struct SyncState {
    status: SyncStatus,
    queue: SyncQueue,
    online: bool,
    last_sync_time: Option<DateTime<Utc>>,
    /// Bumped on every offline transition; a flush started under an older
    /// epoch has been abandoned.
    epoch: u64,
}

impl SyncState {
    fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            status: self.status.clone(),
            pending_sync_count: self.queue.len(),
            last_sync_time: self.last_sync_time,
            online: self.online,
        }
    }
}

/// Sync engine owning the pending queue and the status state machine.
pub struct SyncEngine {
    state: Mutex<SyncState>,
    remote: Arc<dyn RemoteSyncTarget>,
    idle_timeout: Duration,
    flush_timeout: std::time::Duration,
    published: watch::Sender<SyncSnapshot>,
}

impl SyncEngine {
    /// Create the engine in `Idle`, assuming connectivity until told otherwise.
    ///
    /// When `config.queue_file` is set, mutations left over from a previous
    /// run are loaded from it.
    pub fn new(remote: Arc<dyn RemoteSyncTarget>, config: &SyncConfig) -> Self {
        let mut queue = match &config.queue_file {
            Some(path) => SyncQueue::with_path(path.clone()),
            None => SyncQueue::new(),
        };
        if let Err(e) = queue.load() {
            warn!(error = %e, "could not restore sync queue, starting empty");
        }
        if !queue.is_empty() {
            info!(pending = queue.len(), "restored pending mutations");
        }

        let state = SyncState {
            status: SyncStatus::Idle,
            queue,
            online: true,
            last_sync_time: None,
            epoch: 0,
        };
        let (published, _) = watch::channel(state.snapshot());
        Self {
            state: Mutex::new(state),
            remote,
            idle_timeout: config.idle_timeout(),
            flush_timeout: config.flush_timeout(),
            published,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.published.subscribe()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.lock().snapshot()
    }

    pub fn status(&self) -> SyncStatus {
        self.lock().status.clone()
    }

    pub fn pending_sync_count(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.lock().last_sync_time
    }

    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    pub fn pending_mutations(&self) -> Vec<SyncableMutation> {
        self.lock().queue.snapshot()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Record a mutation for later upload. Does not start a flush.
    pub fn save_for_sync(&self, payload: PayloadRef) -> Uuid {
        let mut state = self.lock();
        let id = state.queue.enqueue(payload);
        debug!(%id, pending = state.queue.len(), "mutation queued for sync");
        self.publish(&state);
        id
    }

    /// Flush the whole queue if there is anything to flush and we are online.
    pub async fn try_sync(&self) -> SyncOutcome {
        let (epoch, batch) = {
            let mut state = self.lock();
            if state.queue.is_empty() {
                return SyncOutcome::NothingPending;
            }
            if !state.online {
                if state.status != SyncStatus::Offline {
                    state.status = SyncStatus::Offline;
                    self.publish(&state);
                }
                return SyncOutcome::Offline;
            }
            if state.status == SyncStatus::Syncing {
                debug!("sync already in progress");
                return SyncOutcome::AlreadySyncing;
            }
            state.status = SyncStatus::Syncing;
            self.publish(&state);
            (state.epoch, state.queue.snapshot())
        };

        info!(count = batch.len(), "flushing pending mutations");
        let result = match tokio::time::timeout(self.flush_timeout, self.remote.flush(&batch)).await
        {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout {
                secs: self.flush_timeout.as_secs(),
            }),
        };

        let ids: Vec<Uuid> = batch.iter().map(|m| m.id).collect();
        let mut state = self.lock();
        if state.epoch != epoch || state.status != SyncStatus::Syncing {
            warn!(count = ids.len(), "flush abandoned after connectivity loss, queue kept");
            return SyncOutcome::Abandoned;
        }

        match result {
            Ok(()) => {
                state.queue.acknowledge(&ids);
                let now = Utc::now();
                state.status = SyncStatus::Synced { at: now };
                state.last_sync_time = Some(now);
                if let Err(e) = state.queue.persist() {
                    warn!(error = %e, "could not persist sync queue");
                }
                info!(flushed = ids.len(), pending = state.queue.len(), "sync complete");
                self.publish(&state);
                SyncOutcome::Synced {
                    flushed: ids.len(),
                }
            }
            Err(e) => {
                state.queue.mark_failed(&ids);
                let reason = e.to_string();
                warn!(%reason, pending = state.queue.len(), "sync failed, will retry on next trigger");
                state.status = SyncStatus::Error {
                    reason: reason.clone(),
                };
                self.publish(&state);
                SyncOutcome::Failed { reason }
            }
        }
    }

    /// Apply a connectivity change. Coming back online with pending work
    /// triggers a flush and returns its outcome.
    pub async fn set_online(&self, online: bool) -> Option<SyncOutcome> {
        if self.update_connectivity(online) {
            Some(self.try_sync().await)
        } else {
            None
        }
    }

    /// Record a connectivity change without flushing. Returns whether the
    /// caller should now run [`try_sync`](Self::try_sync): only an
    /// offline-to-online flip with pending work does.
    pub fn update_connectivity(&self, online: bool) -> bool {
        let mut state = self.lock();
        if !online {
            state.online = false;
            state.epoch += 1;
            if state.status != SyncStatus::Offline {
                info!(from = ?state.status, "connectivity lost, sync offline");
                state.status = SyncStatus::Offline;
                self.publish(&state);
            }
            return false;
        }

        if state.online {
            return false;
        }
        state.online = true;
        if state.status == SyncStatus::Offline {
            state.status = SyncStatus::Idle;
        }
        info!(pending = state.queue.len(), "connectivity restored");
        self.publish(&state);
        !state.queue.is_empty()
    }

    /// Foreground retries the flush; background saves the queue to disk.
    pub async fn handle_lifecycle(&self, event: LifecycleEvent) -> Option<SyncOutcome> {
        match event {
            LifecycleEvent::Foreground => Some(self.try_sync().await),
            LifecycleEvent::Background => {
                if let Err(e) = self.persist_queue() {
                    warn!(error = %e, "could not persist sync queue on background");
                }
                None
            }
        }
    }

    pub fn persist_queue(&self) -> Result<(), SyncError> {
        self.lock().queue.persist()
    }

    /// Drop `Synced` back to `Idle` once the idle timeout has passed.
    pub fn tick(&self) -> bool {
        self.tick_at(Utc::now())
    }

    pub fn tick_at(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        let expired = matches!(
            state.status,
            SyncStatus::Synced { at } if now - at >= self.idle_timeout
        );
        if expired {
            state.status = SyncStatus::Idle;
            debug!("sync status idle");
            self.publish(&state);
        }
        expired
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SyncState) {
        self.published.send_replace(state.snapshot());
    }
}
