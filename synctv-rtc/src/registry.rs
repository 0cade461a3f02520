//! Connection registry
//!
//! Single authority for connection lifecycle. One map holds, per connection,
//! the transport, the latest sample and the monitor loop's cancellation token.
//! Monitor writes are checked against the record under the map's entry lock,
//! so once [`ConnectionRegistry::remove`] returns, nothing written by an
//! in-flight tick can land.

use crate::error::{Error, Result};
use crate::metrics::ConnectionMetrics;
use crate::transport::Transport;
use crate::types::ConnectionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle of a connection's monitor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Running,
    Stopped,
}

struct ConnectionRecord {
    /// Distinguishes a replaced record from its predecessor
    epoch: u64,
    transport: Arc<dyn Transport>,
    metrics: Option<ConnectionMetrics>,
    last_target_kbps: Option<u32>,
    last_sampled_at: Option<Instant>,
    state: MonitorState,
    cancel: CancellationToken,
}

/// What a monitor loop needs to address its own record
#[derive(Debug, Clone)]
pub struct RecordHandle {
    pub id: ConnectionId,
    pub epoch: u64,
    pub cancel: CancellationToken,
}

/// Result of a successful registration
pub struct Registration {
    pub handle: RecordHandle,
    /// Transport of a stopped record that was replaced; the caller closes it
    pub replaced: Option<Arc<dyn Transport>>,
}

pub struct ConnectionRegistry {
    records: DashMap<ConnectionId, ConnectionRecord>,
    next_epoch: AtomicU64,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Register a transport under `id`.
    ///
    /// Fails with [`Error::AlreadyExists`] while a running record holds the id.
    /// A record whose loop already stopped is replaced in place.
    pub fn register(&self, id: ConnectionId, transport: Arc<dyn Transport>) -> Result<Registration> {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let record = ConnectionRecord {
            epoch,
            transport,
            metrics: None,
            last_target_kbps: None,
            last_sampled_at: None,
            state: MonitorState::Running,
            cancel: cancel.clone(),
        };

        let replaced = match self.records.entry(id.clone()) {
            Entry::Occupied(entry) if entry.get().state == MonitorState::Running => {
                return Err(Error::AlreadyExists(format!("connection {id}")));
            }
            Entry::Occupied(mut entry) => {
                let old = entry.insert(record);
                debug!(connection_id = %id, old_epoch = old.epoch, epoch, "Replaced stopped connection record");
                Some(old.transport)
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
                None
            }
        };

        Ok(Registration {
            handle: RecordHandle { id, epoch, cancel },
            replaced,
        })
    }

    /// Whether a running record holds `id`
    #[must_use]
    pub fn is_live(&self, id: &ConnectionId) -> bool {
        self.records
            .get(id)
            .is_some_and(|record| record.state == MonitorState::Running)
    }

    /// Latest sample, if the connection exists and has been sampled
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionMetrics> {
        self.records.get(id).and_then(|record| record.metrics)
    }

    /// Remove the record and cancel its monitor loop.
    ///
    /// Idempotent; returns the transport so the caller can close it.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<dyn Transport>> {
        self.records.remove(id).map(|(_, record)| {
            record.cancel.cancel();
            record.transport
        })
    }

    /// Transport for the loop identified by `handle`, if it still owns the record
    #[must_use]
    pub fn transport(&self, handle: &RecordHandle) -> Option<Arc<dyn Transport>> {
        self.records
            .get(&handle.id)
            .filter(|record| Self::owns(record, handle))
            .map(|record| Arc::clone(&record.transport))
    }

    /// Store a new sample. Returns false (and writes nothing) when the record
    /// was removed, replaced or stopped.
    pub fn update_metrics(&self, handle: &RecordHandle, metrics: ConnectionMetrics) -> bool {
        match self.records.get_mut(&handle.id) {
            Some(mut record) if Self::owns(&record, handle) => {
                record.metrics = Some(metrics);
                record.last_sampled_at = Some(Instant::now());
                true
            }
            _ => false,
        }
    }

    /// Apply a bitrate target and remember it, holding the record's entry
    /// lock throughout so a concurrent [`remove`](Self::remove) either waits
    /// for `apply` to finish or prevents it from running. Returns `None`
    /// (and runs nothing) when the record was removed, replaced or stopped.
    pub fn apply_target<R>(&self, handle: &RecordHandle, kbps: u32, apply: impl FnOnce(u32) -> R) -> Option<R> {
        match self.records.get_mut(&handle.id) {
            Some(mut record) if Self::owns(&record, handle) => {
                let applied = apply(kbps);
                record.last_target_kbps = Some(kbps);
                Some(applied)
            }
            _ => None,
        }
    }

    /// Transition the record to [`MonitorState::Stopped`], keeping its last sample
    pub fn mark_stopped(&self, handle: &RecordHandle) {
        if let Some(mut record) = self.records.get_mut(&handle.id) {
            if record.epoch == handle.epoch {
                record.state = MonitorState::Stopped;
                record.cancel.cancel();
            }
        }
    }

    #[must_use]
    pub fn state(&self, id: &ConnectionId) -> Option<MonitorState> {
        self.records.get(id).map(|record| record.state)
    }

    #[must_use]
    pub fn last_target(&self, id: &ConnectionId) -> Option<u32> {
        self.records.get(id).and_then(|record| record.last_target_kbps)
    }

    #[must_use]
    pub fn last_sampled_at(&self, id: &ConnectionId) -> Option<Instant> {
        self.records.get(id).and_then(|record| record.last_sampled_at)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }

    #[must_use]
    pub fn all_metrics(&self) -> Vec<(ConnectionId, ConnectionMetrics)> {
        self.records
            .iter()
            .filter_map(|entry| entry.value().metrics.map(|m| (entry.key().clone(), m)))
            .collect()
    }

    /// Remove every stopped record, returning their transports
    pub fn remove_stopped(&self) -> Vec<(ConnectionId, Arc<dyn Transport>)> {
        let stopped: Vec<ConnectionId> = self
            .records
            .iter()
            .filter(|entry| entry.value().state == MonitorState::Stopped)
            .map(|entry| entry.key().clone())
            .collect();

        stopped
            .into_iter()
            .filter_map(|id| {
                self.records
                    .remove_if(&id, |_, record| record.state == MonitorState::Stopped)
                    .map(|(id, record)| (id, record.transport))
            })
            .collect()
    }

    /// Remove every record, cancelling all loops
    pub fn drain(&self) -> Vec<(ConnectionId, Arc<dyn Transport>)> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.remove(&id).map(|transport| (id, transport)))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn owns(record: &ConnectionRecord, handle: &RecordHandle) -> bool {
        record.epoch == handle.epoch
            && record.state == MonitorState::Running
            && !record.cancel.is_cancelled()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
