//! Test helpers and fixtures for synctv-rtc tests
//!
//! In-memory transport doubles with scriptable statistics, connection state
//! and senders, so monitor loops can be driven without a network.

use crate::config::OptimizationConfig;
use crate::error::{Error, Result};
use crate::stats::{CandidatePairReport, CandidatePairState, InboundRtpReport, StatsReport, StatsSnapshot};
use crate::transport::{ConnectionState, OutboundSender, Transport, TransportFactory};
use crate::types::{ConnectionId, MediaKind};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Snapshot with one inbound video stream and one active candidate pair
#[must_use]
pub fn snapshot(packets_received: u64, packets_lost: i64, jitter: f64, rtt_secs: f64, outgoing_bps: f64) -> StatsSnapshot {
    vec![
        StatsReport::InboundRtp(InboundRtpReport {
            kind: Some(MediaKind::Video),
            packets_received,
            packets_lost,
            jitter,
        }),
        StatsReport::CandidatePair(CandidatePairReport {
            state: CandidatePairState::Succeeded,
            current_round_trip_time: Some(rtt_secs),
            available_outgoing_bitrate: Some(outgoing_bps),
        }),
    ]
}

/// Sender that records every target it is given
pub struct RecordingSender {
    kind: MediaKind,
    targets: Mutex<Vec<u32>>,
}

impl RecordingSender {
    #[must_use]
    pub fn new(kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            targets: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn targets(&self) -> Vec<u32> {
        self.targets.lock().clone()
    }
}

impl OutboundSender for RecordingSender {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn set_target_bitrate(&self, kbps: u32) {
        self.targets.lock().push(kbps);
    }
}

/// Scriptable in-memory transport
pub struct FakeTransport {
    snapshot: Mutex<StatsSnapshot>,
    failing: AtomicBool,
    state: Mutex<ConnectionState>,
    senders: Vec<Arc<RecordingSender>>,
    stats_calls: AtomicUsize,
    close_calls: AtomicUsize,
    /// When set, each stats call waits for a permit
    gate: Option<Semaphore>,
}

impl FakeTransport {
    /// Connected transport with one video and one audio sender and an empty snapshot
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Like [`FakeTransport::new`], but stats calls block until [`FakeTransport::release_stats`]
    #[must_use]
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(Some(Semaphore::new(0))))
    }

    fn build(gate: Option<Semaphore>) -> Self {
        Self {
            snapshot: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            state: Mutex::new(ConnectionState::Connected),
            senders: vec![
                RecordingSender::new(MediaKind::Video),
                RecordingSender::new(MediaKind::Audio),
            ],
            stats_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            gate,
        }
    }

    pub fn set_snapshot(&self, snapshot: StatsSnapshot) {
        *self.snapshot.lock() = snapshot;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Let `n` blocked or future stats calls through
    pub fn release_stats(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    #[must_use]
    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sender(&self, kind: MediaKind) -> Option<Arc<RecordingSender>> {
        self.senders.iter().find(|s| s.kind == kind).cloned()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn stats_snapshot(&self) -> Result<StatsSnapshot> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| Error::Stats(e.to_string()))?
                .forget();
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Stats("stats unavailable".to_string()));
        }
        Ok(self.snapshot.lock().clone())
    }

    async fn outbound_senders(&self) -> Vec<Arc<dyn OutboundSender>> {
        self.senders
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn OutboundSender>)
            .collect()
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Closed);
        Ok(())
    }
}

/// Factory handing out [`FakeTransport`]s and remembering the last one per id
#[derive(Default)]
pub struct FakeTransportFactory {
    transports: DashMap<ConnectionId, Arc<FakeTransport>>,
    configs: DashMap<ConnectionId, OptimizationConfig>,
    created: AtomicUsize,
    gated: bool,
    failing: AtomicBool,
}

impl FakeTransportFactory {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every created transport is [`FakeTransport::gated`]
    #[must_use]
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gated: true,
            ..Default::default()
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn transport(&self, id: &str) -> Option<Arc<FakeTransport>> {
        self.transports
            .get(&ConnectionId::from(id))
            .map(|t| Arc::clone(t.value()))
    }

    /// Config the transport for `id` was built with
    #[must_use]
    pub fn config(&self, id: &str) -> Option<OptimizationConfig> {
        self.configs.get(&ConnectionId::from(id)).map(|c| c.value().clone())
    }

    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(&self, id: &ConnectionId, config: &OptimizationConfig) -> Result<Arc<dyn Transport>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Transport("factory unavailable".to_string()));
        }

        let transport = if self.gated {
            FakeTransport::gated()
        } else {
            FakeTransport::new()
        };
        self.created.fetch_add(1, Ordering::SeqCst);
        self.transports.insert(id.clone(), Arc::clone(&transport));
        self.configs.insert(id.clone(), config.clone());
        Ok(transport as Arc<dyn Transport>)
    }
}
