//! Per-connection monitor loop
//!
//! Each registered connection gets its own task. On every tick it:
//!
//! 1. pulls a stats snapshot from the transport
//! 2. aggregates it and, with adaptive bitrate on, decides a target
//! 3. stores the sample in the registry
//! 4. applies the target to the transport's video senders
//! 5. stops for good if the transport reports closed or failed
//!
//! The loop is `Running` until its token is cancelled (by `close_connection`)
//! or the transport reaches a terminal state; `Stopped` is final.

use crate::config::OptimizationConfig;
use crate::controller::{decide, to_kbps};
use crate::registry::{ConnectionRegistry, RecordHandle};
use crate::stats::{aggregate, StatsReport};
use crate::transport::{apply_video_bitrate, ConnectionState, Transport};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

/// Why a tick ended the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// Close requested, or the record was removed or replaced
    Cancelled,
    /// Transport reached a terminal state
    Terminal(ConnectionState),
}

pub struct ConnectionMonitor {
    registry: Arc<ConnectionRegistry>,
    handle: RecordHandle,
    config: Arc<OptimizationConfig>,
}

impl ConnectionMonitor {
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, handle: RecordHandle, config: Arc<OptimizationConfig>) -> Self {
        Self {
            registry,
            handle,
            config,
        }
    }

    /// Start the loop on the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        let span = info_span!("rtc_monitor", connection_id = %self.handle.id);
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(self) {
        let period = self.config.sample_interval();
        // first sample only after a full interval of uptime
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.handle.cancel.clone();

        debug!(interval_ms = self.config.sample_interval_ms, "Monitor loop started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Monitor loop cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            // the transport is only held for the duration of one tick
            let Some(transport) = self.registry.transport(&self.handle) else {
                debug!("Connection record gone, monitor loop exiting");
                return;
            };

            if let Err(stop) = self.tick(transport.as_ref()).await {
                self.stop(stop);
                return;
            }
        }
    }

    async fn tick(&self, transport: &dyn Transport) -> Result<(), Stop> {
        let state = transport.connection_state();
        if state.is_terminal() {
            return Err(Stop::Terminal(state));
        }
        if self.handle.cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        match transport.stats_snapshot().await {
            Ok(snapshot) => self.sample(transport, &snapshot).await?,
            Err(e) => {
                warn!(error = %e, "Failed to get stats, keeping previous sample");
            }
        }

        let state = transport.connection_state();
        if state.is_terminal() {
            return Err(Stop::Terminal(state));
        }
        Ok(())
    }

    async fn sample(&self, transport: &dyn Transport, snapshot: &[StatsReport]) -> Result<(), Stop> {
        let metrics = aggregate(snapshot);

        // an empty sample is no signal, never a reason to probe upward
        let target = (self.config.enable_adaptive_bitrate && !metrics.is_empty())
            .then(|| to_kbps(decide(&self.config, &metrics)));

        if !self.registry.update_metrics(&self.handle, metrics) {
            return Err(Stop::Cancelled);
        }

        debug!(
            latency_ms = metrics.latency_ms,
            bandwidth_kbps = metrics.bandwidth_kbps,
            packet_loss = metrics.packet_loss,
            jitter = metrics.jitter,
            target_kbps = ?target,
            "Connection sampled"
        );

        if let Some(kbps) = target {
            let senders = transport.outbound_senders().await;
            let Some(applied) = self
                .registry
                .apply_target(&self.handle, kbps, |kbps| apply_video_bitrate(&senders, kbps))
            else {
                return Err(Stop::Cancelled);
            };
            debug!(target_kbps = kbps, video_senders = applied, "Applied target bitrate");
        }

        Ok(())
    }

    fn stop(&self, stop: Stop) {
        match stop {
            Stop::Cancelled => debug!("Monitor loop cancelled mid-tick"),
            Stop::Terminal(state) => {
                self.registry.mark_stopped(&self.handle);
                info!(state = ?state, "Transport reached terminal state, monitor stopped");
            }
        }
    }
}
