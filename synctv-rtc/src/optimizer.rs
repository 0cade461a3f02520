//! RTC Optimizer - caller-facing entry point
//!
//! This module provides:
//! - Optimized connection creation with per-connection monitor loops
//! - Non-blocking access to the latest quality sample
//! - Idempotent teardown
//! - Pruning of connections whose transport failed or closed on its own

use crate::config::{ConfigOverride, OptimizationConfig, RtcConfig};
use crate::error::{Error, Result};
use crate::logging::init_logging;
use crate::metrics::ConnectionMetrics;
use crate::monitor::ConnectionMonitor;
use crate::quality::QualityReport;
use crate::registry::{ConnectionRegistry, MonitorState};
use crate::transport::{Transport, TransportFactory};
use crate::types::ConnectionId;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Adapts outbound video bitrate for a dynamic set of peer connections
pub struct RtcOptimizer {
    /// Base configuration, overridable per connection
    config: Arc<OptimizationConfig>,

    factory: Arc<dyn TransportFactory>,

    registry: Arc<ConnectionRegistry>,
}

impl RtcOptimizer {
    /// Create a new optimizer
    pub fn new(config: OptimizationConfig, factory: Arc<dyn TransportFactory>) -> Result<Self> {
        config.validate()?;

        info!(
            preferred_codec = %config.preferred_codec,
            adaptive_bitrate = config.enable_adaptive_bitrate,
            max_bandwidth_kbps = config.max_bandwidth_kbps,
            sample_interval_ms = config.sample_interval_ms,
            "RTC optimizer initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            factory,
            registry: Arc::new(ConnectionRegistry::new()),
        })
    }

    /// Service startup: load [`RtcConfig`] from `config_file` and
    /// `SYNCTV_RTC_*` variables, install logging, then build the optimizer.
    pub fn bootstrap(config_file: Option<&str>, factory: Arc<dyn TransportFactory>) -> anyhow::Result<Self> {
        let config = RtcConfig::load(config_file)?;
        init_logging(&config.logging)?;
        Ok(Self::new(config.optimizer, factory)?)
    }

    /// Create a transport for `id`, register it and start monitoring it.
    ///
    /// Fails while `id` is registered and its monitor is running.
    pub async fn create_optimized_connection(
        &self,
        id: impl Into<ConnectionId>,
        overrides: Option<ConfigOverride>,
    ) -> Result<Arc<dyn Transport>> {
        let id = id.into();

        let config = match overrides {
            Some(overrides) => {
                let merged = self.config.merged(&overrides);
                merged.validate()?;
                Arc::new(merged)
            }
            None => Arc::clone(&self.config),
        };

        if self.registry.is_live(&id) {
            warn!(connection_id = %id, "Connection already exists");
            return Err(Error::AlreadyExists(format!("connection {id}")));
        }

        let transport = self.factory.create(&id, &config).await?;

        // re-checked atomically: a concurrent create may have won meanwhile
        let registration = match self.registry.register(id.clone(), Arc::clone(&transport)) {
            Ok(registration) => registration,
            Err(e) => {
                warn!(connection_id = %id, "Lost registration race, discarding transport");
                close_transport(&id, transport.as_ref()).await;
                return Err(e);
            }
        };

        if let Some(replaced) = registration.replaced {
            debug!(connection_id = %id, "Closing transport of stopped connection");
            close_transport(&id, replaced.as_ref()).await;
        }

        ConnectionMonitor::new(Arc::clone(&self.registry), registration.handle, config).spawn();

        info!(
            connection_id = %id,
            total_connections = self.registry.len(),
            "Created optimized connection"
        );

        Ok(transport)
    }

    /// Latest sample for `id`; `None` if unknown, closed, or not sampled yet
    #[must_use]
    pub fn get_metrics(&self, id: &ConnectionId) -> Option<ConnectionMetrics> {
        self.registry.get(id)
    }

    /// Quality score and suggested action for `id`
    #[must_use]
    pub fn get_quality(&self, id: &ConnectionId) -> Option<QualityReport> {
        self.registry.get(id).map(QualityReport::from_metrics)
    }

    /// Close and forget `id`. Unknown or already closed ids are a no-op.
    pub async fn close_connection(&self, id: &ConnectionId) {
        if let Some(transport) = self.registry.remove(id) {
            close_transport(id, transport.as_ref()).await;
            info!(
                connection_id = %id,
                remaining_connections = self.registry.len(),
                "Closed connection"
            );
        } else {
            debug!(connection_id = %id, "Connection not found when closing");
        }
    }

    /// Remove connections whose monitor stopped on a terminal transport state
    pub async fn prune_stopped(&self) -> usize {
        let removed = self.registry.remove_stopped();
        let count = removed.len();

        for (id, transport) in removed {
            close_transport(&id, transport.as_ref()).await;
            debug!(connection_id = %id, "Pruned stopped connection");
        }

        if count > 0 {
            info!(
                removed_count = count,
                remaining_connections = self.registry.len(),
                "Pruned stopped connections"
            );
        }

        count
    }

    /// Close every connection
    pub async fn shutdown(&self) {
        let drained = self.registry.drain();
        let count = drained.len();

        join_all(
            drained
                .iter()
                .map(|(id, transport)| close_transport(id, transport.as_ref())),
        )
        .await;

        info!(closed_connections = count, "RTC optimizer shut down");
    }

    /// Monitor state of `id`
    #[must_use]
    pub fn connection_status(&self, id: &ConnectionId) -> Option<MonitorState> {
        self.registry.state(id)
    }

    /// Bitrate last applied to the video senders of `id`
    #[must_use]
    pub fn last_target_bitrate(&self, id: &ConnectionId) -> Option<u32> {
        self.registry.last_target(id)
    }

    #[must_use]
    pub fn all_metrics(&self) -> Vec<(ConnectionId, ConnectionMetrics)> {
        self.registry.all_metrics()
    }

    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.registry.ids()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }
}

async fn close_transport(id: &ConnectionId, transport: &dyn Transport) {
    if let Err(e) = transport.close().await {
        error!(connection_id = %id, error = %e, "Failed to close transport");
    }
}
