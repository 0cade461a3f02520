//! Connection quality sample

use serde::{Deserialize, Serialize};

/// One normalized quality sample for a connection.
///
/// Every field is zero when the transport reported nothing for it. An
/// all-zero sample means "no signal yet", not a measured perfect link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    /// Round-trip time of the active candidate pair (ms)
    pub latency_ms: f64,
    /// Available outgoing bitrate (kbps)
    pub bandwidth_kbps: f64,
    /// Fraction of inbound packets lost (0.0 - 1.0)
    pub packet_loss: f64,
    /// Inbound jitter, in the transport's native unit
    pub jitter: f64,
}

impl ConnectionMetrics {
    /// True when no field carries a measurement
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latency_ms == 0.0
            && self.bandwidth_kbps == 0.0
            && self.packet_loss == 0.0
            && self.jitter == 0.0
    }
}
