//! Transport collaborator interface
//!
//! The optimizer never negotiates anything itself. It reads a statistics
//! snapshot from a [`Transport`], writes bitrate targets onto its video
//! senders, and polls its connection state.

use crate::config::OptimizationConfig;
use crate::error::Result;
use crate::stats::StatsSnapshot;
use crate::types::{ConnectionId, MediaKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Peer connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Closed and failed connections never recover
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Outbound media sender of a transport
#[cfg_attr(test, mockall::automock)]
pub trait OutboundSender: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn set_target_bitrate(&self, kbps: u32);
}

/// One established (or establishing) peer connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Point-in-time statistics snapshot
    async fn stats_snapshot(&self) -> Result<StatsSnapshot>;

    async fn outbound_senders(&self) -> Vec<Arc<dyn OutboundSender>>;

    fn connection_state(&self) -> ConnectionState;

    async fn close(&self) -> Result<()>;
}

/// Builds transports from a merged optimization config
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, id: &ConnectionId, config: &OptimizationConfig) -> Result<Arc<dyn Transport>>;
}

/// Set `kbps` on every video sender; audio and data senders are left alone.
/// Returns the number of senders updated.
pub fn apply_video_bitrate(senders: &[Arc<dyn OutboundSender>], kbps: u32) -> usize {
    let mut applied = 0;
    for sender in senders.iter().filter(|s| s.kind() == MediaKind::Video) {
        sender.set_target_bitrate(kbps);
        applied += 1;
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_sender(kind: MediaKind, expected_calls: usize) -> Arc<dyn OutboundSender> {
        let mut sender = MockOutboundSender::new();
        sender.expect_kind().return_const(kind);
        sender
            .expect_set_target_bitrate()
            .withf(|kbps| *kbps == 2750)
            .times(expected_calls)
            .return_const(());
        Arc::new(sender)
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Closed.is_terminal());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(!ConnectionState::New.is_terminal());
    }

    #[test]
    fn test_apply_video_bitrate_only_touches_video() {
        let senders = vec![
            mock_sender(MediaKind::Audio, 0),
            mock_sender(MediaKind::Video, 1),
            mock_sender(MediaKind::Data, 0),
            mock_sender(MediaKind::Video, 1),
        ];

        assert_eq!(apply_video_bitrate(&senders, 2750), 2);
    }
}
