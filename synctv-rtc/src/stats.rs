//! Transport statistics aggregation
//!
//! A transport snapshot is an unordered set of reports of different kinds.
//! [`aggregate`] folds the reports that matter into one [`ConnectionMetrics`]:
//!
//! - inbound RTP streams supply jitter and packet loss
//! - the succeeded candidate pair (the active path) supplies RTT and
//!   available outgoing bitrate
//!
//! Everything else is ignored, and anything missing stays zero.

use crate::metrics::ConnectionMetrics;
use crate::types::MediaKind;
use serde::{Deserialize, Serialize};

/// ICE candidate pair check state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidatePairState {
    Waiting,
    InProgress,
    Succeeded,
    Failed,
    Frozen,
}

/// Inbound media stream report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundRtpReport {
    pub kind: Option<MediaKind>,
    pub packets_received: u64,
    /// Cumulative packets lost; may be negative when duplicates arrive
    pub packets_lost: i64,
    pub jitter: f64,
}

impl InboundRtpReport {
    /// Loss as a fraction of the packets expected on this stream
    #[must_use]
    pub fn loss_ratio(&self) -> f64 {
        loss_ratio(self.packets_received, self.packets_lost)
    }
}

/// Candidate pair report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePairReport {
    pub state: CandidatePairState,
    /// Seconds
    pub current_round_trip_time: Option<f64>,
    /// Bits per second
    pub available_outgoing_bitrate: Option<f64>,
}

/// One report of a raw statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StatsReport {
    InboundRtp(InboundRtpReport),
    CandidatePair(CandidatePairReport),
    /// Any report kind the aggregator has no use for
    Other,
}

/// Point-in-time statistics snapshot of one transport
pub type StatsSnapshot = Vec<StatsReport>;

fn loss_ratio(received: u64, lost: i64) -> f64 {
    let lost = lost.max(0) as f64;
    let expected = received as f64 + lost;
    if expected > 0.0 {
        lost / expected
    } else {
        0.0
    }
}

/// Fold a snapshot into one quality sample.
///
/// Inbound streams are combined: lost and received counts are summed before
/// the ratio is taken, and jitter is the worst stream's jitter. When several
/// candidate pairs report `succeeded`, the last one in snapshot order wins.
#[must_use]
pub fn aggregate(snapshot: &[StatsReport]) -> ConnectionMetrics {
    let mut metrics = ConnectionMetrics::default();
    let mut received: u64 = 0;
    let mut lost: i64 = 0;

    for report in snapshot {
        match report {
            StatsReport::InboundRtp(inbound) => {
                received = received.saturating_add(inbound.packets_received);
                lost = lost.saturating_add(inbound.packets_lost.max(0));
                if inbound.jitter.is_finite() {
                    metrics.jitter = metrics.jitter.max(inbound.jitter);
                }
            }
            StatsReport::CandidatePair(pair) if pair.state == CandidatePairState::Succeeded => {
                metrics.latency_ms = pair
                    .current_round_trip_time
                    .map_or(0.0, |rtt| non_negative(rtt * 1000.0));
                metrics.bandwidth_kbps = pair
                    .available_outgoing_bitrate
                    .map_or(0.0, |bps| non_negative(bps / 1000.0));
            }
            StatsReport::CandidatePair(_) | StatsReport::Other => {}
        }
    }

    metrics.packet_loss = loss_ratio(received, lost);
    metrics
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded_pair(rtt: f64, bitrate: f64) -> StatsReport {
        StatsReport::CandidatePair(CandidatePairReport {
            state: CandidatePairState::Succeeded,
            current_round_trip_time: Some(rtt),
            available_outgoing_bitrate: Some(bitrate),
        })
    }

    fn inbound(received: u64, lost: i64, jitter: f64) -> StatsReport {
        StatsReport::InboundRtp(InboundRtpReport {
            kind: Some(MediaKind::Video),
            packets_received: received,
            packets_lost: lost,
            jitter,
        })
    }

    #[test]
    fn test_aggregate_empty_snapshot() {
        let metrics = aggregate(&[]);
        assert_eq!(metrics, ConnectionMetrics::default());
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_aggregate_single_stream() {
        let snapshot = vec![
            StatsReport::Other,
            inbound(970, 30, 12.0),
            succeeded_pair(0.045, 1_200_000.0),
        ];

        let metrics = aggregate(&snapshot);
        assert!((metrics.latency_ms - 45.0).abs() < 1e-9);
        assert!((metrics.bandwidth_kbps - 1200.0).abs() < 1e-9);
        assert!((metrics.packet_loss - 0.03).abs() < 1e-12);
        assert!((metrics.jitter - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_ignores_unsucceeded_pairs() {
        let snapshot = vec![
            StatsReport::CandidatePair(CandidatePairReport {
                state: CandidatePairState::InProgress,
                current_round_trip_time: Some(0.5),
                available_outgoing_bitrate: Some(100_000.0),
            }),
            StatsReport::CandidatePair(CandidatePairReport {
                state: CandidatePairState::Failed,
                current_round_trip_time: Some(0.9),
                available_outgoing_bitrate: None,
            }),
        ];

        assert!(aggregate(&snapshot).is_empty());
    }

    #[test]
    fn test_aggregate_last_succeeded_pair_wins() {
        let snapshot = vec![succeeded_pair(0.1, 500_000.0), succeeded_pair(0.02, 800_000.0)];
        let metrics = aggregate(&snapshot);
        assert!((metrics.latency_ms - 20.0).abs() < 1e-9);
        assert!((metrics.bandwidth_kbps - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_combines_inbound_streams() {
        // 10 lost out of 1000 expected in total, across two tracks
        let snapshot = vec![inbound(495, 5, 4.0), inbound(495, 5, 9.0)];
        let metrics = aggregate(&snapshot);
        assert!((metrics.packet_loss - 0.01).abs() < 1e-12);
        assert!((metrics.jitter - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_missing_fields_default_to_zero() {
        let snapshot = vec![StatsReport::CandidatePair(CandidatePairReport {
            state: CandidatePairState::Succeeded,
            current_round_trip_time: None,
            available_outgoing_bitrate: Some(f64::NAN),
        })];
        let metrics = aggregate(&snapshot);
        assert_eq!(metrics.latency_ms, 0.0);
        assert_eq!(metrics.bandwidth_kbps, 0.0);
    }

    #[test]
    fn test_negative_loss_counts_as_zero() {
        let report = InboundRtpReport {
            packets_received: 100,
            packets_lost: -3,
            ..Default::default()
        };
        assert_eq!(report.loss_ratio(), 0.0);
    }

    #[test]
    fn test_report_serde_tag() {
        let json = serde_json::to_value(inbound(1, 0, 0.0)).unwrap();
        assert_eq!(json["type"], "inbound-rtp");
    }
}
