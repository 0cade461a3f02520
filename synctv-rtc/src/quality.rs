//! Connection quality score
//!
//! ## Quality Score
//! - 5: Excellent
//! - 1: Bad
//! - 0: Unknown / No data
//!
//! RTT, loss and bandwidth each subtract from 5; the result is clamped to 1..=5.
//! A bandwidth of zero means "not reported" and carries no penalty.

use crate::metrics::ConnectionMetrics;
use serde::{Deserialize, Serialize};

/// Suggested quality action based on network conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityAction {
    /// No action needed
    None,
    /// Switch to a lower quality layer
    ReduceQuality,
    /// Reduce framerate (e.g., 30fps -> 15fps)
    ReduceFramerate,
    /// Disable video, audio only
    AudioOnly,
}

/// Quality signal derived from the latest sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: u8,
    pub action: QualityAction,
    pub metrics: ConnectionMetrics,
}

impl QualityReport {
    #[must_use]
    pub fn from_metrics(metrics: ConnectionMetrics) -> Self {
        if metrics.is_empty() {
            return Self {
                score: 0,
                action: QualityAction::None,
                metrics,
            };
        }

        Self {
            score: quality_score(&metrics),
            action: quality_action(&metrics),
            metrics,
        }
    }
}

fn quality_score(metrics: &ConnectionMetrics) -> u8 {
    let mut score: i8 = 5;

    if metrics.latency_ms >= 300.0 {
        score -= 2;
    } else if metrics.latency_ms >= 200.0 {
        score -= 1;
    }

    if metrics.packet_loss >= 0.15 {
        score -= 3;
    } else if metrics.packet_loss >= 0.10 {
        score -= 2;
    } else if metrics.packet_loss >= 0.05 {
        score -= 1;
    }

    if metrics.bandwidth_kbps > 0.0 {
        if metrics.bandwidth_kbps < 300.0 {
            score -= 2;
        } else if metrics.bandwidth_kbps < 500.0 {
            score -= 1;
        }
    }

    // 0 is reserved for an empty sample
    score.clamp(1, 5) as u8
}

fn quality_action(metrics: &ConnectionMetrics) -> QualityAction {
    if metrics.packet_loss > 0.20 {
        QualityAction::AudioOnly
    } else if metrics.packet_loss > 0.10 {
        QualityAction::ReduceQuality
    } else if metrics.bandwidth_kbps > 0.0 && metrics.bandwidth_kbps < 500.0 {
        QualityAction::ReduceFramerate
    } else {
        QualityAction::None
    }
}
