//! Bitrate decision
//!
//! - Loss above 2%: back off to 80% of the ceiling
//! - Loss below 0.5% and RTT below 50ms: probe to 110% of the ceiling
//! - Otherwise: the ceiling itself
//!
//! The decision always starts from the configured ceiling, never from the
//! previous target, so repeated ticks do not compound. Bandwidth and jitter
//! are not inputs.

use crate::config::OptimizationConfig;
use crate::metrics::ConnectionMetrics;

const HIGH_LOSS_THRESHOLD: f64 = 0.02;
const LOW_LOSS_THRESHOLD: f64 = 0.005;
const LOW_LATENCY_MS: f64 = 50.0;

const BACKOFF_FACTOR: f64 = 0.8;
const PROBE_FACTOR: f64 = 1.1;

/// Target outbound video bitrate (kbps) for the given sample
#[must_use]
pub fn decide(config: &OptimizationConfig, metrics: &ConnectionMetrics) -> f64 {
    let base = f64::from(config.max_bandwidth_kbps);

    if metrics.packet_loss > HIGH_LOSS_THRESHOLD {
        base * BACKOFF_FACTOR
    } else if metrics.packet_loss < LOW_LOSS_THRESHOLD && metrics.latency_ms < LOW_LATENCY_MS {
        base * PROBE_FACTOR
    } else {
        base
    }
}

/// Round a decided target to whole kbps for a sender
#[must_use]
pub fn to_kbps(target: f64) -> u32 {
    if target.is_finite() && target > 0.0 {
        target.round().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(packet_loss: f64, latency_ms: f64) -> ConnectionMetrics {
        ConnectionMetrics {
            packet_loss,
            latency_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_high_loss_backs_off() {
        let config = OptimizationConfig::default();
        for loss in [0.021, 0.05, 0.5, 1.0] {
            assert_eq!(decide(&config, &sample(loss, 10.0)), 2500.0 * 0.8);
        }
        // latency does not matter once loss is high
        assert_eq!(decide(&config, &sample(0.03, 400.0)), 2500.0 * 0.8);
    }

    #[test]
    fn test_clean_link_probes_up() {
        let config = OptimizationConfig::default();
        for (loss, latency) in [(0.0, 0.0), (0.004, 49.9), (0.001, 20.0)] {
            assert_eq!(decide(&config, &sample(loss, latency)), 2500.0 * 1.1);
        }
    }

    #[test]
    fn test_middle_band_holds_ceiling() {
        let config = OptimizationConfig::default();
        assert_eq!(decide(&config, &sample(0.01, 80.0)), 2500.0);
        // low loss but slow path
        assert_eq!(decide(&config, &sample(0.001, 50.0)), 2500.0);
        // exactly on the high threshold is not "above"
        assert_eq!(decide(&config, &sample(0.02, 10.0)), 2500.0);
    }

    #[test]
    fn test_bandwidth_and_jitter_ignored() {
        let config = OptimizationConfig {
            max_bandwidth_kbps: 1000,
            ..Default::default()
        };
        let metrics = ConnectionMetrics {
            latency_ms: 80.0,
            bandwidth_kbps: 10.0,
            packet_loss: 0.01,
            jitter: 500.0,
        };
        assert_eq!(decide(&config, &metrics), 1000.0);
    }

    #[test]
    fn test_decide_does_not_compound() {
        let config = OptimizationConfig::default();
        let metrics = sample(0.0, 10.0);
        let first = decide(&config, &metrics);
        let second = decide(&config, &metrics);
        assert_eq!(first, second);
    }

    #[test]
    fn test_to_kbps() {
        assert_eq!(to_kbps(2750.0), 2750);
        assert_eq!(to_kbps(2000.4), 2000);
        assert_eq!(to_kbps(-1.0), 0);
        assert_eq!(to_kbps(f64::NAN), 0);
    }
}
