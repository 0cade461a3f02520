//! `SyncTV` RTC connection optimizer
//!
//! Samples transport statistics of every registered peer connection on a
//! fixed cadence, derives a quality sample per connection, and adapts the
//! outbound video bitrate to keep each connection inside loss/latency bounds.
//!
//! ## Architecture
//!
//! - **`stats`**: folds a raw transport snapshot into [`ConnectionMetrics`]
//! - **`controller`**: pure bitrate decision from config + metrics
//! - **`ConnectionRegistry`**: id → transport, latest sample, cancellation
//! - **`ConnectionMonitor`**: one cancellable periodic task per connection
//! - **`RtcOptimizer`**: create / query / close surface for callers
//!
//! Connections are optimized independently; there is no shared bandwidth
//! budget and no ordering between monitor loops.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use synctv_rtc::{RtcOptimizer, WebRtcTransportFactory};
//!
//! let factory = Arc::new(WebRtcTransportFactory::new()?);
//! // loads rtc.toml + SYNCTV_RTC_* and installs logging
//! let optimizer = RtcOptimizer::bootstrap(Some("rtc.toml"), factory)?;
//!
//! let transport = optimizer.create_optimized_connection("peer-1", None).await?;
//! let metrics = optimizer.get_metrics(&"peer-1".into());
//! optimizer.close_connection(&"peer-1".into()).await;
//! ```

mod config;
pub mod controller;
mod error;
pub mod logging;
mod metrics;
mod monitor;
mod optimizer;
mod quality;
mod registry;
pub mod stats;
pub mod test_helpers;
mod transport;
mod types;
mod webrtc_transport;

pub use config::{ConfigOverride, IceServerConfig, LogFormat, LoggingConfig, OptimizationConfig, RtcConfig};
pub use error::{Error, Result};
pub use metrics::ConnectionMetrics;
pub use monitor::ConnectionMonitor;
pub use optimizer::RtcOptimizer;
pub use quality::{QualityAction, QualityReport};
pub use registry::{ConnectionRegistry, MonitorState, RecordHandle, Registration};
pub use stats::{aggregate, StatsReport, StatsSnapshot};
pub use transport::{apply_video_bitrate, ConnectionState, OutboundSender, Transport, TransportFactory};
pub use types::{ConnectionId, MediaKind};
pub use webrtc_transport::{WebRtcTransport, WebRtcTransportFactory};
