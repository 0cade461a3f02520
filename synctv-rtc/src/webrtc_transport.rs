//! webrtc-rs backed transport
//!
//! Builds `RTCPeerConnection`s from an [`OptimizationConfig`] and adapts their
//! stats, senders and state to the [`Transport`] interface.
//!
//! webrtc-rs senders have no max-bitrate encoding parameter, so the target for
//! video senders is published on a `watch` channel that the encoder pipeline
//! subscribes to via [`WebRtcTransport::subscribe_video_bitrate`].

use crate::config::OptimizationConfig;
use crate::error::Result;
use crate::stats::{CandidatePairReport, CandidatePairState, InboundRtpReport, StatsReport, StatsSnapshot};
use crate::transport::{ConnectionState, OutboundSender, Transport, TransportFactory};
use crate::types::{ConnectionId, MediaKind};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice::candidate::CandidatePairState as IceCandidatePairState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::stats::StatsReportType;

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => Self::Connecting,
            RTCPeerConnectionState::Connected => Self::Connected,
            RTCPeerConnectionState::Disconnected => Self::Disconnected,
            RTCPeerConnectionState::Failed => Self::Failed,
            RTCPeerConnectionState::Closed => Self::Closed,
            _ => Self::New,
        }
    }
}

impl From<RTPCodecType> for MediaKind {
    fn from(codec_type: RTPCodecType) -> Self {
        match codec_type {
            RTPCodecType::Audio => Self::Audio,
            RTPCodecType::Video => Self::Video,
            _ => Self::Data,
        }
    }
}

fn pair_state(state: &IceCandidatePairState) -> CandidatePairState {
    match state {
        IceCandidatePairState::Succeeded => CandidatePairState::Succeeded,
        IceCandidatePairState::Failed => CandidatePairState::Failed,
        IceCandidatePairState::InProgress => CandidatePairState::InProgress,
        IceCandidatePairState::Waiting => CandidatePairState::Waiting,
        _ => CandidatePairState::Frozen,
    }
}

/// Convert a webrtc-rs report set into the crate's snapshot.
///
/// webrtc-rs reports neither loss nor jitter on local inbound streams, so
/// those carry no loss signal and are left out of the loss ratio. Loss comes
/// from remote-inbound reports: the far end's received and lost counts for
/// one of our outbound streams.
fn convert_reports<'a>(reports: impl Iterator<Item = &'a StatsReportType>) -> StatsSnapshot {
    reports
        .map(|report| match report {
            StatsReportType::RemoteInboundRTP(remote) => StatsReport::InboundRtp(InboundRtpReport {
                kind: Some(MediaKind::from(remote.kind.as_str())),
                packets_received: remote.packets_received,
                packets_lost: remote.packets_lost,
                jitter: 0.0,
            }),
            StatsReportType::CandidatePair(pair) => StatsReport::CandidatePair(CandidatePairReport {
                state: pair_state(&pair.state),
                current_round_trip_time: Some(pair.current_round_trip_time),
                available_outgoing_bitrate: Some(pair.available_outgoing_bitrate),
            }),
            _ => StatsReport::Other,
        })
        .collect()
}

/// Video sender whose target goes to the connection's bitrate channel
struct WebRtcSender {
    kind: MediaKind,
    video_bitrate: Arc<watch::Sender<Option<u32>>>,
}

impl OutboundSender for WebRtcSender {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn set_target_bitrate(&self, kbps: u32) {
        if self.kind == MediaKind::Video {
            self.video_bitrate.send_replace(Some(kbps));
        }
    }
}

pub struct WebRtcTransport {
    id: ConnectionId,
    peer_connection: Arc<RTCPeerConnection>,
    video_bitrate: Arc<watch::Sender<Option<u32>>>,
}

impl WebRtcTransport {
    #[must_use]
    pub fn new(id: ConnectionId, peer_connection: Arc<RTCPeerConnection>) -> Self {
        let (video_bitrate, _) = watch::channel(None);

        let state_id = id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(connection_id = %state_id, state = %state, "Peer connection state changed");
            Box::pin(async {})
        }));

        Self {
            id,
            peer_connection,
            video_bitrate: Arc::new(video_bitrate),
        }
    }

    /// Underlying peer connection, for signaling
    #[must_use]
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    /// Latest video target in kbps; `None` until the first decision
    #[must_use]
    pub fn subscribe_video_bitrate(&self) -> watch::Receiver<Option<u32>> {
        self.video_bitrate.subscribe()
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
    async fn stats_snapshot(&self) -> Result<StatsSnapshot> {
        let stats = self.peer_connection.get_stats().await;
        Ok(convert_reports(stats.reports.values()))
    }

    async fn outbound_senders(&self) -> Vec<Arc<dyn OutboundSender>> {
        let mut senders: Vec<Arc<dyn OutboundSender>> = Vec::new();
        for sender in self.peer_connection.get_senders().await {
            let kind = match sender.track().await {
                Some(track) => MediaKind::from(track.kind()),
                None => continue,
            };
            senders.push(Arc::new(WebRtcSender {
                kind,
                video_bitrate: Arc::clone(&self.video_bitrate),
            }));
        }
        senders
    }

    fn connection_state(&self) -> ConnectionState {
        self.peer_connection.connection_state().into()
    }

    async fn close(&self) -> Result<()> {
        debug!(connection_id = %self.id, "Closing peer connection");
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Creates webrtc-rs peer connections with default codecs and interceptors
pub struct WebRtcTransportFactory {
    api: API,
}

impl WebRtcTransportFactory {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let interceptor_registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        Ok(Self { api })
    }

    fn rtc_configuration(config: &OptimizationConfig) -> RTCConfiguration {
        let ice_servers = config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone(),
                credential: server.credential.clone(),
                ..Default::default()
            })
            .collect();

        RTCConfiguration {
            ice_servers,
            bundle_policy: RTCBundlePolicy::MaxBundle,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            ice_candidate_pool_size: config.ice_candidate_pool_size,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(&self, id: &ConnectionId, config: &OptimizationConfig) -> Result<Arc<dyn Transport>> {
        let peer_connection = Arc::new(self.api.new_peer_connection(Self::rtc_configuration(config)).await?);

        info!(
            connection_id = %id,
            ice_servers = config.ice_servers.len(),
            preferred_codec = %config.preferred_codec,
            "Created peer connection"
        );

        Ok(Arc::new(WebRtcTransport::new(id.clone(), peer_connection)))
    }
}
