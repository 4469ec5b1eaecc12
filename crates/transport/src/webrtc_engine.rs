//! The real, `webrtc`-crate-backed [`WebRtcEngine`]. Compiled only behind
//! the `webrtc-engine` feature (§9).

#![cfg(feature = "webrtc-engine")]

use std::sync::Arc;

use async_trait::async_trait;
use friday_voice_core::AudioFrame;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::rtp_transceiver_init::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::codec::{OpusDecoder, OpusEncoder};
use crate::engine::{ConnectionState, SessionContext, TransportEvent, WebRtcEngine, WebRtcSession};
use crate::error::TransportError;

const OPUS_CAPABILITY: fn() -> RTCRtpCodecCapability = || RTCRtpCodecCapability {
    mime_type: "audio/opus".to_string(),
    clock_rate: 48_000,
    channels: 1,
    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
    rtcp_feedback: vec![],
};

pub struct RealWebRtcEngine {
    ice_servers: Vec<String>,
}

impl RealWebRtcEngine {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl WebRtcEngine for RealWebRtcEngine {
    fn is_available(&self) -> bool {
        true
    }

    async fn create_session(
        &self,
        ctx: SessionContext,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn WebRtcSession>, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: OPUS_CAPABILITY(),
                    payload_type: 111,
                    stats_id: String::new(),
                },
                RTPCodecType::Audio,
            )
            .map_err(|e| TransportError::PeerConnection(e.to_string()))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| TransportError::PeerConnection(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![webrtc::ice_transport::ice_server::RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| TransportError::PeerConnection(e.to_string()))?,
        );

        let outbound_track = Arc::new(TrackLocalStaticSample::new(
            OPUS_CAPABILITY(),
            "audio".to_string(),
            ctx.bot_peer_id.clone(),
        ));
        pc.add_transceiver_from_track(
            outbound_track.clone() as Arc<dyn TrackLocal + Send + Sync>,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendonly,
                send_encodings: vec![],
            }),
        )
        .await
        .map_err(|e| TransportError::Media(e.to_string()))?;

        let encoder = Arc::new(
            OpusEncoder::new(48_000, 1).map_err(|e| TransportError::Media(e.to_string()))?,
        );

        let events_for_state = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let tx = events_for_state.clone();
            Box::pin(async move {
                let mapped = match state {
                    RTCPeerConnectionState::New => ConnectionState::New,
                    RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                    RTCPeerConnectionState::Connected => ConnectionState::Connected,
                    RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                    RTCPeerConnectionState::Failed => ConnectionState::Failed,
                    RTCPeerConnectionState::Closed => ConnectionState::Closed,
                    _ => return,
                };
                let _ = tx.send(TransportEvent::ConnectionStateChanged(mapped)).await;
            })
        }));

        let events_for_ice = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = events_for_ice.clone();
            Box::pin(async move {
                if let Some(c) = candidate {
                    if let Ok(init) = c.to_json() {
                        let _ = tx
                            .send(TransportEvent::IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                            })
                            .await;
                    }
                }
            })
        }));

        let events_for_track = events.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let tx = events_for_track.clone();
            Box::pin(async move {
                let decoder = match OpusDecoder::new(48_000, 1) {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to build opus decoder for remote track");
                        return;
                    }
                };
                loop {
                    match track.read_rtp().await {
                        Ok((packet, _)) => {
                            if packet.payload.is_empty() {
                                continue;
                            }
                            let samples = match decoder.decode(&packet.payload) {
                                Ok(s) => s,
                                Err(_) => match decoder.decode_plc() {
                                    Ok(s) => s,
                                    Err(_) => continue,
                                },
                            };
                            let frame = AudioFrame::new(samples, 48_000, 1);
                            if tx.send(TransportEvent::InboundAudioFrame(frame)).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                let _ = tx.send(TransportEvent::TrackEnded).await;
            })
        }));

        Ok(Box::new(RealWebRtcSession {
            pc,
            outbound_track,
            encoder,
        }))
    }
}

struct RealWebRtcSession {
    pc: Arc<RTCPeerConnection>,
    outbound_track: Arc<TrackLocalStaticSample>,
    encoder: Arc<OpusEncoder>,
}

#[async_trait]
impl WebRtcSession for RealWebRtcSession {
    async fn accept_offer(&self, offer_sdp: &str) -> Result<String, TransportError> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| TransportError::PeerConnection(e.to_string()))?;
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| TransportError::PeerConnection(e.to_string()))?;
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::PeerConnection(e.to_string()))?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(|e| TransportError::PeerConnection(e.to_string()))?;
        Ok(answer.sdp)
    }

    async fn add_ice_candidate(
        &self,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_mline_index: Option<u16>,
    ) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.to_string(),
            sdp_mid: sdp_mid.map(str::to_string),
            sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| TransportError::PeerConnection(e.to_string()))
    }

    async fn push_audio_frame(&self, samples: &[i16], sample_rate: u32) -> Result<(), TransportError> {
        debug_assert_eq!(sample_rate, 48_000, "outbound track is fixed at the playback rate");
        let opus = self.encoder.encode(samples)?;
        let duration_ms = (samples.len() as u64 * 1000) / sample_rate as u64;
        let sample = Sample {
            data: opus.into(),
            duration: std::time::Duration::from_millis(duration_ms),
            ..Default::default()
        };
        self.outbound_track
            .write_sample(&sample)
            .await
            .map_err(|e| TransportError::Media(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc
            .close()
            .await
            .map_err(|e| TransportError::PeerConnection(e.to_string()))
    }
}
