//! The capability interface that abstracts the WebRTC engine (§9 "Dynamic
//! runtime loading of the WebRTC engine"). The session manager depends only
//! on these traits; `webrtc_engine` provides the real implementation behind
//! the `webrtc-engine` feature, and [`FakeEngine`] backs tests that don't
//! need a real network stack.

use async_trait::async_trait;
use friday_voice_core::AudioFrame;
use tokio::sync::mpsc;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events the engine pushes to the session manager asynchronously, off the
/// capture thread (§4.2 peer-connection callbacks, §9 "Callback-driven
/// audio").
#[derive(Debug, Clone)]
pub enum TransportEvent {
    IceCandidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    },
    ConnectionStateChanged(ConnectionState),
    /// A decoded, downmixed-ready inbound audio frame from the remote track.
    InboundAudioFrame(AudioFrame),
    /// The remote track ended; the session manager stops the sink.
    TrackEnded,
}

pub struct SessionContext {
    pub room_id: String,
    pub user_peer_id: String,
    pub bot_peer_id: String,
}

/// One live WebRTC session: a peer connection plus its sendonly audio track.
#[async_trait]
pub trait WebRtcSession: Send + Sync {
    /// Apply the remote offer and create + set the local answer, returning
    /// its SDP (§4.2 step 5).
    async fn accept_offer(&self, offer_sdp: &str) -> Result<String, TransportError>;

    /// Add a remote ICE candidate (§4.2 "Candidate handling").
    async fn add_ice_candidate(
        &self,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_mline_index: Option<u16>,
    ) -> Result<(), TransportError>;

    /// Push one outbound PCM-16 mono frame at the playback sample rate onto
    /// the track (§4.5). Called once per pacer tick.
    async fn push_audio_frame(&self, samples: &[i16], sample_rate: u32) -> Result<(), TransportError>;

    /// Tear down the peer connection, track, and sink (§4.2 teardown).
    async fn close(&self) -> Result<(), TransportError>;
}

/// Resolved once at startup behind an `Arc<dyn WebRtcEngine>` (§9).
#[async_trait]
pub trait WebRtcEngine: Send + Sync {
    /// `false` when the native media stack failed to load; `createSession`
    /// must then report `wrtc_unavailable` for every offer (§4.2 step 3).
    fn is_available(&self) -> bool;

    async fn create_session(
        &self,
        ctx: SessionContext,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn WebRtcSession>, TransportError>;
}

/// A `WebRtcEngine` that refuses every session, used when the crate is built
/// without the `webrtc-engine` feature.
pub struct UnavailableEngine;

#[async_trait]
impl WebRtcEngine for UnavailableEngine {
    fn is_available(&self) -> bool {
        false
    }

    async fn create_session(
        &self,
        _ctx: SessionContext,
        _events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn WebRtcSession>, TransportError> {
        Err(TransportError::EngineUnavailable)
    }
}

/// In-memory engine for tests (§10.4): no real ICE/DTLS, accepts any offer
/// and echoes back a synthetic SDP answer, records pushed audio frames.
pub struct FakeEngine;

#[async_trait]
impl WebRtcEngine for FakeEngine {
    fn is_available(&self) -> bool {
        true
    }

    async fn create_session(
        &self,
        _ctx: SessionContext,
        _events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn WebRtcSession>, TransportError> {
        Ok(Box::new(FakeSession {
            closed: parking_lot::Mutex::new(false),
        }))
    }
}

struct FakeSession {
    closed: parking_lot::Mutex<bool>,
}

#[async_trait]
impl WebRtcSession for FakeSession {
    async fn accept_offer(&self, offer_sdp: &str) -> Result<String, TransportError> {
        Ok(format!("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\na=fake-answer-to:{}\r\n", offer_sdp.len()))
    }

    async fn add_ice_candidate(
        &self,
        _candidate: &str,
        _sdp_mid: Option<&str>,
        _sdp_mline_index: Option<u16>,
    ) -> Result<(), TransportError> {
        if *self.closed.lock() {
            return Err(TransportError::SessionClosed);
        }
        Ok(())
    }

    async fn push_audio_frame(&self, _samples: &[i16], _sample_rate: u32) -> Result<(), TransportError> {
        if *self.closed.lock() {
            return Err(TransportError::SessionClosed);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        *self.closed.lock() = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_engine_accepts_offers() {
        let engine = FakeEngine;
        let (tx, _rx) = mpsc::channel(8);
        let session = engine
            .create_session(
                SessionContext {
                    room_id: "room".into(),
                    user_peer_id: "user".into(),
                    bot_peer_id: "friday-voice-bot-1".into(),
                },
                tx,
            )
            .await
            .unwrap();
        let answer = session.accept_offer("v=0...").await.unwrap();
        assert!(answer.starts_with("v=0"));
    }

    #[tokio::test]
    async fn unavailable_engine_refuses_sessions() {
        let engine = UnavailableEngine;
        assert!(!engine.is_available());
        let (tx, _rx) = mpsc::channel(8);
        let result = engine
            .create_session(
                SessionContext {
                    room_id: "room".into(),
                    user_peer_id: "user".into(),
                    bot_peer_id: "friday-voice-bot-1".into(),
                },
                tx,
            )
            .await;
        assert!(matches!(result, Err(TransportError::EngineUnavailable)));
    }
}
