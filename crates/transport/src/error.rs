use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("webrtc engine unavailable (built without the webrtc-engine feature, or native init failed)")]
    EngineUnavailable,

    #[error("peer connection error: {0}")]
    PeerConnection(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("session already closed")]
    SessionClosed,
}
