//! WebRTC engine capability interface (§9) for the voice bridge's session
//! manager. Real media handling lives behind the `webrtc-engine` feature;
//! without it, [`engine::UnavailableEngine`] backs every session request.

pub mod codec;
pub mod engine;
pub mod error;
pub mod webrtc_engine;

pub use engine::{ConnectionState, SessionContext, TransportEvent, WebRtcEngine, WebRtcSession};
pub use error::TransportError;

use std::sync::Arc;

/// Resolve the engine implementation at startup (§9). Returns the real
/// engine when built with `webrtc-engine`, otherwise an engine that reports
/// `wrtc_unavailable` for every offer.
pub fn resolve_engine(ice_servers: Vec<String>) -> Arc<dyn WebRtcEngine> {
    #[cfg(feature = "webrtc-engine")]
    {
        Arc::new(webrtc_engine::RealWebRtcEngine::new(ice_servers))
    }
    #[cfg(not(feature = "webrtc-engine"))]
    {
        let _ = ice_servers;
        Arc::new(engine::UnavailableEngine)
    }
}
