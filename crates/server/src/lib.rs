//! Signaling hub, session manager, and HTTP/SSE surface for the voice
//! bridge (§4.1, §4.2, §6).

pub mod collaborators;
pub mod error;
pub mod http;
pub mod metrics;
pub mod session_manager;
pub mod signaling;
pub mod state;

pub use error::ServerError;
pub use http::router;
pub use state::AppState;
