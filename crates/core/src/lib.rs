//! Shared domain types for the voice bridge.
//!
//! Nothing in this crate touches the network or the WebRTC engine; it holds
//! the plain data that flows between the signaling hub, the session manager,
//! and the turn pipeline.

pub mod audio;
pub mod chat;
pub mod error;
pub mod signal;

pub use audio::{AudioFrame, SampleRate};
pub use chat::{ChatEntry, ChatRole};
pub use error::CoreError;
pub use signal::{IceCandidateDescriptor, SessionDescription, SessionDescriptionType, SignalEvent, SignalType};
