//! The signaling wire model (§3, §9 "Dynamic payloads and duck typing").
//!
//! Inbound payloads are untyped JSON until validated against one of the
//! tagged variants below; anything that doesn't match a known shape is
//! rejected rather than partially trusted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The `friday-voice-bot-` prefix that marks a peer id as a server-bot peer
/// (§4.1, glossary).
pub const SERVER_BOT_PEER_PREFIX: &str = "friday-voice-bot-";

pub fn is_server_bot_peer(peer_id: &str) -> bool {
    peer_id.starts_with(SERVER_BOT_PEER_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Offer,
    Answer,
    Candidate,
    Bye,
    Chat,
    System,
    Assistant,
}

/// A message on the signaling bus (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    #[serde(rename = "type")]
    pub kind: SignalType,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Absent on the inbound `/api/webrtc/signal` POST body (§6 documents
    /// `{type, from, to, roomId, payload?}` with no `at`); the server stamps
    /// it on receipt rather than trusting a client-supplied clock.
    #[serde(default = "Utc::now")]
    pub at: DateTime<Utc>,
}

impl SignalEvent {
    pub fn new(
        kind: SignalType,
        from: impl Into<String>,
        to: Option<String>,
        room_id: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind,
            from: from.into(),
            to,
            room_id: room_id.into(),
            payload,
            at: Utc::now(),
        }
    }

    pub fn system(from: impl Into<String>, to: impl Into<String>, room_id: impl Into<String>, message: &str) -> Self {
        Self::new(
            SignalType::System,
            from,
            Some(to.into()),
            room_id,
            Some(serde_json::json!({ "message": message })),
        )
    }
}

/// `{type, sdp}` validated from an offer/answer/pranswer payload (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionDescriptionType {
    Offer,
    Answer,
    Pranswer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SessionDescriptionType,
    pub sdp: String,
}

impl SessionDescription {
    /// Validate an opaque payload as an offer, per §4.2 step 1.
    pub fn parse_offer(payload: &serde_json::Value) -> Result<Self, CoreError> {
        let desc: SessionDescription = serde_json::from_value(payload.clone())
            .map_err(|e| CoreError::InvalidSignal(e.to_string()))?;
        if desc.kind != SessionDescriptionType::Offer {
            return Err(CoreError::InvalidSignal(format!(
                "expected an offer, got {:?}",
                desc.kind
            )));
        }
        if desc.sdp.is_empty() {
            return Err(CoreError::InvalidSignal("sdp must be non-empty".into()));
        }
        Ok(desc)
    }
}

/// `{candidate, sdpMid?, sdpMLineIndex?}` (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateDescriptor {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidateDescriptor {
    pub fn parse(payload: &serde_json::Value) -> Result<Self, CoreError> {
        serde_json::from_value(payload.clone()).map_err(|e| CoreError::InvalidSignal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_bot_prefix_detected() {
        assert!(is_server_bot_peer("friday-voice-bot-1"));
        assert!(!is_server_bot_peer("friday-voice-bot"));
        assert!(!is_server_bot_peer("alice"));
    }

    #[test]
    fn offer_payload_accepted() {
        let payload = serde_json::json!({ "type": "offer", "sdp": "v=0..." });
        assert!(SessionDescription::parse_offer(&payload).is_ok());
    }

    #[test]
    fn non_offer_payload_rejected() {
        let payload = serde_json::json!({ "type": "answer", "sdp": "v=0..." });
        assert!(SessionDescription::parse_offer(&payload).is_err());
    }

    #[test]
    fn malformed_payload_rejected() {
        let payload = serde_json::json!({ "sdp": "v=0..." });
        assert!(SessionDescription::parse_offer(&payload).is_err());
    }

    #[test]
    fn candidate_payload_roundtrips() {
        let payload = serde_json::json!({
            "candidate": "candidate:1 1 udp 2 1.2.3.4 5 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        });
        let parsed = IceCandidateDescriptor::parse(&payload).unwrap();
        assert_eq!(parsed.sdp_mid.as_deref(), Some("0"));
    }
}
