//! The signaling hub (§4.1): SSE fan-out keyed by `(roomId, peerId)`, plus
//! the relay policy that routes `bye`/server-bot/plain signals.

use std::sync::Arc;

use async_trait::async_trait;
use friday_voice_core::signal::{is_server_bot_peer, SignalEvent, SignalType};
use tracing::warn;

use crate::state::{AppState, SseMessage, SubscriberTable};

/// Broadcasts a `SignalEvent` to the subscribers registered at its `to`.
/// Holds only the subscriber table (not the full `AppState`) so the session
/// manager can own a `Hub` without a construction cycle through `AppState`.
pub struct Hub {
    subscribers: Arc<SubscriberTable>,
}

impl Hub {
    pub fn new(subscribers: Arc<SubscriberTable>) -> Self {
        Self { subscribers }
    }

    /// Fan the event out to every subscriber at `(roomId, to)`. Events
    /// without a `to` are never published (§4.1 "Events without `to` are
    /// dropped").
    pub fn emit(&self, event: &SignalEvent) {
        let Some(to) = &event.to else {
            return;
        };
        let value = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "failed to serialise signal event, dropping");
                return;
            }
        };
        self.subscribers.publish(&event.room_id, to, SseMessage::Data(value));
    }
}

/// Wraps [`Hub`] so the turn pipeline can emit `assistant`/`system` events
/// back through signaling without depending on this crate.
pub struct HubEventSink {
    hub: std::sync::Arc<Hub>,
}

impl HubEventSink {
    pub fn new(hub: std::sync::Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl friday_voice_pipeline::TurnEventSink for HubEventSink {
    async fn emit(&self, event: SignalEvent) {
        self.hub.emit(&event);
    }
}

/// Implements the §4.1 relay policy for an inbound `SignalEvent` posted to
/// `/api/webrtc/signal`.
pub async fn relay_signal(state: &AppState, event: SignalEvent) {
    if event.kind == SignalType::Bye {
        state.sessions.close(&event.room_id, &event.from).await;
        if let Some(to) = &event.to {
            state.sessions.close(&event.room_id, to).await;
        }
        // Fall through: the remote side still needs to observe the bye.
    }

    let Some(to) = event.to.clone() else {
        return;
    };

    if is_server_bot_peer(&to) {
        state.sessions.clone().handle_bot_signal(event).await;
        return;
    }

    state.subscribers.publish(
        &event.room_id,
        &to,
        SseMessage::Data(serde_json::to_value(&event).unwrap_or(serde_json::Value::Null)),
    );
}
