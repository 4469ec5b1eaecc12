//! Process-wide registries (§9 "Global state"): the subscriber table and the
//! pending-candidate buffer, plus the top-level `AppState` that owns every
//! other shared component and is handed to axum as `State<AppState>`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use friday_voice_config::Settings;
use friday_voice_core::chat::ChatLog;
use friday_voice_core::IceCandidateDescriptor;
use friday_voice_transport::WebRtcEngine;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::collaborators::CollaboratorBackends;
use crate::session_manager::SessionManager;

type RoomPeer = (String, String);

/// One frame pushed to a subscriber's SSE stream (§4.1 wire framing).
#[derive(Debug, Clone)]
pub enum SseMessage {
    /// The stream's own opening `event: ready\ndata: <JSON>\n\n` line.
    Ready(serde_json::Value),
    /// A plain `data: <JSON>\n\n` line.
    Data(serde_json::Value),
}

/// Mapping `(roomId, peerId) -> set of live stream handles` (§3). Each
/// handle is an unbounded channel; the receiving end lives in the SSE
/// response stream and is dropped (deregistering itself) on cancel.
#[derive(Default)]
pub struct SubscriberTable {
    subscribers: RwLock<HashMap<RoomPeer, HashMap<Uuid, mpsc::UnboundedSender<SseMessage>>>>,
}

impl SubscriberTable {
    pub fn register(
        &self,
        room_id: &str,
        peer_id: &str,
    ) -> (Uuid, mpsc::UnboundedSender<SseMessage>, mpsc::UnboundedReceiver<SseMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .write()
            .entry((room_id.to_string(), peer_id.to_string()))
            .or_default()
            .insert(id, tx.clone());
        (id, tx, rx)
    }

    pub fn deregister(&self, room_id: &str, peer_id: &str, id: Uuid) {
        let mut subscribers = self.subscribers.write();
        let key = (room_id.to_string(), peer_id.to_string());
        if let Some(handles) = subscribers.get_mut(&key) {
            handles.remove(&id);
            if handles.is_empty() {
                subscribers.remove(&key);
            }
        }
    }

    /// Push `message` to every live subscriber at `(room_id, peer_id)`.
    /// Dead handles are pruned silently; never propagates to siblings.
    pub fn publish(&self, room_id: &str, peer_id: &str, message: SseMessage) {
        let key = (room_id.to_string(), peer_id.to_string());
        let mut subscribers = self.subscribers.write();
        if let Some(handles) = subscribers.get_mut(&key) {
            handles.retain(|_, tx| tx.send(message.clone()).is_ok());
            if handles.is_empty() {
                subscribers.remove(&key);
            }
        }
    }
}

const PENDING_CANDIDATE_BOUND: usize = friday_voice_config::constants::pending_candidates::BOUND;

/// Mapping `(roomId, userPeerId) -> bounded ordered sequence of ICE
/// candidates` (§3), drained once the paired session's remote description
/// is set.
#[derive(Default)]
pub struct PendingCandidateBuffer {
    buffers: RwLock<HashMap<RoomPeer, VecDeque<IceCandidateDescriptor>>>,
}

impl PendingCandidateBuffer {
    pub fn push(&self, room_id: &str, user_peer_id: &str, candidate: IceCandidateDescriptor) {
        let mut buffers = self.buffers.write();
        let queue = buffers.entry((room_id.to_string(), user_peer_id.to_string())).or_default();
        queue.push_back(candidate);
        while queue.len() > PENDING_CANDIDATE_BOUND {
            queue.pop_front();
        }
    }

    pub fn drain(&self, room_id: &str, user_peer_id: &str) -> Vec<IceCandidateDescriptor> {
        self.buffers
            .write()
            .remove(&(room_id.to_string(), user_peer_id.to_string()))
            .map(|queue| queue.into_iter().collect())
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub subscribers: Arc<SubscriberTable>,
    pub pending_candidates: Arc<PendingCandidateBuffer>,
    pub chat_log: Arc<ChatLog>,
    pub sessions: Arc<SessionManager>,
    pub webrtc_engine: Arc<dyn WebRtcEngine>,
    pub collaborators: Arc<CollaboratorBackends>,
}

impl AppState {
    pub fn new(settings: Settings, webrtc_engine: Arc<dyn WebRtcEngine>) -> Self {
        let settings = Arc::new(settings);
        let subscribers = Arc::new(SubscriberTable::default());
        let pending_candidates = Arc::new(PendingCandidateBuffer::default());
        let chat_log = Arc::new(ChatLog::new());
        let collaborators = Arc::new(CollaboratorBackends::build(&settings.collaborators));
        let sessions = SessionManager::new(
            settings.clone(),
            subscribers.clone(),
            pending_candidates.clone(),
            chat_log.clone(),
            webrtc_engine.clone(),
            collaborators.clone(),
        );

        Self {
            settings,
            subscribers,
            pending_candidates,
            chat_log,
            sessions,
            webrtc_engine,
            collaborators,
        }
    }
}
