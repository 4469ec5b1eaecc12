//! The per-(room, userPeer) session state machine (§4.2): offer handling,
//! candidate buffering, peer-connection callback wiring, and teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use friday_voice_config::Settings;
use friday_voice_core::chat::ChatLog;
use friday_voice_core::signal::{
    IceCandidateDescriptor, SessionDescription, SignalEvent, SignalType,
};
use friday_voice_pipeline::{
    verify_tools, PlaybackPacer, QueuedTurn, TurnQueue, TurnSegmenter, TurnWorkerContext, VadConfig,
};
use friday_voice_transport::{
    ConnectionState, SessionContext, TransportEvent, WebRtcEngine, WebRtcSession,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::collaborators::CollaboratorBackends;
use crate::signaling::{Hub, HubEventSink};
use crate::state::{PendingCandidateBuffer, SubscriberTable};

type RoomPeer = (String, String);

/// The bot's own peer id within a room; a single fixed value since one bot
/// serves every user in the (single-process) deployment (glossary,
/// `friday-voice-bot-` prefix).
pub const BOT_PEER_ID: &str = "friday-voice-bot-1";

/// One live (room, userPeer) session: the transport handle plus the turn
/// worker and event-pump tasks that feed it. The manager is its sole owner
/// (§3 "Ownership").
struct ServerCallSession {
    transport: Arc<dyn WebRtcSession>,
    vad: Mutex<TurnSegmenter>,
    turn_queue: Arc<TurnQueue>,
    pacer: Arc<PlaybackPacer>,
    turn_worker: JoinHandle<()>,
    event_pump: JoinHandle<()>,
}

pub struct SessionManager {
    settings: Arc<Settings>,
    pending_candidates: Arc<PendingCandidateBuffer>,
    chat_log: Arc<ChatLog>,
    webrtc_engine: Arc<dyn WebRtcEngine>,
    collaborators: Arc<CollaboratorBackends>,
    hub: Arc<Hub>,

    sessions: RwLock<HashMap<RoomPeer, Arc<ServerCallSession>>>,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        subscribers: Arc<SubscriberTable>,
        pending_candidates: Arc<PendingCandidateBuffer>,
        chat_log: Arc<ChatLog>,
        webrtc_engine: Arc<dyn WebRtcEngine>,
        collaborators: Arc<CollaboratorBackends>,
    ) -> Arc<Self> {
        let hub = Arc::new(Hub::new(subscribers));
        Arc::new(Self {
            settings,
            pending_candidates,
            chat_log,
            webrtc_engine,
            collaborators,
            hub,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    fn key(room_id: &str, user_peer_id: &str) -> RoomPeer {
        (room_id.to_string(), user_peer_id.to_string())
    }

    /// Dispatches a signal addressed to the server-bot peer (§4.1).
    pub async fn handle_bot_signal(self: Arc<Self>, event: SignalEvent) {
        match event.kind {
            SignalType::Offer => self.handle_offer(event).await,
            SignalType::Candidate => self.handle_candidate(event).await,
            // `answer`/`pranswer`/`chat`/`system`/`assistant` addressed to
            // the bot peer carry nothing the session manager acts on.
            _ => {}
        }
    }

    async fn handle_offer(self: Arc<Self>, event: SignalEvent) {
        let room_id = event.room_id.clone();
        let user_peer_id = event.from.clone();

        // Step 1: validate payload shape.
        let payload = event.payload.clone().unwrap_or(serde_json::Value::Null);
        let offer = match SessionDescription::parse_offer(&payload) {
            Ok(offer) => offer,
            Err(error) => {
                warn!(%error, room_id, user_peer_id, "rejecting malformed offer");
                self.emit_system(&room_id, &user_peer_id, "invalid_offer_payload");
                return;
            }
        };

        // Step 2: close any existing session for this key.
        self.close(&room_id, &user_peer_id).await;

        if !self.webrtc_engine.is_available() {
            self.emit_system(&room_id, &user_peer_id, "wrtc_unavailable");
            return;
        }

        // Step 3: create the session, wiring the transport event pump.
        let (events_tx, events_rx) = mpsc::channel(64);
        let ctx = SessionContext {
            room_id: room_id.clone(),
            user_peer_id: user_peer_id.clone(),
            bot_peer_id: BOT_PEER_ID.to_string(),
        };
        let transport = match self.webrtc_engine.create_session(ctx, events_tx).await {
            Ok(session) => Arc::<dyn WebRtcSession>::from(session),
            Err(error) => {
                warn!(%error, room_id, user_peer_id, "failed to create webrtc session");
                self.emit_system(&room_id, &user_peer_id, "offer_handling_failed");
                return;
            }
        };

        // Step 4: fire-and-forget tool verification (§4.7); never blocks
        // the offer/answer exchange.
        {
            let this = self.clone();
            let room_id = room_id.clone();
            let user_peer_id = user_peer_id.clone();
            let settings = self.settings.collaborators.clone();
            tokio::spawn(async move {
                let probe = verify_tools(&settings).await;
                if probe.stt_missing {
                    this.emit_system(&room_id, &user_peer_id, "stt_binary_missing");
                }
                if probe.tts_missing {
                    this.emit_system(&room_id, &user_peer_id, "tts_binary_missing");
                }
                if probe.decoder_missing {
                    this.emit_system(&room_id, &user_peer_id, "ffmpeg_missing");
                }
            });
        }

        // Step 5: apply the offer, drain buffered candidates, answer.
        let answer_sdp = match transport.accept_offer(&offer.sdp).await {
            Ok(sdp) => sdp,
            Err(error) => {
                warn!(%error, room_id, user_peer_id, "failed to accept offer");
                let _ = transport.close().await;
                self.emit_system(&room_id, &user_peer_id, "offer_handling_failed");
                return;
            }
        };
        for candidate in self.pending_candidates.drain(&room_id, &user_peer_id) {
            if let Err(error) = transport
                .add_ice_candidate(&candidate.candidate, candidate.sdp_mid.as_deref(), candidate.sdp_mline_index)
                .await
            {
                warn!(%error, room_id, user_peer_id, "failed to apply buffered ice candidate");
            }
        }

        // Assemble the turn pipeline for this session.
        let turn_queue = TurnQueue::new(self.settings.vad.turn_queue_bound);
        let pacer = PlaybackPacer::new(&self.settings.playback);
        let sink = Arc::new(HubEventSink::new(self.hub.clone()));
        let worker_ctx = Arc::new(TurnWorkerContext::new(
            room_id.clone(),
            user_peer_id.clone(),
            BOT_PEER_ID.to_string(),
            self.collaborators.stt_chain.clone(),
            self.collaborators.llm.clone(),
            self.collaborators.tts_chain.clone(),
            self.collaborators.decoder.clone(),
            pacer.clone(),
            transport.clone(),
            self.chat_log.clone(),
            sink,
            self.settings.playback.sample_rate_hz,
            friday_voice_config::constants::dedup::WINDOW_MS,
        ));
        let turn_worker = friday_voice_pipeline::turn_pipeline::spawn_turn_worker(worker_ctx, turn_queue.clone());

        let vad = TurnSegmenter::new(VadConfig::from(&self.settings.vad));

        let event_pump = self.clone().spawn_event_pump(
            room_id.clone(),
            user_peer_id.clone(),
            events_rx,
            turn_queue.clone(),
        );

        let session = Arc::new(ServerCallSession {
            transport: transport.clone(),
            vad: Mutex::new(vad),
            turn_queue,
            pacer,
            turn_worker,
            event_pump,
        });
        self.sessions.write().insert(Self::key(&room_id, &user_peer_id), session);

        info!(room_id, user_peer_id, "session negotiated");
        self.hub.emit(&SignalEvent::new(
            SignalType::Answer,
            BOT_PEER_ID.to_string(),
            Some(user_peer_id),
            room_id,
            Some(serde_json::json!({ "type": "answer", "sdp": answer_sdp })),
        ));
    }

    async fn handle_candidate(self: Arc<Self>, event: SignalEvent) {
        let room_id = event.room_id.clone();
        let user_peer_id = event.from.clone();
        let payload = event.payload.clone().unwrap_or(serde_json::Value::Null);
        let candidate = match IceCandidateDescriptor::parse(&payload) {
            Ok(candidate) => candidate,
            Err(error) => {
                warn!(%error, room_id, user_peer_id, "dropping malformed candidate");
                return;
            }
        };

        let existing = self.sessions.read().get(&Self::key(&room_id, &user_peer_id)).cloned();
        match existing {
            Some(session) => {
                if let Err(error) = session
                    .transport
                    .add_ice_candidate(&candidate.candidate, candidate.sdp_mid.as_deref(), candidate.sdp_mline_index)
                    .await
                {
                    warn!(%error, room_id, user_peer_id, "failed to apply live ice candidate");
                }
            }
            None => self.pending_candidates.push(&room_id, &user_peer_id, candidate),
        }
    }

    /// Consumes transport events for one session until the transport or the
    /// manager tears it down.
    fn spawn_event_pump(
        self: Arc<Self>,
        room_id: String,
        user_peer_id: String,
        mut events_rx: mpsc::Receiver<TransportEvent>,
        turn_queue: Arc<TurnQueue>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    TransportEvent::IceCandidate { candidate, sdp_mid, sdp_mline_index } => {
                        self.hub.emit(&SignalEvent::new(
                            SignalType::Candidate,
                            BOT_PEER_ID.to_string(),
                            Some(user_peer_id.clone()),
                            room_id.clone(),
                            Some(serde_json::json!({
                                "candidate": candidate,
                                "sdpMid": sdp_mid,
                                "sdpMLineIndex": sdp_mline_index,
                            })),
                        ));
                    }
                    TransportEvent::ConnectionStateChanged(ConnectionState::Failed)
                    | TransportEvent::ConnectionStateChanged(ConnectionState::Closed) => {
                        self.close(&room_id, &user_peer_id).await;
                        break;
                    }
                    TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected) => {
                        self.emit_system(&room_id, &user_peer_id, "connection_disconnected");
                    }
                    TransportEvent::ConnectionStateChanged(_) => {}
                    TransportEvent::InboundAudioFrame(frame) => {
                        let now = Instant::now();
                        let finalized = {
                            let session = self.sessions.read().get(&Self::key(&room_id, &user_peer_id)).cloned();
                            let Some(session) = session else { continue };
                            session.vad.lock().process_frame(&frame, now).ok().flatten()
                        };
                        if let Some(turn) = finalized {
                            self.emit_system(&room_id, &user_peer_id, "voice_turn_detected");
                            turn_queue.push(QueuedTurn::from(turn));
                        }
                    }
                    TransportEvent::TrackEnded => {}
                }
            }
        })
    }

    fn emit_system(&self, room_id: &str, user_peer_id: &str, message: &str) {
        self.hub.emit(&SignalEvent::system(BOT_PEER_ID.to_string(), user_peer_id.to_string(), room_id.to_string(), message));
    }

    /// Idempotent teardown (§4.2 "Teardown guarantees"): each step swallows
    /// its own error so a partial failure never blocks the rest.
    pub async fn close(&self, room_id: &str, user_peer_id: &str) {
        let Some(session) = self.sessions.write().remove(&Self::key(room_id, user_peer_id)) else {
            return;
        };
        session.turn_worker.abort();
        session.event_pump.abort();
        session.pacer.clear();
        if let Err(error) = session.transport.close().await {
            warn!(%error, room_id, user_peer_id, "transport close reported an error during teardown");
        }
        self.pending_candidates.drain(room_id, user_peer_id);
        info!(room_id, user_peer_id, "session closed");
    }
}
