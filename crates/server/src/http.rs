//! The HTTP/SSE surface (§6): signaling stream and relay, chat log access,
//! the stateless assistant endpoint, and the health/readiness/metrics
//! probes.

use std::convert::Infallible;

use axum::extract::{MatchedPath, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use friday_voice_core::chat::{ChatEntry, ChatRole};
use friday_voice_core::signal::SignalEvent;

use crate::error::ServerError;
use crate::signaling::relay_signal;
use crate::state::{AppState, SseMessage};

const DEFAULT_ROOM: &str = "friday-default-room";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/webrtc/events", get(events))
        .route("/api/webrtc/signal", post(signal))
        .route("/api/webrtc/chat", get(get_chat).post(post_chat))
        .route("/api/webrtc/assistant", post(assistant))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(crate::metrics::serve_metrics))
        .layer(middleware::from_fn(record_request_metric))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state))
        .with_state(state)
}

/// Records every request against `voice_http_requests_total` (§6, §10.1),
/// labelled with the matched route template rather than the raw path so
/// per-peer/per-room paths don't each get their own metric series.
async fn record_request_metric(matched_path: Option<MatchedPath>, request: Request, next: Next) -> Response {
    let route = matched_path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let response = next.run(request).await;
    crate::metrics::record_request(&route, response.status().as_u16());
    response
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = &state.settings.server.cors_origins;
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    let parsed = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect::<Vec<_>>();
    CorsLayer::new().allow_origin(parsed).allow_methods(Any).allow_headers(Any)
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(rename = "peerId")]
    peer_id: String,
    #[serde(rename = "roomId", default = "default_room")]
    room_id: String,
}

fn default_room() -> String {
    DEFAULT_ROOM.to_string()
}

/// `GET /api/webrtc/events` (§4.1 `openEventStream`): registers the stream,
/// emits `ready` then a `signaling_connected` system event, and deregisters
/// on cancel via the subscriber guard's `Drop`.
async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    if query.peer_id.is_empty() {
        return Err(ServerError::BadRequest("peerId is required".into()));
    }

    let (id, tx, rx) = state.subscribers.register(&query.room_id, &query.peer_id);
    let ready_payload = json!({ "peerId": query.peer_id, "roomId": query.room_id });
    let _ = tx.send(SseMessage::Ready(ready_payload));
    let _ = tx.send(SseMessage::Data(serde_json::to_value(&SignalEvent::system(
        "friday-voice-bot-1",
        query.peer_id.clone(),
        query.room_id.clone(),
        "signaling_connected",
    ))?));

    let guard = SubscriberGuard {
        state: state.clone(),
        room_id: query.room_id,
        peer_id: query.peer_id,
        id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut rx = rx;
        while let Some(message) = rx.recv().await {
            yield Ok(match message {
                SseMessage::Ready(value) => Event::default().event("ready").data(value.to_string()),
                SseMessage::Data(value) => Event::default().data(value.to_string()),
            });
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct SubscriberGuard {
    state: AppState,
    room_id: String,
    peer_id: String,
    id: uuid::Uuid,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.state.subscribers.deregister(&self.room_id, &self.peer_id, self.id);
    }
}

#[derive(Serialize)]
struct Ack {
    ok: bool,
}

/// `POST /api/webrtc/signal` → `relaySignal` (§4.1).
async fn signal(State(state): State<AppState>, Json(event): Json<SignalEvent>) -> Result<Json<Ack>, ServerError> {
    if event.from.is_empty() || event.room_id.is_empty() {
        return Err(ServerError::BadRequest("from and roomId are required".into()));
    }
    relay_signal(&state, event).await;
    Ok(Json(Ack { ok: true }))
}

#[derive(Deserialize)]
struct ChatQuery {
    #[serde(rename = "roomId", default = "default_room")]
    room_id: String,
}

#[derive(Serialize)]
struct ChatHistoryResponse {
    history: Vec<ChatEntry>,
}

async fn get_chat(State(state): State<AppState>, Query(query): Query<ChatQuery>) -> Json<ChatHistoryResponse> {
    Json(ChatHistoryResponse { history: state.chat_log.history(&query.room_id) })
}

#[derive(Deserialize)]
struct PostChatRequest {
    #[serde(rename = "roomId", default = "default_room")]
    room_id: String,
    role: ChatRole,
    message: String,
}

#[derive(Serialize)]
struct PostChatResponse {
    ok: bool,
    entry: ChatEntry,
}

async fn post_chat(
    State(state): State<AppState>,
    Json(request): Json<PostChatRequest>,
) -> Result<Json<PostChatResponse>, ServerError> {
    let entry = ChatEntry::new(request.role, request.message)?;
    state.chat_log.add_entry(&request.room_id, entry.clone());
    Ok(Json(PostChatResponse { ok: true, entry }))
}

#[derive(Deserialize)]
struct AssistantRequest {
    #[serde(rename = "roomId", default = "default_room")]
    room_id: String,
    transcript: Option<String>,
    #[serde(rename = "fallbackTranscript")]
    fallback_transcript: Option<String>,
    #[serde(rename = "inputAudioBase64")]
    input_audio_base64: Option<String>,
    #[serde(rename = "inputAudioMimeType")]
    input_audio_mime_type: Option<String>,
}

#[derive(Serialize)]
struct AssistantResponse {
    ok: bool,
    transcript: String,
    reply: ChatEntry,
    #[serde(rename = "audioBase64")]
    audio_base64: Option<String>,
    #[serde(rename = "audioMimeType")]
    audio_mime_type: Option<String>,
}

/// `POST /api/webrtc/assistant`: the non-WebRTC text/audio-in, text/audio-out
/// request path, sharing the same collaborator chains the turn pipeline
/// uses (§6, §10.3). Audio here travels as base64 in the JSON body rather
/// than a media track since there is no peer connection backing this call.
async fn assistant(
    State(state): State<AppState>,
    Json(request): Json<AssistantRequest>,
) -> Result<Json<AssistantResponse>, ServerError> {
    let transcript = resolve_transcript(&state, &request).await?;

    let reply_text = match state.collaborators.llm.reply(&transcript).await {
        Ok(text) if !text.trim().is_empty() => text,
        _ => friday_voice_pipeline::turn_pipeline::LLM_FALLBACK_REPLY.to_string(),
    };

    if let Ok(entry) = ChatEntry::new(ChatRole::User, transcript.clone()) {
        state.chat_log.add_entry(&request.room_id, entry);
    }
    let reply_entry = ChatEntry::new(ChatRole::Assistant, reply_text.clone())?;
    state.chat_log.add_entry(&request.room_id, reply_entry.clone());

    let synthesized = state.collaborators.tts_chain.synthesize(&reply_text).await;
    let (audio_base64, audio_mime_type) = match synthesized {
        Some((bytes, format)) => (Some(BASE64.encode(bytes)), Some(format!("audio/{format}"))),
        None => (None, None),
    };

    Ok(Json(AssistantResponse {
        ok: true,
        transcript,
        reply: reply_entry,
        audio_base64,
        audio_mime_type,
    }))
}

async fn resolve_transcript(state: &AppState, request: &AssistantRequest) -> Result<String, ServerError> {
    if let Some(transcript) = &request.transcript {
        if !transcript.trim().is_empty() {
            return Ok(transcript.trim().to_string());
        }
    }

    if let Some(audio_b64) = &request.input_audio_base64 {
        let bytes = BASE64
            .decode(audio_b64)
            .map_err(|e| ServerError::BadRequest(format!("invalid inputAudioBase64: {e}")))?;
        let suffix = request
            .input_audio_mime_type
            .as_deref()
            .and_then(|mime| mime.split('/').next_back())
            .unwrap_or("wav");
        let file = tempfile::Builder::new()
            .suffix(&format!(".{suffix}"))
            .tempfile()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        tokio::fs::write(file.path(), &bytes)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let transcript = state.collaborators.stt_chain.transcribe(file.path()).await;
        if !transcript.trim().is_empty() {
            return Ok(transcript.trim().to_string());
        }
    }

    if let Some(fallback) = &request.fallback_transcript {
        if !fallback.trim().is_empty() {
            return Ok(fallback.trim().to_string());
        }
    }

    Err(ServerError::BadRequest("no usable transcript: provide transcript, inputAudioBase64, or fallbackTranscript".into()))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let webrtc_available = state.webrtc_engine.is_available();
    let body = json!({
        "status": if webrtc_available { "ok" } else { "degraded" },
        "webrtc_available": webrtc_available,
        "collaborators": {
            "stt": state.collaborators.stt_chain.primary.is_some() || state.collaborators.stt_chain.remote.is_some(),
            "tts": state.collaborators.tts_chain.primary.is_some() || state.collaborators.tts_chain.remote.is_some(),
        },
    });
    let status = if webrtc_available { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}
