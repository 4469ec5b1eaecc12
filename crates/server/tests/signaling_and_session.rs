//! Integration tests for the signaling/session HTTP surface (§4.1, §4.2, §6,
//! §10.4): drives `AppState` through the real `axum::Router` with
//! `tower::ServiceExt::oneshot` against a [`FakeEngine`], never a bound
//! socket.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use friday_voice_config::Settings;
use friday_voice_server::{router, AppState};
use friday_voice_transport::engine::FakeEngine;
use friday_voice_transport::WebRtcEngine;
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

fn test_state() -> AppState {
    let webrtc_engine: Arc<dyn WebRtcEngine> = Arc::new(FakeEngine);
    AppState::new(Settings::default(), webrtc_engine)
}

fn json_body(value: serde_json::Value) -> Body {
    Body::from(value.to_string())
}

async fn read_frame_text(body: &mut Body, timeout: Duration) -> String {
    let frame = tokio::time::timeout(timeout, body.frame())
        .await
        .expect("timed out waiting for an sse frame")
        .expect("stream ended before the expected frame")
        .expect("frame error");
    let bytes = frame.into_data().unwrap_or_default();
    String::from_utf8(bytes.to_vec()).unwrap_or_default()
}

/// Reads frames until one contains `needle`, skipping unrelated system
/// events (e.g. the fire-and-forget tool probe's `stt_binary_missing`) that
/// may interleave with the event being waited for.
async fn read_frame_containing(body: &mut Body, needle: &str, overall_timeout: Duration) -> String {
    tokio::time::timeout(overall_timeout, async {
        loop {
            let text = read_frame_text(body, overall_timeout).await;
            if text.contains(needle) {
                return text;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no frame containing {needle:?} arrived in time"))
}

#[tokio::test]
async fn health_and_ready_endpoints_report_ok() {
    let app = router(test_state());

    let health = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let ready = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn signal_relay_to_nonexistent_peer_returns_ok_without_crashing() {
    let app = router(test_state());

    let event = json!({
        "type": "candidate",
        "from": "alice",
        "to": "bob-has-never-connected",
        "roomId": "room-1",
        "payload": { "candidate": "candidate:1 1 udp 2 1.2.3.4 5 typ host" },
        "at": "2026-07-27T00:00:00Z",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webrtc/signal")
                .header("content-type", "application/json")
                .body(json_body(event))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn signal_missing_from_is_rejected_with_bad_request() {
    let app = router(test_state());

    let event = json!({
        "type": "candidate",
        "from": "",
        "roomId": "room-1",
        "at": "2026-07-27T00:00:00Z",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webrtc/signal")
                .header("content-type", "application/json")
                .body(json_body(event))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bye_signal_close_is_idempotent() {
    let app = router(test_state());

    let bye = || {
        json_body(json!({
            "type": "bye",
            "from": "alice",
            "roomId": "room-1",
            "at": "2026-07-27T00:00:00Z",
        }))
    };

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/webrtc/signal")
                    .header("content-type", "application/json")
                    .body(bye())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn chat_post_then_get_roundtrips() {
    let app = router(test_state());

    let post = json!({ "roomId": "room-chat", "role": "user", "message": "hello there" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webrtc/chat")
                .header("content-type", "application/json")
                .body(json_body(post))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let get = app
        .oneshot(
            Request::builder()
                .uri("/api/webrtc/chat?roomId=room-chat")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    let body = get.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("hello there"));
}

#[tokio::test]
async fn chat_log_bound_is_enforced_over_http() {
    let app = router(test_state());

    for i in 0..260 {
        let post = json!({ "roomId": "room-bound", "role": "user", "message": format!("msg-{i}") });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/webrtc/chat")
                    .header("content-type", "application/json")
                    .body(json_body(post))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let get = app
        .oneshot(
            Request::builder()
                .uri("/api/webrtc/chat?roomId=room-bound")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = get.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let history = parsed["history"].as_array().unwrap();
    assert_eq!(history.len(), 250);
    assert_eq!(history.first().unwrap()["message"], "msg-10");
    assert_eq!(history.last().unwrap()["message"], "msg-259");
}

#[tokio::test]
async fn offer_with_malformed_payload_emits_invalid_offer_system_event() {
    let app = router(test_state());

    let events_response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/webrtc/events?peerId=user1&roomId=room-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(events_response.status(), StatusCode::OK);
    let mut stream = events_response.into_body();

    // Frame 1: the `ready` preamble. Frame 2: the `signaling_connected`
    // system event. Both are sent directly to this subscriber, ahead of
    // anything routed through the hub.
    let _ready = read_frame_text(&mut stream, Duration::from_secs(1)).await;
    let _connected = read_frame_text(&mut stream, Duration::from_secs(1)).await;

    let offer = json!({
        "type": "offer",
        "from": "user1",
        "to": "friday-voice-bot-1",
        "roomId": "room-1",
        "payload": { "sdp": "v=0..." }, // missing required `type: offer`
        "at": "2026-07-27T00:00:00Z",
    });
    let signal_response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webrtc/signal")
                .header("content-type", "application/json")
                .body(json_body(offer))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(signal_response.status(), StatusCode::OK);

    let _system_frame = read_frame_containing(&mut stream, "invalid_offer_payload", Duration::from_secs(2)).await;
}

#[tokio::test]
async fn offer_restart_tears_down_the_prior_session_and_answers_again() {
    let app = router(test_state());

    let events_response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/webrtc/events?peerId=user2&roomId=room-2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let mut stream = events_response.into_body();
    let _ready = read_frame_text(&mut stream, Duration::from_secs(1)).await;
    let _connected = read_frame_text(&mut stream, Duration::from_secs(1)).await;

    let send_offer = |sdp: &'static str| {
        json_body(json!({
            "type": "offer",
            "from": "user2",
            "to": "friday-voice-bot-1",
            "roomId": "room-2",
            "payload": { "type": "offer", "sdp": sdp },
            "at": "2026-07-27T00:00:00Z",
        }))
    };

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webrtc/signal")
                .header("content-type", "application/json")
                .body(send_offer("v=0 first-offer"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let _first_answer = read_frame_containing(&mut stream, "\"type\":\"answer\"", Duration::from_secs(2)).await;

    let second = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webrtc/signal")
                .header("content-type", "application/json")
                .body(send_offer("v=0 second-offer-after-restart"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let _second_answer = read_frame_containing(&mut stream, "\"type\":\"answer\"", Duration::from_secs(2)).await;
}
