//! The per-session turn pipeline (§4.4): a bounded queue of finalised
//! utterances drained by a single worker that runs each through
//! STT -> dedup -> chat log -> LLM -> TTS -> decode -> playback pacer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use friday_voice_core::chat::{ChatEntry, ChatLog, ChatRole};
use friday_voice_core::signal::{SignalEvent, SignalType};
use friday_voice_core::audio::pack_wav_mono16;
use friday_voice_transport::WebRtcSession;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::collaborators::{AudioDecoder, LlmBackend};
use crate::collaborators::chains::{SttChain, TtsChain};
use crate::vad::FinalizedTurn;

/// Text returned to the user when the LLM collaborator is unavailable
/// (§4.4 step 6).
pub const LLM_FALLBACK_REPLY: &str = "Comms degraded. Retry in a moment.";

/// A finalised utterance awaiting the turn worker.
#[derive(Debug, Clone)]
pub struct QueuedTurn {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl From<FinalizedTurn> for QueuedTurn {
    fn from(turn: FinalizedTurn) -> Self {
        Self {
            samples: turn.samples,
            sample_rate: turn.sample_rate,
        }
    }
}

/// Bounded FIFO-eviction queue (§3 "Turn queue", bound = 3): unlike a bounded
/// mpsc channel, pushing past the bound drops the *oldest* entry rather than
/// applying backpressure to the producer.
pub struct TurnQueue {
    bound: usize,
    items: Mutex<VecDeque<QueuedTurn>>,
    notify: Notify,
}

impl TurnQueue {
    pub fn new(bound: usize) -> Arc<Self> {
        Arc::new(Self {
            bound,
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    /// Push a newly finalised turn, evicting the oldest queued turn if the
    /// queue is already at capacity.
    pub fn push(&self, turn: QueuedTurn) {
        let mut items = self.items.lock();
        if items.len() >= self.bound {
            items.pop_front();
            tracing::warn!("turn queue at capacity, dropping oldest queued turn");
        }
        items.push_back(turn);
        drop(items);
        self.notify.notify_one();
    }

    async fn pop(&self) -> QueuedTurn {
        loop {
            if let Some(turn) = self.items.lock().pop_front() {
                return turn;
            }
            self.notify.notified().await;
        }
    }
}

/// Emits `SignalEvent`s back through the owning session's signaling
/// subscribers without the pipeline crate depending on the server crate.
#[async_trait]
pub trait TurnEventSink: Send + Sync {
    async fn emit(&self, event: SignalEvent);
}

/// Everything one session's turn worker needs to run a turn end to end.
pub struct TurnWorkerContext {
    pub room_id: String,
    pub user_peer_id: String,
    pub bot_peer_id: String,

    pub stt_chain: SttChain,
    pub llm: Arc<dyn LlmBackend>,
    pub tts_chain: TtsChain,
    pub decoder: Arc<dyn AudioDecoder>,

    pub pacer: Arc<crate::pacer::PlaybackPacer>,
    pub session: Arc<dyn WebRtcSession>,
    pub chat_log: Arc<ChatLog>,
    pub sink: Arc<dyn TurnEventSink>,

    pub playback_sample_rate: u32,
    pub dedup_window: chrono::Duration,

    last_transcript: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl TurnWorkerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        room_id: String,
        user_peer_id: String,
        bot_peer_id: String,
        stt_chain: SttChain,
        llm: Arc<dyn LlmBackend>,
        tts_chain: TtsChain,
        decoder: Arc<dyn AudioDecoder>,
        pacer: Arc<crate::pacer::PlaybackPacer>,
        session: Arc<dyn WebRtcSession>,
        chat_log: Arc<ChatLog>,
        sink: Arc<dyn TurnEventSink>,
        playback_sample_rate: u32,
        dedup_window_ms: i64,
    ) -> Self {
        Self {
            room_id,
            user_peer_id,
            bot_peer_id,
            stt_chain,
            llm,
            tts_chain,
            decoder,
            pacer,
            session,
            chat_log,
            sink,
            playback_sample_rate,
            dedup_window: chrono::Duration::milliseconds(dedup_window_ms),
            last_transcript: Mutex::new(None),
        }
    }

    fn is_duplicate(&self, transcript: &str) -> bool {
        let now = Utc::now();
        let mut guard = self.last_transcript.lock();
        let is_dup = matches!(
            &*guard,
            Some((last, at)) if last == transcript && now.signed_duration_since(*at) < self.dedup_window
        );
        // Only the non-duplicate branch advances lastTranscript/At (§4.4
        // step 4): bumping the timestamp on a drop would turn the fixed
        // 2500ms window into a sliding one that never re-opens.
        if !is_dup {
            *guard = Some((transcript.to_string(), now));
        }
        is_dup
    }

    async fn emit_system(&self, message: &str) {
        self.sink
            .emit(SignalEvent::system(
                self.bot_peer_id.clone(),
                self.user_peer_id.clone(),
                self.room_id.clone(),
                message,
            ))
            .await;
    }
}

/// Spawns the drain loop that feeds [`process_turn`] from `queue` until the
/// context is dropped and the queue is abandoned; the caller holds the
/// `JoinHandle` and aborts it on session teardown (§4.2).
pub fn spawn_turn_worker(ctx: Arc<TurnWorkerContext>, queue: Arc<TurnQueue>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let turn = queue.pop().await;
            process_turn(&ctx, turn).await;
        }
    })
}

/// Runs one finalised utterance through the full turn pipeline (§4.4 steps
/// 1-11). Never panics: every collaborator failure degrades to a `system`
/// event or a transcript-only reply rather than aborting the session.
pub async fn process_turn(ctx: &TurnWorkerContext, turn: QueuedTurn) {
    // Generated up front so every log line for this turn carries the same
    // id, and reused as the `assistant` event's `turnId` at step 11.
    let turn_id = uuid::Uuid::new_v4().to_string();
    let turn_started = Instant::now();

    // Step 1: package the utterance as a WAV container for the STT chain.
    let wav_bytes = match pack_wav_mono16(&turn.samples, turn.sample_rate) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(%error, %turn_id, "failed to package turn audio as wav");
            counter!("voice_pipeline_errors_total", "stage" => "audio").increment(1);
            ctx.emit_system("transcription_empty").await;
            return;
        }
    };
    let wav_file = match tempfile::Builder::new().suffix(".wav").tempfile() {
        Ok(f) => f,
        Err(error) => {
            tracing::warn!(%error, %turn_id, "failed to allocate temp file for turn audio");
            return;
        }
    };
    if let Err(error) = tokio::fs::write(wav_file.path(), &wav_bytes).await {
        tracing::warn!(%error, %turn_id, "failed to write turn audio to disk");
        return;
    }

    // Step 2-3: STT fallback chain; an empty transcript after both legs is
    // reported and the turn ends here.
    let stt_started = Instant::now();
    let transcript = ctx.stt_chain.transcribe(wav_file.path()).await;
    histogram!("voice_stt_latency_seconds").record(stt_started.elapsed().as_secs_f64());
    if transcript.trim().is_empty() {
        counter!("voice_pipeline_errors_total", "stage" => "stt").increment(1);
        ctx.emit_system("transcription_empty").await;
        return;
    }
    let transcript = transcript.trim().to_string();

    // Step 4: drop near-duplicate transcripts within the dedup window
    // (e.g. VAD re-triggering on the tail of the assistant's own playback).
    if ctx.is_duplicate(&transcript) {
        tracing::debug!(%transcript, %turn_id, "dropping duplicate transcript within dedup window");
        return;
    }

    // Step 5: append the user's turn to the room's chat log.
    let user_entry = match ChatEntry::new(ChatRole::User, transcript.clone()) {
        Ok(entry) => {
            ctx.chat_log.add_entry(&ctx.room_id, entry.clone());
            Some(entry)
        }
        Err(error) => {
            tracing::warn!(%error, %turn_id, "failed to record user chat entry");
            None
        }
    };

    // Step 6: ask the LLM collaborator for a reply, degrading to a fixed
    // apology on failure or timeout rather than stalling the turn.
    let llm_started = Instant::now();
    let llm_result = ctx.llm.reply(&transcript).await;
    histogram!("voice_llm_latency_seconds").record(llm_started.elapsed().as_secs_f64());
    let reply = match llm_result {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            tracing::warn!(%turn_id, "llm returned an empty reply, using fallback text");
            counter!("voice_pipeline_errors_total", "stage" => "llm").increment(1);
            LLM_FALLBACK_REPLY.to_string()
        }
        Err(error) => {
            tracing::warn!(%error, %turn_id, "llm collaborator failed, using fallback text");
            counter!("voice_pipeline_errors_total", "stage" => "llm").increment(1);
            LLM_FALLBACK_REPLY.to_string()
        }
    };

    // Step 7: append the assistant's turn to the chat log.
    let assistant_entry = match ChatEntry::new(ChatRole::Assistant, reply.clone()) {
        Ok(entry) => {
            ctx.chat_log.add_entry(&ctx.room_id, entry.clone());
            Some(entry)
        }
        Err(error) => {
            tracing::warn!(%error, %turn_id, "failed to record assistant chat entry");
            None
        }
    };

    // Step 8: TTS fallback chain; `None` means both legs failed and the
    // turn publishes its transcript without audio (§4.4 step 9).
    let tts_started = Instant::now();
    let synthesized = ctx.tts_chain.synthesize(&reply).await;
    histogram!("voice_tts_latency_seconds").record(tts_started.elapsed().as_secs_f64());

    // Step 9-10: decode to PCM16 mono at the playback rate and enqueue it
    // with the pacer; a decode failure is logged and playback is skipped.
    if let Some((bytes, format)) = synthesized {
        match ctx.decoder.decode(&bytes, &format, ctx.playback_sample_rate).await {
            Ok(samples) if !samples.is_empty() => {
                ctx.pacer.enqueue(samples, ctx.session.clone());
            }
            Ok(_) => tracing::warn!(%turn_id, "decoder returned no samples, skipping playback for this turn"),
            Err(error) => {
                tracing::warn!(%error, %turn_id, "failed to decode synthesized audio, skipping playback");
                counter!("voice_pipeline_errors_total", "stage" => "decode").increment(1);
            }
        }
    } else {
        tracing::warn!(%turn_id, "tts chain exhausted, publishing transcript without audio");
        counter!("voice_pipeline_errors_total", "stage" => "tts").increment(1);
    }

    histogram!("voice_turn_latency_seconds").record(turn_started.elapsed().as_secs_f64());

    // Step 11: publish the `assistant` event. Audio travels over the media
    // track, not the signaling channel, so the payload's audio fields stay
    // null; `userEntry`/`reply` carry the same `ChatEntry` shape the HTTP
    // `/assistant` endpoint's `reply` field uses, for a consistent wire
    // contract across both paths.
    ctx.sink
        .emit(SignalEvent::new(
            SignalType::Assistant,
            ctx.bot_peer_id.clone(),
            Some(ctx.user_peer_id.clone()),
            ctx.room_id.clone(),
            Some(serde_json::json!({
                "turnId": turn_id,
                "userEntry": user_entry,
                "reply": assistant_entry,
                "audioBase64": serde_json::Value::Null,
                "audioMimeType": serde_json::Value::Null,
            })),
        ))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_evicts_oldest_past_bound() {
        let queue = TurnQueue::new(2);
        queue.push(QueuedTurn { samples: vec![1], sample_rate: 48_000 });
        queue.push(QueuedTurn { samples: vec![2], sample_rate: 48_000 });
        queue.push(QueuedTurn { samples: vec![3], sample_rate: 48_000 });
        let items = queue.items.lock();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].samples, vec![2]);
        assert_eq!(items[1].samples, vec![3]);
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let queue = TurnQueue::new(3);
        let popped = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await }
        });
        tokio::task::yield_now().await;
        queue.push(QueuedTurn { samples: vec![9], sample_rate: 16_000 });
        let turn = popped.await.unwrap();
        assert_eq!(turn.samples, vec![9]);
    }

    struct FixedStt(&'static str);

    #[async_trait]
    impl crate::collaborators::SttBackend for FixedStt {
        async fn transcribe(&self, _wav_path: &std::path::Path) -> Result<String, crate::error::PipelineError> {
            Ok(self.0.to_string())
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmBackend for EchoLlm {
        async fn reply(&self, input: &str) -> Result<String, crate::error::PipelineError> {
            Ok(format!("you said: {input}"))
        }
    }

    struct SilentTts;

    #[async_trait]
    impl crate::collaborators::TtsBackend for SilentTts {
        async fn synthesize(&self, _text: &str) -> Result<crate::collaborators::SynthesizedAudio, crate::error::PipelineError> {
            Ok((vec![0u8; 4], "ogg".to_string()))
        }
    }

    struct PassthroughDecoder;

    #[async_trait]
    impl AudioDecoder for PassthroughDecoder {
        async fn decode(&self, _bytes: &[u8], _format_hint: &str, _target_sample_rate: u32) -> Result<Vec<i16>, crate::error::PipelineError> {
            Ok(vec![1, 2, 3])
        }
    }

    struct NoopSession;

    #[async_trait]
    impl friday_voice_transport::WebRtcSession for NoopSession {
        async fn accept_offer(&self, _offer_sdp: &str) -> Result<String, friday_voice_transport::TransportError> {
            unimplemented!()
        }
        async fn add_ice_candidate(
            &self,
            _candidate: &str,
            _sdp_mid: Option<&str>,
            _sdp_mline_index: Option<u16>,
        ) -> Result<(), friday_voice_transport::TransportError> {
            unimplemented!()
        }
        async fn push_audio_frame(&self, _samples: &[i16], _sample_rate: u32) -> Result<(), friday_voice_transport::TransportError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), friday_voice_transport::TransportError> {
            Ok(())
        }
    }

    struct RecordingSink {
        assistant_events: Mutex<Vec<SignalEvent>>,
    }

    #[async_trait]
    impl TurnEventSink for RecordingSink {
        async fn emit(&self, event: SignalEvent) {
            if event.kind == SignalType::Assistant {
                self.assistant_events.lock().push(event);
            }
        }
    }

    fn test_context(sink: Arc<RecordingSink>, transcript: &'static str) -> Arc<TurnWorkerContext> {
        let stt_chain = SttChain {
            primary: Some(Arc::new(FixedStt(transcript))),
            remote: None,
        };
        let tts_chain = crate::collaborators::chains::TtsChain {
            primary: Some(Arc::new(SilentTts)),
            remote: None,
        };
        Arc::new(TurnWorkerContext::new(
            "room-1".to_string(),
            "alice".to_string(),
            "friday-voice-bot-1".to_string(),
            stt_chain,
            Arc::new(EchoLlm),
            tts_chain,
            Arc::new(PassthroughDecoder),
            crate::pacer::PlaybackPacer::new(&friday_voice_config::PlaybackSettings::default()),
            Arc::new(NoopSession),
            Arc::new(ChatLog::new()),
            sink,
            48_000,
            2_500,
        ))
    }

    #[tokio::test]
    async fn duplicate_transcript_within_window_is_dropped() {
        let sink = Arc::new(RecordingSink { assistant_events: Mutex::new(Vec::new()) });
        let ctx = test_context(sink.clone(), "hello");
        let turn = QueuedTurn { samples: vec![1; 480], sample_rate: 16_000 };

        process_turn(&ctx, turn.clone()).await;
        process_turn(&ctx, turn).await;

        assert_eq!(sink.assistant_events.lock().len(), 1, "second identical turn within the dedup window must be dropped");
    }

    #[tokio::test]
    async fn distinct_transcripts_both_produce_assistant_events() {
        let sink = Arc::new(RecordingSink { assistant_events: Mutex::new(Vec::new()) });
        let ctx = test_context(sink.clone(), "hello");
        process_turn(&ctx, QueuedTurn { samples: vec![1; 480], sample_rate: 16_000 }).await;

        // Swap in a context with a different fixed transcript to simulate a
        // distinct second utterance; the dedup guard is per-context state.
        let ctx2 = test_context(sink.clone(), "goodbye");
        process_turn(&ctx2, QueuedTurn { samples: vec![1; 480], sample_rate: 16_000 }).await;

        assert_eq!(sink.assistant_events.lock().len(), 2);
    }

    #[tokio::test]
    async fn dropped_duplicate_does_not_bump_last_transcript_at() {
        let sink = Arc::new(RecordingSink { assistant_events: Mutex::new(Vec::new()) });
        let ctx = test_context(sink, "hello");

        // First "hello" is processed, establishing the window's start.
        assert!(!ctx.is_duplicate("hello"));
        let first_at = ctx.last_transcript.lock().as_ref().unwrap().1;

        // A second "hello" arriving inside the window is dropped as a
        // duplicate. Per §4.4 step 4 this must leave lastTranscriptAt
        // untouched — otherwise every dropped repeat pushes the window's
        // start forward and a user repeating the same short word never
        // clears it.
        assert!(ctx.is_duplicate("hello"));
        let after_duplicate_at = ctx.last_transcript.lock().as_ref().unwrap().1;
        assert_eq!(first_at, after_duplicate_at);

        // Backdating past the fixed 2500ms window (measured from the
        // original, never-bumped timestamp) must let the turn through again.
        {
            let mut guard = ctx.last_transcript.lock();
            let (text, at) = guard.take().unwrap();
            *guard = Some((text, at - chrono::Duration::milliseconds(2_600)));
        }
        assert!(!ctx.is_duplicate("hello"));
    }
}
