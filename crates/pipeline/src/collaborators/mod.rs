//! Pluggable STT/LLM/TTS/decoder collaborators (§6, §10.3). Each kind is a
//! small trait with a local-process and a remote-HTTP implementation; the
//! turn pipeline assembles them into the ordered fallback chains §4.4
//! describes.

pub mod chains;
pub mod local;
pub mod probe;
pub mod remote;

use async_trait::async_trait;

use crate::error::PipelineError;

#[async_trait]
pub trait SttBackend: Send + Sync {
    /// Transcribe the WAV file at `wav_path`. An `Ok("")` is treated the
    /// same as a failure by the fallback chain (§4.4 step 2).
    async fn transcribe(&self, wav_path: &std::path::Path) -> Result<String, PipelineError>;
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn reply(&self, input: &str) -> Result<String, PipelineError>;
}

/// Synthesised audio: compressed bytes plus the container format tag (§4.4
/// step 8), e.g. `("...", "ogg")`.
pub type SynthesizedAudio = (Vec<u8>, String);

#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError>;
}

#[async_trait]
pub trait AudioDecoder: Send + Sync {
    /// Decode a compressed container to raw signed 16-bit little-endian
    /// mono PCM at the playback sample rate (§6 "Media decoder").
    async fn decode(&self, bytes: &[u8], format_hint: &str, target_sample_rate: u32) -> Result<Vec<i16>, PipelineError>;
}
