//! Ordered fallback chains assembled from `Settings` (§4.4, §10.3): primary
//! local-process collaborator first, remote-HTTP collaborator second.

use std::path::Path;
use std::sync::Arc;

use super::{SttBackend, SynthesizedAudio, TtsBackend};

#[derive(Clone)]
pub struct SttChain {
    pub primary: Option<Arc<dyn SttBackend>>,
    pub remote: Option<Arc<dyn SttBackend>>,
}

impl SttChain {
    /// §4.4 step 2: primary first; if it fails or returns empty, remote.
    /// An empty string after exhausting both means "give up" (§4.4 step 3).
    pub async fn transcribe(&self, wav_path: &Path) -> String {
        if let Some(primary) = &self.primary {
            match primary.transcribe(wav_path).await {
                Ok(text) if !text.is_empty() => return text,
                Ok(_) => tracing::debug!("stt primary returned an empty transcript, falling back"),
                Err(error) => tracing::warn!(%error, "stt primary failed, falling back"),
            }
        }
        if let Some(remote) = &self.remote {
            match remote.transcribe(wav_path).await {
                Ok(text) => return text,
                Err(error) => tracing::warn!(%error, "stt remote failed"),
            }
        }
        String::new()
    }
}

#[derive(Clone)]
pub struct TtsChain {
    pub primary: Option<Arc<dyn TtsBackend>>,
    pub remote: Option<Arc<dyn TtsBackend>>,
}

impl TtsChain {
    /// §4.4 step 8: primary local binary, else remote service. `None` means
    /// both failed; the turn still publishes its transcript without audio.
    pub async fn synthesize(&self, text: &str) -> Option<SynthesizedAudio> {
        if let Some(primary) = &self.primary {
            match primary.synthesize(text).await {
                Ok(audio) => return Some(audio),
                Err(error) => tracing::warn!(%error, "tts primary failed, falling back"),
            }
        }
        if let Some(remote) = &self.remote {
            match remote.synthesize(text).await {
                Ok(audio) => return Some(audio),
                Err(error) => tracing::warn!(%error, "tts remote failed"),
            }
        }
        None
    }
}
