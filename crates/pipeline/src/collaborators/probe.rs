//! Tool-verification probe (§4.7): checked once per session creation,
//! asynchronously, never blocking signaling.

use friday_voice_config::CollaboratorSettings;

use super::local::probe_binary_available;

#[derive(Debug, Clone, Copy, Default)]
pub struct ToolProbeResult {
    pub stt_missing: bool,
    pub tts_missing: bool,
    pub decoder_missing: bool,
}

pub async fn verify_tools(settings: &CollaboratorSettings) -> ToolProbeResult {
    let timeout = settings.which_probe_timeout();

    let stt_available = match &settings.stt_binary_path {
        Some(path) => probe_binary_available(path, timeout).await,
        None => false,
    };
    let tts_available = match &settings.tts_binary_path {
        Some(path) => probe_binary_available(path, timeout).await,
        None => false,
    };
    let decoder_available = match &settings.decoder_binary_path {
        Some(path) => probe_binary_available(path, timeout).await,
        None => false,
    };

    ToolProbeResult {
        stt_missing: !stt_available && settings.stt_remote_api_key.is_none(),
        tts_missing: !tts_available && settings.tts_remote_api_key.is_none(),
        // The media decoder has no remote fallback; absence is always a gap.
        decoder_missing: !decoder_available,
    }
}
