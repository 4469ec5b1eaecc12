//! Layered settings for the voice bridge (§10.2).
//!
//! Loaded as `File::with_name("config/default")` (optional) →
//! `File::with_name("config/{env}")` (optional, selected by `VOICE_AGENT_ENV`)
//! → `Environment::with_prefix("VOICE_AGENT").separator("__")`, then
//! validated.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod constants;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub stun_servers: Vec<String>,
    pub turn_servers: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
        }
    }
}

/// Binary paths, endpoint URLs, credentials, model ids, and timeouts for the
/// pluggable STT/LLM/TTS/decoder collaborators (§6, §10.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorSettings {
    pub stt_binary_path: Option<String>,
    pub tts_binary_path: Option<String>,
    pub decoder_binary_path: Option<String>,

    pub llm_endpoint_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model_id: String,
    pub gateway_token: Option<String>,
    pub session_key: Option<String>,

    /// STT remote model ids tried in order until one yields non-empty text
    /// (§4.4 step 2).
    pub stt_model_ids: Vec<String>,
    pub tts_model_id: String,
    pub tts_voice: String,
    /// Container format the TTS collaborators should request/write, e.g. `ogg`.
    pub tts_format: String,

    pub stt_remote_endpoint_url: String,
    pub tts_remote_endpoint_url: String,
    pub stt_remote_api_key: Option<String>,
    pub tts_remote_api_key: Option<String>,

    pub stt_primary_timeout_secs: u64,
    pub stt_remote_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub tts_primary_timeout_secs: u64,
    pub tts_remote_timeout_secs: u64,
    pub decode_timeout_secs: u64,
    pub which_probe_timeout_secs: u64,
}

impl Default for CollaboratorSettings {
    fn default() -> Self {
        Self {
            stt_binary_path: None,
            tts_binary_path: None,
            decoder_binary_path: Some("ffmpeg".to_string()),
            llm_endpoint_url: "https://api.openai.com/v1/responses".to_string(),
            llm_api_key: None,
            llm_model_id: "gpt-4o-mini".to_string(),
            gateway_token: None,
            session_key: None,
            stt_model_ids: vec!["whisper-1".to_string()],
            tts_model_id: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_format: "ogg".to_string(),
            stt_remote_endpoint_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            tts_remote_endpoint_url: "https://api.openai.com/v1/audio/speech".to_string(),
            stt_remote_api_key: None,
            tts_remote_api_key: None,
            stt_primary_timeout_secs: 30,
            stt_remote_timeout_secs: 30,
            llm_timeout_secs: 30,
            tts_primary_timeout_secs: 30,
            tts_remote_timeout_secs: 30,
            decode_timeout_secs: 25,
            which_probe_timeout_secs: 3,
        }
    }
}

impl CollaboratorSettings {
    pub fn stt_primary_timeout(&self) -> Duration {
        Duration::from_secs(self.stt_primary_timeout_secs)
    }
    pub fn stt_remote_timeout(&self) -> Duration {
        Duration::from_secs(self.stt_remote_timeout_secs)
    }
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
    pub fn tts_primary_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_primary_timeout_secs)
    }
    pub fn tts_remote_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_remote_timeout_secs)
    }
    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }
    pub fn which_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.which_probe_timeout_secs)
    }
}

/// The VAD / turn-segmenter constants of §4.3, made overridable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VadSettings {
    pub start_threshold: f32,
    pub hold_threshold: f32,
    pub silence_hangover_ms: u64,
    pub min_utterance_ms: u64,
    pub max_utterance_ms: u64,
    pub pre_roll_frames: usize,
    pub turn_queue_bound: usize,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            start_threshold: constants::vad::START_THRESHOLD,
            hold_threshold: constants::vad::HOLD_THRESHOLD,
            silence_hangover_ms: constants::vad::SILENCE_HANGOVER_MS,
            min_utterance_ms: constants::vad::MIN_UTTERANCE_MS,
            max_utterance_ms: constants::vad::MAX_UTTERANCE_MS,
            pre_roll_frames: constants::vad::PRE_ROLL_FRAMES,
            turn_queue_bound: constants::vad::TURN_QUEUE_BOUND,
        }
    }
}

/// The playback-pacer constants of §4.5.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub sample_rate_hz: u32,
    pub frame_ms: u32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: constants::playback::SAMPLE_RATE_HZ,
            frame_ms: constants::playback::FRAME_MS,
        }
    }
}

impl PlaybackSettings {
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate_hz as u64 * self.frame_ms as u64 / 1000) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    pub log_filter: String,
    pub log_json: bool,
    pub metrics_enabled: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_filter: "voice_agent_server=info,tower_http=debug".to_string(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub collaborators: CollaboratorSettings,
    pub vad: VadSettings,
    pub playback: PlaybackSettings,
    pub observability: ObservabilitySettings,
}

impl Settings {
    /// Layer defaults, an optional config file, an optional per-environment
    /// overlay, then `VOICE_AGENT__*` environment variables (§10.2).
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("VOICE_AGENT_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_AGENT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.vad.start_threshold <= 0.0 || self.vad.hold_threshold <= 0.0 {
            return Err(ConfigError::Invalid("vad thresholds must be positive".into()));
        }
        if self.vad.hold_threshold > self.vad.start_threshold {
            return Err(ConfigError::Invalid(
                "vad.hold_threshold must not exceed vad.start_threshold (hysteresis requires hold <= start)".into(),
            ));
        }
        if self.vad.min_utterance_ms == 0 || self.vad.max_utterance_ms < self.vad.min_utterance_ms {
            return Err(ConfigError::Invalid(
                "vad.max_utterance_ms must be >= vad.min_utterance_ms > 0".into(),
            ));
        }
        if self.vad.pre_roll_frames == 0 {
            return Err(ConfigError::Invalid("vad.pre_roll_frames must be positive".into()));
        }
        if self.vad.turn_queue_bound == 0 {
            return Err(ConfigError::Invalid("vad.turn_queue_bound must be positive".into()));
        }
        if self.playback.sample_rate_hz == 0 || self.playback.frame_ms == 0 {
            return Err(ConfigError::Invalid("playback sample rate and frame duration must be positive".into()));
        }
        if self.collaborators.llm_endpoint_url.is_empty() {
            return Err(ConfigError::Invalid("collaborators.llm_endpoint_url must be set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_port_rejected() {
        let mut s = Settings::default();
        s.server.port = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut s = Settings::default();
        s.vad.hold_threshold = s.vad.start_threshold + 1.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn playback_frame_samples_matches_spec() {
        let p = PlaybackSettings::default();
        assert_eq!(p.frame_samples(), 480);
    }
}
