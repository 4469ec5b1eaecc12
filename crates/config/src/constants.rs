//! Literal defaults named in the spec (§4.3, §4.5), kept as named constants
//! so [`crate::VadSettings`]/[`crate::PlaybackSettings`] have a documented
//! source of truth instead of repeating magic numbers.

pub mod vad {
    /// Normalised RMS threshold that transitions idle → in-speech.
    pub const START_THRESHOLD: f32 = 0.015;
    /// Lower RMS threshold used once already in speech (hysteresis).
    pub const HOLD_THRESHOLD: f32 = 0.008;
    pub const SILENCE_HANGOVER_MS: u64 = 2_000;
    pub const MIN_UTTERANCE_MS: u64 = 500;
    pub const MAX_UTTERANCE_MS: u64 = 18_000;
    pub const PRE_ROLL_FRAMES: usize = 22;
    pub const TURN_QUEUE_BOUND: usize = 3;
}

pub mod playback {
    pub const SAMPLE_RATE_HZ: u32 = 48_000;
    pub const FRAME_MS: u32 = 10;
}

pub mod pending_candidates {
    pub const BOUND: usize = 80;
}

pub mod chat_log {
    pub const BOUND: usize = 250;
}

pub mod dedup {
    pub const WINDOW_MS: i64 = 2_500;
}

pub mod webrtc {
    pub const ICE_DISCONNECTED_TIMEOUT_SECS: u64 = 5;
    pub const ICE_FAILED_TIMEOUT_SECS: u64 = 25;
    pub const ICE_KEEPALIVE_INTERVAL_SECS: u64 = 2;
}
