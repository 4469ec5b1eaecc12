//! Voice-activity detection and turn segmentation (§4.3).
//!
//! One [`TurnSegmenter`] per session, driven by the inbound-audio callback.
//! It never touches I/O: it takes a frame and the current instant and
//! returns a finalised turn, if this frame completed one.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use friday_voice_config::VadSettings;
use friday_voice_core::audio::rms;
use friday_voice_core::AudioFrame;

use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct VadConfig {
    pub start_threshold: f32,
    pub hold_threshold: f32,
    pub silence_hangover: Duration,
    pub min_utterance: Duration,
    pub max_utterance: Duration,
    pub pre_roll_frames: usize,
}

impl From<&VadSettings> for VadConfig {
    fn from(s: &VadSettings) -> Self {
        Self {
            start_threshold: s.start_threshold,
            hold_threshold: s.hold_threshold,
            silence_hangover: Duration::from_millis(s.silence_hangover_ms),
            min_utterance: Duration::from_millis(s.min_utterance_ms),
            max_utterance: Duration::from_millis(s.max_utterance_ms),
            pre_roll_frames: s.pre_roll_frames,
        }
    }
}

/// A finalised, contiguous utterance ready for the turn pipeline (§3
/// "Turn queue").
#[derive(Debug, Clone)]
pub struct FinalizedTurn {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

pub struct TurnSegmenter {
    config: VadConfig,
    in_speech: bool,
    last_voice_at: Option<Instant>,
    utterance_sample_rate: u32,
    utterance_frames: Vec<Vec<i16>>,
    utterance_sample_count: usize,
    pre_roll: VecDeque<Vec<i16>>,
}

impl TurnSegmenter {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            in_speech: false,
            last_voice_at: None,
            utterance_sample_rate: 0,
            utterance_frames: Vec::new(),
            utterance_sample_count: 0,
            pre_roll: VecDeque::new(),
        }
    }

    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    /// Feed one inbound frame. Returns `Some` exactly when this frame
    /// finalised a turn meeting the minimum-utterance bar.
    pub fn process_frame(
        &mut self,
        frame: &AudioFrame,
        now: Instant,
    ) -> Result<Option<FinalizedTurn>, PipelineError> {
        frame.validate()?;
        let mono = frame.downmix_to_mono();

        self.pre_roll.push_back(mono.clone());
        while self.pre_roll.len() > self.config.pre_roll_frames {
            self.pre_roll.pop_front();
        }

        let level = rms(&mono);

        if !self.in_speech && level >= self.config.start_threshold {
            self.in_speech = true;
            self.utterance_frames = self.pre_roll.iter().cloned().collect();
            self.utterance_sample_count = self.utterance_frames.iter().map(Vec::len).sum();
            self.utterance_sample_rate = frame.sample_rate;
            self.last_voice_at = Some(now);
        }

        if !self.in_speech {
            return Ok(None);
        }

        self.utterance_frames.push(mono.clone());
        self.utterance_sample_count += mono.len();
        if level >= self.config.hold_threshold {
            self.last_voice_at = Some(now);
        }

        Ok(self.evaluate_finalization(now))
    }

    fn evaluate_finalization(&mut self, now: Instant) -> Option<FinalizedTurn> {
        let sample_rate = self.utterance_sample_rate;
        let utterance_ms = self.utterance_sample_count as f64 / sample_rate as f64 * 1000.0;
        let last_voice_at = self.last_voice_at.expect("in_speech implies last_voice_at is set");
        let silence_ms = now.saturating_duration_since(last_voice_at).as_secs_f64() * 1000.0;

        let hit_max = utterance_ms >= self.config.max_utterance.as_millis() as f64;
        let meets_min = utterance_ms >= self.config.min_utterance.as_millis() as f64;
        let silence_finalize = silence_ms >= self.config.silence_hangover.as_millis() as f64 && meets_min;

        if !hit_max && !silence_finalize {
            return None;
        }

        let frames = std::mem::take(&mut self.utterance_frames);
        self.reset();

        if !meets_min {
            return None;
        }

        let samples = friday_voice_core::audio::concat_frames(frames.iter().map(Vec::as_slice));
        Some(FinalizedTurn { samples, sample_rate })
    }

    fn reset(&mut self) {
        self.in_speech = false;
        self.utterance_frames.clear();
        self.utterance_sample_count = 0;
        self.last_voice_at = None;
        self.utterance_sample_rate = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VadConfig {
        VadConfig {
            start_threshold: 0.015,
            hold_threshold: 0.008,
            silence_hangover: Duration::from_millis(2_000),
            min_utterance: Duration::from_millis(500),
            max_utterance: Duration::from_millis(18_000),
            pre_roll_frames: 22,
        }
    }

    /// 10ms frames at 16kHz, constant amplitude chosen so its RMS matches
    /// the requested normalised level.
    fn frame_at_level(level: f32) -> AudioFrame {
        let amplitude = (level * 32768.0) as i16;
        AudioFrame::new(vec![amplitude; 160], 16_000, 1)
    }

    fn feed(seg: &mut TurnSegmenter, frame: &AudioFrame, count: usize, start: Instant, step: Duration) -> (Instant, Option<FinalizedTurn>) {
        let mut now = start;
        let mut last = None;
        for _ in 0..count {
            last = seg.process_frame(frame, now).unwrap();
            now += step;
        }
        (now, last)
    }

    #[test]
    fn below_minimum_utterance_drops_without_emitting() {
        let mut seg = TurnSegmenter::new(config());
        let start = Instant::now();
        let step = Duration::from_millis(10);
        let loud = frame_at_level(0.020);
        let (now, _) = feed(&mut seg, &loud, 40, start, step); // 400ms speech
        let silent = frame_at_level(0.0);
        let (_, turn) = feed(&mut seg, &silent, 300, now, step); // 3s silence
        assert!(turn.is_none());
        assert!(!seg.in_speech());
    }

    #[test]
    fn silence_hangover_finalizes_with_preroll() {
        let mut seg = TurnSegmenter::new(config());
        let start = Instant::now();
        let step = Duration::from_millis(10);
        let loud = frame_at_level(0.020);
        let (now, _) = feed(&mut seg, &loud, 80, start, step); // 800ms speech
        let silent = frame_at_level(0.001);
        let (_, turn) = feed(&mut seg, &silent, 210, now, step); // 2.1s silence
        let turn = turn.expect("turn should finalize");
        // roughly 800ms speech + 22 frames (220ms) of pre-roll duplicated by
        // the first loud frames, +/- a frame for hangover boundary effects.
        let ms = turn.samples.len() as f64 / turn.sample_rate as f64 * 1000.0;
        assert!(ms >= 800.0 && ms <= 1100.0, "got {ms}ms");
    }

    #[test]
    fn hard_cap_finalizes_at_max_utterance() {
        let mut seg = TurnSegmenter::new(config());
        let start = Instant::now();
        let step = Duration::from_millis(10);
        let loud = frame_at_level(0.020);
        let (_, turn) = feed(&mut seg, &loud, 1850, start, step); // 18.5s continuous
        let turn = turn.expect("turn should finalize at the hard cap");
        let ms = turn.samples.len() as f64 / turn.sample_rate as f64 * 1000.0;
        assert!(ms <= 18_000.0 + 10.0);
    }

    #[test]
    fn rejects_out_of_range_sample_rate() {
        let mut seg = TurnSegmenter::new(config());
        let frame = AudioFrame::new(vec![0; 10], 4_000, 1);
        assert!(seg.process_frame(&frame, Instant::now()).is_err());
    }
}
