//! Failure domain for the shared data types. Kept tiny: this crate has no
//! network or process I/O, so almost everything here is a validation error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("sample rate {0} Hz outside accepted range [{min}, {max}]", min = crate::audio::SampleRate::MIN_HZ, max = crate::audio::SampleRate::MAX_HZ)]
    SampleRateOutOfRange(u32),

    #[error("invalid channel count: {0}")]
    InvalidChannelCount(u16),

    #[error("wav error: {0}")]
    Wav(String),

    #[error("resample error: {0}")]
    Resample(String),

    #[error("invalid signal event: {0}")]
    InvalidSignal(String),
}
