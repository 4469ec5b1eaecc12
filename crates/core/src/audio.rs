//! PCM audio frames and the format helpers the voice bridge needs: mono
//! downmix, RMS level, WAV packaging, and sample-rate conversion between an
//! utterance's native rate and the 48 kHz playback rate.

use std::io::Cursor;
use std::sync::Arc;

use rubato::{FftFixedIn, Resampler};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Sample rate in Hz, validated against the range the VAD accepts (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRate(u32);

impl SampleRate {
    pub const MIN_HZ: u32 = 8_000;
    pub const MAX_HZ: u32 = 96_000;

    /// The fixed outbound playback rate (§4.5).
    pub const PLAYBACK: SampleRate = SampleRate(48_000);

    pub fn new(hz: u32) -> Result<Self, CoreError> {
        if !(Self::MIN_HZ..=Self::MAX_HZ).contains(&hz) {
            return Err(CoreError::SampleRateOutOfRange(hz));
        }
        Ok(Self(hz))
    }

    pub fn hz(self) -> u32 {
        self.0
    }
}

/// A PCM-16 mono (or, before downmix, multi-channel) audio frame as captured
/// from or destined for the WebRTC engine.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved PCM-16 samples, mono once past `downmix_to_mono`.
    pub samples: Arc<[i16]>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels,
        }
    }

    /// Reject frames outside the accepted sample-rate range or carrying
    /// non-finite values. Per §4.3 step 1.
    pub fn validate(&self) -> Result<(), CoreError> {
        SampleRate::new(self.sample_rate)?;
        if self.channels == 0 {
            return Err(CoreError::InvalidChannelCount(self.channels));
        }
        Ok(())
    }

    /// Arithmetic-mean downmix to mono, clipped to i16 range. Per §4.3 step 2.
    pub fn downmix_to_mono(&self) -> Vec<i16> {
        if self.channels <= 1 {
            return self.samples.to_vec();
        }
        let channels = self.channels as usize;
        self.samples
            .chunks(channels)
            .map(|chunk| {
                let sum: i64 = chunk.iter().map(|&s| s as i64).sum();
                let mean = sum / chunk.len() as i64;
                mean.clamp(i16::MIN as i64, i16::MAX as i64) as i16
            })
            .collect()
    }

    pub fn duration_ms(&self) -> f64 {
        let frames = self.samples.len() as f64 / self.channels.max(1) as f64;
        frames / self.sample_rate as f64 * 1000.0
    }
}

/// RMS of a mono PCM-16 buffer, each sample normalised by 32768 before
/// squaring (§4.3 step 4).
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    const NORMALIZE: f32 = 32768.0;
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let n = s as f32 / NORMALIZE;
            (n * n) as f64
        })
        .sum();
    ((sum_sq / samples.len() as f64).sqrt()) as f32
}

/// Concatenate a sequence of mono PCM-16 frames into one contiguous buffer.
pub fn concat_frames<'a>(frames: impl IntoIterator<Item = &'a [i16]>) -> Vec<i16> {
    let mut out = Vec::new();
    for frame in frames {
        out.extend_from_slice(frame);
    }
    out
}

/// Package mono PCM-16 samples as a standard little-endian RIFF/WAVE file.
pub fn pack_wav_mono16(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, CoreError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CoreError::Wav(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| CoreError::Wav(e.to_string()))?;
        }
        writer.finalize().map_err(|e| CoreError::Wav(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Parse a mono (or multi-channel, downmixed here) PCM-16 WAV file back into
/// samples and sample rate. Used by the round-trip-WAV test law (§8).
pub fn parse_wav_mono16(bytes: &[u8]) -> Result<(Vec<i16>, u32), CoreError> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| CoreError::Wav(e.to_string()))?;
    let spec = reader.spec();
    let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    let samples = samples.map_err(|e| CoreError::Wav(e.to_string()))?;
    if spec.channels <= 1 {
        Ok((samples, spec.sample_rate))
    } else {
        let frame = AudioFrame::new(samples, spec.sample_rate, spec.channels);
        Ok((frame.downmix_to_mono(), spec.sample_rate))
    }
}

/// Resample mono PCM-16 audio from `from_hz` to `to_hz` using a fixed-size
/// FFT resampler, falling back to linear interpolation for buffers too short
/// for the FFT resampler to accept.
pub fn resample_mono16(samples: &[i16], from_hz: u32, to_hz: u32) -> Result<Vec<i16>, CoreError> {
    if from_hz == to_hz || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let input: Vec<f64> = samples.iter().map(|&s| s as f64 / 32768.0).collect();

    let chunk_size = input.len();
    let resampled = match FftFixedIn::<f64>::new(from_hz as usize, to_hz as usize, chunk_size, 1, 1)
    {
        Ok(mut resampler) => {
            let output = resampler
                .process(&[input.clone()], None)
                .map_err(|e| CoreError::Resample(e.to_string()))?;
            output.into_iter().next().unwrap_or_default()
        }
        Err(_) => resample_linear(&input, from_hz, to_hz),
    };

    Ok(resampled
        .into_iter()
        .map(|s| (s * 32767.0).clamp(i16::MIN as f64, i16::MAX as f64) as i16)
        .collect())
}

fn resample_linear(input: &[f64], from_hz: u32, to_hz: u32) -> Vec<f64> {
    if input.is_empty() {
        return Vec::new();
    }
    let ratio = to_hz as f64 / from_hz as f64;
    let out_len = ((input.len() as f64) * ratio).round().max(1.0) as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = src_pos - idx as f64;
        let a = input[idx.min(input.len() - 1)];
        let b = input[(idx + 1).min(input.len() - 1)];
        output.push(a + (b - a) * frac);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let frame = AudioFrame::new(vec![10, 20, 30, 40], 16_000, 2);
        assert_eq!(frame.downmix_to_mono(), vec![15, 35]);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0, 0, 0, 0]), 0.0);
    }

    #[test]
    fn rms_of_full_scale_is_near_one() {
        let samples = vec![32767i16; 100];
        assert!(rms(&samples) > 0.99);
    }

    #[test]
    fn wav_round_trip_is_byte_identical() {
        let samples: Vec<i16> = (0..480).map(|i| (i * 7) as i16).collect();
        let wav = pack_wav_mono16(&samples, 48_000).unwrap();
        let (parsed, rate) = parse_wav_mono16(&wav).unwrap();
        assert_eq!(rate, 48_000);
        assert_eq!(parsed, samples);
    }

    #[test]
    fn sample_rate_rejects_out_of_range() {
        assert!(SampleRate::new(4_000).is_err());
        assert!(SampleRate::new(192_000).is_err());
        assert!(SampleRate::new(48_000).is_ok());
    }

    #[test]
    fn resample_identity_when_rates_match() {
        let samples = vec![1, 2, 3, 4];
        assert_eq!(resample_mono16(&samples, 16_000, 16_000).unwrap(), samples);
    }
}
