//! Opus encode/decode for the real WebRTC engine. PCM in this crate is
//! always signed 16-bit; Opus itself only ever touches the wire.

#![cfg(feature = "webrtc-engine")]

use audiopus::coder::{Decoder as OpusRawDecoder, Encoder as OpusRawEncoder};
use audiopus::{Application, Channels, SampleRate};
use parking_lot::Mutex;

use crate::error::TransportError;

/// 20ms at 48kHz mono is the largest frame we ever hand to the encoder;
/// allocate generously above that for the compressed output buffer.
const MAX_OPUS_PACKET_BYTES: usize = 4000;

pub struct OpusEncoder {
    inner: Mutex<OpusRawEncoder>,
}

impl OpusEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, TransportError> {
        let rate = opus_sample_rate(sample_rate)?;
        let ch = opus_channels(channels)?;
        let encoder = OpusRawEncoder::new(rate, ch, Application::Voip)
            .map_err(|e| TransportError::Media(format!("opus encoder init: {e}")))?;
        Ok(Self { inner: Mutex::new(encoder) })
    }

    pub fn encode(&self, samples: &[i16]) -> Result<Vec<u8>, TransportError> {
        let mut out = vec![0u8; MAX_OPUS_PACKET_BYTES];
        let written = self
            .inner
            .lock()
            .encode(samples, &mut out)
            .map_err(|e| TransportError::Media(format!("opus encode: {e}")))?;
        out.truncate(written);
        Ok(out)
    }
}

pub struct OpusDecoder {
    inner: Mutex<OpusRawDecoder>,
    channels: usize,
}

impl OpusDecoder {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, TransportError> {
        let rate = opus_sample_rate(sample_rate)?;
        let ch = opus_channels(channels)?;
        let decoder = OpusRawDecoder::new(rate, ch).map_err(|e| TransportError::Media(format!("opus decoder init: {e}")))?;
        Ok(Self {
            inner: Mutex::new(decoder),
            channels: channels as usize,
        })
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Vec<i16>, TransportError> {
        // 120ms is the largest Opus frame; size generously for the worst case.
        let mut out = vec![0i16; 5760 * self.channels.max(1)];
        let written = self
            .inner
            .lock()
            .decode(Some(payload), &mut out, false)
            .map_err(|e| TransportError::Media(format!("opus decode: {e}")))?;
        out.truncate(written * self.channels.max(1));
        Ok(out)
    }

    /// Packet-loss concealment for a dropped frame.
    pub fn decode_plc(&self) -> Result<Vec<i16>, TransportError> {
        let mut out = vec![0i16; 5760 * self.channels.max(1)];
        let written = self
            .inner
            .lock()
            .decode(None, &mut out, false)
            .map_err(|e| TransportError::Media(format!("opus plc: {e}")))?;
        out.truncate(written * self.channels.max(1));
        Ok(out)
    }
}

fn opus_sample_rate(hz: u32) -> Result<SampleRate, TransportError> {
    match hz {
        8_000 => Ok(SampleRate::Hz8000),
        12_000 => Ok(SampleRate::Hz12000),
        16_000 => Ok(SampleRate::Hz16000),
        24_000 => Ok(SampleRate::Hz24000),
        48_000 => Ok(SampleRate::Hz48000),
        other => Err(TransportError::Media(format!("unsupported opus sample rate: {other}"))),
    }
}

fn opus_channels(channels: u16) -> Result<Channels, TransportError> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        other => Err(TransportError::Media(format!("unsupported opus channel count: {other}"))),
    }
}
