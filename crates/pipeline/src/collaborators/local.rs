//! Local-process collaborator implementations: each spawns the configured
//! binary, exchanges data through temp files where the interface calls for
//! a container file, and applies the relevant §5 timeout.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{AudioDecoder, SttBackend, SynthesizedAudio, TtsBackend};
use crate::error::PipelineError;

pub struct LocalSttBackend {
    pub binary_path: String,
    pub timeout: Duration,
}

#[async_trait]
impl SttBackend for LocalSttBackend {
    async fn transcribe(&self, wav_path: &Path) -> Result<String, PipelineError> {
        let binary = self.binary_path.clone();
        let wav_path = wav_path.to_path_buf();
        let work = async move {
            let output = Command::new(&binary)
                .arg(&wav_path)
                .output()
                .await
                .map_err(|e| PipelineError::Process(e.to_string()))?;
            if !output.status.success() {
                return Err(PipelineError::Process(format!(
                    "stt binary exited with {:?}",
                    output.status.code()
                )));
            }
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        };
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| PipelineError::Timeout)?
    }
}

pub struct LocalTtsBackend {
    pub binary_path: String,
    pub format: String,
    pub timeout: Duration,
}

#[async_trait]
impl TtsBackend for LocalTtsBackend {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError> {
        let out_file = tempfile::Builder::new()
            .suffix(&format!(".{}", self.format))
            .tempfile()?;
        let out_path = out_file.path().to_path_buf();
        let binary = self.binary_path.clone();
        let text = text.to_string();
        let format = self.format.clone();

        let work = async move {
            let status = Command::new(&binary)
                .arg(&text)
                .arg(&out_path)
                .status()
                .await
                .map_err(|e| PipelineError::Process(e.to_string()))?;
            if !status.success() {
                return Err(PipelineError::Process(format!(
                    "tts binary exited with {:?}",
                    status.code()
                )));
            }
            let bytes = tokio::fs::read(&out_path).await?;
            Ok((bytes, format))
        };

        // `out_file`'s Drop unlinks the temp file on every path, including
        // the early-returns above.
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| PipelineError::Timeout)?
    }
}

pub struct LocalDecoder {
    pub binary_path: String,
    pub timeout: Duration,
}

#[async_trait]
impl AudioDecoder for LocalDecoder {
    async fn decode(&self, bytes: &[u8], format_hint: &str, target_sample_rate: u32) -> Result<Vec<i16>, PipelineError> {
        let in_file = tempfile::Builder::new().suffix(&format!(".{format_hint}")).tempfile()?;
        tokio::fs::write(in_file.path(), bytes).await?;
        let out_file = tempfile::Builder::new().suffix(".pcm").tempfile()?;

        let binary = self.binary_path.clone();
        let in_path = in_file.path().to_path_buf();
        let out_path = out_file.path().to_path_buf();

        let work = async move {
            let status = Command::new(&binary)
                .args(["-y", "-i"])
                .arg(&in_path)
                .args(["-f", "s16le", "-ac", "1", "-ar", &target_sample_rate.to_string()])
                .arg(&out_path)
                .status()
                .await
                .map_err(|e| PipelineError::Process(e.to_string()))?;
            if !status.success() {
                return Err(PipelineError::Process(format!(
                    "decoder exited with {:?}",
                    status.code()
                )));
            }
            let raw = tokio::fs::read(&out_path).await?;
            Ok(pcm16_le_from_bytes(&raw))
        };

        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| PipelineError::Timeout)?
    }
}

fn pcm16_le_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// The `which` probe of §4.7: does `path` resolve to an executable?
pub async fn probe_binary_available(path: &str, timeout: Duration) -> bool {
    let path = path.to_string();
    let work = Command::new("which").arg(&path).output();
    matches!(tokio::time::timeout(timeout, work).await, Ok(Ok(output)) if output.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_finds_a_binary_known_to_exist() {
        assert!(probe_binary_available("sh", Duration::from_secs(3)).await);
    }

    #[tokio::test]
    async fn probe_rejects_a_binary_that_cannot_exist() {
        assert!(!probe_binary_available("definitely-not-a-real-binary-xyz", Duration::from_secs(3)).await);
    }

    #[test]
    fn pcm16_le_roundtrips() {
        let samples: Vec<i16> = vec![1, -2, 32000, -32000];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(pcm16_le_from_bytes(&bytes), samples);
    }
}
