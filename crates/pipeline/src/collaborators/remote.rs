//! Remote-HTTP collaborator implementations, built on `reqwest` (§6, §10.3).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{LlmBackend, SttBackend, SynthesizedAudio, TtsBackend};
use crate::error::PipelineError;

pub struct RemoteSttBackend {
    pub client: Client,
    pub endpoint_url: String,
    pub api_key: Option<String>,
    /// Tried in order until one yields non-empty text (§4.4 step 2).
    pub model_ids: Vec<String>,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct SttResponse {
    text: String,
}

#[async_trait]
impl SttBackend for RemoteSttBackend {
    async fn transcribe(&self, wav_path: &std::path::Path) -> Result<String, PipelineError> {
        let bytes = tokio::fs::read(wav_path).await?;
        for model in &self.model_ids {
            let part = reqwest::multipart::Part::bytes(bytes.clone())
                .file_name("utterance.wav")
                .mime_str("audio/wav")
                .map_err(|e| PipelineError::UnexpectedResponse(e.to_string()))?;
            let form = reqwest::multipart::Form::new()
                .text("model", model.clone())
                .part("file", part);

            let mut request = self.client.post(&self.endpoint_url).multipart(form);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let result = tokio::time::timeout(self.timeout, request.send()).await;
            let response = match result {
                Ok(Ok(r)) => r,
                _ => continue,
            };
            if !response.status().is_success() {
                continue;
            }
            match response.json::<SttResponse>().await {
                Ok(parsed) if !parsed.text.is_empty() => return Ok(parsed.text),
                _ => continue,
            }
        }
        Ok(String::new())
    }
}

pub struct HttpLlmBackend {
    pub client: Client,
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub model_id: String,
    pub session_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct LlmContentBlock {
    text: String,
}

#[derive(Deserialize)]
struct LlmOutputItem {
    content: Vec<LlmContentBlock>,
}

#[derive(Deserialize)]
struct LlmResponse {
    output: Vec<LlmOutputItem>,
}

#[async_trait]
impl LlmBackend for HttpLlmBackend {
    async fn reply(&self, input: &str) -> Result<String, PipelineError> {
        let mut request = self
            .client
            .post(&self.endpoint_url)
            .json(&json!({ "model": self.model_id, "input": input }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(session_key) = &self.session_key {
            request = request.header("X-Session-Key", session_key);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| PipelineError::Timeout)??;
        if !response.status().is_success() {
            return Err(PipelineError::UnexpectedResponse(format!(
                "llm endpoint returned {}",
                response.status()
            )));
        }
        let parsed: LlmResponse = response.json().await?;
        parsed
            .output
            .first()
            .and_then(|item| item.content.first())
            .map(|block| block.text.clone())
            .ok_or_else(|| PipelineError::UnexpectedResponse("llm response had no output[0].content[0].text".into()))
    }
}

pub struct RemoteTtsBackend {
    pub client: Client,
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub model_id: String,
    pub voice: String,
    pub format: String,
    pub timeout: Duration,
}

#[async_trait]
impl TtsBackend for RemoteTtsBackend {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError> {
        let mut request = self.client.post(&self.endpoint_url).json(&json!({
            "model": self.model_id,
            "voice": self.voice,
            "input": text,
            "response_format": self.format,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| PipelineError::Timeout)??;
        if !response.status().is_success() {
            return Err(PipelineError::UnexpectedResponse(format!(
                "tts endpoint returned {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?.to_vec();
        Ok((bytes, self.format.clone()))
    }
}
