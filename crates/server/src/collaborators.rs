//! Assembles the pluggable STT/LLM/TTS/decoder collaborators from `Settings`
//! into the fallback chains the turn pipeline and the `/assistant` endpoint
//! share (§10.3).

use std::sync::Arc;

use friday_voice_config::CollaboratorSettings;
use friday_voice_pipeline::collaborators::local::{LocalDecoder, LocalSttBackend, LocalTtsBackend};
use friday_voice_pipeline::collaborators::remote::{HttpLlmBackend, RemoteSttBackend, RemoteTtsBackend};
use friday_voice_pipeline::{AudioDecoder, LlmBackend, SttBackend, SttChain, TtsBackend, TtsChain};
use reqwest::Client;

pub struct CollaboratorBackends {
    pub stt_chain: SttChain,
    pub llm: Arc<dyn LlmBackend>,
    pub tts_chain: TtsChain,
    pub decoder: Arc<dyn AudioDecoder>,
}

impl CollaboratorBackends {
    pub fn build(settings: &CollaboratorSettings) -> Self {
        let client = Client::new();

        let primary_stt = settings.stt_binary_path.clone().map(|binary_path| {
            Arc::new(LocalSttBackend {
                binary_path,
                timeout: settings.stt_primary_timeout(),
            }) as Arc<dyn SttBackend>
        });
        let remote_stt = settings.stt_remote_api_key.clone().map(|api_key| {
            Arc::new(RemoteSttBackend {
                client: client.clone(),
                endpoint_url: settings.stt_remote_endpoint_url.clone(),
                api_key: Some(api_key),
                model_ids: settings.stt_model_ids.clone(),
                timeout: settings.stt_remote_timeout(),
            }) as Arc<dyn SttBackend>
        });

        let llm: Arc<dyn LlmBackend> = Arc::new(HttpLlmBackend {
            client: client.clone(),
            endpoint_url: settings.llm_endpoint_url.clone(),
            api_key: settings.llm_api_key.clone(),
            model_id: settings.llm_model_id.clone(),
            session_key: settings.session_key.clone(),
            timeout: settings.llm_timeout(),
        });

        let primary_tts = settings.tts_binary_path.clone().map(|binary_path| {
            Arc::new(LocalTtsBackend {
                binary_path,
                format: settings.tts_format.clone(),
                timeout: settings.tts_primary_timeout(),
            }) as Arc<dyn TtsBackend>
        });
        let remote_tts = settings.tts_remote_api_key.clone().map(|api_key| {
            Arc::new(RemoteTtsBackend {
                client: client.clone(),
                endpoint_url: settings.tts_remote_endpoint_url.clone(),
                api_key: Some(api_key),
                model_id: settings.tts_model_id.clone(),
                voice: settings.tts_voice.clone(),
                format: settings.tts_format.clone(),
                timeout: settings.tts_remote_timeout(),
            }) as Arc<dyn TtsBackend>
        });

        let decoder: Arc<dyn AudioDecoder> = Arc::new(LocalDecoder {
            binary_path: settings.decoder_binary_path.clone().unwrap_or_else(|| "ffmpeg".to_string()),
            timeout: settings.decode_timeout(),
        });

        Self {
            stt_chain: SttChain { primary: primary_stt, remote: remote_stt },
            llm,
            tts_chain: TtsChain { primary: primary_tts, remote: remote_tts },
            decoder,
        }
    }
}
