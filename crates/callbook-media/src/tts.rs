//! ElevenLabs speech synthesis: text in, complete audio clip out.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use callbook_core::config::TtsConfig;
use callbook_core::error::{CallbookError, Result};

use crate::SpeechSynthesizer;

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM"; // ElevenLabs "Rachel"

/// Voice identity and tuning applied to every clip.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub model_id: Option<String>,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl VoiceConfig {
    pub fn from_config(config: &TtsConfig) -> Self {
        Self {
            voice_id: config
                .resolve_voice_id()
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            model_id: config.model_id.clone(),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self::from_config(&TtsConfig::default())
    }
}

/// Build the ElevenLabs streaming TTS request URL for a given voice.
pub fn build_tts_url(base_url: &str, voice: &str) -> String {
    format!("{base_url}/v1/text-to-speech/{voice}/stream")
}

fn request_body(text: &str, voice: &VoiceConfig) -> serde_json::Value {
    let mut body = json!({
        "text": text,
        "voice_settings": {
            "stability": voice.stability,
            "similarity_boost": voice.similarity_boost,
        }
    });
    if let Some(model) = &voice.model_id {
        body["model_id"] = json!(model);
    }
    body
}

pub struct ElevenLabsSynthesizer {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: ELEVENLABS_BASE_URL.to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| CallbookError::Config("No TTS API key configured".into()))?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(CallbookError::Synthesis("nothing to synthesize".into()));
        }

        let url = build_tts_url(&self.base_url, &voice.voice_id);
        debug!(voice = %voice.voice_id, text_len = text.len(), "Requesting speech synthesis");

        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body(text, voice))
            .send()
            .await
            .map_err(|e| CallbookError::Synthesis(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CallbookError::Synthesis(format!(
                "TTS API error {status}: {body}"
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CallbookError::Synthesis(format!("reading audio failed: {e}")))?;
        if bytes.is_empty() {
            return Err(CallbookError::Synthesis("TTS returned no audio".into()));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_construction() {
        let url = build_tts_url(ELEVENLABS_BASE_URL, "Rachel");
        assert!(url.contains("Rachel"));
        assert!(url.ends_with("/stream"));
        assert!(url.starts_with("https://api.elevenlabs.io"));
    }

    #[test]
    fn test_body_carries_voice_settings() {
        let voice = VoiceConfig {
            voice_id: "v".into(),
            model_id: None,
            stability: 0.4,
            similarity_boost: 0.7,
        };
        let body = request_body("Thanks for waiting!", &voice);
        assert_eq!(body["text"], "Thanks for waiting!");
        assert!((body["voice_settings"]["stability"].as_f64().unwrap() - 0.4).abs() < 1e-6);
        assert!(body.get("model_id").is_none());
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_request() {
        let synth = ElevenLabsSynthesizer::new("k").with_base_url("http://127.0.0.1:9");
        let err = synth
            .synthesize("   ", &VoiceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CallbookError::Synthesis(_)));
    }
}
