//! Speech-to-text over HTTP (Deepgram prerecorded or Whisper-compatible).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use callbook_core::config::TranscriptionConfig;
use callbook_core::error::{CallbookError, Result};

use crate::SpeechToText;

const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";
const OPENAI_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const GROQ_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";

/// Wrap raw 16-bit PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_len = pcm.len() * 2; // 2 bytes per i16 sample
    let byte_rate = sample_rate * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let file_size = 36 + data_len as u32;

    let mut wav = Vec::with_capacity(44 + data_len);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &sample in pcm {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

/// Decode little-endian 16-bit PCM bytes. A trailing odd byte is dropped.
pub fn pcm_from_le_bytes(raw: &[u8]) -> Vec<i16> {
    raw.chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// A WAV container with no samples, as produced by a silent capture.
pub fn is_empty_wav(audio: &[u8]) -> bool {
    audio.len() <= 44 && audio.starts_with(b"RIFF")
}

/// Wire format used by a transcription provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttApi {
    /// Raw audio body, JSON result (Deepgram).
    Deepgram,
    /// Multipart upload, plain-text result (OpenAI / Groq).
    Whisper,
}

/// Get the transcription API URL and wire format for a given provider.
pub fn provider_endpoint(provider: &str) -> (&'static str, SttApi) {
    match provider {
        "openai" => (OPENAI_URL, SttApi::Whisper),
        "groq" => (GROQ_URL, SttApi::Whisper),
        _ => (DEEPGRAM_URL, SttApi::Deepgram),
    }
}

fn default_model(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("whisper-1"),
        "groq" => Some("whisper-large-v3-turbo"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Debug, Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    #[serde(default)]
    transcript: String,
}

/// Extract `results.channels[0].alternatives[0].transcript`.
pub fn parse_deepgram(body: &str) -> Result<String> {
    let response: DeepgramResponse = serde_json::from_str(body)
        .map_err(|e| CallbookError::Recognition(format!("malformed Deepgram response: {e}")))?;
    response
        .results
        .channels
        .into_iter()
        .next()
        .and_then(|c| c.alternatives.into_iter().next())
        .map(|a| a.transcript.trim().to_string())
        .ok_or_else(|| CallbookError::Recognition("Deepgram response had no alternatives".into()))
}

/// HTTP speech-to-text client.
pub struct HttpTranscriber {
    url: String,
    api: SttApi,
    api_key: String,
    model: Option<String>,
    content_type: String,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| CallbookError::Config("No transcription API key configured".into()))?;
        let (url, api) = provider_endpoint(&config.provider);
        Ok(Self {
            url: url.to_string(),
            api,
            api_key,
            model: config
                .model
                .clone()
                .or_else(|| default_model(&config.provider).map(String::from)),
            content_type: config.content_type.clone(),
            client: reqwest::Client::new(),
        })
    }

    /// Point the client at a different endpoint (proxies, tests).
    pub fn with_url(mut self, url: impl Into<String>, api: SttApi) -> Self {
        self.url = url.into();
        self.api = api;
        self
    }

    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", &self.content_type)
            .body(audio.to_vec());
        if let Some(model) = &self.model {
            request = request.query(&[("model", model.as_str())]);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| CallbookError::Recognition(format!("request failed: {e}")))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CallbookError::Recognition(format!(
                "Deepgram API error {status}: {body}"
            )));
        }
        parse_deepgram(&body)
    }

    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        let extension = match self.content_type.as_str() {
            "audio/webm" => "webm",
            "audio/mpeg" => "mp3",
            "audio/ogg" => "ogg",
            _ => "wav",
        };
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(format!("audio.{extension}"))
            .mime_str(&self.content_type)
            .map_err(|e| CallbookError::Recognition(format!("invalid content type: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone().unwrap_or_else(|| "whisper-1".into()))
            .text("response_format", "text")
            .part("file", part);

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CallbookError::Recognition(format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CallbookError::Recognition(format!(
                "Transcription API error {status}: {body}"
            )));
        }
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl SpeechToText for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        if audio.is_empty() {
            return Err(CallbookError::Recognition("no audio captured".into()));
        }
        if is_empty_wav(audio) {
            debug!("Silent capture, skipping transcription");
            return Ok(String::new());
        }
        debug!(url = %self.url, api = ?self.api, bytes = audio.len(), "Sending audio for transcription");
        match self.api {
            SttApi::Deepgram => self.transcribe_deepgram(audio).await,
            SttApi::Whisper => self.transcribe_whisper(audio).await,
        }
    }
}
