//! Media collaborators for speech-to-text and speech synthesis.

use async_trait::async_trait;

use callbook_core::error::Result;

pub mod stt;
pub mod tts;

pub use stt::HttpTranscriber;
pub use tts::{ElevenLabsSynthesizer, VoiceConfig};

/// Converts captured audio to text. Failures are `CallbookError::Recognition`.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Converts text to playable audio bytes. Failures are `CallbookError::Synthesis`.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>>;
}
