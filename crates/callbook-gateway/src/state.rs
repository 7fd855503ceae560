//! Gateway shared state.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use callbook_core::config::Config;
use callbook_core::error::Result;
use callbook_core::session_store::SessionStore;
use callbook_media::{ElevenLabsSynthesizer, VoiceConfig};
use callbook_providers::openai::OpenAiProvider;

use crate::audio_store::AudioStore;
use crate::pipeline::{Collaborators, TurnPipeline};

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub audio: Arc<AudioStore>,
    pub pipeline: Arc<TurnPipeline>,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, collaborators: Collaborators, audio: AudioStore) -> Self {
        let audio = Arc::new(audio);
        let pipeline = TurnPipeline::new(
            collaborators,
            audio.clone(),
            VoiceConfig::from_config(&config.tts()),
            config.conversation(),
            Duration::from_millis(config.gateway().hold_delay_ms),
        );
        Self {
            config,
            sessions: SessionStore::new(),
            audio,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Build the vendor-backed collaborators and load the hold asset.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let llm = OpenAiProvider::from_config(&config.llm())?;
        info!(provider = %llm.base_url, model = %llm.model, "Language model configured");
        let tts = ElevenLabsSynthesizer::from_config(&config.tts())?;
        let records = callbook_records::from_config(&config.records())?;
        info!(store = records.id(), "Record store configured");

        let audio = match config.conversation().hold_audio_path() {
            Some(path) => AudioStore::with_hold_file(&path)?,
            None => {
                info!("No hold audio configured, hold stage disabled");
                AudioStore::new()
            }
        };

        let collaborators = Collaborators {
            llm: Arc::new(llm),
            tts: Arc::new(tts),
            records,
        };
        Ok(Self::new(config, collaborators, audio))
    }
}
