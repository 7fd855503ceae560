//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level Callbook configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<TranscriptionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<RecordsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Delay before hold audio starts playing during a turn.
    #[serde(default = "default_hold_delay_ms")]
    pub hold_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            hold_delay_ms: default_hold_delay_ms(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_hold_delay_ms() -> u64 {
    2000
}

// --- Collaborator configs ---

/// OpenAI-compatible chat completions endpoint used for extraction and replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            api_key_env: default_llm_api_key_env(),
            model: default_llm_model(),
            temperature: None,
            timeout_ms: default_llm_timeout_ms(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.deepseek.com".into()
}

fn default_llm_api_key_env() -> Option<String> {
    Some("DEEPSEEK_API_KEY".into())
}

fn default_llm_model() -> String {
    "deepseek-chat".into()
}

fn default_llm_timeout_ms() -> u64 {
    30_000
}

impl LlmConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Text-to-speech (ElevenLabs) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_tts_api_key_env")]
    pub api_key_env: Option<String>,

    /// Voice identity used for every synthesized clip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,

    #[serde(default = "default_voice_id_env")]
    pub voice_id_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    #[serde(default = "default_stability")]
    pub stability: f32,

    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_tts_api_key_env(),
            voice_id: None,
            voice_id_env: default_voice_id_env(),
            model_id: None,
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
        }
    }
}

fn default_tts_api_key_env() -> Option<String> {
    Some("ELEVENLABS_API_KEY".into())
}

fn default_voice_id_env() -> Option<String> {
    Some("VOICE_ID".into())
}

fn default_stability() -> f32 {
    0.4
}

fn default_similarity_boost() -> f32 {
    0.7
}

impl TtsConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }

    pub fn resolve_voice_id(&self) -> Option<String> {
        resolve_secret_field(&self.voice_id, &self.voice_id_env)
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Provider: "deepgram", "openai" or "groq" (default: "deepgram").
    #[serde(default = "default_transcription_provider")]
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// MIME type of the captured audio sent for recognition.
    #[serde(default = "default_capture_content_type")]
    pub content_type: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: default_transcription_provider(),
            api_key: None,
            api_key_env: None,
            model: None,
            content_type: default_capture_content_type(),
        }
    }
}

fn default_transcription_provider() -> String {
    "deepgram".into()
}

fn default_capture_content_type() -> String {
    "audio/wav".into()
}

impl TranscriptionConfig {
    /// Resolve the API key, falling back to the provider's conventional env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        let fallback_env = match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            "groq" => "GROQ_API_KEY",
            _ => "DEEPGRAM_API_KEY",
        };
        resolve_secret_field(&self.api_key, &self.api_key_env)
            .or_else(|| resolve_secret_field(&None, &Some(fallback_env.to_string())))
    }
}

/// Booking record persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// Provider: "airtable" or "memory" (default: "airtable").
    #[serde(default = "default_records_provider")]
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_records_api_key_env")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_id: Option<String>,

    #[serde(default = "default_records_base_id_env")]
    pub base_id_env: Option<String>,

    #[serde(default = "default_records_table")]
    pub table: String,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            provider: default_records_provider(),
            api_key: None,
            api_key_env: default_records_api_key_env(),
            base_id: None,
            base_id_env: default_records_base_id_env(),
            table: default_records_table(),
        }
    }
}

fn default_records_provider() -> String {
    "airtable".into()
}

fn default_records_api_key_env() -> Option<String> {
    Some("AIRTABLE_API_KEY".into())
}

fn default_records_base_id_env() -> Option<String> {
    Some("AIRTABLE_BASE_ID".into())
}

fn default_records_table() -> String {
    "Conversations".into()
}

impl RecordsConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }

    pub fn resolve_base_id(&self) -> Option<String> {
        resolve_secret_field(&self.base_id, &self.base_id_env)
    }
}

// --- Conversation script ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Phrases spoken immediately after a transcript arrives.
    #[serde(default = "default_filler_phrases")]
    pub filler_phrases: Vec<String>,

    /// Short phrase spoken right before the generated reply.
    #[serde(default = "default_acknowledgment")]
    pub acknowledgment: String,

    /// Spoken when reply generation produced nothing.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Case-insensitive substrings that end the conversation.
    #[serde(default = "default_goodbye_phrases")]
    pub goodbye_phrases: Vec<String>,

    /// Looped background audio played while a turn takes long.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_audio_path: Option<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            filler_phrases: default_filler_phrases(),
            acknowledgment: default_acknowledgment(),
            fallback_reply: default_fallback_reply(),
            goodbye_phrases: default_goodbye_phrases(),
            hold_audio_path: None,
        }
    }
}

fn default_filler_phrases() -> Vec<String> {
    vec![
        "Alright, please, give me a second. I'll get back to you shortly...".into(),
        "Let me check that for you. Please stay with me...".into(),
        "Got it. please, give me a second. I'll get back to you shortly...".into(),
    ]
}

fn default_acknowledgment() -> String {
    "Thanks for waiting!".into()
}

fn default_fallback_reply() -> String {
    "Sorry, I didn't quite get that. Could you say it again?".into()
}

fn default_goodbye_phrases() -> Vec<String> {
    [
        "goodbye",
        "bye",
        "that's all",
        "no that’s all",
        "nothing else",
        "no more",
        "thank you",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl ConversationConfig {
    /// Resolve the hold audio path with `~` expansion.
    pub fn hold_audio_path(&self) -> Option<PathBuf> {
        self.hold_audio_path.as_ref().map(|p| {
            let expanded = shellexpand::tilde(p);
            PathBuf::from(expanded.as_ref())
        })
    }
}

// --- Client ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Hard upper bound on a single capture window.
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    /// Recorder emitting raw 16-bit 16 kHz mono PCM on stdout.
    #[serde(default = "default_capture_command")]
    pub capture_command: Vec<String>,

    /// Player reading an audio clip from stdin.
    #[serde(default = "default_player_command")]
    pub player_command: Vec<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            capture_timeout_ms: default_capture_timeout_ms(),
            capture_command: default_capture_command(),
            player_command: default_player_command(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_server_url() -> String {
    "ws://localhost:3000/ws".into()
}

fn default_capture_timeout_ms() -> u64 {
    15_000
}

fn default_capture_command() -> Vec<String> {
    ["arecord", "-q", "-f", "S16_LE", "-r", "16000", "-c", "1", "-t", "raw"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_player_command() -> Vec<String> {
    ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet", "-i", "-"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

// --- Logging ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "callbook_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::CallbookError::Io)?;
        Self::parse(&raw)
    }

    /// Parse config source text.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let substituted = substitute_env_vars(raw);
        json5::from_str(&substituted)
            .map_err(|e| crate::error::CallbookError::Config(e.to_string()))
    }

    /// Default config file location: `~/.callbook/config.json5`.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json5")
    }

    pub fn gateway(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(3000)
    }

    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    pub fn tts(&self) -> TtsConfig {
        self.tts.clone().unwrap_or_default()
    }

    pub fn transcription(&self) -> TranscriptionConfig {
        self.transcription.clone().unwrap_or_default()
    }

    pub fn records(&self) -> RecordsConfig {
        self.records.clone().unwrap_or_default()
    }

    pub fn conversation(&self) -> ConversationConfig {
        self.conversation.clone().unwrap_or_default()
    }

    pub fn client(&self) -> ClientConfig {
        self.client.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.llm().resolve_api_key().is_none() {
            warnings.push("Language model has no API key configured".to_string());
        }

        let tts = self.tts();
        if tts.resolve_api_key().is_none() {
            warnings.push("Speech synthesis has no API key configured".to_string());
        }
        if tts.resolve_voice_id().is_none() {
            warnings.push("Speech synthesis has no voice configured".to_string());
        }

        let records = self.records();
        if records.provider == "airtable"
            && (records.resolve_api_key().is_none() || records.resolve_base_id().is_none())
        {
            warnings.push(
                "Airtable records are missing an API key or base id; records stay in memory"
                    .to_string(),
            );
        }

        let gateway = self.gateway();
        if gateway.port == 0 {
            errors.push("Gateway port cannot be 0".to_string());
        }
        if gateway.hold_delay_ms == 0 {
            errors.push("Gateway hold delay cannot be 0".to_string());
        }

        let conversation = self.conversation();
        if conversation.filler_phrases.is_empty() {
            errors.push("Conversation needs at least one filler phrase".to_string());
        }
        if let Some(path) = conversation.hold_audio_path() {
            if !path.exists() {
                errors.push(format!("Hold audio file not found: {}", path.display()));
            }
        }

        if self.client().capture_timeout_ms == 0 {
            errors.push("Client capture timeout cannot be 0".to_string());
        }

        (warnings, errors)
    }
}

/// Base directory for Callbook data: `~/.callbook/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".callbook")
}
