use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "Tu es un assistant pédagogique spécialisé en droit public. \
Réponds oralement, de façon claire et concise, et pose des questions pour vérifier la compréhension de l'étudiant.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Remote conversational-audio service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Websocket endpoint of the bidirectional Live service
    pub endpoint: String,
    pub model: String,
    /// Inline credential; takes precedence over `api_key_env`
    pub api_key: Option<String>,
    /// Environment variable holding the credential
    pub api_key_env: String,
    pub system_instruction: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate the service expects for microphone input
    pub input_sample_rate: u32,
    /// Sample rate of the synthesized audio the service streams back
    pub output_sample_rate: u32,
    /// Samples per captured chunk
    pub chunk_size: usize,
    pub fft_size: usize,
    pub volume_scale: f32,
    /// Volume analysis ticks per second
    pub analysis_rate_hz: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "lex-live".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            model: "models/gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            chunk_size: 4096,
            fft_size: 256,
            volume_scale: 2.5,
            analysis_rate_hz: 60,
        }
    }
}

impl LiveConfig {
    /// Resolve the credential from the inline value or the configured environment variable.
    ///
    /// Blank values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LEX_LIVE").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }
}
