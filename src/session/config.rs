use serde::{Deserialize, Serialize};

use crate::audio::AudioBackendConfig;
use crate::config::{Config, DEFAULT_SYSTEM_INSTRUCTION};
use crate::live::LiveSetup;

/// Configuration for a live voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "voice-5f0c...")
    pub session_id: String,

    /// Live model name
    pub model: String,

    /// Behaviour-governing instruction sent on open
    pub system_instruction: String,

    /// Credential for the remote service; `None` fails `start` before any device access
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Microphone rate the service expects (16kHz)
    pub input_sample_rate: u32,

    /// Rate of the synthesized audio streamed back (24kHz)
    pub output_sample_rate: u32,

    /// Samples per captured chunk
    pub chunk_size: usize,

    pub fft_size: usize,
    pub volume_scale: f32,
    pub analysis_rate_hz: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: new_session_id(),
            model: "models/gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            api_key: None,
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            chunk_size: 4096,
            fft_size: 256,
            volume_scale: 2.5,
            analysis_rate_hz: 60,
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            session_id: new_session_id(),
            model: config.live.model.clone(),
            system_instruction: config.live.system_instruction.clone(),
            api_key: config.live.resolve_api_key(),
            input_sample_rate: config.audio.input_sample_rate,
            output_sample_rate: config.audio.output_sample_rate,
            chunk_size: config.audio.chunk_size,
            fft_size: config.audio.fft_size,
            volume_scale: config.audio.volume_scale,
            analysis_rate_hz: config.audio.analysis_rate_hz,
        }
    }

    pub fn capture_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            sample_rate: self.input_sample_rate,
            chunk_size: self.chunk_size,
            meter: None,
        }
    }

    /// Open request for the remote service, if a credential is present
    pub fn live_setup(&self) -> Option<LiveSetup> {
        let api_key = self.api_key.clone().filter(|k| !k.trim().is_empty())?;
        Some(LiveSetup {
            model: self.model.clone(),
            system_instruction: self.system_instruction.clone(),
            api_key,
        })
    }
}

pub fn new_session_id() -> String {
    format!("voice-{}", uuid::Uuid::new_v4())
}
