pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use audio::{
    AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioDecoder, AudioDevices,
    AudioEncoder, AudioFile, AudioSource, PlaybackBuffer, PlaybackScheduler, VolumeAnalyzer,
};
pub use chat::{ChatMessage, ModelReply, QuizQuestion, TextChat, TextModel};
pub use config::Config;
pub use error::{VoiceError, VoiceResult};
pub use http::{create_router, AppState};
pub use live::{Connector, GeminiConnector, InboundEvent, LiveSetup};
pub use session::{
    ConversationState, ConversationStateMachine, EndReason, SessionConfig, SessionReport,
    SessionStats, TranscriptionAccumulator, TranscriptionTurn, VoiceSession,
};
