pub mod backend;
pub mod codec;
pub mod file;
pub mod render;
pub mod scheduler;
pub mod volume;

#[cfg(feature = "device")]
pub mod device;

pub use backend::{
    AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioDevices, AudioSource, BufferId,
    CaptureBackend, PlaybackContext, PlaybackEndedReceiver, PlaybackEndedSender,
};
pub use codec::{AudioDecoder, AudioEncoder, PlaybackBuffer};
pub use file::{AudioFile, FileDevices, WavCapture};
pub use render::RenderedPlayback;
pub use scheduler::{PlaybackScheduler, PlaybackSignal, ScheduledBuffer};
pub use volume::{AnalyserTap, VolumeAnalyzer};
