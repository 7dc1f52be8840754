use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::volume::AnalyserTap;
use crate::error::{VoiceError, VoiceResult};

/// A fixed-size block of mono microphone samples in `[-1, 1]`
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw samples (f32, mono)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Capture order, starting at 0
    pub sequence: u64,
}

impl AudioChunk {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Identifier of a buffer handed to a [`PlaybackContext`]
pub type BufferId = u64;

/// Completion notifications from a playback context, one per naturally finished buffer
pub type PlaybackEndedSender = mpsc::UnboundedSender<BufferId>;
pub type PlaybackEndedReceiver = mpsc::UnboundedReceiver<BufferId>;

/// Configuration for the capture side
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate the remote service expects (resampled if the device differs)
    pub sample_rate: u32,
    /// Samples per emitted chunk
    pub chunk_size: usize,
    /// Receives every captured sample as soon as the backend has it, ahead of chunking
    pub meter: Option<AnalyserTap>,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Live input rate
            chunk_size: 4096,   // ~256ms at 16kHz
            meter: None,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - cpal microphone (feature `device`)
/// - WAV file paced in real time (testing, offline runs)
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that yields chunks in capture order
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioChunk>>;

    /// Stop capturing and release the device. Safe to call more than once.
    fn stop(&mut self) -> VoiceResult<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// An output clock plus the ability to play buffers at absolute times on it.
///
/// Times are seconds in the context's own time base. Buffers that play to the end are
/// reported on the [`PlaybackEndedSender`] the context was opened with; buffers halted
/// through [`PlaybackContext::stop`] are not.
pub trait PlaybackContext: Send {
    fn sample_rate(&self) -> u32;

    /// Current time of the playback clock
    fn current_time(&self) -> f64;

    /// Schedule `samples` to begin at absolute time `at`
    fn start(&mut self, id: BufferId, samples: Arc<[f32]>, at: f64) -> VoiceResult<()>;

    /// Halt a scheduled or playing buffer immediately
    fn stop(&mut self, id: BufferId);

    /// Close the context. Safe to call more than once.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Opens the capture and playback sides for one session
pub trait AudioDevices: Send + Sync {
    fn open_playback(
        &self,
        sample_rate: u32,
        ended_tx: PlaybackEndedSender,
    ) -> VoiceResult<Box<dyn PlaybackContext>>;

    fn open_capture(&self, config: AudioBackendConfig) -> VoiceResult<Box<dyn CaptureBackend>>;

    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default microphone and speakers (requires the `device` feature)
    Microphone,
    /// WAV input paced in real time; reply audio optionally rendered to `output`
    File {
        input: PathBuf,
        output: Option<PathBuf>,
    },
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create the device pair for the requested source
    pub fn create(source: AudioSource) -> VoiceResult<Arc<dyn AudioDevices>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "device")]
                {
                    Ok(Arc::new(super::device::CpalDevices::new()))
                }

                #[cfg(not(feature = "device"))]
                {
                    Err(VoiceError::Device(
                        "Microphone capture requires building with the `device` feature".to_string(),
                    ))
                }
            }

            AudioSource::File { input, output } => {
                if !input.exists() {
                    return Err(VoiceError::Device(format!(
                        "Input file not found: {}",
                        input.display()
                    )));
                }
                Ok(Arc::new(super::file::FileDevices::new(input, output)))
            }
        }
    }
}
