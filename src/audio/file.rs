use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::backend::{
    AudioBackendConfig, AudioChunk, AudioDevices, CaptureBackend, PlaybackContext,
    PlaybackEndedSender,
};
use super::codec::{downmix_to_mono, resample_linear};
use super::render::RenderedPlayback;
use crate::error::{VoiceError, VoiceResult};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples normalised to `[-1, 1]`
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> VoiceResult<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .map_err(|e| VoiceError::Device(format!("Failed to open WAV file: {}", e)))?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let full_scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono samples at `sample_rate`
    pub fn to_mono(&self, sample_rate: u32) -> Vec<f32> {
        let mono = downmix_to_mono(&self.samples, self.channels);
        resample_linear(&mono, self.sample_rate, sample_rate)
    }
}

/// Meter updates per emitted chunk when replaying a file
const METER_SLICES: usize = 8;

/// Replays a WAV file as if it were a microphone, in real time.
///
/// Each chunk is released together with its last slice, and the level meter sees
/// the signal in slices along the way.
pub struct WavCapture {
    path: PathBuf,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl WavCapture {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for WavCapture {
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioChunk>> {
        if self.is_capturing() {
            return Err(VoiceError::Device("Already capturing".to_string()));
        }

        let audio = AudioFile::open(&self.path)?;
        let samples = audio.to_mono(self.config.sample_rate);
        let sample_rate = self.config.sample_rate;
        let chunk_size = self.config.chunk_size.max(1);
        let slice_size = (chunk_size / METER_SLICES).max(1);
        let period = Duration::from_secs_f64(slice_size as f64 / sample_rate.max(1) as f64);
        let meter = self.config.meter.clone();

        let (tx, rx) = mpsc::channel(32);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for (sequence, block) in samples.chunks(chunk_size).enumerate() {
                for slice in block.chunks(slice_size) {
                    ticker.tick().await;
                    if let Some(meter) = &meter {
                        meter.push(slice);
                    }
                }
                let chunk = AudioChunk {
                    samples: block.to_vec(),
                    sample_rate,
                    sequence: sequence as u64,
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            info!("File capture reached end of input");
        });

        self.task = Some(task);
        info!("File capture started: {}", self.path.display());

        Ok(rx)
    }

    fn stop(&mut self) -> VoiceResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

/// WAV file in, headless playback out
pub struct FileDevices {
    input: PathBuf,
    output: Option<PathBuf>,
}

impl FileDevices {
    pub fn new(input: PathBuf, output: Option<PathBuf>) -> Self {
        Self { input, output }
    }
}

impl AudioDevices for FileDevices {
    fn open_playback(
        &self,
        sample_rate: u32,
        ended_tx: PlaybackEndedSender,
    ) -> VoiceResult<Box<dyn PlaybackContext>> {
        Ok(Box::new(RenderedPlayback::new(
            sample_rate,
            ended_tx,
            self.output.clone(),
        )))
    }

    fn open_capture(&self, config: AudioBackendConfig) -> VoiceResult<Box<dyn CaptureBackend>> {
        Ok(Box::new(WavCapture::new(self.input.clone(), config)))
    }

    fn name(&self) -> &str {
        "file"
    }
}
