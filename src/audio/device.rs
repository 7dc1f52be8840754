//! Microphone capture and speaker playback using cpal
//!
//! cpal streams are not `Send`, so each one lives on its own thread and is torn down by
//! a stop signal; samples and completions cross back over channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{
    AudioBackendConfig, AudioChunk, AudioDevices, BufferId, CaptureBackend, PlaybackContext,
    PlaybackEndedSender,
};
use super::codec::{downmix_to_mono, resample_linear, StreamResampler};
use super::volume::AnalyserTap;
use crate::error::{VoiceError, VoiceResult};

/// Default input and output devices of the default host
#[derive(Default)]
pub struct CpalDevices;

impl CpalDevices {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDevices for CpalDevices {
    fn open_playback(
        &self,
        sample_rate: u32,
        ended_tx: PlaybackEndedSender,
    ) -> VoiceResult<Box<dyn PlaybackContext>> {
        Ok(Box::new(CpalPlayback::open(sample_rate, ended_tx)?))
    }

    fn open_capture(&self, config: AudioBackendConfig) -> VoiceResult<Box<dyn CaptureBackend>> {
        Ok(Box::new(CpalCapture::new(config)))
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

/// A running stream thread and its stop signal
struct StreamThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl StreamThread {
    fn spawn<F, R>(name: &str, build: F, ready: R) -> VoiceResult<Self>
    where
        F: FnOnce() -> VoiceResult<Stream> + Send + 'static,
        R: FnOnce(VoiceResult<()>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build().and_then(|s| s.play().map(|_| s).map_err(Into::into)) {
                    Ok(stream) => {
                        ready(Ok(()));
                        stream
                    }
                    Err(e) => {
                        ready(Err(e));
                        return;
                    }
                };

                // Wait for stop signal (or the owner going away)
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| VoiceError::Device(format!("Failed to spawn audio thread: {}", e)))?;

        Ok(Self { stop_tx, handle })
    }

    fn shutdown(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            error!("Audio thread panicked");
        }
    }
}

// ============================================================================
// Capture
// ============================================================================

/// Turns device callbacks into fixed-size chunks at the service rate
struct ChunkAssembler {
    resampler: StreamResampler,
    target_rate: u32,
    chunk_size: usize,
    meter: Option<AnalyserTap>,
    pending: Vec<f32>,
    sequence: u64,
    tx: mpsc::Sender<AudioChunk>,
}

impl ChunkAssembler {
    fn push(&mut self, mono: &[f32]) {
        let resampled = self.resampler.process(mono);
        if let Some(meter) = &self.meter {
            meter.push(&resampled);
        }
        self.pending.extend(resampled);

        while self.pending.len() >= self.chunk_size {
            let samples: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            let chunk = AudioChunk {
                samples,
                sample_rate: self.target_rate,
                sequence: self.sequence,
            };
            self.sequence += 1;
            if self.tx.try_send(chunk).is_err() {
                warn!("Capture channel full, dropping chunk {}", self.sequence - 1);
            }
        }
    }
}

pub struct CpalCapture {
    config: AudioBackendConfig,
    thread: Option<StreamThread>,
}

impl CpalCapture {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for CpalCapture {
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioChunk>> {
        if self.thread.is_some() {
            return Err(VoiceError::Device("Already capturing".to_string()));
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::Device("No microphone available".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let (sample_format, stream_config) = {
            let supported = device.default_input_config()?;
            (supported.sample_format(), StreamConfig::from(supported))
        };

        info!(
            "Using microphone: {} ({}Hz, {} channels, {:?})",
            device_name, stream_config.sample_rate.0, stream_config.channels, sample_format
        );

        let (tx, rx) = mpsc::channel(32);
        let assembler = ChunkAssembler {
            resampler: StreamResampler::new(stream_config.sample_rate.0, self.config.sample_rate),
            target_rate: self.config.sample_rate,
            chunk_size: self.config.chunk_size.max(1),
            meter: self.config.meter.clone(),
            pending: Vec::with_capacity(self.config.chunk_size * 2),
            sequence: 0,
            tx,
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let thread = StreamThread::spawn(
            "mic-capture",
            move || match sample_format {
                SampleFormat::F32 => build_input::<f32>(&device, &stream_config, assembler),
                SampleFormat::I16 => build_input::<i16>(&device, &stream_config, assembler),
                SampleFormat::U16 => build_input::<u16>(&device, &stream_config, assembler),
                other => Err(VoiceError::Device(format!(
                    "Unsupported input sample format: {:?}",
                    other
                ))),
            },
            move |result| {
                let _ = ready_tx.send(result);
            },
        )?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.thread = Some(thread);
                info!("Microphone capture started");
                Ok(rx)
            }
            Ok(Err(e)) => {
                thread.shutdown();
                Err(e)
            }
            Err(_) => {
                thread.shutdown();
                Err(VoiceError::Device("Capture thread exited during startup".to_string()))
            }
        }
    }

    fn stop(&mut self) -> VoiceResult<()> {
        if let Some(thread) = self.thread.take() {
            thread.shutdown();
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut assembler: ChunkAssembler,
) -> VoiceResult<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
            assembler.push(&downmix_to_mono(&samples, channels));
        },
        |err| error!("Input stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

// ============================================================================
// Playback
// ============================================================================

struct Source {
    id: BufferId,
    start_frame: u64,
    samples: Arc<[f32]>,
}

impl Source {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

struct Mixer {
    sources: Vec<Source>,
    ended_tx: PlaybackEndedSender,
}

/// Speaker output whose clock counts rendered frames
pub struct CpalPlayback {
    requested_rate: u32,
    device_rate: u32,
    frames: Arc<AtomicU64>,
    mixer: Arc<Mutex<Mixer>>,
    thread: Option<StreamThread>,
}

impl CpalPlayback {
    pub fn open(sample_rate: u32, ended_tx: PlaybackEndedSender) -> VoiceResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| VoiceError::Device("No output device available".to_string()))?;

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.config();
        let device_rate = stream_config.sample_rate.0;

        info!(
            "Using output device: {} ({}Hz, {} channels)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            device_rate,
            stream_config.channels
        );

        let frames = Arc::new(AtomicU64::new(0));
        let mixer = Arc::new(Mutex::new(Mixer {
            sources: Vec::new(),
            ended_tx,
        }));

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let render_frames = Arc::clone(&frames);
        let render_mixer = Arc::clone(&mixer);
        let thread = StreamThread::spawn(
            "speaker-playback",
            move || match sample_format {
                SampleFormat::F32 => {
                    build_output::<f32>(&device, &stream_config, render_mixer, render_frames)
                }
                SampleFormat::I16 => {
                    build_output::<i16>(&device, &stream_config, render_mixer, render_frames)
                }
                SampleFormat::U16 => {
                    build_output::<u16>(&device, &stream_config, render_mixer, render_frames)
                }
                other => Err(VoiceError::Device(format!(
                    "Unsupported output sample format: {:?}",
                    other
                ))),
            },
            move |result| {
                let _ = ready_tx.send(result);
            },
        )?;

        // Stream construction is quick; block until the thread reports back
        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(VoiceError::Device(
                "Playback thread exited during startup".to_string(),
            ))
        });

        if let Err(e) = ready {
            thread.shutdown();
            return Err(e);
        }

        Ok(Self {
            requested_rate: sample_rate,
            device_rate,
            frames,
            mixer,
            thread: Some(thread),
        })
    }

    fn lock_mixer(&self) -> std::sync::MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PlaybackContext for CpalPlayback {
    fn sample_rate(&self) -> u32 {
        self.requested_rate
    }

    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn start(&mut self, id: BufferId, samples: Arc<[f32]>, at: f64) -> VoiceResult<()> {
        if self.thread.is_none() {
            return Err(VoiceError::Device("Playback context is closed".to_string()));
        }

        let samples: Arc<[f32]> = if self.requested_rate == self.device_rate {
            samples
        } else {
            resample_linear(&samples, self.requested_rate, self.device_rate).into()
        };
        let start_frame = (at.max(0.0) * self.device_rate as f64).round() as u64;

        self.lock_mixer().sources.push(Source {
            id,
            start_frame,
            samples,
        });
        debug!("Queued buffer {} at frame {}", id, start_frame);
        Ok(())
    }

    fn stop(&mut self, id: BufferId) {
        self.lock_mixer().sources.retain(|s| s.id != id);
    }

    fn close(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.lock_mixer().sources.clear();
            thread.shutdown();
            info!("Speaker playback closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.thread.is_none()
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    frames: Arc<AtomicU64>,
) -> VoiceResult<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut mixer = mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let base = frames.load(Ordering::Acquire);

            for (offset, frame) in data.chunks_mut(channels).enumerate() {
                let t = base + offset as u64;
                let value: f32 = mixer
                    .sources
                    .iter()
                    .filter(|s| s.start_frame <= t && t < s.end_frame())
                    .map(|s| s.samples[(t - s.start_frame) as usize])
                    .sum();
                let out = T::from_sample(value.clamp(-1.0, 1.0));
                frame.iter_mut().for_each(|slot| *slot = out);
            }

            let now = base + (data.len() / channels) as u64;
            frames.store(now, Ordering::Release);

            let Mixer { sources, ended_tx } = &mut *mixer;
            sources.retain(|s| {
                let done = s.end_frame() <= now;
                if done {
                    let _ = ended_tx.send(s.id);
                }
                !done
            });
        },
        |err| error!("Output stream error: {}", err),
        None,
    )?;
    Ok(stream)
}
