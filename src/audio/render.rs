// Headless playback context: a monotonic clock plus an optional WAV rendering of
// everything that was played, for running sessions without speakers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::backend::{BufferId, PlaybackContext, PlaybackEndedSender};
use crate::error::{VoiceError, VoiceResult};

struct Pending {
    start_frame: usize,
    len: usize,
    timer: JoinHandle<()>,
}

pub struct RenderedPlayback {
    sample_rate: u32,
    origin: Instant,
    ended_tx: PlaybackEndedSender,
    pending: HashMap<BufferId, Pending>,
    /// Rendered output; only kept when `output` is set
    timeline: Vec<f32>,
    output: Option<PathBuf>,
    closed: bool,
}

impl RenderedPlayback {
    pub fn new(sample_rate: u32, ended_tx: PlaybackEndedSender, output: Option<PathBuf>) -> Self {
        info!(
            "Headless playback context opened ({}Hz, output: {})",
            sample_rate,
            output
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        Self {
            sample_rate,
            origin: Instant::now(),
            ended_tx,
            pending: HashMap::new(),
            timeline: Vec::new(),
            output,
            closed: false,
        }
    }

    /// Samples rendered so far (empty unless an output path was given)
    pub fn timeline(&self) -> &[f32] {
        &self.timeline
    }

    fn frame_at(&self, time: f64) -> usize {
        (time.max(0.0) * self.sample_rate as f64).round() as usize
    }

    fn write_wav(&self, path: &PathBuf) -> VoiceResult<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.timeline {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;

        info!(
            "Rendered {:.1}s of reply audio to {}",
            self.timeline.len() as f64 / self.sample_rate as f64,
            path.display()
        );
        Ok(())
    }
}

impl PlaybackContext for RenderedPlayback {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn start(&mut self, id: BufferId, samples: Arc<[f32]>, at: f64) -> VoiceResult<()> {
        if self.closed {
            return Err(VoiceError::Device("Playback context is closed".to_string()));
        }

        self.pending.retain(|_, p| !p.timer.is_finished());

        let start_frame = self.frame_at(at);
        let len = samples.len();

        if self.output.is_some() {
            let end = start_frame + len;
            if self.timeline.len() < end {
                self.timeline.resize(end, 0.0);
            }
            for (slot, &sample) in self.timeline[start_frame..end].iter_mut().zip(samples.iter()) {
                *slot += sample;
            }
        }

        let duration = len as f64 / self.sample_rate as f64;
        let deadline = self.origin + Duration::from_secs_f64(at.max(0.0) + duration);
        let ended_tx = self.ended_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = ended_tx.send(id);
        });

        self.pending.insert(id, Pending { start_frame, len, timer });
        Ok(())
    }

    fn stop(&mut self, id: BufferId) {
        let Some(pending) = self.pending.remove(&id) else {
            return;
        };
        pending.timer.abort();

        // Silence whatever had not been heard yet
        let now = self.frame_at(self.current_time());
        let end = (pending.start_frame + pending.len).min(self.timeline.len());
        let from = now.max(pending.start_frame).min(end);
        self.timeline[from..end].iter_mut().for_each(|s| *s = 0.0);
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for (_, pending) in self.pending.drain() {
            pending.timer.abort();
        }

        if let Some(path) = self.output.clone() {
            if self.timeline.is_empty() {
                warn!("No reply audio to render to {}", path.display());
            } else if let Err(e) = self.write_wav(&path) {
                error!("Failed to write rendered playback: {}", e);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for RenderedPlayback {
    fn drop(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.timer.abort();
        }
    }
}
