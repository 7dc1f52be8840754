use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::config::SessionConfig;
use crate::audio::volume::spawn_meter;
use crate::audio::{
    AnalyserTap, AudioBackendConfig, AudioChunk, AudioDevices, CaptureBackend,
    PlaybackEndedSender, PlaybackScheduler, VolumeAnalyzer,
};
use crate::error::VoiceResult;

/// Everything a session holds on the audio side: the microphone, the playback context
/// (through its scheduler), and the volume meter loop.
///
/// Each resource is an `Option` that `release` takes, so releasing twice, or after a
/// partial acquisition, touches every resource at most once.
pub struct CaptureHandles {
    capture: Option<Box<dyn CaptureBackend>>,
    scheduler: Option<PlaybackScheduler>,
    meter: Option<JoinHandle<()>>,
    tap: AnalyserTap,
    volume_tx: watch::Sender<f32>,
}

impl CaptureHandles {
    fn empty(tap: AnalyserTap, volume_tx: watch::Sender<f32>) -> Self {
        Self {
            capture: None,
            scheduler: None,
            meter: None,
            tap,
            volume_tx,
        }
    }

    /// Open playback, start the microphone and the volume meter.
    ///
    /// On failure everything acquired so far is released before the error is returned.
    pub async fn acquire(
        devices: &dyn AudioDevices,
        config: &SessionConfig,
        ended_tx: PlaybackEndedSender,
        volume_tx: watch::Sender<f32>,
    ) -> VoiceResult<(Self, mpsc::Receiver<AudioChunk>)> {
        info!("Acquiring audio resources ({})", devices.name());

        let mut handles = Self::empty(AnalyserTap::new(config.fft_size), volume_tx);

        match handles.acquire_into(devices, config, ended_tx).await {
            Ok(capture_rx) => {
                info!("Audio resources acquired");
                Ok((handles, capture_rx))
            }
            Err(e) => {
                error!("Audio acquisition failed: {}", e);
                handles.release();
                Err(e)
            }
        }
    }

    async fn acquire_into(
        &mut self,
        devices: &dyn AudioDevices,
        config: &SessionConfig,
        ended_tx: PlaybackEndedSender,
    ) -> VoiceResult<mpsc::Receiver<AudioChunk>> {
        let playback = devices.open_playback(config.output_sample_rate, ended_tx)?;
        self.scheduler = Some(PlaybackScheduler::new(playback));

        let capture_config = AudioBackendConfig {
            meter: Some(self.tap.clone()),
            ..config.capture_config()
        };
        let capture = self.capture.insert(devices.open_capture(capture_config)?);
        let capture_rx = capture.start().await?;

        self.meter = Some(spawn_meter(
            VolumeAnalyzer::new(config.fft_size, config.volume_scale),
            self.tap.clone(),
            config.analysis_rate_hz,
            self.volume_tx.clone(),
        ));

        Ok(capture_rx)
    }

    pub fn scheduler(&self) -> Option<&PlaybackScheduler> {
        self.scheduler.as_ref()
    }

    pub fn scheduler_mut(&mut self) -> Option<&mut PlaybackScheduler> {
        self.scheduler.as_mut()
    }

    pub fn is_released(&self) -> bool {
        self.capture.is_none() && self.scheduler.is_none() && self.meter.is_none()
    }

    /// Stop the meter loop, the microphone, every scheduled buffer, and the playback
    /// context. Safe to call any number of times.
    pub fn release(&mut self) {
        if self.is_released() {
            return;
        }

        if let Some(meter) = self.meter.take() {
            meter.abort();
        }
        self.volume_tx.send_replace(0.0);

        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.stop() {
                error!("Failed to stop {}: {}", capture.name(), e);
            }
        }

        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.close();
        }

        info!("Audio resources released");
    }
}

impl Drop for CaptureHandles {
    fn drop(&mut self) {
        self.release();
    }
}
