//! Loudness indicator for the capture signal.
//!
//! Mirrors a browser analyser node: Blackman-windowed spectrum, temporal smoothing,
//! magnitudes mapped to bytes over a fixed decibel range, then the mean across bins
//! scaled into `[0, 100]`.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const SMOOTHING: f32 = 0.8;

pub struct VolumeAnalyzer {
    fft_size: usize,
    scale: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl VolumeAnalyzer {
    pub fn new(fft_size: usize, scale: f32) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        Self {
            fft_size,
            scale,
            fft,
            window: blackman(fft_size),
            spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Volume of the most recent `fft_size` samples of `signal`, in `[0, 100]`
    pub fn analyze(&mut self, signal: &[f32]) -> f32 {
        self.load_frame(signal);
        self.fft.process(&mut self.spectrum);

        let n = self.fft_size as f32;
        let bins = self.fft_size / 2;
        let mut byte_sum = 0.0f32;

        for (k, bin) in self.spectrum[..bins].iter().enumerate() {
            let magnitude = bin.norm() / n;
            let smoothed = SMOOTHING * self.smoothed[k] + (1.0 - SMOOTHING) * magnitude;
            self.smoothed[k] = if smoothed.is_finite() { smoothed } else { 0.0 };
            byte_sum += to_byte(self.smoothed[k]);
        }

        let mean = byte_sum / bins as f32;
        let volume = mean * self.scale;
        if volume.is_finite() {
            volume.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// Window the tail of `signal` into the FFT buffer, zero-padding on the left
    fn load_frame(&mut self, signal: &[f32]) {
        let tail = &signal[signal.len().saturating_sub(self.fft_size)..];
        let pad = self.fft_size - tail.len();

        for (i, slot) in self.spectrum.iter_mut().enumerate() {
            let x = if i < pad { 0.0 } else { tail[i - pad] };
            let x = if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };
            *slot = Complex::new(x * self.window[i], 0.0);
        }
    }
}

fn to_byte(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0).floor()
}

fn blackman(size: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42f32, 0.5f32, 0.08f32);
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Rolling window of the latest capture samples, shared with the meter loop
#[derive(Clone, Debug)]
pub struct AnalyserTap {
    capacity: usize,
    samples: Arc<Mutex<VecDeque<f32>>>,
}

impl AnalyserTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn push(&self, chunk: &[f32]) {
        let mut samples = self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let keep = &chunk[chunk.len().saturating_sub(self.capacity)..];
        let len = samples.len();
        let overflow = (len + keep.len()).saturating_sub(self.capacity).min(len);
        samples.drain(..overflow);
        samples.extend(keep.iter().copied());
    }

    pub fn snapshot(&self) -> Vec<f32> {
        let samples = self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        samples.iter().copied().collect()
    }
}

/// Spawn the analysis loop: one volume sample per tick until the task is aborted
pub fn spawn_meter(
    mut analyzer: VolumeAnalyzer,
    tap: AnalyserTap,
    rate_hz: u32,
    volume_tx: watch::Sender<f32>,
) -> JoinHandle<()> {
    let period = Duration::from_secs_f64(1.0 / rate_hz.max(1) as f64);

    tokio::spawn(async move {
        debug!("Volume meter started ({} Hz)", rate_hz);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let volume = analyzer.analyze(&tap.snapshot());
            volume_tx.send_replace(volume);
        }
    })
}
