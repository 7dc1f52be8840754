//! PCM framing between the f32 samples used internally and the base64 16-bit
//! little-endian payloads the Live service exchanges.

use std::sync::Arc;

use base64::Engine;

use super::backend::AudioChunk;
use crate::error::{VoiceError, VoiceResult};
use crate::live::MediaBlob;

/// Converts captured chunks into outbound media blobs
#[derive(Debug, Clone)]
pub struct AudioEncoder {
    mime_type: String,
}

impl AudioEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            mime_type: pcm_mime_type(sample_rate),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Encode one chunk; never buffers across chunks
    pub fn encode(&self, chunk: &AudioChunk) -> MediaBlob {
        MediaBlob {
            mime_type: self.mime_type.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(f32_to_pcm16_bytes(&chunk.samples)),
        }
    }
}

/// A decoded, ready-to-schedule buffer
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Converts inbound payloads into playback buffers at the output rate
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    sample_rate: u32,
}

impl AudioDecoder {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn decode(&self, payload: &str) -> VoiceResult<PlaybackBuffer> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;

        if bytes.is_empty() {
            return Err(VoiceError::Decode("Empty audio payload".to_string()));
        }
        if bytes.len() % 2 != 0 {
            return Err(VoiceError::Decode(format!(
                "PCM payload has odd length {}",
                bytes.len()
            )));
        }

        Ok(PlaybackBuffer::new(pcm16_bytes_to_f32(&bytes), self.sample_rate))
    }
}

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Clamp to `[-1, 1]` and scale to signed 16-bit, little-endian
pub fn f32_to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| {
            let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
            (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

pub fn pcm16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Linear-interpolation resampler for mono signals
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}

/// Linear-interpolation resampler for a signal that arrives in blocks.
///
/// The read position and the last input sample carry over between calls, so feeding a
/// signal block by block yields the same output as resampling it in one piece.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    from_rate: u32,
    to_rate: u32,
    step: f64,
    /// Read position relative to the first frame of the next call (the carried sample)
    position: f64,
    carry: Option<f32>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            step: from_rate.max(1) as f64 / to_rate.max(1) as f64,
            position: 0.0,
            carry: None,
        }
    }

    pub fn process(&mut self, block: &[f32]) -> Vec<f32> {
        if self.from_rate == self.to_rate {
            return block.to_vec();
        }

        let mut frames = Vec::with_capacity(block.len() + 1);
        frames.extend(self.carry);
        frames.extend_from_slice(block);
        if frames.len() < 2 {
            self.carry = frames.last().copied();
            return Vec::new();
        }

        let mut out = Vec::with_capacity((block.len() as f64 / self.step).ceil() as usize + 1);
        let last = frames.len() - 1;
        while (self.position.floor() as usize) < last {
            let idx = self.position.floor() as usize;
            let frac = (self.position - idx as f64) as f32;
            out.push(frames[idx] + (frames[idx + 1] - frames[idx]) * frac);
            self.position += self.step;
        }

        // Everything before the final frame is consumed; it becomes the next carry
        self.position -= last as f64;
        self.carry = frames.last().copied();
        out
    }
}

/// Average interleaved frames down to one channel
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
