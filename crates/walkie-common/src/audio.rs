//! Voice-channel audio frames and PCM conversion.
//!
//! A frame on the wire is a binary WebSocket message:
//!
//! ```text
//! [sample_rate: u32 LE][payload: 16-bit LE mono PCM ...]
//! ```
//!
//! The relay never looks inside the payload; only the holder check decides
//! whether a frame is forwarded.

use crate::errors::ProtocolError;

/// Bytes preceding the payload.
pub const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub data: Vec<u8>,
}

impl AudioFrame {
    pub fn new(sample_rate: u32, data: Vec<u8>) -> Self {
        Self { sample_rate, data }
    }

    /// Build a frame from captured float samples in `[-1.0, 1.0]`.
    pub fn from_samples(sample_rate: u32, samples: &[f32]) -> Self {
        Self::new(sample_rate, pcm_from_f32(samples))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::ShortFrame(bytes.len()));
        }
        let (header, payload) = bytes.split_at(HEADER_LEN);
        let sample_rate = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if sample_rate == 0 {
            return Err(ProtocolError::InvalidSampleRate);
        }
        Ok(Self::new(sample_rate, payload.to_vec()))
    }

    /// Number of 16-bit samples carried.
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    pub fn duration_secs(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate as f64
    }

    pub fn samples(&self) -> Vec<f32> {
        pcm_to_f32(&self.data)
    }
}

/// Clamp float samples and scale to 16-bit little-endian PCM.
pub fn pcm_from_f32(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Inverse of [`pcm_from_f32`]. A trailing odd byte is ignored.
pub fn pcm_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}
