//! Stand-in audio devices for the terminal client.
//!
//! [`ToneCapture`] plays the role of a microphone by generating a sine
//! tone in real time. [`LevelMeter`] plays the role of a speaker by logging
//! the level of each scheduled block.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;
use walkie_common::AudioError;

use crate::ptt::{AudioCapture, AudioPlayback, BlockCallback, CaptureStream, ScheduledBlock};

pub struct ToneCapture {
    sample_rate: u32,
    block_samples: usize,
    frequency: f32,
}

impl ToneCapture {
    pub fn new(sample_rate: u32, block_samples: usize) -> Self {
        Self {
            sample_rate,
            block_samples,
            frequency: 440.0,
        }
    }

    /// `secs` of tone, for recorded audio messages.
    pub fn clip(&self, secs: f32) -> Vec<f32> {
        let n = (secs.max(0.0) * self.sample_rate as f32) as usize;
        tone(self.frequency, self.sample_rate, 0, n)
    }
}

fn tone(frequency: f32, sample_rate: u32, offset: usize, n: usize) -> Vec<f32> {
    (offset..offset + n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (t * frequency * 2.0 * PI).sin() * 0.5
        })
        .collect()
}

type SharedCallback = Arc<Mutex<Option<BlockCallback>>>;

struct ToneStream {
    callback: SharedCallback,
}

impl CaptureStream for ToneStream {
    fn close(&mut self) {
        if let Ok(mut cb) = self.callback.lock() {
            cb.take();
        }
    }
}

impl AudioCapture for ToneCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self, on_block: BlockCallback) -> Result<Box<dyn CaptureStream>, AudioError> {
        if self.sample_rate == 0 || self.block_samples == 0 {
            return Err(AudioError::NoDevice);
        }

        let callback: SharedCallback = Arc::new(Mutex::new(Some(on_block)));
        let shared = Arc::clone(&callback);
        let (rate, block, freq) = (self.sample_rate, self.block_samples, self.frequency);
        let period = Duration::from_secs_f64(block as f64 / rate as f64);

        std::thread::Builder::new()
            .name("walkie-tone".into())
            .spawn(move || {
                let mut offset = 0;
                loop {
                    std::thread::sleep(period);
                    let samples = tone(freq, rate, offset, block);
                    offset += block;
                    let Ok(mut guard) = shared.lock() else { break };
                    match guard.as_mut() {
                        Some(cb) => cb(&samples),
                        None => break,
                    }
                }
            })
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Box::new(ToneStream { callback }))
    }
}

/// Logs one line per relayed block with its RMS level.
#[derive(Default)]
pub struct LevelMeter;

impl AudioPlayback for LevelMeter {
    fn play(&mut self, block: ScheduledBlock) {
        let rms = if block.samples.is_empty() {
            0.0
        } else {
            let sum: f32 = block.samples.iter().map(|s| s * s).sum();
            (sum / block.samples.len() as f32).sqrt()
        };
        let bars = (rms * 40.0).round() as usize;
        let delay = block.start_at.saturating_duration_since(Instant::now());
        info!(
            delay_ms = delay.as_millis() as u64,
            "voice {}",
            "#".repeat(bars.min(40))
        );
    }
}
