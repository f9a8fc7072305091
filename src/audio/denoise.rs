//! Noise suppression for the microphone path using nnnoiseless
//! (RNNoise-based). Stands in for the echo-cancelled, noise-suppressed
//! capture profile the session requires from its input device.

use nnnoiseless::DenoiseState;

use super::INPUT_SAMPLE_RATE;

/// Frame size required by nnnoiseless (480 samples at 48kHz = 10ms)
const DENOISE_FRAME_SIZE: usize = 480;

/// Sample rate nnnoiseless operates at
const DENOISE_SAMPLE_RATE: u32 = 48_000;

/// Suppressor for the 16kHz capture path. Samples are upsampled to 48kHz,
/// run through RNNoise in 10ms frames, and downsampled back.
pub struct NoiseSuppressor {
    state: Box<DenoiseState<'static>>,
    /// Accumulates 48kHz samples until a full RNNoise frame is available
    input_buffer: Vec<f32>,
    output_buffer: Vec<f32>,
    enabled: bool,
}

impl NoiseSuppressor {
    pub fn new() -> Self {
        Self {
            state: DenoiseState::new(),
            input_buffer: Vec::with_capacity(DENOISE_FRAME_SIZE * 4),
            output_buffer: Vec::with_capacity(DENOISE_FRAME_SIZE * 4),
            enabled: true,
        }
    }

    /// Enable or disable suppression. Disabling clears pending audio so a
    /// later re-enable starts clean.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.input_buffer.clear();
            self.output_buffer.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Process capture samples. Returns the suppressed samples available so
    /// far (may be shorter than the input while frames accumulate).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if !self.enabled {
            return samples.to_vec();
        }

        let upsampled = resample(samples, DENOISE_SAMPLE_RATE as f64 / INPUT_SAMPLE_RATE as f64);
        self.input_buffer.extend_from_slice(&upsampled);

        while self.input_buffer.len() >= DENOISE_FRAME_SIZE {
            let frame: Vec<f32> = self.input_buffer.drain(..DENOISE_FRAME_SIZE).collect();

            let mut input_frame = [0.0f32; DENOISE_FRAME_SIZE];
            let mut output_frame = [0.0f32; DENOISE_FRAME_SIZE];
            input_frame.copy_from_slice(&frame);

            self.state.process_frame(&mut output_frame, &input_frame);
            self.output_buffer.extend_from_slice(&output_frame);
        }

        let processed = resample(
            &self.output_buffer,
            INPUT_SAMPLE_RATE as f64 / DENOISE_SAMPLE_RATE as f64,
        );
        self.output_buffer.clear();
        processed
    }

    /// Reset suppressor state between sessions.
    pub fn reset(&mut self) {
        self.state = DenoiseState::new();
        self.input_buffer.clear();
        self.output_buffer.clear();
    }
}

impl Default for NoiseSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple linear resampling by ratio
fn resample(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() || (ratio - 1.0).abs() < f64::EPSILON {
        return samples.to_vec();
    }

    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 / ratio;
        let idx_floor = src_idx.floor() as usize;
        let idx_ceil = (idx_floor + 1).min(samples.len().saturating_sub(1));
        let frac = src_idx - idx_floor as f64;

        let sample = if idx_floor < samples.len() {
            let s1 = samples[idx_floor];
            let s2 = samples.get(idx_ceil).copied().unwrap_or(s1);
            s1 + (s2 - s1) * frac as f32
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}
