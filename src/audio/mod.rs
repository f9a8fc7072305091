mod capture;
mod codec;
mod denoise;
mod playback;
mod visualizer;

pub use capture::CapturePipeline;
pub use codec::{decode_base64_pcm, decode_pcm16, encode_base64_pcm, encode_pcm16};
pub use denoise::NoiseSuppressor;
pub use playback::PlaybackScheduler;
pub use visualizer::{EnergyVisualizer, VisualFrame};

use serde::{Deserialize, Serialize};

/// Sample rate of the microphone path (what the remote endpoint ingests)
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of the agent audio path (what the remote endpoint emits)
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Channels (mono for voice)
pub const CHANNELS: u16 = 1;
/// Samples per captured frame (~256ms at 16kHz)
pub const SAMPLES_PER_FRAME: usize = 4096;

/// Encoded audio frame ready for transmission: base64 PCM16 plus a format
/// tag declaring the sample rate.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedFrame {
    pub data: String,
    pub mime_type: String,
}

impl EncodedFrame {
    /// Encode float samples for the wire at the given sample rate.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: codec::encode_base64_pcm(samples),
            mime_type: format!("audio/pcm;rate={}", sample_rate),
        }
    }
}
