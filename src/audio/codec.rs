//! PCM16 wire codec
//! Converts float samples to the 16-bit little-endian wire format and back,
//! with base64 wrapping for the text transport.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::VoiceError;

/// Encode float samples in [-1, 1] to PCM16 little-endian bytes.
/// Out-of-range samples are clamped before quantizing.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let quantized = (clamped * 32767.0) as i16;
        out.extend_from_slice(&quantized.to_le_bytes());
    }
    out
}

/// Decode PCM16 little-endian bytes to float samples normalized to [-1, 1].
/// Interleaved multi-channel input is averaged down to mono.
pub fn decode_pcm16(bytes: &[u8], channels: u16) -> Result<Vec<f32>, VoiceError> {
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::Decode(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }
    let channels = channels.max(1) as usize;

    let ints: &[i16] = match bytemuck::try_cast_slice(bytes) {
        Ok(ints) => ints,
        Err(_) => {
            // Unaligned payload; fall back to a manual LE read
            return Ok(chunk_decode(bytes, channels));
        }
    };

    let frame_count = ints.len() / channels;
    let mut out = Vec::with_capacity(frame_count);
    for frame in 0..frame_count {
        let mut acc = 0.0f32;
        for ch in 0..channels {
            acc += ints[frame * channels + ch] as f32 / 32768.0;
        }
        out.push(acc / channels as f32);
    }
    Ok(out)
}

fn chunk_decode(bytes: &[u8], channels: usize) -> Vec<f32> {
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks_exact(2) {
        samples.push(i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0);
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Encode float samples straight to a base64 PCM16 string.
pub fn encode_base64_pcm(samples: &[f32]) -> String {
    BASE64.encode(encode_pcm16(samples))
}

/// Decode a base64 PCM16 payload to mono float samples.
pub fn decode_base64_pcm(data: &str, channels: u16) -> Result<Vec<f32>, VoiceError> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| VoiceError::Decode(format!("invalid base64 audio: {}", e)))?;
    decode_pcm16(&bytes, channels)
}
