use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Host, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::denoise::NoiseSuppressor;
use super::{CHANNELS, INPUT_SAMPLE_RATE, SAMPLES_PER_FRAME};
use crate::error::VoiceError;

/// Microphone capture for the live session.
///
/// Delivers fixed-size 16kHz mono frames to a callback at the device's own
/// cadence. Frames produced while muted are dropped entirely, not zeroed,
/// so nothing reaches the wire.
pub struct CapturePipeline {
    host: Host,
    stream: Mutex<Option<Stream>>,
    is_capturing: Arc<AtomicBool>,
    is_muted: Arc<AtomicBool>,
    suppressor: Arc<Mutex<NoiseSuppressor>>,
}

impl CapturePipeline {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            stream: Mutex::new(None),
            is_capturing: Arc::new(AtomicBool::new(false)),
            is_muted: Arc::new(AtomicBool::new(false)),
            suppressor: Arc::new(Mutex::new(NoiseSuppressor::new())),
        }
    }

    /// List available input devices
    pub fn list_devices() -> Result<Vec<String>, VoiceError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;

        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    /// Start capturing. The callback receives complete frames of exactly
    /// `SAMPLES_PER_FRAME` samples, already noise-suppressed.
    pub fn start<F>(&self, mut on_frame: F) -> Result<(), VoiceError>
    where
        F: FnMut(Vec<f32>) + Send + 'static,
    {
        if self.is_capturing.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = self
            .host
            .default_input_device()
            .ok_or_else(|| VoiceError::DeviceUnavailable("no input device".to_string()))?;

        let device_name = device.name().unwrap_or_default();
        tracing::info!("Starting voice capture on: {}", device_name);

        let config = StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(INPUT_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        self.suppressor.lock().reset();

        let is_muted = self.is_muted.clone();
        let suppressor = self.suppressor.clone();
        // Accumulates suppressed samples until a full frame is available
        let mut frame_buffer: Vec<f32> = Vec::with_capacity(SAMPLES_PER_FRAME * 2);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    process_input(data, &is_muted, &suppressor, &mut frame_buffer, &mut on_frame);
                },
                move |err| {
                    tracing::error!("Voice capture error: {}", err);
                },
                None,
            )
            .map_err(map_build_error)?;

        stream
            .play()
            .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;

        *self.stream.lock() = Some(stream);
        self.is_capturing.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Stop capturing and release the device. Safe to call repeatedly.
    pub fn stop(&self) {
        if self.stream.lock().take().is_some() {
            tracing::info!("Voice capture stopped");
        }
        self.is_capturing.store(false, Ordering::SeqCst);
    }

    /// Set mute state. Advisory: a frame already in flight may still be sent.
    pub fn set_muted(&self, muted: bool) {
        self.is_muted.store(muted, Ordering::SeqCst);
        tracing::info!("Mute set to: {}", muted);
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted.load(Ordering::SeqCst)
    }

    pub fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }

    /// Enable or disable noise suppression on the capture path.
    pub fn set_noise_suppression(&self, enabled: bool) {
        self.suppressor.lock().set_enabled(enabled);
    }
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulate device samples into fixed frames and deliver them.
/// Frames produced while muted are dropped, not buffered, so nothing stale
/// plays out when the microphone is reopened.
fn process_input<F>(
    data: &[f32],
    is_muted: &AtomicBool,
    suppressor: &Mutex<NoiseSuppressor>,
    frame_buffer: &mut Vec<f32>,
    on_frame: &mut F,
) where
    F: FnMut(Vec<f32>),
{
    if is_muted.load(Ordering::SeqCst) {
        frame_buffer.clear();
        return;
    }

    let processed = suppressor.lock().process(data);
    frame_buffer.extend_from_slice(&processed);

    while frame_buffer.len() >= SAMPLES_PER_FRAME {
        let frame: Vec<f32> = frame_buffer.drain(..SAMPLES_PER_FRAME).collect();
        on_frame(frame);
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> VoiceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            VoiceError::DeviceUnavailable("input device disappeared".to_string())
        }
        other => map_config_error(&other.to_string()),
    }
}

fn map_config_error(message: &str) -> VoiceError {
    let lowered = message.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") {
        VoiceError::PermissionDenied
    } else {
        VoiceError::DeviceUnavailable(message.to_string())
    }
}

// Safety: Stream is only touched through the Mutex; flags are atomic
unsafe impl Send for CapturePipeline {}
unsafe impl Sync for CapturePipeline {}
