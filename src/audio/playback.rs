use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Host, Stream, StreamConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{CHANNELS, OUTPUT_SAMPLE_RATE};
use crate::error::VoiceError;

/// Samples kept in the analysis window read by the visualizer
pub(crate) const ANALYSIS_WINDOW: usize = 64;

/// A decoded buffer placed on the output timeline.
struct ScheduledBuffer {
    /// Absolute start time, in output samples since the scheduler started
    start_at: u64,
    samples: Vec<f32>,
    /// Render progress within `samples`
    position: usize,
}

impl ScheduledBuffer {
    fn finished(&self) -> bool {
        self.position >= self.samples.len()
    }
}

/// Cursor and scheduled set. Mutated only under one lock, by `enqueue`,
/// `interrupt` and the render path, so an interrupt can never leave a
/// concurrently enqueued buffer behind.
struct ScheduleState {
    /// Next free slot on the output timeline, in samples
    cursor: u64,
    queue: VecDeque<ScheduledBuffer>,
}

/// Gapless playback of decoded agent audio.
///
/// Buffers are scheduled back-to-back on a sample-accurate timeline: each
/// `enqueue` starts at `max(cursor, now)` and advances the cursor by the
/// buffer's length, so ordering is fixed by arrival, not by decode latency.
/// `interrupt` stops everything scheduled and resets the cursor to now.
pub struct PlaybackScheduler {
    host: Host,
    stream: Mutex<Option<Stream>>,
    state: Arc<Mutex<ScheduleState>>,
    /// Samples rendered so far; the scheduler's "now"
    clock: Arc<AtomicU64>,
    /// Most recently rendered samples, for the visualizer
    tap: Arc<Mutex<VecDeque<f32>>>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            stream: Mutex::new(None),
            state: Arc::new(Mutex::new(ScheduleState {
                cursor: 0,
                queue: VecDeque::new(),
            })),
            clock: Arc::new(AtomicU64::new(0)),
            tap: Arc::new(Mutex::new(VecDeque::with_capacity(ANALYSIS_WINDOW))),
        }
    }

    /// Open the output device and begin pulling from the schedule.
    pub fn start(&self) -> Result<(), VoiceError> {
        if self.stream.lock().is_some() {
            return Ok(());
        }

        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| VoiceError::DeviceUnavailable("no output device".to_string()))?;

        let device_name = device.name().unwrap_or_default();
        tracing::info!("Starting agent audio playback on: {}", device_name);

        let config = StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(OUTPUT_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let state = self.state.clone();
        let clock = self.clock.clone();
        let tap = self.tap.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render(&state, &clock, &tap, data);
                },
                |err| {
                    tracing::error!("Agent audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;

        *self.stream.lock() = Some(stream);
        Ok(())
    }

    /// Close the output device and flush everything scheduled. Idempotent.
    pub fn stop(&self) {
        if self.stream.lock().take().is_some() {
            tracing::info!("Agent audio playback stopped");
        }
        self.interrupt();
    }

    /// Schedule a decoded buffer for gapless playback. Returns its absolute
    /// start time in output samples.
    pub fn enqueue(&self, samples: Vec<f32>) -> u64 {
        let now = self.clock.load(Ordering::SeqCst);
        let mut state = self.state.lock();

        let start_at = state.cursor.max(now);
        state.cursor = start_at + samples.len() as u64;
        state.queue.push_back(ScheduledBuffer {
            start_at,
            samples,
            position: 0,
        });
        start_at
    }

    /// Stop every scheduled buffer immediately and reset the cursor to now.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        state.cursor = self.clock.load(Ordering::SeqCst);
        if dropped > 0 {
            tracing::info!("Playback interrupted, {} buffer(s) flushed", dropped);
        }
    }

    /// Number of buffers scheduled but not yet finished.
    pub fn scheduled_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// The scheduler's current time, in output samples.
    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    /// The next free slot on the output timeline, in output samples.
    pub fn cursor(&self) -> u64 {
        self.state.lock().cursor
    }

    /// Seconds of audio scheduled ahead of now.
    pub fn lead_secs(&self) -> f64 {
        let now = self.now();
        let cursor = self.cursor();
        cursor.saturating_sub(now) as f64 / OUTPUT_SAMPLE_RATE as f64
    }

    /// Analysis window handle for the visualizer. Read-only by convention.
    pub(crate) fn visual_tap(&self) -> Arc<Mutex<VecDeque<f32>>> {
        self.tap.clone()
    }

    /// Fill an output buffer from the schedule. Called by the output stream;
    /// exposed so tests can drive the clock deterministically.
    pub fn render(&self, out: &mut [f32]) {
        render(&self.state, &self.clock, &self.tap, out);
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn render(
    state: &Arc<Mutex<ScheduleState>>,
    clock: &Arc<AtomicU64>,
    tap: &Arc<Mutex<VecDeque<f32>>>,
    out: &mut [f32],
) {
    let mut st = state.lock();
    let mut t = clock.load(Ordering::SeqCst);

    for slot in out.iter_mut() {
        while st.queue.front().is_some_and(|b| b.finished()) {
            st.queue.pop_front();
        }

        *slot = match st.queue.front_mut() {
            Some(buffer) if buffer.start_at <= t => {
                let value = buffer.samples[buffer.position];
                buffer.position += 1;
                value
            }
            // Gap until the next buffer's start, or nothing scheduled
            _ => 0.0,
        };
        t += 1;
    }

    // A buffer that ended exactly at the last slot is finished now
    while st.queue.front().is_some_and(|b| b.finished()) {
        st.queue.pop_front();
    }

    clock.store(t, Ordering::SeqCst);
    drop(st);

    let mut window = tap.lock();
    for &sample in out.iter() {
        if window.len() == ANALYSIS_WINDOW {
            window.pop_front();
        }
        window.push_back(sample);
    }
}

// Safety: Stream is only touched through the Mutex; schedule state is locked
unsafe impl Send for PlaybackScheduler {}
unsafe impl Sync for PlaybackScheduler {}
