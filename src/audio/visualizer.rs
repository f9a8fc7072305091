//! Per-frame energy analysis of the agent audio path.
//! Reduces the output's frequency-domain energy to one smoothed scalar and
//! maps it to the visual intensity parameters the UI shell animates with.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::playback::ANALYSIS_WINDOW;

/// Frequency bins produced from the analysis window
const BIN_COUNT: usize = ANALYSIS_WINDOW / 2;

/// Cross-frame smoothing coefficient (fraction of the previous level kept)
const SMOOTHING: f32 = 0.5;

/// Publish cadence, roughly one display refresh
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// One visual update derived from the output audio's energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualFrame {
    /// Smoothed, normalized energy in [0, 1]
    pub level: f32,
    /// Scale factor for the animated mark
    pub scale: f32,
    /// Glow radius, in display units
    pub glow: f32,
}

impl VisualFrame {
    fn from_level(level: f32) -> Self {
        Self {
            level,
            scale: 1.0 + 0.15 * level,
            glow: 10.0 + 20.0 * level,
        }
    }

    /// The resting frame shown whenever no session is connected.
    pub fn baseline() -> Self {
        Self::from_level(0.0)
    }
}

impl Default for VisualFrame {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Reads the playback analysis window at display cadence and publishes
/// smoothed intensity frames. Read-only with respect to audio state.
pub struct EnergyVisualizer {
    tap: Arc<Mutex<VecDeque<f32>>>,
    smoothed: f32,
}

impl EnergyVisualizer {
    pub(crate) fn new(tap: Arc<Mutex<VecDeque<f32>>>) -> Self {
        Self { tap, smoothed: 0.0 }
    }

    /// Analyze the current window and produce the next frame.
    pub fn sample(&mut self) -> VisualFrame {
        let window: Vec<f32> = {
            let tap = self.tap.lock();
            tap.iter().copied().collect()
        };

        let raw = mean_bin_level(&window);
        self.smoothed = SMOOTHING * self.smoothed + (1.0 - SMOOTHING) * raw;
        VisualFrame::from_level(self.smoothed)
    }

    /// Run the analysis loop until the receiver side goes away or the task
    /// is aborted by the session teardown.
    pub fn spawn(mut self, tx: watch::Sender<VisualFrame>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let frame = self.sample();
                if tx.send(frame).is_err() {
                    break;
                }
            }
        })
    }
}

/// Mean normalized magnitude across the frequency bins of the window.
fn mean_bin_level(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }

    let n = window.len();
    let mut sum = 0.0f32;
    for k in 0..BIN_COUNT {
        let mut re = 0.0f32;
        let mut im = 0.0f32;
        for (i, &sample) in window.iter().enumerate() {
            let angle = -2.0 * std::f32::consts::PI * k as f32 * i as f32 / n as f32;
            re += sample * angle.cos();
            im += sample * angle.sin();
        }
        let magnitude = (re * re + im * im).sqrt() / (n as f32 / 2.0);
        sum += magnitude_to_level(magnitude);
    }
    sum / BIN_COUNT as f32
}

/// Map a bin magnitude onto [0, 1] over a -60dB..0dB range.
fn magnitude_to_level(magnitude: f32) -> f32 {
    let db = 20.0 * magnitude.max(1e-10).log10();
    ((db + 60.0) / 60.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap_with(samples: Vec<f32>) -> Arc<Mutex<VecDeque<f32>>> {
        Arc::new(Mutex::new(samples.into_iter().collect()))
    }

    #[test]
    fn test_silence_maps_to_baseline() {
        let mut visualizer = EnergyVisualizer::new(tap_with(vec![0.0; ANALYSIS_WINDOW]));
        let frame = visualizer.sample();
        assert_eq!(frame.level, 0.0);
        assert_eq!(frame.scale, 1.0);
        assert_eq!(frame.glow, 10.0);
    }

    #[test]
    fn test_tone_produces_positive_level() {
        // Strong tone in the analysis window
        let samples: Vec<f32> = (0..ANALYSIS_WINDOW)
            .map(|i| (2.0 * std::f32::consts::PI * 4.0 * i as f32 / ANALYSIS_WINDOW as f32).sin() * 0.8)
            .collect();
        let mut visualizer = EnergyVisualizer::new(tap_with(samples));

        let frame = visualizer.sample();
        assert!(frame.level > 0.0 && frame.level <= 1.0);
        assert!(frame.scale > 1.0 && frame.scale <= 1.15);
        assert!(frame.glow > 10.0 && frame.glow <= 30.0);
    }

    #[test]
    fn test_smoothing_halves_the_step_response() {
        let samples: Vec<f32> = (0..ANALYSIS_WINDOW)
            .map(|i| (2.0 * std::f32::consts::PI * 2.0 * i as f32 / ANALYSIS_WINDOW as f32).sin())
            .collect();
        let mut visualizer = EnergyVisualizer::new(tap_with(samples));

        // From rest, the first frame carries half the raw level, the second
        // three quarters: their ratio is fixed by the smoothing constant.
        let first = visualizer.sample().level;
        let second = visualizer.sample().level;
        assert!(first > 0.0);
        assert!((second / first - 1.5).abs() < 0.01);
    }

    #[test]
    fn test_empty_window_is_silent() {
        let mut visualizer = EnergyVisualizer::new(tap_with(vec![]));
        assert_eq!(visualizer.sample().level, 0.0);
    }
}
