//! Key-phase detection and per-frame phase weighting.
//!
//! Most gestures have a short stretch that carries the actual movement
//! (the punch extension, the swing of a wave) surrounded by wind-up and
//! settle. The analyzer finds that stretch and boosts its frames so the
//! matcher weighs them more than the idle edges.
//!
//! Algorithm:
//! 1. Per-transition magnitude: mean |angle delta| plus mean scaled |distance delta|
//! 2. Noise floor: magnitudes below the threshold become 0
//! 3. 3-point centered moving average (endpoints untouched)
//! 4. Largest-sum contiguous run of positive magnitude = key phase
//! 5. Fallback: 3-wide window around the single largest raw transition

use serde::{Deserialize, Serialize};

use crate::types::RelativeFrame;

/// Configuration for phase weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// Transition magnitudes below this are treated as sensor noise.
    pub noise_threshold: f64,
    /// Weight assigned to frames inside the key phase. Others get 1.0.
    pub key_phase_weight: f64,
    /// Scale applied to distance deltas so they are comparable to radians.
    pub distance_scale: f64,
    /// Width of the centered moving average.
    pub smoothing_window: usize,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.003,
            key_phase_weight: 1.8,
            distance_scale: 10.0,
            smoothing_window: 3,
        }
    }
}

/// Inclusive transition-index range of the dominant movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPhase {
    pub start: usize,
    pub end: usize,
}

/// Detects the key phase of a feature sequence and weights frames by it.
#[derive(Debug, Clone, Default)]
pub struct PhaseAnalyzer {
    config: PhaseConfig,
}

impl PhaseAnalyzer {
    pub fn new(config: PhaseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    /// Per-frame weights, same length as `frames`.
    ///
    /// Sequences shorter than three frames get uniform weight 1.0.
    pub fn phase_weights(&self, frames: &[RelativeFrame]) -> Vec<f64> {
        let mut weights = vec![1.0; frames.len()];

        let Some(phase) = self.key_phase(frames) else {
            return weights;
        };

        // The frame after the phase end is boosted too, to keep the settle.
        for i in phase.start..=phase.end {
            if let Some(w) = weights.get_mut(i) {
                *w = self.config.key_phase_weight;
            }
            if let Some(w) = weights.get_mut(i + 1) {
                *w = self.config.key_phase_weight;
            }
        }

        weights
    }

    /// Locate the key phase. `None` for sequences shorter than three frames.
    pub fn key_phase(&self, frames: &[RelativeFrame]) -> Option<KeyPhase> {
        if frames.len() < 3 {
            return None;
        }

        let mut magnitudes = self.transition_magnitudes(frames);

        let mut peak_index = 0;
        let mut peak_magnitude = 0.0;
        for (i, &m) in magnitudes.iter().enumerate() {
            if m > peak_magnitude {
                peak_magnitude = m;
                peak_index = i;
            }
        }

        for m in magnitudes.iter_mut() {
            if *m < self.config.noise_threshold {
                *m = 0.0;
            }
        }

        let smoothed = smooth(&magnitudes, self.config.smoothing_window);

        let mut best: Option<(KeyPhase, f64)> = None;
        let mut run_start = 0;
        let mut run_sum = 0.0;

        for (i, &m) in smoothed.iter().enumerate() {
            if m > 0.0 {
                if run_sum == 0.0 {
                    run_start = i;
                }
                run_sum += m;
            } else if run_sum > 0.0 {
                consider_run(&mut best, run_start, i - 1, run_sum);
                run_sum = 0.0;
            }
        }
        if run_sum > 0.0 {
            consider_run(&mut best, run_start, smoothed.len() - 1, run_sum);
        }

        let phase = match best {
            Some((phase, _)) => phase,
            None => KeyPhase {
                start: peak_index.saturating_sub(1),
                end: (peak_index + 1).min(frames.len() - 2),
            },
        };

        Some(phase)
    }

    /// Combined movement magnitude of each frame transition `i-1 → i`.
    pub fn transition_magnitudes(&self, frames: &[RelativeFrame]) -> Vec<f64> {
        frames
            .iter()
            .skip(1)
            .map(|frame| {
                let angle = mean_abs(
                    frame.angle_changes.iter().flat_map(|m| m.values().copied()),
                    1.0,
                );
                let distance = mean_abs(
                    frame.distance_changes.iter().flat_map(|m| m.values().copied()),
                    self.config.distance_scale,
                );
                angle + distance
            })
            .collect()
    }
}

fn consider_run(best: &mut Option<(KeyPhase, f64)>, start: usize, end: usize, sum: f64) {
    let replace = match best {
        Some((_, best_sum)) => sum > *best_sum,
        None => true,
    };
    if replace {
        *best = Some((KeyPhase { start, end }, sum));
    }
}

fn mean_abs(values: impl Iterator<Item = f64>, scale: f64) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v.abs() * scale, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Centered moving average. Arrays no longer than the window are returned as-is.
pub fn smooth(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() <= window {
        return values.to_vec();
    }

    let half = window / 2;
    let mut result = values.to_vec();
    for i in half..values.len() - half {
        let sum: f64 = values[i - half..=i + half].iter().sum();
        result[i] = sum / window as f64;
    }
    result
}

// ============================================================================
// TESTS
// ============================================================================
