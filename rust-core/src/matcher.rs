//! Similarity scoring of a candidate motion against one reference.
//!
//! Scoring pipeline:
//! 1. Duration agreement, with an early exit for grossly mismatched lengths
//! 2. Phase weights for both full-length sequences
//! 3. Resample features and weights onto a shared sample count
//! 4. Per-sample angle-change and distance-change similarity, weighted by
//!    feature importance and phase weight
//! 5. Boosted blend of angle and distance scores, mixed with duration score
//!
//! Only feature keys present in both sequences are compared.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::phase::{PhaseAnalyzer, PhaseConfig};
use crate::resample::{resample_array, resample_relative_motion};
use crate::types::{sequence_duration, FeatureKey, ImportanceMap, RelativeFrame};

/// Configuration for motion similarity scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Relative duration difference tolerated without penalty.
    pub duration_tolerance: f64,
    /// Share of the final score taken by duration agreement.
    pub duration_match_weight: f64,
    /// Relative duration difference that short-circuits scoring.
    pub gross_duration_mismatch: f64,
    /// The short-circuit only applies when the longer motion exceeds this (ms).
    pub gross_mismatch_min_ms: f64,
    /// Upper bound on resampled sample count.
    pub max_sample_count: usize,
    /// Importance used for a feature with no stored, or a zero, importance.
    pub missing_importance_weight: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            duration_tolerance: 0.4,
            duration_match_weight: 0.35,
            gross_duration_mismatch: 0.7,
            gross_mismatch_min_ms: 500.0,
            max_sample_count: 20,
            missing_importance_weight: 0.5, // De-weights unrated features
        }
    }
}

/// Result of comparing one candidate to one reference.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Final similarity in [0, 1].
    pub score: f64,
    pub angle_score: f64,
    pub distance_score: f64,
    pub duration_score: f64,
    pub candidate_duration: f64,
    pub reference_duration: f64,
    /// Set when scoring stopped early on a gross duration mismatch.
    pub duration_mismatch: bool,
}

/// Scores candidate feature sequences against reference sequences.
#[derive(Debug, Clone, Default)]
pub struct MotionMatcher {
    config: MatcherConfig,
    phase: PhaseAnalyzer,
}

impl MotionMatcher {
    pub fn new(config: MatcherConfig, phase_config: PhaseConfig) -> Self {
        Self {
            config,
            phase: PhaseAnalyzer::new(phase_config),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Compare `candidate` against `reference` using the reference's
    /// per-feature importance.
    ///
    /// Either sequence shorter than two frames scores 0.
    pub fn score(
        &self,
        candidate: &[RelativeFrame],
        reference: &[RelativeFrame],
        importance: &ImportanceMap,
    ) -> MatchResult {
        if candidate.len() < 2 || reference.len() < 2 {
            return MatchResult::default();
        }

        let candidate_duration = sequence_duration(candidate);
        let reference_duration = sequence_duration(reference);
        let max_duration = candidate_duration.max(reference_duration);
        let duration_diff = if max_duration > 0.0 {
            (candidate_duration - reference_duration).abs() / max_duration
        } else {
            0.0
        };

        let mut result = MatchResult {
            candidate_duration,
            reference_duration,
            duration_score: self.duration_score(duration_diff),
            ..MatchResult::default()
        };

        if duration_diff > self.config.duration_tolerance
            && duration_diff > self.config.gross_duration_mismatch
            && max_duration > self.config.gross_mismatch_min_ms
        {
            result.score = 0.3 * result.duration_score;
            result.duration_mismatch = true;
            return result;
        }

        let sample_count = self
            .config
            .max_sample_count
            .min(candidate.len())
            .min(reference.len());

        let candidate_weights = resample_array(&self.phase.phase_weights(candidate), sample_count);
        let reference_weights = resample_array(&self.phase.phase_weights(reference), sample_count);
        let candidate_sampled = resample_relative_motion(candidate, sample_count);
        let reference_sampled = resample_relative_motion(reference, sample_count);

        let mut angle_scores = Vec::with_capacity(sample_count);
        let mut distance_scores = Vec::with_capacity(sample_count);

        for i in 1..sample_count {
            let (Some(curr), Some(saved)) = (candidate_sampled.get(i), reference_sampled.get(i)) else {
                break;
            };
            let phase_weight = (candidate_weights[i] + reference_weights[i]) / 2.0;

            if let Some(score) = self.angle_similarity(curr, saved, importance, phase_weight) {
                angle_scores.push(score);
            }
            if let Some(score) = self.distance_similarity(curr, saved, importance, phase_weight) {
                distance_scores.push(score);
            }
        }

        let angle_score = mean(&angle_scores);
        let distance_score = mean(&distance_scores);

        let strongest = angle_score.max(distance_score);
        let boost = if strongest > 0.6 { (strongest - 0.6) * 0.5 } else { 0.0 };

        let mut weighted = angle_score * 0.75 + distance_score * 0.25 + boost;
        if angle_score > 0.8 && distance_score > 0.6 {
            weighted = (weighted * 1.15).min(1.0);
        }

        let w = self.config.duration_match_weight;
        let score = weighted * (1.0 - w) + result.duration_score * w;

        result.score = score.clamp(0.0, 1.0);
        result.angle_score = angle_score;
        result.distance_score = distance_score;
        result
    }

    fn duration_score(&self, duration_diff: f64) -> f64 {
        let tolerance = self.config.duration_tolerance;
        if duration_diff <= tolerance {
            return 1.0;
        }
        let excess = ((duration_diff - tolerance) / (1.0 - tolerance)).max(0.0);
        (1.0 - excess.sqrt()).max(0.2)
    }

    /// Stored importance of `key`. Missing and non-positive values fall back
    /// to `missing_importance_weight`, so a feature can be de-weighted but
    /// never removed from scoring.
    fn importance_of(&self, importance: &ImportanceMap, key: FeatureKey) -> f64 {
        match importance.get(&key) {
            Some(&value) if value > 0.0 => value,
            _ => self.config.missing_importance_weight,
        }
    }

    /// Weighted mean angle-change similarity of one sample, `None` when no
    /// key is shared.
    fn angle_similarity(
        &self,
        curr: &RelativeFrame,
        saved: &RelativeFrame,
        importance: &ImportanceMap,
        phase_weight: f64,
    ) -> Option<f64> {
        let (Some(curr_changes), Some(saved_changes)) = (&curr.angle_changes, &saved.angle_changes) else {
            return None;
        };

        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;

        for (key, &current) in curr_changes {
            let Some(&reference) = saved_changes.get(key) else {
                continue;
            };

            let diff = (current - reference).abs();
            let magnitude = current.abs().max(reference.abs());
            let threshold = if magnitude > 0.5 {
                PI / 3.0
            } else if magnitude < 0.1 {
                PI / 1.3
            } else {
                PI / 2.0
            };
            let similarity = (1.0 - diff / threshold).max(0.0);

            let weight = self.importance_of(importance, (*key).into()) * phase_weight;
            weighted_sum += similarity * weight;
            weight_sum += weight;
        }

        (weight_sum > 0.0).then(|| weighted_sum / weight_sum)
    }

    fn distance_similarity(
        &self,
        curr: &RelativeFrame,
        saved: &RelativeFrame,
        importance: &ImportanceMap,
        phase_weight: f64,
    ) -> Option<f64> {
        let (Some(curr_changes), Some(saved_changes)) = (&curr.distance_changes, &saved.distance_changes)
        else {
            return None;
        };

        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;

        for (key, &current) in curr_changes {
            let Some(&reference) = saved_changes.get(key) else {
                continue;
            };

            let weight = self.importance_of(importance, (*key).into()) * phase_weight;
            weighted_sum += distance_change_similarity(current, reference) * weight;
            weight_sum += weight;
        }

        (weight_sum > 0.0).then(|| weighted_sum / weight_sum)
    }
}

/// Similarity of two distance deltas: direction dominates, magnitude refines.
pub fn distance_change_similarity(current: f64, reference: f64) -> f64 {
    // Zero counts as either direction.
    let same_direction = (current >= 0.0 && reference >= 0.0) || (current <= 0.0 && reference <= 0.0);
    if !same_direction {
        return 0.0;
    }

    let magnitude_similarity = if reference.abs() < 0.01 {
        1.0
    } else {
        let max_magnitude = current.abs().max(reference.abs());
        let ratio = current.abs().min(reference.abs()) / max_magnitude;
        if max_magnitude > 0.1 {
            ratio.powf(0.75)
        } else {
            ratio.sqrt()
        }
    };

    0.8 + 0.2 * magnitude_similarity
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::relative_motion;
    use crate::types::*;

    fn arm_pose(angle: f64) -> Pose {
        let mut joints = vec![JointSample::new(0.5, 0.5, 0.0); POSE_LANDMARK_COUNT];
        joints[LEFT_SHOULDER] = JointSample::new(0.6, 0.3, 0.0);
        joints[RIGHT_SHOULDER] = JointSample::new(0.4, 0.3, 0.0);
        joints[LEFT_HIP] = JointSample::new(0.57, 0.6, 0.0);
        joints[RIGHT_HIP] = JointSample::new(0.43, 0.6, 0.0);
        joints[LEFT_ELBOW] = JointSample::new(0.6 + 0.15 * angle.cos(), 0.3 - 0.15 * angle.sin(), 0.0);
        joints[LEFT_WRIST] = JointSample::new(0.6 + 0.3 * angle.cos(), 0.3 - 0.3 * angle.sin(), 0.0);
        Pose::from_slice(&joints).unwrap()
    }

    fn swing(frames: usize, duration_ms: u64) -> Vec<RelativeFrame> {
        let raw: Vec<RawSample> = (0..frames)
            .map(|i| {
                let t = i as f64 / (frames - 1) as f64;
                let ts = duration_ms * i as u64 / (frames - 1) as u64;
                RawSample::new(ts, arm_pose(0.2 + 1.4 * t))
            })
            .collect();
        relative_motion(&raw)
    }

    #[test]
    fn test_self_match_is_perfect() {
        let matcher = MotionMatcher::default();
        let motion = swing(10, 600);
        let result = matcher.score(&motion, &motion, &ImportanceMap::new());

        assert!(result.score > 1.0 - 1e-9, "{:?}", result);
        assert_eq!(result.duration_score, 1.0);
        assert!((result.angle_score - 1.0).abs() < 1e-12);
        assert!((result.distance_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_self_match_long_sequence() {
        let matcher = MotionMatcher::default();
        let motion = swing(45, 1500);
        let result = matcher.score(&motion, &motion, &ImportanceMap::new());
        assert!(result.score > 1.0 - 1e-9, "{:?}", result);
    }

    #[test]
    fn test_short_input_scores_zero() {
        let matcher = MotionMatcher::default();
        let motion = swing(10, 600);
        let result = matcher.score(&motion[..1], &motion, &ImportanceMap::new());
        assert_eq!(result.score, 0.0);
        assert_eq!(matcher.score(&motion, &[], &ImportanceMap::new()).score, 0.0);
    }

    #[test]
    fn test_gross_duration_mismatch_short_circuits() {
        let matcher = MotionMatcher::default();
        let candidate = swing(10, 300);
        let reference = swing(10, 2000);
        let result = matcher.score(&candidate, &reference, &ImportanceMap::new());

        assert!(result.duration_mismatch);
        assert!(result.score <= 0.3 * result.duration_score + 1e-12);
        assert_eq!(result.duration_score, 0.2);
        assert_eq!(result.angle_score, 0.0);
    }

    #[test]
    fn test_short_motions_skip_gross_mismatch() {
        // Both below 500ms: large relative difference is penalized but scored.
        let matcher = MotionMatcher::default();
        let candidate = swing(6, 100);
        let reference = swing(6, 450);
        let result = matcher.score(&candidate, &reference, &ImportanceMap::new());
        assert!(!result.duration_mismatch);
        assert!(result.duration_score < 1.0);
        assert!(result.angle_score > 0.9);
    }

    #[test]
    fn test_duration_within_tolerance() {
        let matcher = MotionMatcher::default();
        let candidate = swing(10, 500);
        let reference = swing(10, 600);
        let result = matcher.score(&candidate, &reference, &ImportanceMap::new());
        assert_eq!(result.duration_score, 1.0);
        assert!(result.score > 0.9);
    }

    #[test]
    fn test_opposite_swing_scores_lower() {
        let matcher = MotionMatcher::default();
        let forward = swing(10, 600);
        let mut raw: Vec<RawSample> = (0..10)
            .map(|i| RawSample::new(i as u64 * 66, arm_pose(1.6 - 1.4 * i as f64 / 9.0)))
            .collect();
        normalize_timestamps(&mut raw);
        let backward = relative_motion(&raw);

        let same = matcher.score(&forward, &forward, &ImportanceMap::new()).angle_score;
        let opposite = matcher.score(&backward, &forward, &ImportanceMap::new()).angle_score;
        assert!(opposite < same, "{} vs {}", opposite, same);
    }

    #[test]
    fn test_distance_change_similarity() {
        assert_eq!(distance_change_similarity(0.05, -0.05), 0.0);
        assert_eq!(distance_change_similarity(0.0, -0.05), 0.8 + 0.2 * 0.0_f64.sqrt());
        assert_eq!(distance_change_similarity(0.3, 0.005), 1.0);
        assert_eq!(distance_change_similarity(0.2, 0.2), 1.0);

        let small = distance_change_similarity(0.02, 0.08);
        assert!((small - (0.8 + 0.2 * 0.25_f64.sqrt())).abs() < 1e-12);

        let large = distance_change_similarity(0.1, 0.4);
        assert!((large - (0.8 + 0.2 * 0.25_f64.powf(0.75))).abs() < 1e-12);
    }

    #[test]
    fn test_importance_weights_shift_score() {
        let matcher = MotionMatcher::default();
        let reference = swing(10, 600);
        let mut raw: Vec<RawSample> = (0..10)
            .map(|i| RawSample::new(i as u64 * 66, arm_pose(0.2 + 0.7 * i as f64 / 9.0)))
            .collect();
        normalize_timestamps(&mut raw);
        let candidate = relative_motion(&raw);

        let mut downweight_arm = ImportanceMap::new();
        downweight_arm.insert(AngleKey::LeftShoulder.into(), 0.05);

        let default_score = matcher.score(&candidate, &reference, &ImportanceMap::new()).angle_score;
        let reduced_score = matcher.score(&candidate, &reference, &downweight_arm).angle_score;
        assert!(reduced_score >= default_score, "{} vs {}", reduced_score, default_score);

        // A stored zero counts as unrated, not as a mask.
        let mut zero_arm = ImportanceMap::new();
        zero_arm.insert(AngleKey::LeftShoulder.into(), 0.0);
        let zero_score = matcher.score(&candidate, &reference, &zero_arm).angle_score;
        assert_eq!(zero_score, default_score);
    }

    #[test]
    fn test_all_zero_importance_self_match() {
        let matcher = MotionMatcher::default();
        let motion = swing(10, 600);
        let zero: ImportanceMap = FeatureKey::all().map(|key| (key, 0.0)).collect();

        let result = matcher.score(&motion, &motion, &zero);
        assert!(result.score > 0.9, "{:?}", result);
        assert!((result.angle_score - 1.0).abs() < 1e-12);
        assert!((result.distance_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_duration_sequences() {
        let matcher = MotionMatcher::default();
        let pose = arm_pose(0.0);
        let raw = vec![RawSample::new(0, pose.clone()), RawSample::new(0, pose)];
        let frames = relative_motion(&raw);
        let result = matcher.score(&frames, &frames, &ImportanceMap::new());
        assert!(result.score.is_finite());
        assert_eq!(result.duration_score, 1.0);
    }
}
