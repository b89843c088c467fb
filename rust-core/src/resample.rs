//! Temporal normalization of feature sequences.
//!
//! Two performances of the same gesture rarely have the same frame count or
//! duration. Before comparing them, both are mapped onto a shared number of
//! uniformly spaced samples. Angles interpolate along the shortest arc,
//! distances linearly.
//!
//! A light weighted smoothing pass runs before resampling to damp
//! pose-estimation jitter, and deltas are recomputed on the smoothed data.

use std::f64::consts::TAU;

use crate::features::{angle_difference, attach_deltas};
use crate::types::{AngleMap, DistanceMap, RelativeFrame, Vec3};

/// Linearly resample `values` onto `dst_len` evenly spaced positions.
///
/// Degenerate input (fewer than two source values or fewer than two target
/// slots) yields a constant array of the first value, or 1.0 when empty.
pub fn resample_array(values: &[f64], dst_len: usize) -> Vec<f64> {
    let src_len = values.len();
    if src_len <= 1 || dst_len <= 1 {
        let fill = values.first().copied().unwrap_or(1.0);
        return vec![fill; dst_len];
    }

    (0..dst_len)
        .map(|i| {
            let position = (i as f64 / (dst_len - 1) as f64) * (src_len - 1) as f64;
            let index = position.floor() as usize;
            let fraction = position - index as f64;

            if index + 1 < src_len {
                values[index] * (1.0 - fraction) + values[index + 1] * fraction
            } else {
                values[index.min(src_len - 1)]
            }
        })
        .collect()
}

/// Interpolate from angle `a` toward `b` along the shortest arc.
///
/// The result is wrapped into `[0, 2π)`.
pub fn interpolate_angle(a: f64, b: f64, t: f64) -> f64 {
    let delta = angle_difference(a, b);
    let result = a + delta * t;
    if !result.is_finite() {
        return result;
    }
    let wrapped = result.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative input.
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Resample a feature sequence onto `sample_count` uniformly spaced times.
///
/// Sequences of one frame, or already `sample_count` long, are returned
/// unchanged (and unsmoothed).
pub fn resample_relative_motion(frames: &[RelativeFrame], sample_count: usize) -> Vec<RelativeFrame> {
    if frames.len() <= 1 || frames.len() == sample_count {
        return frames.to_vec();
    }
    if sample_count < 2 {
        return frames.iter().take(sample_count).cloned().collect();
    }

    let smoothed = smooth_motion(frames);
    let total_duration = smoothed[smoothed.len() - 1].timestamp - smoothed[0].timestamp;
    // Target times start from the unsmoothed first timestamp.
    let origin = frames[0].timestamp;

    (0..sample_count)
        .map(|i| {
            let target = origin + (total_duration * i as f64) / (sample_count - 1) as f64;

            let (before_idx, after_idx) = smoothed
                .windows(2)
                .position(|pair| pair[0].timestamp <= target && pair[1].timestamp >= target)
                .map(|j| (j, j + 1))
                .unwrap_or((0, 0));

            let before = &smoothed[before_idx];
            let after = &smoothed[after_idx];

            if after.timestamp == before.timestamp {
                return RelativeFrame {
                    timestamp: target,
                    ..before.clone()
                };
            }

            let ratio = (target - before.timestamp) / (after.timestamp - before.timestamp);
            interpolate_frame(before, after, ratio, target)
        })
        .collect()
}

/// Weighted 3-point smoothing of interior frames, then delta recomputation.
///
/// Angles use `[1, 3, 1] / 5`, distances `[1, 2, 1] / 4`. Endpoints are
/// copied unchanged. Sequences of two frames or fewer are returned as-is.
pub fn smooth_motion(frames: &[RelativeFrame]) -> Vec<RelativeFrame> {
    if frames.len() <= 2 {
        return frames.to_vec();
    }

    let mut smoothed = Vec::with_capacity(frames.len());
    smoothed.push(frames[0].clone());

    for window in frames.windows(3) {
        let (prev, curr, next) = (&window[0], &window[1], &window[2]);

        let joint_angles: AngleMap = curr
            .joint_angles
            .iter()
            .map(|(key, &value)| {
                let smoothed_value = match (prev.joint_angles.get(key), next.joint_angles.get(key)) {
                    (Some(&p), Some(&n)) => (p + 3.0 * value + n) / 5.0,
                    _ => value,
                };
                (*key, smoothed_value)
            })
            .collect();

        let joint_distances: DistanceMap = curr
            .joint_distances
            .iter()
            .map(|(key, &value)| {
                let smoothed_value = match (prev.joint_distances.get(key), next.joint_distances.get(key)) {
                    (Some(&p), Some(&n)) => (p + 2.0 * value + n) / 4.0,
                    _ => value,
                };
                (*key, smoothed_value)
            })
            .collect();

        smoothed.push(RelativeFrame {
            timestamp: curr.timestamp,
            joint_angles,
            joint_distances,
            center_of_mass: curr.center_of_mass,
            angle_changes: curr.angle_changes.clone(),
            distance_changes: curr.distance_changes.clone(),
        });
    }

    smoothed.push(frames[frames.len() - 1].clone());
    attach_deltas(&mut smoothed);
    smoothed
}

fn interpolate_frame(before: &RelativeFrame, after: &RelativeFrame, ratio: f64, timestamp: f64) -> RelativeFrame {
    let joint_angles = zip_angles(&before.joint_angles, &after.joint_angles, ratio);
    let joint_distances = zip_distances(&before.joint_distances, &after.joint_distances, ratio);

    let angle_changes = match (&before.angle_changes, &after.angle_changes) {
        (Some(b), Some(a)) => zip_angles(b, a, ratio),
        _ => AngleMap::new(),
    };
    let distance_changes = match (&before.distance_changes, &after.distance_changes) {
        (Some(b), Some(a)) => zip_distances(b, a, ratio),
        _ => DistanceMap::new(),
    };

    let center_of_mass = match (before.center_of_mass, after.center_of_mass) {
        (Some(b), Some(a)) => Some(Vec3::new(
            lerp(b.x, a.x, ratio),
            lerp(b.y, a.y, ratio),
            lerp(b.z, a.z, ratio),
        )),
        _ => None,
    };

    RelativeFrame {
        timestamp,
        joint_angles,
        joint_distances,
        center_of_mass,
        angle_changes: Some(angle_changes),
        distance_changes: Some(distance_changes),
    }
}

fn zip_angles(before: &AngleMap, after: &AngleMap, ratio: f64) -> AngleMap {
    before
        .iter()
        .filter_map(|(key, &b)| after.get(key).map(|&a| (*key, interpolate_angle(b, a, ratio))))
        .collect()
}

fn zip_distances(before: &DistanceMap, after: &DistanceMap, ratio: f64) -> DistanceMap {
    before
        .iter()
        .filter_map(|(key, &b)| after.get(key).map(|&a| (*key, lerp(b, a, ratio))))
        .collect()
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use std::f64::consts::PI;

    fn ramp_frames(count: usize, step_ms: f64) -> Vec<RelativeFrame> {
        let mut frames: Vec<RelativeFrame> = (0..count)
            .map(|i| RelativeFrame {
                timestamp: i as f64 * step_ms,
                joint_angles: AngleKey::ALL.iter().map(|&k| (k, 0.5 + 0.1 * i as f64)).collect(),
                joint_distances: DistanceKey::ALL.iter().map(|&k| (k, 0.2 + 0.01 * i as f64)).collect(),
                ..RelativeFrame::default()
            })
            .collect();
        attach_deltas(&mut frames);
        frames
    }

    #[test]
    fn test_resample_array_identity() {
        let values = vec![1.0, 1.8, 1.8, 1.0, 1.0];
        assert_eq!(resample_array(&values, values.len()), values);
    }

    #[test]
    fn test_resample_array_preserves_endpoints() {
        let values = vec![0.3, 1.7, -2.2, 4.1];
        let up = resample_array(&values, 13);
        assert_eq!(up[0], 0.3);
        assert_eq!(up[12], 4.1);

        let back = resample_array(&up, values.len());
        assert_eq!(back[0], 0.3);
        assert_eq!(back[3], 4.1);
    }

    #[test]
    fn test_resample_array_interpolates() {
        let out = resample_array(&[0.0, 1.0], 5);
        assert_eq!(out, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_resample_array_degenerate() {
        assert_eq!(resample_array(&[2.5], 4), vec![2.5; 4]);
        assert_eq!(resample_array(&[], 3), vec![1.0; 3]);
        assert_eq!(resample_array(&[1.0, 2.0], 1), vec![1.0]);
    }

    #[test]
    fn test_interpolate_angle_endpoints() {
        let pairs = [(0.2, 1.4), (3.0, 0.1), (6.0, 0.3), (1.0, 5.5)];
        for (a, b) in pairs {
            assert_eq!(interpolate_angle(a, b, 0.0), a);
            let end = interpolate_angle(a, b, 1.0);
            let diff = angle_difference(end, b);
            assert!(diff.abs() < 1e-9, "{} -> {} gave {}", a, b, end);
        }
    }

    #[test]
    fn test_interpolate_angle_crosses_zero() {
        let mid = interpolate_angle(TAU - 0.1, 0.1, 0.5);
        assert!(mid.abs() < 1e-9 || (mid - TAU).abs() < 1e-9, "{}", mid);

        let wrapped = interpolate_angle(6.2, 0.2, 0.5);
        assert!((0.0..TAU).contains(&wrapped));
        assert!((wrapped - (6.2 + (0.2 - 6.2 + TAU) * 0.5 - TAU)).abs() < 1e-9);
    }

    #[test]
    fn test_interpolate_angle_wraps_negative() {
        let out = interpolate_angle(-0.1, -0.1, 0.0);
        assert!((out - (TAU - 0.1)).abs() < 1e-12);
        assert!(interpolate_angle(PI, 0.0, 0.5) >= 0.0);
    }

    #[test]
    fn test_interpolate_angle_huge_input_returns() {
        for (a, b) in [(1e300, 0.0), (0.0, -1e300), (-1e300, 1e300)] {
            let out = interpolate_angle(a, b, 0.5);
            assert!((0.0..TAU).contains(&out), "{} {} -> {}", a, b, out);
        }
    }

    #[test]
    fn test_same_length_is_unchanged() {
        let frames = ramp_frames(6, 33.0);
        assert_eq!(resample_relative_motion(&frames, 6), frames);
    }

    #[test]
    fn test_resample_length_and_span() {
        let frames = ramp_frames(12, 50.0);
        let sampled = resample_relative_motion(&frames, 5);

        assert_eq!(sampled.len(), 5);
        assert_eq!(sampled[0].timestamp, 0.0);
        assert_eq!(sampled[4].timestamp, 550.0);
        for frame in &sampled {
            assert_eq!(frame.joint_angles.len(), 9);
            assert_eq!(frame.joint_distances.len(), 12);
        }
    }

    #[test]
    fn test_resample_linear_ramp_is_preserved() {
        // A linear ramp survives smoothing in the interior, so resampled
        // values stay on the line.
        let frames = ramp_frames(11, 100.0);
        let sampled = resample_relative_motion(&frames, 6);
        let mid = sampled[2].joint_distances[&DistanceKey::HipWidth];
        assert!((mid - 0.24).abs() < 1e-9, "{}", mid);
    }

    #[test]
    fn test_smooth_motion_recomputes_deltas() {
        let mut frames = ramp_frames(4, 33.0);
        frames[2].joint_angles.insert(AngleKey::Torso, 2.0);
        let smoothed = smooth_motion(&frames);

        assert_eq!(smoothed[0], frames[0]);
        assert_eq!(smoothed[3].joint_angles, frames[3].joint_angles);
        let torso = smoothed[2].joint_angles[&AngleKey::Torso];
        assert!((torso - (0.6 + 6.0 + 0.8) / 5.0).abs() < 1e-12);

        let change = smoothed[2].angle_changes.as_ref().unwrap()[&AngleKey::Torso];
        let expected = torso - smoothed[1].joint_angles[&AngleKey::Torso];
        assert!((change - expected).abs() < 1e-12);
    }

    #[test]
    fn test_first_sample_has_empty_deltas() {
        let frames = ramp_frames(10, 40.0);
        let sampled = resample_relative_motion(&frames, 4);
        assert!(sampled[0]
            .angle_changes
            .as_ref()
            .map(|c| c.is_empty())
            .unwrap_or(true));
        assert!(!sampled[1].angle_changes.as_ref().unwrap().is_empty());
    }
}
