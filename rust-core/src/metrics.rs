//! Summary statistics over a raw joint-position sequence.
//!
//! Metrics gate live candidates (was there enough movement, did it last long
//! enough) and tag stored references with their duration, which drives the
//! adaptive per-reference threshold.

use std::collections::BTreeMap;

use crate::types::{MotionMetrics, RawSample, KEY_JOINTS};

/// Compute metrics for a raw sequence.
///
/// Sequences shorter than two frames yield all-zero metrics.
pub fn motion_metrics(sequence: &[RawSample]) -> MotionMetrics {
    if sequence.len() < 2 {
        return MotionMetrics {
            total_frames: sequence.len(),
            ..MotionMetrics::default()
        };
    }

    let first = &sequence[0];
    let last = &sequence[sequence.len() - 1];
    let duration = last.timestamp_ms as f64 - first.timestamp_ms as f64;

    let mut max_displacement = 0.0;
    let mut max_joint_idx = None;
    let mut joint_displacements = BTreeMap::new();

    for &joint in KEY_JOINTS.iter() {
        let joint_max = sequence
            .windows(2)
            .map(|pair| {
                pair[0]
                    .pose
                    .position(joint)
                    .distance_to(&pair[1].pose.position(joint))
            })
            .fold(0.0_f64, f64::max);

        joint_displacements.insert(joint, joint_max);

        if joint_max > max_displacement {
            max_displacement = joint_max;
            max_joint_idx = Some(joint);
        }
    }

    let average_speed = if duration > 0.0 {
        max_displacement / (duration / 1000.0)
    } else {
        0.0
    };

    MotionMetrics {
        duration,
        max_displacement,
        max_joint_idx,
        joint_displacements,
        total_frames: sequence.len(),
        average_speed,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn pose_with_wrist(x: f64) -> Pose {
        let mut joints = vec![JointSample::new(0.5, 0.5, 0.0); POSE_LANDMARK_COUNT];
        joints[LEFT_WRIST] = JointSample::new(x, 0.5, 0.0);
        Pose::from_slice(&joints).unwrap()
    }

    #[test]
    fn test_short_sequence_is_zero() {
        let metrics = motion_metrics(&[RawSample::new(0, pose_with_wrist(0.5))]);
        assert_eq!(metrics.duration, 0.0);
        assert_eq!(metrics.max_displacement, 0.0);
        assert_eq!(metrics.max_joint_idx, None);
        assert_eq!(metrics.total_frames, 1);
    }

    #[test]
    fn test_peak_displacement_and_speed() {
        let sequence = vec![
            RawSample::new(0, pose_with_wrist(0.5)),
            RawSample::new(250, pose_with_wrist(0.6)),
            RawSample::new(500, pose_with_wrist(0.9)),
        ];
        let metrics = motion_metrics(&sequence);

        assert_eq!(metrics.duration, 500.0);
        assert!((metrics.max_displacement - 0.3).abs() < 1e-9);
        assert_eq!(metrics.max_joint_idx, Some(LEFT_WRIST));
        assert!((metrics.average_speed - 0.6).abs() < 1e-9);
        assert_eq!(metrics.joint_displacements.len(), KEY_JOINTS.len());
        assert_eq!(metrics.joint_displacements[&RIGHT_WRIST], 0.0);
    }

    #[test]
    fn test_still_sequence() {
        let sequence = vec![
            RawSample::new(0, pose_with_wrist(0.5)),
            RawSample::new(300, pose_with_wrist(0.5)),
        ];
        let metrics = motion_metrics(&sequence);
        assert_eq!(metrics.max_displacement, 0.0);
        assert_eq!(metrics.max_joint_idx, None);
        assert_eq!(metrics.average_speed, 0.0);
    }

    #[test]
    fn test_zero_duration_has_finite_speed() {
        let sequence = vec![
            RawSample::new(0, pose_with_wrist(0.5)),
            RawSample::new(0, pose_with_wrist(0.7)),
        ];
        let metrics = motion_metrics(&sequence);
        assert_eq!(metrics.average_speed, 0.0);
        assert!(metrics.max_displacement > 0.0);
    }
}
