/// Stress testing for the gesture matching engine.
///
/// These tests push the controller and matcher through long captures, large
/// libraries and pathological input (NaN landmarks, zero durations, single
/// frames, wrapping angles) and check that nothing panics and every score
/// stays a finite value in [0, 1].

#[cfg(test)]
mod stress_tests {
    use crate::actions::{KeyBehavior, KeyMapping};
    use crate::detection::{DetectionController, DetectionOutcome, RejectReason};
    use crate::features::{angle_difference, relative_motion};
    use crate::matcher::MotionMatcher;
    use crate::resample::{interpolate_angle, resample_relative_motion};
    use crate::types::*;
    use std::f64::consts::{PI, TAU};

    fn new_controller() -> DetectionController {
        DetectionController::default()
    }

    /// Helper: Standing body with the left arm swinging by `swing` in [-1, 1]
    fn arm_swing(swing: f64, amplitude: f64) -> Vec<JointSample> {
        let mut joints = vec![JointSample::new(0.5, 0.5, 0.0); POSE_LANDMARK_COUNT];
        joints[LEFT_SHOULDER] = JointSample::new(0.60, 0.30, 0.0);
        joints[RIGHT_SHOULDER] = JointSample::new(0.40, 0.30, 0.0);
        joints[LEFT_ELBOW] = JointSample::new(0.70 + 0.2 * amplitude * swing, 0.22, 0.0);
        joints[RIGHT_ELBOW] = JointSample::new(0.36, 0.42, 0.0);
        joints[LEFT_WRIST] = JointSample::new(0.72 + amplitude * swing, 0.08, 0.0);
        joints[RIGHT_WRIST] = JointSample::new(0.35, 0.54, 0.0);
        joints[LEFT_HIP] = JointSample::new(0.57, 0.60, 0.0);
        joints[RIGHT_HIP] = JointSample::new(0.43, 0.60, 0.0);
        joints[LEFT_KNEE] = JointSample::new(0.58, 0.75, 0.0);
        joints[RIGHT_KNEE] = JointSample::new(0.42, 0.75, 0.0);
        joints[LEFT_ANKLE] = JointSample::new(0.58, 0.90, 0.0);
        joints[RIGHT_ANKLE] = JointSample::new(0.42, 0.90, 0.0);
        joints
    }

    fn swing_sequence(frames: usize, spacing_ms: u64, amplitude: f64, cycles: f64) -> Vec<RawSample> {
        (0..frames)
            .map(|i| {
                let t = i as f64 / frames.max(2).saturating_sub(1) as f64;
                let swing = (t * cycles * TAU).sin();
                let pose = Pose::from_slice(&arm_swing(swing, amplitude)).unwrap();
                RawSample::new(i as u64 * spacing_ms, pose)
            })
            .collect()
    }

    fn assert_unit_interval(value: f64) {
        assert!(value.is_finite(), "non-finite score {}", value);
        assert!((0.0..=1.0).contains(&value), "score out of range {}", value);
    }

    // ============================================================================
    // CATEGORY 1: LONG CAPTURES & LARGE LIBRARIES
    // ============================================================================

    /// Ten seconds of recording replayed through the trigger window
    #[test]
    fn stress_long_recording_and_replay() {
        let mut controller = new_controller();
        let frames = 300;

        controller.start_capture("long");
        for (i, sample) in swing_sequence(frames, 34, 0.3, 6.0).into_iter().enumerate() {
            controller.ingest(i as u64 * 34, sample.pose.joints(), None);
        }
        let record = controller.stop_capture().unwrap();
        assert_eq!(record.sequence.len(), frames);
        assert!(record.duration() > 2000.0);

        let held = ControllerState::with_left_trigger(1.0);
        let released = ControllerState::with_left_trigger(0.0);
        let start = 100_000;
        let mut outcome = None;
        for (i, sample) in swing_sequence(frames, 34, 0.3, 6.0).into_iter().enumerate() {
            let trigger = if i + 1 < frames { &held } else { &released };
            outcome = controller.ingest(start + i as u64 * 34, sample.pose.joints(), Some(trigger));
        }

        match outcome {
            Some(DetectionOutcome::Detected(detection)) => {
                assert_eq!(detection.name, "long");
                // Both sides long: loosened threshold.
                assert_eq!(detection.threshold, 0.45);
                assert_unit_interval(detection.score);
            }
            other => panic!("expected detection, got {:?}", other),
        }
    }

    /// Unthrottled capture at 60 Hz for a full minute
    #[test]
    fn stress_one_minute_trigger_capture() {
        let mut controller = new_controller();
        controller
            .library_mut()
            .record("swing", swing_sequence(30, 40, 0.1, 1.0))
            .unwrap();

        let held = ControllerState::with_left_trigger(0.9);
        let frames = 3600;
        for i in 0..frames {
            let swing = (i as f64 * 0.05).sin();
            assert!(controller.ingest(i as u64 * 16, &arm_swing(swing, 0.1), Some(&held)).is_none());
        }
        assert!(controller.is_trigger_held());

        let outcome = controller.ingest(frames as u64 * 16, &arm_swing(0.0, 0.1), None);
        assert!(outcome.is_some());
        assert!(!controller.is_trigger_held());
    }

    /// Fifty references scored against one candidate
    #[test]
    fn stress_fifty_motion_library() {
        let mut controller = new_controller();
        for i in 0..50 {
            let amplitude = 0.02 + 0.004 * i as f64;
            let cycles = 1.0 + (i % 5) as f64 * 0.5;
            let frames = 8 + i % 20;
            controller
                .library_mut()
                .record(&format!("motion_{:02}", i), swing_sequence(frames, 40 + i as u64, amplitude, cycles))
                .unwrap();
        }
        assert_eq!(controller.library().len(), 50);

        let candidate = swing_sequence(20, 45, 0.1, 2.0);
        let evaluation = controller.evaluate(&candidate);
        assert_eq!(evaluation.scores.len(), 50);
        for (i, entry) in evaluation.scores.iter().enumerate() {
            assert_eq!(entry.name, format!("motion_{:02}", i));
            assert_unit_interval(entry.result.score);
            assert_unit_interval(entry.result.angle_score);
            assert_unit_interval(entry.result.distance_score);
        }

        match controller.detect(candidate, 1_000) {
            DetectionOutcome::Detected(d) => assert!(d.score > d.threshold),
            DetectionOutcome::Rejected(reason) => assert_eq!(reason, RejectReason::NoMatch),
        }
    }

    // ============================================================================
    // CATEGORY 2: PATHOLOGICAL INPUT
    // ============================================================================

    /// Every other frame carries NaN or infinite key joints
    #[test]
    fn stress_interleaved_non_finite_frames() {
        let mut controller = new_controller();
        controller
            .library_mut()
            .record("swing", swing_sequence(12, 50, 0.1, 1.0))
            .unwrap();

        let held = ControllerState::with_left_trigger(1.0);
        for i in 0..40u64 {
            let mut joints = arm_swing((i as f64 * 0.3).sin(), 0.1);
            if i % 2 == 1 {
                let bad = if i % 4 == 1 { f64::NAN } else { f64::INFINITY };
                joints[KEY_JOINTS[(i as usize / 2) % KEY_JOINTS.len()]].x = bad;
            }
            assert!(controller.ingest(i * 25, &joints, Some(&held)).is_none());
        }

        let outcome = controller.ingest(1_000, &arm_swing(0.0, 0.1), None);
        match outcome {
            Some(DetectionOutcome::Detected(d)) => assert_unit_interval(d.score),
            Some(DetectionOutcome::Rejected(_)) => {}
            None => panic!("capture of 21 valid frames was discarded"),
        }

        let evaluation = controller.evaluate(&swing_sequence(12, 50, 0.1, 1.0));
        assert_unit_interval(evaluation.scores[0].result.score);
    }

    /// Truncated landmark arrays never reach the buffers
    #[test]
    fn stress_truncated_landmarks() {
        let mut controller = new_controller();
        controller.start_capture("partial");
        let full = arm_swing(0.0, 0.1);
        for len in 0..POSE_LANDMARK_COUNT {
            let held = ControllerState::with_left_trigger(1.0);
            controller.ingest(len as u64 * 40, &full[..len], Some(&held));
        }
        // Only the arrays reaching the last key joint are usable.
        let record = controller.stop_capture().unwrap();
        assert_eq!(record.sequence.len(), POSE_LANDMARK_COUNT - REQUIRED_LANDMARK_COUNT);
    }

    /// All frames share one timestamp
    #[test]
    fn stress_zero_duration_sequences() {
        let mut controller = new_controller();
        let frozen: Vec<RawSample> = swing_sequence(10, 0, 0.1, 1.0);
        controller.library_mut().record("frozen", frozen.clone()).unwrap();
        controller
            .library_mut()
            .record("swing", swing_sequence(10, 50, 0.1, 1.0))
            .unwrap();

        let evaluation = controller.evaluate(&frozen);
        assert_eq!(evaluation.metrics.duration, 0.0);
        assert_eq!(evaluation.metrics.average_speed, 0.0);
        for entry in &evaluation.scores {
            assert_unit_interval(entry.result.score);
        }

        assert_eq!(
            controller.detect(frozen, 5_000),
            DetectionOutcome::Rejected(RejectReason::BelowDurationGate)
        );
    }

    /// Single-frame references can be stored but never match
    #[test]
    fn stress_single_frame_references() {
        let mut controller = new_controller();
        for i in 0..5 {
            controller
                .library_mut()
                .record(&format!("blip_{}", i), swing_sequence(1, 0, 0.1, 1.0))
                .unwrap();
        }
        let candidate = swing_sequence(12, 50, 0.1, 1.0);

        let evaluation = controller.evaluate(&candidate);
        assert!(evaluation.scores.iter().all(|s| s.result.score == 0.0));
        assert_eq!(
            controller.detect(candidate, 1_000),
            DetectionOutcome::Rejected(RejectReason::NoMatch)
        );
    }

    /// Coordinates far outside the unit frame stay finite
    #[test]
    fn stress_extreme_coordinates() {
        let matcher = MotionMatcher::default();
        let normal = relative_motion(&swing_sequence(15, 30, 0.1, 2.0));

        for scale in [1e6, 1e200, 1e300] {
            let huge: Vec<RawSample> = (0..15)
                .map(|i| {
                    let joints: Vec<JointSample> = arm_swing((i as f64).sin(), 0.1)
                        .into_iter()
                        .map(|j| JointSample::new(j.x * scale, j.y * -scale, i as f64 * scale * 0.1))
                        .collect();
                    RawSample::new(i * 30, Pose::from_slice(&joints).unwrap())
                })
                .collect();
            let huge = relative_motion(&huge);

            for frame in &huge {
                for (key, &angle) in &frame.joint_angles {
                    assert!((0.0..=PI).contains(&angle), "{} = {} at scale {}", key, angle, scale);
                }
                for (key, &distance) in &frame.joint_distances {
                    assert!(distance.is_finite() && distance >= 0.0, "{} = {} at scale {}", key, distance, scale);
                }
            }

            let result = matcher.score(&huge, &normal, &ImportanceMap::new());
            assert_unit_interval(result.score);
            let result = matcher.score(&normal, &huge, &ImportanceMap::new());
            assert_unit_interval(result.score);
            let result = matcher.score(&huge, &huge, &ImportanceMap::new());
            assert_unit_interval(result.score);
        }
    }

    /// Recording frames arriving with timestamps going backwards
    #[test]
    fn stress_backwards_timestamps_in_recording() {
        let mut controller = new_controller();
        controller.start_capture("rewind");
        for i in 0..20u64 {
            controller.ingest(10_000 - i * 100, &arm_swing((i as f64).sin(), 0.1), None);
        }
        let record = controller.stop_capture().unwrap();
        assert_eq!(record.sequence.len(), 1);
        assert_eq!(record.sequence[0].timestamp_ms, 0);
    }

    // ============================================================================
    // CATEGORY 3: ANGLE WRAPAROUND
    // ============================================================================

    /// Angles far outside one turn wrap in constant time
    #[test]
    fn stress_huge_angle_inputs() {
        let diff = angle_difference(1e300, 0.0);
        assert!(diff > -PI && diff <= PI);
        let diff = angle_difference(0.0, f64::MAX);
        assert!(diff > -PI && diff <= PI);
        assert!(angle_difference(0.0, f64::INFINITY).is_infinite());

        for t in [0.0, 0.25, 0.5, 1.0] {
            let angle = interpolate_angle(1e300, -1e300, t);
            assert!((0.0..TAU).contains(&angle), "t={} gave {}", t, angle);
        }
    }

    /// Interpolation across the 0 / 2π seam stays on the short arc
    #[test]
    fn stress_interpolate_across_seam() {
        for step in 0..=100 {
            let t = step as f64 / 100.0;
            let forward = interpolate_angle(TAU - 0.1, 0.1, t);
            let backward = interpolate_angle(0.1, TAU - 0.1, t);
            assert!((0.0..TAU).contains(&forward));
            assert!((0.0..TAU).contains(&backward));
            // Never passes through the far side of the circle.
            assert!(forward < 0.2 || forward > TAU - 0.2, "t={} gave {}", t, forward);
            assert!(backward < 0.2 || backward > TAU - 0.2, "t={} gave {}", t, backward);
        }
    }

    /// Resampling a sequence whose angles hop around the seam
    #[test]
    fn stress_resample_wrapping_angles() {
        let frames: Vec<RelativeFrame> = (0..40)
            .map(|i| {
                // Deterministic scatter around 0 / 2π.
                let jitter = ((i * 7919) % 13) as f64 / 13.0 * 0.4 - 0.2;
                let angle = (jitter + TAU) % TAU;
                let joint_angles: AngleMap = AngleKey::ALL.iter().map(|&k| (k, angle)).collect();
                RelativeFrame {
                    timestamp: i as f64 * 33.0,
                    joint_angles,
                    ..RelativeFrame::default()
                }
            })
            .collect();

        for count in [2, 5, 13, 20, 39] {
            let resampled = resample_relative_motion(&frames, count);
            assert_eq!(resampled.len(), count);
            for frame in &resampled {
                assert!(frame.timestamp.is_finite());
                for &value in frame.joint_angles.values() {
                    assert!(value.is_finite());
                    assert!((0.0..=TAU).contains(&value), "angle {}", value);
                }
            }
        }
    }

    /// Opposite-direction swings of a full half turn still score in range
    #[test]
    fn stress_half_turn_angle_changes() {
        let matcher = MotionMatcher::default();
        let frame = |ts: f64, angle: f64| RelativeFrame {
            timestamp: ts,
            joint_angles: AngleKey::ALL.iter().map(|&k| (k, angle)).collect(),
            ..RelativeFrame::default()
        };
        let mut forward: Vec<RelativeFrame> = (0..10).map(|i| frame(i as f64 * 50.0, i as f64 * PI / 9.0)).collect();
        let mut backward: Vec<RelativeFrame> =
            (0..10).map(|i| frame(i as f64 * 50.0, PI - i as f64 * PI / 9.0)).collect();
        crate::features::attach_deltas(&mut forward);
        crate::features::attach_deltas(&mut backward);

        let result = matcher.score(&forward, &backward, &ImportanceMap::new());
        assert_unit_interval(result.score);
        let same = matcher.score(&forward, &forward, &ImportanceMap::new());
        assert!(same.angle_score > result.angle_score);
    }

    // ============================================================================
    // CATEGORY 4: TRIGGER & KEY CHURN
    // ============================================================================

    /// Trigger flapping every frame never yields a window long enough to score
    #[test]
    fn stress_trigger_flapping() {
        let mut controller = new_controller();
        controller
            .library_mut()
            .record("swing", swing_sequence(12, 50, 0.1, 1.0))
            .unwrap();

        for i in 0..2_000u64 {
            let value = if i % 2 == 0 { 1.0 } else { 0.0 };
            let state = ControllerState::with_left_trigger(value);
            assert!(controller.ingest(i * 16, &arm_swing((i as f64).sin(), 0.1), Some(&state)).is_none());
        }
        assert!(controller.last_detection().is_none());
    }

    /// Repeated detections with a press-release mapping drain every release
    #[test]
    fn stress_repeated_press_release() {
        let mut controller = new_controller();
        let reference = swing_sequence(12, 50, 0.1, 1.0);
        controller.library_mut().record("swing", reference.clone()).unwrap();
        controller.set_key_mapping("swing", KeyMapping::new("ctrl+shift+x", KeyBehavior::PressRelease));

        let rounds = 100u64;
        for round in 0..rounds {
            let now = 10_000 + round * 1_000;
            let outcome = controller.detect(reference.clone(), now);
            assert_eq!(outcome.detected_name(), Some("swing"), "round {}", round);
            controller.ingest(now + 100, &arm_swing(0.0, 0.1), None);
        }

        let commands = &controller.dispatcher().commands;
        assert_eq!(commands.len(), rounds as usize * 2);
        assert!(commands.iter().all(|c| c.key == "x" && c.modifiers == ["ctrl", "shift"]));
        assert_eq!(controller.key_mapper().pending_releases(), 0);
    }
}
