/// Basic usage example: record a wave, perform it with the trigger held, get a key command
use motion_match::{
    ControllerState, DetectionController, DetectionOutcome, JointSample, KeyBehavior, KeyMapping,
};
use motion_match::types::{
    LEFT_ANKLE, LEFT_ELBOW, LEFT_HIP, LEFT_KNEE, LEFT_SHOULDER, LEFT_WRIST, POSE_LANDMARK_COUNT,
    RIGHT_ANKLE, RIGHT_ELBOW, RIGHT_HIP, RIGHT_KNEE, RIGHT_SHOULDER, RIGHT_WRIST,
};

fn main() {
    println!("=== Motion Match: Basic Example ===\n");

    let mut controller = DetectionController::default();
    controller.set_key_mapping("wave", KeyMapping::new("ctrl+w", KeyBehavior::PressRelease));

    // Record the reference: 10 frames, 66 ms apart
    controller.start_capture("wave");
    for i in 0..10 {
        controller.ingest(i * 66, &wave_landmarks(i as f64 / 9.0), None);
    }
    if let Some(record) = controller.stop_capture() {
        println!(
            "Recorded '{}': {} frames, {:.0} ms",
            record.name,
            record.sequence.len(),
            record.duration()
        );
    }

    // Perform it again with the left trigger held; releasing it closes the window
    let held = ControllerState::with_left_trigger(1.0);
    let released = ControllerState::with_left_trigger(0.0);
    let start = 5_000;

    for i in 0..10 {
        let trigger = if i < 9 { &held } else { &released };
        let outcome = controller.ingest(start + i * 66, &wave_landmarks(i as f64 / 9.0), Some(trigger));
        if let Some(outcome) = outcome {
            print_outcome(&outcome);
        }
    }

    // A later frame lets the queued key release go out
    controller.ingest(start + 800, &wave_landmarks(0.0), None);

    println!("\n=== Key commands ===");
    for command in &controller.dispatcher().commands {
        println!("{}", serde_json::to_string(command).unwrap_or_default());
    }
}

fn print_outcome(outcome: &DetectionOutcome) {
    match outcome {
        DetectionOutcome::Detected(d) => println!(
            "\nDetected '{}' (score {:.3}, threshold {:.2}, duration {:.0} ms vs {:.0} ms)",
            d.name, d.score, d.threshold, d.result.candidate_duration, d.result.reference_duration
        ),
        DetectionOutcome::Rejected(reason) => println!("\nNo detection: {:?}", reason),
    }
}

fn wave_landmarks(t: f64) -> Vec<JointSample> {
    let mut joints = vec![JointSample::new(0.5, 0.5, 0.0); POSE_LANDMARK_COUNT];
    joints[LEFT_SHOULDER] = JointSample::new(0.60, 0.30, 0.0);
    joints[RIGHT_SHOULDER] = JointSample::new(0.40, 0.30, 0.0);
    joints[RIGHT_ELBOW] = JointSample::new(0.36, 0.42, 0.0);
    joints[RIGHT_WRIST] = JointSample::new(0.35, 0.54, 0.0);
    joints[LEFT_HIP] = JointSample::new(0.57, 0.60, 0.0);
    joints[RIGHT_HIP] = JointSample::new(0.43, 0.60, 0.0);
    joints[LEFT_KNEE] = JointSample::new(0.58, 0.75, 0.0);
    joints[RIGHT_KNEE] = JointSample::new(0.42, 0.75, 0.0);
    joints[LEFT_ANKLE] = JointSample::new(0.58, 0.90, 0.0);
    joints[RIGHT_ANKLE] = JointSample::new(0.42, 0.90, 0.0);

    let swing = (t * std::f64::consts::TAU).sin();
    joints[LEFT_ELBOW] = JointSample::new(0.70 + 0.03 * swing, 0.22, 0.0);
    joints[LEFT_WRIST] = JointSample::new(0.72 + 0.12 * swing, 0.08, 0.0);
    joints
}
