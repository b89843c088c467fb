//! Motion Match Gesture Engine Library
//!
//! Recognizes a live-performed body gesture by comparing its skeletal joint
//! trajectory against a library of recorded reference gestures, and fires a
//! mapped key command when one matches.
//!
//! # Pipeline
//!
//! ```text
//! pose frames ─▶ features / metrics ─▶ phase weights + resampling ─▶ matcher
//!                                                                      │
//!                  key command ◀── detection (gates, thresholds, cooldown)
//! ```
//!
//! # Design Philosophy
//!
//! - **Relative, not absolute**: matching works on joint angles, inter-joint
//!   distances and their frame-to-frame changes, so where the performer
//!   stands and how large they appear does not matter.
//! - **Nothing is fatal**: a malformed frame is skipped, a bad import is
//!   rejected whole, a failing key dispatcher is logged.
//! - **Explicit configuration**: every tunable lives in a config struct
//!   owned by the controller; there is no global state.
//!
//! # Example
//!
//! ```ignore
//! use motion_match::{ControllerState, DetectionController};
//!
//! let mut controller = DetectionController::default();
//! controller.start_capture("wave");
//! // ... controller.ingest(timestamp_ms, &landmarks, None) per frame ...
//! controller.stop_capture();
//!
//! // Later, hold the left trigger while performing the gesture.
//! let trigger = ControllerState::with_left_trigger(1.0);
//! if let Some(outcome) = controller.ingest(timestamp_ms, &landmarks, Some(&trigger)) {
//!     println!("{:?}", outcome.detected_name());
//! }
//! ```

pub mod actions;
pub mod detection;
pub mod error;
pub mod export;
pub mod features;
pub mod library;
pub mod matcher;
pub mod metrics;
pub mod phase;
pub mod resample;
pub mod types;

mod stress_tests;

// Re-export commonly used types
pub use actions::{ActionDispatcher, CommandLog, KeyAction, KeyBehavior, KeyCommand, KeyMapping};
pub use detection::{
    Detection, DetectionConfig, DetectionController, DetectionOutcome, Evaluation, RejectReason,
};
pub use error::{MotionError, Result};
pub use library::{MotionLibrary, MotionRecord};
pub use matcher::{MatchResult, MatcherConfig, MotionMatcher};
pub use phase::{PhaseAnalyzer, PhaseConfig};
pub use types::{
    AngleKey, ControllerState, DistanceKey, FeatureKey, JointSample, MotionMetrics, Pose, RawSample,
    RelativeFrame,
};
