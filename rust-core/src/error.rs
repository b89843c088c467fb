//! Error taxonomy for the gesture engine.
//!
//! None of these are fatal to the per-frame pipeline: a malformed frame is
//! skipped, a bad import is rejected without touching the library, and a
//! refused key command is logged. Non-detections (cooldown, gates, no match)
//! are ordinary outcomes, see [`crate::detection::RejectReason`].

pub type Result<T> = std::result::Result<T, MotionError>;

#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Malformed frame: expected at least {expected} landmarks, got {got}")]
    MalformedFrame { expected: usize, got: usize },

    #[error("Malformed frame: joint {index} has non-finite coordinates")]
    NonFiniteJoint { index: usize },

    #[error("Unknown feature key: {0}")]
    UnknownFeature(String),

    #[error("Import format error: {0}")]
    ImportFormat(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown motion: {0}")]
    UnknownMotion(String),

    #[error("Action dispatch failed: {0}")]
    Dispatch(String),
}

impl MotionError {
    /// True for errors that only invalidate a single frame.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            MotionError::MalformedFrame { .. } | MotionError::NonFiniteJoint { .. }
        )
    }
}
