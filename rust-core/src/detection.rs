//! Capture windows, gating, thresholds and cooldown.
//!
//! The controller is driven once per frame through [`DetectionController::ingest`].
//! Two independent capture windows exist:
//! - **Recording** (explicit start/stop): frames are throttled to the record
//!   frame rate and stored as a named reference motion on stop.
//! - **Trigger capture** (left controller trigger): every frame between the
//!   rising and falling edge is buffered unthrottled; on release the buffer
//!   is scored against the library.
//!
//! State machine for trigger capture:
//! ```text
//!   Idle ──trigger ≥ threshold──▶ Capturing ──trigger < threshold──▶ Idle
//!                                                  │
//!                                     frames ≥ min_sequence_length
//!                                                  ▼
//!                        cooldown → empty library → movement → duration
//!                                                  ▼
//!                                     best score over adaptive threshold
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::actions::{ActionDispatcher, CommandLog, KeyMapper, KeyMapping};
use crate::error::{MotionError, Result};
use crate::export::{key_mappings_to_json, parse_key_mappings, LibraryExport, MotionExport};
use crate::features::relative_motion;
use crate::library::{MotionLibrary, MotionRecord};
use crate::matcher::{MatchResult, MatcherConfig, MotionMatcher};
use crate::metrics::motion_metrics;
use crate::phase::PhaseConfig;
use crate::types::{
    normalize_timestamps, ControllerState, JointSample, MotionMetrics, Pose, RawSample, RelativeFrame,
};

/// Allowed range of the user-tunable base match threshold.
pub const MATCH_THRESHOLD_RANGE: (f64, f64) = (0.1, 0.9);

/// Allowed range of the user-tunable cooldown (ms).
pub const COOLDOWN_RANGE_MS: (u64, u64) = (500, 5000);

/// Motions shorter than this (ms) are matched under a tighter threshold.
const SHORT_MOTION_MS: f64 = 500.0;

/// Motions longer than this (ms) on both sides get a looser threshold.
const LONG_MOTION_MS: f64 = 2000.0;

/// Configuration for capture and detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Base similarity a candidate must exceed. Clamped to [0.1, 0.9].
    pub match_threshold: f64,
    /// Minimum wall-clock gap between two detections. Clamped to [500, 5000].
    pub cooldown_ms: u64,
    /// Trigger captures with fewer frames are discarded silently.
    pub min_sequence_length: usize,
    /// Candidates shorter than this (ms) are not matched.
    pub min_motion_duration_ms: f64,
    /// Candidates whose peak joint displacement is below this are not matched.
    pub min_movement_magnitude: f64,
    /// Frame rate cap for explicit recording.
    pub record_frame_rate: f64,
    /// Left trigger value that opens a capture window.
    pub trigger_threshold: f64,
    /// Delay before the release of a press-release key mapping.
    pub key_release_delay_ms: u64,
    pub matcher: MatcherConfig,
    pub phase: PhaseConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,       // Allows natural variation
            cooldown_ms: 1000,
            min_sequence_length: 5,
            min_motion_duration_ms: 200.0,
            min_movement_magnitude: 0.02,
            record_frame_rate: 30.0,
            trigger_threshold: 0.5,
            key_release_delay_ms: 100,
            matcher: MatcherConfig::default(),
            phase: PhaseConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// Copy with the tunable fields clamped into their allowed ranges.
    pub fn sanitized(mut self) -> Self {
        self.match_threshold = clamp_threshold(self.match_threshold);
        self.cooldown_ms = self.cooldown_ms.clamp(COOLDOWN_RANGE_MS.0, COOLDOWN_RANGE_MS.1);
        self
    }

    /// Minimum gap between recorded frames (ms).
    pub fn record_frame_interval_ms(&self) -> f64 {
        if self.record_frame_rate > 0.0 {
            1000.0 / self.record_frame_rate
        } else {
            0.0
        }
    }
}

fn clamp_threshold(value: f64) -> f64 {
    if value.is_nan() {
        return MATCH_THRESHOLD_RANGE.0;
    }
    value.clamp(MATCH_THRESHOLD_RANGE.0, MATCH_THRESHOLD_RANGE.1)
}

/// Why a closed capture window did not produce a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    Cooldown,
    EmptyLibrary,
    BelowMovementGate,
    BelowDurationGate,
    NoMatch,
}

/// A successful match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub name: String,
    pub score: f64,
    pub threshold: f64,
    pub timestamp_ms: u64,
    pub result: MatchResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DetectionOutcome {
    Detected(Detection),
    Rejected(RejectReason),
}

impl DetectionOutcome {
    pub fn detected_name(&self) -> Option<&str> {
        match self {
            DetectionOutcome::Detected(d) => Some(&d.name),
            DetectionOutcome::Rejected(_) => None,
        }
    }
}

/// Score of a candidate against one reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceScore {
    pub name: String,
    /// Adaptive threshold applied to this comparison.
    pub threshold: f64,
    pub result: MatchResult,
}

/// Scores of a candidate against the whole library, in library order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub metrics: MotionMetrics,
    pub scores: Vec<ReferenceScore>,
}

impl Evaluation {
    /// First reference, in library order, whose score exceeds both the
    /// running best and its own threshold. Ties keep the earlier entry.
    pub fn winner(&self) -> Option<&ReferenceScore> {
        let mut best: Option<&ReferenceScore> = None;
        let mut best_score = 0.0;
        for entry in &self.scores {
            if entry.result.score > best_score && entry.result.score > entry.threshold {
                best_score = entry.result.score;
                best = Some(entry);
            }
        }
        best
    }
}

#[derive(Debug, Clone)]
struct RecordingSession {
    name: String,
    frames: Vec<RawSample>,
    last_frame_ms: Option<u64>,
}

#[derive(Debug, Clone)]
struct LastDetection {
    name: String,
    timestamp_ms: u64,
}

/// Drives capture, scoring and key dispatch for one performer.
pub struct DetectionController<D: ActionDispatcher = CommandLog> {
    config: DetectionConfig,
    matcher: MotionMatcher,
    library: MotionLibrary,
    keys: KeyMapper,
    dispatcher: D,

    recording: Option<RecordingSession>,
    trigger_held: bool,
    trigger_buffer: Vec<RawSample>,

    last_detection: Option<LastDetection>,
}

impl Default for DetectionController<CommandLog> {
    fn default() -> Self {
        Self::new(DetectionConfig::default(), CommandLog::default())
    }
}

impl<D: ActionDispatcher> DetectionController<D> {
    pub fn new(config: DetectionConfig, dispatcher: D) -> Self {
        let config = config.sanitized();
        Self {
            matcher: MotionMatcher::new(config.matcher.clone(), config.phase.clone()),
            keys: KeyMapper::new(config.key_release_delay_ms),
            config,
            library: MotionLibrary::new(),
            dispatcher,
            recording: None,
            trigger_held: false,
            trigger_buffer: Vec::new(),
            last_detection: None,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn library(&self) -> &MotionLibrary {
        &self.library
    }

    /// Mutable library access for importance edits.
    pub fn library_mut(&mut self) -> &mut MotionLibrary {
        &mut self.library
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    pub fn key_mapper(&self) -> &KeyMapper {
        &self.keys
    }

    pub fn list_motions(&self) -> Vec<String> {
        self.library.names()
    }

    pub fn last_detection(&self) -> Option<(&str, u64)> {
        self.last_detection
            .as_ref()
            .map(|d| (d.name.as_str(), d.timestamp_ms))
    }

    // ========================================================================
    // TUNABLES
    // ========================================================================

    /// Set the base match threshold, clamped to [0.1, 0.9]. Returns the stored value.
    pub fn set_match_threshold(&mut self, threshold: f64) -> f64 {
        let old = self.config.match_threshold;
        self.config.match_threshold = clamp_threshold(threshold);
        info!(old, new = self.config.match_threshold, "Match threshold changed");
        self.config.match_threshold
    }

    /// Set the cooldown, clamped to [500, 5000] ms. Returns the stored value.
    pub fn set_cooldown(&mut self, cooldown_ms: u64) -> u64 {
        let old = self.config.cooldown_ms;
        self.config.cooldown_ms = cooldown_ms.clamp(COOLDOWN_RANGE_MS.0, COOLDOWN_RANGE_MS.1);
        info!(old, new = self.config.cooldown_ms, "Motion cooldown changed");
        self.config.cooldown_ms
    }

    /// Threshold for one comparison, adjusted for very short or very long motions.
    pub fn adaptive_threshold(&self, candidate_ms: f64, reference_ms: f64) -> f64 {
        let mut threshold = self.config.match_threshold;

        if candidate_ms < SHORT_MOTION_MS || reference_ms < SHORT_MOTION_MS {
            threshold = (threshold + 0.1).min(0.6);
        }
        if candidate_ms > LONG_MOTION_MS && reference_ms > LONG_MOTION_MS {
            threshold = (threshold - 0.05).max(0.4);
        }

        threshold
    }

    // ========================================================================
    // FRAME INGEST
    // ========================================================================

    /// Feed one frame. Returns an outcome when a trigger window closed with
    /// enough frames to be scored.
    ///
    /// Frames whose landmarks are malformed are skipped.
    pub fn ingest(
        &mut self,
        timestamp_ms: u64,
        landmarks: &[JointSample],
        controller: Option<&ControllerState>,
    ) -> Option<DetectionOutcome> {
        match Pose::from_slice(landmarks) {
            Ok(pose) => self.ingest_pose(timestamp_ms, pose, controller),
            Err(e) => {
                self.keys.tick(timestamp_ms, &mut self.dispatcher);
                if e.is_frame_error() {
                    warn!(timestamp_ms, error = %e, "Skipping malformed frame");
                } else {
                    error!(timestamp_ms, error = %e, "Skipping frame");
                }
                None
            }
        }
    }

    /// Feed one already-validated frame.
    pub fn ingest_pose(
        &mut self,
        timestamp_ms: u64,
        pose: Pose,
        controller: Option<&ControllerState>,
    ) -> Option<DetectionOutcome> {
        self.keys.tick(timestamp_ms, &mut self.dispatcher);

        let controller = controller.map(ControllerState::normalized);
        let sample = RawSample {
            timestamp_ms,
            pose,
            controller,
        };

        let interval = self.config.record_frame_interval_ms();
        if let Some(session) = self.recording.as_mut() {
            let due = session
                .last_frame_ms
                .map_or(true, |last| timestamp_ms.saturating_sub(last) as f64 >= interval);
            if due {
                session.frames.push(sample.clone());
                session.last_frame_ms = Some(timestamp_ms);
                if session.frames.len() % 10 == 0 {
                    debug!(motion = %session.name, frames = session.frames.len(), "Recording");
                }
            }
        }

        let trigger = controller.map(|c| c.left_trigger()).unwrap_or(0.0);
        let pressed = trigger >= self.config.trigger_threshold;

        if pressed && !self.trigger_held {
            self.trigger_held = true;
            self.trigger_buffer.clear();
            info!(timestamp_ms, "Left trigger pressed, starting motion capture");
        }

        if self.trigger_held {
            self.trigger_buffer.push(sample);
            if self.trigger_buffer.len() % 30 == 0 {
                debug!(frames = self.trigger_buffer.len(), "Trigger held");
            }
        }

        if !pressed && self.trigger_held {
            self.trigger_held = false;
            let buffer = std::mem::take(&mut self.trigger_buffer);
            info!(frames = buffer.len(), "Left trigger released, analyzing capture");

            if buffer.len() < self.config.min_sequence_length {
                debug!(
                    frames = buffer.len(),
                    required = self.config.min_sequence_length,
                    "Not enough frames for motion detection"
                );
                return None;
            }
            return Some(self.detect(buffer, timestamp_ms));
        }

        None
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn is_trigger_held(&self) -> bool {
        self.trigger_held
    }

    // ========================================================================
    // RECORDING
    // ========================================================================

    /// Open a recording window for `name`. An empty name is ignored.
    pub fn start_capture(&mut self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if let Some(previous) = &self.recording {
            debug!(motion = %previous.name, "Discarding unfinished recording");
        }
        self.recording = Some(RecordingSession {
            name: name.to_string(),
            frames: Vec::new(),
            last_frame_ms: None,
        });
        info!(motion = name, "Started recording motion");
        true
    }

    /// Close the recording window and store the motion.
    ///
    /// Returns `None` when no recording was open or no frame was captured.
    pub fn stop_capture(&mut self) -> Option<&MotionRecord> {
        let session = self.recording.take()?;

        if session.frames.is_empty() {
            warn!(motion = %session.name, "No frames recorded");
            return None;
        }

        match self.library.record(&session.name, session.frames) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(motion = %session.name, error = %e, "Could not store recording");
                None
            }
        }
    }

    /// Drop any open capture window without side effects.
    pub fn cancel_capture(&mut self) {
        self.recording = None;
        self.trigger_held = false;
        self.trigger_buffer.clear();
    }

    /// Remove a motion together with its key mapping.
    pub fn remove_motion(&mut self, name: &str) -> bool {
        let removed = self.library.remove(name).is_some();
        let unmapped = self.keys.remove_mapping(name);
        removed || unmapped
    }

    pub fn set_key_mapping(&mut self, motion: &str, mapping: KeyMapping) {
        self.keys.set_mapping(motion, mapping);
    }

    pub fn remove_key_mapping(&mut self, motion: &str) -> bool {
        self.keys.remove_mapping(motion)
    }

    // ========================================================================
    // DETECTION
    // ========================================================================

    /// Score a candidate against every reference without gates or cooldown.
    pub fn evaluate(&self, sequence: &[RawSample]) -> Evaluation {
        let mut normalized = sequence.to_vec();
        normalize_timestamps(&mut normalized);
        let metrics = motion_metrics(&normalized);
        let frames = relative_motion(&normalized);
        let scores = self.score_library(&frames, &metrics);
        Evaluation { metrics, scores }
    }

    /// Run the full detection pipeline on a closed capture.
    ///
    /// On success the detection time is recorded for cooldown and the
    /// winner's key mapping is executed.
    pub fn detect(&mut self, sequence: Vec<RawSample>, now_ms: u64) -> DetectionOutcome {
        if let Some(last) = &self.last_detection {
            if now_ms.saturating_sub(last.timestamp_ms) < self.config.cooldown_ms {
                debug!(last = %last.name, "In cooldown period, skipping motion detection");
                return DetectionOutcome::Rejected(RejectReason::Cooldown);
            }
        }

        if self.library.is_empty() {
            debug!("No saved motions to compare against");
            return DetectionOutcome::Rejected(RejectReason::EmptyLibrary);
        }

        let mut normalized = sequence;
        normalize_timestamps(&mut normalized);
        let metrics = motion_metrics(&normalized);

        if metrics.max_displacement < self.config.min_movement_magnitude {
            debug!(
                max_displacement = metrics.max_displacement,
                threshold = self.config.min_movement_magnitude,
                "Not enough movement in sequence"
            );
            return DetectionOutcome::Rejected(RejectReason::BelowMovementGate);
        }

        if metrics.duration < self.config.min_motion_duration_ms {
            debug!(
                duration_ms = metrics.duration,
                threshold = self.config.min_motion_duration_ms,
                "Motion too short"
            );
            return DetectionOutcome::Rejected(RejectReason::BelowDurationGate);
        }

        let frames = relative_motion(&normalized);
        let evaluation = Evaluation {
            scores: self.score_library(&frames, &metrics),
            metrics,
        };

        let Some(winner) = evaluation.winner() else {
            let best = evaluation
                .scores
                .iter()
                .max_by(|a, b| a.result.score.total_cmp(&b.result.score));
            info!(
                best = best.map(|s| s.name.as_str()).unwrap_or(""),
                score = best.map(|s| s.result.score).unwrap_or(0.0),
                "No motion matched with sufficient confidence"
            );
            return DetectionOutcome::Rejected(RejectReason::NoMatch);
        };

        let detection = Detection {
            name: winner.name.clone(),
            score: winner.result.score,
            threshold: winner.threshold,
            timestamp_ms: now_ms,
            result: winner.result,
        };

        self.last_detection = Some(LastDetection {
            name: detection.name.clone(),
            timestamp_ms: now_ms,
        });
        info!(motion = %detection.name, score = detection.score, threshold = detection.threshold, "Motion detected");

        self.keys.execute(&detection.name, now_ms, &mut self.dispatcher);
        DetectionOutcome::Detected(detection)
    }

    fn score_library(&self, frames: &[RelativeFrame], metrics: &MotionMetrics) -> Vec<ReferenceScore> {
        self.library
            .iter()
            .map(|record| {
                let result = self
                    .matcher
                    .score(frames, &record.relative_motion, &record.importance);
                let threshold = self.adaptive_threshold(metrics.duration, record.metrics.duration);
                debug!(
                    motion = %record.name,
                    score = result.score,
                    angle = result.angle_score,
                    distance = result.distance_score,
                    duration = result.duration_score,
                    threshold,
                    "Match result"
                );
                ReferenceScore {
                    name: record.name.clone(),
                    threshold,
                    result,
                }
            })
            .collect()
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    pub fn export_motion(&self, name: &str) -> Result<String> {
        let record = self
            .library
            .get(name)
            .ok_or_else(|| MotionError::UnknownMotion(name.to_string()))?;
        let json = MotionExport::from_record(record, self.keys.mapping(name)).to_json()?;
        info!(motion = name, "Exported motion");
        Ok(json)
    }

    /// Import one motion under `name`. Nothing is stored on failure.
    pub fn import_motion(&mut self, json: &str, name: &str) -> Result<()> {
        let imported = MotionExport::from_json(json).and_then(|export| export.into_imported(name));
        let imported = match imported {
            Ok(imported) => imported,
            Err(e) => {
                warn!(motion = name, error = %e, "Error importing motion");
                return Err(e);
            }
        };

        info!(
            motion = name,
            frames = imported.record.sequence.len(),
            duration_ms = imported.record.metrics.duration,
            "Imported motion"
        );
        if let Some(mapping) = imported.key_mapping {
            self.keys.set_mapping(name, mapping);
        }
        self.library.insert(imported.record);
        Ok(())
    }

    pub fn export_library(&self) -> Result<String> {
        let mut export = LibraryExport::default();
        for record in self.library.iter() {
            export.motions.insert(
                record.name.clone(),
                MotionExport::from_record(record, self.keys.mapping(&record.name)),
            );
        }
        info!(motions = export.motions.len(), "Exported library");
        export.to_json()
    }

    /// Import a whole library. Either every motion is stored or none is.
    pub fn import_library(&mut self, json: &str) -> Result<usize> {
        let imported = match LibraryExport::parse(json) {
            Ok(imported) => imported,
            Err(e) => {
                warn!(error = %e, "Library import rejected");
                return Err(e);
            }
        };

        let count = imported.len();
        for motion in imported {
            if let Some(mapping) = motion.key_mapping {
                self.keys.set_mapping(&motion.record.name, mapping);
            }
            self.library.insert(motion.record);
        }
        info!(motions = count, "Imported library");
        Ok(count)
    }

    pub fn export_key_mappings(&self) -> Result<String> {
        key_mappings_to_json(self.keys.mappings())
    }

    /// Import key mappings; returns how many were applied.
    pub fn import_key_mappings(&mut self, json: &str) -> Result<usize> {
        let entries = parse_key_mappings(json)?;
        let count = entries.len();
        for entry in entries {
            self.keys.set_mapping(&entry.motion, entry.key_config);
        }
        info!(count, "Imported key mappings");
        Ok(count)
    }
}

// ============================================================================
// TESTS
// ============================================================================
