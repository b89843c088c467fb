//! Named store of reference motions and their feature importance.
//!
//! Each record owns its raw sequence, metrics, relative motion and the
//! per-feature importance used when scoring against it. Records are kept in
//! recording order; re-recording a name replaces the record in place.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{MotionError, Result};
use crate::features::relative_motion;
use crate::metrics::motion_metrics;
use crate::types::{
    normalize_timestamps, FeatureKey, ImportanceMap, MotionMetrics, RawSample, RelativeFrame,
};

/// Importance returned for a feature with no stored value.
pub const DEFAULT_IMPORTANCE: f64 = 1.0;

/// Importance given by auto-suggest to a key it has no activity for.
const UNRATED_SUGGESTION: f64 = 0.5;

/// A stored reference motion.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionRecord {
    pub name: String,
    /// Raw samples, first timestamp at 0.
    pub sequence: Vec<RawSample>,
    pub metrics: MotionMetrics,
    /// One feature frame per raw sample.
    pub relative_motion: Vec<RelativeFrame>,
    pub importance: ImportanceMap,
}

impl MotionRecord {
    /// Build a record from a captured sequence.
    ///
    /// Timestamps are normalized so the first frame sits at 0, features and
    /// metrics are derived, and importance is initialized to the defaults.
    pub fn from_sequence(name: impl Into<String>, mut sequence: Vec<RawSample>) -> Result<Self> {
        let name = name.into();
        if sequence.is_empty() {
            return Err(MotionError::ImportFormat(format!(
                "motion '{}' has an empty sequence",
                name
            )));
        }

        normalize_timestamps(&mut sequence);
        let relative_motion = relative_motion(&sequence);
        let metrics = motion_metrics(&sequence);

        let mut record = Self {
            name,
            sequence,
            metrics,
            relative_motion,
            importance: ImportanceMap::new(),
        };
        record.importance = record.default_importance();
        Ok(record)
    }

    /// Recorded duration in milliseconds.
    pub fn duration(&self) -> f64 {
        self.metrics.duration
    }

    /// Angle keys of the first frame carrying angles, then distance keys of
    /// the first frame carrying distances.
    pub fn importance_keys(&self) -> Vec<FeatureKey> {
        let mut keys: Vec<FeatureKey> = Vec::new();

        if let Some(frame) = self.relative_motion.iter().find(|f| !f.joint_angles.is_empty()) {
            keys.extend(frame.joint_angles.keys().map(|&k| FeatureKey::from(k)));
        }
        if let Some(frame) = self.relative_motion.iter().find(|f| !f.joint_distances.is_empty()) {
            keys.extend(frame.joint_distances.keys().map(|&k| FeatureKey::from(k)));
        }

        let mut seen = std::collections::BTreeSet::new();
        keys.retain(|k| seen.insert(*k));
        keys
    }

    /// Importance 1.0 for every key of [`Self::importance_keys`].
    pub fn default_importance(&self) -> ImportanceMap {
        self.importance_keys()
            .into_iter()
            .map(|key| (key, DEFAULT_IMPORTANCE))
            .collect()
    }

    /// Per-key activity: summed |angle change| and summed scaled |distance
    /// change| over frames `1..`. Every key seen in any frame gets an entry.
    pub fn feature_activity(&self, distance_scale: f64) -> ImportanceMap {
        let mut activity = ImportanceMap::new();

        for frame in &self.relative_motion {
            for &key in frame.joint_angles.keys() {
                activity.entry(key.into()).or_insert(0.0);
            }
            for &key in frame.joint_distances.keys() {
                activity.entry(key.into()).or_insert(0.0);
            }
        }

        for frame in self.relative_motion.iter().skip(1) {
            if let Some(changes) = &frame.angle_changes {
                for (&key, change) in changes {
                    *activity.entry(key.into()).or_insert(0.0) += change.abs();
                }
            }
            if let Some(changes) = &frame.distance_changes {
                for (&key, change) in changes {
                    *activity.entry(key.into()).or_insert(0.0) += change.abs() * distance_scale;
                }
            }
        }

        activity
    }

    /// Suggested importance: more active features weigh more.
    ///
    /// Activity is normalized into `[0.1, 1.0]`, spread through a sigmoid
    /// centered at 0.5 and clamped back into `[0.1, 1.0]`.
    pub fn suggest_importance(&self, distance_scale: f64) -> ImportanceMap {
        let activity = self.feature_activity(distance_scale);
        let max_activity = activity.values().copied().fold(0.001_f64, f64::max);

        self.importance_keys()
            .into_iter()
            .map(|key| {
                let value = match activity.get(&key) {
                    Some(&a) => {
                        let normalized = 0.1 + (a / max_activity) * 0.9;
                        let spread = 1.0 / (1.0 + (-5.0 * (normalized - 0.5)).exp());
                        spread.clamp(0.1, 1.0)
                    }
                    None => UNRATED_SUGGESTION,
                };
                (key, value)
            })
            .collect()
    }
}

/// Insertion-ordered library of reference motions.
#[derive(Debug, Clone, Default)]
pub struct MotionLibrary {
    motions: IndexMap<String, MotionRecord>,
}

impl MotionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.motions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.motions.contains_key(name)
    }

    /// Motion names in recording order.
    pub fn names(&self) -> Vec<String> {
        self.motions.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&MotionRecord> {
        self.motions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MotionRecord> {
        self.motions.values()
    }

    /// Store a record. An existing record with the same name is replaced
    /// and keeps its position.
    pub fn insert(&mut self, record: MotionRecord) -> Option<MotionRecord> {
        let replaced = self.motions.insert(record.name.clone(), record);
        if replaced.is_some() {
            debug!(motions = self.motions.len(), "Replaced existing motion");
        }
        replaced
    }

    /// Build a record from a captured sequence and store it.
    pub fn record(&mut self, name: &str, sequence: Vec<RawSample>) -> Result<&MotionRecord> {
        let record = MotionRecord::from_sequence(name, sequence)?;
        info!(
            motion = name,
            frames = record.sequence.len(),
            duration_ms = record.metrics.duration,
            max_displacement = record.metrics.max_displacement,
            "Saved motion"
        );
        self.insert(record);
        self.motions
            .get(name)
            .ok_or_else(|| MotionError::UnknownMotion(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<MotionRecord> {
        let removed = self.motions.shift_remove(name);
        if removed.is_some() {
            info!(motion = name, "Removed motion");
        }
        removed
    }

    // ========================================================================
    // IMPORTANCE
    // ========================================================================

    /// Stored importance, or 1.0 when the motion or key has none.
    pub fn get_importance(&self, name: &str, key: FeatureKey) -> f64 {
        self.motions
            .get(name)
            .and_then(|record| record.importance.get(&key).copied())
            .unwrap_or(DEFAULT_IMPORTANCE)
    }

    /// Store an importance value clamped into `[0, 1]` and return it.
    pub fn set_importance(&mut self, name: &str, key: FeatureKey, value: f64) -> Result<f64> {
        let record = self.record_mut(name)?;
        let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        record.importance.insert(key, clamped);
        debug!(motion = name, feature = %key, value = clamped, "Set feature importance");
        Ok(clamped)
    }

    /// Reset a motion's importance to 1.0 for every known key.
    pub fn initialize_default_importance(&mut self, name: &str) -> Result<ImportanceMap> {
        let record = self.record_mut(name)?;
        record.importance = record.default_importance();
        Ok(record.importance.clone())
    }

    pub fn importance(&self, name: &str) -> Result<&ImportanceMap> {
        self.motions
            .get(name)
            .map(|record| &record.importance)
            .ok_or_else(|| MotionError::UnknownMotion(name.to_string()))
    }

    /// Feature keys a motion's importance can be set for. Empty for an
    /// unknown motion.
    pub fn importance_keys(&self, name: &str) -> Vec<FeatureKey> {
        self.motions
            .get(name)
            .map(MotionRecord::importance_keys)
            .unwrap_or_default()
    }

    pub fn suggest_importance(&self, name: &str, distance_scale: f64) -> Result<ImportanceMap> {
        self.motions
            .get(name)
            .map(|record| record.suggest_importance(distance_scale))
            .ok_or_else(|| MotionError::UnknownMotion(name.to_string()))
    }

    /// Replace a motion's importance with the auto-suggested values.
    pub fn apply_suggested_importance(&mut self, name: &str, distance_scale: f64) -> Result<ImportanceMap> {
        let record = self.record_mut(name)?;
        record.importance = record.suggest_importance(distance_scale);
        info!(motion = name, features = record.importance.len(), "Applied suggested importance");
        Ok(record.importance.clone())
    }

    fn record_mut(&mut self, name: &str) -> Result<&mut MotionRecord> {
        self.motions
            .get_mut(name)
            .ok_or_else(|| MotionError::UnknownMotion(name.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
