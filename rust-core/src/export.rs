//! JSON persistence for motions, libraries and key mappings.
//!
//! Schemas:
//! - **Single motion**: `{sequence, metrics, relativeMotion, importance, keyMapping?}`
//! - **Library**: object keyed by motion name, each value a single motion
//! - **Key mappings**: `[{motion, keyConfig: {key, behavior}}]`
//!
//! Imports are lenient where older files are incomplete: a motion without
//! `relativeMotion` gets it recomputed, a motion without `importance` gets
//! default importance. A library import parses every entry before anything
//! is handed back, so one bad entry rejects the whole file.

use std::f64::consts::PI;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::KeyMapping;
use crate::error::{MotionError, Result};
use crate::features::relative_motion;
use crate::library::MotionRecord;
use crate::types::{normalize_timestamps, ImportanceMap, MotionMetrics, RawSample, RelativeFrame};

/// One motion as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionExport {
    pub sequence: Vec<RawSample>,
    pub metrics: MotionMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_motion: Option<Vec<RelativeFrame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<ImportanceMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_mapping: Option<KeyMapping>,
}

/// A motion ready to be stored, with its key mapping if the file had one.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMotion {
    pub record: MotionRecord,
    pub key_mapping: Option<KeyMapping>,
}

impl MotionExport {
    pub fn from_record(record: &MotionRecord, key_mapping: Option<&KeyMapping>) -> Self {
        Self {
            sequence: record.sequence.clone(),
            metrics: record.metrics.clone(),
            relative_motion: Some(record.relative_motion.clone()),
            importance: Some(record.importance.clone()),
            key_mapping: key_mapping.cloned(),
        }
    }

    /// Parse a single-motion file.
    ///
    /// Unparseable JSON is [`MotionError::Json`]; valid JSON with the wrong
    /// shape is [`MotionError::ImportFormat`].
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| MotionError::ImportFormat(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Turn the persisted form into a storable record named `name`.
    pub fn into_imported(self, name: &str) -> Result<ImportedMotion> {
        let MotionExport {
            mut sequence,
            metrics,
            relative_motion: stored_motion,
            importance,
            key_mapping,
        } = self;

        if sequence.is_empty() {
            return Err(MotionError::ImportFormat(format!(
                "motion '{}' has an empty sequence",
                name
            )));
        }
        normalize_timestamps(&mut sequence);

        let relative_motion = match stored_motion {
            Some(frames) if frames.len() == sequence.len() => {
                validate_relative_motion(name, &frames)?;
                rebase_timestamps(frames)
            }
            Some(frames) => {
                warn!(
                    motion = name,
                    frames = frames.len(),
                    samples = sequence.len(),
                    "Relative motion length mismatch, recomputing"
                );
                relative_motion(&sequence)
            }
            None => {
                debug!(motion = name, "Added relative motion to imported motion");
                relative_motion(&sequence)
            }
        };

        let mut record = MotionRecord {
            name: name.to_string(),
            sequence,
            metrics,
            relative_motion,
            importance: ImportanceMap::new(),
        };

        record.importance = match importance {
            Some(map) => map
                .into_iter()
                .map(|(key, value)| (key, if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }))
                .collect(),
            None => {
                debug!(motion = name, "Initialized default importance (none in import)");
                record.default_importance()
            }
        };

        Ok(ImportedMotion { record, key_mapping })
    }
}

/// Reject stored feature frames whose values feature extraction could not
/// have produced.
fn validate_relative_motion(name: &str, frames: &[RelativeFrame]) -> Result<()> {
    let invalid = |index: usize, feature: &dyn std::fmt::Display, value: f64| {
        MotionError::ImportFormat(format!(
            "motion '{}': relative frame {} has invalid {} value {}",
            name, index, feature, value
        ))
    };

    for (index, frame) in frames.iter().enumerate() {
        if !frame.timestamp.is_finite() {
            return Err(invalid(index, &"timestamp", frame.timestamp));
        }
        for (key, &angle) in &frame.joint_angles {
            if !(0.0..=PI).contains(&angle) {
                return Err(invalid(index, key, angle));
            }
        }
        for (key, &distance) in &frame.joint_distances {
            if !distance.is_finite() || distance < 0.0 {
                return Err(invalid(index, key, distance));
            }
        }
        for (key, &change) in frame.angle_changes.iter().flatten() {
            if !(-PI..=PI).contains(&change) {
                return Err(invalid(index, key, change));
            }
        }
        for (key, &change) in frame.distance_changes.iter().flatten() {
            if !change.is_finite() {
                return Err(invalid(index, key, change));
            }
        }
        if let Some(com) = &frame.center_of_mass {
            if !com.is_finite() {
                return Err(invalid(index, &"centerOfMass", com.magnitude()));
            }
        }
    }
    Ok(())
}

/// Shift feature frame timestamps so the first frame sits at 0.
fn rebase_timestamps(mut frames: Vec<RelativeFrame>) -> Vec<RelativeFrame> {
    if let Some(origin) = frames.first().map(|f| f.timestamp) {
        for frame in &mut frames {
            frame.timestamp -= origin;
        }
    }
    frames
}

/// A whole library as persisted, in recording order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryExport {
    pub motions: IndexMap<String, MotionExport>,
}

impl LibraryExport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate every entry. Any failure rejects the whole file.
    pub fn parse(json: &str) -> Result<Vec<ImportedMotion>> {
        let raw: IndexMap<String, serde_json::Value> = serde_json::from_str(json)?;

        let mut imported = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let motion = MotionExport::from_value(value)
                .and_then(|export| export.into_imported(&name))
                .map_err(|e| MotionError::ImportFormat(format!("motion '{}': {}", name, e)))?;
            imported.push(motion);
        }

        info!(motions = imported.len(), "Parsed library import");
        Ok(imported)
    }
}

/// One key-mapping entry as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMappingEntry {
    pub motion: String,
    pub key_config: KeyMapping,
}

/// Serialize mappings as `[{motion, keyConfig}]`.
pub fn key_mappings_to_json<'a>(mappings: impl Iterator<Item = (&'a str, &'a KeyMapping)>) -> Result<String> {
    let entries: Vec<KeyMappingEntry> = mappings
        .map(|(motion, mapping)| KeyMappingEntry {
            motion: motion.to_string(),
            key_config: mapping.clone(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

/// Parse a key-mapping file, skipping entries without a motion or key.
pub fn parse_key_mappings(json: &str) -> Result<Vec<KeyMappingEntry>> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;

    let entries: Vec<KeyMappingEntry> = raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<KeyMappingEntry>(value) {
            Ok(entry) if !entry.motion.is_empty() && !entry.key_config.key.is_empty() => Some(entry),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "Skipping key mapping entry");
                None
            }
        })
        .collect();

    Ok(entries)
}

// ============================================================================
// TESTS
// ============================================================================
