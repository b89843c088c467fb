//! Core data types for the gesture matching engine.
//!
//! This module defines the fundamental types shared by feature extraction,
//! matching and the motion library. Raw input is a pose of 33 normalized
//! landmarks plus controller button state; everything downstream works on
//! the relative (angle / distance) representation.
//!
//! Design principle: if a concept exists, it gets a type. Feature keys are a
//! closed enumeration with stable string ids, never free-form strings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MotionError;

// ============================================================================
// LANDMARK INDICES (33-point body pose)
// ============================================================================

/// Number of landmarks delivered by the pose source per frame.
pub const POSE_LANDMARK_COUNT: usize = 33;

pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;
pub const LEFT_KNEE: usize = 25;
pub const RIGHT_KNEE: usize = 26;
pub const LEFT_ANKLE: usize = 27;
pub const RIGHT_ANKLE: usize = 28;

/// Joints tracked for displacement metrics. Every angle and distance feature
/// is built from a subset of these.
pub const KEY_JOINTS: [usize; 12] = [
    LEFT_SHOULDER,
    RIGHT_SHOULDER,
    LEFT_ELBOW,
    RIGHT_ELBOW,
    LEFT_WRIST,
    RIGHT_WRIST,
    LEFT_HIP,
    RIGHT_HIP,
    LEFT_KNEE,
    RIGHT_KNEE,
    LEFT_ANKLE,
    RIGHT_ANKLE,
];

/// Minimum landmark count for a pose to be usable (highest key joint + 1).
pub const REQUIRED_LANDMARK_COUNT: usize = RIGHT_ANKLE + 1;

// ============================================================================
// GEOMETRY
// ============================================================================

/// A plain 3D vector in the pose's normalized, unit-less coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Euclidean length, without intermediate overflow.
    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y).hypot(self.z)
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Vec3) -> f64 {
        (*other - *self).magnitude()
    }

    pub fn midpoint(&self, other: &Vec3) -> Vec3 {
        Vec3::new(
            (self.x + other.x) / 2.0,
            (self.y + other.y) / 2.0,
            (self.z + other.z) / 2.0,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

// ============================================================================
// RAW INPUT TYPES
// ============================================================================

fn default_visibility() -> f64 {
    1.0
}

/// A single landmark as delivered by the pose source.
///
/// `z` defaults to 0 and `visibility` to 1.0 when the source omits them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointSample {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default = "default_visibility")]
    pub visibility: f64,
}

impl JointSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            visibility: 1.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl Default for JointSample {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// One frame of body landmarks, always exactly [`POSE_LANDMARK_COUNT`] long.
///
/// Construction validates that every key joint is present and finite; a
/// short source array is padded with default samples past the key joints.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    joints: Vec<JointSample>,
}

impl Pose {
    /// Build a pose from a landmark slice.
    ///
    /// Fails with [`MotionError::MalformedFrame`] when the slice is too short
    /// to contain every key joint, or [`MotionError::NonFiniteJoint`] when a
    /// key joint carries NaN or infinite coordinates.
    pub fn from_slice(samples: &[JointSample]) -> Result<Self, MotionError> {
        if samples.len() < REQUIRED_LANDMARK_COUNT {
            return Err(MotionError::MalformedFrame {
                expected: REQUIRED_LANDMARK_COUNT,
                got: samples.len(),
            });
        }

        for &index in KEY_JOINTS.iter() {
            if !samples[index].position().is_finite() {
                return Err(MotionError::NonFiniteJoint { index });
            }
        }

        let mut joints: Vec<JointSample> = samples
            .iter()
            .take(POSE_LANDMARK_COUNT)
            .copied()
            .collect();
        joints.resize(POSE_LANDMARK_COUNT, JointSample::default());

        Ok(Self { joints })
    }

    /// Position of the landmark at `index`.
    ///
    /// Indices are always in range for the key joints; out-of-range indices
    /// read as the origin.
    pub fn position(&self, index: usize) -> Vec3 {
        self.joints
            .get(index)
            .map(JointSample::position)
            .unwrap_or_default()
    }

    pub fn joints(&self) -> &[JointSample] {
        &self.joints
    }
}

impl TryFrom<Vec<JointSample>> for Pose {
    type Error = MotionError;

    fn try_from(samples: Vec<JointSample>) -> Result<Self, Self::Error> {
        Pose::from_slice(&samples)
    }
}

impl Serialize for Pose {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.joints.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Pose {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let samples = Vec::<JointSample>::deserialize(deserializer)?;
        Pose::from_slice(&samples).map_err(serde::de::Error::custom)
    }
}

fn clamp_button(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Button values of the left-hand controller, each normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeftButtons {
    pub trigger: f64,
    pub grip: f64,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
}

/// Button values of the right-hand controller, each normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RightButtons {
    pub trigger: f64,
    pub grip: f64,
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeftController {
    pub buttons: LeftButtons,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RightController {
    pub buttons: RightButtons,
}

/// Handheld controller state for one tick. Either hand may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerState {
    pub left_controller: Option<LeftController>,
    pub right_controller: Option<RightController>,
}

impl ControllerState {
    /// Controller state with only the left trigger set.
    pub fn with_left_trigger(value: f64) -> Self {
        Self {
            left_controller: Some(LeftController {
                buttons: LeftButtons {
                    trigger: value,
                    ..LeftButtons::default()
                },
            }),
            right_controller: None,
        }
    }

    /// Left trigger value, 0 when the left controller is absent.
    pub fn left_trigger(&self) -> f64 {
        self.left_controller
            .map(|c| clamp_button(c.buttons.trigger))
            .unwrap_or(0.0)
    }

    /// Copy with every button clamped into [0, 1].
    pub fn normalized(&self) -> Self {
        Self {
            left_controller: self.left_controller.map(|c| LeftController {
                buttons: LeftButtons {
                    trigger: clamp_button(c.buttons.trigger),
                    grip: clamp_button(c.buttons.grip),
                    x: clamp_button(c.buttons.x),
                    y: clamp_button(c.buttons.y),
                },
            }),
            right_controller: self.right_controller.map(|c| RightController {
                buttons: RightButtons {
                    trigger: clamp_button(c.buttons.trigger),
                    grip: clamp_button(c.buttons.grip),
                    a: clamp_button(c.buttons.a),
                    b: clamp_button(c.buttons.b),
                },
            }),
        }
    }
}

/// A captured frame: pose, controller state and capture timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Milliseconds; relative to the first frame once stored in a sequence.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    pub pose: Pose,
    #[serde(default, rename = "controller")]
    pub controller: Option<ControllerState>,
}

impl RawSample {
    pub fn new(timestamp_ms: u64, pose: Pose) -> Self {
        Self {
            timestamp_ms,
            pose,
            controller: None,
        }
    }
}

/// Shift timestamps so the first sample sits at 0.
pub fn normalize_timestamps(samples: &mut [RawSample]) {
    let Some(start) = samples.first().map(|s| s.timestamp_ms) else {
        return;
    };
    for sample in samples.iter_mut() {
        sample.timestamp_ms = sample.timestamp_ms.saturating_sub(start);
    }
}

// ============================================================================
// FEATURE KEYS
// ============================================================================

/// The nine joint angles tracked per frame.
///
/// Each angle is measured between two joint vectors `(a→b)` and `(c→d)`.
/// Declaration order is the canonical iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AngleKey {
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    Torso,
}

impl AngleKey {
    pub const ALL: [AngleKey; 9] = [
        AngleKey::LeftHip,
        AngleKey::RightHip,
        AngleKey::LeftKnee,
        AngleKey::RightKnee,
        AngleKey::LeftShoulder,
        AngleKey::RightShoulder,
        AngleKey::LeftElbow,
        AngleKey::RightElbow,
        AngleKey::Torso,
    ];

    /// Joint indices `[a, b, c, d]` of the two vectors `a→b` and `c→d`.
    pub fn joints(&self) -> [usize; 4] {
        match self {
            AngleKey::LeftHip => [LEFT_HIP, RIGHT_HIP, LEFT_HIP, LEFT_KNEE],
            AngleKey::RightHip => [RIGHT_HIP, LEFT_HIP, RIGHT_HIP, RIGHT_KNEE],
            AngleKey::LeftKnee => [LEFT_HIP, LEFT_KNEE, LEFT_KNEE, LEFT_ANKLE],
            AngleKey::RightKnee => [RIGHT_HIP, RIGHT_KNEE, RIGHT_KNEE, RIGHT_ANKLE],
            AngleKey::LeftShoulder => [LEFT_SHOULDER, RIGHT_SHOULDER, LEFT_SHOULDER, LEFT_ELBOW],
            AngleKey::RightShoulder => [RIGHT_SHOULDER, LEFT_SHOULDER, RIGHT_SHOULDER, RIGHT_ELBOW],
            AngleKey::LeftElbow => [LEFT_SHOULDER, LEFT_ELBOW, LEFT_ELBOW, LEFT_WRIST],
            AngleKey::RightElbow => [RIGHT_SHOULDER, RIGHT_ELBOW, RIGHT_ELBOW, RIGHT_WRIST],
            AngleKey::Torso => [LEFT_SHOULDER, RIGHT_SHOULDER, LEFT_HIP, RIGHT_HIP],
        }
    }

    /// Stable persisted id, e.g. `angle_23_24_23_25`.
    pub fn id(&self) -> &'static str {
        match self {
            AngleKey::LeftHip => "angle_23_24_23_25",
            AngleKey::RightHip => "angle_24_23_24_26",
            AngleKey::LeftKnee => "angle_23_25_25_27",
            AngleKey::RightKnee => "angle_24_26_26_28",
            AngleKey::LeftShoulder => "angle_11_12_11_13",
            AngleKey::RightShoulder => "angle_12_11_12_14",
            AngleKey::LeftElbow => "angle_11_13_13_15",
            AngleKey::RightElbow => "angle_12_14_14_16",
            AngleKey::Torso => "angle_11_12_23_24",
        }
    }
}

/// The twelve inter-joint distances tracked per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DistanceKey {
    RightThigh,
    RightShin,
    LeftThigh,
    LeftShin,
    RightUpperArm,
    RightForearm,
    LeftUpperArm,
    LeftForearm,
    ShoulderWidth,
    HipWidth,
    LeftFlank,
    RightFlank,
}

impl DistanceKey {
    pub const ALL: [DistanceKey; 12] = [
        DistanceKey::RightThigh,
        DistanceKey::RightShin,
        DistanceKey::LeftThigh,
        DistanceKey::LeftShin,
        DistanceKey::RightUpperArm,
        DistanceKey::RightForearm,
        DistanceKey::LeftUpperArm,
        DistanceKey::LeftForearm,
        DistanceKey::ShoulderWidth,
        DistanceKey::HipWidth,
        DistanceKey::LeftFlank,
        DistanceKey::RightFlank,
    ];

    /// Joint index pair `(a, b)` the distance is measured between.
    pub fn joints(&self) -> (usize, usize) {
        match self {
            DistanceKey::RightThigh => (RIGHT_HIP, RIGHT_KNEE),
            DistanceKey::RightShin => (RIGHT_KNEE, RIGHT_ANKLE),
            DistanceKey::LeftThigh => (LEFT_HIP, LEFT_KNEE),
            DistanceKey::LeftShin => (LEFT_KNEE, LEFT_ANKLE),
            DistanceKey::RightUpperArm => (RIGHT_SHOULDER, RIGHT_ELBOW),
            DistanceKey::RightForearm => (RIGHT_ELBOW, RIGHT_WRIST),
            DistanceKey::LeftUpperArm => (LEFT_SHOULDER, LEFT_ELBOW),
            DistanceKey::LeftForearm => (LEFT_ELBOW, LEFT_WRIST),
            DistanceKey::ShoulderWidth => (LEFT_SHOULDER, RIGHT_SHOULDER),
            DistanceKey::HipWidth => (LEFT_HIP, RIGHT_HIP),
            DistanceKey::LeftFlank => (LEFT_SHOULDER, LEFT_HIP),
            DistanceKey::RightFlank => (RIGHT_SHOULDER, RIGHT_HIP),
        }
    }

    /// Stable persisted id, e.g. `dist_24_26`.
    pub fn id(&self) -> &'static str {
        match self {
            DistanceKey::RightThigh => "dist_24_26",
            DistanceKey::RightShin => "dist_26_28",
            DistanceKey::LeftThigh => "dist_23_25",
            DistanceKey::LeftShin => "dist_25_27",
            DistanceKey::RightUpperArm => "dist_12_14",
            DistanceKey::RightForearm => "dist_14_16",
            DistanceKey::LeftUpperArm => "dist_11_13",
            DistanceKey::LeftForearm => "dist_13_15",
            DistanceKey::ShoulderWidth => "dist_11_12",
            DistanceKey::HipWidth => "dist_23_24",
            DistanceKey::LeftFlank => "dist_11_23",
            DistanceKey::RightFlank => "dist_12_24",
        }
    }
}

/// Any angle or distance feature. Used to key importance weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureKey {
    Angle(AngleKey),
    Distance(DistanceKey),
}

impl FeatureKey {
    pub fn id(&self) -> &'static str {
        match self {
            FeatureKey::Angle(key) => key.id(),
            FeatureKey::Distance(key) => key.id(),
        }
    }

    /// Every known feature: angles first, then distances.
    pub fn all() -> impl Iterator<Item = FeatureKey> {
        AngleKey::ALL
            .into_iter()
            .map(FeatureKey::Angle)
            .chain(DistanceKey::ALL.into_iter().map(FeatureKey::Distance))
    }
}

impl From<AngleKey> for FeatureKey {
    fn from(key: AngleKey) -> Self {
        FeatureKey::Angle(key)
    }
}

impl From<DistanceKey> for FeatureKey {
    fn from(key: DistanceKey) -> Self {
        FeatureKey::Distance(key)
    }
}

macro_rules! string_keyed {
    ($ty:ty, $lookup:expr) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.id())
            }
        }

        impl FromStr for $ty {
            type Err = MotionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lookup: fn(&str) -> Option<$ty> = $lookup;
                lookup(s).ok_or_else(|| MotionError::UnknownFeature(s.to_string()))
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.id())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_keyed!(AngleKey, |s| AngleKey::ALL.into_iter().find(|k| k.id() == s));
string_keyed!(DistanceKey, |s| DistanceKey::ALL
    .into_iter()
    .find(|k| k.id() == s));
string_keyed!(FeatureKey, |s| FeatureKey::all().find(|k| k.id() == s));

pub type AngleMap = BTreeMap<AngleKey, f64>;
pub type DistanceMap = BTreeMap<DistanceKey, f64>;
pub type ImportanceMap = BTreeMap<FeatureKey, f64>;

// ============================================================================
// RELATIVE MOTION TYPES
// ============================================================================

/// A frame expressed as joint angles and inter-joint distances.
///
/// Frame 0 of a sequence carries no deltas; every later frame carries
/// `angle_changes` and `distance_changes` relative to its predecessor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelativeFrame {
    /// Milliseconds. Fractional after resampling.
    pub timestamp: f64,
    #[serde(default)]
    pub joint_angles: AngleMap,
    #[serde(default)]
    pub joint_distances: DistanceMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_of_mass: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_changes: Option<AngleMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_changes: Option<DistanceMap>,
}

/// Duration of a feature sequence (last timestamp minus first).
pub fn sequence_duration(frames: &[RelativeFrame]) -> f64 {
    match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => last.timestamp - first.timestamp,
        _ => 0.0,
    }
}

// ============================================================================
// MOTION METRICS
// ============================================================================

/// Summary statistics of a raw sequence, used for gating and thresholds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MotionMetrics {
    /// Milliseconds between first and last frame.
    pub duration: f64,
    /// Largest consecutive-frame displacement of any key joint.
    pub max_displacement: f64,
    /// Joint that produced `max_displacement`; `-1` in JSON when none moved.
    #[serde(with = "joint_index_sentinel")]
    pub max_joint_idx: Option<usize>,
    /// Per key joint maximum displacement, persisted as `jointN`.
    #[serde(with = "joint_key_map")]
    pub joint_displacements: BTreeMap<usize, f64>,
    pub total_frames: usize,
    /// `max_displacement` per second of duration.
    pub average_speed: f64,
}

mod joint_index_sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(index) => serializer.serialize_i64(*index as i64),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
        let raw = Option::<i64>::deserialize(deserializer)?;
        Ok(raw.and_then(|v| usize::try_from(v).ok()))
    }
}

mod joint_key_map {
    use std::collections::BTreeMap;

    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(map: &BTreeMap<usize, f64>, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (index, value) in map {
            out.serialize_entry(&format!("joint{}", index), value)?;
        }
        out.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<usize, f64>, D::Error> {
        let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| {
                key.strip_prefix("joint")
                    .and_then(|idx| idx.parse::<usize>().ok())
                    .map(|idx| (idx, value))
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid joint key: {}", key)))
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
