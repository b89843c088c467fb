//! Feature extraction: absolute landmarks to relative motion features.
//!
//! Converts one absolute pose into joint angles, inter-joint distances and a
//! hip-centered center of mass, and pairs of consecutive feature frames into
//! per-key deltas. The relative representation is what makes matching
//! independent of where the performer stands and how large they appear.
//!
//! Everything here is a pure function. The same code path produces the
//! stored reference features and the live candidate features, so results
//! must be reproducible for identical input.

use std::f64::consts::{PI, TAU};

use crate::types::{
    AngleKey, AngleMap, DistanceKey, DistanceMap, Pose, RawSample, RelativeFrame, Vec3, LEFT_HIP,
    RIGHT_HIP,
};

/// Angle in radians between two vectors, in `[0, π]`.
///
/// Returns 0 when either vector has zero length or the angle cannot be
/// computed. Both vectors are normalized first so very large coordinates do
/// not overflow the dot product.
pub fn angle_between(v1: &Vec3, v2: &Vec3) -> f64 {
    let mag1 = v1.magnitude();
    let mag2 = v2.magnitude();

    if mag1 == 0.0 || mag2 == 0.0 || !mag1.is_finite() || !mag2.is_finite() {
        return 0.0;
    }

    let u1 = Vec3::new(v1.x / mag1, v1.y / mag1, v1.z / mag1);
    let u2 = Vec3::new(v2.x / mag2, v2.y / mag2, v2.z / mag2);
    let cos_angle = u1.dot(&u2);
    if !cos_angle.is_finite() {
        return 0.0;
    }
    cos_angle.clamp(-1.0, 1.0).acos()
}

/// Signed circular difference `to - from`, normalized into `(-π, π]`.
pub fn angle_difference(from: f64, to: f64) -> f64 {
    let diff = to - from;
    if !diff.is_finite() || (diff > -PI && diff <= PI) {
        return diff;
    }
    let wrapped = (diff + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped.min(PI)
    }
}

/// The nine tracked joint angles of a pose.
pub fn joint_angles(pose: &Pose) -> AngleMap {
    AngleKey::ALL
        .iter()
        .map(|&key| {
            let [a, b, c, d] = key.joints();
            let v1 = pose.position(b) - pose.position(a);
            let v2 = pose.position(d) - pose.position(c);
            (key, angle_between(&v1, &v2))
        })
        .collect()
}

/// The twelve tracked inter-joint distances of a pose.
pub fn joint_distances(pose: &Pose) -> DistanceMap {
    DistanceKey::ALL
        .iter()
        .map(|&key| {
            let (a, b) = key.joints();
            (key, pose.position(a).distance_to(&pose.position(b)))
        })
        .collect()
}

/// Midpoint of the two hip landmarks.
pub fn center_of_mass(pose: &Pose) -> Vec3 {
    pose.position(LEFT_HIP).midpoint(&pose.position(RIGHT_HIP))
}

/// Relative features of a single pose, without deltas.
pub fn relative_frame(timestamp: f64, pose: &Pose) -> RelativeFrame {
    RelativeFrame {
        timestamp,
        joint_angles: joint_angles(pose),
        joint_distances: joint_distances(pose),
        center_of_mass: Some(center_of_mass(pose)),
        angle_changes: None,
        distance_changes: None,
    }
}

/// Circular angle deltas for every key present in both frames.
pub fn angle_deltas(prev: &AngleMap, curr: &AngleMap) -> AngleMap {
    curr.iter()
        .filter_map(|(key, &value)| {
            prev.get(key)
                .map(|&before| (*key, angle_difference(before, value)))
        })
        .collect()
}

/// Linear distance deltas for every key present in both frames.
pub fn distance_deltas(prev: &DistanceMap, curr: &DistanceMap) -> DistanceMap {
    curr.iter()
        .filter_map(|(key, &value)| prev.get(key).map(|&before| (*key, value - before)))
        .collect()
}

/// Fill in `angle_changes` / `distance_changes` for frames `1..`.
///
/// Frame 0 is left untouched.
pub fn attach_deltas(frames: &mut [RelativeFrame]) {
    for i in 1..frames.len() {
        let (head, tail) = frames.split_at_mut(i);
        let prev = &head[i - 1];
        let curr = &mut tail[0];
        curr.angle_changes = Some(angle_deltas(&prev.joint_angles, &curr.joint_angles));
        curr.distance_changes = Some(distance_deltas(&prev.joint_distances, &curr.joint_distances));
    }
}

/// Relative motion for a raw sequence: one feature frame per sample.
///
/// Output length always equals input length; every frame but the first
/// carries deltas.
pub fn relative_motion(sequence: &[RawSample]) -> Vec<RelativeFrame> {
    let mut frames: Vec<RelativeFrame> = sequence
        .iter()
        .map(|sample| relative_frame(sample.timestamp_ms as f64, &sample.pose))
        .collect();
    attach_deltas(&mut frames);
    frames
}

// ============================================================================
// TESTS
// ============================================================================
