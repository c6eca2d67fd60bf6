//! Conversion between the manifest convention (Y-up) and the host convention
//! (Z-up). Both are right-handed; the host basis is the manifest basis rotated
//! a quarter turn about X:
//!
//! ```text
//! host.x =  manifest.x
//! host.y =  manifest.z
//! host.z = -manifest.y
//! ```
//!
//! Positions and rotation axes go through that mapping, scale factors are only
//! permuted. Everything is done by swizzling components so that a round trip is
//! exact for values that never touch trigonometry.

use glam::{DMat4, DQuat, DVec3};

use crate::math::transform::{HostTransform, Transform3D};

/// Reported when a rotation handed to the converter was not unit length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationWarning {
    /// Length of the quaternion before it was normalized.
    pub length: f64,
}

pub const DEFAULT_NORMALIZATION_TOLERANCE: f64 = 1e-9;

pub fn position_to_host(v: DVec3) -> DVec3 {
    DVec3::new(v.x, v.z, -v.y)
}

pub fn position_to_manifest(v: DVec3) -> DVec3 {
    DVec3::new(v.x, -v.z, v.y)
}

/// Conjugating by the basis change maps the rotation axis like a position.
pub fn rotation_to_host(q: DQuat) -> DQuat {
    DQuat::from_xyzw(q.x, q.z, -q.y, q.w)
}

pub fn rotation_to_manifest(q: DQuat) -> DQuat {
    DQuat::from_xyzw(q.x, -q.z, q.y, q.w)
}

pub fn scale_to_host(s: DVec3) -> DVec3 {
    DVec3::new(s.x, s.z, s.y)
}

pub fn scale_to_manifest(s: DVec3) -> DVec3 {
    DVec3::new(s.x, s.z, s.y)
}

/// Basis change as a matrix, for converting composed world matrices.
pub fn manifest_to_host_matrix() -> DMat4 {
    DMat4::from_cols_array(&[
        1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, -1.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ])
}

pub fn matrix_to_host(m: DMat4) -> DMat4 {
    let basis = manifest_to_host_matrix();
    basis * m * basis.transpose()
}

pub fn matrix_to_manifest(m: DMat4) -> DMat4 {
    let basis = manifest_to_host_matrix();
    basis.transpose() * m * basis
}

pub fn to_host_space(t: &Transform3D) -> (HostTransform, Option<NormalizationWarning>) {
    to_host_space_with_tolerance(t, DEFAULT_NORMALIZATION_TOLERANCE)
}

pub fn to_manifest_space(h: &HostTransform) -> (Transform3D, Option<NormalizationWarning>) {
    to_manifest_space_with_tolerance(h, DEFAULT_NORMALIZATION_TOLERANCE)
}

pub fn to_host_space_with_tolerance(
    t: &Transform3D,
    tolerance: f64,
) -> (HostTransform, Option<NormalizationWarning>) {
    let (rotation, warning) = normalize_rotation(t.rotation, tolerance);
    let host = HostTransform::new(
        position_to_host(t.translation),
        rotation_to_host(rotation),
        scale_to_host(t.scale),
    );
    (host, warning)
}

pub fn to_manifest_space_with_tolerance(
    h: &HostTransform,
    tolerance: f64,
) -> (Transform3D, Option<NormalizationWarning>) {
    let (rotation, warning) = normalize_rotation(h.rotation, tolerance);
    let manifest = Transform3D::new(
        position_to_manifest(h.translation),
        rotation_to_manifest(rotation),
        scale_to_manifest(h.scale),
    );
    (manifest, warning)
}

/// Normalizes `q` if it drifted further than `tolerance` from unit length.
/// A degenerate quaternion can't be normalized and falls back to identity.
pub fn normalize_rotation(q: DQuat, tolerance: f64) -> (DQuat, Option<NormalizationWarning>) {
    let length = q.length();
    if (length - 1.0).abs() <= tolerance {
        return (q, None);
    }

    let warning = NormalizationWarning { length };
    log::warn!("rotation of length {length} normalized during coordinate conversion");

    if !length.is_finite() || length < f64::EPSILON {
        (DQuat::IDENTITY, Some(warning))
    } else {
        (q / length, Some(warning))
    }
}
