use std::fmt;
use std::marker::PhantomData;

use glam::{DMat4, DQuat, DVec3, EulerRot};

/// Marker for values expressed in the manifest convention (Y-up, right-handed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManifestSpace;

/// Marker for values expressed in the host convention (Z-up, right-handed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostSpace;

/// Translation, rotation and per-axis scale, tagged with the coordinate
/// convention they are expressed in so the two spaces can't be mixed up.
///
/// Values are never patched in place by the transcoder; every conversion or
/// composition produces a new value.
#[derive(Clone, Copy, PartialEq)]
pub struct Trs<S> {
    pub translation: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
    space: PhantomData<S>,
}

/// A transform in manifest space, relative to the parent node or scene root.
pub type Transform3D = Trs<ManifestSpace>;

/// A transform in host space, relative to the host parent node.
pub type HostTransform = Trs<HostSpace>;

impl<S> Trs<S> {
    pub const IDENTITY: Self = Self {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
        scale: DVec3::ONE,
        space: PhantomData,
    };

    pub fn new(translation: DVec3, rotation: DQuat, scale: DVec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
            space: PhantomData,
        }
    }

    pub fn from_translation(translation: DVec3) -> Self {
        Self::new(translation, DQuat::IDENTITY, DVec3::ONE)
    }

    pub fn with_translation(self, translation: DVec3) -> Self {
        Self::new(translation, self.rotation, self.scale)
    }

    pub fn with_rotation(self, rotation: DQuat) -> Self {
        Self::new(self.translation, rotation, self.scale)
    }

    pub fn with_scale(self, scale: DVec3) -> Self {
        Self::new(self.translation, self.rotation, scale)
    }

    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Decomposes an affine matrix. Shear is not representable and is dropped.
    pub fn from_matrix(matrix: DMat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self::new(translation, rotation, scale)
    }

    /// Returns `child` expressed in the frame that `self` is expressed in.
    pub fn then(&self, child: &Self) -> Self {
        Self::from_matrix(self.to_matrix() * child.to_matrix())
    }

    /// Re-expresses a world matrix relative to `parent_world`.
    pub fn relative_to(world: DMat4, parent_world: DMat4) -> Self {
        Self::from_matrix(parent_world.inverse() * world)
    }

    /// Rewrites negative scale factors as positive ones. Two negative
    /// factors are a half turn about the third axis and move into the
    /// rotation. A single leftover negative factor is a mirror, which no
    /// rotation expresses: it is dropped and the flag is set.
    ///
    /// Returns `None` when a factor is zero or not finite.
    pub fn fold_negative_scale(&self) -> Option<(Self, bool)> {
        let scale = self.scale;
        if !scale.is_finite() || scale.abs().min_element() == 0.0 {
            return None;
        }

        let mut negative: Vec<usize> = (0..3).filter(|&axis| scale[axis] < 0.0).collect();
        let mut rotation = self.rotation;
        while negative.len() >= 2 {
            let (a, b) = (negative[0], negative[1]);
            negative.drain(..2);
            rotation *= DQuat::from_axis_angle(DVec3::AXES[3 - a - b], std::f64::consts::PI);
        }

        let folded = Self::new(self.translation, rotation.normalize(), scale.abs());
        Some((folded, !negative.is_empty()))
    }

    /// Component-wise comparison within `epsilon`. Rotations compare as
    /// orientations, so `q` and `-q` are equal.
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.translation.abs_diff_eq(other.translation, epsilon)
            && self.scale.abs_diff_eq(other.scale, epsilon)
            && (1.0 - self.rotation.dot(other.rotation).abs()) <= epsilon
    }
}

impl<S> Default for Trs<S> {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl<S> fmt::Debug for Trs<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trs")
            .field("translation", &self.translation)
            .field("rotation", &self.rotation)
            .field("scale", &self.scale)
            .finish()
    }
}

pub fn is_identity_rotation(rotation: DQuat) -> bool {
    rotation == DQuat::IDENTITY || rotation == -DQuat::IDENTITY
}

/// Rotation from Euler angles in degrees, applied about the fixed x, then y,
/// then z axes.
pub fn rotation_from_euler_degrees(degrees: DVec3) -> DQuat {
    DQuat::from_euler(
        EulerRot::ZYX,
        degrees.z.to_radians(),
        degrees.y.to_radians(),
        degrees.x.to_radians(),
    )
}

pub fn rotation_to_euler_degrees(rotation: DQuat) -> DVec3 {
    let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
    DVec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

/// World rotation for an object at `eye` whose forward axis (-Z, +Y up) faces
/// `target`. Returns `None` when the two points coincide.
pub fn look_rotation(eye: DVec3, target: DVec3) -> Option<DQuat> {
    let direction = target - eye;
    if direction.length_squared() < 1e-12 {
        return None;
    }

    // Looking straight up or down needs another reference axis.
    let up = if direction.normalize().cross(DVec3::Y).length_squared() < 1e-12 {
        DVec3::Z
    } else {
        DVec3::Y
    };

    let view = DMat4::look_at_rh(eye, target, up);
    Some(DQuat::from_mat4(&view.inverse()).normalize())
}
