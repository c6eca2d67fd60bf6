use glam::{DMat4, DQuat, DVec3};
use std::cell::{Cell, Ref, RefCell};

use crate::math::HostTransform;

#[derive(Debug, Clone)]
pub struct Transform {
    translation: DVec3,
    rotation: DQuat,
    scale: DVec3,

    local_matrix: RefCell<DMat4>,
    world_matrix: RefCell<DMat4>,
    local_dirty: Cell<bool>,
    world_dirty: Cell<bool>,
    has_changed_since_last_update: Cell<bool>,
}

impl Transform {
    pub fn from_translation(translation: DVec3) -> Self {
        Self::new(translation, DQuat::IDENTITY, DVec3::ONE)
    }

    pub fn new(translation: DVec3, rotation: DQuat, scale: DVec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
            local_matrix: RefCell::new(DMat4::IDENTITY),
            world_matrix: RefCell::new(DMat4::IDENTITY),
            local_dirty: Cell::new(true),
            world_dirty: Cell::new(true),
            has_changed_since_last_update: Cell::new(true),
        }
    }

    pub fn from_host(transform: &HostTransform) -> Self {
        Self::new(transform.translation, transform.rotation, transform.scale)
    }

    pub fn to_host(&self) -> HostTransform {
        HostTransform::new(self.translation, self.rotation, self.scale)
    }

    pub fn get_local_matrix(&self) -> Ref<DMat4> {
        if self.local_dirty.get() {
            let matrix = DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);

            self.local_matrix.replace(matrix);
            self.local_dirty.set(false);
            self.invalidate_world();
        }

        self.local_matrix.borrow()
    }

    pub fn get_world_matrix(&self) -> Ref<DMat4> {
        self.world_matrix.borrow()
    }

    /// World matrices follow from the parent chain, so setting one is not an
    /// edit of this transform.
    pub fn set_world_matrix(&self, world_matrix: DMat4) {
        self.world_matrix.replace(world_matrix);
        self.world_dirty.set(false);
    }

    pub fn invalidate_local(&self) {
        self.local_dirty.set(true);
        self.world_dirty.set(true);
        self.has_changed_since_last_update.set(true);
    }

    pub fn invalidate_world(&self) {
        self.world_dirty.set(true);
    }

    pub fn is_world_dirty(&self) -> bool {
        self.world_dirty.get()
    }

    pub fn set_rotation(&mut self, rotation: DQuat) {
        self.rotation = rotation;
        self.invalidate_local();
    }

    pub fn set_translation(&mut self, translation: DVec3) {
        self.translation = translation;
        self.invalidate_local();
    }

    pub fn set_scale(&mut self, scale: DVec3) {
        self.scale = scale;
        self.invalidate_local();
    }

    pub fn translate(&mut self, delta: DVec3) {
        self.translation += delta;
        self.invalidate_local();
    }

    pub fn set_transform(&mut self, translation: DVec3, rotation: DQuat, scale: DVec3) {
        self.translation = translation;
        self.rotation = rotation;
        self.scale = scale;
        self.invalidate_local();
    }

    pub fn translation(&self) -> DVec3 {
        self.translation
    }

    pub fn rotation(&self) -> DQuat {
        self.rotation
    }

    pub fn scale(&self) -> DVec3 {
        self.scale
    }

    pub fn reset_flags(&self) {
        self.has_changed_since_last_update.set(false);
    }

    pub fn has_changed(&self) -> bool {
        self.has_changed_since_last_update.get()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_translation(DVec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_matrix_is_cached_until_invalidated() {
        let mut transform = Transform::from_translation(DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.get_local_matrix().w_axis.truncate(), DVec3::new(1.0, 2.0, 3.0));

        transform.set_scale(DVec3::new(2.0, 1.0, 1.0));
        assert!(transform.is_world_dirty());
        assert_eq!(transform.get_local_matrix().x_axis.truncate(), DVec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn edits_are_tracked_until_reset() {
        let mut transform = Transform::default();
        assert!(transform.has_changed());
        transform.reset_flags();

        transform.set_world_matrix(DMat4::from_translation(DVec3::X));
        assert!(!transform.has_changed());

        transform.translate(DVec3::Y);
        assert!(transform.has_changed());
        assert_eq!(transform.to_host().translation, DVec3::Y);
    }
}
