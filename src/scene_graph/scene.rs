use glam::{DMat4, DQuat, DVec3};
use id_arena::Arena;
use std::collections::{BTreeMap, HashMap};

use crate::adapter::host::{HostNode, SceneHost};
use crate::math::HostTransform;
use crate::scene_graph::object3d::{Object3D, ObjectContent, ObjectId};
use crate::scene_graph::scene_model::{SceneModel, SceneModelId};
use crate::scene_graph::transform::Transform;

/// In-process Z-up scene graph. Objects live in an arena; removed objects
/// leave a tombstone so stale ids resolve to nothing.
pub struct Scene {
    pub objects: Arena<Object3D>,
    pub models: Arena<SceneModel>,
    models_by_source: HashMap<String, SceneModelId>,
    background: Option<DVec3>,
    properties: BTreeMap<String, String>,
    metadata_enabled: bool,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Arena::new(),
            models: Arena::new(),
            models_by_source: HashMap::new(),
            background: None,
            properties: BTreeMap::new(),
            metadata_enabled: true,
        }
    }

    /// A scene that can't store custom properties, like hosts without a
    /// metadata facility.
    pub fn without_metadata() -> Self {
        Self {
            metadata_enabled: false,
            ..Self::new()
        }
    }

    pub fn add_object(&mut self, mut object: Object3D) -> ObjectId {
        let parent_id = object.parent_id.take();
        object.child_ids.clear();
        let object_id = self.objects.alloc(object);

        if parent_id.is_some() {
            self.set_object_parent(object_id, parent_id);
        }
        object_id
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&Object3D> {
        self.objects.get(id).filter(|object| !object.is_removed())
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Option<&mut Object3D> {
        self.objects.get_mut(id).filter(|object| !object.is_removed())
    }

    pub fn get_object_by_name(&self, name: &str) -> Option<ObjectId> {
        self.live_objects()
            .find(|(_, object)| object.name == name)
            .map(|(id, _)| id)
    }

    pub fn live_objects(&self) -> impl Iterator<Item = (ObjectId, &Object3D)> {
        self.objects.iter().filter(|(_, object)| !object.is_removed())
    }

    /// Registers a loaded model under its source URI.
    pub fn add_model(&mut self, model: SceneModel) -> SceneModelId {
        let source = model.source.clone();
        let model_id = self.models.alloc(model);
        self.models_by_source.insert(source, model_id);
        model_id
    }

    pub fn model_for_source(&self, source: &str) -> Option<SceneModelId> {
        self.models_by_source.get(source).copied()
    }

    /// Removes an object. Its children move up to its parent and keep their
    /// world placement.
    pub fn remove_object(&mut self, object_id: ObjectId) -> bool {
        let Some(object) = self.get_object(object_id) else {
            return false;
        };
        let parent_id = object.parent_id;
        let child_ids = object.child_ids.clone();

        self.update_transforms();
        let parent_world = parent_id
            .and_then(|id| self.world_matrix(id))
            .unwrap_or(DMat4::IDENTITY);

        for child_id in child_ids {
            let Some(child_world) = self.world_matrix(child_id) else {
                continue;
            };
            let local = HostTransform::relative_to(child_world, parent_world);
            self.set_object_transform(child_id, local.translation, local.rotation, local.scale);
            self.set_object_parent(child_id, parent_id);
        }

        if let Some(parent) = parent_id.and_then(|id| self.objects.get_mut(id)) {
            parent.child_ids.retain(|&id| id != object_id);
        }
        if let Some(object) = self.objects.get_mut(object_id) {
            log::debug!("removed object {}", object.name);
            object.mark_removed();
        }
        true
    }

    /// Updates all object transforms in hierarchical order
    fn update_transforms(&self) {
        let root_objects = self
            .live_objects()
            .filter_map(|(id, object)| if object.parent_id.is_none() { Some(id) } else { None });

        for root_id in root_objects {
            self.update_object_transform_recursive(root_id, DMat4::IDENTITY, false);
        }
    }

    /// Recursively updates an object's world transform and its children
    fn update_object_transform_recursive(&self, object_id: ObjectId, parent_world_matrix: DMat4, parent_updated: bool) {
        if let Some(object) = self.get_object(object_id) {
            // The local matrix has to be refreshed first, it may dirty the world matrix.
            let local_matrix = *object.transform.get_local_matrix();
            let updated = parent_updated || object.transform.is_world_dirty();
            if updated {
                object.transform.set_world_matrix(parent_world_matrix * local_matrix);
            }

            let world_matrix = *object.transform.get_world_matrix();
            for &child_id in &object.child_ids {
                self.update_object_transform_recursive(child_id, world_matrix, updated);
            }
        }
    }

    /// Invalidates world transforms for an object and all its descendants
    pub fn invalidate_object_hierarchy(&self, object_id: ObjectId) {
        if let Some(object) = self.get_object(object_id) {
            object.transform.invalidate_world();

            for &child_id in &object.child_ids {
                self.invalidate_object_hierarchy(child_id);
            }
        }
    }

    fn is_ancestor(&self, ancestor_id: ObjectId, object_id: ObjectId) -> bool {
        let mut current = self.get_object(object_id).and_then(|object| object.parent_id);
        while let Some(id) = current {
            if id == ancestor_id {
                return true;
            }
            current = self.get_object(id).and_then(|object| object.parent_id);
        }
        false
    }

    /// Sets the parent of an object and updates child relationships.
    /// Returns false if the change would create a cycle.
    pub fn set_object_parent(&mut self, child_id: ObjectId, new_parent_id: Option<ObjectId>) -> bool {
        let Some(child) = self.get_object(child_id) else {
            return false;
        };
        if child.parent_id == new_parent_id {
            return true;
        }
        if let Some(new_parent_id) = new_parent_id {
            if new_parent_id == child_id || self.is_ancestor(child_id, new_parent_id) {
                log::warn!("refusing to parent {} under its own descendant", child.name);
                return false;
            }
        }

        let old_parent_id = child.parent_id;

        // Remove from old parent's children list
        if let Some(old_parent_id) = old_parent_id {
            if let Some(old_parent) = self.objects.get_mut(old_parent_id) {
                old_parent.child_ids.retain(|&id| id != child_id);
            }
        }

        if let Some(child) = self.objects.get_mut(child_id) {
            child.parent_id = new_parent_id;
            child.mark_structure_changed();
        }
        if let Some(new_parent) = new_parent_id.and_then(|id| self.get_object_mut(id)) {
            new_parent.child_ids.push(child_id);
        }

        self.invalidate_object_hierarchy(child_id);
        true
    }

    pub fn set_object_translation(&mut self, object_id: ObjectId, translation: DVec3) {
        if let Some(object) = self.get_object_mut(object_id) {
            object.transform.set_translation(translation);
        }
        self.invalidate_object_hierarchy(object_id);
    }

    pub fn set_object_rotation(&mut self, object_id: ObjectId, rotation: DQuat) {
        if let Some(object) = self.get_object_mut(object_id) {
            object.transform.set_rotation(rotation);
        }
        self.invalidate_object_hierarchy(object_id);
    }

    pub fn set_object_transform(&mut self, object_id: ObjectId, translation: DVec3, rotation: DQuat, scale: DVec3) {
        if let Some(object) = self.get_object_mut(object_id) {
            object.transform.set_transform(translation, rotation, scale);
        }
        self.invalidate_object_hierarchy(object_id);
    }

    pub fn set_object_content(&mut self, object_id: ObjectId, content: ObjectContent) {
        if let Some(object) = self.get_object_mut(object_id) {
            object.set_content(content);
        }
    }

    pub fn world_matrix(&self, object_id: ObjectId) -> Option<DMat4> {
        self.update_transforms();
        self.get_object(object_id)
            .map(|object| *object.transform.get_world_matrix())
    }

    pub fn world_position(&self, object_id: ObjectId) -> Option<DVec3> {
        self.world_matrix(object_id).map(|matrix| matrix.w_axis.truncate())
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneHost for Scene {
    type NodeId = ObjectId;
    type Asset = SceneModelId;

    fn asset(&self, uri: &str) -> Option<SceneModelId> {
        self.model_for_source(uri)
    }

    fn create_node(&mut self, node: HostNode<ObjectId, SceneModelId>) -> ObjectId {
        let mut object = Object3D::new(node.name, node.content);
        object.transform = Transform::from_host(&node.transform);
        object.parent_id = node.parent;
        self.add_object(object)
    }

    fn update_node(&mut self, id: ObjectId, node: HostNode<ObjectId, SceneModelId>) -> bool {
        let Some(object) = self.get_object_mut(id) else {
            return false;
        };
        object.name = node.name;
        if *object.content() != node.content {
            object.set_content(node.content);
        }

        let transform = node.transform;
        self.set_object_transform(id, transform.translation, transform.rotation, transform.scale);
        self.set_object_parent(id, node.parent);
        true
    }

    fn remove_node(&mut self, id: ObjectId) -> bool {
        self.remove_object(id)
    }

    fn node_ids(&self) -> Vec<ObjectId> {
        self.live_objects().map(|(id, _)| id).collect()
    }

    fn node(&self, id: ObjectId) -> Option<HostNode<ObjectId, SceneModelId>> {
        self.get_object(id).map(|object| HostNode {
            name: object.name.clone(),
            parent: object.parent_id,
            transform: object.transform.to_host(),
            content: object.content().clone(),
        })
    }

    fn is_edited(&self, id: ObjectId) -> bool {
        self.get_object(id).is_some_and(Object3D::has_changed)
    }

    fn clear_edited(&mut self, id: ObjectId) {
        if let Some(object) = self.get_object_mut(id) {
            object.clear_changed();
        }
    }

    fn supports_metadata(&self) -> bool {
        self.metadata_enabled
    }

    fn node_metadata(&self, id: ObjectId, key: &str) -> Option<String> {
        if !self.metadata_enabled {
            return None;
        }
        self.get_object(id)
            .and_then(|object| object.properties.get(key))
            .cloned()
    }

    fn set_node_metadata(&mut self, id: ObjectId, key: &str, value: Option<&str>) {
        if !self.metadata_enabled {
            return;
        }
        if let Some(object) = self.get_object_mut(id) {
            match value {
                Some(value) => object.properties.insert(key.to_string(), value.to_string()),
                None => object.properties.remove(key),
            };
        }
    }

    fn scene_metadata(&self, key: &str) -> Option<String> {
        if !self.metadata_enabled {
            return None;
        }
        self.properties.get(key).cloned()
    }

    fn set_scene_metadata(&mut self, key: &str, value: Option<&str>) {
        if !self.metadata_enabled {
            return;
        }
        match value {
            Some(value) => self.properties.insert(key.to_string(), value.to_string()),
            None => self.properties.remove(key),
        };
    }

    fn background(&self) -> Option<DVec3> {
        self.background
    }

    fn set_background(&mut self, color: Option<DVec3>) {
        self.background = color;
    }
}
