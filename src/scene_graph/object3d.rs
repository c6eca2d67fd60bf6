use std::collections::BTreeMap;

use id_arena::Id;

use crate::adapter::host::HostContent;
use crate::scene_graph::scene::Scene;
use crate::scene_graph::scene_model::SceneModelId;
use crate::scene_graph::transform::Transform;

pub type ObjectId = Id<Object3D>;

pub type ObjectContent = HostContent<SceneModelId>;

pub struct Object3D {
    pub name: String,
    pub transform: Transform,
    pub parent_id: Option<ObjectId>,
    pub child_ids: Vec<ObjectId>,
    /// Custom string properties, the place transcoding metadata is kept.
    pub properties: BTreeMap<String, String>,
    content: ObjectContent,
    structure_changed: bool,
    removed: bool,
}

impl Object3D {
    pub fn new(name: impl Into<String>, content: ObjectContent) -> Self {
        Self {
            name: name.into(),
            content,
            ..Self::default()
        }
    }

    pub fn content(&self) -> &ObjectContent {
        &self.content
    }

    pub fn parent<'a>(&self, scene: &'a Scene) -> Option<&'a Object3D> {
        self.parent_id.and_then(|id| scene.get_object(id))
    }

    pub fn children<'a, 'b>(&'a self, scene: &'b Scene) -> impl Iterator<Item = &'b Object3D> + 'b
    where
        'a: 'b,
    {
        self.child_ids.iter().filter_map(move |id| scene.get_object(*id))
    }

    /// Transform, parent or content changed since the scene last cleared the
    /// object's flags.
    pub fn has_changed(&self) -> bool {
        self.structure_changed || self.transform.has_changed()
    }

    pub(crate) fn set_content(&mut self, content: ObjectContent) {
        self.content = content;
        self.structure_changed = true;
    }

    pub(crate) fn mark_structure_changed(&mut self) {
        self.structure_changed = true;
    }

    pub(crate) fn clear_changed(&mut self) {
        self.structure_changed = false;
        self.transform.reset_flags();
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
        self.parent_id = None;
        self.child_ids.clear();
        self.properties.clear();
    }
}

impl Default for Object3D {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Transform::default(),
            parent_id: None,
            child_ids: Vec::new(),
            properties: BTreeMap::new(),
            content: HostContent::Empty,
            structure_changed: true,
            removed: false,
        }
    }
}
