use id_arena::Id;

pub type SceneModelId = Id<SceneModel>;

/// A model asset loaded into the scene, shared by every object that shows it.
#[derive(Debug, Clone)]
pub struct SceneModel {
    pub name: String,
    /// URI the asset was loaded from, as written in the manifest.
    pub source: String,
    pub meshes: Vec<MeshSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshSummary {
    pub name: String,
    pub primitives: usize,
    pub vertices: usize,
}

impl SceneModel {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            meshes: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|mesh| mesh.vertices).sum()
    }
}
