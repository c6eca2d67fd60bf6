use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use itertools::Itertools;

use crate::manifest::{NodeContent, SceneManifest};
use crate::scene_graph::scene::Scene;
use crate::scene_graph::scene_model::{MeshSummary, SceneModel};

/// Loads the glTF assets a manifest references and registers them with the
/// scene under their manifest URI. Only local files are read.
pub struct GltfAssetLoader {
    base_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct PreloadReport {
    pub loaded: Vec<String>,
    /// URI and reason of every asset that could not be loaded.
    pub failed: Vec<(String, String)>,
}

impl GltfAssetLoader {
    /// Relative URIs are resolved against `base_dir`, usually the directory
    /// of the manifest.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve_path(&self, uri: &str) -> anyhow::Result<PathBuf> {
        match url::Url::parse(uri) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|_| anyhow!("{uri} does not name a local file")),
            Ok(url) => bail!("{} assets are not fetched: {uri}", url.scheme()),
            Err(_) => Ok(self.base_dir.join(uri)),
        }
    }

    pub fn load_model(&self, uri: &str) -> anyhow::Result<SceneModel> {
        let path = self.resolve_path(uri)?;
        let (document, buffers, _images) =
            gltf::import(&path).with_context(|| format!("failed to import {}", path.display()))?;

        let name = document
            .scenes()
            .find_map(|scene| scene.name().map(String::from))
            .unwrap_or_else(|| file_stem(&path));
        let mut model = SceneModel::new(name, uri);

        for mesh in document.meshes() {
            let mesh_name = mesh
                .name()
                .map(String::from)
                .unwrap_or_else(|| format!("{} (Mesh {})", model.name, mesh.index()));
            let mut summary = MeshSummary {
                name: mesh_name,
                primitives: 0,
                vertices: 0,
            };

            for primitive in mesh.primitives() {
                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
                let positions = reader
                    .read_positions()
                    .with_context(|| format!("primitive without positions in {}", summary.name))?;
                summary.vertices += positions.count();
                summary.primitives += 1;
            }

            model.meshes.push(summary);
        }

        if model.meshes.is_empty() {
            bail!("{} contains no meshes", path.display());
        }

        log::debug!(
            "loaded {uri}: {} meshes, {} vertices",
            model.meshes.len(),
            model.vertex_count()
        );
        Ok(model)
    }

    /// Loads every distinct model URI of `manifest` the scene doesn't have
    /// yet. Failures are reported, not fatal: import flags the affected nodes.
    pub fn preload(&self, scene: &mut Scene, manifest: &SceneManifest) -> PreloadReport {
        let mut report = PreloadReport::default();

        let uris = manifest
            .nodes
            .iter()
            .filter_map(|node| match &node.content {
                NodeContent::Model(model) => Some(model.id.as_str()),
                _ => None,
            })
            .unique();

        for uri in uris {
            if scene.model_for_source(uri).is_some() {
                continue;
            }
            match self.load_model(uri) {
                Ok(model) => {
                    scene.add_model(model);
                    report.loaded.push(uri.to_string());
                }
                Err(err) => {
                    log::warn!("could not load {uri}: {err:#}");
                    report.failed.push((uri.to_string(), format!("{err:#}")));
                }
            }
        }

        report
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unnamed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ModelContent, NodeExtras, SceneNode};
    use crate::math::Transform3D;

    const TRIANGLE: &str = r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"name": "Triangle", "nodes": [0]}],
        "nodes": [{"mesh": 0}],
        "meshes": [{"name": "tri", "primitives": [{"attributes": {"POSITION": 0}}]}],
        "buffers": [{
            "byteLength": 36,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA"
        }],
        "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [1.0, 1.0, 0.0]
        }]
    }"#;

    fn model_node(id: &str, uri: &str) -> SceneNode {
        SceneNode {
            id: id.to_string(),
            label: None,
            motivation: Vec::new(),
            content: NodeContent::Model(ModelContent {
                id: uri.to_string(),
                format: None,
            }),
            transform: Transform3D::IDENTITY,
            parent: None,
            extras: NodeExtras::default(),
        }
    }

    #[test]
    fn resolves_relative_and_file_uris() {
        let loader = GltfAssetLoader::new("/data/manifests");
        assert_eq!(
            loader.resolve_path("models/a.glb").unwrap(),
            PathBuf::from("/data/manifests/models/a.glb")
        );
        assert!(loader.resolve_path("https://example.org/a.glb").is_err());

        let file_url = url::Url::from_file_path(std::env::temp_dir().join("a.glb")).unwrap();
        assert_eq!(
            loader.resolve_path(file_url.as_str()).unwrap(),
            std::env::temp_dir().join("a.glb")
        );
    }

    #[test]
    fn preload_loads_each_asset_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("triangle.gltf"), TRIANGLE).unwrap();

        let mut manifest = SceneManifest::scaffold("https://example.org/m", "https://example.org/s");
        manifest.nodes.push(model_node("res:a", "triangle.gltf"));
        manifest.nodes.push(model_node("res:b", "triangle.gltf"));
        manifest.nodes.push(model_node("res:c", "missing.gltf"));

        let loader = GltfAssetLoader::new(dir.path());
        let mut scene = Scene::new();
        let report = loader.preload(&mut scene, &manifest);

        assert_eq!(report.loaded, vec!["triangle.gltf".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(scene.models.len(), 1);

        let model_id = scene.model_for_source("triangle.gltf").unwrap();
        let model = &scene.models[model_id];
        assert_eq!(model.name, "Triangle");
        assert_eq!(model.meshes[0].name, "tri");
        assert_eq!(model.vertex_count(), 3);

        let again = loader.preload(&mut scene, &manifest);
        assert!(again.loaded.is_empty());
        assert_eq!(scene.models.len(), 1);
    }
}
