use std::collections::{BTreeMap, HashSet};
use std::fmt;

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::manifest::color::Color;
use crate::math::Transform3D;

pub const PRESENTATION_CONTEXT: &str = "http://iiif.io/api/presentation/4/context.json";
pub const DEFAULT_RIGHTS: &str = "https://creativecommons.org/licenses/by/4.0/";
pub const PAINTING: &str = "painting";

/// Keys of a JSON object the transcoder does not interpret. They are carried
/// next to the entity they were found on and written back unchanged.
pub type Extras = serde_json::Map<String, Value>;

/// IIIF language map, e.g. `{"en": ["Astronaut"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageMap(pub BTreeMap<String, Vec<String>>);

impl LanguageMap {
    pub fn new(language: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(language.into(), vec![value.into()]);
        Self(map)
    }

    /// First value in `language`, falling back to any language.
    pub fn first(&self, language: &str) -> Option<&str> {
        self.0
            .get(language)
            .and_then(|values| values.first())
            .or_else(|| self.0.values().flat_map(|values| values.first()).next())
            .map(String::as_str)
    }
}

/// Root of a IIIF 3D document: one manifest holding the scene being transcoded.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneManifest {
    pub id: String,
    pub context: Option<Value>,
    pub label: Option<LanguageMap>,
    pub summary: Option<LanguageMap>,
    pub rights: Option<String>,
    pub scene: SceneInfo,
    /// Placed items in document order. Order is meaningful to viewers.
    pub nodes: Vec<SceneNode>,
    /// Manifest items other than the transcoded scene (further scenes,
    /// canvases), in document order.
    pub extra_items: Vec<Value>,
    /// Position of the scene among the manifest items.
    pub scene_index: usize,
    pub extras: Extras,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneInfo {
    pub id: String,
    pub label: Option<LanguageMap>,
    pub background_color: Option<Color>,
    /// The scene's `items` as written: pages, bare annotations and anything
    /// else. Nodes are referenced by id so that `SceneManifest::nodes` stays
    /// the single place they live.
    pub items: Vec<SceneItem>,
    pub extras: Extras,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneItem {
    Page(PageInfo),
    /// An annotation listed directly in the scene, without a page.
    Annotation(AnnotationSlot),
    /// Any other item, kept verbatim.
    Other(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    pub id: String,
    pub items: Vec<AnnotationSlot>,
    pub extras: Extras,
}

/// Where an annotation sits in the document.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationSlot {
    /// A node of `SceneManifest::nodes`, by id.
    Node(String),
    /// An annotation the parser could not interpret, kept verbatim.
    Unsupported(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Model,
    Camera,
    Light,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Model => "model",
            NodeKind::Camera => "camera",
            NodeKind::Light => "light",
        })
    }
}

/// One painting annotation: a model, camera or light placed in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    /// Annotation id; unique within the manifest.
    pub id: String,
    pub label: Option<LanguageMap>,
    pub motivation: Vec<String>,
    pub content: NodeContent,
    /// Relative to `parent`, or to the scene root when there is none.
    pub transform: Transform3D,
    pub parent: Option<String>,
    pub extras: NodeExtras,
}

/// Unknown keys found at each level of an annotation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeExtras {
    pub annotation: Extras,
    /// The `SpecificResource` wrapping the body, if any.
    pub body: Extras,
    /// The model, camera or light resource itself.
    pub content: Extras,
    pub target: TargetExtras,
    /// Entries of a list-valued `body` after the first, which is the one
    /// transcoded.
    pub more_bodies: Vec<Value>,
    pub more_targets: Vec<Value>,
    /// Set when the body transforms carried keys of their own.
    pub transforms: Option<WrittenTransforms>,
}

impl NodeExtras {
    pub fn is_empty(&self) -> bool {
        self.annotation.is_empty()
            && self.body.is_empty()
            && self.content.is_empty()
            && self.target.is_empty()
            && self.more_bodies.is_empty()
            && self.more_targets.is_empty()
            && self.transforms.is_none()
    }
}

/// What a target said beyond the parent and position derived from it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetExtras {
    /// Unknown keys of the `SpecificResource` wrapper.
    pub wrapper: Extras,
    /// Unknown keys of the target source.
    pub source: Extras,
    /// Unknown keys of the point selector.
    pub point: Extras,
    /// Selectors other than the point selector, in order.
    pub selectors: Vec<Value>,
    /// Index of the point selector among all selectors. Only recorded when
    /// it isn't first or selects the origin.
    pub point_index: Option<usize>,
    /// Source of a root-level target that is not written as a plain
    /// reference to the scene.
    pub root_source: Option<SourceRef>,
    /// The target was a `SpecificResource` even though it selected nothing.
    pub keep_wrapper: bool,
    /// The target was a bare id string.
    pub bare_id: bool,
}

impl TargetExtras {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// `{"id": .., "type": ..}` as written, either member possibly missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceRef {
    pub id: Option<String>,
    pub kind: Option<String>,
}

/// Body transforms as written, with the transform they produced.
///
/// The serializer writes `list` back unchanged while the node still has
/// `composed` as its transform. Once the node moves, the transforms are
/// rebuilt and each keeps the unknown keys of the first written transform of
/// its type.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenTransforms {
    pub list: Vec<Value>,
    pub composed: Transform3D,
    /// Point selector position of the target.
    pub position: DVec3,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Model(ModelContent),
    Camera(CameraParams),
    Light(LightParams),
}

impl NodeContent {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeContent::Model(_) => NodeKind::Model,
            NodeContent::Camera(_) => NodeKind::Camera,
            NodeContent::Light(_) => NodeKind::Light,
        }
    }

    pub fn look_at(&self) -> Option<&LookAt> {
        match self {
            NodeContent::Model(_) => None,
            NodeContent::Camera(camera) => camera.look_at.as_ref(),
            NodeContent::Light(light) => light.look_at.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelContent {
    /// URI of the model asset.
    pub id: String,
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraParams {
    pub id: Option<String>,
    pub projection: Projection,
    pub near: Option<f64>,
    pub far: Option<f64>,
    pub look_at: Option<LookAt>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Vertical field of view in degrees.
    Perspective { field_of_view: Option<f64> },
    Orthographic { view_height: Option<f64> },
}

impl Projection {
    pub fn iiif_type(&self) -> &'static str {
        match self {
            Projection::Perspective { .. } => "PerspectiveCamera",
            Projection::Orthographic { .. } => "OrthographicCamera",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookAt {
    /// Another annotation of the scene.
    Annotation(String),
    /// A point in scene space.
    Point(DVec3),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightParams {
    pub id: Option<String>,
    pub kind: LightKind,
    pub color: Option<Color>,
    pub intensity: Option<Intensity>,
    /// Spot cone angle in degrees.
    pub angle: Option<f64>,
    pub look_at: Option<LookAt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

impl LightKind {
    pub fn from_iiif_type(name: &str) -> Option<Self> {
        match name {
            "AmbientLight" => Some(LightKind::Ambient),
            "DirectionalLight" => Some(LightKind::Directional),
            "PointLight" => Some(LightKind::Point),
            "SpotLight" => Some(LightKind::Spot),
            _ => None,
        }
    }

    pub fn iiif_type(&self) -> &'static str {
        match self {
            LightKind::Ambient => "AmbientLight",
            LightKind::Directional => "DirectionalLight",
            LightKind::Point => "PointLight",
            LightKind::Spot => "SpotLight",
        }
    }
}

/// `{"type": "Value", "value": 0.6, "unit": "relative"}`
#[derive(Debug, Clone, PartialEq)]
pub struct Intensity {
    pub value: f64,
    pub unit: Option<String>,
    pub extras: Extras,
}

impl Intensity {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            unit: None,
            extras: Extras::new(),
        }
    }
}

impl SceneManifest {
    /// A new, empty manifest with one scene and one annotation page.
    pub fn scaffold(id: impl Into<String>, scene_id: impl Into<String>) -> Self {
        let scene_id = scene_id.into();
        Self {
            id: id.into(),
            context: Some(Value::String(PRESENTATION_CONTEXT.to_string())),
            label: Some(LanguageMap::new("none", "default-manifest-label")),
            summary: None,
            rights: Some(DEFAULT_RIGHTS.to_string()),
            scene: SceneInfo {
                items: vec![SceneItem::Page(PageInfo {
                    id: format!("{scene_id}/annotations"),
                    items: Vec::new(),
                    extras: Extras::new(),
                })],
                id: scene_id,
                label: Some(LanguageMap::new("none", "default-scene-label")),
                background_color: None,
                extras: Extras::new(),
            },
            nodes: Vec::new(),
            extra_items: Vec::new(),
            scene_index: 0,
            extras: Extras::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&SceneNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Annotations kept verbatim because they could not be parsed, in
    /// document order.
    pub fn unsupported_items(&self) -> impl Iterator<Item = &Value> + '_ {
        self.scene
            .items
            .iter()
            .flat_map(|item| match item {
                SceneItem::Page(page) => page.items.as_slice(),
                SceneItem::Annotation(slot) => std::slice::from_ref(slot),
                SceneItem::Other(_) => &[][..],
            })
            .filter_map(|slot| match slot {
                AnnotationSlot::Unsupported(value) => Some(value),
                AnnotationSlot::Node(_) => None,
            })
    }

    /// Ids of the annotations kept verbatim because they could not be parsed.
    pub fn unsupported_ids(&self) -> HashSet<&str> {
        self.unsupported_items()
            .filter_map(|item| item.get("id").and_then(Value::as_str))
            .collect()
    }

    /// Ancestors of `id`, nearest first. Stops at references that are not
    /// nodes and at cycles.
    pub fn ancestors(&self, id: &str) -> Vec<&SceneNode> {
        let mut chain: Vec<&SceneNode> = Vec::new();
        let mut current = self.node(id).and_then(|node| node.parent.as_deref());

        while let Some(parent_id) = current {
            let Some(parent) = self.node(parent_id) else {
                break;
            };
            if parent.id == id || chain.iter().any(|seen| seen.id == parent.id) {
                break;
            }
            chain.push(parent);
            current = parent.parent.as_deref();
        }

        chain
    }

    /// Scene-space matrix of a node, composing its parent chain.
    pub fn world_matrix(&self, id: &str) -> Option<DMat4> {
        let node = self.node(id)?;
        let local = node.transform.to_matrix();
        let world = self
            .ancestors(id)
            .iter()
            .fold(local, |acc, ancestor| ancestor.transform.to_matrix() * acc);
        Some(world)
    }

    pub fn world_position(&self, id: &str) -> Option<DVec3> {
        self.world_matrix(id).map(|m| m.w_axis.truncate())
    }
}

impl SceneNode {
    pub fn kind(&self) -> NodeKind {
        self.content.kind()
    }

    /// Display name for host nodes: the label if there is one, else the id.
    pub fn display_name(&self, language: &str) -> String {
        self.label
            .as_ref()
            .and_then(|label| label.first(language))
            .unwrap_or(&self.id)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DQuat;

    fn model(id: &str, parent: Option<&str>, transform: Transform3D) -> SceneNode {
        SceneNode {
            id: id.to_string(),
            label: None,
            motivation: vec![PAINTING.to_string()],
            content: NodeContent::Model(ModelContent {
                id: format!("{id}.glb"),
                format: None,
            }),
            transform,
            parent: parent.map(str::to_string),
            extras: NodeExtras::default(),
        }
    }

    #[test]
    fn world_matrix_composes_parent_chain() {
        let mut manifest = SceneManifest::scaffold("https://example.org/m", "https://example.org/s");
        manifest.nodes.push(model(
            "res:root",
            None,
            Transform3D::from_translation(DVec3::new(0.0, 1.0, 0.0)),
        ));
        manifest.nodes.push(model(
            "res:child",
            Some("res:root"),
            Transform3D::new(
                DVec3::new(2.0, 0.0, 0.0),
                DQuat::IDENTITY,
                DVec3::ONE,
            ),
        ));

        let position = manifest.world_position("res:child").unwrap();
        assert!(position.abs_diff_eq(DVec3::new(2.0, 1.0, 0.0), 1e-12));
        assert_eq!(manifest.ancestors("res:child").len(), 1);
        assert!(manifest.ancestors("res:root").is_empty());
    }

    #[test]
    fn ancestors_stop_at_cycles() {
        let mut manifest = SceneManifest::scaffold("https://example.org/m", "https://example.org/s");
        manifest.nodes.push(model("res:a", Some("res:b"), Transform3D::IDENTITY));
        manifest.nodes.push(model("res:b", Some("res:a"), Transform3D::IDENTITY));

        assert_eq!(manifest.ancestors("res:a").len(), 1);
    }

    #[test]
    fn display_name_prefers_label() {
        let mut node = model("res:x", None, Transform3D::IDENTITY);
        assert_eq!(node.display_name("en"), "res:x");
        node.label = Some(LanguageMap::new("fr", "Astronaute"));
        assert_eq!(node.display_name("en"), "Astronaute");
    }
}
