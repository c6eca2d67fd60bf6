use std::fmt::Debug;
use std::hash::Hash;

use glam::DVec3;

use crate::manifest::NodeKind;
use crate::math::HostTransform;

/// Metadata key holding the resource id a host node was imported from.
pub const META_RESOURCE_ID: &str = "iiif_id";
/// Metadata key holding the node's annotation JSON as imported.
pub const META_ANNOTATION: &str = "iiif_annotation";
/// Scene-level metadata key holding the imported manifest JSON.
pub const META_MANIFEST: &str = "iiif_manifest";

/// The scene graph of the application transcoded nodes are materialized in.
///
/// Node ids are weak handles: a node may be deleted by the user at any time,
/// after which `node` returns `None` for its id.
pub trait SceneHost {
    type NodeId: Copy + Eq + Hash + Debug;
    /// Handle of a model asset the host has already loaded.
    type Asset: Clone + Debug;

    fn asset(&self, uri: &str) -> Option<Self::Asset>;

    fn create_node(&mut self, node: HostNode<Self::NodeId, Self::Asset>) -> Self::NodeId;
    /// Replaces a node's state in place. Returns false if the node is gone.
    fn update_node(&mut self, id: Self::NodeId, node: HostNode<Self::NodeId, Self::Asset>) -> bool;
    fn remove_node(&mut self, id: Self::NodeId) -> bool;

    /// Ids of all live nodes, in a stable order.
    fn node_ids(&self) -> Vec<Self::NodeId>;
    fn node(&self, id: Self::NodeId) -> Option<HostNode<Self::NodeId, Self::Asset>>;

    /// Whether the node's transform, parent or content changed since the
    /// last `clear_edited`.
    fn is_edited(&self, id: Self::NodeId) -> bool;
    fn clear_edited(&mut self, id: Self::NodeId);

    fn supports_metadata(&self) -> bool {
        true
    }
    fn node_metadata(&self, id: Self::NodeId, key: &str) -> Option<String>;
    /// `None` removes the key.
    fn set_node_metadata(&mut self, id: Self::NodeId, key: &str, value: Option<&str>);
    fn scene_metadata(&self, key: &str) -> Option<String>;
    fn set_scene_metadata(&mut self, key: &str, value: Option<&str>);

    /// World background colour, linear components in `0..=1`.
    fn background(&self) -> Option<DVec3>;
    fn set_background(&mut self, color: Option<DVec3>);
}

/// Snapshot of a host node as the adapter reads and writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct HostNode<Id, A> {
    pub name: String,
    pub parent: Option<Id>,
    /// Relative to `parent`, in host space.
    pub transform: HostTransform,
    pub content: HostContent<A>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostContent<A> {
    /// A grouping node with nothing attached.
    Empty,
    Mesh {
        /// URI of the asset the mesh was loaded from.
        source: String,
        asset: Option<A>,
    },
    Camera(HostCamera),
    Light(HostLight),
}

impl<A> HostContent<A> {
    /// Manifest kind this content maps to. Empty nodes have none.
    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            HostContent::Empty => None,
            HostContent::Mesh { .. } => Some(NodeKind::Model),
            HostContent::Camera(_) => Some(NodeKind::Camera),
            HostContent::Light(_) => Some(NodeKind::Light),
        }
    }

    /// Cameras and lights carry a view frame: they aim down local -Z with
    /// local +Y up.
    pub fn has_view_frame(&self) -> bool {
        matches!(self, HostContent::Camera(_) | HostContent::Light(_))
    }

    pub fn describe(&self) -> &'static str {
        match self {
            HostContent::Empty => "empty",
            HostContent::Mesh { .. } => "mesh",
            HostContent::Camera(_) => "camera",
            HostContent::Light(_) => "light",
        }
    }
}

/// A camera looking down its local -Z axis, with local +Y as up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostCamera {
    pub projection: HostProjection,
    pub clip_start: Option<f64>,
    pub clip_end: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostProjection {
    /// Vertical field of view in radians.
    Perspective { vertical_fov: Option<f64> },
    Orthographic { height: Option<f64> },
}

/// A light node. Directional and spot lights shine down local -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostLight {
    pub kind: HostLightKind,
    /// Linear RGB in `0..=1`.
    pub color: Option<DVec3>,
    pub energy: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostLightKind {
    Sun,
    Point,
    /// Full cone angle in radians.
    Spot { cone_angle: Option<f64> },
}
