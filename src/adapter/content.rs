//! Mapping between manifest content (models, cameras, lights) and the host's
//! node content. Angles are degrees on the manifest side and radians on the
//! host side.
//!
//! Cameras and lights aim down their local -Z with +Y up in both conventions.
//! The basis change alone would turn a manifest camera's forward into host
//! -Y, so their host frames carry an extra quarter turn about X.

use std::f64::consts::FRAC_PI_2;

use glam::{DQuat, DVec3};

use crate::adapter::host::{HostCamera, HostContent, HostLight, HostLightKind, HostProjection};
use crate::manifest::{
    CameraParams, Color, Intensity, LightKind, LightParams, ModelContent, NodeContent, Projection,
};
use crate::math::HostTransform;

/// Rotation from a converted manifest view frame to the host view frame.
fn view_correction() -> DQuat {
    DQuat::from_rotation_x(-FRAC_PI_2)
}

pub fn has_view_frame(content: &NodeContent) -> bool {
    matches!(content, NodeContent::Camera(_) | NodeContent::Light(_))
}

/// Moves a converted local transform into host view frames. `parent_view`
/// and `own_view` say whether the host parent and the node itself are
/// cameras or lights.
pub fn into_view_frames(t: HostTransform, parent_view: bool, own_view: bool) -> HostTransform {
    let correction = view_correction();
    let mut t = t;
    if own_view {
        // S·C == C·S' with the y and z factors swapped.
        t = HostTransform::new(t.translation, t.rotation * correction, swap_yz(t.scale));
    }
    if parent_view {
        let inverse = correction.inverse();
        t = HostTransform::new(inverse * t.translation, inverse * t.rotation, t.scale);
    }
    t
}

/// Inverse of [`into_view_frames`], applied before converting back.
pub fn out_of_view_frames(t: HostTransform, parent_view: bool, own_view: bool) -> HostTransform {
    let correction = view_correction();
    let mut t = t;
    if parent_view {
        t = HostTransform::new(correction * t.translation, correction * t.rotation, t.scale);
    }
    if own_view {
        t = HostTransform::new(t.translation, t.rotation * correction.inverse(), swap_yz(t.scale));
    }
    t
}

fn swap_yz(v: DVec3) -> DVec3 {
    DVec3::new(v.x, v.z, v.y)
}

/// Whether the host can represent `content` at all.
pub fn is_materializable(content: &NodeContent) -> bool {
    match content {
        NodeContent::Light(light) => host_light_kind(light).is_some(),
        NodeContent::Model(_) | NodeContent::Camera(_) => true,
    }
}

/// `asset` is the host's handle for a model's URI, if it has one loaded.
pub fn to_host_content<A>(content: &NodeContent, asset: Option<A>) -> Option<HostContent<A>> {
    let content = match content {
        NodeContent::Model(model) => HostContent::Mesh {
            source: model.id.clone(),
            asset,
        },
        NodeContent::Camera(camera) => HostContent::Camera(camera_to_host(camera)),
        NodeContent::Light(light) => HostContent::Light(HostLight {
            kind: host_light_kind(light)?,
            color: light.color.map(|color| color.to_unit()),
            energy: light.intensity.as_ref().map(|intensity| intensity.value),
        }),
    };
    Some(content)
}

fn camera_to_host(camera: &CameraParams) -> HostCamera {
    let projection = match camera.projection {
        Projection::Perspective { field_of_view } => HostProjection::Perspective {
            vertical_fov: field_of_view.map(f64::to_radians),
        },
        Projection::Orthographic { view_height } => HostProjection::Orthographic { height: view_height },
    };
    HostCamera {
        projection,
        clip_start: camera.near,
        clip_end: camera.far,
    }
}

/// IIIF spot angles are measured from the axis to the edge of the cone.
fn host_light_kind(light: &LightParams) -> Option<HostLightKind> {
    match light.kind {
        LightKind::Ambient => None,
        LightKind::Directional => Some(HostLightKind::Sun),
        LightKind::Point => Some(HostLightKind::Point),
        LightKind::Spot => Some(HostLightKind::Spot {
            cone_angle: light.angle.map(|angle| (2.0 * angle).to_radians()),
        }),
    }
}

/// Re-derives manifest content from the host. Fields the host does not model
/// (formats, intensity units, resource ids) are taken from `base` when it is
/// of the same kind. `lookAt` is never carried over: the host rotation is
/// authoritative once a node was edited.
pub fn content_from_host<A>(base: Option<&NodeContent>, host: &HostContent<A>) -> Option<NodeContent> {
    let content = match host {
        HostContent::Empty => return None,
        HostContent::Mesh { source, .. } => {
            let format = match base {
                Some(NodeContent::Model(model)) if model.id == *source => model.format.clone(),
                _ => None,
            };
            NodeContent::Model(ModelContent {
                id: source.clone(),
                format,
            })
        }
        HostContent::Camera(camera) => {
            let base = match base {
                Some(NodeContent::Camera(camera)) => Some(camera),
                _ => None,
            };
            let projection = match camera.projection {
                HostProjection::Perspective { vertical_fov } => Projection::Perspective {
                    field_of_view: vertical_fov.map(f64::to_degrees),
                },
                HostProjection::Orthographic { height } => Projection::Orthographic { view_height: height },
            };
            NodeContent::Camera(CameraParams {
                id: base.and_then(|camera| camera.id.clone()),
                projection,
                near: camera.clip_start,
                far: camera.clip_end,
                look_at: None,
            })
        }
        HostContent::Light(light) => {
            let base = match base {
                Some(NodeContent::Light(light)) => Some(light),
                _ => None,
            };
            let (kind, angle) = match light.kind {
                HostLightKind::Sun => (LightKind::Directional, None),
                HostLightKind::Point => (LightKind::Point, None),
                HostLightKind::Spot { cone_angle } => {
                    (LightKind::Spot, cone_angle.map(|angle| angle.to_degrees() / 2.0))
                }
            };
            let base_intensity = base.and_then(|light| light.intensity.as_ref());
            NodeContent::Light(LightParams {
                id: base.and_then(|light| light.id.clone()),
                kind,
                color: light.color.map(Color::from_unit),
                intensity: light.energy.map(|value| Intensity {
                    value,
                    unit: base_intensity.and_then(|intensity| intensity.unit.clone()),
                    extras: base_intensity.map(|intensity| intensity.extras.clone()).unwrap_or_default(),
                }),
                angle,
                look_at: None,
            })
        }
    };
    Some(content)
}
