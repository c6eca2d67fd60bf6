use std::collections::HashSet;

use glam::{DMat4, DVec3};
use serde_json::{Map, Value};

use crate::error::{Diagnostic, TranscodeError};
use crate::manifest::color::Color;
use crate::manifest::json_patterns::{
    axes_named_values, force_as_list, force_as_object, force_as_singleton, split_first,
};
use crate::manifest::model::{
    AnnotationSlot, CameraParams, Extras, Intensity, LanguageMap, LightKind, LightParams, LookAt, ModelContent,
    NodeContent, NodeExtras, PageInfo, Projection, SceneInfo, SceneItem, SceneManifest, SceneNode, SourceRef,
    TargetExtras, WrittenTransforms,
};
use crate::math::transform::{is_identity_rotation, rotation_from_euler_degrees};
use crate::math::Transform3D;

type Result<T> = std::result::Result<T, TranscodeError>;

/// A manifest together with the non-fatal findings of parsing it.
#[derive(Debug, Clone)]
pub struct ParsedManifest {
    pub manifest: SceneManifest,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses a manifest, discarding diagnostics.
pub fn parse(json: &str) -> Result<SceneManifest> {
    parse_manifest(json).map(|parsed| parsed.manifest)
}

pub fn parse_manifest(json: &str) -> Result<ParsedManifest> {
    let value: Value = serde_json::from_str(json)?;
    parse_manifest_value(value)
}

pub fn parse_manifest_value(value: Value) -> Result<ParsedManifest> {
    let mut diagnostics = Vec::new();
    let mut fields = Fields::new(value, "manifest")?;

    let context = fields.take("@context");
    let id = fields.require_uri("id")?;
    if let Some(kind) = fields.take_str("type")? {
        if kind != "Manifest" {
            return Err(TranscodeError::malformed(format!(
                "document type is {kind}, expected Manifest"
            )));
        }
    }
    let label = fields.take_language_map("label")?;
    let summary = fields.take_language_map("summary")?;
    let rights = fields.take_str("rights")?;
    let items = fields.require_list("items")?;

    let mut scene_value = None;
    let mut scene_index = 0;
    let mut extra_items = Vec::new();
    for item in items {
        if scene_value.is_none() && item_type(&item) == Some("Scene") {
            scene_index = extra_items.len();
            scene_value = Some(item);
        } else {
            if item_type(&item) == Some("Scene") {
                diagnostics.push(Diagnostic::unsupported(
                    item.get("id").and_then(Value::as_str),
                    "only the first scene of a manifest is transcoded",
                ));
            }
            extra_items.push(item);
        }
    }

    let scene_value =
        scene_value.ok_or_else(|| TranscodeError::malformed(format!("manifest {id} contains no Scene")))?;
    let (scene, nodes) = parse_scene(scene_value, &mut diagnostics)?;

    let manifest = SceneManifest {
        id,
        context,
        label,
        summary,
        rights,
        scene,
        nodes,
        extra_items,
        scene_index,
        extras: fields.into_extras(),
    };

    for diagnostic in &diagnostics {
        diagnostic.log();
    }
    log::debug!(
        "parsed manifest {}: {} nodes, {} unsupported items",
        manifest.id,
        manifest.nodes.len(),
        manifest.unsupported_items().count()
    );

    Ok(ParsedManifest { manifest, diagnostics })
}

/// A scene item whose annotations are parsed once every id is known.
enum PendingItem {
    Page { id: String, count: usize, extras: Extras },
    Annotation,
    Other(Value),
}

fn parse_scene(value: Value, diagnostics: &mut Vec<Diagnostic>) -> Result<(SceneInfo, Vec<SceneNode>)> {
    let mut fields = Fields::new(value, "scene")?;
    let id = fields.require_uri("id")?;
    fields.take("type");
    let label = fields.take_language_map("label")?;
    let background_color = fields.take_color("backgroundColor")?;

    let mut layout = Vec::new();
    let mut annotations = Vec::new();
    for item in fields.require_list("items")? {
        match item_type(&item) {
            Some("AnnotationPage") => {
                let mut page_fields = Fields::new(item, "annotation page")?;
                let page_id = page_fields.require_str("id")?;
                page_fields.take("type");
                let entries = page_fields.take("items").map(force_as_list).unwrap_or_default();
                layout.push(PendingItem::Page {
                    id: page_id,
                    count: entries.len(),
                    extras: page_fields.into_extras(),
                });
                annotations.extend(entries);
            }
            Some("Annotation") => {
                layout.push(PendingItem::Annotation);
                annotations.push(item);
            }
            _ => layout.push(PendingItem::Other(item)),
        }
    }

    let (nodes, slots) = parse_annotations(annotations, &id, diagnostics)?;
    let mut slots = slots.into_iter();
    let items = layout
        .into_iter()
        .filter_map(|pending| match pending {
            PendingItem::Page { id, count, extras } => Some(SceneItem::Page(PageInfo {
                id,
                items: slots.by_ref().take(count).collect(),
                extras,
            })),
            PendingItem::Annotation => slots.next().map(SceneItem::Annotation),
            PendingItem::Other(value) => Some(SceneItem::Other(value)),
        })
        .collect();

    let scene = SceneInfo {
        id,
        label,
        background_color,
        items,
        extras: fields.into_extras(),
    };
    Ok((scene, nodes))
}

/// Parses the annotations of a scene. The returned slots follow the input
/// order one to one.
fn parse_annotations(
    values: Vec<Value>,
    scene_id: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(Vec<SceneNode>, Vec<AnnotationSlot>)> {
    let mut pending = Vec::new();
    let mut slots = Vec::with_capacity(values.len());
    let mut seen = HashSet::new();

    for value in values {
        match parse_annotation(value, diagnostics)? {
            Annotation::Node(node, source) => {
                if !seen.insert(node.id.clone()) {
                    return Err(TranscodeError::malformed(format!("duplicate resource id {}", node.id)));
                }
                slots.push(AnnotationSlot::Node(node.id.clone()));
                pending.push((node, source));
            }
            Annotation::Unsupported { id, raw, detail } => {
                if !seen.insert(id.clone()) {
                    return Err(TranscodeError::malformed(format!("duplicate resource id {id}")));
                }
                diagnostics.push(Diagnostic::unsupported(Some(&id), detail));
                slots.push(AnnotationSlot::Unsupported(raw));
            }
        }
    }

    let mut nodes = Vec::with_capacity(pending.len());
    for (mut node, source) in pending {
        node.parent = resolve_parent(&node.id, source.as_ref(), scene_id, &seen)?;
        if node.parent.is_none() {
            node.extras.target.root_source = root_reference(source, scene_id);
        }
        nodes.push(node);
    }

    check_for_cycles(&nodes)?;
    Ok((nodes, slots))
}

/// Parses one annotation on its own. Parent references are taken from
/// targets explicitly typed as `Annotation`, since no other ids are known.
pub fn parse_node(value: Value, scene_id: &str) -> Result<Option<SceneNode>> {
    // Findings were reported when the annotation was first imported.
    let mut diagnostics = Vec::new();
    match parse_annotation(value, &mut diagnostics)? {
        Annotation::Node(mut node, source) => {
            let parent = source
                .as_ref()
                .filter(|source| source.kind.as_deref() == Some("Annotation"))
                .and_then(|source| source.id.clone());
            match parent {
                Some(parent) => node.parent = Some(parent),
                None => node.extras.target.root_source = root_reference(source, scene_id),
            }
            Ok(Some(node))
        }
        Annotation::Unsupported { .. } => Ok(None),
    }
}

enum Annotation {
    Node(SceneNode, Option<SourceRef>),
    Unsupported { id: String, raw: Value, detail: String },
}

/// Outcome of reading a part of an annotation that may use vocabulary this
/// crate does not handle.
enum Interpreted<T> {
    Known(T),
    Unknown(String),
}

struct Body {
    content: NodeContent,
    local: Transform3D,
    /// The transform list as written, when its entries carried keys of their own.
    written: Option<Vec<Value>>,
    sheared: bool,
    extras: Extras,
    content_extras: Extras,
}

struct Composed {
    transform: Transform3D,
    /// A non-uniform scale followed a rotation and the shear was dropped.
    sheared: bool,
    /// Some transform had keys besides its type and axes.
    annotated: bool,
}

struct Target {
    source: Option<SourceRef>,
    position: DVec3,
    extras: TargetExtras,
}

fn parse_annotation(value: Value, diagnostics: &mut Vec<Diagnostic>) -> Result<Annotation> {
    let raw = value.clone();
    let mut fields = Fields::new(value, "annotation")?;
    let id = fields.require_uri("id")?;
    let context = format!("annotation {id}");

    if let Some(kind) = fields.take_str("type")? {
        if kind != "Annotation" {
            return Err(TranscodeError::malformed(format!("{context} has type {kind}")));
        }
    }

    let motivation = fields
        .take("motivation")
        .map(force_as_list)
        .unwrap_or_default()
        .into_iter()
        .map(|value| match value {
            Value::String(motivation) => Ok(motivation),
            other => Err(TranscodeError::malformed(format!(
                "{context}: motivation must be a string, found {other}"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    let label = fields.take_language_map("label")?;

    let (body, more_bodies) = fields
        .take("body")
        .and_then(split_first)
        .ok_or_else(|| TranscodeError::malformed(format!("{context} has no body")))?;
    let (target, more_targets) = fields
        .take("target")
        .and_then(split_first)
        .ok_or_else(|| TranscodeError::malformed(format!("{context} has no target")))?;

    let body = match parse_body(body, &context)? {
        Interpreted::Known(body) => body,
        Interpreted::Unknown(detail) => return Ok(Annotation::Unsupported { id, raw, detail }),
    };
    let target = parse_target(target, &context)?;

    if body.sheared {
        diagnostics.push(Diagnostic::unsupported(
            Some(&id),
            "non-uniform scale after a rotation was approximated without shear",
        ));
    }

    // Placement applies after the body transforms.
    let local = body.local;
    let transform = local.with_translation(local.translation + target.position);
    let transforms = body.written.map(|list| WrittenTransforms {
        list,
        composed: transform,
        position: target.position,
    });

    let node = SceneNode {
        id,
        label,
        motivation,
        content: body.content,
        transform,
        parent: None,
        extras: NodeExtras {
            annotation: fields.into_extras(),
            body: body.extras,
            content: body.content_extras,
            target: target.extras,
            more_bodies,
            more_targets,
            transforms,
        },
    };
    Ok(Annotation::Node(node, target.source))
}

fn parse_body(value: Value, context: &str) -> Result<Interpreted<Body>> {
    let mut fields = Fields::from_map(force_as_object(value, context)?, format!("{context} body"));

    let (content_value, transforms, extras) = if fields.peek_str("type") == Some("SpecificResource") {
        fields.take("type");
        let source = fields
            .take("source")
            .and_then(force_as_singleton)
            .ok_or_else(|| TranscodeError::malformed(format!("{context}: body has no source")))?;
        let transforms = fields.take("transform").map(force_as_list).unwrap_or_default();
        (source, transforms, fields.into_extras())
    } else {
        (Value::Object(fields.into_map()), Vec::new(), Extras::new())
    };

    let composed = match compose_transforms(&transforms, context)? {
        Interpreted::Known(composed) => composed,
        Interpreted::Unknown(detail) => return Ok(Interpreted::Unknown(detail)),
    };

    Ok(match parse_content(content_value, context)? {
        Interpreted::Known((content, content_extras)) => Interpreted::Known(Body {
            content,
            local: composed.transform,
            written: composed.annotated.then_some(transforms),
            sheared: composed.sheared,
            extras,
            content_extras,
        }),
        Interpreted::Unknown(detail) => Interpreted::Unknown(detail),
    })
}

/// Folds IIIF transforms, applied in list order, into one TRS value.
fn compose_transforms(transforms: &[Value], context: &str) -> Result<Interpreted<Composed>> {
    let mut current = Transform3D::IDENTITY;
    let mut sheared = false;
    let mut annotated = false;

    for transform in transforms {
        let Value::Object(map) = transform else {
            return Err(TranscodeError::malformed(format!(
                "{context}: transform must be an object, found {transform}"
            )));
        };
        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TranscodeError::malformed(format!("{context}: transform without type")))?;
        annotated |= map.keys().any(|key| !AXES_KEYS.contains(&key.as_str()));

        current = match kind {
            "TranslateTransform" => {
                let offset = axes_named_values(map, 0.0, context)?;
                current.with_translation(current.translation + offset)
            }
            "RotateTransform" => {
                let rotation = rotation_from_euler_degrees(axes_named_values(map, 0.0, context)?);
                Transform3D::new(
                    rotation * current.translation,
                    rotation * current.rotation,
                    current.scale,
                )
            }
            "ScaleTransform" => {
                let scale = axes_named_values(map, 1.0, context)?;
                if !scale.is_finite() || scale.min_element() <= 0.0 {
                    return Err(TranscodeError::malformed(format!(
                        "{context}: scale factors must be positive, found {scale}"
                    )));
                }

                let uniform = scale.x == scale.y && scale.y == scale.z;
                if uniform || is_identity_rotation(current.rotation) {
                    Transform3D::new(current.translation * scale, current.rotation, current.scale * scale)
                } else {
                    sheared = true;
                    Transform3D::from_matrix(DMat4::from_scale(scale) * current.to_matrix())
                }
            }
            other => return Ok(Interpreted::Unknown(format!("transform type {other}"))),
        };
    }

    Ok(Interpreted::Known(Composed {
        transform: current,
        sheared,
        annotated,
    }))
}

/// Keys of transforms and point selectors the parser reads.
const AXES_KEYS: [&str; 4] = ["type", "x", "y", "z"];

fn parse_content(value: Value, context: &str) -> Result<Interpreted<(NodeContent, Extras)>> {
    let mut fields = Fields::from_map(force_as_object(value, context)?, format!("{context} body"));
    let kind = fields
        .take_str("type")?
        .ok_or_else(|| TranscodeError::malformed(format!("{context}: body has no type")))?;

    let content = match kind.as_str() {
        "Model" => NodeContent::Model(ModelContent {
            id: fields.require_str("id")?,
            format: fields.take_str("format")?,
        }),
        "PerspectiveCamera" | "OrthographicCamera" => {
            let id = fields.take_str("id")?;
            let projection = if kind == "PerspectiveCamera" {
                Projection::Perspective {
                    field_of_view: fields.take_f64("fieldOfView")?,
                }
            } else {
                Projection::Orthographic {
                    view_height: fields.take_f64("viewHeight")?,
                }
            };
            NodeContent::Camera(CameraParams {
                id,
                projection,
                near: fields.take_f64("near")?,
                far: fields.take_f64("far")?,
                look_at: fields.take_look_at()?,
            })
        }
        other => match LightKind::from_iiif_type(other) {
            Some(kind) => NodeContent::Light(LightParams {
                id: fields.take_str("id")?,
                kind,
                color: fields.take_color("color")?,
                intensity: fields.take_intensity()?,
                angle: fields.take_f64("angle")?,
                look_at: fields.take_look_at()?,
            }),
            None => return Ok(Interpreted::Unknown(format!("body type {other}"))),
        },
    };

    Ok(Interpreted::Known((content, fields.into_extras())))
}

fn parse_target(value: Value, context: &str) -> Result<Target> {
    let bare_id = value.is_string();
    let mut fields = Fields::from_map(force_as_object(value, context)?, format!("{context} target"));

    if fields.peek_str("type") != Some("SpecificResource") {
        // A bare reference to the scene or to a parent annotation.
        let source = SourceRef {
            id: fields.take_str("id")?,
            kind: fields.take_str("type")?,
        };
        return Ok(Target {
            source: Some(source),
            position: DVec3::ZERO,
            extras: TargetExtras {
                source: fields.into_extras(),
                bare_id,
                ..TargetExtras::default()
            },
        });
    }

    fields.take("type");
    let mut extras = TargetExtras::default();
    let source = match fields.take("source").and_then(force_as_singleton) {
        Some(value) => {
            let mut source = Fields::from_map(force_as_object(value, context)?, format!("{context} target source"));
            let reference = SourceRef {
                id: source.take_str("id")?,
                kind: source.take_str("type")?,
            };
            extras.source = source.into_extras();
            Some(reference)
        }
        None => None,
    };

    let mut position = DVec3::ZERO;
    let mut point_index = None;
    let selectors = fields.take("selector").map(force_as_list).unwrap_or_default();
    for (index, selector) in selectors.into_iter().enumerate() {
        let selector = match selector {
            Value::Object(map) => map,
            other => {
                return Err(TranscodeError::malformed(format!(
                    "{context}: selector must be an object, found {other}"
                )))
            }
        };
        let is_point = point_index.is_none() && selector.get("type").and_then(Value::as_str) == Some("PointSelector");
        if !is_point {
            extras.selectors.push(Value::Object(selector));
            continue;
        }

        position = axes_named_values(&selector, 0.0, context)?;
        let mut point = Fields::from_map(selector, format!("{context} point selector"));
        for key in AXES_KEYS {
            point.take(key);
        }
        extras.point = point.into_extras();
        point_index = Some(index);
    }

    extras.point_index = point_index.filter(|&index| index != 0 || position == DVec3::ZERO);
    extras.keep_wrapper = position == DVec3::ZERO;
    extras.wrapper = fields.into_extras();
    Ok(Target {
        source,
        position,
        extras,
    })
}

fn resolve_parent(
    node_id: &str,
    source: Option<&SourceRef>,
    scene_id: &str,
    known_ids: &HashSet<String>,
) -> Result<Option<String>> {
    let Some(source) = source else {
        return Ok(None);
    };
    let explicit = source.kind.as_deref() == Some("Annotation");

    let Some(id) = source.id.as_deref() else {
        if explicit {
            return Err(TranscodeError::malformed(format!(
                "annotation {node_id} targets an annotation without an id"
            )));
        }
        return Ok(None);
    };

    if id == node_id {
        return Err(TranscodeError::malformed(format!("annotation {node_id} is its own parent")));
    }
    if known_ids.contains(id) {
        return Ok(Some(id.to_string()));
    }
    if explicit {
        return Err(TranscodeError::malformed(format!(
            "annotation {node_id} references unresolvable parent {id}"
        )));
    }
    if id != scene_id {
        log::debug!("annotation {node_id} targets {id}, placed at the scene root");
    }
    Ok(None)
}

/// How a root-level target named its source, unless that is the plain scene
/// reference the serializer writes by default.
fn root_reference(source: Option<SourceRef>, scene_id: &str) -> Option<SourceRef> {
    source.filter(|source| source.id.as_deref() != Some(scene_id) || source.kind.as_deref() != Some("Scene"))
}

fn check_for_cycles(nodes: &[SceneNode]) -> Result<()> {
    for node in nodes {
        let mut current = node.parent.as_deref();
        let mut steps = 0;
        while let Some(parent_id) = current {
            if parent_id == node.id || steps > nodes.len() {
                return Err(TranscodeError::malformed(format!(
                    "annotation {} is part of a parent cycle",
                    node.id
                )));
            }
            current = nodes
                .iter()
                .find(|candidate| candidate.id == parent_id)
                .and_then(|parent| parent.parent.as_deref());
            steps += 1;
        }
    }
    Ok(())
}

fn item_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

/// A JSON object being consumed key by key. Whatever is left at the end is
/// the entity's opaque side channel.
struct Fields {
    map: Map<String, Value>,
    context: String,
}

impl Fields {
    fn new(value: Value, context: impl Into<String>) -> Result<Self> {
        let context = context.into();
        match value {
            Value::Object(map) => Ok(Self { map, context }),
            other => Err(TranscodeError::malformed(format!(
                "{context} must be an object, found {other}"
            ))),
        }
    }

    fn from_map(map: Map<String, Value>, context: impl Into<String>) -> Self {
        Self {
            map,
            context: context.into(),
        }
    }

    fn peek_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(Value::as_str)
    }

    fn take(&mut self, key: &str) -> Option<Value> {
        match self.map.remove(key) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    fn take_str(&mut self, key: &str) -> Result<Option<String>> {
        match self.take(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(self.invalid(key, "a string", &other)),
        }
    }

    fn require_str(&mut self, key: &str) -> Result<String> {
        self.take_str(key)?
            .ok_or_else(|| TranscodeError::malformed(format!("{} has no {key}", self.context)))
    }

    fn require_uri(&mut self, key: &str) -> Result<String> {
        let value = self.require_str(key)?;
        url::Url::parse(&value).map_err(|err| {
            TranscodeError::malformed(format!(
                "{} {key} {value:?} is not an absolute URI: {err}",
                self.context
            ))
        })?;
        Ok(value)
    }

    fn require_list(&mut self, key: &str) -> Result<Vec<Value>> {
        match self.take(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(self.invalid(key, "a list", &other)),
            None => Err(TranscodeError::malformed(format!("{} has no {key}", self.context))),
        }
    }

    fn take_f64(&mut self, key: &str) -> Result<Option<f64>> {
        match self.take(key) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(key, "a number", &value)),
        }
    }

    fn require_f64(&mut self, key: &str) -> Result<f64> {
        self.take_f64(key)?
            .ok_or_else(|| TranscodeError::malformed(format!("{} has no {key}", self.context)))
    }

    fn take_language_map(&mut self, key: &str) -> Result<Option<LanguageMap>> {
        match self.take(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|_| self.invalid(key, "a language map", &value)),
        }
    }

    fn take_color(&mut self, key: &str) -> Result<Option<Color>> {
        match self.take_str(key)? {
            None => Ok(None),
            Some(hex) => Color::from_hex(&hex)
                .map(Some)
                .ok_or_else(|| self.invalid(key, "a #RRGGBB colour", &Value::String(hex))),
        }
    }

    fn take_intensity(&mut self) -> Result<Option<Intensity>> {
        match self.take("intensity") {
            None => Ok(None),
            Some(Value::Number(number)) => Ok(number.as_f64().map(Intensity::new)),
            Some(Value::Object(map)) => {
                let mut intensity = Fields::from_map(map, format!("{} intensity", self.context));
                if let Some(kind) = intensity.take_str("type")? {
                    if kind != "Value" {
                        return Err(TranscodeError::malformed(format!(
                            "{} has type {kind}, expected Value",
                            intensity.context
                        )));
                    }
                }
                let value = intensity.require_f64("value")?;
                Ok(Some(Intensity {
                    value,
                    unit: intensity.take_str("unit")?,
                    extras: intensity.into_extras(),
                }))
            }
            Some(other) => Err(self.invalid("intensity", "a number or Value resource", &other)),
        }
    }

    /// Unrecognised `lookAt` forms stay in the side channel untouched.
    fn take_look_at(&mut self) -> Result<Option<LookAt>> {
        let Some(value) = self.take("lookAt") else {
            return Ok(None);
        };

        let look_at = match &value {
            Value::String(id) => Some(LookAt::Annotation(id.clone())),
            Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                Some("PointSelector") => Some(LookAt::Point(axes_named_values(map, 0.0, &self.context)?)),
                Some("Annotation") | None => map
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|id| LookAt::Annotation(id.to_string())),
                Some(_) => None,
            },
            _ => None,
        };

        if look_at.is_none() {
            self.map.insert("lookAt".to_string(), value);
        }
        Ok(look_at)
    }

    fn invalid(&self, key: &str, expected: &str, found: &Value) -> TranscodeError {
        TranscodeError::malformed(format!(
            "{} {key} must be {expected}, found {found}",
            self.context
        ))
    }

    fn into_map(self) -> Map<String, Value> {
        self.map
    }

    fn into_extras(self) -> Extras {
        self.map
    }
}
