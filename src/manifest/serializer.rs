use std::collections::{HashMap, HashSet};

use glam::DVec3;
use serde_json::{Map, Value};

use crate::error::TranscodeError;
use crate::manifest::json_patterns::create_axes_named_values;
use crate::manifest::model::{
    AnnotationSlot, Extras, Intensity, LanguageMap, LookAt, NodeContent, Projection, SceneItem, SceneManifest,
    SceneNode,
};
use crate::math::transform::{is_identity_rotation, rotation_to_euler_degrees};

/// Builds the JSON document for `manifest`.
///
/// Output is deterministic: keys are written in a fixed order and items keep
/// their document order. Nodes the scene layout doesn't place yet are
/// appended to its last annotation page. Unknown keys picked up by the parser
/// are appended after the keys written here and never override them.
pub fn serialize(manifest: &SceneManifest) -> Value {
    let mut out = Map::new();
    if let Some(context) = &manifest.context {
        out.insert("@context".into(), context.clone());
    }
    out.insert("id".into(), Value::from(manifest.id.as_str()));
    out.insert("type".into(), Value::from("Manifest"));
    insert_language_map(&mut out, "label", manifest.label.as_ref());
    insert_language_map(&mut out, "summary", manifest.summary.as_ref());
    if let Some(rights) = &manifest.rights {
        out.insert("rights".into(), Value::from(rights.as_str()));
    }

    let mut items = manifest.extra_items.clone();
    let scene_index = manifest.scene_index.min(items.len());
    items.insert(scene_index, serialize_scene(manifest));
    out.insert("items".into(), Value::Array(items));

    append_extras(&mut out, &manifest.extras);
    Value::Object(out)
}

pub fn to_json_string(manifest: &SceneManifest, pretty: bool) -> Result<String, TranscodeError> {
    let value = serialize(manifest);
    let json = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    Ok(json)
}

fn serialize_scene(manifest: &SceneManifest) -> Value {
    let scene = &manifest.scene;
    let mut out = Map::new();
    out.insert("id".into(), Value::from(scene.id.as_str()));
    out.insert("type".into(), Value::from("Scene"));
    insert_language_map(&mut out, "label", scene.label.as_ref());
    if let Some(color) = scene.background_color {
        out.insert("backgroundColor".into(), Value::from(color.to_hex()));
    }

    let nodes: HashMap<&str, &SceneNode> = manifest.nodes.iter().map(|node| (node.id.as_str(), node)).collect();
    let placed: HashSet<&str> = scene
        .items
        .iter()
        .flat_map(|item| match item {
            SceneItem::Page(page) => page.items.as_slice(),
            SceneItem::Annotation(slot) => std::slice::from_ref(slot),
            SceneItem::Other(_) => &[][..],
        })
        .filter_map(|slot| match slot {
            AnnotationSlot::Node(id) => Some(id.as_str()),
            AnnotationSlot::Unsupported(_) => None,
        })
        .collect();
    let mut unplaced = manifest
        .nodes
        .iter()
        .filter(|node| !placed.contains(node.id.as_str()))
        .map(|node| serialize_node(node, &scene.id));

    // Nodes deleted since parsing leave their slot empty.
    let slot_value = |slot: &AnnotationSlot| match slot {
        AnnotationSlot::Node(id) => nodes.get(id.as_str()).map(|node| serialize_node(node, &scene.id)),
        AnnotationSlot::Unsupported(value) => Some(value.clone()),
    };

    let last_page = scene.items.iter().rposition(|item| matches!(item, SceneItem::Page(_)));
    let mut items = Vec::with_capacity(scene.items.len());
    for (index, item) in scene.items.iter().enumerate() {
        match item {
            SceneItem::Page(page) => {
                let mut annotations: Vec<Value> = page.items.iter().filter_map(&slot_value).collect();
                if Some(index) == last_page {
                    annotations.extend(unplaced.by_ref());
                }
                let mut page_out = Map::new();
                page_out.insert("id".into(), Value::from(page.id.as_str()));
                page_out.insert("type".into(), Value::from("AnnotationPage"));
                page_out.insert("items".into(), Value::Array(annotations));
                append_extras(&mut page_out, &page.extras);
                items.push(Value::Object(page_out));
            }
            SceneItem::Annotation(slot) => items.extend(slot_value(slot)),
            SceneItem::Other(value) => items.push(value.clone()),
        }
    }
    items.extend(unplaced);
    out.insert("items".into(), Value::Array(items));

    append_extras(&mut out, &scene.extras);
    Value::Object(out)
}

/// One painting annotation. `scene_id` is the target of root-level nodes.
pub fn serialize_node(node: &SceneNode, scene_id: &str) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), Value::from(node.id.as_str()));
    out.insert("type".into(), Value::from("Annotation"));
    if !node.motivation.is_empty() {
        let motivation = node.motivation.iter().map(|m| Value::from(m.as_str())).collect();
        out.insert("motivation".into(), Value::Array(motivation));
    }
    insert_language_map(&mut out, "label", node.label.as_ref());

    let (transforms, position) = body_transforms(node);
    out.insert("body".into(), serialize_body(node, transforms));
    out.insert("target".into(), serialize_target(node, position, scene_id));
    append_extras(&mut out, &node.extras.annotation);
    Value::Object(out)
}

/// Body transforms and point selector position for `node`. Written
/// transforms are reused while the node still has the transform they
/// produced; otherwise scale then rotation are written.
fn body_transforms(node: &SceneNode) -> (Vec<Value>, DVec3) {
    let transform = &node.transform;
    let written = node.extras.transforms.as_ref();
    if let Some(written) = written.filter(|written| written.composed == *transform) {
        return (written.list.clone(), written.position);
    }

    let mut transforms = Vec::new();
    if transform.scale != DVec3::ONE {
        transforms.push(create_axes_named_values("ScaleTransform", transform.scale));
    }
    if !is_identity_rotation(transform.rotation) {
        let degrees = rotation_to_euler_degrees(transform.rotation);
        transforms.push(create_axes_named_values("RotateTransform", degrees));
    }
    if let Some(written) = written {
        for created in &mut transforms {
            carry_transform_keys(created, &written.list);
        }
    }
    (transforms, transform.translation)
}

/// Copies the unknown keys of the first written transform of the same type.
fn carry_transform_keys(created: &mut Value, written: &[Value]) {
    let Value::Object(created) = created else {
        return;
    };
    let kind = created.get("type").and_then(Value::as_str);
    let original = written
        .iter()
        .find(|transform| transform.get("type").and_then(Value::as_str) == kind);
    if let Some(Value::Object(original)) = original {
        append_extras(created, original);
    }
}

fn serialize_body(node: &SceneNode, transforms: Vec<Value>) -> Value {
    let content = serialize_content(&node.content, &node.extras.content);

    let body = if transforms.is_empty() && node.extras.body.is_empty() {
        content
    } else {
        let mut out = Map::new();
        out.insert("type".into(), Value::from("SpecificResource"));
        out.insert("source".into(), content);
        if !transforms.is_empty() {
            out.insert("transform".into(), Value::Array(transforms));
        }
        append_extras(&mut out, &node.extras.body);
        Value::Object(out)
    };
    with_rest(body, &node.extras.more_bodies)
}

fn serialize_content(content: &NodeContent, extras: &Extras) -> Value {
    let mut out = Map::new();
    match content {
        NodeContent::Model(model) => {
            out.insert("id".into(), Value::from(model.id.as_str()));
            out.insert("type".into(), Value::from("Model"));
            if let Some(format) = &model.format {
                out.insert("format".into(), Value::from(format.as_str()));
            }
        }
        NodeContent::Camera(camera) => {
            if let Some(id) = &camera.id {
                out.insert("id".into(), Value::from(id.as_str()));
            }
            out.insert("type".into(), Value::from(camera.projection.iiif_type()));
            match camera.projection {
                Projection::Perspective { field_of_view } => insert_f64(&mut out, "fieldOfView", field_of_view),
                Projection::Orthographic { view_height } => insert_f64(&mut out, "viewHeight", view_height),
            }
            insert_f64(&mut out, "near", camera.near);
            insert_f64(&mut out, "far", camera.far);
            insert_look_at(&mut out, camera.look_at.as_ref());
        }
        NodeContent::Light(light) => {
            if let Some(id) = &light.id {
                out.insert("id".into(), Value::from(id.as_str()));
            }
            out.insert("type".into(), Value::from(light.kind.iiif_type()));
            if let Some(color) = light.color {
                out.insert("color".into(), Value::from(color.to_hex()));
            }
            if let Some(intensity) = &light.intensity {
                out.insert("intensity".into(), serialize_intensity(intensity));
            }
            insert_f64(&mut out, "angle", light.angle);
            insert_look_at(&mut out, light.look_at.as_ref());
        }
    }
    append_extras(&mut out, extras);
    Value::Object(out)
}

fn serialize_intensity(intensity: &Intensity) -> Value {
    let mut out = Map::new();
    out.insert("type".into(), Value::from("Value"));
    out.insert("value".into(), Value::from(intensity.value));
    if let Some(unit) = &intensity.unit {
        out.insert("unit".into(), Value::from(unit.as_str()));
    }
    append_extras(&mut out, &intensity.extras);
    Value::Object(out)
}

fn serialize_target(node: &SceneNode, position: DVec3, scene_id: &str) -> Value {
    let extras = &node.extras.target;
    let mut source = Map::new();
    match (&node.parent, &extras.root_source) {
        (Some(parent), _) => {
            source.insert("id".into(), Value::from(parent.as_str()));
            source.insert("type".into(), Value::from("Annotation"));
        }
        (None, Some(reference)) => {
            if let Some(id) = &reference.id {
                source.insert("id".into(), Value::from(id.as_str()));
            }
            if let Some(kind) = &reference.kind {
                source.insert("type".into(), Value::from(kind.as_str()));
            }
        }
        (None, None) => {
            source.insert("id".into(), Value::from(scene_id));
            source.insert("type".into(), Value::from("Scene"));
        }
    }
    append_extras(&mut source, &extras.source);

    let has_point = position != DVec3::ZERO || extras.point_index.is_some() || !extras.point.is_empty();
    let wrapped = has_point || extras.keep_wrapper || !extras.wrapper.is_empty() || !extras.selectors.is_empty();

    let target = if wrapped {
        let mut selectors = extras.selectors.clone();
        if has_point {
            let mut point = create_axes_named_values("PointSelector", position);
            if let Value::Object(map) = &mut point {
                append_extras(map, &extras.point);
            }
            let index = extras.point_index.unwrap_or(0).min(selectors.len());
            selectors.insert(index, point);
        }

        let mut out = Map::new();
        out.insert("type".into(), Value::from("SpecificResource"));
        out.insert("source".into(), Value::Object(source));
        if !selectors.is_empty() {
            out.insert("selector".into(), Value::Array(selectors));
        }
        append_extras(&mut out, &extras.wrapper);
        Value::Object(out)
    } else {
        let bare_id = source
            .get("id")
            .filter(|id| extras.bare_id && id.is_string() && source.len() == 1)
            .cloned();
        bare_id.unwrap_or_else(|| Value::Object(source))
    };
    with_rest(target, &node.extras.more_targets)
}

/// `first` alone, or a list of it followed by `rest`.
fn with_rest(first: Value, rest: &[Value]) -> Value {
    if rest.is_empty() {
        return first;
    }
    Value::Array(std::iter::once(first).chain(rest.iter().cloned()).collect())
}

fn insert_look_at(out: &mut Map<String, Value>, look_at: Option<&LookAt>) {
    match look_at {
        Some(LookAt::Annotation(id)) => {
            let mut reference = Map::new();
            reference.insert("id".into(), Value::from(id.as_str()));
            reference.insert("type".into(), Value::from("Annotation"));
            out.insert("lookAt".into(), Value::Object(reference));
        }
        Some(LookAt::Point(point)) => {
            out.insert("lookAt".into(), create_axes_named_values("PointSelector", *point));
        }
        None => {}
    }
}

fn insert_f64(out: &mut Map<String, Value>, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        out.insert(key.into(), Value::from(value));
    }
}

fn insert_language_map(out: &mut Map<String, Value>, key: &str, map: Option<&LanguageMap>) {
    let Some(map) = map else {
        return;
    };
    let languages = map
        .0
        .iter()
        .map(|(language, values)| {
            let values = values.iter().map(|value| Value::from(value.as_str())).collect::<Value>();
            (language.clone(), values)
        })
        .collect();
    out.insert(key.into(), Value::Object(languages));
}

fn append_extras(out: &mut Map<String, Value>, extras: &Extras) {
    for (key, value) in extras {
        if !out.contains_key(key) {
            out.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::color::Color;
    use crate::manifest::model::{LightKind, LightParams, ModelContent, NodeExtras, PAINTING};
    use crate::manifest::parser::{parse, parse_manifest, parse_node};
    use crate::math::Transform3D;
    use glam::DQuat;
    use serde_json::json;

    fn model_node(id: &str, transform: Transform3D) -> SceneNode {
        SceneNode {
            id: id.to_string(),
            label: None,
            motivation: vec![PAINTING.to_string()],
            content: NodeContent::Model(ModelContent {
                id: "https://example.org/astronaut.glb".to_string(),
                format: Some("model/gltf-binary".to_string()),
            }),
            transform,
            parent: None,
            extras: NodeExtras::default(),
        }
    }

    #[test]
    fn untransformed_node_has_plain_body_and_target() {
        let value = serialize_node(&model_node("res:a", Transform3D::IDENTITY), "https://example.org/scene1");
        assert_eq!(
            value,
            json!({
                "id": "res:a",
                "type": "Annotation",
                "motivation": ["painting"],
                "body": {
                    "id": "https://example.org/astronaut.glb",
                    "type": "Model",
                    "format": "model/gltf-binary"
                },
                "target": {"id": "https://example.org/scene1", "type": "Scene"}
            })
        );
    }

    #[test]
    fn transforms_are_written_scale_then_rotation_with_point_selector() {
        let transform = Transform3D::new(
            DVec3::new(1.0, 2.0, 3.0),
            DQuat::from_rotation_y(std::f64::consts::FRAC_PI_2),
            DVec3::new(2.0, 1.0, 1.0),
        );
        let value = serialize_node(&model_node("res:a", transform), "https://example.org/scene1");

        let transforms = value["body"]["transform"].as_array().unwrap();
        assert_eq!(transforms.len(), 2);
        assert_eq!(transforms[0]["type"], "ScaleTransform");
        assert_eq!(transforms[1]["type"], "RotateTransform");
        assert!((transforms[1]["y"].as_f64().unwrap() - 90.0).abs() < 1e-9);

        let selector = &value["target"]["selector"][0];
        assert_eq!(selector, &json!({"type": "PointSelector", "x": 1.0, "y": 2.0, "z": 3.0}));
    }

    #[test]
    fn serialized_node_parses_back() {
        let mut node = model_node(
            "res:a",
            Transform3D::new(
                DVec3::new(-4.0, 0.5, 2.0),
                DQuat::from_euler(glam::EulerRot::ZYX, 0.2, 0.4, -0.6),
                DVec3::new(1.0, 3.0, 2.0),
            ),
        );
        node.parent = Some("res:parent".to_string());
        node.extras.annotation.insert("customExt".into(), json!({"foo": 1}));

        let value = serialize_node(&node, "https://example.org/scene1");
        let back = parse_node(value, "https://example.org/scene1").unwrap().unwrap();

        assert_eq!(back.id, node.id);
        assert_eq!(back.parent, node.parent);
        assert_eq!(back.extras, node.extras);
        assert!(back.transform.approx_eq(&node.transform, 1e-9));
    }

    #[test]
    fn extras_never_override_written_keys() {
        let mut node = model_node("res:a", Transform3D::IDENTITY);
        node.extras.annotation.insert("type".into(), json!("NotAnnotation"));
        node.extras.annotation.insert("extra".into(), json!(1));

        let value = serialize_node(&node, "https://example.org/scene1");
        assert_eq!(value["type"], "Annotation");
        assert_eq!(value["extra"], 1);
    }

    #[test]
    fn light_colour_is_uppercase_hex() {
        let mut node = model_node("res:light", Transform3D::IDENTITY);
        node.content = NodeContent::Light(LightParams {
            id: None,
            kind: LightKind::Point,
            color: Some(Color::new(0xff, 0xa5, 0x00)),
            intensity: None,
            angle: None,
            look_at: Some(LookAt::Point(DVec3::ZERO)),
        });

        let body = serialize_node(&node, "https://example.org/scene1")["body"].clone();
        assert_eq!(body["type"], "PointLight");
        assert_eq!(body["color"], "#FFA500");
        assert_eq!(body["lookAt"]["type"], "PointSelector");
    }

    #[test]
    fn manifest_keeps_unsupported_and_extra_items_in_place() {
        let json = json!({
            "@context": "http://iiif.io/api/presentation/4/context.json",
            "id": "https://example.org/manifest",
            "type": "Manifest",
            "items": [
                {"id": "https://example.org/canvas", "type": "Canvas"},
                {
                    "id": "https://example.org/scene1",
                    "type": "Scene",
                    "backgroundColor": "#336699",
                    "items": [{
                        "id": "https://example.org/scene1/page",
                        "type": "AnnotationPage",
                        "items": [
                            {
                                "id": "res:audio",
                                "type": "Annotation",
                                "body": {"type": "Audio"},
                                "target": "https://example.org/scene1"
                            },
                            {
                                "id": "res:a",
                                "type": "Annotation",
                                "body": {"id": "https://example.org/a.glb", "type": "Model"},
                                "target": {"id": "https://example.org/scene1", "type": "Scene"}
                            }
                        ]
                    }]
                }
            ]
        });

        let manifest = parse(&json.to_string()).unwrap();
        let out = serialize(&manifest);

        let page_items = out["items"][1]["items"][0]["items"].as_array().unwrap();
        assert_eq!(page_items.len(), 2);
        assert_eq!(page_items[0]["id"], "res:audio");
        assert_eq!(page_items[1]["id"], "res:a");
        assert_eq!(out["items"][0]["type"], "Canvas");
        assert_eq!(out["items"][1]["backgroundColor"], "#336699");
        assert_eq!(out, json);
    }

    fn annotated_manifest() -> Value {
        json!({
            "@context": "http://iiif.io/api/presentation/4/context.json",
            "id": "https://example.org/manifest",
            "type": "Manifest",
            "items": [{
                "id": "https://example.org/scene1",
                "type": "Scene",
                "items": [
                    {
                        "id": "https://example.org/scene1/page1",
                        "type": "AnnotationPage",
                        "items": [{
                            "id": "res:a",
                            "type": "Annotation",
                            "motivation": ["painting"],
                            "body": [
                                {
                                    "type": "SpecificResource",
                                    "source": {"id": "https://example.org/a.glb", "type": "Model"},
                                    "transform": [
                                        {"type": "RotateTransform", "x": 0.0, "y": 90.0, "z": 0.0, "rotExt": "r"},
                                        {"type": "TranslateTransform", "x": 1.0, "y": 0.0, "z": 0.0}
                                    ]
                                },
                                {"id": "https://example.org/a-low.glb", "type": "Model"}
                            ],
                            "target": {
                                "type": "SpecificResource",
                                "source": {"id": "https://example.org/scene1", "type": "Scene", "srcExt": 1},
                                "selector": [
                                    {"type": "FragmentSelector", "value": "xywh=0,0,10,10"},
                                    {"type": "PointSelector", "x": 1.0, "y": 2.0, "z": 3.0, "selExt": true}
                                ],
                                "targetExt": "t"
                            }
                        }]
                    },
                    {
                        "id": "https://example.org/scene1/page2",
                        "type": "AnnotationPage",
                        "items": [{
                            "id": "res:light",
                            "type": "Annotation",
                            "motivation": ["painting"],
                            "body": {
                                "type": "PointLight",
                                "intensity": {"type": "Value", "value": 2.0, "unit": "relative", "intensityExt": 5}
                            },
                            "target": "https://example.org/elsewhere"
                        }],
                        "pageExt2": "p2"
                    }
                ]
            }]
        })
    }

    #[test]
    fn annotation_side_channels_survive_a_round_trip() {
        let json = annotated_manifest();
        let parsed = parse_manifest(&json.to_string()).unwrap();
        assert!(parsed.diagnostics.is_empty());

        let manifest = parsed.manifest;
        let a = manifest.node("res:a").unwrap();
        assert!(a.transform.translation.abs_diff_eq(DVec3::new(2.0, 2.0, 3.0), 1e-12));
        assert_eq!(a.extras.target.selectors.len(), 1);
        assert_eq!(a.extras.more_bodies.len(), 1);
        assert_eq!(manifest.node("res:light").unwrap().parent, None);

        assert_eq!(serialize(&manifest), json);
    }

    #[test]
    fn moved_node_rebuilds_transforms_and_keeps_their_keys() {
        let manifest = parse(&annotated_manifest().to_string()).unwrap();
        let mut node = manifest.node("res:a").unwrap().clone();
        node.transform.translation = DVec3::new(5.0, 0.0, 0.0);

        let value = serialize_node(&node, &manifest.scene.id);
        let transforms = value["body"][0]["transform"].as_array().unwrap();
        assert_eq!(transforms.len(), 1);
        assert_eq!(transforms[0]["type"], "RotateTransform");
        assert_eq!(transforms[0]["rotExt"], "r");

        let selectors = value["target"]["selector"].as_array().unwrap();
        assert_eq!(selectors[0]["type"], "FragmentSelector");
        assert_eq!(selectors[1]["x"], 5.0);
        assert_eq!(selectors[1]["selExt"], true);
        assert_eq!(value["target"]["source"]["srcExt"], 1);
    }

    #[test]
    fn new_nodes_join_the_last_page() {
        let mut manifest = parse(&annotated_manifest().to_string()).unwrap();
        manifest.nodes.push(model_node("res:new", Transform3D::IDENTITY));

        let out = serialize(&manifest);
        let pages = out["items"][0]["items"].as_array().unwrap();
        assert_eq!(pages[0]["items"].as_array().unwrap().len(), 1);
        let last = pages[1]["items"].as_array().unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[1]["id"], "res:new");
    }

    #[test]
    fn intensity_is_written_as_a_value_resource() {
        let mut node = model_node("res:light", Transform3D::IDENTITY);
        let mut intensity = Intensity::new(0.6);
        intensity.unit = Some("relative".to_string());
        intensity.extras.insert("value".into(), json!("ignored"));
        node.content = NodeContent::Light(LightParams {
            id: None,
            kind: LightKind::Directional,
            color: None,
            intensity: Some(intensity),
            angle: None,
            look_at: None,
        });

        let body = serialize_node(&node, "https://example.org/scene1")["body"].clone();
        assert_eq!(body["intensity"], json!({"type": "Value", "value": 0.6, "unit": "relative"}));
    }

    #[test]
    fn serialization_is_deterministic() {
        let mut manifest = SceneManifest::scaffold("https://example.org/m", "https://example.org/s");
        manifest.nodes.push(model_node("res:a", Transform3D::from_translation(DVec3::X)));
        manifest.nodes.push(model_node("res:b", Transform3D::IDENTITY));

        let first = to_json_string(&manifest, false).unwrap();
        let second = to_json_string(&manifest, false).unwrap();
        assert_eq!(first, second);
        assert!(first.find("res:a").unwrap() < first.find("res:b").unwrap());
    }
}
