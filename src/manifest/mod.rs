pub mod color;
pub mod json_patterns;
pub mod model;
pub mod parser;
pub mod serializer;

pub use color::Color;
pub use model::{
    AnnotationSlot, CameraParams, Extras, Intensity, LanguageMap, LightKind, LightParams, LookAt, ModelContent,
    NodeContent, NodeExtras, NodeKind, PageInfo, Projection, SceneInfo, SceneItem, SceneManifest, SceneNode,
    SourceRef, TargetExtras, WrittenTransforms, PAINTING,
};
pub use parser::{parse, parse_manifest, parse_manifest_value, ParsedManifest};
pub use serializer::{serialize, to_json_string};
