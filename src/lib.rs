//! Transcoding between IIIF 3D scene manifests and an editable host scene
//! graph.
//!
//! Import parses a manifest and materializes its models, cameras and lights
//! as host nodes, converting from the manifest's Y-up convention to the
//! host's Z-up one. Export walks the host nodes back into a manifest, reusing
//! the imported annotation for every node that was not edited so unknown
//! extension fields survive untouched.

pub mod adapter;
pub mod asset_pipeline;
pub mod config;
pub mod error;
pub mod manifest;
pub mod math;
pub mod provenance;
pub mod scene_graph;

pub use adapter::{ExportReport, ImportReport, SceneHost, TranscodeSession};
pub use config::TranscodeConfig;
pub use error::{Diagnostic, TranscodeError};
pub use manifest::{parse, serialize, SceneManifest, SceneNode};
pub use provenance::{ProvenanceRecord, ProvenanceTracker};
