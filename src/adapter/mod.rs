//! The boundary between manifests and a host scene graph. This is the only
//! place manifest transforms are converted to host space and back.

pub mod content;
pub mod export;
pub mod host;
pub mod import;
pub mod session;

pub use host::{
    HostCamera, HostContent, HostLight, HostLightKind, HostNode, HostProjection, SceneHost, META_ANNOTATION,
    META_MANIFEST, META_RESOURCE_ID,
};
pub use session::{ExportReport, ImportReport, TranscodeSession};
