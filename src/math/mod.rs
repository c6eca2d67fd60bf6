pub mod coordinates;
pub mod transform;

pub use coordinates::{to_host_space, to_manifest_space, NormalizationWarning};
pub use transform::{look_rotation, HostSpace, HostTransform, ManifestSpace, Transform3D, Trs};
