use crate::manifest::NodeKind;

/// Failures that abort a whole transcoding operation.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// Structural JSON violation. No partial manifest is ever returned.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// Nothing in the manifest can be represented by the host.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("provenance conflict: {resource_id} was imported as {expected} but its host node is now {found}")]
    ProvenanceConflict {
        resource_id: String,
        expected: NodeKind,
        found: String,
    },

    #[error("no manifest has been imported into this session")]
    NoManifest,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    pub fn malformed(message: impl Into<String>) -> Self {
        TranscodeError::MalformedManifest(message.into())
    }

    /// Process exit code the CLI reports for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            TranscodeError::MalformedManifest(_) => 2,
            TranscodeError::UnsupportedFeature(_) => 3,
            TranscodeError::ProvenanceConflict { .. } => 4,
            TranscodeError::Io(_) => 5,
            TranscodeError::NoManifest => 1,
        }
    }
}

impl From<serde_json::Error> for TranscodeError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            TranscodeError::Io(err.into())
        } else {
            TranscodeError::MalformedManifest(err.to_string())
        }
    }
}

/// Per-node issues collected during import or export. They never abort the
/// operation on their own; the caller decides how to surface them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Diagnostic {
    #[error("unsupported feature{}: {detail}", fmt_resource(.resource_id))]
    UnsupportedFeature {
        resource_id: Option<String>,
        detail: String,
    },

    #[error("provenance conflict: {resource_id} was imported as {expected} but its host node is now {found}")]
    ProvenanceConflict {
        resource_id: String,
        expected: NodeKind,
        found: String,
    },

    #[error("rotation of {resource_id} had length {length} and was normalized")]
    CoordinateNormalization { resource_id: String, length: f64 },

    #[error("asset {uri} for {resource_id} is not loaded in the host")]
    AssetUnavailable { resource_id: String, uri: String },

    #[error("{resource_id} references {reference}, which is not part of the scene")]
    UnresolvedReference {
        resource_id: String,
        reference: String,
    },

    #[error("{resource_id} is claimed by more than one host node; the duplicates are untracked")]
    DuplicateProvenance { resource_id: String },
}

fn fmt_resource(resource_id: &Option<String>) -> String {
    match resource_id {
        Some(id) => format!(" in {id}"),
        None => String::new(),
    }
}

impl Diagnostic {
    pub fn unsupported(resource_id: Option<&str>, detail: impl Into<String>) -> Self {
        Diagnostic::UnsupportedFeature {
            resource_id: resource_id.map(str::to_string),
            detail: detail.into(),
        }
    }

    /// Errors mean content was left out of the result and needs user action.
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::ProvenanceConflict { .. })
    }

    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Diagnostic::UnsupportedFeature { resource_id, .. } => resource_id.as_deref(),
            Diagnostic::ProvenanceConflict { resource_id, .. }
            | Diagnostic::CoordinateNormalization { resource_id, .. }
            | Diagnostic::AssetUnavailable { resource_id, .. }
            | Diagnostic::UnresolvedReference { resource_id, .. }
            | Diagnostic::DuplicateProvenance { resource_id } => Some(resource_id),
        }
    }

    pub(crate) fn log(&self) {
        if self.is_error() {
            log::error!("{self}");
        } else {
            log::warn!("{self}");
        }
    }

    /// The fatal form of this diagnostic, if it has one.
    pub fn into_error(self) -> Option<TranscodeError> {
        match self {
            Diagnostic::ProvenanceConflict {
                resource_id,
                expected,
                found,
            } => Some(TranscodeError::ProvenanceConflict {
                resource_id,
                expected,
                found,
            }),
            Diagnostic::UnsupportedFeature { detail, .. } => {
                Some(TranscodeError::UnsupportedFeature(detail))
            }
            _ => None,
        }
    }
}
