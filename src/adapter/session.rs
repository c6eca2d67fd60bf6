use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use glam::DMat4;

use crate::adapter::host::{HostNode, SceneHost, META_ANNOTATION, META_MANIFEST, META_RESOURCE_ID};
use crate::config::TranscodeConfig;
use crate::error::{Diagnostic, TranscodeError};
use crate::manifest::parser::{parse_manifest, parse_node};
use crate::manifest::serializer::to_json_string;
use crate::manifest::{SceneManifest, SceneNode};
use crate::provenance::ProvenanceTracker;

/// State shared by the imports and exports of one manifest against one host
/// scene. Every transcoding operation goes through a session; nothing is kept
/// in globals.
#[derive(Debug, Clone)]
pub struct TranscodeSession<Id> {
    pub(super) config: TranscodeConfig,
    pub(super) tracker: ProvenanceTracker<Id>,
    /// The manifest last imported or recovered. Exports start from it.
    pub(super) manifest: Option<SceneManifest>,
    /// Provenance could not be recovered from the host, so every host node is
    /// re-derived on export.
    pub(super) degraded: bool,
}

#[derive(Debug, Clone)]
pub struct ImportReport<Id> {
    pub created: Vec<Id>,
    pub updated: Vec<Id>,
    /// Resources of an earlier import that the new manifest no longer has.
    pub removed: Vec<String>,
    /// Resources the host can't represent.
    pub skipped: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub struct ExportReport<Id> {
    pub manifest: SceneManifest,
    /// Host nodes left out of the manifest: untracked nodes and nodes in
    /// conflict with their provenance.
    pub excluded: Vec<Id>,
    /// Resources whose host nodes were deleted since import.
    pub deleted: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<Id> ImportReport<Id> {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

impl<Id> ExportReport<Id> {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn to_json_string(&self, pretty: bool) -> Result<String, TranscodeError> {
        to_json_string(&self.manifest, pretty)
    }
}

impl<Id> TranscodeSession<Id>
where
    Id: Copy + Eq + Hash + Debug,
{
    pub fn new(config: TranscodeConfig) -> Self {
        Self {
            config,
            tracker: ProvenanceTracker::new(),
            manifest: None,
            degraded: false,
        }
    }

    /// Rebuilds a session for a host scene populated by an earlier process.
    ///
    /// Provenance is read back from node metadata and every recovered record
    /// is dirty. `known` is used when the host kept no manifest of its own.
    /// Hosts without metadata give a degraded session where nodes are matched
    /// to `known` by name only.
    pub fn recover<H>(
        host: &H,
        known: Option<SceneManifest>,
        config: TranscodeConfig,
    ) -> Result<(Self, Vec<Diagnostic>), TranscodeError>
    where
        H: SceneHost<NodeId = Id>,
    {
        let mut session = Self::new(config);
        let mut diagnostics = Vec::new();

        if !host.supports_metadata() {
            let manifest = known.ok_or(TranscodeError::NoManifest)?;
            log::warn!("host keeps no node metadata; matching nodes to {} by name", manifest.id);
            session.match_by_name(host, &manifest);
            session.manifest = Some(manifest);
            session.degraded = true;
            return Ok((session, diagnostics));
        }

        let stored = match host.scene_metadata(META_MANIFEST) {
            Some(json) => match parse_manifest(&json) {
                Ok(parsed) => Some(parsed.manifest),
                Err(err) if known.is_some() => {
                    log::warn!("stored manifest is unreadable ({err}), using the one provided");
                    None
                }
                Err(err) => return Err(err),
            },
            None => None,
        };
        let manifest = stored.or(known).ok_or(TranscodeError::NoManifest)?;

        for id in host.node_ids() {
            let Some(resource_id) = host.node_metadata(id, META_RESOURCE_ID) else {
                continue;
            };
            if session.tracker.host_for(&resource_id).is_some() {
                diagnostics.push(Diagnostic::DuplicateProvenance { resource_id });
                continue;
            }

            let cached = host
                .node_metadata(id, META_ANNOTATION)
                .and_then(|json| read_stored_node(&json, &manifest.scene.id))
                .filter(|node| node.id == resource_id)
                .or_else(|| manifest.node(&resource_id).cloned());
            let Some(cached) = cached else {
                log::warn!("no stored annotation for {resource_id}; its host node is untracked");
                continue;
            };

            let host_parent = host.node(id).and_then(|node| node.parent);
            session.tracker.link(id, cached, host_parent);
            session.tracker.mark_dirty(id);
        }

        for diagnostic in &diagnostics {
            diagnostic.log();
        }
        log::info!("recovered {} tracked nodes for {}", session.tracker.len(), manifest.id);

        session.manifest = Some(manifest);
        Ok((session, diagnostics))
    }

    fn match_by_name<H>(&mut self, host: &H, manifest: &SceneManifest)
    where
        H: SceneHost<NodeId = Id>,
    {
        let language = self.config.label_language.clone();
        let mut by_name: HashMap<String, Option<&SceneNode>> = HashMap::new();
        for node in &manifest.nodes {
            by_name
                .entry(node.display_name(&language))
                .and_modify(|entry| *entry = None)
                .or_insert(Some(node));
        }

        for id in host.node_ids() {
            let Some(host_node) = host.node(id) else {
                continue;
            };
            let Some(Some(node)) = by_name.get(&host_node.name) else {
                continue;
            };
            if host_node.content.kind() != Some(node.kind()) || self.tracker.host_for(&node.id).is_some() {
                continue;
            }
            self.tracker.link(id, (*node).clone(), host_node.parent);
            self.tracker.mark_dirty(id);
        }
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ProvenanceTracker<Id> {
        &self.tracker
    }

    pub fn manifest(&self) -> Option<&SceneManifest> {
        self.manifest.as_ref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Resource a host node was imported from.
    pub fn lookup(&self, host_id: Id) -> Option<&str> {
        self.tracker.lookup(host_id)
    }

    /// Flags a node as edited for hosts that report edits out of band.
    pub fn mark_dirty(&mut self, host_id: Id) -> bool {
        self.tracker.mark_dirty(host_id)
    }
}

fn read_stored_node(json: &str, scene_id: &str) -> Option<SceneNode> {
    let value = serde_json::from_str(json).ok()?;
    match parse_node(value, scene_id) {
        Ok(node) => node,
        Err(err) => {
            log::warn!("stored annotation is unreadable: {err}");
            None
        }
    }
}

/// World matrix of a host node, composed from the snapshot in `nodes`.
pub(super) fn host_world_matrix<Id, A>(nodes: &HashMap<Id, HostNode<Id, A>>, id: Id) -> DMat4
where
    Id: Copy + Eq + Hash,
{
    let mut world = DMat4::IDENTITY;
    let mut visited = HashSet::new();
    let mut current = Some(id);

    while let Some(node_id) = current {
        if !visited.insert(node_id) {
            break;
        }
        let Some(node) = nodes.get(&node_id) else {
            break;
        };
        world = node.transform.to_matrix() * world;
        current = node.parent;
    }

    world
}
