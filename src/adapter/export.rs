use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use glam::{DMat4, DVec3};

use crate::adapter::content::{content_from_host, is_materializable, out_of_view_frames};
use crate::adapter::host::{HostNode, SceneHost, META_ANNOTATION, META_RESOURCE_ID};
use crate::adapter::session::{host_world_matrix, ExportReport, TranscodeSession};
use crate::error::{Diagnostic, TranscodeError};
use crate::manifest::serializer::{serialize, serialize_node};
use crate::manifest::{Color, LanguageMap, LookAt, SceneManifest, SceneNode, PAINTING};
use crate::math::coordinates::to_manifest_space_with_tolerance;
use crate::math::{HostTransform, Transform3D};

impl<Id> TranscodeSession<Id>
where
    Id: Copy + Eq + Hash + Debug,
{
    /// Serializes the export to JSON, pretty-printed per the configuration.
    pub fn export_json<H>(&mut self, host: &mut H) -> Result<(String, ExportReport<Id>), TranscodeError>
    where
        H: SceneHost<NodeId = Id>,
    {
        let report = self.export(host)?;
        let json = report.to_json_string(self.config.pretty)?;
        Ok((json, report))
    }

    /// Builds a manifest from the current host scene.
    ///
    /// Clean tracked nodes are copied from the import cache untouched. Dirty
    /// ones are re-derived from the host, as is every exported ancestor of a
    /// dirty node. Deleted nodes are dropped for good.
    pub fn export<H>(&mut self, host: &mut H) -> Result<ExportReport<Id>, TranscodeError>
    where
        H: SceneHost<NodeId = Id>,
    {
        let base = self.manifest.clone().ok_or(TranscodeError::NoManifest)?;
        let mut diagnostics = Vec::new();

        let deleted = self.tracker.retain_live(|id| host.node(id).is_some());
        for resource_id in &deleted {
            log::info!("{resource_id} was deleted in the host and leaves the manifest");
        }

        let ids = host.node_ids();
        let nodes: HashMap<Id, HostNode<Id, H::Asset>> =
            ids.iter().filter_map(|&id| host.node(id).map(|node| (id, node))).collect();

        // Decide which host nodes take part.
        let adopt_untracked = self.config.include_untracked || self.degraded;
        let mut exported = Vec::new();
        let mut adopted = Vec::new();
        let mut excluded = Vec::new();
        for &id in &ids {
            let Some(node) = nodes.get(&id) else {
                continue;
            };
            if !has_usable_scale(node.transform.scale) {
                diagnostics.push(Diagnostic::unsupported(
                    self.tracker.lookup(id),
                    format!("host node {id:?} has degenerate scale {}", node.transform.scale),
                ));
                excluded.push(id);
                continue;
            }
            match self.tracker.record(id) {
                Some(record) => {
                    let expected = record.cached.kind();
                    if node.content.kind() != Some(expected) {
                        diagnostics.push(Diagnostic::ProvenanceConflict {
                            resource_id: record.resource_id.clone(),
                            expected,
                            found: node.content.describe().to_string(),
                        });
                        excluded.push(id);
                        continue;
                    }
                    if host.is_edited(id) {
                        self.tracker.mark_dirty(id);
                    }
                    exported.push(id);
                }
                None if adopt_untracked && node.content.kind().is_some() => {
                    exported.push(id);
                    adopted.push(id);
                }
                None => excluded.push(id),
            }
        }
        if !excluded.is_empty() {
            log::warn!("{} host nodes are not part of the exported manifest", excluded.len());
        }

        let resource_ids = self.assign_resource_ids(&base, &exported, &adopted);
        let exported_set: HashSet<Id> = exported.iter().copied().collect();
        let parents: HashMap<Id, Option<Id>> = exported
            .iter()
            .map(|&id| (id, export_parent(&nodes, &exported_set, id)))
            .collect();

        self.mark_structural_changes(&base, &exported, &parents, &resource_ids);

        // Build the annotation of every exported host node.
        let language = self.config.label_language.clone();
        let mut built: HashMap<String, SceneNode> = HashMap::new();
        for &id in &exported {
            let resource_id = &resource_ids[&id];
            let record = self.tracker.record(id);
            if let Some(record) = record.filter(|record| !record.dirty) {
                built.insert(resource_id.clone(), record.cached.clone());
                continue;
            }

            let host_node = &nodes[&id];
            let parent = parents[&id];
            let relative = if parent == host_node.parent {
                host_node.transform
            } else {
                let parent_world = parent
                    .map(|parent| host_world_matrix(&nodes, parent))
                    .unwrap_or(DMat4::IDENTITY);
                HostTransform::relative_to(host_world_matrix(&nodes, id), parent_world)
            };
            let parent_view = parent.is_some_and(|parent| nodes[&parent].content.has_view_frame());
            let relative = out_of_view_frames(relative, parent_view, host_node.content.has_view_frame());
            let (transform, warning) =
                to_manifest_space_with_tolerance(&relative, self.config.normalization_tolerance);
            if let Some(warning) = warning {
                diagnostics.push(Diagnostic::CoordinateNormalization {
                    resource_id: resource_id.clone(),
                    length: warning.length,
                });
            }
            let Some((transform, mirrored)) = transform.fold_negative_scale() else {
                diagnostics.push(Diagnostic::unsupported(
                    Some(resource_id),
                    format!("degenerate scale {}, the node is left out", transform.scale),
                ));
                continue;
            };
            if mirrored {
                diagnostics.push(Diagnostic::unsupported(
                    Some(resource_id),
                    "mirrored in the host, exported without the reflection",
                ));
            }

            let cached = record.map(|record| &record.cached);
            let Some(content) = content_from_host(cached.map(|node| &node.content), &host_node.content) else {
                continue;
            };
            let label = match cached {
                Some(cached) if cached.display_name(&language) == host_node.name => cached.label.clone(),
                _ => Some(LanguageMap::new(language.as_str(), host_node.name.as_str())),
            };

            let node = SceneNode {
                id: resource_id.clone(),
                label,
                motivation: cached
                    .map(|cached| cached.motivation.clone())
                    .unwrap_or_else(|| vec![PAINTING.to_string()]),
                content,
                transform,
                parent: parent.map(|parent| resource_ids[&parent].clone()),
                extras: cached.map(|cached| cached.extras.clone()).unwrap_or_default(),
            };
            log::debug!("{} re-derived from host node {id:?}", node.id);
            built.insert(resource_id.clone(), node);
        }

        // Base order first, then nodes the base manifest doesn't know.
        let mut output = Vec::with_capacity(built.len());
        for base_node in &base.nodes {
            if let Some(node) = built.remove(&base_node.id) {
                output.push(node);
            } else if !is_materializable(&base_node.content) {
                output.push(base_node.clone());
            }
        }
        for &id in &exported {
            if let Some(node) = built.remove(&resource_ids[&id]) {
                output.push(node);
            }
        }
        reattach_orphans(&base, &mut output, &mut diagnostics);

        for &id in &adopted {
            let Some(node) = output.iter().find(|node| node.id == resource_ids[&id]) else {
                continue;
            };
            log::info!("host node {id:?} exported as new annotation {}", node.id);
            if host.supports_metadata() {
                let annotation = serialize_node(node, &base.scene.id).to_string();
                host.set_node_metadata(id, META_RESOURCE_ID, Some(&node.id));
                host.set_node_metadata(id, META_ANNOTATION, Some(&annotation));
            }
            self.tracker.link(id, node.clone(), parents[&id]);
            host.clear_edited(id);
        }

        let mut manifest = SceneManifest {
            nodes: output,
            ..base
        };
        manifest.scene.background_color = host.background().map(Color::from_unit);

        for diagnostic in &diagnostics {
            diagnostic.log();
        }
        log::info!(
            "exported {} with {} nodes, {} excluded, {} deleted",
            manifest.id,
            manifest.nodes.len(),
            excluded.len(),
            deleted.len()
        );
        log::trace!("{}", serialize(&manifest));

        Ok(ExportReport {
            manifest,
            excluded,
            deleted,
            diagnostics,
        })
    }

    /// Resource id per exported node; adopted nodes get fresh ids under the
    /// scene id.
    fn assign_resource_ids(&self, base: &SceneManifest, exported: &[Id], adopted: &[Id]) -> HashMap<Id, String> {
        let mut taken: HashSet<String> = base.nodes.iter().map(|node| node.id.clone()).collect();
        taken.extend(base.unsupported_ids().into_iter().map(str::to_string));
        taken.extend(self.tracker.iter().map(|(_, record)| record.resource_id.clone()));

        let mut resource_ids = HashMap::new();
        for &id in exported {
            if let Some(resource_id) = self.tracker.lookup(id) {
                resource_ids.insert(id, resource_id.to_string());
            }
        }

        let mut counter = 0;
        for &id in adopted {
            let resource_id = loop {
                counter += 1;
                let candidate = format!("{}/annotation/{counter}", base.scene.id);
                if taken.insert(candidate.clone()) {
                    break candidate;
                }
            };
            resource_ids.insert(id, resource_id);
        }
        resource_ids
    }

    /// Dirties tracked nodes whose place in the hierarchy or `lookAt` target
    /// changed, then every exported ancestor of a dirty node.
    fn mark_structural_changes(
        &mut self,
        base: &SceneManifest,
        exported: &[Id],
        parents: &HashMap<Id, Option<Id>>,
        resource_ids: &HashMap<Id, String>,
    ) {
        let mut live_resources: HashSet<&str> = resource_ids.values().map(String::as_str).collect();
        live_resources.extend(base.unsupported_ids());
        live_resources.extend(
            base.nodes
                .iter()
                .filter(|node| !is_materializable(&node.content))
                .map(|node| node.id.as_str()),
        );

        for &id in exported {
            let Some(record) = self.tracker.record(id) else {
                continue;
            };
            let reparented = record.host_parent != parents[&id];
            let lost_target = match record.cached.content.look_at() {
                Some(LookAt::Annotation(target)) => !live_resources.contains(target.as_str()),
                _ => false,
            };
            if reparented || lost_target {
                self.tracker.mark_dirty(id);
            }
        }

        let dirty: Vec<Id> = exported.iter().copied().filter(|&id| self.tracker.is_dirty(id)).collect();
        for id in dirty {
            let mut current = parents[&id];
            while let Some(parent) = current {
                if self.tracker.record(parent).is_some_and(|record| record.dirty) {
                    break;
                }
                self.tracker.mark_dirty(parent);
                current = parents.get(&parent).copied().flatten();
            }
        }
    }
}

/// Zero or non-finite factors have no manifest form. Negative ones do.
fn has_usable_scale(scale: DVec3) -> bool {
    scale.is_finite() && scale.abs().min_element() > 0.0
}

/// Nearest ancestor of `id` in the host that is part of the export.
fn export_parent<Id, A>(nodes: &HashMap<Id, HostNode<Id, A>>, exported: &HashSet<Id>, id: Id) -> Option<Id>
where
    Id: Copy + Eq + Hash,
{
    let mut visited = HashSet::from([id]);
    let mut current = nodes.get(&id).and_then(|node| node.parent);
    while let Some(parent) = current {
        if exported.contains(&parent) {
            return Some(parent);
        }
        if !visited.insert(parent) {
            break;
        }
        current = nodes.get(&parent).and_then(|node| node.parent);
    }
    None
}

/// Points nodes whose parent did not make it into the output at their nearest
/// surviving ancestor, keeping their placement from `base`.
fn reattach_orphans(base: &SceneManifest, output: &mut [SceneNode], diagnostics: &mut Vec<Diagnostic>) {
    let mut present: HashSet<String> = output.iter().map(|node| node.id.clone()).collect();
    present.extend(base.unsupported_ids().into_iter().map(str::to_string));

    for node in output.iter_mut() {
        let Some(parent) = node.parent.clone() else {
            continue;
        };
        if present.contains(&parent) {
            continue;
        }

        let ancestor = base
            .ancestors(&node.id)
            .into_iter()
            .find(|ancestor| present.contains(&ancestor.id))
            .map(|ancestor| ancestor.id.clone());
        if let Some(world) = base.world_matrix(&node.id) {
            let ancestor_world = ancestor
                .as_deref()
                .and_then(|ancestor| base.world_matrix(ancestor))
                .unwrap_or(DMat4::IDENTITY);
            node.transform = Transform3D::relative_to(world, ancestor_world);
        }
        diagnostics.push(Diagnostic::UnresolvedReference {
            resource_id: node.id.clone(),
            reference: parent,
        });
        node.parent = ancestor;
    }
}
