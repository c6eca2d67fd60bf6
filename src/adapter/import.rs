use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use glam::DMat4;
use itertools::Itertools;

use crate::adapter::content::{has_view_frame, into_view_frames, is_materializable, to_host_content};
use crate::adapter::host::{HostNode, SceneHost, META_ANNOTATION, META_MANIFEST, META_RESOURCE_ID};
use crate::adapter::session::{ImportReport, TranscodeSession};
use crate::error::{Diagnostic, TranscodeError};
use crate::manifest::parser::parse_manifest;
use crate::manifest::serializer::{serialize_node, to_json_string};
use crate::manifest::{LookAt, NodeContent, SceneManifest, SceneNode};
use crate::math::coordinates::to_host_space_with_tolerance;
use crate::math::{look_rotation, Transform3D};

impl<Id> TranscodeSession<Id>
where
    Id: Copy + Eq + Hash + Debug,
{
    /// Parses `json` and imports it. Parser diagnostics come first in the
    /// report.
    pub fn import_json<H>(&mut self, host: &mut H, json: &str) -> Result<ImportReport<Id>, TranscodeError>
    where
        H: SceneHost<NodeId = Id>,
    {
        let parsed = parse_manifest(json)?;
        let mut report = self.import(host, parsed.manifest)?;

        let mut diagnostics = parsed.diagnostics;
        diagnostics.append(&mut report.diagnostics);
        report.diagnostics = diagnostics;
        Ok(report)
    }

    /// Materializes every node of `manifest` in the host.
    ///
    /// Nodes already linked to a live host node are updated in place, so
    /// importing the same manifest twice leaves the host unchanged. Tracked
    /// nodes whose resource is missing from `manifest` are removed.
    pub fn import<H>(&mut self, host: &mut H, manifest: SceneManifest) -> Result<ImportReport<Id>, TranscodeError>
    where
        H: SceneHost<NodeId = Id>,
    {
        let materializable = manifest
            .nodes
            .iter()
            .filter(|node| is_materializable(&node.content))
            .count();
        if materializable == 0 && !(manifest.nodes.is_empty() && manifest.unsupported_items().next().is_none()) {
            return Err(TranscodeError::UnsupportedFeature(format!(
                "{} contains nothing this host can represent",
                manifest.id
            )));
        }

        self.tracker.retain_live(|id| host.node(id).is_some());

        let mut report = ImportReport {
            created: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            skipped: Vec::new(),
            diagnostics: Vec::new(),
        };
        let mut materialized: HashMap<&str, Id> = HashMap::new();

        // Parents have to exist before their children.
        let ordered = manifest
            .nodes
            .iter()
            .sorted_by_key(|node| manifest.ancestors(&node.id).len());

        for node in ordered {
            let host_content = match node.content {
                NodeContent::Model(ref model) => {
                    let asset = host.asset(&model.id);
                    if asset.is_none() {
                        report.diagnostics.push(Diagnostic::AssetUnavailable {
                            resource_id: node.id.clone(),
                            uri: model.id.clone(),
                        });
                    }
                    to_host_content(&node.content, asset)
                }
                _ => to_host_content(&node.content, None),
            };
            let Some(host_content) = host_content else {
                report.diagnostics.push(Diagnostic::unsupported(
                    Some(&node.id),
                    format!("{} has no counterpart in the host", describe(&node.content)),
                ));
                report.skipped.push(node.id.clone());
                continue;
            };

            // The nearest ancestor that made it into the host becomes the host parent.
            let ancestor = manifest
                .ancestors(&node.id)
                .into_iter()
                .find_map(|ancestor| materialized.get(ancestor.id.as_str()).map(|&host_id| (ancestor, host_id)));
            let host_parent = ancestor.map(|(_, host_id)| host_id);

            let ancestor_node = ancestor.map(|(ancestor, _)| ancestor);
            let local = self.local_transform(&manifest, node, ancestor_node, &mut report);
            let (converted, warning) = to_host_space_with_tolerance(&local, self.config.normalization_tolerance);
            let transform = into_view_frames(
                converted,
                ancestor_node.is_some_and(|ancestor| has_view_frame(&ancestor.content)),
                has_view_frame(&node.content),
            );
            if let Some(warning) = warning {
                report.diagnostics.push(Diagnostic::CoordinateNormalization {
                    resource_id: node.id.clone(),
                    length: warning.length,
                });
            }

            let host_node = HostNode {
                name: node.display_name(&self.config.label_language),
                parent: host_parent,
                transform,
                content: host_content,
            };

            let existing = self.tracker.host_for(&node.id);
            let host_id = match existing {
                Some(host_id) if host.update_node(host_id, host_node.clone()) => {
                    report.updated.push(host_id);
                    host_id
                }
                _ => {
                    let host_id = host.create_node(host_node);
                    report.created.push(host_id);
                    host_id
                }
            };
            host.clear_edited(host_id);

            if host.supports_metadata() {
                let annotation = serialize_node(node, &manifest.scene.id).to_string();
                host.set_node_metadata(host_id, META_RESOURCE_ID, Some(&node.id));
                host.set_node_metadata(host_id, META_ANNOTATION, Some(&annotation));
            }

            self.tracker.link(host_id, node.clone(), host_parent);
            materialized.insert(node.id.as_str(), host_id);
        }

        let stale: Vec<Id> = self
            .tracker
            .iter()
            .filter(|(_, record)| !materialized.contains_key(record.resource_id.as_str()))
            .sorted_by(|(_, a), (_, b)| a.resource_id.cmp(&b.resource_id))
            .map(|(host_id, _)| host_id)
            .collect();
        for host_id in stale {
            if let Some(record) = self.tracker.unlink(host_id) {
                log::info!("{} is no longer in the manifest, removing its host node", record.resource_id);
                host.remove_node(host_id);
                report.removed.push(record.resource_id);
            }
        }

        if host.supports_metadata() {
            let json = to_json_string(&manifest, false)?;
            host.set_scene_metadata(META_MANIFEST, Some(&json));
        }
        host.set_background(manifest.scene.background_color.map(|color| color.to_unit()));

        for diagnostic in &report.diagnostics {
            diagnostic.log();
        }
        log::info!(
            "imported {}: {} created, {} updated, {} removed, {} skipped",
            manifest.id,
            report.created.len(),
            report.updated.len(),
            report.removed.len(),
            report.skipped.len()
        );

        self.manifest = Some(manifest);
        Ok(report)
    }

    /// Transform of `node` relative to `ancestor`, its nearest materialized
    /// ancestor. A `lookAt` replaces the node's rotation.
    fn local_transform(
        &self,
        manifest: &SceneManifest,
        node: &SceneNode,
        ancestor: Option<&SceneNode>,
        report: &mut ImportReport<Id>,
    ) -> Transform3D {
        let direct_ancestor = manifest.ancestors(&node.id).first().map(|parent| parent.id.clone());
        let ancestor_world = ancestor
            .and_then(|ancestor| manifest.world_matrix(&ancestor.id))
            .unwrap_or(DMat4::IDENTITY);
        let world = manifest
            .world_matrix(&node.id)
            .unwrap_or_else(|| node.transform.to_matrix());

        let mut local = if direct_ancestor.as_deref() == ancestor.map(|ancestor| ancestor.id.as_str()) {
            node.transform
        } else {
            Transform3D::relative_to(world, ancestor_world)
        };

        let target = match node.content.look_at() {
            None => None,
            Some(LookAt::Point(point)) => Some(*point),
            Some(LookAt::Annotation(reference)) => {
                let position = manifest.world_position(reference);
                if position.is_none() {
                    report.diagnostics.push(Diagnostic::UnresolvedReference {
                        resource_id: node.id.clone(),
                        reference: reference.clone(),
                    });
                }
                position
            }
        };

        if let Some(target) = target {
            let world = Transform3D::from_matrix(world);
            match look_rotation(world.translation, target) {
                Some(rotation) => {
                    local = Transform3D::relative_to(world.with_rotation(rotation).to_matrix(), ancestor_world);
                }
                None => log::warn!("{} looks at its own position, keeping its rotation", node.id),
            }
        }

        local
    }
}

fn describe(content: &NodeContent) -> String {
    match content {
        NodeContent::Model(_) => "model".to_string(),
        NodeContent::Camera(camera) => camera.projection.iiif_type().to_string(),
        NodeContent::Light(light) => light.kind.iiif_type().to_string(),
    }
}
