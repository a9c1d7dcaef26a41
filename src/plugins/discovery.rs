// src/plugins/discovery.rs
//
// §4.C Plugin discovery, walking a two-tier `<project>/nodes/<plugin>`
// layout. The reference implementation imports a Python module and watches
// its side effects; this core's equivalent is the registration-function
// convention from SPEC_FULL.md's Rust-native entry-module note: a compiled
// `pub fn register(reg: &dyn PluginRegistrar)` looked up, by plugin id, in a
// statically linked table of entry points supplied by the caller.

use super::manifest::{self, ActivationState, PluginManifest, ProjectManifest};
use crate::model::NodeSpec;
use crate::registry::{NodeExecutor, Registry};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a plugin's `register` function is handed instead of the raw
/// registry: narrows the surface to "insert a node type", matching the
/// declarative/imperative split in §4.C.
pub trait PluginRegistrar {
    fn register_node(&self, spec: NodeSpec, executor: Option<Arc<dyn NodeExecutor>>);
}

struct RegistrarHandle<'a>(&'a Registry);

impl PluginRegistrar for RegistrarHandle<'_> {
    fn register_node(&self, spec: NodeSpec, executor: Option<Arc<dyn NodeExecutor>>) {
        self.0.register(spec, executor);
    }
}

/// One statically linked plugin: its id (`"<project>/<plugin>"`) and the
/// `register` function that stands in for "importing its module."
pub struct PluginEntryPoint {
    pub id: &'static str,
    pub register: fn(&dyn PluginRegistrar),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Active,
    Inactive,
}

#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub plugin_id: String,
    pub state: PluginState,
    pub node_types: Vec<String>,
    pub error: Option<String>,
}

fn state_file_path(plugins_root: &Path) -> PathBuf {
    plugins_root.join("plugins_state.json")
}

fn project_manifest(project_dir: &Path) -> ProjectManifest {
    let path = project_dir.join("manifest.json");
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_else(|| ProjectManifest {
            name: project_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            version: String::new(),
            description: String::new(),
        })
}

fn plugin_manifest(plugin_dir: &Path) -> Option<PluginManifest> {
    let path = plugin_dir.join("manifest.json");
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
}

/// Lists plugin slugs under a project: entries of `nodes/`, falling back to
/// a single flat `nodes.rs` file beside the project manifest when `nodes/`
/// is absent (§4.C legacy fallback).
fn plugin_slugs(project_dir: &Path) -> Vec<String> {
    let nodes_dir = project_dir.join("nodes");
    if nodes_dir.is_dir() {
        let mut slugs: Vec<String> = std::fs::read_dir(&nodes_dir)
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let stem = path.file_stem()?.to_string_lossy().to_string();
                Some(stem)
            })
            .collect();
        slugs.sort();
        slugs.dedup();
        return slugs;
    }
    if project_dir.join("nodes.rs").is_file() {
        return vec!["_flat".to_string()];
    }
    vec![]
}

/// Walk `plugins_root`, consulting the activation state, merging manifests,
/// and invoking each active plugin's registration function from
/// `entry_points` while diffing the registry's type-key set before/after to
/// attribute new node types to that plugin (§4.C).
pub fn discover(
    plugins_root: &Path,
    registry: &Registry,
    entry_points: &[PluginEntryPoint],
) -> Vec<DiscoveryReport> {
    let state = ActivationState::load(&state_file_path(plugins_root));
    let mut reports = Vec::new();

    let Ok(project_dirs) = std::fs::read_dir(plugins_root) else {
        return reports;
    };

    let mut projects: Vec<PathBuf> = project_dirs
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    projects.sort();

    for project_dir in projects {
        let project_name = project_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let project = project_manifest(&project_dir);

        for slug in plugin_slugs(&project_dir) {
            let plugin_id = format!("{project_name}/{slug}");
            let plugin_dir = project_dir.join("nodes").join(&slug);
            let _merged = manifest::merge(&project, plugin_manifest(&plugin_dir).as_ref());

            if !state.is_active(&plugin_id) {
                reports.push(DiscoveryReport {
                    plugin_id,
                    state: PluginState::Inactive,
                    node_types: vec![],
                    error: None,
                });
                continue;
            }

            reports.push(import_one(&plugin_id, registry, entry_points));
        }
    }

    reports
}

/// Re-import a single already-active plugin by id (used by `activate`).
pub fn import_one(
    plugin_id: &str,
    registry: &Registry,
    entry_points: &[PluginEntryPoint],
) -> DiscoveryReport {
    let Some(entry) = entry_points.iter().find(|e| e.id == plugin_id) else {
        return DiscoveryReport {
            plugin_id: plugin_id.to_string(),
            state: PluginState::Active,
            node_types: vec![],
            error: Some(format!("no compiled entry point registered for plugin '{plugin_id}'")),
        };
    };

    let before: BTreeSet<String> = registry.type_keys();
    let registrar = RegistrarHandle(registry);
    (entry.register)(&registrar);
    let after = registry.type_keys();
    let added: Vec<String> = after.difference(&before).cloned().collect();

    DiscoveryReport {
        plugin_id: plugin_id.to_string(),
        state: PluginState::Active,
        node_types: added,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortSpec;

    fn dummy_entry(id: &'static str) -> PluginEntryPoint {
        PluginEntryPoint {
            id,
            register: |reg| {
                reg.register_node(
                    NodeSpec {
                        node_type: "dummy_type".into(),
                        label: "dummy".into(),
                        category: String::new(),
                        description: String::new(),
                        doc: String::new(),
                        mode: String::new(),
                        inputs: vec![PortSpec::new("x", "number")],
                        outputs: vec![],
                    },
                    None,
                );
            },
        }
    }

    #[test]
    fn import_one_attributes_new_types_to_the_plugin() {
        let registry = Registry::new();
        let entries = vec![dummy_entry("demo/sorter")];
        let report = import_one("demo/sorter", &registry, &entries);
        assert_eq!(report.node_types, vec!["dummy_type".to_string()]);
        assert!(report.error.is_none());
    }

    #[test]
    fn import_one_reports_error_for_unknown_entry_point() {
        let registry = Registry::new();
        let report = import_one("demo/missing", &registry, &[]);
        assert!(report.error.is_some());
        assert!(report.node_types.is_empty());
    }
}
