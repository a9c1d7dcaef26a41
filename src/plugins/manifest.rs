// src/plugins/manifest.rs
//
// §4.C / §6 manifest and activation-state shapes. Project and plugin
// manifests merge shallowly (plugin fields win); the activation state file
// only ever records the non-default ("inactive") entries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectManifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

/// A plugin-level manifest. Every field is optional: an absent field falls
/// back to the project manifest's value during the merge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PluginManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Shallow merge: `plugin` overrides `project` field-by-field when present.
pub fn merge(project: &ProjectManifest, plugin: Option<&PluginManifest>) -> ProjectManifest {
    let Some(plugin) = plugin else {
        return project.clone();
    };
    ProjectManifest {
        name: plugin.name.clone().unwrap_or_else(|| project.name.clone()),
        version: plugin
            .version
            .clone()
            .unwrap_or_else(|| project.version.clone()),
        description: plugin
            .description
            .clone()
            .unwrap_or_else(|| project.description.clone()),
    }
}

/// `"<project>/<plugin>" -> "inactive"`. Active plugins (the default) are
/// simply absent, per §6's state file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivationState(BTreeMap<String, String>);

impl ActivationState {
    pub fn load(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => ActivationState::default(),
        }
    }

    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string());
        std::fs::write(path, json)
    }

    pub fn is_active(&self, plugin_id: &str) -> bool {
        self.0.get(plugin_id).map(|s| s != "inactive").unwrap_or(true)
    }

    pub fn set_inactive(&mut self, plugin_id: &str) {
        self.0.insert(plugin_id.to_string(), "inactive".to_string());
    }

    pub fn set_active(&mut self, plugin_id: &str) {
        self.0.remove(plugin_id);
    }

    pub fn remove(&mut self, plugin_id: &str) {
        self.0.remove(plugin_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_entry_is_active_by_default() {
        let state = ActivationState::default();
        assert!(state.is_active("proj/plugin"));
    }

    #[test]
    fn set_inactive_then_active_round_trips() {
        let mut state = ActivationState::default();
        state.set_inactive("proj/plugin");
        assert!(!state.is_active("proj/plugin"));
        state.set_active("proj/plugin");
        assert!(state.is_active("proj/plugin"));
    }

    #[test]
    fn plugin_manifest_overrides_project_fields() {
        let project = ProjectManifest {
            name: "proj".into(),
            version: "1.0".into(),
            description: "a project".into(),
        };
        let plugin = PluginManifest {
            name: Some("custom-name".into()),
            version: None,
            description: None,
        };
        let merged = merge(&project, Some(&plugin));
        assert_eq!(merged.name, "custom-name");
        assert_eq!(merged.version, "1.0");
    }
}
