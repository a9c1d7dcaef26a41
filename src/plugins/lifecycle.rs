// src/plugins/lifecycle.rs
//
// §4.D activate/deactivate/delete. Each operation keeps the on-disk
// activation state and the in-memory registry consistent, releasing the
// state file write even when the import step fails.

use super::discovery::{self, DiscoveryReport, PluginEntryPoint};
use super::hooks::{self, HookEntry};
use super::manifest::ActivationState;
use crate::error::PluginError;
use crate::registry::Registry;
use std::path::{Path, PathBuf};

fn state_file_path(plugins_root: &Path) -> PathBuf {
    plugins_root.join("plugins_state.json")
}

fn load_state(plugins_root: &Path) -> ActivationState {
    ActivationState::load(&state_file_path(plugins_root))
}

fn save_state(plugins_root: &Path, state: &ActivationState) -> Result<(), PluginError> {
    state
        .save(&state_file_path(plugins_root))
        .map_err(|e| PluginError::StateIo {
            path: state_file_path(plugins_root).display().to_string(),
            source: e,
        })
}

/// Mark `plugin_id` active in the state file and import it.
pub fn activate(
    plugins_root: &Path,
    plugin_id: &str,
    registry: &Registry,
    entry_points: &[PluginEntryPoint],
    hook_table: &[HookEntry],
) -> Result<DiscoveryReport, PluginError> {
    let mut state = load_state(plugins_root);
    state.set_active(plugin_id);
    save_state(plugins_root, &state)?;

    let report = discovery::import_one(plugin_id, registry, entry_points);
    hooks::run_on_activate(hook_table, plugin_id);
    Ok(report)
}

/// Mark `plugin_id` inactive and reload the whole registry from scratch.
/// Discovery cannot tell which types a given plugin contributed once it has
/// already been forgotten, so the only way to guarantee the deactivated
/// plugin's types are gone is to clear everything and re-walk (§4.D, §9).
pub fn deactivate(
    plugins_root: &Path,
    plugin_id: &str,
    registry: &Registry,
    entry_points: &[PluginEntryPoint],
    hook_table: &[HookEntry],
) -> Result<Vec<DiscoveryReport>, PluginError> {
    let mut state = load_state(plugins_root);
    state.set_inactive(plugin_id);
    save_state(plugins_root, &state)?;

    registry.clear();
    let reports = discovery::discover(plugins_root, registry, entry_points);
    hooks::run_on_deactivate(hook_table, plugin_id);
    Ok(reports)
}

/// Refuse unless `plugin_id` is currently inactive; then remove its
/// directory and drop its state-file entry.
pub fn delete(
    plugins_root: &Path,
    plugin_id: &str,
    hook_table: &[HookEntry],
) -> Result<(), PluginError> {
    let mut state = load_state(plugins_root);
    if state.is_active(plugin_id) {
        return Err(PluginError::ActiveDeleteRefused {
            id: plugin_id.to_string(),
        });
    }

    let Some((project, slug)) = plugin_id.split_once('/') else {
        return Err(PluginError::NotFound {
            id: plugin_id.to_string(),
        });
    };
    let plugin_dir = plugins_root.join(project).join("nodes").join(slug);
    if plugin_dir.is_dir() {
        let _ = std::fs::remove_dir_all(&plugin_dir);
    } else {
        let plugin_file = plugins_root.join(project).join("nodes").join(format!("{slug}.rs"));
        let _ = std::fs::remove_file(&plugin_file);
    }

    state.remove(plugin_id);
    save_state(plugins_root, &state)?;
    hooks::run_on_uninstall(hook_table, plugin_id);
    Ok(())
}
