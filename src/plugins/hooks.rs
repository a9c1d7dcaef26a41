// src/plugins/hooks.rs
//
// §4.D lifecycle hooks: `on_activate`, `on_deactivate`, `on_uninstall`.
// Looked up by plugin id in a statically linked table (the compiled
// counterpart of an optional hook module) and invoked at the matching
// transition. Hook failures are logged and swallowed, never propagated.

use std::sync::Arc;

#[derive(Default, Clone)]
pub struct PluginHooks {
    pub on_activate: Option<Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>>,
    pub on_deactivate: Option<Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>>,
    pub on_uninstall: Option<Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>>,
}

pub struct HookEntry {
    pub id: &'static str,
    pub hooks: PluginHooks,
}

pub fn find<'a>(table: &'a [HookEntry], plugin_id: &str) -> Option<&'a PluginHooks> {
    table.iter().find(|e| e.id == plugin_id).map(|e| &e.hooks)
}

fn invoke(name: &str, plugin_id: &str, hook: &Option<Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>>) {
    let Some(hook) = hook else { return };
    if let Err(err) = hook() {
        log::error!("plugin '{plugin_id}' {name} hook failed: {err}");
    }
}

pub fn run_on_activate(table: &[HookEntry], plugin_id: &str) {
    if let Some(hooks) = find(table, plugin_id) {
        invoke("on_activate", plugin_id, &hooks.on_activate);
    }
}

pub fn run_on_deactivate(table: &[HookEntry], plugin_id: &str) {
    if let Some(hooks) = find(table, plugin_id) {
        invoke("on_deactivate", plugin_id, &hooks.on_deactivate);
    }
}

pub fn run_on_uninstall(table: &[HookEntry], plugin_id: &str) {
    if let Some(hooks) = find(table, plugin_id) {
        invoke("on_uninstall", plugin_id, &hooks.on_uninstall);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn failing_hook_does_not_panic() {
        let table = vec![HookEntry {
            id: "demo/sorter",
            hooks: PluginHooks {
                on_activate: Some(Arc::new(|| anyhow::bail!("boom"))),
                on_deactivate: None,
                on_uninstall: None,
            },
        }];
        run_on_activate(&table, "demo/sorter");
    }

    #[test]
    fn successful_hook_runs_once() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let table = vec![HookEntry {
            id: "demo/sorter",
            hooks: PluginHooks {
                on_activate: Some(Arc::new(move || {
                    ran_clone.store(true, Ordering::SeqCst);
                    Ok(())
                })),
                on_deactivate: None,
                on_uninstall: None,
            },
        }];
        run_on_activate(&table, "demo/sorter");
        assert!(ran.load(Ordering::SeqCst));
    }
}
