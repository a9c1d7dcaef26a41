// src/registry.rs
//
// §4.B Node registry: process-wide map from node type to spec + executor.
// Lifecycle operations (discovery, activate/deactivate, direct register)
// take the exclusive write path; a running execution takes a `snapshot()`
// once at construction and reads from that immutable copy for its whole
// run, per §5's shared-read/exclusive-write split.

use crate::model::{NodeSpec, Params, PortValues};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// A callable node implementation. `params` are the node's configured
/// literal values; `inputs` are the fan-in result for this invocation.
pub trait NodeExecutor: Send + Sync {
    fn call(&self, params: &Params, inputs: &PortValues) -> anyhow::Result<PortValues>;
}

impl<F> NodeExecutor for F
where
    F: Fn(&Params, &PortValues) -> anyhow::Result<PortValues> + Send + Sync,
{
    fn call(&self, params: &Params, inputs: &PortValues) -> anyhow::Result<PortValues> {
        self(params, inputs)
    }
}

/// An immutable point-in-time copy of the registry, handed to a single
/// `execute()` call so concurrent lifecycle writes never perturb an
/// in-flight execution (§5).
#[derive(Clone)]
pub struct RegistrySnapshot {
    specs: BTreeMap<String, NodeSpec>,
    executors: BTreeMap<String, Arc<dyn NodeExecutor>>,
}

impl RegistrySnapshot {
    pub fn spec(&self, node_type: &str) -> Option<&NodeSpec> {
        self.specs.get(node_type)
    }

    pub fn executor(&self, node_type: &str) -> Option<&Arc<dyn NodeExecutor>> {
        self.executors.get(node_type)
    }

    pub fn has_spec(&self, node_type: &str) -> bool {
        self.specs.contains_key(node_type)
    }

    pub fn has_executor(&self, node_type: &str) -> bool {
        self.executors.contains_key(node_type)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.specs.keys()
    }
}

struct Inner {
    specs: BTreeMap<String, NodeSpec>,
    executors: BTreeMap<String, Arc<dyn NodeExecutor>>,
}

/// The process-wide registry. Cheap to clone (it's a handle over an
/// `Arc<RwLock<..>>`); all clones observe the same underlying state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: Arc::new(RwLock::new(Inner {
                specs: BTreeMap::new(),
                executors: BTreeMap::new(),
            })),
        }
    }

    /// Register a spec and optional executor. A loop-container spec has no
    /// executor: the driver handles it structurally (§3 Registry).
    /// Re-registering an existing type overwrites and logs a warning rather
    /// than failing (§4.B).
    pub fn register(&self, spec: NodeSpec, executor: Option<Arc<dyn NodeExecutor>>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.specs.contains_key(&spec.node_type) {
            log::warn!(
                "registry: duplicate registration of node type '{}', overwriting",
                spec.node_type
            );
        }
        let node_type = spec.node_type.clone();
        inner.specs.insert(node_type.clone(), normalize(spec));
        if let Some(exec) = executor {
            inner.executors.insert(node_type, exec);
        } else {
            inner.executors.remove(&node_type);
        }
    }

    /// Silent on miss (§4.B).
    pub fn unregister(&self, node_type: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.specs.remove(node_type);
        inner.executors.remove(node_type);
    }

    /// Remove every registered type. Used by plugin deactivation's
    /// clear-and-reload strategy (§4.D, §9).
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.specs.clear();
        inner.executors.clear();
    }

    pub fn type_keys(&self) -> std::collections::BTreeSet<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.specs.keys().cloned().collect()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.specs.contains_key(node_type)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.inner.read().expect("registry lock poisoned");
        RegistrySnapshot {
            specs: inner.specs.clone(),
            executors: inner.executors.clone(),
        }
    }
}

fn normalize(mut spec: NodeSpec) -> NodeSpec {
    for port in spec.inputs.iter_mut() {
        if port.default.is_some() {
            port.required = false;
        } else if !port.required {
            // Neither default nor explicit `required: true` was given:
            // required is the default (§4.B: "defaults to required").
            port.required = true;
        }
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortSpec;

    fn spec(node_type: &str) -> NodeSpec {
        NodeSpec {
            node_type: node_type.to_string(),
            label: node_type.to_string(),
            category: String::new(),
            description: String::new(),
            doc: String::new(),
            mode: String::new(),
            inputs: vec![],
            outputs: vec![],
        }
    }

    #[test]
    fn register_then_unregister_restores_empty_registry() {
        let reg = Registry::new();
        reg.register(spec("a"), None);
        reg.unregister("a");
        assert!(reg.snapshot().type_names().next().is_none());
    }

    #[test]
    fn unregister_unknown_type_is_silent() {
        let reg = Registry::new();
        reg.unregister("does-not-exist");
    }

    #[test]
    fn clear_removes_every_type() {
        let reg = Registry::new();
        reg.register(spec("a"), None);
        reg.register(spec("b"), None);
        reg.clear();
        assert!(reg.type_keys().is_empty());
    }

    #[test]
    fn port_with_default_becomes_non_required_even_if_flagged_required() {
        let mut s = spec("with-default");
        s.inputs.push(PortSpec {
            name: "x".into(),
            type_tag: "number".into(),
            required: true,
            default: Some(crate::model::Value::Int(1)),
        });
        let reg = Registry::new();
        reg.register(s, None);
        let snap = reg.snapshot();
        assert!(!snap.spec("with-default").unwrap().inputs[0].is_required());
    }
}
