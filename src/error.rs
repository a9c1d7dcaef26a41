// src/error.rs
//
// Library-surface error types. Each carries the structured fields the
// contract names instead of collapsing into a formatted string, so a caller
// can match on `node_id`/`node_type`/`reason` directly.

use thiserror::Error;

/// Returned by `driver::execute`. Mirrors the three raised-error kinds: Node
/// Unavailable, executor exception (wrapped as `ExecutorFailed`), and the
/// loop-pairing failure the driver can hit even though the validator already
/// warns about it separately.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Node '{node_id}' uses type '{node_type}' which is {reason}")]
    NodeUnavailable {
        node_id: String,
        node_type: String,
        reason: String,
    },

    #[error("node '{node_id}' failed: {message}")]
    ExecutorFailed { node_id: String, message: String },

    #[error("loop start node '{node_id}' has no paired end node")]
    UnpairedLoop { node_id: String },
}

/// Failures while loading a workflow or manifest document. Shape errors only
/// (missing/mistyped fields); semantic well-formedness is the validator's
/// job, not this type's.
#[derive(Debug, Error)]
pub enum WorkflowLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Plugin lifecycle failures (§7 "Lifecycle error").
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{id}' must be deactivated before deletion")]
    ActiveDeleteRefused { id: String },

    #[error("plugin '{id}' not found")]
    NotFound { id: String },

    #[error("failed to read plugin state file {path}: {source}")]
    StateIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
