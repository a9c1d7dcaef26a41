//! Workflow document loading: YAML/JSON on disk in, [`crate::model::Workflow`]
//! out.
//!
//! The canonical on-disk form is YAML (VCS-friendly); JSON is accepted on the
//! same code path since both are self-describing to serde and the file
//! extension is the only thing that picks the parser.

use crate::error::WorkflowLoadError;
use crate::model::Workflow;
use std::fs;
use std::path::Path;

/// Load a workflow document. `.json`-suffixed paths parse as JSON; anything
/// else parses as YAML, since that is the more common extension in practice
/// (`.yaml`/`.yml`/no extension).
pub fn load(path: impl AsRef<Path>) -> Result<Workflow, WorkflowLoadError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| WorkflowLoadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        use serde::de::Error as _;
        serde_json::from_str(&raw).map_err(|e| WorkflowLoadError::Parse {
            path: path.display().to_string(),
            source: serde_yaml::Error::custom(e.to_string()),
        })
    } else {
        serde_yaml::from_str(&raw).map_err(|e| WorkflowLoadError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// Serialize a workflow back to YAML, the canonical round-trip form.
pub fn to_yaml_string(workflow: &Workflow) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(workflow)
}

pub fn save(path: impl AsRef<Path>, workflow: &Workflow) -> Result<(), WorkflowLoadError> {
    let path = path.as_ref();
    let yaml = to_yaml_string(workflow).map_err(|e| WorkflowLoadError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    fs::write(path, yaml).map_err(|e| WorkflowLoadError::Io {
        path: path.display().to_string(),
        source: e,
    })
}
