//! Build configuration document and builder settings.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::snapshots::DEFAULT_RETENTION;
use crate::ENGINE_VERSION;

/// The per-system config document materialized as `data.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub system_name: String,
    pub system_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_version: Option<String>,
    /// Forwarded to the engine untouched, key order preserved.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub blueprint_meta: Map<String, Value>,
    #[serde(default)]
    pub data: Vec<Host>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    pub ip: String,
    pub user: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_ssh_key_b64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars: Option<Map<String, Value>>,
}

impl BuildConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::config_at(format!("invalid config document: {e}"), path))
    }

    /// Distinct host groups, sorted.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .data
            .iter()
            .flat_map(|h| h.groups.iter().cloned())
            .collect();
        groups.sort();
        groups.dedup();
        groups
    }
}

/// Explicit roots and knobs for one invocation; nothing is read from the
/// process working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderSettings {
    pub blueprints_root: PathBuf,
    pub builds_root: PathBuf,
    pub engine_version: String,
    pub snapshot_retention: usize,
}

impl BuilderSettings {
    /// `<root>/blueprints` and `<root>/builds`, current engine, default retention.
    pub fn from_root(root: &Path) -> Self {
        Self {
            blueprints_root: root.join("blueprints"),
            builds_root: root.join("builds"),
            engine_version: ENGINE_VERSION.to_string(),
            snapshot_retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_engine_version(mut self, engine_version: impl Into<String>) -> Self {
        self.engine_version = engine_version.into();
        self
    }

    pub fn with_retention(mut self, keep: usize) -> Self {
        self.snapshot_retention = keep;
        self
    }
}
