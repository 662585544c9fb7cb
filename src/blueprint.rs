//! Blueprint store - resolves `(type, version)` to a published directory.
//!
//! Layout under the blueprints root: `<type>/<version>/` holds the content,
//! `VERSION` and `MANIFEST.json`; `<type>/LATEST` names the default version.
//! Blueprints are shared and read-only; nothing here writes to them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::workspace::validate_component;

pub const LATEST_FILENAME: &str = "LATEST";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedBlueprint {
    pub kind: String,
    pub version: String,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BlueprintStore {
    root: PathBuf,
}

impl BlueprintStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a blueprint directory, falling back to `LATEST` when no
    /// version is requested.
    pub fn resolve(&self, kind: &str, version: Option<&str>) -> Result<ResolvedBlueprint> {
        validate_component("blueprint type", kind)?;
        let base = self.root.join(kind);

        let version = match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => v.to_string(),
            None => self.latest(kind)?,
        };
        validate_component("blueprint version", &version)?;

        let dir = base.join(&version);
        if !dir.is_dir() {
            return Err(CoreError::config_at("blueprint version not found", dir));
        }

        tracing::debug!(kind = %kind, version = %version, dir = %dir.display(), "Resolved blueprint");
        Ok(ResolvedBlueprint {
            kind: kind.to_string(),
            version,
            dir,
        })
    }

    /// Read `<type>/LATEST`.
    pub fn latest(&self, kind: &str) -> Result<String> {
        let path = self.root.join(kind).join(LATEST_FILENAME);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CoreError::config_at(
                    "no version requested and LATEST pointer is missing",
                    path,
                ));
            }
            Err(e) => return Err(CoreError::io(path, e)),
        };
        let version = raw.trim();
        if version.is_empty() {
            return Err(CoreError::config_at("LATEST pointer is empty", path));
        }
        Ok(version.to_string())
    }
}
