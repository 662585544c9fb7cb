//! Build directory - the mutable per-system working area.
//!
//! Layout under `<builds_root>/<system_name>/`:
//! `data.json`, `blueprint_version.txt`, `snapshots/`, `logs/`.
//!
//! A build directory is assumed to have a single writer. Nothing here locks:
//! two concurrent builds of the same system race on the version pointer and
//! on snapshot ordering.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{CoreError, Result};

pub const CONFIG_FILENAME: &str = "data.json";
pub const VERSION_POINTER_FILENAME: &str = "blueprint_version.txt";
pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const LOGS_DIR: &str = "logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDir {
    system_name: String,
    root: PathBuf,
}

impl BuildDir {
    pub fn open(builds_root: &Path, system_name: &str) -> Result<Self> {
        validate_component("system name", system_name)?;
        Ok(Self {
            system_name: system_name.to_string(),
            root: builds_root.join(system_name),
        })
    }

    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILENAME)
    }

    pub fn version_pointer_path(&self) -> PathBuf {
        self.root.join(VERSION_POINTER_FILENAME)
    }

    pub fn snapshots_path(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    pub fn logs_path(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Create the directory with its `snapshots/` and `logs/` children.
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.snapshots_path(), self.logs_path()] {
            fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Fail unless a previous build materialized `data.json`.
    pub fn require_existing(&self) -> Result<()> {
        let config = self.config_path();
        if !config.is_file() {
            return Err(CoreError::config_at(
                format!("build not found for '{}' (run 'build' first)", self.system_name),
                &self.root,
            ));
        }
        Ok(())
    }

    /// Copy the caller's config document into `data.json`.
    pub fn materialize_config(&self, src: &Path) -> Result<PathBuf> {
        let dst = self.config_path();
        fs::copy(src, &dst).map_err(|e| CoreError::io(src, e))?;
        Ok(dst)
    }

    /// Pin the blueprint version for this build.
    ///
    /// With `upgrade` the pointer is always rewritten; otherwise an existing
    /// pointer wins. Returns the version the build is pinned to afterwards.
    pub fn write_version_pointer(&self, resolved: &str, upgrade: bool) -> Result<String> {
        let path = self.version_pointer_path();
        if !upgrade && path.exists() {
            return self.read_version_pointer();
        }
        fs::write(&path, format!("{resolved}\n")).map_err(|e| CoreError::io(&path, e))?;
        tracing::info!(system = %self.system_name, version = %resolved, "Pinned blueprint version");
        Ok(resolved.to_string())
    }

    pub fn read_version_pointer(&self) -> Result<String> {
        let path = self.version_pointer_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CoreError::config_at("blueprint version pointer is missing", path));
            }
            Err(e) => return Err(CoreError::io(path, e)),
        };
        let version = raw.trim();
        if version.is_empty() {
            return Err(CoreError::config_at("blueprint version pointer is empty", path));
        }
        Ok(version.to_string())
    }
}

/// Names used as path components must be one normal component.
pub(crate) fn validate_component(what: &str, value: &str) -> Result<()> {
    let mut components = Path::new(value).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
        && !value.contains('/')
        && !value.contains('\\');
    if !single_normal {
        return Err(CoreError::config(format!("invalid {what} '{value}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let root = TempDir::new().unwrap();
        let build = BuildDir::open(root.path(), "game-cp-01").unwrap();
        build.ensure().unwrap();
        assert!(root.path().join("game-cp-01/snapshots").is_dir());
        assert!(root.path().join("game-cp-01/logs").is_dir());
        assert_eq!(build.config_path(), root.path().join("game-cp-01/data.json"));
    }

    #[test]
    fn test_system_name_must_be_single_component() {
        let root = TempDir::new().unwrap();
        for name in ["", "..", "a/b", "/abs", "."] {
            let err = BuildDir::open(root.path(), name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "name {name:?}");
        }
    }

    #[test]
    fn test_pointer_pinned_unless_upgrade() {
        let root = TempDir::new().unwrap();
        let build = BuildDir::open(root.path(), "sys").unwrap();
        build.ensure().unwrap();

        assert_eq!(build.write_version_pointer("1.0.0", false).unwrap(), "1.0.0");
        assert_eq!(build.write_version_pointer("1.1.0", false).unwrap(), "1.0.0");
        assert_eq!(build.read_version_pointer().unwrap(), "1.0.0");

        assert_eq!(build.write_version_pointer("1.1.0", true).unwrap(), "1.1.0");
        assert_eq!(
            fs::read_to_string(build.version_pointer_path()).unwrap(),
            "1.1.0\n"
        );
    }

    #[test]
    fn test_require_existing() {
        let root = TempDir::new().unwrap();
        let build = BuildDir::open(root.path(), "sys").unwrap();
        assert_eq!(build.require_existing().unwrap_err().kind(), ErrorKind::Config);

        build.ensure().unwrap();
        fs::write(build.config_path(), "{}").unwrap();
        assert!(build.require_existing().is_ok());
    }
}
