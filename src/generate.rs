//! Manifest generation for a blueprint directory.
//!
//! Runs once per blueprint publication. Generation is all-or-nothing: the
//! manifest is assembled fully in memory and only written (by the caller,
//! through [`Manifest::write_to`]) once every file hashed successfully.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::filters::ExclusionSet;
use crate::hashing::hash_file;
use crate::manifest::{Manifest, MANIFEST_FILENAME, VERSION_FILENAME};
use crate::verify::parse_version;

/// Sentinel accepted in place of a max engine to mean "unbounded".
pub const UNBOUNDED_SENTINEL: &str = "none";

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub min_engine: String,
    pub max_engine: Option<String>,
    pub excludes: ExclusionSet,
}

impl GenerateOptions {
    pub fn new(min_engine: impl Into<String>) -> Self {
        Self {
            min_engine: min_engine.into(),
            max_engine: None,
            excludes: ExclusionSet::empty(),
        }
    }

    /// Set the upper bound; `None`, blank, or `"none"` keeps it unbounded.
    pub fn with_max_engine(mut self, max_engine: Option<&str>) -> Self {
        self.max_engine = normalize_max_engine(max_engine);
        self
    }

    pub fn with_excludes(mut self, excludes: ExclusionSet) -> Self {
        self.excludes = excludes;
        self
    }
}

pub fn normalize_max_engine(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(UNBOUNDED_SENTINEL) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Read and trim the `VERSION` marker at a blueprint root.
pub fn read_version_marker(blueprint_dir: &Path) -> Result<String> {
    let path = blueprint_dir.join(VERSION_FILENAME);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CoreError::config_at("blueprint VERSION marker is missing", path));
        }
        Err(e) => {
            return Err(CoreError::config_at(
                format!("blueprint VERSION marker is unreadable: {e}"),
                path,
            ));
        }
    };
    let version = raw.trim();
    if version.is_empty() {
        return Err(CoreError::config_at("blueprint VERSION marker is empty", path));
    }
    Ok(version.to_string())
}

/// Generate a manifest stamped with the current time.
pub fn generate(blueprint_dir: &Path, options: &GenerateOptions) -> Result<Manifest> {
    generate_at(blueprint_dir, options, Utc::now())
}

/// Generate a manifest with an explicit creation timestamp.
pub fn generate_at(
    blueprint_dir: &Path,
    options: &GenerateOptions,
    created_at: DateTime<Utc>,
) -> Result<Manifest> {
    let meta = fs::metadata(blueprint_dir).map_err(|e| {
        CoreError::config_at(format!("blueprint dir not found: {e}"), blueprint_dir)
    })?;
    if !meta.is_dir() {
        return Err(CoreError::config_at(
            "blueprint path is not a directory",
            blueprint_dir,
        ));
    }

    check_engine_bounds(options)?;
    let version = read_version_marker(blueprint_dir)?;
    let files = collect_digests(blueprint_dir, &options.excludes)?;

    tracing::info!(
        blueprint = %blueprint_dir.display(),
        version = %version,
        files = files.len(),
        "Generated manifest"
    );

    Ok(Manifest {
        version,
        min_engine: options.min_engine.clone(),
        max_engine: options.max_engine.clone(),
        files,
        signature: None,
        created_at: Some(created_at),
    })
}

/// Reject bounds the verifier could never parse, before anything is hashed.
fn check_engine_bounds(options: &GenerateOptions) -> Result<()> {
    parse_version("min_engine", &options.min_engine)?;
    if let Some(max) = &options.max_engine {
        parse_version("max_engine", max)?;
    }
    Ok(())
}

fn collect_digests(
    blueprint_dir: &Path,
    excludes: &ExclusionSet,
) -> Result<BTreeMap<String, crate::hashing::ContentDigest>> {
    let mut files = BTreeMap::new();

    for entry in WalkDir::new(blueprint_dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| blueprint_dir.to_path_buf());
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
            CoreError::io(path, source)
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(blueprint_dir)
            .map_err(|_| CoreError::config_at("path escapes blueprint root", entry.path()))?;
        let rel_posix = to_posix(rel)?;

        if rel_posix.eq_ignore_ascii_case(MANIFEST_FILENAME) {
            continue;
        }
        if excludes.is_excluded(&rel_posix) {
            tracing::debug!(path = %rel_posix, "Excluded from manifest");
            continue;
        }

        let digest = hash_file(entry.path())?;
        tracing::debug!(path = %rel_posix, digest = %digest, "Hashed");
        files.insert(rel_posix, digest);
    }

    Ok(files)
}

/// Join normal components with `/`; anything else cannot come out of a walk
/// rooted at the blueprint and is rejected.
pub(crate) fn to_posix(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    CoreError::config_at("blueprint path is not valid UTF-8", rel)
                })?;
                parts.push(part);
            }
            _ => return Err(CoreError::config_at("path escapes blueprint root", rel)),
        }
    }
    Ok(parts.join("/"))
}
