//! Manifest verification - the gate in front of every consuming operation.
//!
//! Verification is read-only and all-or-nothing: the engine must sit inside
//! the manifest's declared window, and every tracked file must hash to its
//! recorded digest. The first failure aborts; files are checked in
//! lexicographic path order so the reported failure is deterministic.

use std::path::Path;

use semver::Version;

use crate::error::{CoreError, EngineBound, ErrorKind, Result};
use crate::hashing::hash_file;
use crate::manifest::Manifest;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VERIFY_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_verify_call_count() -> u32 {
    VERIFY_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_verify_call_count() {
    VERIFY_CALL_COUNT.store(0, Ordering::SeqCst);
}

/// Parsed engine compatibility window, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBounds {
    pub min: Version,
    pub max: Option<Version>,
}

impl EngineBounds {
    pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
        let min = parse_version("min_engine", &manifest.min_engine)?;
        let max = manifest
            .max_engine
            .as_deref()
            .map(|raw| parse_version("max_engine", raw))
            .transpose()?;
        Ok(Self { min, max })
    }

    pub fn check(&self, engine: &Version) -> Result<()> {
        if engine < &self.min {
            return Err(CoreError::EngineIncompatible {
                engine: engine.to_string(),
                bound: EngineBound::Min,
                limit: self.min.to_string(),
            });
        }
        if let Some(max) = &self.max {
            if engine > max {
                return Err(CoreError::EngineIncompatible {
                    engine: engine.to_string(),
                    bound: EngineBound::Max,
                    limit: max.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Parse a semantic version, tolerating a leading `v` and surrounding space.
pub fn parse_version(field: &str, raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let candidate = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(candidate).map_err(|e| CoreError::VersionFormat {
        field: field.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBlueprint {
    pub version: String,
    pub engine: Version,
    pub files_checked: usize,
}

/// Verify the blueprint at `blueprint_dir` for the caller's engine version.
pub fn verify(blueprint_dir: &Path, engine_version: &str) -> Result<VerifiedBlueprint> {
    #[cfg(feature = "test-hooks")]
    VERIFY_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

    let manifest = Manifest::load(blueprint_dir)?;
    verify_manifest(blueprint_dir, &manifest, engine_version)
}

/// Verify an already-loaded manifest against the files under `blueprint_dir`.
pub fn verify_manifest(
    blueprint_dir: &Path,
    manifest: &Manifest,
    engine_version: &str,
) -> Result<VerifiedBlueprint> {
    let engine = parse_version(ENGINE_FIELD, engine_version)?;
    EngineBounds::from_manifest(manifest)?.check(&engine)?;

    for (rel, expected) in &manifest.files {
        let full = resolve_tracked(blueprint_dir, rel)?;
        let actual = match hash_file(&full) {
            Ok(digest) => digest,
            Err(err) => {
                let actual = match &err {
                    CoreError::Io { source, .. }
                        if source.kind() == std::io::ErrorKind::NotFound =>
                    {
                        "missing".to_string()
                    }
                    CoreError::Io { source, .. } => format!("unreadable: {source}"),
                    other => format!("unreadable: {other}"),
                };
                return Err(CoreError::IntegrityViolation {
                    path: rel.clone(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        };
        if &actual != expected {
            return Err(CoreError::IntegrityViolation {
                path: rel.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    tracing::info!(
        blueprint = %blueprint_dir.display(),
        version = %manifest.version,
        engine = %engine,
        files = manifest.files.len(),
        "Blueprint verified"
    );

    Ok(VerifiedBlueprint {
        version: manifest.version.clone(),
        engine,
        files_checked: manifest.files.len(),
    })
}

/// Map a manifest key onto the blueprint tree, refusing keys that would
/// reach outside the root. Keys are `/`-separated; any other byte, a
/// backslash included, is part of a file name.
fn resolve_tracked(blueprint_dir: &Path, rel: &str) -> Result<std::path::PathBuf> {
    let escapes = rel.is_empty()
        || rel.starts_with('/')
        || rel.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if escapes {
        return Err(CoreError::ManifestCorrupt {
            path: Manifest::path_in(blueprint_dir),
            reason: format!("file entry '{rel}' is not a relative path inside the blueprint"),
        });
    }
    Ok(rel.split('/').fold(blueprint_dir.to_path_buf(), |p, seg| p.join(seg)))
}

/// Field name used when the caller's own engine version fails to parse.
pub const ENGINE_FIELD: &str = "engine";

/// True for failures that mean the blueprint must not be used as-is.
///
/// A malformed bound inside the manifest is the blueprint's fault and gates
/// it; a malformed engine version supplied by the caller is not.
pub fn is_gate_failure(err: &CoreError) -> bool {
    match err {
        CoreError::VersionFormat { field, .. } => field != ENGINE_FIELD,
        other => matches!(
            other.kind(),
            ErrorKind::IntegrityViolation
                | ErrorKind::EngineIncompatible
                | ErrorKind::ManifestMissing
                | ErrorKind::ManifestCorrupt
        ),
    }
}
