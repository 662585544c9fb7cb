//! Build Pipeline - Single Entry Point
//!
//! CRITICAL: every operation that consumes a blueprint MUST verify its
//! manifest before doing anything else. No bypass.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::blueprint::{BlueprintStore, ResolvedBlueprint};
use crate::config::{BuildConfig, BuilderSettings};
use crate::error::{CoreError, Result};
use crate::snapshots::{create_snapshot, rotate, RotationReport};
use crate::verify::{verify, VerifiedBlueprint};
use crate::workspace::BuildDir;

/// Label given to the snapshot taken by every build.
pub const BUILD_SNAPSHOT_LABEL: &str = "build";

/// Engine entrypoints, in lookup order.
pub const ENTRYPOINT_CANDIDATES: &[&str] = &[
    "orchestrator.yml",
    "orchestrator.yaml",
    "orchestrator.json",
    "servers.yml",
    "servers.yaml",
    "servers.json",
];

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub system: String,
    pub kind: String,
    pub blueprint_dir: PathBuf,
    pub blueprint_version: String,
    pub hosts: usize,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub build_dir: PathBuf,
    pub blueprint_version: String,
    pub snapshot: PathBuf,
    pub snapshots_removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotOutcome {
    pub snapshot: PathBuf,
    pub snapshots_removed: usize,
}

/// Everything the external engine collaborator needs for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub system: String,
    pub build_dir: PathBuf,
    pub blueprint_dir: PathBuf,
    pub blueprint_version: String,
    pub entrypoint: PathBuf,
    pub data_path: PathBuf,
    pub logs_dir: PathBuf,
    pub blueprint_meta: Map<String, Value>,
    pub env: Vec<(String, String)>,
}

/// The build pipeline - single entry point for all consuming operations.
pub struct BuildPipeline {
    settings: BuilderSettings,
    store: BlueprintStore,
}

impl BuildPipeline {
    pub fn new(settings: BuilderSettings) -> Self {
        let store = BlueprintStore::new(settings.blueprints_root.clone());
        Self { settings, store }
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    pub fn store(&self) -> &BlueprintStore {
        &self.store
    }

    /// Resolve and verify a blueprint.
    ///
    /// This is the ONLY gate; every consuming operation goes through it.
    pub fn gate(
        &self,
        kind: &str,
        version: Option<&str>,
    ) -> Result<(ResolvedBlueprint, VerifiedBlueprint)> {
        let resolved = self.store.resolve(kind, version)?;
        let verified = verify(&resolved.dir, &self.settings.engine_version)?;
        Ok((resolved, verified))
    }

    /// Summarize what a build of `config` would use.
    pub fn plan(&self, config: &BuildConfig) -> Result<PlanSummary> {
        let (resolved, _) = self.gate(&config.system_type, config.blueprint_version.as_deref())?;

        Ok(PlanSummary {
            system: config.system_name.clone(),
            kind: config.system_type.clone(),
            blueprint_dir: resolved.dir,
            blueprint_version: resolved.version,
            hosts: config.data.len(),
            groups: config.groups(),
        })
    }

    /// Prepare the build directory for the config at `config_path`.
    ///
    /// The blueprint verified is the one the build ends up pinned to: an
    /// existing pin survives unless `upgrade` is set.
    pub fn build(&self, config_path: &Path, upgrade: bool) -> Result<BuildOutcome> {
        let config = BuildConfig::load(config_path)?;
        let build = BuildDir::open(&self.settings.builds_root, &config.system_name)?;

        let requested = if !upgrade && build.version_pointer_path().exists() {
            Some(build.read_version_pointer()?)
        } else {
            config.blueprint_version.clone()
        };

        // MANDATORY: verification happens before the build dir is touched.
        let (resolved, _) = self.gate(&config.system_type, requested.as_deref())?;

        build.ensure()?;
        build.materialize_config(config_path)?;
        let pinned = build.write_version_pointer(&resolved.version, upgrade)?;

        let snapshot = create_snapshot(build.path(), BUILD_SNAPSHOT_LABEL, Utc::now())?;
        let rotation = rotate(build.path(), self.settings.snapshot_retention)?;

        tracing::info!(system = %config.system_name, version = %pinned, "Build prepared");
        Ok(BuildOutcome {
            build_dir: build.path().to_path_buf(),
            blueprint_version: pinned,
            snapshot,
            snapshots_removed: rotation.removed.len(),
        })
    }

    /// Take a labelled snapshot of an existing build.
    pub fn snapshot(&self, system: &str, label: &str) -> Result<SnapshotOutcome> {
        let build = BuildDir::open(&self.settings.builds_root, system)?;
        build.require_existing()?;

        let snapshot = create_snapshot(build.path(), label, Utc::now())?;
        let rotation = rotate(build.path(), self.settings.snapshot_retention)?;
        Ok(SnapshotOutcome {
            snapshot,
            snapshots_removed: rotation.removed.len(),
        })
    }

    /// Apply the retention window to an existing build's history.
    pub fn rotate(&self, system: &str, keep: Option<usize>) -> Result<RotationReport> {
        let build = BuildDir::open(&self.settings.builds_root, system)?;
        rotate(build.path(), keep.unwrap_or(self.settings.snapshot_retention))
    }

    /// Resolve, verify and describe a run of the pinned blueprint.
    pub fn prepare_run(&self, system: &str) -> Result<RunContext> {
        let build = BuildDir::open(&self.settings.builds_root, system)?;
        build.require_existing()?;

        let pinned = build.read_version_pointer()?;
        let mut config = BuildConfig::load(&build.config_path())?;
        config.blueprint_version = Some(pinned);

        let (resolved, _) = self.gate(&config.system_type, config.blueprint_version.as_deref())?;
        let entrypoint = find_entrypoint(&resolved.dir)?;

        let env = vec![
            (
                "UNYCA_BUILD_DIR".to_string(),
                build.path().display().to_string(),
            ),
            (
                "ANSIBLE_CONFIG".to_string(),
                resolved.dir.join("ansible.cfg").display().to_string(),
            ),
        ];

        Ok(RunContext {
            system: system.to_string(),
            build_dir: build.path().to_path_buf(),
            blueprint_dir: resolved.dir,
            blueprint_version: resolved.version,
            entrypoint,
            data_path: build.config_path(),
            logs_dir: build.logs_path(),
            blueprint_meta: config.blueprint_meta,
            env,
        })
    }
}

/// First entrypoint candidate present as a regular file.
pub fn find_entrypoint(blueprint_dir: &Path) -> Result<PathBuf> {
    ENTRYPOINT_CANDIDATES
        .iter()
        .map(|name| blueprint_dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            CoreError::config_at("no orchestrator|servers entrypoint found", blueprint_dir)
        })
}
