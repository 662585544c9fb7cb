//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use unyca_core::{
    generate, rotate, verify, BuildConfig, BuildPipeline, BuilderSettings, CoreError, ErrorKind,
    ExclusionSet, GenerateOptions, Manifest, MANIFEST_FILENAME,
};

const ENGINE: &str = "1.5.0";

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// A repository root with one published `game` blueprint at 1.0.0 and 1.1.0.
fn create_repo(max_engine: Option<&str>) -> TempDir {
    let root = TempDir::new().unwrap();
    for version in ["1.0.0", "1.1.0"] {
        let bp = root.path().join("blueprints/game").join(version);
        write(&bp.join("VERSION"), &format!("{version}\n"));
        write(&bp.join("servers.yml"), "- hosts: all\n");
        write(&bp.join("roles/web/tasks/main.yml"), "- name: web\n");
        write(&bp.join("ansible.cfg"), "[defaults]\n");
        let options = GenerateOptions::new("1.0.0").with_max_engine(max_engine);
        generate(&bp, &options).unwrap().write_to(&bp).unwrap();
    }
    write(&root.path().join("blueprints/game/LATEST"), "1.1.0\n");
    root
}

fn create_config(root: &Path, version: Option<&str>) -> std::path::PathBuf {
    let mut cfg = serde_json::json!({
        "system_name": "game-cp-01",
        "system_type": "game",
        "blueprint_meta": {"zone": "eu", "tier": "gold"},
        "data": [
            {"id": "h1", "ip": "10.0.0.1", "user": "ops", "groups": ["web", "apis"]},
            {"id": "h2", "ip": "10.0.0.2", "user": "ops", "groups": ["databases"]}
        ]
    });
    if let Some(v) = version {
        cfg["blueprint_version"] = serde_json::Value::from(v);
    }
    let path = root.join("config.json");
    write(&path, &serde_json::to_string_pretty(&cfg).unwrap());
    path
}

fn create_pipeline(root: &Path) -> BuildPipeline {
    BuildPipeline::new(BuilderSettings::from_root(root).with_engine_version(ENGINE))
}

#[test]
fn invariant_reference_manifest() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("VERSION"), "1.2.0");
    write(&dir.path().join("a.txt"), "hello");

    let manifest = generate(dir.path(), &GenerateOptions::new("0.1.0")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();

    assert_eq!(
        json["files"]["a.txt"],
        "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(json["version"], "1.2.0");
    assert_eq!(json["min_engine"], "0.1.0");
    assert!(json["max_engine"].is_null());
    assert!(json["signature"].is_null());
    assert!(json["created_at"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn invariant_generate_then_verify_succeeds() {
    let root = create_repo(Some("2.0.0"));
    let bp = root.path().join("blueprints/game/1.1.0");
    let verified = verify(&bp, ENGINE).unwrap();
    assert_eq!(verified.version, "1.1.0");
}

#[test]
fn invariant_any_single_byte_flip_is_detected() {
    let root = create_repo(None);
    let bp = root.path().join("blueprints/game/1.0.0");
    let manifest = Manifest::load(&bp).unwrap();

    for rel in manifest.files.keys() {
        let path = bp.join(rel);
        let original = fs::read(&path).unwrap();
        let mut flipped = original.clone();
        flipped[0] ^= 0x01;
        fs::write(&path, &flipped).unwrap();

        match verify(&bp, ENGINE).unwrap_err() {
            CoreError::IntegrityViolation { path, .. } => assert_eq!(&path, rel),
            other => panic!("unexpected error for {rel}: {other}"),
        }

        fs::write(&path, &original).unwrap();
    }
    assert!(verify(&bp, ENGINE).is_ok());
}

#[test]
fn invariant_excluded_files_never_tracked() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("VERSION"), "1.0.0");
    write(&dir.path().join("site.yml"), "x");
    write(&dir.path().join("site.retry"), "x");
    write(&dir.path().join("roles/db/host.retry"), "x");
    write(&dir.path().join("docs/README.md"), "x");

    let excludes = ExclusionSet::new(["**/*.retry", "docs/**"]).unwrap();
    let manifest =
        generate(dir.path(), &GenerateOptions::new("0.1.0").with_excludes(excludes.clone()))
            .unwrap();

    for key in manifest.files.keys() {
        assert!(!excludes.is_excluded(key), "{key} matches an exclusion but was tracked");
    }
    assert_eq!(
        manifest.files.keys().cloned().collect::<Vec<_>>(),
        vec!["VERSION", "site.yml"]
    );
}

#[test]
fn invariant_engine_bounds_inclusive() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("VERSION"), "1.0.0");
    let options = GenerateOptions::new("1.2.3").with_max_engine(Some("2.0.0"));
    generate(dir.path(), &options)
        .unwrap()
        .write_to(dir.path())
        .unwrap();

    assert!(verify(dir.path(), "1.2.3").is_ok());
    assert!(verify(dir.path(), "2.0.0").is_ok());
    assert_eq!(
        verify(dir.path(), "1.2.2").unwrap_err().kind(),
        ErrorKind::EngineIncompatible
    );
    assert_eq!(
        verify(dir.path(), "2.0.1").unwrap_err().kind(),
        ErrorKind::EngineIncompatible
    );
}

#[test]
fn invariant_missing_version_writes_nothing() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("a.txt"), "hello");

    let err = generate(dir.path(), &GenerateOptions::new("0.1.0")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(!dir.path().join(MANIFEST_FILENAME).exists());
}

#[test]
fn invariant_rotation_keeps_newest_two() {
    let dir = TempDir::new().unwrap();
    let snaps = dir.path().join("snapshots");
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_800_000_000);
    for (i, name) in ["s1", "s2", "s3", "s4", "s5"].iter().enumerate() {
        let path = snaps.join(name);
        fs::create_dir_all(&path).unwrap();
        File::open(&path)
            .unwrap()
            .set_modified(base + Duration::from_secs(i as u64 * 60))
            .unwrap();
    }

    let first = rotate(dir.path(), 2).unwrap();
    assert_eq!(first.removed.len(), 3);
    assert!(snaps.join("s5").is_dir());
    assert!(snaps.join("s4").is_dir());
    assert!(!snaps.join("s3").exists());

    let second = rotate(dir.path(), 2).unwrap();
    assert!(second.removed.is_empty());
}

#[test]
fn invariant_build_verifies_before_touching_build_dir() {
    let root = create_repo(None);
    let config = create_config(root.path(), None);

    // Tamper with the LATEST blueprint.
    write(
        &root.path().join("blueprints/game/1.1.0/servers.yml"),
        "- hosts: evil\n",
    );

    let pipeline = create_pipeline(root.path());
    let err = pipeline.build(&config, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityViolation);
    assert!(!root.path().join("builds/game-cp-01").exists());
}

#[test]
fn invariant_build_pins_version_until_upgrade() {
    let root = create_repo(None);
    let pipeline = create_pipeline(root.path());

    let config = create_config(root.path(), Some("1.0.0"));
    let first = pipeline.build(&config, false).unwrap();
    assert_eq!(first.blueprint_version, "1.0.0");
    assert!(first.snapshot.join("data.json").is_file());
    assert!(first.snapshot.join("blueprint_version.txt").is_file());

    // Config now asks for LATEST, but the existing pin wins.
    let config = create_config(root.path(), None);
    let second = pipeline.build(&config, false).unwrap();
    assert_eq!(second.blueprint_version, "1.0.0");

    let upgraded = pipeline.build(&config, true).unwrap();
    assert_eq!(upgraded.blueprint_version, "1.1.0");
    assert_eq!(
        fs::read_to_string(root.path().join("builds/game-cp-01/blueprint_version.txt")).unwrap(),
        "1.1.0\n"
    );
}

#[test]
fn invariant_plan_summarizes_without_writing() {
    let root = create_repo(None);
    let config = BuildConfig::load(&create_config(root.path(), None)).unwrap();

    let plan = create_pipeline(root.path()).plan(&config).unwrap();
    assert_eq!(plan.blueprint_version, "1.1.0");
    assert_eq!(plan.hosts, 2);
    assert_eq!(plan.groups, vec!["apis", "databases", "web"]);
    assert!(!root.path().join("builds").exists());
}

#[test]
fn invariant_incompatible_engine_blocks_plan() {
    let root = create_repo(Some("1.4.0"));
    let config = BuildConfig::load(&create_config(root.path(), None)).unwrap();

    let err = create_pipeline(root.path()).plan(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineIncompatible);
}

#[test]
fn invariant_snapshot_requires_build_and_respects_retention() {
    let root = create_repo(None);
    let settings = BuilderSettings::from_root(root.path())
        .with_engine_version(ENGINE)
        .with_retention(1);
    let pipeline = BuildPipeline::new(settings);

    let err = pipeline.snapshot("game-cp-01", "manual").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    pipeline
        .build(&create_config(root.path(), None), false)
        .unwrap();
    let outcome = pipeline.snapshot("game-cp-01", "manual").unwrap();
    assert!(outcome.snapshot.is_dir());

    let remaining = fs::read_dir(root.path().join("builds/game-cp-01/snapshots"))
        .unwrap()
        .count();
    assert_eq!(remaining, 1);
}

#[test]
fn invariant_prepare_run_uses_pinned_blueprint() {
    let root = create_repo(None);
    let pipeline = create_pipeline(root.path());
    pipeline
        .build(&create_config(root.path(), Some("1.0.0")), false)
        .unwrap();

    let ctx = pipeline.prepare_run("game-cp-01").unwrap();
    assert_eq!(ctx.blueprint_version, "1.0.0");
    assert_eq!(
        ctx.entrypoint,
        root.path().join("blueprints/game/1.0.0/servers.yml")
    );
    let meta_keys: Vec<_> = ctx.blueprint_meta.keys().cloned().collect();
    assert_eq!(meta_keys, vec!["zone", "tier"]);
    assert!(ctx
        .env
        .iter()
        .any(|(k, v)| k == "ANSIBLE_CONFIG" && v.ends_with("ansible.cfg")));

    // Tampering after the build is caught at run time.
    write(
        &root.path().join("blueprints/game/1.0.0/roles/web/tasks/main.yml"),
        "- name: changed\n",
    );
    let err = pipeline.prepare_run("game-cp-01").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityViolation);
}
