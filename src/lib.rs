//! Unyca Core - blueprint integrity and build lifecycle
//!
//! # Guarantees
//! 1. Published blueprints are content-addressed by their manifest
//! 2. Nothing consumes a blueprint that fails verification
//! 3. Engine compatibility bounds are inclusive and enforced
//! 4. Snapshot history stays within its retention window
//! 5. Roots are explicit; nothing depends on the working directory

pub mod blueprint;
pub mod config;
pub mod error;
pub mod filters;
pub mod generate;
pub mod hashing;
pub mod manifest;
pub mod pipeline;
pub mod snapshots;
pub mod verify;
pub mod workspace;

pub use blueprint::{BlueprintStore, ResolvedBlueprint};
pub use config::{BuildConfig, BuilderSettings, Host};
pub use error::{CoreError, ErrorKind, Result};
pub use filters::ExclusionSet;
pub use generate::{generate, GenerateOptions};
pub use hashing::{hash_file, ContentDigest};
pub use manifest::{Manifest, MANIFEST_FILENAME};
pub use pipeline::{BuildPipeline, PlanSummary, RunContext};
pub use snapshots::{create_snapshot, rotate, RotationReport};
pub use verify::{verify, EngineBounds, VerifiedBlueprint};
pub use workspace::BuildDir;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
