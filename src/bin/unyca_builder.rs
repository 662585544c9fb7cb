//! Unyca Builder CLI
//!
//! Commands: manifest, verify, plan, build, snapshot, rotate, prepare-run
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when a blueprint fails its gate, 1 on any other error

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use unyca_core::verify::{is_gate_failure, verify};
use unyca_core::{
    generate, BuildConfig, BuildPipeline, BuilderSettings, CoreError, ExclusionSet,
    GenerateOptions, ENGINE_VERSION,
};

#[derive(Parser)]
#[command(name = "unyca-builder")]
#[command(about = "Unyca Builder - blueprint integrity and build lifecycle")]
#[command(version = ENGINE_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    roots: RootArgs,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Args)]
struct RootArgs {
    /// Repository root holding blueprints/ and builds/
    #[arg(long, env = "UNYCA_ROOT", default_value = ".", global = true)]
    root: PathBuf,

    /// Override the blueprints root
    #[arg(long, env = "UNYCA_BLUEPRINTS", global = true)]
    blueprints: Option<PathBuf>,

    /// Override the builds root
    #[arg(long, env = "UNYCA_BUILDS", global = true)]
    builds: Option<PathBuf>,

    /// Snapshots kept per build
    #[arg(long, env = "UNYCA_KEEP_SNAPSHOTS", global = true)]
    keep_snapshots: Option<usize>,
}

impl RootArgs {
    fn settings(&self) -> BuilderSettings {
        let mut settings = BuilderSettings::from_root(&self.root);
        if let Some(blueprints) = &self.blueprints {
            settings.blueprints_root = blueprints.clone();
        }
        if let Some(builds) = &self.builds {
            settings.builds_root = builds.clone();
        }
        if let Some(keep) = self.keep_snapshots {
            settings = settings.with_retention(keep);
        }
        settings
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate MANIFEST.json for a blueprint directory
    Manifest {
        /// Blueprint dir (e.g. blueprints/<type>/<version>)
        #[arg(long)]
        bp: PathBuf,

        /// Minimum engine version
        #[arg(long, default_value = "0.1.0")]
        min_engine: String,

        /// Maximum engine version or 'none'
        #[arg(long, default_value = "none")]
        max_engine: String,

        /// Glob to exclude (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Write to <bp>/MANIFEST.json instead of stdout
        #[arg(long)]
        write: bool,
    },

    /// Verify a blueprint directory against its manifest
    Verify {
        /// Blueprint dir
        #[arg(long)]
        bp: PathBuf,

        /// Engine version to check (defaults to this binary's)
        #[arg(long, default_value = ENGINE_VERSION)]
        engine: String,
    },

    /// Show what a build would use
    Plan {
        /// Config document (JSON)
        config: PathBuf,
    },

    /// Prepare a build directory and snapshot it
    Build {
        /// Config document (JSON)
        config: PathBuf,

        /// Re-pin to the version from the config or LATEST
        #[arg(long)]
        upgrade: bool,
    },

    /// Snapshot an existing build
    Snapshot {
        system_name: String,
        label: String,
    },

    /// Apply snapshot retention to a build
    Rotate {
        system_name: String,

        /// Entries to keep (defaults to the configured retention)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Verify and describe a run for the external engine
    PrepareRun { system_name: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let pipeline = BuildPipeline::new(cli.roots.settings());

    let result = match cli.command {
        Commands::Manifest {
            bp,
            min_engine,
            max_engine,
            exclude,
            write,
        } => run_manifest(&bp, min_engine, &max_engine, &exclude, write),
        Commands::Verify { bp, engine } => verify(&bp, &engine).map(|v| {
            emit(&serde_json::json!({
                "valid": true,
                "version": v.version,
                "engine": v.engine.to_string(),
                "files_checked": v.files_checked,
            }))
        }),
        Commands::Plan { config } => BuildConfig::load(&config)
            .and_then(|cfg| pipeline.plan(&cfg))
            .map(|plan| emit(&plan)),
        Commands::Build { config, upgrade } => {
            pipeline.build(&config, upgrade).map(|out| emit(&out))
        }
        Commands::Snapshot { system_name, label } => pipeline
            .snapshot(&system_name, &label)
            .map(|out| emit(&out)),
        Commands::Rotate { system_name, keep } => {
            pipeline.rotate(&system_name, keep).map(|report| {
                emit(&serde_json::json!({
                    "retained": report.retained,
                    "removed": report.removed,
                }))
            })
        }
        Commands::PrepareRun { system_name } => {
            pipeline.prepare_run(&system_name).map(|ctx| emit(&ctx))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}

fn run_manifest(
    bp: &Path,
    min_engine: String,
    max_engine: &str,
    exclude: &[String],
    write: bool,
) -> unyca_core::Result<()> {
    let options = GenerateOptions::new(min_engine)
        .with_max_engine(Some(max_engine))
        .with_excludes(ExclusionSet::new(exclude)?);
    let manifest = generate(bp, &options)?;

    if write {
        let dst = manifest.write_to(bp)?;
        emit(&serde_json::json!({ "written": dst }));
    } else {
        println!("{}", manifest.to_json()?);
    }
    Ok(())
}

fn emit<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to render output: {e}"),
    }
}

fn report_error(err: &CoreError) -> ExitCode {
    tracing::error!("{err}");
    let output = serde_json::json!({
        "success": false,
        "kind": err.kind(),
        "error": err.to_string(),
    });
    println!("{output}");
    if is_gate_failure(err) {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

/// Initialize tracing with appropriate verbosity, on stderr
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
