//! ue-retarget - Unreal build-target manifest retargeting
//!
//! Usage:
//!   ue-retarget rewrite                 # Retarget paths in the manifest once
//!   ue-retarget snapshot                # Back up the manifest
//!   ue-retarget restore                 # Put the backup back
//!   ue-retarget run -- RunUAT.bat ...   # Rewrite, build, always restore
//!   ue-retarget --init                  # Generate default config file

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ue_retarget::backup;
use ue_retarget::config::{Config, CONFIG_FILE_NAME};
use ue_retarget::manifest::rewrite_manifest;
use ue_retarget::workflow::{run_guarded, WorkflowError, EXIT_CONFIG};

/// Build number from BUILD file
const BUILD_NUMBER: &str = env!("UE_RETARGET_BUILD_NUMBER");

/// Full version string including build number
fn full_version() -> String {
    format!("{} (build {})", env!("CARGO_PKG_VERSION"), BUILD_NUMBER)
}

#[derive(Parser, Debug)]
#[command(name = "ue-retarget")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Retarget absolute paths in Unreal build-target manifests around a build step")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Generate a default configuration file
    #[arg(long)]
    init: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root (overrides config)
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Manifest path (overrides config and .uproject discovery)
    #[arg(long, global = true)]
    target: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retarget absolute paths in the manifest in place
    Rewrite,

    /// Back up the manifest (no-op if a backup already exists)
    Snapshot,

    /// Restore the manifest from its backup
    Restore,

    /// Back up, rewrite, run the build steps, then always restore
    ///
    /// Exits with the failing step's own code. The tool's own failures use
    /// 65-78 (manifest 65/66/74, backup 73, restore 75, config 78), 124 for
    /// a timeout and 127 when a step cannot be launched; a step that itself
    /// exits with one of these codes is indistinguishable from them.
    Run {
        /// Build configuration substituted for {configuration}
        #[arg(long)]
        configuration: Option<String>,

        /// Build step timeout in seconds (0 = none)
        #[arg(long)]
        timeout: Option<u64>,

        /// Program and arguments; falls back to [[build.steps]], then [build].program
        #[arg(last = true)]
        command: Vec<String>,
    },
}

fn init_logging(config: &Config, verbose: bool) {
    let log_level = if verbose {
        "debug"
    } else {
        &config.logging.level
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let file = config.logging.file.as_ref().and_then(|log_path| {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
        {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: Failed to open log file {}: {}", log_path.display(), e);
                None
            }
        }
    });

    if let Some(file) = file {
        use tracing_subscriber::fmt::writer::MakeWriterExt;

        let file_writer = std::sync::Mutex::new(file);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr.and(file_writer))
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(args: &Args) -> Result<Config, ue_retarget::config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::discover(),
    };

    if let Some(root) = &args.project_root {
        config.project.root = Some(root.clone());
    }
    if let Some(target) = &args.target {
        config.project.target = Some(target.clone());
    }

    Ok(config)
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(1, 255) as u8)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Handle --init flag
    if args.init {
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        if let Err(e) = Config::default().save(&config_path) {
            eprintln!("Failed to write {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
        println!("Created default configuration at: {}", config_path.display());
        return ExitCode::SUCCESS;
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return exit(EXIT_CONFIG);
        }
    };

    init_logging(&config, args.verbose);
    tracing::debug!("ue-retarget v{}", full_version());

    let Some(command) = args.command else {
        eprintln!("No command given; see --help");
        return exit(EXIT_CONFIG);
    };

    let target = match config.target_path() {
        Ok(target) => target,
        Err(e) => {
            tracing::error!("Could not determine manifest path: {}", e);
            return exit(EXIT_CONFIG);
        }
    };
    let suffix = config.retarget.backup_suffix.clone();

    match command {
        Command::Rewrite => {
            let options = match config.retarget_options() {
                Ok(options) => options,
                Err(e) => {
                    tracing::error!("{}", e);
                    return exit(EXIT_CONFIG);
                }
            };
            match rewrite_manifest(&target, &options) {
                Ok(report) => {
                    println!("Updated {} entries in {}", report.changed, target.display());
                    for note in &report.notes {
                        println!(" - {}", note);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    exit(WorkflowError::from(e).exit_code())
                }
            }
        }
        Command::Snapshot => match backup::snapshot(&target, &suffix) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{}", e);
                exit(WorkflowError::from(e).exit_code())
            }
        },
        Command::Restore => match backup::restore(&target, &suffix) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{}", e);
                exit(WorkflowError::from(e).exit_code())
            }
        },
        Command::Run {
            configuration,
            timeout,
            command,
        } => {
            let options = match config.retarget_options() {
                Ok(options) => options,
                Err(e) => {
                    tracing::error!("{}", e);
                    return exit(EXIT_CONFIG);
                }
            };
            let plan = match config.build_plan(configuration.as_deref(), timeout, &command) {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::error!("{}", e);
                    return exit(EXIT_CONFIG);
                }
            };

            match run_guarded(&target, &options, &suffix, || plan.run()).await {
                Ok(report) => {
                    println!(
                        "Build steps completed; {} entries retargeted, manifest restored",
                        report.rewrite.changed
                    );
                    for note in &report.rewrite.notes {
                        println!(" - {}", note);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    if e.is_restore_failure() {
                        tracing::error!("Manifest restore failed; {} may be left modified", target.display());
                    }
                    tracing::error!("{}", e);
                    exit(e.exit_code())
                }
            }
        }
    }
}
