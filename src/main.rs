use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use satchel::config::{Layout, Settings, DEFAULT_APP_NAME, EXAMPLE_LAYOUT};
use satchel::pack::verify_artifact;
use satchel::util::log_file_path;
use satchel::{BuildRequest, Launcher, Packager};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "satchel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Self-extracting runner + project bundles",
    long_about = "Run without a subcommand to launch the payload embedded in this executable."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Extraction directory (default: <local data dir>/<app name>)
    #[arg(long, global = true, env = "SATCHEL_TARGET_DIR")]
    target_dir: Option<PathBuf>,

    /// Application name used for the default extraction directory
    #[arg(long, global = true, env = "SATCHEL_APP_NAME", default_value = DEFAULT_APP_NAME)]
    app_name: String,
}

impl GlobalArgs {
    fn settings(&self) -> Settings {
        let settings = Settings::default().with_app_name(self.app_name.clone());
        match &self.target_dir {
            Some(dir) => settings.with_target_dir(dir.clone()),
            None => settings,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the embedded payload (if needed) and run it
    Launch {
        /// Artifact to launch (default: this executable)
        #[arg(long)]
        artifact: Option<PathBuf>,
    },

    /// Build a self-extracting artifact
    Build {
        /// Path to the runner executable (a bare name is looked up in PATH)
        #[arg(long)]
        runner: PathBuf,

        /// Cached environment directory to embed (optional, for offline use)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Project directory
        #[arg(long)]
        project: PathBuf,

        /// Output path for the self-extracting artifact
        #[arg(short, long, default_value = "assistant")]
        output: PathBuf,

        /// Launcher payload (default: this executable)
        #[arg(long)]
        launcher: Option<PathBuf>,

        /// Layout file (see `satchel layout`)
        #[arg(long)]
        layout: Option<PathBuf>,

        /// Directory for build intermediates (default: system temp)
        #[arg(long)]
        temp_dir: Option<PathBuf>,
    },

    /// Check that a file is a well-formed artifact and print its payload hash
    Verify {
        /// Artifact to verify
        artifact: PathBuf,
    },

    /// Print an example layout file
    Layout,
}

/// Log to stderr and, when given, append to a file without ANSI colors
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            Some(OpenOptions::new().create(true).append(true).open(path)?)
        }
        None => None,
    };
    let file_layer = file.map(|file| fmt::layer().with_writer(Mutex::new(file)).with_ansi(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;
    Ok(())
}

fn launch(global: &GlobalArgs, artifact: Option<PathBuf>) -> i32 {
    let settings = global.settings();
    let target = settings.extraction_dir();

    if let Err(e) = init_logging(global.verbose, Some(&log_file_path(&target))) {
        eprintln!("Failed to open launcher log: {e:#}");
        if let Err(e) = init_logging(global.verbose, None) {
            eprintln!("Failed to initialize logging: {e:#}");
        }
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "satchel launcher");
    tracing::info!(dir = %target.display(), "Extraction directory");

    let artifact = match artifact {
        Some(path) => path,
        None => match std::env::current_exe() {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(error = %e, "Cannot determine the running executable");
                return 1;
            }
        },
    };

    match Launcher::new(settings).run(&artifact) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Launch failed");
            e.exit_code()
        }
    }
}

fn build(global: &GlobalArgs, request: BuildRequest) -> Result<()> {
    let report = Packager::new(global.settings())
        .build(&request)
        .context("Build failed")?;

    println!("Output: {}", report.path.display());
    println!("Size: {} bytes", report.total_len);
    println!("Payload SHA256: {}", report.archive_sha256);
    Ok(())
}

fn verify(global: &GlobalArgs, artifact: &Path) -> Result<()> {
    let settings = global.settings();
    let report = verify_artifact(artifact, &settings.marker)
        .with_context(|| format!("{} is not a valid artifact", artifact.display()))?;

    println!("Artifact: {}", report.path.display());
    println!("Archive offset: {}", report.archive_offset);
    println!("Archive size: {} bytes", report.archive_len);
    println!("Payload SHA256: {}", report.archive_sha256);
    Ok(())
}

/// Run a packager-side command with stderr-only logging
fn run_tool(global: &GlobalArgs, command: impl FnOnce() -> Result<()>) -> i32 {
    if let Err(e) = init_logging(global.verbose, None) {
        eprintln!("Failed to initialize logging: {e:#}");
    }
    match command() {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{e:#}");
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let global = &cli.global;

    let code = match cli.command {
        None => launch(global, None),
        Some(Commands::Launch { artifact }) => launch(global, artifact),
        Some(Commands::Build {
            runner,
            cache_dir,
            project,
            output,
            launcher,
            layout,
            temp_dir,
        }) => run_tool(global, || {
            let layout = Layout::load(layout.as_deref())?;
            let request = BuildRequest {
                runner,
                cache_dir,
                project,
                output,
                launcher,
                temp_dir,
                layout,
            };
            build(global, request)
        }),
        Some(Commands::Verify { artifact }) => run_tool(global, || verify(global, &artifact)),
        Some(Commands::Layout) => run_tool(global, || {
            print!("{EXAMPLE_LAYOUT}");
            Ok(())
        }),
    };

    std::process::exit(code);
}
