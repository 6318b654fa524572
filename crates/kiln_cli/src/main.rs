//! Kiln CLI: runs compiler-plugin build cycles for a project.
//!
//! `kiln build` compiles every target declared in `kiln.toml` and writes the
//! results under the configured output directory. `kiln cache` inspects and
//! prunes the persisted compile cache.

#![warn(missing_docs)]

mod build;
mod cache;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Kiln, a caching compiler-plugin build engine.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln build engine")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a custom `kiln.toml` or the project directory.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one build cycle.
    Build(BuildArgs),
    /// Manage the compile cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Arguments for the `kiln build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Output format for diagnostics.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// Only build these architectures (default: all configured).
    #[arg(short, long = "arch")]
    pub archs: Vec<String>,
}

/// `kiln cache` subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CacheCommand {
    /// Delete every cache entry.
    Clean,
    /// Delete scope directories no live plugin owns.
    Gc,
    /// Print scope and entry counts.
    Stats,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Diagnostic output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::env::var("TERM").is_ok(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Cache(ref command) => cache::run(command, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins; otherwise the level
/// follows `--quiet`/`--verbose`. Cache debug lines are always let through,
/// since the engine only emits them for families that asked for them.
fn init_logging(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_directives(global.quiet, global.verbose))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(global.color)
        .without_time()
        .try_init();
}

fn default_directives(quiet: bool, verbose: bool) -> String {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    format!("{level},{}=debug", kiln_plugin::debug::DEBUG_TARGET)
}

/// Walks up from `start` looking for the nearest directory containing `kiln.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(kiln_config::CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {} in {} or any parent directory",
                kiln_config::CONFIG_FILE,
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory looking for `kiln.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match &global.config {
        Some(config_path) => {
            let p = PathBuf::from(config_path);
            if p.is_file() {
                Ok(p.parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(".")))
            } else {
                Ok(p)
            }
        }
        None => find_project_root(&std::env::current_dir()?),
    }
}
