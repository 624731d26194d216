mod cmd;
mod output;
mod project;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{BuildArgs, cmd_build, cmd_clean, cmd_graph};
use crate::output::OutputFormat;

/// modforge - incremental module build orchestrator
#[derive(Parser)]
#[command(name = "modforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (overridden by RUST_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile every module that is out of date
  Build {
    /// Path to the project file
    #[arg(default_value = "modforge.json")]
    project: PathBuf,

    /// Maximum number of simultaneous compiler invocations
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Abort the build at the first failing module
    #[arg(long)]
    stop_on_first_error: bool,

    /// Include editor-only modules
    #[arg(long)]
    editor: bool,

    /// Development build (adds the DEBUG define)
    #[arg(long)]
    development: bool,

    /// Extra preprocessor define, may be repeated
    #[arg(short = 'D', long = "define")]
    defines: Vec<String>,

    /// Keep running and rebuild when sources change
    #[arg(short, long)]
    watch: bool,

    /// How often watch mode rescans sources (e.g., "500ms", "2s")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    poll_interval: Duration,
  },

  /// Show the module graph in build order
  Graph {
    /// Path to the project file
    #[arg(default_value = "modforge.json")]
    project: PathBuf,

    /// Only list the modules rebuilt when this module changes
    #[arg(long)]
    dependents: Option<String>,

    /// Output format
    #[arg(short = 'o', long = "format", value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Delete output files that belong to no module
  Clean {
    /// Path to the project file
    #[arg(default_value = "modforge.json")]
    project: PathBuf,

    /// Preview what would be deleted without deleting
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short = 'o', long = "format", value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build {
      project,
      jobs,
      stop_on_first_error,
      editor,
      development,
      defines,
      watch,
      poll_interval,
    } => {
      let args = BuildArgs {
        jobs,
        stop_on_first_error,
        editor,
        development,
        defines,
        watch,
        poll_interval,
        verbose: cli.verbose,
      };
      cmd_build(&project, &args)
    }
    Commands::Graph {
      project,
      dependents,
      output,
    } => cmd_graph(&project, dependents.as_deref(), output),
    Commands::Clean {
      project,
      dry_run,
      output,
    } => cmd_clean(&project, dry_run, output),
  }
}
