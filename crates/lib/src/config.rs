//! Orchestrator configuration.
//!
//! [`OrchestratorConfig`] holds settings that stay fixed for the lifetime of
//! an orchestrator; [`BuildOptions`] are passed with every tick.

use std::path::PathBuf;

use thiserror::Error;

use crate::consts::DEFAULT_AUX_EXTENSIONS;

pub const ENV_OUTPUT_DIR: &str = "MODFORGE_OUTPUT_DIR";
pub const ENV_SCRATCH_DIR: &str = "MODFORGE_SCRATCH_DIR";
pub const ENV_JOBS: &str = "MODFORGE_JOBS";
pub const ENV_STOP_ON_FIRST_ERROR: &str = "MODFORGE_STOP_ON_FIRST_ERROR";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("{var} must be a positive integer, got '{value}'")]
  InvalidJobs { var: &'static str, value: String },

  #[error("{var} must be a boolean (1/0/true/false), got '{value}'")]
  InvalidBool { var: &'static str, value: String },
}

/// What to do with a codegen module that is dirty only because something it
/// references changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CodegenRebuildPolicy {
  /// Leave it alone until its own sources change.
  #[default]
  SkipWhenOnlyReferencesChanged,
  AlwaysRebuild,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
  /// Final location of module binaries.
  pub output_dir: PathBuf,

  /// Where compilers write before placement.
  pub scratch_dir: PathBuf,

  /// Maximum number of compiler invocations running at once.
  pub max_concurrency: usize,

  pub codegen_policy: CodegenRebuildPolicy,

  /// Extensions of debug artifacts moved along with each binary.
  pub aux_extensions: Vec<String>,

  /// Default for [`BuildOptions::stop_on_first_error`].
  pub stop_on_first_error: bool,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      output_dir: PathBuf::from("target").join("modforge").join("out"),
      scratch_dir: PathBuf::from("target").join("modforge").join("scratch"),
      max_concurrency: num_cpus(),
      codegen_policy: CodegenRebuildPolicy::default(),
      aux_extensions: DEFAULT_AUX_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
      stop_on_first_error: false,
    }
  }
}

impl OrchestratorConfig {
  /// Defaults overridden by `MODFORGE_*` environment variables.
  pub fn from_env() -> Result<Self, ConfigError> {
    let mut config = Self::default();

    if let Ok(dir) = std::env::var(ENV_OUTPUT_DIR) {
      config.output_dir = PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var(ENV_SCRATCH_DIR) {
      config.scratch_dir = PathBuf::from(dir);
    }
    if let Ok(value) = std::env::var(ENV_JOBS) {
      config.max_concurrency = match value.trim().parse::<usize>() {
        Ok(jobs) if jobs > 0 => jobs,
        _ => return Err(ConfigError::InvalidJobs { var: ENV_JOBS, value }),
      };
    }
    if let Ok(value) = std::env::var(ENV_STOP_ON_FIRST_ERROR) {
      config.stop_on_first_error = parse_bool(ENV_STOP_ON_FIRST_ERROR, &value)?;
    }

    Ok(config)
  }

  pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.output_dir = dir.into();
    self
  }

  pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.scratch_dir = dir.into();
    self
  }

  /// Set the concurrency cap; zero is raised to one.
  pub fn with_max_concurrency(mut self, jobs: usize) -> Self {
    self.max_concurrency = jobs.max(1);
    self
  }

  pub fn with_codegen_policy(mut self, policy: CodegenRebuildPolicy) -> Self {
    self.codegen_policy = policy;
    self
  }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
  match value.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" | "" => Ok(false),
    _ => Err(ConfigError::InvalidBool {
      var,
      value: value.to_string(),
    }),
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Per-tick build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
  /// Compile editor-only modules.
  pub include_editor_modules: bool,

  /// Development build; adds the `DEBUG` define.
  pub development: bool,

  pub extra_defines: Vec<String>,

  /// Overrides [`OrchestratorConfig::stop_on_first_error`] when set.
  pub stop_on_first_error: Option<bool>,
}

impl BuildOptions {
  pub fn editor() -> Self {
    Self {
      include_editor_modules: true,
      ..Self::default()
    }
  }
}
