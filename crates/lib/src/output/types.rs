use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlacementError {
  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("compiler output {0} does not exist")]
  MissingOutput(PathBuf),

  #[error("failed to move {from} to {to}: {source}")]
  Move {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to back up {path}: {source}")]
  Backup {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write stamp file {path}: {source}")]
  Stamp {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Error)]
pub enum SweepError {
  #[error("failed to read output directory {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to delete {path}: {source}")]
  Delete {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// What happened while placing one module.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Placement {
  pub binary: PathBuf,

  /// Destination already held a binary that was replaced.
  pub replaced: bool,

  /// Auxiliary files moved next to the binary.
  pub aux_moved: Vec<PathBuf>,

  /// Stale auxiliary files removed because the new build has none.
  pub aux_removed: Vec<PathBuf>,

  /// Combined message for auxiliary files that could not be handled.
  pub problems: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct SweepResult {
  pub deleted_paths: Vec<PathBuf>,
  pub bytes_freed: u64,
  pub dry_run: bool,
}
