//! Types for module graph construction.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::module::{ModuleDecl, ModuleRefDecl};

/// A problem with the declared module set.
///
/// Every variant except [`SetupError::CyclicReferences`] is non-fatal for graph
/// construction: the offending declarations are left out and the rest of the
/// graph is still built. Any setup error blocks new compilation cycles until
/// the declarations are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
  #[error("module name '{name}' is reserved: {path}")]
  ReservedName { name: String, path: PathBuf },

  #[error("duplicate module name '{name}' declared in {first} and {second}")]
  DuplicateName {
    name: String,
    first: PathBuf,
    second: PathBuf,
  },

  #[error("directory {directory} is claimed by both {first} and {second}")]
  DuplicateDirectory {
    directory: PathBuf,
    first: PathBuf,
    second: PathBuf,
  },

  #[error("module '{module}' references '{reference}' more than once: {path}")]
  DuplicateReference {
    module: String,
    reference: String,
    path: PathBuf,
  },

  #[error("module reference {path} targets unknown module '{target}'")]
  UnknownReferenceTarget { target: String, path: PathBuf },

  #[error("cyclic module references between: {}", modules.join(", "))]
  CyclicReferences { modules: Vec<String>, paths: Vec<PathBuf> },
}

impl SetupError {
  /// Declaration files involved in this error.
  pub fn paths(&self) -> Vec<&Path> {
    match self {
      SetupError::ReservedName { path, .. }
      | SetupError::DuplicateReference { path, .. }
      | SetupError::UnknownReferenceTarget { path, .. } => vec![path.as_path()],
      SetupError::DuplicateName { first, second, .. } | SetupError::DuplicateDirectory { first, second, .. } => {
        vec![first.as_path(), second.as_path()]
      }
      SetupError::CyclicReferences { paths, .. } => paths.iter().map(PathBuf::as_path).collect(),
    }
  }

  pub fn is_cycle(&self) -> bool {
    matches!(self, SetupError::CyclicReferences { .. })
  }
}

/// Everything the graph is built from.
#[derive(Debug, Clone, Copy)]
pub struct GraphInput<'a> {
  pub modules: &'a [ModuleDecl],
  pub module_refs: &'a [ModuleRefDecl],
  pub sources: &'a BTreeSet<PathBuf>,
  pub output_dir: &'a Path,
}
