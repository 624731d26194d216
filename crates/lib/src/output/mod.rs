//! Output placement.
//!
//! Compilers write into the scratch directory. Once a module compiled
//! successfully its binary and auxiliary debug files are moved into the
//! output directory. Replacing an existing binary goes through a `.bak`
//! backup so a failed move never leaves the destination empty.

mod stamp;
mod types;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::OrchestratorConfig;
use crate::consts::{BACKUP_EXTENSION, STAMP_FILENAME};
use crate::module::Module;

pub use stamp::{Stamp, read_stamp, write_stamp};
pub use types::{Placement, PlacementError, SweepError, SweepResult};

#[derive(Debug, Clone)]
pub struct OutputPlacer {
  output_dir: PathBuf,
  scratch_dir: PathBuf,
  aux_extensions: Vec<String>,
}

impl OutputPlacer {
  pub fn new(output_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>, aux_extensions: &[String]) -> Self {
    Self {
      output_dir: output_dir.into(),
      scratch_dir: scratch_dir.into(),
      aux_extensions: aux_extensions.to_vec(),
    }
  }

  pub fn from_config(config: &OrchestratorConfig) -> Self {
    Self::new(&config.output_dir, &config.scratch_dir, &config.aux_extensions)
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  pub fn scratch_dir(&self) -> &Path {
    &self.scratch_dir
  }

  /// Where the compiler writes `filename` before placement.
  pub fn scratch_path(&self, filename: &str) -> PathBuf {
    self.scratch_dir.join(filename)
  }

  /// Create the output and scratch directories if needed.
  pub fn ensure_dirs(&self) -> Result<(), PlacementError> {
    for dir in [&self.output_dir, &self.scratch_dir] {
      fs::create_dir_all(dir).map_err(|source| PlacementError::CreateDir {
        path: dir.clone(),
        source,
      })?;
    }
    Ok(())
  }

  /// Auxiliary filenames that belong to a module binary.
  fn aux_filenames(&self, module: &Module) -> Vec<String> {
    self
      .aux_extensions
      .iter()
      .map(|ext| format!("{}.{}", module.name, ext))
      .collect()
  }

  /// Move a freshly compiled module from scratch into its final location.
  ///
  /// # Errors
  ///
  /// Fails when the scratch binary is missing or cannot be moved. Problems
  /// with auxiliary files are collected in [`Placement::problems`] instead.
  pub fn place(&self, module: &Module) -> Result<Placement, PlacementError> {
    let src = self.scratch_path(&module.output_filename);
    let dst = &module.output_path;
    if !src.exists() {
      return Err(PlacementError::MissingOutput(src));
    }
    if let Some(parent) = dst.parent() {
      fs::create_dir_all(parent).map_err(|source| PlacementError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let replaced = move_into_place(&src, dst)?;
    let mut placement = Placement {
      binary: dst.clone(),
      replaced,
      ..Placement::default()
    };

    let dst_dir = dst.parent().unwrap_or(self.output_dir.as_path());
    let mut problems = Vec::new();
    for aux in self.aux_filenames(module) {
      let aux_src = self.scratch_path(&aux);
      let aux_dst = dst_dir.join(&aux);
      if aux_src.exists() {
        match move_into_place(&aux_src, &aux_dst) {
          Ok(_) => placement.aux_moved.push(aux_dst),
          Err(e) => problems.push(e.to_string()),
        }
      } else if aux_dst.exists() {
        match fs::remove_file(&aux_dst) {
          Ok(()) => placement.aux_removed.push(aux_dst),
          Err(e) => problems.push(format!("failed to remove stale {}: {}", aux_dst.display(), e)),
        }
      }
    }
    if !problems.is_empty() {
      warn!(module = %module.name, problems = problems.len(), "auxiliary files not placed");
      placement.problems = Some(problems.join("; "));
    }

    info!(module = %module.name, path = %dst.display(), replaced, "placed module output");
    Ok(placement)
  }

  /// Delete every file in the output directory that does not belong to one of
  /// `keep` (binary or auxiliary file). The stamp file is always preserved.
  pub fn sweep<'a>(
    &self,
    keep: impl IntoIterator<Item = &'a Module>,
    dry_run: bool,
  ) -> Result<SweepResult, SweepError> {
    let mut kept: HashSet<String> = HashSet::new();
    kept.insert(STAMP_FILENAME.to_string());
    for module in keep {
      kept.insert(module.output_filename.clone());
      kept.extend(self.aux_filenames(module));
    }

    let mut result = SweepResult {
      dry_run,
      ..SweepResult::default()
    };
    if !self.output_dir.exists() {
      return Ok(result);
    }

    let entries = WalkDir::new(&self.output_dir)
      .min_depth(1)
      .max_depth(1)
      .sort_by_file_name();
    for entry in entries {
      let entry = entry.map_err(|source| SweepError::Read {
        path: self.output_dir.clone(),
        source,
      })?;
      if !entry.file_type().is_file() {
        continue;
      }
      let name = entry.file_name().to_string_lossy();
      if kept.contains(&*name) {
        continue;
      }

      let path = entry.path().to_path_buf();
      let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
      if dry_run {
        debug!(path = %path.display(), "would delete");
      } else {
        fs::remove_file(&path).map_err(|source| SweepError::Delete {
          path: path.clone(),
          source,
        })?;
        debug!(path = %path.display(), "deleted");
      }
      result.bytes_freed += size;
      result.deleted_paths.push(path);
    }

    info!(
      deleted = result.deleted_paths.len(),
      bytes_freed = result.bytes_freed,
      dry_run,
      "output sweep complete"
    );
    Ok(result)
  }

  /// Record a successful cycle in the output directory.
  pub fn write_stamp(&self) -> Result<(), PlacementError> {
    self.ensure_dirs()?;
    write_stamp(&self.output_dir, &Stamp::now())
  }

  pub fn read_stamp(&self) -> Option<Stamp> {
    read_stamp(&self.output_dir)
  }
}

fn backup_path(dst: &Path) -> PathBuf {
  let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".");
  name.push(BACKUP_EXTENSION);
  dst.with_file_name(name)
}

/// Move `src` to `dst`. Returns whether an existing destination was replaced.
fn move_into_place(src: &Path, dst: &Path) -> Result<bool, PlacementError> {
  move_with(src, dst, rename_or_copy)
}

fn move_with(
  src: &Path,
  dst: &Path,
  mover: impl Fn(&Path, &Path) -> io::Result<()>,
) -> Result<bool, PlacementError> {
  let move_err = |source| PlacementError::Move {
    from: src.to_path_buf(),
    to: dst.to_path_buf(),
    source,
  };

  if !dst.exists() {
    mover(src, dst).map_err(move_err)?;
    return Ok(false);
  }

  let backup = backup_path(dst);
  let backup_err = |source| PlacementError::Backup {
    path: dst.to_path_buf(),
    source,
  };
  match fs::remove_file(&backup) {
    Ok(()) => debug!(path = %backup.display(), "removed stale backup"),
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => return Err(backup_err(e)),
  }
  fs::rename(dst, &backup).map_err(backup_err)?;

  if let Err(e) = mover(src, dst) {
    if let Err(restore) = fs::rename(&backup, dst) {
      warn!(path = %dst.display(), error = %restore, "failed to restore backup");
    }
    return Err(move_err(e));
  }

  if let Err(e) = fs::remove_file(&backup) {
    warn!(path = %backup.display(), error = %e, "failed to remove backup");
  }
  Ok(true)
}

fn rename_or_copy(src: &Path, dst: &Path) -> io::Result<()> {
  match fs::rename(src, dst) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
      debug!(from = %src.display(), to = %dst.display(), "cross-device move, copying");
      fs::copy(src, dst)?;
      fs::remove_file(src)
    }
    Err(e) => Err(e),
  }
}
