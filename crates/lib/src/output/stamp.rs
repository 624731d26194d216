//! Sentinel stamp file recording the last successful cycle.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::PlacementError;
use crate::consts::{STAMP_FILENAME, STAMP_VERSION};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
  pub version: u32,
  /// Seconds since the unix epoch.
  pub last_success: u64,
}

impl Stamp {
  pub fn now() -> Self {
    let last_success = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or_default();
    Self {
      version: STAMP_VERSION,
      last_success,
    }
  }
}

/// Write the stamp atomically (temp file, then rename).
pub fn write_stamp(output_dir: &Path, stamp: &Stamp) -> Result<(), PlacementError> {
  let path = output_dir.join(STAMP_FILENAME);
  let temp_path = output_dir.join(format!("{}.tmp", STAMP_FILENAME));
  let stamp_err = |source: io::Error| PlacementError::Stamp {
    path: path.clone(),
    source,
  };

  let content = serde_json::to_string_pretty(stamp).map_err(|e| stamp_err(e.into()))?;
  fs::write(&temp_path, content).map_err(stamp_err)?;
  fs::rename(&temp_path, &path).map_err(stamp_err)?;

  debug!(path = %path.display(), last_success = stamp.last_success, "wrote stamp");
  Ok(())
}

/// Read the stamp, if present and readable.
pub fn read_stamp(output_dir: &Path) -> Option<Stamp> {
  let path = output_dir.join(STAMP_FILENAME);
  let content = fs::read_to_string(&path).ok()?;
  match serde_json::from_str::<Stamp>(&content) {
    Ok(stamp) if stamp.version == STAMP_VERSION => Some(stamp),
    Ok(stamp) => {
      warn!(path = %path.display(), version = stamp.version, "ignoring stamp with unknown version");
      None
    }
    Err(e) => {
      warn!(path = %path.display(), error = %e, "ignoring unreadable stamp");
      None
    }
  }
}
