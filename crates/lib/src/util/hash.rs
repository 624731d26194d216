//! Hashing utilities.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 hex digest
//! - `fingerprint_defines()`: global fingerprint of every module's defines
//! - `hash_file()`: single file hashing, used to detect source edits

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::FINGERPRINT_PREFIX_LEN;
use crate::module::Module;

/// A lowercase hexadecimal SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Truncated form for log output.
  pub fn short(&self) -> &str {
    &self.0[..FINGERPRINT_PREFIX_LEN.min(self.0.len())]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to read {path}: {source}")]
pub struct HashError {
  pub path: PathBuf,
  #[source]
  pub source: io::Error,
}

/// Fingerprint of the defines of every module.
///
/// Modules are hashed in iteration order, so callers pass them in a stable
/// order (the graph iterates by name).
pub fn fingerprint_defines<'a>(modules: impl IntoIterator<Item = &'a Module>) -> ContentHash {
  let mut hasher = Sha256::new();
  for module in modules {
    hasher.update(module.name.as_bytes());
    hasher.update(b"\0");
    for define in &module.defines {
      hasher.update(define.as_bytes());
      hasher.update(b"\n");
    }
    hasher.update(b"\0");
  }
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |source| HashError {
    path: path.to_path_buf(),
    source,
  };
  let mut file = fs::File::open(path).map_err(read_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}
