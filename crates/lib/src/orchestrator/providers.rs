//! Collaborators that supply per-cycle inputs: precompiled binaries and
//! preprocessor defines.

use thiserror::Error;

use crate::config::BuildOptions;
use crate::module::{Module, PrecompiledBinary};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// Lists the precompiled binaries available to this cycle.
pub trait PrecompiledProvider {
  fn list(&mut self) -> Result<Vec<PrecompiledBinary>, ProviderError>;
}

/// A fixed list of binaries.
#[derive(Debug, Clone, Default)]
pub struct StaticPrecompiled {
  binaries: Vec<PrecompiledBinary>,
}

impl StaticPrecompiled {
  pub fn new(binaries: Vec<PrecompiledBinary>) -> Self {
    Self { binaries }
  }
}

impl PrecompiledProvider for StaticPrecompiled {
  fn list(&mut self) -> Result<Vec<PrecompiledBinary>, ProviderError> {
    Ok(self.binaries.clone())
  }
}

/// Computes the defines a module compiles with.
pub trait DefineProvider {
  fn defines(&self, module: &Module, options: &BuildOptions) -> Vec<String>;
}

/// Global defines plus:
/// - `EDITOR` for editor-only modules
/// - `DEBUG` in development builds
/// - the build options' extra defines
#[derive(Debug, Clone, Default)]
pub struct StaticDefines {
  global: Vec<String>,
}

impl StaticDefines {
  pub fn new(global: Vec<String>) -> Self {
    Self { global }
  }
}

impl DefineProvider for StaticDefines {
  fn defines(&self, module: &Module, options: &BuildOptions) -> Vec<String> {
    let mut defines = self.global.clone();
    if module.flags.editor_only {
      defines.push("EDITOR".to_string());
    }
    if options.development {
      defines.push("DEBUG".to_string());
    }
    defines.extend(options.extra_defines.iter().cloned());
    defines
  }
}
