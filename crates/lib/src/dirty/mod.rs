//! Dirty-state ledger.
//!
//! Tracks which modules and which precompiled binaries are stale. Modules are
//! keyed by output filename so entries survive graph rebuilds: a module that
//! was dirty before the rebuild is still dirty afterwards as long as it keeps
//! its filename.
//!
//! Each category has an "all dirty" flag for global invalidations. While the
//! flag is set every item counts as dirty; fine-grained entries are kept but
//! redundant.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, trace};

use crate::graph::ModuleGraph;
use crate::module::Module;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirtyState {
  modules: BTreeSet<String>,
  binaries: BTreeSet<String>,
  all_modules: bool,
  all_binaries: bool,
}

impl DirtyState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn mark_module_dirty(&mut self, module: &Module) {
    self.mark_filename_dirty(&module.output_filename);
  }

  /// Mark a module dirty by output filename, whether or not the current graph
  /// knows it.
  pub fn mark_filename_dirty(&mut self, filename: &str) {
    if self.modules.insert(filename.to_string()) {
      debug!(module = %filename, "module marked dirty");
    }
  }

  pub fn mark_all_dirty(&mut self) {
    if !self.all_modules {
      debug!("all modules marked dirty");
    }
    self.all_modules = true;
  }

  pub fn mark_binary_dirty(&mut self, name: &str) {
    if self.binaries.insert(name.to_string()) {
      debug!(binary = %name, "precompiled binary marked dirty");
    }
  }

  pub fn mark_all_binaries_dirty(&mut self) {
    if !self.all_binaries {
      debug!("all precompiled binaries marked dirty");
    }
    self.all_binaries = true;
  }

  /// Forget a successfully compiled module.
  ///
  /// Removes the fine-grained entry even while the all-dirty flag is set, so
  /// a retry after a later failure only needs the remaining entries.
  pub fn clear_compiled(&mut self, filename: &str) {
    if self.modules.remove(filename) {
      trace!(module = %filename, "cleared compiled module");
    }
  }

  pub fn clear_all(&mut self) {
    self.modules.clear();
    self.binaries.clear();
    self.all_modules = false;
    self.all_binaries = false;
    debug!("dirty state cleared");
  }

  pub fn has_any_dirty_modules(&self) -> bool {
    self.all_modules || !self.modules.is_empty()
  }

  pub fn has_any_dirty_binaries(&self) -> bool {
    self.all_binaries || !self.binaries.is_empty()
  }

  pub fn is_dirty(&self) -> bool {
    self.has_any_dirty_modules() || self.has_any_dirty_binaries()
  }

  pub fn all_modules_dirty(&self) -> bool {
    self.all_modules
  }

  pub fn all_binaries_dirty(&self) -> bool {
    self.all_binaries
  }

  pub fn is_module_dirty(&self, filename: &str) -> bool {
    self.all_modules || self.modules.contains(filename)
  }

  pub fn is_binary_dirty(&self, name: &str) -> bool {
    self.all_binaries || self.binaries.contains(name)
  }

  /// Fine-grained dirty module filenames.
  pub fn dirty_modules(&self) -> impl Iterator<Item = &str> {
    self.modules.iter().map(String::as_str)
  }

  /// Fine-grained dirty binary names.
  pub fn dirty_binaries(&self) -> impl Iterator<Item = &str> {
    self.binaries.iter().map(String::as_str)
  }

  /// Fold `other` into this ledger.
  pub fn merge(&mut self, other: DirtyState) {
    self.modules.extend(other.modules);
    self.binaries.extend(other.binaries);
    self.all_modules |= other.all_modules;
    self.all_binaries |= other.all_binaries;
  }

  /// Resolve fine-grained entries against a freshly built graph.
  ///
  /// Returns the modules the entries map to. Entries whose module no longer
  /// exists are kept: the next cycle compiles nothing for them but still
  /// reports completion.
  pub fn remap<'g>(&self, graph: &'g ModuleGraph) -> Vec<&'g Module> {
    let mut resolved = Vec::new();
    let mut stale = 0usize;
    for filename in &self.modules {
      match graph.get_by_filename(filename) {
        Some(module) => resolved.push(module),
        None => stale += 1,
      }
    }
    if stale > 0 {
      debug!(stale, "dirty entries without a module in the new graph");
    }
    resolved
  }
}
