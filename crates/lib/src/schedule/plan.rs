//! Build-plan computation: which modules compile this cycle, in which wave.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, info};

use super::{Exclusion, ExclusionReason};
use crate::compile::CompilerSet;
use crate::config::{BuildOptions, CodegenRebuildPolicy};
use crate::dirty::DirtyState;
use crate::graph::ModuleGraph;
use crate::module::{Module, PrecompiledBinary};

/// Everything a plan is computed from.
#[derive(Clone, Copy)]
pub struct PlanInput<'a> {
  pub graph: &'a ModuleGraph,
  pub dirty: &'a DirtyState,
  pub compilers: &'a CompilerSet,
  pub precompiled: &'a [PrecompiledBinary],
  pub options: &'a BuildOptions,
  pub policy: CodegenRebuildPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
  /// First wave: codegen modules plus the modules they need, dependencies
  /// first.
  pub codegen: Vec<String>,

  /// Everything else, dependencies first.
  pub ordinary: Vec<String>,

  pub excluded: Vec<Exclusion>,

  /// Codegen modules dirty only because something they reference changed.
  pub deferred: Vec<String>,
}

impl BuildPlan {
  pub fn compute(input: PlanInput<'_>) -> Self {
    let graph = input.graph;
    let order: Vec<String> = graph.waves().into_iter().flatten().collect();

    let excluded = exclusions(&order, input);
    let direct = directly_dirty(input);

    let mut scope: HashSet<String> = HashSet::new();
    for name in &direct {
      scope.extend(graph.closure_of_referencing_modules(name));
    }

    let mut plan = BuildPlan::default();
    let mut planned: Vec<&Module> = Vec::new();
    for name in &order {
      if !scope.contains(name) {
        continue;
      }
      let Some(module) = graph.get(name) else {
        continue;
      };
      if !module.has_sources() {
        debug!(module = %name, "no sources, nothing to compile");
        continue;
      }
      if let Some(reason) = excluded.get(name.as_str()) {
        plan.excluded.push(Exclusion {
          module: name.clone(),
          reason: reason.clone(),
        });
        continue;
      }
      if module.flags.codegen
        && !direct.contains(name.as_str())
        && input.policy == CodegenRebuildPolicy::SkipWhenOnlyReferencesChanged
      {
        debug!(module = %name, "codegen module only dirty through references, deferring");
        plan.deferred.push(name.clone());
        continue;
      }
      planned.push(module);
    }

    let wave = codegen_wave(&planned);
    for module in planned {
      if wave.contains(module.name.as_str()) {
        plan.codegen.push(module.name.clone());
      } else {
        plan.ordinary.push(module.name.clone());
      }
    }

    info!(
      dirty = direct.len(),
      codegen = plan.codegen.len(),
      ordinary = plan.ordinary.len(),
      excluded = plan.excluded.len(),
      deferred = plan.deferred.len(),
      "computed build plan"
    );
    plan
  }

  /// Number of modules to compile.
  pub fn len(&self) -> usize {
    self.codegen.len() + self.ordinary.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains(&self, name: &str) -> bool {
    self.modules().any(|m| m == name)
  }

  /// Modules in start order: codegen wave first.
  pub fn modules(&self) -> impl Iterator<Item = &str> {
    self.codegen.iter().chain(&self.ordinary).map(String::as_str)
  }
}

/// Exclusion reasons for every module with sources, propagated to modules
/// referencing an excluded one. `order` must list dependencies first.
fn exclusions<'a>(order: &'a [String], input: PlanInput<'_>) -> BTreeMap<&'a str, ExclusionReason> {
  let mut excluded: BTreeMap<&str, ExclusionReason> = BTreeMap::new();
  for name in order {
    let Some(module) = input.graph.get(name) else {
      continue;
    };
    if !module.has_sources() {
      continue;
    }

    let reason = if module.flags.editor_only && !input.options.include_editor_modules {
      Some(ExclusionReason::EditorOnly)
    } else if let Some(reference) = module.references.iter().find(|r| excluded.contains_key(r.as_str())) {
      Some(ExclusionReason::ExcludedReference(reference.clone()))
    } else {
      match module.language() {
        None => Some(ExclusionReason::MixedLanguages(module.languages().into_iter().collect())),
        Some(language) if !input.compilers.supports(language) => Some(ExclusionReason::NoCompiler(language)),
        Some(_) => None,
      }
    };

    if let Some(reason) = reason {
      excluded.insert(name.as_str(), reason);
    }
  }
  excluded
}

/// Modules that are dirty themselves, as opposed to through a reference.
fn directly_dirty<'g>(input: PlanInput<'g>) -> BTreeSet<&'g str> {
  let graph = input.graph;
  let dirty = input.dirty;

  let mut direct: BTreeSet<&str> = BTreeSet::new();
  if dirty.all_modules_dirty() {
    direct.extend(graph.modules().map(|m| m.name.as_str()));
  } else {
    direct.extend(dirty.remap(graph).into_iter().map(|m| m.name.as_str()));
  }

  if dirty.has_any_dirty_binaries() {
    for module in graph.modules() {
      let names = precompiled_names(module, input.precompiled);
      if names.iter().any(|name| dirty.is_binary_dirty(name)) {
        direct.insert(module.name.as_str());
      }
    }
  }
  direct
}

/// Codegen modules plus every planned module they reference, transitively.
fn codegen_wave<'a>(planned: &[&'a Module]) -> HashSet<&'a str> {
  let by_name: BTreeMap<&str, &Module> = planned.iter().map(|m| (m.name.as_str(), *m)).collect();
  let mut wave: HashSet<&str> = HashSet::new();
  let mut work: Vec<&str> = planned
    .iter()
    .filter(|m| m.flags.codegen)
    .map(|m| m.name.as_str())
    .collect();

  while let Some(name) = work.pop() {
    if !wave.insert(name) {
      continue;
    }
    if let Some(module) = by_name.get(name) {
      for reference in &module.references {
        if let Some((&dep, _)) = by_name.get_key_value(reference.as_str()) {
          work.push(dep);
        }
      }
    }
  }
  wave
}

/// Names of the precompiled binaries a module links against: those it lists
/// plus, unless it overrides references, every auto-referenced binary.
pub fn precompiled_names<'a>(module: &'a Module, available: &'a [PrecompiledBinary]) -> Vec<&'a str> {
  let mut names: Vec<&str> = module.precompiled_references.iter().map(String::as_str).collect();
  if !module.flags.override_references {
    for binary in available.iter().filter(|b| b.auto_referenced) {
      if !names.contains(&binary.name.as_str()) {
        names.push(binary.name.as_str());
      }
    }
  }
  names
}
