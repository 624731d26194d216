//! Module dependency graph.
//!
//! This module provides:
//! - Graph construction from declarations plus the enumerated source set
//! - Default grouping of unowned sources into predefined modules
//! - Transitive queries over the reverse-reference index
//! - Topological ordering and parallel waves for presentation
//!
//! The graph is immutable once built apart from per-configuration defines.
//! Any change to declarations or sources produces a new graph.

mod types;
mod validate;

use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use crate::consts::{DEFAULT_EDITOR_MODULE, DEFAULT_MODULE, EDITOR_FOLDER};
use crate::module::{Module, ModuleFlags, SourceLanguage};

pub use types::{GraphInput, SetupError};

/// A validated graph together with the non-fatal problems found while
/// building it.
#[derive(Debug)]
pub struct GraphOutcome {
  pub graph: ModuleGraph,
  pub exceptions: Vec<SetupError>,
}

/// Mapping from module name to module, plus derived indexes.
#[derive(Debug, Default)]
pub struct ModuleGraph {
  modules: BTreeMap<String, Module>,

  /// Source path -> owning module name.
  source_index: HashMap<PathBuf, String>,

  /// Output filename -> module name.
  filename_index: HashMap<String, String>,

  /// Module name -> names of modules referencing it. Built on first use.
  referencing: OnceCell<HashMap<String, Vec<String>>>,
}

/// Who owns a source directory.
enum Owner<'a> {
  Module(&'a str),
  Ref(&'a str),
}

impl ModuleGraph {
  /// Build and validate a graph.
  ///
  /// # Errors
  ///
  /// Returns `CyclicReferences` when the declared references form a cycle.
  /// Every other problem is reported in [`GraphOutcome::exceptions`] and the
  /// offending declarations are left out of the graph.
  pub fn build(input: GraphInput<'_>) -> Result<GraphOutcome, SetupError> {
    let validated = validate::validate(input.modules, input.module_refs)?;

    let mut modules: BTreeMap<String, Module> = BTreeMap::new();
    for resolved in &validated.modules {
      let decl = resolved.decl;
      let mut module = Module::new(&decl.name, input.output_dir);
      module.directory = Some(decl.directory.clone());
      module.declaration_path = Some(decl.path.clone());
      module.references = resolved.references.clone();
      module.unresolved_references = resolved.unresolved.clone();
      module.precompiled_references = decl.precompiled_references.clone();
      module.flags = ModuleFlags {
        editor_only: decl.editor_only,
        explicitly_referenced: !decl.auto_referenced,
        codegen: decl.codegen,
        allow_unsafe: decl.allow_unsafe,
        predefined: false,
        override_references: decl.override_references,
      };
      modules.insert(decl.name.clone(), module);
    }

    // Deepest directories first so nested declarations win.
    let mut owners: Vec<(&Path, Owner<'_>)> = validated
      .modules
      .iter()
      .map(|m| (m.decl.directory.as_path(), Owner::Module(m.decl.name.as_str())))
      .chain(
        validated
          .module_refs
          .iter()
          .map(|(decl, target)| (decl.directory.as_path(), Owner::Ref(target.as_str()))),
      )
      .collect();
    owners.sort_by_key(|(dir, _)| std::cmp::Reverse(dir.components().count()));

    let mut predefined: BTreeMap<&str, Module> = BTreeMap::new();
    for source in input.sources {
      if SourceLanguage::from_path(source).is_none() {
        continue;
      }
      let owner = owners.iter().find(|(dir, _)| source.starts_with(dir));
      let target = match owner {
        Some((_, Owner::Module(name))) | Some((_, Owner::Ref(name))) => modules.get_mut(*name),
        None => {
          let name = if is_editor_path(source) {
            DEFAULT_EDITOR_MODULE
          } else {
            DEFAULT_MODULE
          };
          Some(
            predefined
              .entry(name)
              .or_insert_with(|| predefined_module(name, input.output_dir)),
          )
        }
      };
      if let Some(module) = target {
        module.sources.insert(source.clone());
      }
    }

    link_predefined(&mut predefined, &modules);
    for (name, module) in predefined {
      modules.insert(name.to_string(), module);
    }

    let graph = Self::from_modules(modules);

    info!(
      modules = graph.len(),
      exceptions = validated.exceptions.len(),
      "built module graph"
    );

    Ok(GraphOutcome {
      graph,
      exceptions: validated.exceptions,
    })
  }

  fn from_modules(modules: BTreeMap<String, Module>) -> Self {
    let source_index = modules
      .values()
      .flat_map(|m| m.sources.iter().map(|s| (s.clone(), m.name.clone())))
      .collect();
    let filename_index = modules
      .values()
      .map(|m| (m.output_filename.clone(), m.name.clone()))
      .collect();

    Self {
      modules,
      source_index,
      filename_index,
      referencing: OnceCell::new(),
    }
  }

  pub fn get(&self, name: &str) -> Option<&Module> {
    self.modules.get(name)
  }

  pub fn get_by_filename(&self, filename: &str) -> Option<&Module> {
    self.filename_index.get(filename).and_then(|name| self.modules.get(name))
  }

  pub fn contains(&self, name: &str) -> bool {
    self.modules.contains_key(name)
  }

  /// The module a source file was grouped into.
  pub fn owner_of(&self, source: &Path) -> Option<&Module> {
    self.source_index.get(source).and_then(|name| self.modules.get(name))
  }

  /// All modules, ordered by name.
  pub fn modules(&self) -> impl Iterator<Item = &Module> {
    self.modules.values()
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  /// Direct references of a module.
  pub fn references_of(&self, name: &str) -> &[String] {
    self.modules.get(name).map(|m| m.references.as_slice()).unwrap_or_default()
  }

  /// Names of modules directly referencing `name`.
  pub fn referencing_modules(&self, name: &str) -> &[String] {
    self.reverse_index().get(name).map(Vec::as_slice).unwrap_or_default()
  }

  fn reverse_index(&self) -> &HashMap<String, Vec<String>> {
    self.referencing.get_or_init(|| {
      let mut index: HashMap<String, Vec<String>> = HashMap::new();
      for module in self.modules.values() {
        for reference in &module.references {
          index.entry(reference.clone()).or_default().push(module.name.clone());
        }
      }
      debug!(entries = index.len(), "built reverse reference index");
      index
    })
  }

  /// The module itself plus every module depending on it, directly or
  /// indirectly. Unknown names yield an empty list.
  pub fn closure_of_referencing_modules(&self, name: &str) -> Vec<String> {
    if !self.contains(name) {
      return Vec::new();
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut closure = Vec::new();
    let mut work: VecDeque<&str> = VecDeque::new();
    work.push_back(name);

    while let Some(current) = work.pop_front() {
      if !seen.insert(current) {
        continue;
      }
      closure.push(current.to_string());
      for dependent in self.referencing_modules(current) {
        if !seen.contains(dependent.as_str()) {
          work.push_back(dependent);
        }
      }
    }

    closure
  }

  /// Overwrite the defines of every module.
  pub fn apply_defines(&mut self, mut defines_for: impl FnMut(&Module) -> Vec<String>) {
    for module in self.modules.values_mut() {
      let mut defines = defines_for(module);
      defines.sort();
      defines.dedup();
      module.defines = defines;
    }
  }

  fn dag(&self) -> DiGraph<&str, ()> {
    let mut dag = DiGraph::new();
    let mut nodes = HashMap::new();
    for name in self.modules.keys() {
      nodes.insert(name.as_str(), dag.add_node(name.as_str()));
    }
    for module in self.modules.values() {
      let dependent = nodes[module.name.as_str()];
      for reference in &module.references {
        if let Some(&dependency) = nodes.get(reference.as_str()) {
          // Edge from dependency to dependent
          dag.add_edge(dependency, dependent, ());
        }
      }
    }
    dag
  }

  /// Module names with dependencies before dependents.
  pub fn topological_order(&self) -> Result<Vec<String>, SetupError> {
    let dag = self.dag();
    let sorted = toposort(&dag, None).map_err(|cycle| {
      let name = dag[cycle.node_id()].to_string();
      SetupError::CyclicReferences {
        paths: self
          .get(&name)
          .and_then(|m| m.declaration_path.clone())
          .into_iter()
          .collect(),
        modules: vec![name],
      }
    })?;
    Ok(sorted.into_iter().map(|idx| dag[idx].to_string()).collect())
  }

  /// Modules grouped into waves; every module's references sit in earlier
  /// waves, so the modules of one wave can compile in parallel.
  pub fn waves(&self) -> Vec<Vec<String>> {
    let dag = self.dag();
    let mut in_degree: HashMap<NodeIndex, usize> = dag
      .node_indices()
      .map(|idx| (idx, dag.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut waves = Vec::new();
    let mut ready: Vec<NodeIndex> = dag.node_indices().filter(|idx| in_degree[idx] == 0).collect();

    while !ready.is_empty() {
      let mut next = Vec::new();
      for &idx in &ready {
        for dependent in dag.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(degree) = in_degree.get_mut(&dependent) {
            *degree = degree.saturating_sub(1);
            if *degree == 0 {
              next.push(dependent);
            }
          }
        }
      }
      let mut wave: Vec<String> = ready.iter().map(|&idx| dag[idx].to_string()).collect();
      wave.sort();
      waves.push(wave);
      ready = next;
    }

    waves
  }
}

fn is_editor_path(path: &Path) -> bool {
  path.components().any(|c| match c {
    Component::Normal(segment) => segment
      .to_str()
      .is_some_and(|s| s.eq_ignore_ascii_case(EDITOR_FOLDER)),
    _ => false,
  })
}

fn predefined_module(name: &str, output_dir: &Path) -> Module {
  let mut module = Module::new(name, output_dir);
  module.flags.predefined = true;
  module.flags.editor_only = name == DEFAULT_EDITOR_MODULE;
  module
}

/// Predefined modules reference every auto-referenced declared module; the
/// editor module also references the runtime default module.
fn link_predefined(predefined: &mut BTreeMap<&str, Module>, declared: &BTreeMap<String, Module>) {
  let has_default = predefined.contains_key(DEFAULT_MODULE);
  for (name, module) in predefined.iter_mut() {
    let editor = *name == DEFAULT_EDITOR_MODULE;
    module.references = declared
      .values()
      .filter(|m| !m.flags.explicitly_referenced)
      .filter(|m| editor || !m.flags.editor_only)
      .map(|m| m.name.clone())
      .collect();
    if editor && has_default {
      module.references.push(DEFAULT_MODULE.to_string());
    }
  }
}
