//! Declaration validation pipeline.
//!
//! Steps run in a fixed order and accumulate errors. A declaration rejected by
//! one step is invisible to the later ones:
//!
//! 1. reserved names
//! 2. duplicate names (case-insensitive)
//! 3. duplicate ownership directories (modules and module references jointly)
//! 4. resolution of identifier references
//! 5. duplicate resolved references
//! 6. cycle detection (fatal)

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::consts::RESERVED_MODULE_NAMES;
use crate::module::{ModuleDecl, ModuleRefDecl, ReferenceDecl};

use super::types::SetupError;

/// A module declaration that passed validation.
#[derive(Debug)]
pub(crate) struct ResolvedDecl<'a> {
  pub decl: &'a ModuleDecl,
  /// Resolved references to modules in the validated set.
  pub references: Vec<String>,
  /// References to names or identifiers nothing resolves to.
  pub unresolved: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct Validated<'a> {
  pub modules: Vec<ResolvedDecl<'a>>,
  /// Module-reference declarations with their resolved target name.
  pub module_refs: Vec<(&'a ModuleRefDecl, String)>,
  pub exceptions: Vec<SetupError>,
}

pub(crate) fn validate<'a>(
  modules: &'a [ModuleDecl],
  module_refs: &'a [ModuleRefDecl],
) -> Result<Validated<'a>, SetupError> {
  let mut exceptions = Vec::new();

  let survivors = reject_reserved_names(modules, &mut exceptions);
  let survivors = reject_duplicate_names(survivors, &mut exceptions);
  let (survivors, refs) = reject_duplicate_directories(survivors, module_refs, &mut exceptions);
  let resolved = resolve_references(&survivors);
  let resolved = reject_duplicate_references(resolved, &mut exceptions);
  let resolved = partition_unresolved(resolved);
  let module_refs = resolve_ref_targets(&resolved, refs, &survivors, &mut exceptions);

  detect_cycles(&resolved)?;

  debug!(
    modules = resolved.len(),
    module_refs = module_refs.len(),
    exceptions = exceptions.len(),
    "validated declarations"
  );

  Ok(Validated {
    modules: resolved,
    module_refs,
    exceptions,
  })
}

fn is_reserved(name: &str) -> bool {
  RESERVED_MODULE_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn reject_reserved_names<'a>(modules: &'a [ModuleDecl], exceptions: &mut Vec<SetupError>) -> Vec<&'a ModuleDecl> {
  modules
    .iter()
    .filter(|decl| {
      if is_reserved(&decl.name) {
        exceptions.push(SetupError::ReservedName {
          name: decl.name.clone(),
          path: decl.path.clone(),
        });
        false
      } else {
        true
      }
    })
    .collect()
}

fn reject_duplicate_names<'a>(modules: Vec<&'a ModuleDecl>, exceptions: &mut Vec<SetupError>) -> Vec<&'a ModuleDecl> {
  let mut by_name: HashMap<String, Vec<&ModuleDecl>> = HashMap::new();
  for decl in &modules {
    by_name.entry(decl.name.to_lowercase()).or_default().push(*decl);
  }

  let mut rejected: HashSet<String> = HashSet::new();
  for decl in &modules {
    let key = decl.name.to_lowercase();
    let group = &by_name[&key];
    if group.len() < 2 || !rejected.insert(key) {
      continue;
    }
    let first = group[0];
    for other in &group[1..] {
      exceptions.push(SetupError::DuplicateName {
        name: other.name.clone(),
        first: first.path.clone(),
        second: other.path.clone(),
      });
    }
  }

  modules
    .into_iter()
    .filter(|decl| !rejected.contains(&decl.name.to_lowercase()))
    .collect()
}

#[derive(Clone, Copy)]
enum DirectoryClaim<'a> {
  Module(&'a ModuleDecl),
  Ref(&'a ModuleRefDecl),
}

impl DirectoryClaim<'_> {
  fn path(&self) -> &Path {
    match self {
      DirectoryClaim::Module(decl) => &decl.path,
      DirectoryClaim::Ref(decl) => &decl.path,
    }
  }
}

fn reject_duplicate_directories<'a>(
  modules: Vec<&'a ModuleDecl>,
  module_refs: &'a [ModuleRefDecl],
  exceptions: &mut Vec<SetupError>,
) -> (Vec<&'a ModuleDecl>, Vec<&'a ModuleRefDecl>) {
  let mut claims: BTreeMap<&Path, Vec<DirectoryClaim<'a>>> = BTreeMap::new();
  for decl in &modules {
    claims.entry(&decl.directory).or_default().push(DirectoryClaim::Module(*decl));
  }
  for decl in module_refs {
    claims.entry(&decl.directory).or_default().push(DirectoryClaim::Ref(decl));
  }

  let mut rejected: HashSet<PathBuf> = HashSet::new();
  for (directory, group) in &claims {
    if group.len() < 2 {
      continue;
    }
    let first = group[0];
    for other in &group[1..] {
      exceptions.push(SetupError::DuplicateDirectory {
        directory: directory.to_path_buf(),
        first: first.path().to_path_buf(),
        second: other.path().to_path_buf(),
      });
    }
    for claim in group {
      rejected.insert(claim.path().to_path_buf());
    }
  }

  let modules = modules.into_iter().filter(|d| !rejected.contains(&d.path)).collect();
  let refs = module_refs.iter().filter(|d| !rejected.contains(&d.path)).collect();
  (modules, refs)
}

/// Map identifier references to names. Name references pass through as-is;
/// an identifier nothing declares becomes unresolved.
fn resolve_references<'a>(modules: &[&'a ModuleDecl]) -> Vec<ResolvedDecl<'a>> {
  let ids: HashMap<&str, &str> = modules
    .iter()
    .filter_map(|d| d.id.as_deref().map(|id| (id, d.name.as_str())))
    .collect();

  modules
    .iter()
    .map(|&decl| {
      let mut references = Vec::new();
      let mut unresolved = Vec::new();
      for reference in &decl.references {
        match reference {
          ReferenceDecl::Name(name) => references.push(name.clone()),
          ReferenceDecl::Id(id) => match ids.get(id.as_str()) {
            Some(name) => references.push((*name).to_string()),
            None => {
              warn!(module = %decl.name, id = %id, "reference identifier does not resolve");
              unresolved.push(id.clone());
            }
          },
        }
      }
      ResolvedDecl {
        decl,
        references,
        unresolved,
      }
    })
    .collect()
}

fn reject_duplicate_references<'a>(
  modules: Vec<ResolvedDecl<'a>>,
  exceptions: &mut Vec<SetupError>,
) -> Vec<ResolvedDecl<'a>> {
  modules
    .into_iter()
    .filter(|resolved| {
      let mut seen = HashSet::new();
      let duplicate = resolved.references.iter().find(|r| !seen.insert(r.as_str()));
      match duplicate {
        Some(reference) => {
          exceptions.push(SetupError::DuplicateReference {
            module: resolved.decl.name.clone(),
            reference: reference.clone(),
            path: resolved.decl.path.clone(),
          });
          false
        }
        None => true,
      }
    })
    .collect()
}

/// Move references to modules outside the validated set into `unresolved`.
fn partition_unresolved(mut modules: Vec<ResolvedDecl<'_>>) -> Vec<ResolvedDecl<'_>> {
  let known: HashSet<String> = modules.iter().map(|m| m.decl.name.clone()).collect();
  for resolved in &mut modules {
    let (found, missing): (Vec<String>, Vec<String>) =
      resolved.references.drain(..).partition(|r| known.contains(r));
    for name in &missing {
      warn!(module = %resolved.decl.name, reference = %name, "unresolved module reference");
    }
    resolved.references = found;
    resolved.unresolved.extend(missing);
  }
  modules
}

fn resolve_ref_targets<'a>(
  modules: &[ResolvedDecl<'a>],
  module_refs: Vec<&'a ModuleRefDecl>,
  all_survivors: &[&'a ModuleDecl],
  exceptions: &mut Vec<SetupError>,
) -> Vec<(&'a ModuleRefDecl, String)> {
  let names: HashSet<&str> = modules.iter().map(|m| m.decl.name.as_str()).collect();
  let ids: HashMap<&str, &str> = all_survivors
    .iter()
    .filter_map(|d| d.id.as_deref().map(|id| (id, d.name.as_str())))
    .collect();

  module_refs
    .into_iter()
    .filter_map(|decl| {
      let (target, name) = match &decl.target {
        ReferenceDecl::Name(name) => (name.as_str(), Some(name.as_str())),
        ReferenceDecl::Id(id) => (id.as_str(), ids.get(id.as_str()).copied()),
      };
      match name.filter(|n| names.contains(n)) {
        Some(name) => Some((decl, name.to_string())),
        None => {
          exceptions.push(SetupError::UnknownReferenceTarget {
            target: target.to_string(),
            path: decl.path.clone(),
          });
          None
        }
      }
    })
    .collect()
}

/// Depth-first search over every declared module.
///
/// `visited` is never re-traversed; `stack` is the current recursion path.
/// Meeting a node already on the path reports the whole path as the cycle.
fn detect_cycles(modules: &[ResolvedDecl<'_>]) -> Result<(), SetupError> {
  let edges: HashMap<&str, &[String]> = modules
    .iter()
    .map(|m| (m.decl.name.as_str(), m.references.as_slice()))
    .collect();
  let paths: HashMap<&str, &Path> = modules.iter().map(|m| (m.decl.name.as_str(), m.decl.path.as_path())).collect();

  let cycle_error = |names: Vec<&str>| SetupError::CyclicReferences {
    paths: names.iter().filter_map(|n| paths.get(n)).map(|p| p.to_path_buf()).collect(),
    modules: names.into_iter().map(str::to_string).collect(),
  };

  let mut visited: HashSet<&str> = HashSet::new();
  let mut stack: Vec<&str> = Vec::new();

  for module in modules {
    let root = module.decl.name.as_str();
    if visited.contains(root) {
      continue;
    }
    if let Some(cycle) = visit(root, &edges, &mut visited, &mut stack) {
      return Err(cycle_error(cycle));
    }
  }

  Ok(())
}

fn visit<'a>(
  node: &'a str,
  edges: &HashMap<&'a str, &'a [String]>,
  visited: &mut HashSet<&'a str>,
  stack: &mut Vec<&'a str>,
) -> Option<Vec<&'a str>> {
  visited.insert(node);
  stack.push(node);

  for reference in edges.get(node).copied().unwrap_or_default() {
    let reference = reference.as_str();
    if reference == node {
      return Some(vec![node]);
    }
    if stack.contains(&reference) {
      return Some(stack.clone());
    }
    if !visited.contains(reference)
      && let Some(cycle) = visit(reference, edges, visited, stack)
    {
      return Some(cycle);
    }
  }

  stack.pop();
  None
}
