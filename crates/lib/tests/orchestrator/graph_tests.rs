use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use modforge_lib::graph::{GraphInput, ModuleGraph, SetupError};
use modforge_lib::module::{ModuleDecl, ModuleRefDecl, ReferenceDecl};

use super::common::{module, source_of};

fn build(decls: &[ModuleDecl], refs: &[ModuleRefDecl], sources: &BTreeSet<PathBuf>) -> Result<ModuleGraph, SetupError> {
  let outcome = ModuleGraph::build(GraphInput {
    modules: decls,
    module_refs: refs,
    sources,
    output_dir: Path::new("/out"),
  })?;
  assert!(outcome.exceptions.is_empty(), "unexpected exceptions: {:?}", outcome.exceptions);
  Ok(outcome.graph)
}

fn sources_for(decls: &[ModuleDecl]) -> BTreeSet<PathBuf> {
  decls.iter().map(|d| source_of(&d.name)).collect()
}

#[test]
fn two_module_cycle_names_both() {
  let decls = vec![module("A").with_reference("B"), module("B").with_reference("A")];
  let err = build(&decls, &[], &sources_for(&decls)).unwrap_err();

  let SetupError::CyclicReferences { modules, paths } = err else {
    panic!("expected a cycle error");
  };
  let modules: HashSet<_> = modules.into_iter().collect();
  assert_eq!(modules, HashSet::from(["A".to_string(), "B".to_string()]));
  assert!(paths.contains(&PathBuf::from("src/a/A.module.json")));
  assert!(paths.contains(&PathBuf::from("src/b/B.module.json")));
}

#[test]
fn closure_follows_reverse_references_once() {
  // Base <- Left <- Top, Base <- Right <- Top, Other unrelated.
  let decls = vec![
    module("Base"),
    module("Left").with_reference("Base"),
    module("Right").with_reference("Base"),
    module("Top").with_reference("Left").with_reference("Right"),
    module("Other"),
  ];
  let graph = build(&decls, &[], &sources_for(&decls)).unwrap();

  let mut closure = graph.closure_of_referencing_modules("Base");
  assert_eq!(closure[0], "Base");
  closure.sort();
  assert_eq!(closure, vec!["Base", "Left", "Right", "Top"]);

  assert_eq!(graph.closure_of_referencing_modules("Top"), vec!["Top"]);
  assert!(graph.closure_of_referencing_modules("Missing").is_empty());
}

#[test]
fn module_ref_directory_feeds_its_target() {
  let decls = vec![module("Core").with_id("core-id")];
  let refs = vec![ModuleRefDecl::new("third_party/core_ext", ReferenceDecl::Id("core-id".to_string()))];
  let sources: BTreeSet<PathBuf> = [source_of("Core"), PathBuf::from("third_party/core_ext/ext.rs")]
    .into_iter()
    .collect();
  let graph = build(&decls, &refs, &sources).unwrap();

  let core = graph.get("Core").unwrap();
  assert_eq!(core.sources.len(), 2);
  assert_eq!(graph.owner_of(Path::new("third_party/core_ext/ext.rs")).unwrap().name, "Core");
}

#[test]
fn unowned_sources_land_in_default_modules() {
  let decls = vec![module("Core")];
  let sources: BTreeSet<PathBuf> = [
    source_of("Core"),
    PathBuf::from("game/main.rs"),
    PathBuf::from("game/editor/panel.rs"),
  ]
  .into_iter()
  .collect();
  let graph = build(&decls, &[], &sources).unwrap();

  assert_eq!(graph.owner_of(Path::new("game/main.rs")).unwrap().name, "Default");
  assert_eq!(
    graph.owner_of(Path::new("game/editor/panel.rs")).unwrap().name,
    "Default-Editor"
  );
  assert!(graph.get("Default-Editor").unwrap().flags.editor_only);
}
