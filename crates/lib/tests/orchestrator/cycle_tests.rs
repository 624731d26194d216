use std::path::Path;

use modforge_lib::config::{BuildOptions, CodegenRebuildPolicy};
use modforge_lib::module::{ModuleDecl, PrecompiledBinary, SourceLanguage};
use modforge_lib::orchestrator::{
  CompilationEvent, PrecompiledProvider, ProviderError, StaticPrecompiled, TickStatus,
};
use modforge_lib::schedule::ExclusionReason;

use super::common::{ScriptedCompiler, TestProject, chain, load, module, source_of};

#[test]
fn clean_state_stays_idle() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::Idle);
  assert!(!project.orch.is_compiling());

  load(&mut project.orch, chain());
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  project.reset_invocations();

  for _ in 0..5 {
    assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::Idle);
  }
  assert!(project.invocations.borrow().started.is_empty());
}

#[test]
fn second_run_without_changes_is_idle() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());

  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(project.run(), TickStatus::Idle);
  assert_eq!(
    project.invocations.borrow().started_sorted(),
    vec!["App", "Core", "Solo", "Util"]
  );
  assert!(project.output("App.lib").exists());
  assert!(project.orch.last_success().is_some());
}

#[test]
fn dirty_leaf_compiles_alone() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());
  project.run();
  project.reset_invocations();

  project.orch.notify_source_changed(&source_of("Solo"));
  assert!(project.orch.is_compiling());
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["Solo"]);
}

#[test]
fn dirty_root_recompiles_its_dependents() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());
  project.run();
  project.reset_invocations();

  project.orch.notify_source_changed(&source_of("Core"));
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["Core", "Util", "App"]);
  assert!(!project.orch.dirty_state().is_dirty());
}

#[test]
fn concurrency_never_exceeds_cap() {
  let compiler = ScriptedCompiler::new().taking(3);
  let mut project = TestProject::with_config(compiler, |config| config.with_max_concurrency(2));
  load(
    &mut project.orch,
    vec![module("A"), module("B"), module("C"), module("D"), module("E")],
  );

  while project.orch.tick(&BuildOptions::default()) != TickStatus::CompilationComplete {
    if let Some(task) = project.orch.current_task() {
      assert!(task.running_count() <= 2);
    }
  }

  let invocations = project.invocations.borrow();
  assert_eq!(invocations.started.len(), 5);
  assert_eq!(invocations.peak, 2);
}

#[test]
fn failed_first_build_keeps_everything_dirty() {
  let mut project = TestProject::new(ScriptedCompiler::new().failing("Util"));
  load(&mut project.orch, chain());

  assert_eq!(project.run(), TickStatus::CompilationFailed);
  assert_eq!(
    project.invocations.borrow().started_sorted(),
    vec!["Core", "Solo", "Util"]
  );
  assert!(project.orch.dirty_state().all_modules_dirty());
  assert!(project.output("Core.lib").exists());
  assert!(!project.output("App.lib").exists());
}

#[test]
fn failure_skips_dependents_and_waits_for_a_notification() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());
  project.run();
  project.reset_invocations();
  project.orch.drain_events();

  project.compiler.break_module("Util");
  project.orch.notify_source_changed(&source_of("Core"));
  assert_eq!(project.run(), TickStatus::CompilationFailed);
  assert_eq!(project.invocations.borrow().started, vec!["Core", "Util"]);

  let dirty = project.orch.dirty_state();
  assert!(dirty.is_module_dirty("Util.lib"));
  assert!(dirty.is_module_dirty("App.lib"));
  assert!(!dirty.is_module_dirty("Core.lib"));
  assert!(!dirty.is_module_dirty("Solo.lib"));

  assert!(!project.orch.is_compiling());
  assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::Idle);

  let events = project.orch.drain_events();
  assert!(events.iter().any(|e| matches!(
    e,
    CompilationEvent::ModuleFinished { module, succeeded: false, messages, .. }
      if module == "Util" && messages.iter().any(|m| m.message == "expected `;`")
  )));
  assert!(events.contains(&CompilationEvent::ModuleSkipped {
    module: "App".to_string(),
    failed_dependency: "Util".to_string(),
  }));
}

#[test]
fn stop_cancels_and_keeps_dirty_state() {
  let mut project = TestProject::new(ScriptedCompiler::new().taking(100));
  load(&mut project.orch, chain());

  assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::CompilationStarted);
  assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::Compiling);
  project.orch.stop();

  assert!(project.orch.current_task().is_none());
  assert!(project.orch.is_compiling());
  assert!(project.orch.dirty_state().all_modules_dirty());
  assert_eq!(project.invocations.borrow().running, 0);
  assert_eq!(
    project.invocations.borrow().cancelled.len(),
    project.invocations.borrow().started.len()
  );
  assert!(!project.output("Core.lib").exists());
  assert_eq!(project.orch.drain_events().last(), Some(&CompilationEvent::CycleStopped));

  project.reset_invocations();
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(
    project.invocations.borrow().started_sorted(),
    vec!["App", "Core", "Solo", "Util"]
  );
  assert!(project.output("App.lib").exists());
}

#[test]
fn notifications_during_a_cycle_start_another() {
  let mut project = TestProject::new(ScriptedCompiler::new().taking(2));
  load(&mut project.orch, chain());

  assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::CompilationStarted);
  project.orch.notify_source_changed(&source_of("Solo"));
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  project.reset_invocations();

  assert!(project.orch.is_compiling());
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["Solo"]);
}

#[test]
fn moved_source_rebuilds_both_owners() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());
  project.run();
  project.reset_invocations();

  project
    .orch
    .notify_source_moved(&source_of("Solo"), Path::new("src/util/extra.rs"));
  assert_eq!(project.run(), TickStatus::CompilationComplete);

  // Solo has no sources left and is not compiled.
  assert_eq!(project.invocations.borrow().started_sorted(), vec!["App", "Util"]);
  assert!(!project.orch.graph().get("Solo").unwrap().has_sources());
}

#[test]
fn removed_source_compiles_nothing() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());
  project.run();
  project.reset_invocations();

  project.orch.notify_source_removed(&source_of("Solo"));
  assert!(project.orch.is_compiling());
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert!(project.invocations.borrow().started.is_empty());
}

#[test]
fn removing_the_last_default_source_completes_a_cycle() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  project.orch.set_sources([source_of("Core"), Path::new("game/main.rs").to_path_buf()]);
  project.orch.load_declarations(vec![module("Core")], Vec::new());
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert!(project.output("Default.lib").exists());
  project.reset_invocations();

  project.orch.notify_source_removed(Path::new("game/main.rs"));
  assert!(project.orch.graph().get("Default").is_none());
  assert!(project.orch.is_compiling());
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert!(project.invocations.borrow().started.is_empty());
  assert!(!project.orch.dirty_state().is_dirty());

  let swept = project.orch.sweep_outputs(false).unwrap();
  assert_eq!(swept.deleted_paths, vec![project.output("Default.lib")]);
}

#[test]
fn non_source_files_are_ignored() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());
  project.run();

  project.orch.notify_source_changed(Path::new("src/core/README.md"));
  assert!(!project.orch.is_compiling());
}

#[test]
fn setup_errors_block_cycles_until_fixed() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  project.orch.set_sources([source_of("A"), source_of("B")]);

  let errors = project.orch.load_declarations(
    vec![module("A").with_reference("B"), module("B").with_reference("A")],
    Vec::new(),
  );
  assert_eq!(errors.len(), 1);
  assert!(errors[0].is_cycle());
  assert!(!project.orch.is_compiling());
  assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::Idle);
  assert!(!project.orch.setup_errors().is_empty());

  let errors = project
    .orch
    .load_declarations(vec![module("A").with_reference("B"), module("B")], Vec::new());
  assert!(errors.is_empty());
  assert!(project.orch.is_compiling());
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["B", "A"]);
}

#[test]
fn duplicate_names_block_cycles() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  project.orch.set_sources([source_of("Core")]);

  let errors = project.orch.load_declarations(
    vec![module("Core"), ModuleDecl::new("Core", "src/other")],
    Vec::new(),
  );
  assert!(!errors.is_empty());
  assert!(errors[0].paths().iter().any(|p| p.starts_with("src/other")));
  assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::Idle);
  assert!(project.invocations.borrow().started.is_empty());
}

#[test]
fn editor_modules_are_excluded_by_default() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, vec![module("Tools").editor_only()]);

  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert!(project.invocations.borrow().started.is_empty());
  assert!(project.orch.drain_events().contains(&CompilationEvent::ModuleExcluded {
    module: "Tools".to_string(),
    reason: ExclusionReason::EditorOnly,
  }));
  assert!(project.orch.dirty_state().is_module_dirty("Tools.lib"));
  assert_eq!(project.run(), TickStatus::Idle);

  assert_eq!(project.run_with(&BuildOptions::editor()), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["Tools"]);
  assert!(!project.orch.dirty_state().is_dirty());
}

#[test]
fn excluded_modules_stay_dirty_next_to_built_ones() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, vec![module("Core"), module("Tools").editor_only()]);

  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["Core"]);
  assert!(!project.orch.dirty_state().is_module_dirty("Core.lib"));
  assert!(project.orch.dirty_state().is_module_dirty("Tools.lib"));

  project.reset_invocations();
  assert_eq!(project.run_with(&BuildOptions::editor()), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["Tools"]);
}

#[test]
fn codegen_module_skips_rebuild_for_reference_changes() {
  let decls = || vec![module("Core"), module("Gen").codegen().with_reference("Core")];

  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, decls());
  project.run();
  project.reset_invocations();
  project.orch.notify_source_changed(&source_of("Core"));
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["Core"]);

  let mut project = TestProject::with_config(ScriptedCompiler::new(), |config| {
    config.with_codegen_policy(CodegenRebuildPolicy::AlwaysRebuild)
  });
  load(&mut project.orch, decls());
  project.run();
  project.reset_invocations();
  project.orch.notify_source_changed(&source_of("Core"));
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["Core", "Gen"]);
}

#[test]
fn changed_binary_rebuilds_its_users() {
  let zlib = PrecompiledBinary {
    name: "zlib.lib".to_string(),
    path: "vendor/zlib.lib".into(),
    auto_referenced: false,
  };
  let mut project = TestProject::build(ScriptedCompiler::new(), |config| config, |orch| {
    orch.with_precompiled_provider(StaticPrecompiled::new(vec![zlib]))
  });

  let mut decls = chain();
  decls[1] = decls[1].clone().with_precompiled("zlib.lib");
  load(&mut project.orch, decls);
  project.run();
  project.reset_invocations();

  project.orch.notify_binary_dependency_changed(Some("zlib.lib"));
  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert_eq!(project.invocations.borrow().started, vec!["Util", "App"]);
}

struct UnreachableVendor;

impl PrecompiledProvider for UnreachableVendor {
  fn list(&mut self) -> Result<Vec<PrecompiledBinary>, ProviderError> {
    Err(ProviderError("vendor directory is unreadable".to_string()))
  }
}

#[test]
fn precompiled_listing_failure_abandons_the_cycle() {
  let mut project = TestProject::build(ScriptedCompiler::new(), |config| config, |orch| {
    orch.with_precompiled_provider(UnreachableVendor)
  });
  load(&mut project.orch, chain());

  assert!(project.orch.is_compiling());
  assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::Idle);
  assert!(!project.orch.is_compiling());
  assert!(project.orch.dirty_state().all_modules_dirty());
  assert!(project.invocations.borrow().started.is_empty());
}

#[test]
fn mixed_language_module_is_excluded() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  project
    .orch
    .set_sources([source_of("Core"), Path::new("src/core/shim.c").to_path_buf()]);
  project.orch.load_declarations(vec![module("Core")], Vec::new());

  assert_eq!(project.run(), TickStatus::CompilationComplete);
  assert!(project.invocations.borrow().started.is_empty());
  assert!(project.orch.drain_events().contains(&CompilationEvent::ModuleExcluded {
    module: "Core".to_string(),
    reason: ExclusionReason::MixedLanguages(vec![SourceLanguage::Rust, SourceLanguage::C]),
  }));
}
