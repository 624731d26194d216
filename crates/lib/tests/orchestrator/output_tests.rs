use std::fs;

use modforge_lib::config::BuildOptions;
use modforge_lib::consts::STAMP_FILENAME;
use modforge_lib::orchestrator::TickStatus;

use super::common::{ScriptedCompiler, TestProject, chain, load, source_of};

#[test]
fn rebuilt_binary_replaces_existing_without_backup_left() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());
  project.run();

  let core = project.output("Core.lib");
  fs::write(&core, "stale build").unwrap();

  project.orch.notify_source_changed(&source_of("Core"));
  assert_eq!(project.run(), TickStatus::CompilationComplete);

  assert_eq!(fs::read_to_string(&core).unwrap(), "Core");
  assert!(!project.output("Core.lib.bak").exists());
  assert!(!project.temp.path().join("scratch").join("Core.lib").exists());
}

#[test]
fn stale_backup_from_an_interrupted_run_is_discarded() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());
  project.run();
  fs::write(project.output("Util.lib.bak"), "left over").unwrap();

  project.orch.notify_source_changed(&source_of("Util"));
  assert_eq!(project.run(), TickStatus::CompilationComplete);

  assert!(!project.output("Util.lib.bak").exists());
  assert_eq!(fs::read_to_string(project.output("Util.lib")).unwrap(), "Util");
}

#[test]
fn sweep_removes_outputs_of_deleted_modules() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  load(&mut project.orch, chain());
  project.run();

  let mut decls = chain();
  decls.retain(|d| d.name != "Solo");
  project.orch.load_declarations(decls, Vec::new());
  project.run();

  let preview = project.orch.sweep_outputs(true).unwrap();
  assert!(preview.dry_run);
  assert_eq!(preview.deleted_paths, vec![project.output("Solo.lib")]);
  assert!(project.output("Solo.lib").exists());

  let swept = project.orch.sweep_outputs(false).unwrap();
  assert_eq!(swept.deleted_paths.len(), 1);
  assert!(!project.output("Solo.lib").exists());
  assert!(project.output("Core.lib").exists());
  assert!(project.output(STAMP_FILENAME).exists());
}

#[test]
fn unwritable_output_directory_fails_the_cycle() {
  let mut project = TestProject::new(ScriptedCompiler::new());
  fs::write(project.temp.path().join("out"), "not a directory").unwrap();
  load(&mut project.orch, chain());

  assert_eq!(project.orch.tick(&BuildOptions::default()), TickStatus::CompilationFailed);
  assert!(project.invocations.borrow().started.is_empty());
  assert!(project.orch.dirty_state().all_modules_dirty());
}
