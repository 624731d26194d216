use predicates::prelude::*;

use super::common::TestEnv;

fn project_with_stale_output() -> TestEnv {
  let env = TestEnv::empty();
  env.write_file("modforge.json", r#"{ "output_dir": "out" }"#);
  env.module("Core", "core", &[]);
  env.write_file("out/Core.lib", "current");
  env.write_file("out/Core.pdb", "current debug info");
  env.write_file("out/Removed.lib", "stale");
  env.write_file("out/.modforge-stamp", "{}");
  env
}

#[test]
fn clean_dry_run_keeps_files() {
  let env = project_with_stale_output();

  env
    .modforge_cmd()
    .args(["clean", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"))
    .stdout(predicate::str::contains("Removed.lib"));

  assert!(env.output("Removed.lib").exists());
}

#[test]
fn clean_removes_only_unowned_files() {
  let env = project_with_stale_output();

  env
    .modforge_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Clean complete!"));

  assert!(!env.output("Removed.lib").exists());
  assert!(env.output("Core.lib").exists());
  assert!(env.output("Core.pdb").exists());
  assert!(env.output(".modforge-stamp").exists());
}

#[test]
fn clean_json_output_is_valid() {
  let env = project_with_stale_output();

  env
    .modforge_cmd()
    .args(["clean", "--dry-run", "--format", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("deleted_paths"))
    .stdout(predicate::str::contains("bytes_freed"));
}
