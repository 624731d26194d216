#![cfg(unix)]

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_compiles_every_module() {
  let env = TestEnv::project();
  env.module("Core", "core", &[]);
  env.module("App", "app", &["Core"]);

  env
    .modforge_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Compiling 2 module(s)"))
    .stdout(predicate::str::contains("Build complete"));

  assert_eq!(std::fs::read_to_string(env.output("Core.lib")).unwrap(), "// Core\n");
  assert!(env.output("App.lib").exists());
  assert!(env.output(".modforge-stamp").exists());
  assert!(!env.output("Core.lib.bak").exists());
}

#[test]
fn failing_module_fails_the_build_and_skips_dependents() {
  let env = TestEnv::project();
  env.module("Core", "core", &[]);
  env.module("App", "app", &["Core"]);
  env.write_file("src/core/lib.rs", "FAIL\n");

  env
    .modforge_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Core failed"))
    .stderr(predicate::str::contains("error: forced failure"))
    .stderr(predicate::str::contains("App skipped"))
    .stderr(predicate::str::contains("Build failed"));

  assert!(!env.output("App.lib").exists());
}

#[test]
fn cyclic_declarations_are_reported() {
  let env = TestEnv::project();
  env.module("A", "a", &["B"]);
  env.module("B", "b", &["A"]);

  env
    .modforge_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("cyclic module references"))
    .stderr(predicate::str::contains("setup error"));
}

#[test]
fn jobs_flag_accepts_a_cap() {
  let env = TestEnv::project();
  for name in ["A", "B", "C"] {
    env.module(name, &name.to_lowercase(), &[]);
  }

  env
    .modforge_cmd()
    .args(["build", "-j", "1", "--development", "-D", "EXTRA"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Compiling 3 module(s)"));
}
