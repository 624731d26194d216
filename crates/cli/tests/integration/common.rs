//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// "Compiles" by concatenating sources into the output. Sources containing
/// `FAIL` produce a diagnostic and a non-zero exit.
#[cfg(unix)]
const COMPILER: &str = r#"{
  "source_root": "src",
  "output_dir": "out",
  "scratch_dir": "scratch",
  "defines": ["PLATFORM_TEST"],
  "compilers": [
    {
      "language": "rust",
      "program": "/bin/sh",
      "args": [
        "-c",
        "if grep -q FAIL \"$@\"; then echo \"$1:1:1: error: forced failure\" >&2; exit 1; fi; cat \"$@\" > '{out}'",
        "cc",
        "{sources}"
      ]
    }
  ]
}"#;

/// Isolated project directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A project compiling Rust sources with the shell compiler.
  #[cfg(unix)]
  pub fn project() -> Self {
    let env = Self::empty();
    env.write_file("modforge.json", COMPILER);
    env
  }

  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("src")).unwrap();
    Self { temp }
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Declare module `name` owning `src/<dir>` with one source file.
  pub fn module(&self, name: &str, dir: &str, references: &[&str]) {
    let refs: Vec<String> = references.iter().map(|r| format!(r#"{{ "name": "{}" }}"#, r)).collect();
    self.write_file(
      &format!("src/{}/{}.module.json", dir, name),
      &format!(r#"{{ "name": "{}", "references": [{}] }}"#, name, refs.join(", ")),
    );
    self.write_file(&format!("src/{}/lib.rs", dir), &format!("// {}\n", name));
  }

  pub fn output(&self, filename: &str) -> PathBuf {
    self.temp.path().join("out").join(filename)
  }

  /// A command for the modforge binary running inside the project.
  pub fn modforge_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("modforge");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("MODFORGE_OUTPUT_DIR");
    cmd.env_remove("MODFORGE_SCRATCH_DIR");
    cmd.env_remove("MODFORGE_JOBS");
    cmd.env_remove("MODFORGE_STOP_ON_FIRST_ERROR");
    cmd
  }
}
