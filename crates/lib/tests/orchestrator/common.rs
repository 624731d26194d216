//! Shared helpers for orchestrator integration tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use modforge_lib::compile::{CompileError, CompileJob, CompileOutput, CompileRequest, Compiler, CompilerSet, Diagnostic};
use modforge_lib::config::{BuildOptions, OrchestratorConfig};
use modforge_lib::module::{ModuleDecl, SourceLanguage};
use modforge_lib::orchestrator::{Orchestrator, TickStatus};
use tempfile::TempDir;

/// Everything a [`ScriptedCompiler`] was asked to do.
#[derive(Debug, Default)]
pub struct Invocations {
  pub started: Vec<String>,
  pub cancelled: Vec<String>,
  pub running: usize,
  pub peak: usize,
}

impl Invocations {
  pub fn started_sorted(&self) -> Vec<String> {
    let mut started = self.started.clone();
    started.sort();
    started
  }
}

/// Compiler whose invocations take `polls` ticks and fail for listed modules.
#[derive(Clone)]
pub struct ScriptedCompiler {
  polls: usize,
  failing: Rc<RefCell<HashSet<String>>>,
  invocations: Rc<RefCell<Invocations>>,
}

impl ScriptedCompiler {
  pub fn new() -> Self {
    Self {
      polls: 1,
      failing: Rc::default(),
      invocations: Rc::default(),
    }
  }

  pub fn taking(mut self, polls: usize) -> Self {
    self.polls = polls;
    self
  }

  pub fn failing(self, module: &str) -> Self {
    self.break_module(module);
    self
  }

  /// Make later invocations of `module` fail.
  pub fn break_module(&self, module: &str) {
    self.failing.borrow_mut().insert(module.to_string());
  }

  pub fn invocations(&self) -> Rc<RefCell<Invocations>> {
    Rc::clone(&self.invocations)
  }
}

impl Compiler for ScriptedCompiler {
  fn language(&self) -> SourceLanguage {
    SourceLanguage::Rust
  }

  fn start(&mut self, request: &CompileRequest) -> Result<Box<dyn CompileJob>, CompileError> {
    let mut invocations = self.invocations.borrow_mut();
    invocations.started.push(request.module.clone());
    invocations.running += 1;
    invocations.peak = invocations.peak.max(invocations.running);
    Ok(Box::new(ScriptedJob {
      module: request.module.clone(),
      output: request.output_path.clone(),
      remaining: self.polls,
      fail: self.failing.borrow().contains(&request.module),
      invocations: Rc::clone(&self.invocations),
    }))
  }
}

struct ScriptedJob {
  module: String,
  output: PathBuf,
  remaining: usize,
  fail: bool,
  invocations: Rc<RefCell<Invocations>>,
}

impl CompileJob for ScriptedJob {
  fn poll(&mut self) -> Option<CompileOutput> {
    if self.remaining > 0 {
      self.remaining -= 1;
      return None;
    }
    self.invocations.borrow_mut().running -= 1;
    if self.fail {
      let error = Diagnostic::error("expected `;`").at(format!("src/{}.rs", self.module.to_lowercase()), 3, 9);
      return Some(CompileOutput::failed(vec![error]));
    }
    fs::create_dir_all(self.output.parent().unwrap()).unwrap();
    fs::write(&self.output, &self.module).unwrap();
    Some(CompileOutput::succeeded(Vec::new()))
  }

  fn cancel(&mut self) {
    let mut invocations = self.invocations.borrow_mut();
    invocations.running -= 1;
    invocations.cancelled.push(self.module.clone());
  }
}

/// An orchestrator over a temp directory, wired to one scripted compiler.
pub struct TestProject {
  pub temp: TempDir,
  pub orch: Orchestrator,
  pub compiler: ScriptedCompiler,
  pub invocations: Rc<RefCell<Invocations>>,
}

impl TestProject {
  pub fn new(compiler: ScriptedCompiler) -> Self {
    Self::with_config(compiler, |config| config)
  }

  pub fn with_config(compiler: ScriptedCompiler, adjust: impl FnOnce(OrchestratorConfig) -> OrchestratorConfig) -> Self {
    Self::build(compiler, adjust, |orch| orch)
  }

  /// Full control: adjust the config, then the constructed orchestrator.
  pub fn build(
    compiler: ScriptedCompiler,
    adjust: impl FnOnce(OrchestratorConfig) -> OrchestratorConfig,
    wire: impl FnOnce(Orchestrator) -> Orchestrator,
  ) -> Self {
    let temp = TempDir::new().unwrap();
    let config = OrchestratorConfig::default()
      .with_output_dir(temp.path().join("out"))
      .with_scratch_dir(temp.path().join("scratch"))
      .with_max_concurrency(8);
    let invocations = compiler.invocations();
    let orch = wire(Orchestrator::new(adjust(config), CompilerSet::new().with(compiler.clone())));
    Self {
      temp,
      orch,
      compiler,
      invocations,
    }
  }

  pub fn output(&self, filename: &str) -> PathBuf {
    self.temp.path().join("out").join(filename)
  }

  /// Tick until the orchestrator settles and return the final status.
  pub fn run(&mut self) -> TickStatus {
    self.run_with(&BuildOptions::default())
  }

  pub fn run_with(&mut self, options: &BuildOptions) -> TickStatus {
    for _ in 0..10_000 {
      match self.orch.tick(options) {
        TickStatus::CompilationStarted | TickStatus::Compiling => {}
        status => return status,
      }
    }
    panic!("orchestrator never settled");
  }

  pub fn reset_invocations(&self) {
    self.invocations.borrow_mut().started.clear();
  }
}

/// One source file per module, under `src/<lowercase name>/lib.rs`.
pub fn source_of(name: &str) -> PathBuf {
  Path::new("src").join(name.to_lowercase()).join("lib.rs")
}

pub fn module(name: &str) -> ModuleDecl {
  ModuleDecl::new(name, Path::new("src").join(name.to_lowercase()))
}

/// Load `decls` and one source per declared module.
pub fn load(orch: &mut Orchestrator, decls: Vec<ModuleDecl>) {
  orch.set_sources(decls.iter().map(|d| source_of(&d.name)));
  let errors = orch.load_declarations(decls, Vec::new());
  assert!(errors.is_empty(), "unexpected setup errors: {errors:?}");
}

/// Core <- Util <- App, plus an unrelated Solo.
pub fn chain() -> Vec<ModuleDecl> {
  vec![
    module("Core"),
    module("Util").with_reference("Core"),
    module("App").with_reference("Util"),
    module("Solo"),
  ]
}
