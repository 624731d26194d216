//! Compiler invocation seam.
//!
//! The orchestrator never compiles anything itself. A [`Compiler`] starts a
//! [`CompileJob`] for one module and the scheduler polls the job until it
//! reports a [`CompileOutput`]. Jobs must not block in `poll`.

pub mod hints;
mod process;
mod types;

use std::collections::HashMap;

use crate::module::SourceLanguage;

pub use process::{CommandTemplate, ProcessCompiler, parse_diagnostics};
pub use types::{CompileError, CompileOutput, CompileRequest, Diagnostic, Severity};

/// A running compiler invocation.
pub trait CompileJob {
  /// Non-blocking check for completion. Returns the output once, after which
  /// the job is discarded.
  fn poll(&mut self) -> Option<CompileOutput>;

  /// Terminate the invocation. Output produced so far is discarded.
  fn cancel(&mut self);
}

/// Starts compiler invocations for one source language.
pub trait Compiler {
  fn language(&self) -> SourceLanguage;

  fn start(&mut self, request: &CompileRequest) -> Result<Box<dyn CompileJob>, CompileError>;
}

/// Registered compilers, one per language.
#[derive(Default)]
pub struct CompilerSet {
  compilers: HashMap<SourceLanguage, Box<dyn Compiler>>,
}

impl CompilerSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a compiler, replacing any previous one for the same language.
  pub fn register(&mut self, compiler: Box<dyn Compiler>) {
    self.compilers.insert(compiler.language(), compiler);
  }

  pub fn with(mut self, compiler: impl Compiler + 'static) -> Self {
    self.register(Box::new(compiler));
    self
  }

  pub fn supports(&self, language: SourceLanguage) -> bool {
    self.compilers.contains_key(&language)
  }

  pub fn is_empty(&self) -> bool {
    self.compilers.is_empty()
  }

  pub fn start(&mut self, request: &CompileRequest) -> Result<Box<dyn CompileJob>, CompileError> {
    let compiler = self
      .compilers
      .get_mut(&request.language)
      .ok_or(CompileError::NoCompiler(request.language))?;
    compiler.start(request)
  }
}

impl std::fmt::Debug for CompilerSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut languages: Vec<_> = self.compilers.keys().collect();
    languages.sort();
    f.debug_struct("CompilerSet").field("languages", &languages).finish()
  }
}
