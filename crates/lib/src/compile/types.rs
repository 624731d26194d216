use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::SourceLanguage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Error,
  Warning,
  Info,
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Severity::Error => f.write_str("error"),
      Severity::Warning => f.write_str("warning"),
      Severity::Info => f.write_str("info"),
    }
  }
}

/// A message produced while compiling a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
  pub severity: Severity,
  pub file: Option<PathBuf>,
  pub line: u32,
  pub column: u32,
  pub message: String,
  /// Compiler-specific code, e.g. `unsafe-code`.
  pub code: Option<String>,
}

impl Diagnostic {
  pub fn error(message: impl Into<String>) -> Self {
    Self::new(Severity::Error, message)
  }

  pub fn warning(message: impl Into<String>) -> Self {
    Self::new(Severity::Warning, message)
  }

  fn new(severity: Severity, message: impl Into<String>) -> Self {
    Self {
      severity,
      file: None,
      line: 0,
      column: 0,
      message: message.into(),
      code: None,
    }
  }

  pub fn at(mut self, file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
    self.file = Some(file.into());
    self.line = line;
    self.column = column;
    self
  }

  pub fn with_code(mut self, code: &str) -> Self {
    self.code = Some(code.to_string());
    self
  }

  pub fn is_error(&self) -> bool {
    self.severity == Severity::Error
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(file) = &self.file {
      write!(f, "{}({},{}): ", file.display(), self.line, self.column)?;
    }
    write!(f, "{}", self.severity)?;
    if let Some(code) = &self.code {
      write!(f, " {}", code)?;
    }
    write!(f, ": {}", self.message)
  }
}

/// Everything a compiler needs to build one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
  pub module: String,
  pub language: SourceLanguage,
  pub sources: Vec<PathBuf>,
  /// Binaries of referenced modules and precompiled dependencies.
  pub references: Vec<PathBuf>,
  pub defines: Vec<String>,
  pub allow_unsafe: bool,
  /// Where the compiler must write the binary (inside the scratch directory).
  pub output_path: PathBuf,
  pub scratch_dir: PathBuf,
}

/// Result of one finished compiler invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
  pub success: bool,
  pub messages: Vec<Diagnostic>,
}

impl CompileOutput {
  pub fn succeeded(messages: Vec<Diagnostic>) -> Self {
    Self {
      success: true,
      messages,
    }
  }

  pub fn failed(messages: Vec<Diagnostic>) -> Self {
    Self {
      success: false,
      messages,
    }
  }

  pub fn error_count(&self) -> usize {
    self.messages.iter().filter(|m| m.is_error()).count()
  }
}

/// Errors starting a compiler invocation.
#[derive(Debug, Error)]
pub enum CompileError {
  #[error("no compiler registered for {0} sources")]
  NoCompiler(SourceLanguage),

  #[error("failed to start compiler for {module}: {source}")]
  Spawn {
    module: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to prepare log for {module}: {source}")]
  Log {
    module: String,
    #[source]
    source: io::Error,
  },
}
