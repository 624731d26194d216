//! Types shared by build planning and task execution.

use std::fmt;
use std::time::Duration;

use crate::compile::Diagnostic;
use crate::module::SourceLanguage;

/// Per-module state within one compilation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
  Pending,
  Running,
  Succeeded,
  Failed,
  /// Not compiled because a dependency failed or the cycle was aborted.
  Skipped,
}

impl ModuleState {
  pub fn is_finished(self) -> bool {
    matches!(self, ModuleState::Succeeded | ModuleState::Failed | ModuleState::Skipped)
  }
}

/// Lifecycle of a [`CompilationTask`](super::CompilationTask).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
  Started,
  Running,
  Complete,
  Failed,
  Stopped,
}

impl TaskState {
  pub fn is_terminal(self) -> bool {
    matches!(self, TaskState::Complete | TaskState::Failed | TaskState::Stopped)
  }
}

/// Why a module is left out of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
  /// Sources span more than one language.
  MixedLanguages(Vec<SourceLanguage>),
  /// No compiler is registered for the module's language.
  NoCompiler(SourceLanguage),
  /// Editor-only module in a build without editor modules.
  EditorOnly,
  /// References a module that is itself excluded.
  ExcludedReference(String),
}

impl fmt::Display for ExclusionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExclusionReason::MixedLanguages(languages) => {
        let names: Vec<&str> = languages.iter().map(|l| l.as_str()).collect();
        write!(f, "sources mix languages: {}", names.join(", "))
      }
      ExclusionReason::NoCompiler(language) => write!(f, "no compiler registered for {} sources", language),
      ExclusionReason::EditorOnly => f.write_str("editor-only module in a build without editor modules"),
      ExclusionReason::ExcludedReference(name) => write!(f, "references excluded module '{}'", name),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
  pub module: String,
  pub reason: ExclusionReason,
}

/// Lifecycle notifications, queued for the caller to drain.
#[derive(Debug, Clone, PartialEq)]
pub enum CompilationEvent {
  CycleStarted {
    modules: usize,
  },
  ModuleExcluded {
    module: String,
    reason: ExclusionReason,
  },
  ModuleStarted {
    module: String,
  },
  ModuleFinished {
    module: String,
    succeeded: bool,
    messages: Vec<Diagnostic>,
    duration: Duration,
  },
  ModuleSkipped {
    module: String,
    failed_dependency: String,
  },
  CycleFinished {
    succeeded: bool,
    compiled: usize,
    failed: usize,
    skipped: usize,
    duration: Duration,
  },
  CycleStopped,
}
