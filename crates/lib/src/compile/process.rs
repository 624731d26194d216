//! Compiler adapter that runs an external command per module.
//!
//! The child's stdout and stderr go to `<scratch>/<module>.log`; completion is
//! observed with `try_wait`, so polling never blocks and no reader threads are
//! needed. Diagnostics are parsed from the log once the process exits.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CompileError, CompileJob, CompileOutput, CompileRequest, Compiler, Diagnostic, Severity};
use crate::module::SourceLanguage;

/// Program plus argument template.
///
/// Scalar placeholders `{name}` and `{out}` are substituted inside any
/// argument. An argument containing a list placeholder (`{sources}`,
/// `{references}`, `{defines}`) is repeated once per list item, so `-D{defines}`
/// becomes `-DDEBUG -DEDITOR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
}

impl CommandTemplate {
  pub fn new(program: &str, args: &[&str]) -> Self {
    Self {
      program: program.to_string(),
      args: args.iter().map(|a| a.to_string()).collect(),
    }
  }

  pub fn expand(&self, request: &CompileRequest) -> Vec<String> {
    let out = request.output_path.display().to_string();
    let sources: Vec<String> = request.sources.iter().map(|p| p.display().to_string()).collect();
    let references: Vec<String> = request.references.iter().map(|p| p.display().to_string()).collect();

    let mut expanded = Vec::with_capacity(self.args.len());
    for arg in &self.args {
      let arg = arg.replace("{name}", &request.module).replace("{out}", &out);
      let list = if arg.contains("{sources}") {
        Some(("{sources}", sources.as_slice()))
      } else if arg.contains("{references}") {
        Some(("{references}", references.as_slice()))
      } else if arg.contains("{defines}") {
        Some(("{defines}", request.defines.as_slice()))
      } else {
        None
      };
      match list {
        Some((placeholder, items)) => expanded.extend(items.iter().map(|item| arg.replace(placeholder, item))),
        None => expanded.push(arg),
      }
    }
    expanded
  }
}

/// Runs a [`CommandTemplate`] for every module of one language.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
  language: SourceLanguage,
  template: CommandTemplate,
  working_dir: Option<PathBuf>,
}

impl ProcessCompiler {
  pub fn new(language: SourceLanguage, template: CommandTemplate) -> Self {
    Self {
      language,
      template,
      working_dir: None,
    }
  }

  /// Run commands from `dir`, typically the project root so relative
  /// source paths resolve.
  pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.working_dir = Some(dir.into());
    self
  }
}

impl Compiler for ProcessCompiler {
  fn language(&self) -> SourceLanguage {
    self.language
  }

  fn start(&mut self, request: &CompileRequest) -> Result<Box<dyn CompileJob>, CompileError> {
    let log_err = |source| CompileError::Log {
      module: request.module.clone(),
      source,
    };

    fs::create_dir_all(&request.scratch_dir).map_err(log_err)?;
    let log_path = request.scratch_dir.join(format!("{}.log", request.module));
    let stdout = File::create(&log_path).map_err(log_err)?;
    let stderr = stdout.try_clone().map_err(log_err)?;

    let args = self.template.expand(request);
    let mut command = Command::new(&self.template.program);
    command
      .args(&args)
      .env("MODFORGE_MODULE", &request.module)
      .env("MODFORGE_ALLOW_UNSAFE", if request.allow_unsafe { "1" } else { "0" })
      .stdin(Stdio::null())
      .stdout(Stdio::from(stdout))
      .stderr(Stdio::from(stderr));
    if let Some(dir) = &self.working_dir {
      command.current_dir(dir);
    }

    debug!(module = %request.module, program = %self.template.program, ?args, "spawning compiler");

    let child = command.spawn().map_err(|source| CompileError::Spawn {
      module: request.module.clone(),
      source,
    })?;

    Ok(Box::new(ProcessJob {
      child,
      module: request.module.clone(),
      log_path,
      output_path: request.output_path.clone(),
    }))
  }
}

struct ProcessJob {
  child: Child,
  module: String,
  log_path: PathBuf,
  output_path: PathBuf,
}

impl ProcessJob {
  fn finish(&self, exit_ok: bool, code: Option<i32>) -> CompileOutput {
    let log = match fs::read_to_string(&self.log_path) {
      Ok(log) => log,
      Err(e) => {
        warn!(module = %self.module, error = %e, "failed to read compiler log");
        String::new()
      }
    };
    let mut messages = parse_diagnostics(&log);
    let has_errors = messages.iter().any(Diagnostic::is_error);

    if !exit_ok && !has_errors {
      let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
      messages.push(Diagnostic::error(format!(
        "compiler exited with status {} (see {})",
        code,
        self.log_path.display()
      )));
    }
    if exit_ok && !has_errors && !self.output_path.exists() {
      messages.push(Diagnostic::error(format!(
        "compiler reported success but wrote no output to {}",
        self.output_path.display()
      )));
    }

    let success = !messages.iter().any(Diagnostic::is_error);
    if success {
      CompileOutput::succeeded(messages)
    } else {
      CompileOutput::failed(messages)
    }
  }
}

impl CompileJob for ProcessJob {
  fn poll(&mut self) -> Option<CompileOutput> {
    match self.child.try_wait() {
      Ok(Some(status)) => Some(self.finish(status.success(), status.code())),
      Ok(None) => None,
      Err(e) => Some(CompileOutput::failed(vec![Diagnostic::error(format!(
        "failed to query compiler process: {}",
        e
      ))])),
    }
  }

  fn cancel(&mut self) {
    if let Err(e) = self.child.kill() {
      debug!(module = %self.module, error = %e, "compiler already exited");
    }
    if let Err(e) = self.child.wait() {
      debug!(module = %self.module, error = %e, "failed to reap compiler process");
    }
  }
}

/// Parse `file:line:col: severity: message [code]` lines.
///
/// Lines that do not follow the format are ignored.
pub fn parse_diagnostics(log: &str) -> Vec<Diagnostic> {
  log.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Diagnostic> {
  let (location, rest) = line.trim().split_once(": ")?;
  let mut parts = location.rsplitn(3, ':');
  let column = parts.next()?.parse().ok()?;
  let line_no = parts.next()?.parse().ok()?;
  let file = parts.next().filter(|f| !f.is_empty())?;

  let (severity, message) = rest.split_once(": ")?;
  let severity = match severity.trim() {
    "error" | "fatal error" => Severity::Error,
    "warning" => Severity::Warning,
    "note" | "info" => Severity::Info,
    _ => return None,
  };

  let (message, code) = match message.strip_suffix(']').and_then(|m| m.rsplit_once(" [")) {
    Some((message, code)) if !code.is_empty() && !code.contains(' ') => (message, Some(code)),
    _ => (message, None),
  };

  let mut diagnostic = Diagnostic {
    severity,
    file: None,
    line: 0,
    column: 0,
    message: message.trim().to_string(),
    code: None,
  }
  .at(Path::new(file), line_no, column);
  if let Some(code) = code {
    diagnostic = diagnostic.with_code(code);
  }
  Some(diagnostic)
}
