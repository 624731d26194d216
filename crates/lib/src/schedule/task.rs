//! Polled execution of one compilation cycle.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::plan::precompiled_names;
use super::{BuildPlan, CompilationEvent, ModuleState, TaskState};
use crate::compile::{CompileJob, CompileOutput, CompileRequest, CompilerSet, Diagnostic, hints};
use crate::graph::ModuleGraph;
use crate::module::{Module, PrecompiledBinary, SourceLanguage};
use crate::output::OutputPlacer;

/// Collaborators a task needs while polling.
pub struct TaskContext<'a> {
  pub graph: &'a ModuleGraph,
  pub compilers: &'a mut CompilerSet,
  pub placer: &'a OutputPlacer,
  pub precompiled: &'a [PrecompiledBinary],
}

struct RunningJob {
  module: String,
  job: Box<dyn CompileJob>,
  started: Instant,
}

/// State machine for one cycle: `Started -> Running -> {Complete | Failed}`,
/// or `Stopped` when cancelled from outside.
pub struct CompilationTask {
  plan: BuildPlan,
  codegen: HashSet<String>,
  states: BTreeMap<String, ModuleState>,
  running: Vec<RunningJob>,
  max_concurrency: usize,
  stop_on_first_error: bool,
  aborted: bool,
  state: TaskState,
  started: Instant,
}

impl CompilationTask {
  pub fn new(plan: BuildPlan, max_concurrency: usize, stop_on_first_error: bool) -> Self {
    let states = plan.modules().map(|m| (m.to_string(), ModuleState::Pending)).collect();
    let codegen = plan.codegen.iter().cloned().collect();
    Self {
      plan,
      codegen,
      states,
      running: Vec::new(),
      max_concurrency: max_concurrency.max(1),
      stop_on_first_error,
      aborted: false,
      state: TaskState::Started,
      started: Instant::now(),
    }
  }

  pub fn plan(&self) -> &BuildPlan {
    &self.plan
  }

  pub fn state(&self) -> TaskState {
    self.state
  }

  pub fn module_state(&self, name: &str) -> Option<ModuleState> {
    self.states.get(name).copied()
  }

  pub fn running_count(&self) -> usize {
    self.running.len()
  }

  pub fn elapsed(&self) -> Duration {
    self.started.elapsed()
  }

  fn in_state(&self, state: ModuleState) -> impl Iterator<Item = &str> {
    self
      .states
      .iter()
      .filter(move |(_, s)| **s == state)
      .map(|(name, _)| name.as_str())
  }

  pub fn succeeded(&self) -> impl Iterator<Item = &str> {
    self.in_state(ModuleState::Succeeded)
  }

  pub fn failed(&self) -> impl Iterator<Item = &str> {
    self.in_state(ModuleState::Failed)
  }

  pub fn skipped(&self) -> impl Iterator<Item = &str> {
    self.in_state(ModuleState::Skipped)
  }

  /// Advance the cycle without blocking: collect finished invocations, start
  /// newly eligible modules up to the concurrency cap.
  ///
  /// Returns `true` once the cycle has terminated.
  pub fn poll(&mut self, ctx: &mut TaskContext<'_>, events: &mut Vec<CompilationEvent>) -> bool {
    if self.state.is_terminal() {
      return true;
    }
    self.state = TaskState::Running;

    let mut i = 0;
    while i < self.running.len() {
      match self.running[i].job.poll() {
        Some(output) => {
          let finished = self.running.remove(i);
          self.finish(finished, output, ctx, events);
        }
        None => i += 1,
      }
    }

    while !self.aborted && self.start_eligible(ctx, events) {}

    if !self.running.is_empty() {
      return false;
    }

    for (name, state) in self.states.iter_mut() {
      if *state == ModuleState::Pending {
        warn!(module = %name, "module could not be scheduled, skipping");
        *state = ModuleState::Skipped;
      }
    }

    let compiled = self.succeeded().count();
    let failed = self.failed().count();
    let skipped = self.skipped().count();
    let succeeded = failed == 0 && skipped == 0;
    self.state = if succeeded { TaskState::Complete } else { TaskState::Failed };

    let duration = self.elapsed();
    info!(compiled, failed, skipped, duration = ?duration, "compilation cycle finished");
    events.push(CompilationEvent::CycleFinished {
      succeeded,
      compiled,
      failed,
      skipped,
      duration,
    });
    true
  }

  /// Cancel every running invocation and discard the cycle. Nothing further
  /// is placed; returns the number of cancelled invocations.
  pub fn stop(&mut self) -> usize {
    let cancelled = self.cancel_running();
    self.state = TaskState::Stopped;
    info!(cancelled, "compilation cycle stopped");
    cancelled
  }

  fn cancel_running(&mut self) -> usize {
    let cancelled = self.running.len();
    for mut running in self.running.drain(..) {
      debug!(module = %running.module, "cancelling compiler");
      running.job.cancel();
      self.states.insert(running.module, ModuleState::Skipped);
    }
    cancelled
  }

  /// Start every eligible module that fits under the cap. Returns whether any
  /// module changed state.
  fn start_eligible(&mut self, ctx: &mut TaskContext<'_>, events: &mut Vec<CompilationEvent>) -> bool {
    let codegen_done = self
      .plan
      .codegen
      .iter()
      .all(|m| self.states.get(m).is_none_or(|s| s.is_finished()));

    let candidates: Vec<String> = self
      .plan
      .modules()
      .filter(|m| codegen_done || self.codegen.contains(*m))
      .filter(|m| self.states.get(*m) == Some(&ModuleState::Pending))
      .map(str::to_string)
      .collect();

    let mut progressed = false;
    for name in candidates {
      if self.aborted || self.running.len() >= self.max_concurrency {
        break;
      }
      if self.states.get(&name) != Some(&ModuleState::Pending) || !self.is_eligible(&name, ctx.graph) {
        continue;
      }
      self.start(&name, ctx, events);
      progressed = true;
    }
    progressed
  }

  /// Every referenced module in this cycle has succeeded. References outside
  /// the cycle need no compilation.
  fn is_eligible(&self, name: &str, graph: &ModuleGraph) -> bool {
    graph
      .references_of(name)
      .iter()
      .all(|r| matches!(self.states.get(r), None | Some(ModuleState::Succeeded)))
  }

  fn start(&mut self, name: &str, ctx: &mut TaskContext<'_>, events: &mut Vec<CompilationEvent>) {
    let graph = ctx.graph;
    let Some((module, language)) = graph.get(name).and_then(|m| m.language().map(|l| (m, l))) else {
      let message = Diagnostic::error(format!("module '{}' has no single source language", name));
      self.record_failure(name, vec![message], Duration::ZERO, graph, events);
      return;
    };

    let request = compile_request(module, language, ctx);
    match ctx.compilers.start(&request) {
      Ok(job) => {
        info!(module = %name, language = %language, sources = request.sources.len(), "compiling module");
        self.states.insert(name.to_string(), ModuleState::Running);
        self.running.push(RunningJob {
          module: name.to_string(),
          job,
          started: Instant::now(),
        });
        events.push(CompilationEvent::ModuleStarted {
          module: name.to_string(),
        });
      }
      Err(e) => {
        error!(module = %name, error = %e, "failed to start compiler");
        self.record_failure(name, vec![Diagnostic::error(e.to_string())], Duration::ZERO, graph, events);
      }
    }
  }

  fn finish(
    &mut self,
    finished: RunningJob,
    output: CompileOutput,
    ctx: &mut TaskContext<'_>,
    events: &mut Vec<CompilationEvent>,
  ) {
    let name = finished.module;
    let duration = finished.started.elapsed();
    let mut messages = output.messages;
    hints::enrich(&name, &mut messages);

    if !output.success {
      warn!(module = %name, errors = messages.iter().filter(|m| m.is_error()).count(), "module failed to compile");
      self.record_failure(&name, messages, duration, ctx.graph, events);
      return;
    }

    let placed = match ctx.graph.get(&name) {
      Some(module) => ctx.placer.place(module).map_err(|e| e.to_string()),
      None => Err(format!("module '{}' disappeared from the graph", name)),
    };
    match placed {
      Ok(placement) => {
        if let Some(problems) = placement.problems {
          messages.push(Diagnostic::warning(problems));
        }
        info!(module = %name, duration = ?duration, "module compiled");
        self.states.insert(name.clone(), ModuleState::Succeeded);
        events.push(CompilationEvent::ModuleFinished {
          module: name,
          succeeded: true,
          messages,
          duration,
        });
      }
      Err(e) => {
        error!(module = %name, error = %e, "failed to place module output");
        messages.push(Diagnostic::error(format!("failed to place output: {}", e)));
        self.states.insert(name.clone(), ModuleState::Failed);
        events.push(CompilationEvent::ModuleFinished {
          module: name,
          succeeded: false,
          messages,
          duration,
        });
        self.abort();
      }
    }
  }

  fn record_failure(
    &mut self,
    name: &str,
    messages: Vec<Diagnostic>,
    duration: Duration,
    graph: &ModuleGraph,
    events: &mut Vec<CompilationEvent>,
  ) {
    self.states.insert(name.to_string(), ModuleState::Failed);
    events.push(CompilationEvent::ModuleFinished {
      module: name.to_string(),
      succeeded: false,
      messages,
      duration,
    });

    for dependent in graph.closure_of_referencing_modules(name).into_iter().skip(1) {
      if let Some(state) = self.states.get_mut(&dependent)
        && *state == ModuleState::Pending
      {
        warn!(module = %dependent, failed_dependency = %name, "skipping module due to failed dependency");
        *state = ModuleState::Skipped;
        events.push(CompilationEvent::ModuleSkipped {
          module: dependent,
          failed_dependency: name.to_string(),
        });
      }
    }

    if self.stop_on_first_error {
      info!(module = %name, "stopping cycle after first error");
      self.abort();
    }
  }

  /// Terminate the cycle after an error: running invocations are cancelled
  /// and nothing new starts.
  fn abort(&mut self) {
    if self.aborted {
      return;
    }
    self.aborted = true;
    self.cancel_running();
    for state in self.states.values_mut() {
      if *state == ModuleState::Pending {
        *state = ModuleState::Skipped;
      }
    }
  }
}

impl std::fmt::Debug for CompilationTask {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CompilationTask")
      .field("state", &self.state)
      .field("states", &self.states)
      .field("running", &self.running.len())
      .field("max_concurrency", &self.max_concurrency)
      .finish()
  }
}

fn compile_request(module: &Module, language: SourceLanguage, ctx: &TaskContext<'_>) -> CompileRequest {
  let mut references: Vec<_> = module
    .references
    .iter()
    .filter_map(|r| ctx.graph.get(r))
    .filter(|m| m.has_sources())
    .map(|m| m.output_path.clone())
    .collect();

  for name in precompiled_names(module, ctx.precompiled) {
    match ctx.precompiled.iter().find(|b| b.name == name) {
      Some(binary) => references.push(binary.path.clone()),
      None => warn!(module = %module.name, binary = %name, "precompiled reference not found"),
    }
  }

  CompileRequest {
    module: module.name.clone(),
    language,
    sources: module.sources.iter().cloned().collect(),
    references,
    defines: module.defines.clone(),
    allow_unsafe: module.flags.allow_unsafe,
    output_path: ctx.placer.scratch_path(&module.output_filename),
    scratch_dir: ctx.placer.scratch_dir().to_path_buf(),
  }
}
