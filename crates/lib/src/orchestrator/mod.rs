//! The orchestrator façade.
//!
//! Owns the declarations, the source set, the module graph and the dirty
//! ledger, and drives one [`CompilationTask`] at a time from [`tick`]. Nothing
//! here blocks: every call returns promptly and the caller keeps ticking while
//! [`is_compiling`] is true.
//!
//! [`tick`]: Orchestrator::tick
//! [`is_compiling`]: Orchestrator::is_compiling

mod providers;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::compile::CompilerSet;
use crate::config::{BuildOptions, OrchestratorConfig};
use crate::dirty::DirtyState;
use crate::graph::{GraphInput, ModuleGraph, SetupError};
use crate::module::{ModuleDecl, ModuleRefDecl, PrecompiledBinary, SourceLanguage};
use crate::output::{OutputPlacer, Stamp, SweepError, SweepResult};
use crate::schedule::{BuildPlan, CompilationTask, PlanInput, TaskContext, TaskState};
use crate::util::hash::{ContentHash, fingerprint_defines};

pub use crate::schedule::CompilationEvent;
pub use providers::{DefineProvider, PrecompiledProvider, ProviderError, StaticDefines, StaticPrecompiled};

/// Result of one [`Orchestrator::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
  /// Nothing to do, or new cycles are blocked.
  Idle,
  /// A cycle was started by this tick.
  CompilationStarted,
  /// A cycle is in progress.
  Compiling,
  /// The cycle finished with at least one failed or skipped module.
  CompilationFailed,
  /// The cycle finished without errors; the dirty ledger was cleared.
  CompilationComplete,
}

pub struct Orchestrator {
  config: OrchestratorConfig,
  compilers: CompilerSet,
  placer: OutputPlacer,
  precompiled_provider: Box<dyn PrecompiledProvider>,
  define_provider: Box<dyn DefineProvider>,

  declarations: Vec<ModuleDecl>,
  module_refs: Vec<ModuleRefDecl>,
  sources: BTreeSet<PathBuf>,
  loaded: bool,
  graph: ModuleGraph,
  /// Sources changed while a cycle was running; rebuild before the next one.
  graph_stale: bool,
  setup_errors: Vec<SetupError>,

  dirty: DirtyState,
  /// Notifications received while a cycle runs, folded in when it ends.
  deferred: DirtyState,
  /// Set by every dirtying call, consumed when a cycle starts.
  pending: bool,
  defines_fingerprint: Option<ContentHash>,
  /// Options of the last started cycle. Different options retry what is
  /// still dirty, such as modules excluded last time.
  last_options: Option<BuildOptions>,

  task: Option<CompilationTask>,
  precompiled: Vec<PrecompiledBinary>,
  events: Vec<CompilationEvent>,
}

impl Orchestrator {
  pub fn new(config: OrchestratorConfig, compilers: CompilerSet) -> Self {
    let placer = OutputPlacer::from_config(&config);
    Self {
      config,
      compilers,
      placer,
      precompiled_provider: Box::new(StaticPrecompiled::default()),
      define_provider: Box::new(StaticDefines::default()),
      declarations: Vec::new(),
      module_refs: Vec::new(),
      sources: BTreeSet::new(),
      loaded: false,
      graph: ModuleGraph::default(),
      graph_stale: false,
      setup_errors: Vec::new(),
      dirty: DirtyState::new(),
      deferred: DirtyState::new(),
      pending: false,
      defines_fingerprint: None,
      last_options: None,
      task: None,
      precompiled: Vec::new(),
      events: Vec::new(),
    }
  }

  pub fn with_precompiled_provider(mut self, provider: impl PrecompiledProvider + 'static) -> Self {
    self.precompiled_provider = Box::new(provider);
    self
  }

  pub fn with_define_provider(mut self, provider: impl DefineProvider + 'static) -> Self {
    self.define_provider = Box::new(provider);
    self
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.config
  }

  pub fn graph(&self) -> &ModuleGraph {
    &self.graph
  }

  pub fn dirty_state(&self) -> &DirtyState {
    &self.dirty
  }

  /// Problems with the current declarations. While non-empty no new cycle
  /// starts.
  pub fn setup_errors(&self) -> &[SetupError] {
    &self.setup_errors
  }

  pub fn current_task(&self) -> Option<&CompilationTask> {
    self.task.as_ref()
  }

  pub fn last_success(&self) -> Option<Stamp> {
    self.placer.read_stamp()
  }

  /// Take every lifecycle event queued since the last call.
  pub fn drain_events(&mut self) -> Vec<CompilationEvent> {
    std::mem::take(&mut self.events)
  }

  /// True while a cycle runs or one will start on the next tick.
  pub fn is_compiling(&self) -> bool {
    self.task.is_some() || (self.pending && self.setup_errors.is_empty())
  }

  /// Ingest parsed declarations and rebuild the graph.
  ///
  /// The first ingestion marks every module dirty; later ones mark modules
  /// whose shape changed. A running cycle is stopped first.
  pub fn load_declarations(&mut self, modules: Vec<ModuleDecl>, module_refs: Vec<ModuleRefDecl>) -> Vec<SetupError> {
    if self.task.is_some() {
      info!("declarations changed during compilation, stopping cycle");
      self.stop();
    }

    self.declarations = modules;
    self.module_refs = module_refs;
    if !self.loaded {
      self.dirty.mark_all_dirty();
      self.pending = true;
      self.loaded = true;
    }
    self.rebuild_graph();
    self.setup_errors.clone()
  }

  /// Replace the enumerated source set.
  pub fn set_sources(&mut self, sources: impl IntoIterator<Item = PathBuf>) {
    self.sources = sources
      .into_iter()
      .filter(|s| SourceLanguage::from_path(s).is_some())
      .collect();
    debug!(sources = self.sources.len(), "source set replaced");
    self.structural_change();
  }

  pub fn notify_source_changed(&mut self, path: &Path) {
    if SourceLanguage::from_path(path).is_none() {
      debug!(path = %path.display(), "ignoring change to non-source file");
      return;
    }
    if !self.sources.contains(path) {
      self.sources.insert(path.to_path_buf());
      self.structural_change();
      return;
    }

    match self.graph.owner_of(path) {
      Some(owner) => {
        let filename = owner.output_filename.clone();
        self.ledger().mark_filename_dirty(&filename);
        self.pending = true;
      }
      None => self.structural_change(),
    }
  }

  pub fn notify_source_removed(&mut self, path: &Path) {
    if self.sources.remove(path) {
      self.structural_change();
    }
  }

  pub fn notify_source_moved(&mut self, from: &Path, to: &Path) {
    let removed = self.sources.remove(from);
    let added = SourceLanguage::from_path(to).is_some() && self.sources.insert(to.to_path_buf());
    if removed || added {
      self.structural_change();
    }
  }

  /// A precompiled binary changed; `None` means every binary.
  pub fn notify_binary_dependency_changed(&mut self, name: Option<&str>) {
    match name {
      Some(name) => self.ledger().mark_binary_dirty(name),
      None => self.ledger().mark_all_binaries_dirty(),
    }
    self.pending = true;
  }

  /// Force a full rebuild on the next cycle.
  pub fn request_recompile(&mut self) {
    self.ledger().mark_all_dirty();
    self.pending = true;
  }

  /// Terminate in-flight invocations and discard the cycle. Dirty state is
  /// left as it was, so the next tick starts a new cycle; notifications
  /// received during the cycle are kept.
  pub fn stop(&mut self) {
    let Some(mut task) = self.task.take() else {
      return;
    };
    task.stop();
    self.dirty.merge(std::mem::take(&mut self.deferred));
    self.pending = true;
    self.events.push(CompilationEvent::CycleStopped);
  }

  /// Delete output files that belong to no module of the current graph.
  pub fn sweep_outputs(&self, dry_run: bool) -> Result<SweepResult, SweepError> {
    self.placer.sweep(self.graph.modules(), dry_run)
  }

  /// Advance the orchestrator: poll a running cycle, or start a new one when
  /// a request is pending or the options changed while modules are dirty.
  pub fn tick(&mut self, options: &BuildOptions) -> TickStatus {
    if let Some(task) = self.task.as_mut() {
      let mut ctx = TaskContext {
        graph: &self.graph,
        compilers: &mut self.compilers,
        placer: &self.placer,
        precompiled: &self.precompiled,
      };
      if !task.poll(&mut ctx, &mut self.events) {
        return TickStatus::Compiling;
      }
      return match self.task.take() {
        Some(task) => self.finish_cycle(task),
        None => TickStatus::Idle,
      };
    }

    let options_changed = self.last_options.as_ref().is_some_and(|last| last != options) && self.dirty.is_dirty();
    if !self.setup_errors.is_empty() || !(self.pending || options_changed) {
      return TickStatus::Idle;
    }
    self.start_cycle(options)
  }

  fn start_cycle(&mut self, options: &BuildOptions) -> TickStatus {
    self.pending = false;
    self.last_options = Some(options.clone());

    if self.graph_stale {
      self.rebuild_graph();
      if !self.setup_errors.is_empty() {
        return TickStatus::Idle;
      }
    }

    self.precompiled = match self.precompiled_provider.list() {
      Ok(binaries) => binaries,
      Err(e) => {
        error!(error = %e, "failed to list precompiled binaries, abandoning cycle");
        return TickStatus::Idle;
      }
    };

    self.graph.apply_defines(|module| self.define_provider.defines(module, options));
    let fingerprint = fingerprint_defines(self.graph.modules());
    if let Some(previous) = &self.defines_fingerprint
      && *previous != fingerprint
    {
      info!(fingerprint = %fingerprint.short(), "defines changed, marking all modules dirty");
      self.dirty.mark_all_dirty();
    }
    self.defines_fingerprint = Some(fingerprint);

    if !self.dirty.is_dirty() {
      debug!("nothing dirty, not starting a cycle");
      return TickStatus::Idle;
    }

    if let Err(e) = self.placer.ensure_dirs() {
      error!(error = %e, "cannot prepare output directories");
      self.events.push(CompilationEvent::CycleStarted { modules: 0 });
      self.events.push(CompilationEvent::CycleFinished {
        succeeded: false,
        compiled: 0,
        failed: 0,
        skipped: 0,
        duration: std::time::Duration::ZERO,
      });
      return TickStatus::CompilationFailed;
    }

    let plan = BuildPlan::compute(PlanInput {
      graph: &self.graph,
      dirty: &self.dirty,
      compilers: &self.compilers,
      precompiled: &self.precompiled,
      options,
      policy: self.config.codegen_policy,
    });
    for exclusion in &plan.excluded {
      warn!(module = %exclusion.module, reason = %exclusion.reason, "module excluded from compilation");
    }

    let modules = plan.len();
    self.events.push(CompilationEvent::CycleStarted { modules });
    self.events.extend(plan.excluded.iter().map(|e| CompilationEvent::ModuleExcluded {
      module: e.module.clone(),
      reason: e.reason.clone(),
    }));

    let stop_on_first_error = options.stop_on_first_error.unwrap_or(self.config.stop_on_first_error);
    info!(modules, max_concurrency = self.config.max_concurrency, "starting compilation cycle");
    self.task = Some(CompilationTask::new(plan, self.config.max_concurrency, stop_on_first_error));
    TickStatus::CompilationStarted
  }

  fn finish_cycle(&mut self, task: CompilationTask) -> TickStatus {
    let status = if task.state() == TaskState::Complete {
      self.dirty.clear_all();
      // Excluded modules were never built.
      for exclusion in &task.plan().excluded {
        if let Some(module) = self.graph.get(&exclusion.module) {
          self.dirty.mark_filename_dirty(&module.output_filename);
        }
      }
      if let Err(e) = self.placer.write_stamp() {
        warn!(error = %e, "failed to write stamp file");
      }
      TickStatus::CompilationComplete
    } else {
      for name in task.succeeded() {
        if let Some(module) = self.graph.get(name) {
          self.dirty.clear_compiled(&module.output_filename);
        }
      }
      for name in task.failed().chain(task.skipped()) {
        if let Some(module) = self.graph.get(name) {
          self.dirty.mark_filename_dirty(&module.output_filename);
        }
      }
      TickStatus::CompilationFailed
    };

    self.dirty.merge(std::mem::take(&mut self.deferred));
    status
  }

  /// The ledger notifications go to: deferred while a cycle runs.
  fn ledger(&mut self) -> &mut DirtyState {
    if self.task.is_some() {
      &mut self.deferred
    } else {
      &mut self.dirty
    }
  }

  fn structural_change(&mut self) {
    if !self.loaded {
      return;
    }
    if self.task.is_some() {
      self.graph_stale = true;
      self.pending = true;
    } else {
      self.rebuild_graph();
    }
  }

  fn rebuild_graph(&mut self) {
    self.graph_stale = false;
    let input = GraphInput {
      modules: &self.declarations,
      module_refs: &self.module_refs,
      sources: &self.sources,
      output_dir: &self.config.output_dir,
    };

    let outcome = match ModuleGraph::build(input) {
      Ok(outcome) => outcome,
      Err(e) => {
        error!(error = %e, "module graph has a cycle");
        self.setup_errors = vec![e];
        return;
      }
    };
    for exception in &outcome.exceptions {
      warn!(error = %exception, "declaration rejected");
    }

    let previous = std::mem::replace(&mut self.graph, outcome.graph);
    self.setup_errors = outcome.exceptions;

    // Vanished modules stay dirty by filename so the next cycle completes.
    let removed = previous
      .modules()
      .filter(|old| self.graph.get_by_filename(&old.output_filename).is_none());
    let changed: Vec<String> = self
      .graph
      .modules()
      .filter(|m| {
        previous
          .get_by_filename(&m.output_filename)
          .is_none_or(|old| !old.same_shape(m))
      })
      .chain(removed)
      .map(|m| m.output_filename.clone())
      .collect();
    if !changed.is_empty() {
      for filename in &changed {
        self.dirty.mark_filename_dirty(filename);
      }
      self.pending = true;
    }
    debug!(changed = changed.len(), "graph rebuilt");
  }
}

impl std::fmt::Debug for Orchestrator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Orchestrator")
      .field("modules", &self.graph.len())
      .field("sources", &self.sources.len())
      .field("setup_errors", &self.setup_errors.len())
      .field("dirty", &self.dirty)
      .field("pending", &self.pending)
      .field("task", &self.task)
      .finish()
  }
}
