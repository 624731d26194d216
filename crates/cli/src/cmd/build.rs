//! Implementation of the `modforge build` command.
//!
//! Drives the orchestrator from a tokio interval timer. Ctrl-C stops the
//! running cycle. In watch mode the source tree is rescanned periodically and
//! content changes are fed back as notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use modforge_lib::config::BuildOptions;
use modforge_lib::orchestrator::{Orchestrator, TickStatus};
use modforge_lib::util::hash::{ContentHash, hash_file};

use crate::output::{print_event, print_info, print_setup_errors, print_warning};
use crate::project::Project;

/// How often the orchestrator is ticked.
const TICK_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
  pub jobs: Option<usize>,
  pub stop_on_first_error: bool,
  pub editor: bool,
  pub development: bool,
  pub defines: Vec<String>,
  pub watch: bool,
  pub poll_interval: Duration,
  pub verbose: bool,
}

impl BuildArgs {
  fn options(&self) -> BuildOptions {
    BuildOptions {
      include_editor_modules: self.editor,
      development: self.development,
      extra_defines: self.defines.clone(),
      stop_on_first_error: self.stop_on_first_error.then_some(true),
    }
  }
}

pub fn cmd_build(project_path: &Path, args: &BuildArgs) -> Result<()> {
  let project = Project::load(project_path)?;
  let mut config = project.config()?;
  if let Some(jobs) = args.jobs {
    config = config.with_max_concurrency(jobs);
  }
  info!(
    output = %config.output_dir.display(),
    jobs = config.max_concurrency,
    "building project"
  );

  let (mut orch, errors) = project.open(config)?;
  if !errors.is_empty() {
    print_setup_errors(&errors);
    if !args.watch {
      bail!("{} setup error(s) in module declarations", errors.len());
    }
  }

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;

  if args.watch {
    rt.block_on(watch(&project, &mut orch, args))
  } else {
    match rt.block_on(build_once(&mut orch, args))? {
      TickStatus::CompilationFailed => bail!("Build failed"),
      _ => Ok(()),
    }
  }
}

fn flush_events(orch: &mut Orchestrator, verbose: bool) {
  for event in orch.drain_events() {
    print_event(&event, verbose);
  }
}

/// Tick until the orchestrator settles. Returns the final status.
async fn build_once(orch: &mut Orchestrator, args: &BuildArgs) -> Result<TickStatus> {
  let options = args.options();
  let mut ticker = interval(TICK_INTERVAL);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  let ctrl_c = tokio::signal::ctrl_c();
  tokio::pin!(ctrl_c);

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let status = orch.tick(&options);
        flush_events(orch, args.verbose);
        match status {
          TickStatus::Idle => {
            print_info("Nothing to compile");
            return Ok(status);
          }
          TickStatus::CompilationComplete | TickStatus::CompilationFailed => return Ok(status),
          TickStatus::CompilationStarted | TickStatus::Compiling => {}
        }
      }
      _ = &mut ctrl_c => {
        orch.stop();
        flush_events(orch, args.verbose);
        bail!("Interrupted");
      }
    }
  }
}

/// Keep building as sources change until Ctrl-C.
async fn watch(project: &Project, orch: &mut Orchestrator, args: &BuildArgs) -> Result<()> {
  let options = args.options();
  let mut ticker = interval(TICK_INTERVAL);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  let mut poller = interval(args.poll_interval.max(TICK_INTERVAL));
  poller.set_missed_tick_behavior(MissedTickBehavior::Skip);
  let ctrl_c = tokio::signal::ctrl_c();
  tokio::pin!(ctrl_c);

  let mut tree = SourceTree::scan(project)?;
  print_info(&format!("Watching {}", project.source_root.display()));

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let status = orch.tick(&options);
        flush_events(orch, args.verbose);
        if matches!(status, TickStatus::CompilationComplete | TickStatus::CompilationFailed) {
          print_info("Waiting for changes");
        }
      }
      _ = poller.tick() => {
        let next = SourceTree::scan(project)?;
        tree.apply_changes(&next, project, orch)?;
        tree = next;
      }
      _ = &mut ctrl_c => {
        orch.stop();
        flush_events(orch, args.verbose);
        return Ok(());
      }
    }
  }
}

/// Content hashes of the watched files.
#[derive(Debug, Default)]
struct SourceTree {
  sources: HashMap<PathBuf, ContentHash>,
  declarations: HashMap<PathBuf, ContentHash>,
}

impl SourceTree {
  fn scan(project: &Project) -> Result<Self> {
    let mut tree = Self::default();
    for path in project.scan_sources()? {
      // Files can vanish between listing and hashing; the next scan sees it.
      if let Ok(hash) = hash_file(&path) {
        tree.sources.insert(path, hash);
      }
    }
    let (modules, refs) = project.scan_declarations()?;
    let declaration_paths = modules.into_iter().map(|m| m.path).chain(refs.into_iter().map(|r| r.path));
    for path in declaration_paths {
      if let Ok(hash) = hash_file(&path) {
        tree.declarations.insert(path, hash);
      }
    }
    Ok(tree)
  }

  /// Notify `orch` about everything that differs between `self` and `next`.
  fn apply_changes(&self, next: &SourceTree, project: &Project, orch: &mut Orchestrator) -> Result<()> {
    if self.declarations != next.declarations {
      info!("module declarations changed, reloading");
      let (modules, refs) = project.scan_declarations()?;
      let errors = orch.load_declarations(modules, refs);
      if errors.is_empty() {
        print_info("Module declarations reloaded");
      } else {
        print_setup_errors(&errors);
        print_warning("Builds are blocked until the declarations are fixed");
      }
    }

    for (path, hash) in &next.sources {
      if self.sources.get(path) != Some(hash) {
        debug!(path = %path.display(), "source changed");
        orch.notify_source_changed(path);
      }
    }
    for path in self.sources.keys().filter(|p| !next.sources.contains_key(*p)) {
      debug!(path = %path.display(), "source removed");
      orch.notify_source_removed(path);
    }
    Ok(())
  }
}
