//! Implementation of the `modforge graph` command.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use modforge_lib::graph::ModuleGraph;
use modforge_lib::module::{Module, ModuleFlags, SourceLanguage};

use crate::output::{OutputFormat, print_json, print_setup_errors, print_warning};
use crate::project::Project;

#[derive(Serialize)]
struct ModuleSummary<'a> {
  name: &'a str,
  output: &'a Path,
  language: Option<SourceLanguage>,
  sources: usize,
  references: &'a [String],
  unresolved_references: &'a [String],
  referenced_by: &'a [String],
  flags: ModuleFlags,
}

impl<'a> ModuleSummary<'a> {
  fn new(module: &'a Module, graph: &'a ModuleGraph) -> Self {
    Self {
      name: &module.name,
      output: &module.output_path,
      language: module.language(),
      sources: module.sources.len(),
      references: &module.references,
      unresolved_references: &module.unresolved_references,
      referenced_by: graph.referencing_modules(&module.name),
      flags: module.flags,
    }
  }
}

#[derive(Serialize)]
struct GraphReport<'a> {
  waves: Vec<Vec<String>>,
  modules: Vec<ModuleSummary<'a>>,
}

#[derive(Serialize)]
struct DependentsReport<'a> {
  module: &'a str,
  dependents: Vec<String>,
  outputs: Vec<PathBuf>,
}

/// Print the module graph in build order, or the modules that rebuild when
/// `dependents_of` changes.
pub fn cmd_graph(project_path: &Path, dependents_of: Option<&str>, output: OutputFormat) -> Result<()> {
  let project = Project::load(project_path)?;
  let (orch, errors) = project.open(project.config()?)?;
  if errors.iter().any(|e| e.is_cycle()) {
    print_setup_errors(&errors);
    bail!("Module graph has a cycle");
  }
  if !errors.is_empty() && !output.is_json() {
    for error in &errors {
      print_warning(&error.to_string());
    }
  }
  let graph = orch.graph();

  if let Some(name) = dependents_of {
    let closure = graph.closure_of_referencing_modules(name);
    if closure.is_empty() {
      bail!("Unknown module: {}", name);
    }
    let report = DependentsReport {
      module: name,
      outputs: closure
        .iter()
        .filter_map(|m| graph.get(m))
        .map(|m| m.output_path.clone())
        .collect(),
      dependents: closure,
    };
    if output.is_json() {
      print_json(&report)?;
    } else {
      for dependent in &report.dependents {
        println!("{}", dependent);
      }
    }
    return Ok(());
  }

  let waves = graph.waves();
  if output.is_json() {
    let modules = graph.modules().map(|m| ModuleSummary::new(m, graph)).collect();
    return print_json(&GraphReport { waves, modules });
  }

  for (index, wave) in waves.iter().enumerate() {
    println!(
      "{}",
      format!("wave {}", index).if_supports_color(Stream::Stdout, |s| s.bold())
    );
    for name in wave {
      let Some(module) = graph.get(name) else {
        continue;
      };
      let language = module.language().map_or("-", |l| l.as_str());
      let mut line = format!("  {} [{}, {} source(s)]", name, language, module.sources.len());
      if !module.references.is_empty() {
        line.push_str(&format!(" -> {}", module.references.join(", ")));
      }
      println!("{}", line);
    }
  }

  Ok(())
}
