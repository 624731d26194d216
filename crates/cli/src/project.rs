//! Project files.
//!
//! A project is a JSON file describing where sources live, where outputs go,
//! which precompiled binaries exist and how each language is compiled.
//! Module declarations are separate `*.module.json` files found under the
//! source root; `module.ref.json` files add a directory to another module.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use modforge_lib::compile::{CommandTemplate, CompilerSet, ProcessCompiler};
use modforge_lib::config::OrchestratorConfig;
use modforge_lib::graph::SetupError;
use modforge_lib::module::{ModuleDecl, ModuleRefDecl, PrecompiledBinary, SourceLanguage};
use modforge_lib::orchestrator::{Orchestrator, StaticDefines, StaticPrecompiled};

const DECLARATION_SUFFIX: &str = ".module.json";
const MODULE_REF_FILENAME: &str = "module.ref.json";

#[derive(Debug, Deserialize)]
pub struct ProjectFile {
  #[serde(default = "default_source_root")]
  pub source_root: PathBuf,

  pub output_dir: Option<PathBuf>,
  pub scratch_dir: Option<PathBuf>,

  #[serde(default)]
  pub defines: Vec<String>,

  #[serde(default)]
  pub precompiled: Vec<PrecompiledBinary>,

  #[serde(default)]
  pub compilers: Vec<CompilerSpec>,
}

fn default_source_root() -> PathBuf {
  PathBuf::from("src")
}

/// How to invoke the compiler for one language.
#[derive(Debug, Deserialize)]
pub struct CompilerSpec {
  pub language: SourceLanguage,
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
}

/// A loaded project with paths resolved against the project file's directory.
#[derive(Debug)]
pub struct Project {
  pub dir: PathBuf,
  pub source_root: PathBuf,
  pub file: ProjectFile,
}

impl Project {
  pub fn load(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read project file {}", path.display()))?;
    let file: ProjectFile =
      serde_json::from_str(&content).with_context(|| format!("Failed to parse project file {}", path.display()))?;

    let dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or(Path::new("."));
    let dir = dunce::canonicalize(dir).with_context(|| format!("Failed to resolve {}", dir.display()))?;
    let source_root = dir.join(&file.source_root);
    if !source_root.is_dir() {
      bail!("Source root {} is not a directory", source_root.display());
    }

    Ok(Self { dir, source_root, file })
  }

  /// Environment configuration with the project's directories applied.
  /// Relative directories resolve against the project directory.
  pub fn config(&self) -> Result<OrchestratorConfig> {
    let config = OrchestratorConfig::from_env().context("Invalid environment configuration")?;
    let output_dir = self.dir.join(self.file.output_dir.as_ref().unwrap_or(&config.output_dir));
    let scratch_dir = self.dir.join(self.file.scratch_dir.as_ref().unwrap_or(&config.scratch_dir));
    Ok(config.with_output_dir(output_dir).with_scratch_dir(scratch_dir))
  }

  pub fn compilers(&self) -> CompilerSet {
    let mut set = CompilerSet::new();
    for entry in &self.file.compilers {
      let args: Vec<&str> = entry.args.iter().map(String::as_str).collect();
      let template = CommandTemplate::new(&entry.program, &args);
      set.register(Box::new(
        ProcessCompiler::new(entry.language, template).with_working_dir(&self.dir),
      ));
    }
    set
  }

  pub fn orchestrator(&self, config: OrchestratorConfig) -> Orchestrator {
    let precompiled = self
      .file
      .precompiled
      .iter()
      .cloned()
      .map(|mut binary| {
        binary.path = self.dir.join(&binary.path);
        binary
      })
      .collect();
    Orchestrator::new(config, self.compilers())
      .with_precompiled_provider(StaticPrecompiled::new(precompiled))
      .with_define_provider(StaticDefines::new(self.file.defines.clone()))
  }

  /// Build an orchestrator over the current sources and declarations.
  /// Setup errors are returned alongside; the orchestrator keeps them too.
  pub fn open(&self, config: OrchestratorConfig) -> Result<(Orchestrator, Vec<SetupError>)> {
    let mut orch = self.orchestrator(config);
    orch.set_sources(self.scan_sources()?);
    let (modules, refs) = self.scan_declarations()?;
    let errors = orch.load_declarations(modules, refs);
    Ok((orch, errors))
  }

  /// Every compilable source under the source root.
  pub fn scan_sources(&self) -> Result<BTreeSet<PathBuf>> {
    let mut sources = BTreeSet::new();
    for entry in WalkDir::new(&self.source_root).sort_by_file_name() {
      let entry = entry.with_context(|| format!("Failed to scan {}", self.source_root.display()))?;
      if entry.file_type().is_file() && SourceLanguage::from_path(entry.path()).is_some() {
        sources.insert(entry.into_path());
      }
    }
    debug!(count = sources.len(), "scanned sources");
    Ok(sources)
  }

  /// Parse every declaration file under the source root.
  pub fn scan_declarations(&self) -> Result<(Vec<ModuleDecl>, Vec<ModuleRefDecl>)> {
    let mut modules = Vec::new();
    let mut refs = Vec::new();
    for entry in WalkDir::new(&self.source_root).sort_by_file_name() {
      let entry = entry.with_context(|| format!("Failed to scan {}", self.source_root.display()))?;
      if !entry.file_type().is_file() {
        continue;
      }
      let name = entry.file_name().to_string_lossy();
      if name == MODULE_REF_FILENAME {
        refs.push(read_declaration(entry.path())?);
      } else if name.ends_with(DECLARATION_SUFFIX) {
        modules.push(read_declaration(entry.path())?);
      }
    }
    debug!(modules = modules.len(), module_refs = refs.len(), "scanned declarations");
    Ok((modules, refs))
  }
}

/// Read a declaration file, filling in its location fields.
fn read_declaration<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
  let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
  let mut value: serde_json::Value =
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
  let Some(object) = value.as_object_mut() else {
    bail!("{} must contain a JSON object", path.display());
  };
  let directory = path.parent().unwrap_or(Path::new("."));
  object.insert("directory".to_string(), serde_json::json!(directory));
  object.insert("path".to_string(), serde_json::json!(path));
  serde_json::from_value(value).with_context(|| format!("Invalid declaration {}", path.display()))
}
