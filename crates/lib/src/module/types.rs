use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::BINARY_EXTENSION;

/// Source languages a module can be written in.
///
/// A module compiles with exactly one language; the scheduler dispatches it to
/// the compiler registered for that language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
  Rust,
  C,
  Cpp,
}

impl SourceLanguage {
  /// Detect the language of a source file from its extension.
  ///
  /// Returns `None` for files that are not compilable sources (headers,
  /// assets, declaration files).
  pub fn from_path(path: &Path) -> Option<Self> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
      "rs" => Some(SourceLanguage::Rust),
      "c" => Some(SourceLanguage::C),
      "cc" | "cpp" | "cxx" => Some(SourceLanguage::Cpp),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      SourceLanguage::Rust => "rust",
      SourceLanguage::C => "c",
      SourceLanguage::Cpp => "cpp",
    }
  }
}

impl fmt::Display for SourceLanguage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A reference from one declaration to a module.
///
/// Serialized externally tagged: `{"name": "Core"}` or `{"id": "4f1c..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceDecl {
  /// Reference by module name.
  Name(String),
  /// Reference by the opaque identifier of a declaration.
  Id(String),
}

fn default_true() -> bool {
  true
}

/// A parsed module-definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDecl {
  /// Module name; also determines the output filename.
  pub name: String,

  /// Ownership directory. Every source below it belongs to this module unless
  /// a deeper declaration claims it.
  pub directory: PathBuf,

  /// The declaration file itself, used when reporting errors.
  pub path: PathBuf,

  /// Opaque identifier other declarations may use to reference this one.
  #[serde(default)]
  pub id: Option<String>,

  #[serde(default)]
  pub references: Vec<ReferenceDecl>,

  /// Filenames of precompiled binaries this module links against.
  #[serde(default)]
  pub precompiled_references: Vec<String>,

  #[serde(default)]
  pub editor_only: bool,

  /// Whether predefined modules reference this module implicitly.
  /// `false` means the module is only used when explicitly referenced.
  #[serde(default = "default_true")]
  pub auto_referenced: bool,

  /// Output is consumed by a build-time generation step before other
  /// modules use it.
  #[serde(default)]
  pub codegen: bool,

  #[serde(default)]
  pub allow_unsafe: bool,

  /// Only reference the precompiled binaries listed explicitly.
  #[serde(default)]
  pub override_references: bool,
}

impl ModuleDecl {
  /// Create a declaration owning `directory`, with the declaration file
  /// placed inside it.
  pub fn new(name: &str, directory: impl Into<PathBuf>) -> Self {
    let directory = directory.into();
    Self {
      name: name.to_string(),
      path: directory.join(format!("{}.module.json", name)),
      directory,
      id: None,
      references: Vec::new(),
      precompiled_references: Vec::new(),
      editor_only: false,
      auto_referenced: true,
      codegen: false,
      allow_unsafe: false,
      override_references: false,
    }
  }

  pub fn with_id(mut self, id: &str) -> Self {
    self.id = Some(id.to_string());
    self
  }

  pub fn with_reference(mut self, name: &str) -> Self {
    self.references.push(ReferenceDecl::Name(name.to_string()));
    self
  }

  pub fn with_reference_id(mut self, id: &str) -> Self {
    self.references.push(ReferenceDecl::Id(id.to_string()));
    self
  }

  pub fn with_precompiled(mut self, filename: &str) -> Self {
    self.precompiled_references.push(filename.to_string());
    self
  }

  pub fn codegen(mut self) -> Self {
    self.codegen = true;
    self
  }

  pub fn editor_only(mut self) -> Self {
    self.editor_only = true;
    self
  }

  pub fn explicitly_referenced(mut self) -> Self {
    self.auto_referenced = false;
    self
  }
}

/// A parsed module-reference file: adds the sources below `directory` to the
/// module named by `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRefDecl {
  pub path: PathBuf,
  pub directory: PathBuf,
  pub target: ReferenceDecl,
}

impl ModuleRefDecl {
  pub fn new(directory: impl Into<PathBuf>, target: ReferenceDecl) -> Self {
    let directory = directory.into();
    Self {
      path: directory.join("module.ref.json"),
      directory,
      target,
    }
  }
}

/// An external binary dependency that is not compiled by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecompiledBinary {
  /// Filename, unique across the project.
  pub name: String,
  pub path: PathBuf,
  /// Referenced by every module that does not override references.
  #[serde(default)]
  pub auto_referenced: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModuleFlags {
  pub editor_only: bool,
  pub explicitly_referenced: bool,
  pub codegen: bool,
  pub allow_unsafe: bool,
  /// Created by default grouping rather than a declaration.
  pub predefined: bool,
  pub override_references: bool,
}

/// A compilation unit in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
  pub name: String,

  /// Identity of the module across graph rebuilds.
  pub output_filename: String,

  /// Final location of the built binary.
  pub output_path: PathBuf,

  /// Ownership directory; `None` for predefined modules.
  pub directory: Option<PathBuf>,

  /// Declaration file; `None` for predefined modules.
  pub declaration_path: Option<PathBuf>,

  pub sources: BTreeSet<PathBuf>,

  /// Resolved names of referenced modules, in declaration order.
  pub references: Vec<String>,

  /// References that did not resolve to a known module.
  pub unresolved_references: Vec<String>,

  /// Filenames of referenced precompiled binaries.
  pub precompiled_references: Vec<String>,

  pub flags: ModuleFlags,

  /// Preprocessor defines for the current build configuration.
  pub defines: Vec<String>,
}

impl Module {
  pub fn new(name: &str, output_dir: &Path) -> Self {
    let output_filename = output_filename_for(name);
    Self {
      name: name.to_string(),
      output_path: output_dir.join(&output_filename),
      output_filename,
      directory: None,
      declaration_path: None,
      sources: BTreeSet::new(),
      references: Vec::new(),
      unresolved_references: Vec::new(),
      precompiled_references: Vec::new(),
      flags: ModuleFlags::default(),
      defines: Vec::new(),
    }
  }

  pub fn has_sources(&self) -> bool {
    !self.sources.is_empty()
  }

  /// Every language used by this module's sources.
  pub fn languages(&self) -> BTreeSet<SourceLanguage> {
    self.sources.iter().filter_map(|s| SourceLanguage::from_path(s)).collect()
  }

  /// The single language of this module, or `None` when the sources are
  /// empty or mix languages.
  pub fn language(&self) -> Option<SourceLanguage> {
    let languages = self.languages();
    if languages.len() == 1 {
      languages.into_iter().next()
    } else {
      None
    }
  }

  /// Compare everything that influences compilation except defines, which
  /// are recomputed per build configuration.
  pub fn same_shape(&self, other: &Module) -> bool {
    self.name == other.name
      && self.output_filename == other.output_filename
      && self.sources == other.sources
      && self.references == other.references
      && self.unresolved_references == other.unresolved_references
      && self.precompiled_references == other.precompiled_references
      && self.flags == other.flags
  }
}

/// Output filename of the module called `name`.
pub fn output_filename_for(name: &str) -> String {
  format!("{}.{}", name, BINARY_EXTENSION)
}
