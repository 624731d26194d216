//! Implementation of the `modforge clean` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Result, bail};

use crate::output::{
  OutputFormat, format_bytes, format_duration, print_info, print_json, print_setup_errors, print_stat, print_success,
};
use crate::project::Project;

/// Delete files in the output directory that belong to no current module.
///
/// Refuses to run while declarations have setup errors: rejected modules are
/// missing from the graph and their outputs would be swept.
pub fn cmd_clean(project_path: &Path, dry_run: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let project = Project::load(project_path)?;
  let (orch, errors) = project.open(project.config()?)?;
  if !errors.is_empty() {
    print_setup_errors(&errors);
    bail!("Refusing to clean with {} setup error(s)", errors.len());
  }

  let result = orch.sweep_outputs(dry_run)?;

  if output.is_json() {
    print_json(&result)?;
  } else {
    if dry_run {
      print_info("Dry run - no changes made");
      for path in &result.deleted_paths {
        println!("  {}", path.display());
      }
    } else {
      print_success("Clean complete!");
    }
    print_stat("Files removed", &result.deleted_paths.len().to_string());
    print_stat("Space freed", &format_bytes(result.bytes_freed));
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
