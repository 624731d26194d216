//! Terminal rendering for build events and command results.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use modforge_lib::compile::{Diagnostic, Severity};
use modforge_lib::graph::SetupError;
use modforge_lib::orchestrator::CompilationEvent;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;

  if bytes >= MB {
    format!("{:.1} MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1} KB", bytes as f64 / KB as f64)
  } else {
    format!("{} B", bytes)
  }
}

/// Human-readable duration rounded to milliseconds.
pub fn format_duration(duration: Duration) -> String {
  let millis = Duration::from_millis(duration.as_millis() as u64);
  if millis.is_zero() {
    return "0ms".to_string();
  }
  humantime::format_duration(millis).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Print each setup error with the declaration files involved.
pub fn print_setup_errors(errors: &[SetupError]) {
  for error in errors {
    print_error(&error.to_string());
    for path in error.paths() {
      eprintln!("    {}", path.display());
    }
  }
}

fn print_diagnostic(diagnostic: &Diagnostic) {
  let line = format!("    {}", diagnostic);
  match diagnostic.severity {
    Severity::Error => eprintln!("{}", line.if_supports_color(Stream::Stderr, |s| s.red())),
    Severity::Warning => eprintln!("{}", line.if_supports_color(Stream::Stderr, |s| s.yellow())),
    Severity::Info => eprintln!("{}", line.if_supports_color(Stream::Stderr, |s| s.dimmed())),
  }
}

/// Render one lifecycle event. `verbose` also shows module starts and
/// non-error diagnostics of successful modules.
pub fn print_event(event: &CompilationEvent, verbose: bool) {
  match event {
    CompilationEvent::CycleStarted { modules } => print_info(&format!("Compiling {} module(s)", modules)),
    CompilationEvent::ModuleExcluded { module, reason } => print_warning(&format!("{} excluded: {}", module, reason)),
    CompilationEvent::ModuleStarted { module } => {
      if verbose {
        println!(
          "  {} {}",
          symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.dimmed()),
          module
        );
      }
    }
    CompilationEvent::ModuleFinished {
      module,
      succeeded: true,
      messages,
      duration,
    } => {
      print_success(&format!("{} ({})", module, format_duration(*duration)));
      messages
        .iter()
        .filter(|m| verbose || m.severity == Severity::Warning)
        .for_each(print_diagnostic);
    }
    CompilationEvent::ModuleFinished { module, messages, .. } => {
      print_error(&format!("{} failed", module));
      messages.iter().for_each(print_diagnostic);
    }
    CompilationEvent::ModuleSkipped {
      module,
      failed_dependency,
    } => print_warning(&format!("{} skipped: depends on failed module {}", module, failed_dependency)),
    CompilationEvent::CycleFinished {
      succeeded,
      compiled,
      failed,
      skipped,
      duration,
    } => {
      println!();
      if *succeeded {
        print_success("Build complete");
      } else {
        print_error("Build failed");
      }
      print_stat("Compiled", &compiled.to_string());
      if *failed > 0 {
        print_stat("Failed", &failed.to_string());
      }
      if *skipped > 0 {
        print_stat("Skipped", &skipped.to_string());
      }
      print_stat("Duration", &format_duration(*duration));
    }
    CompilationEvent::CycleStopped => print_warning("Compilation stopped"),
  }
}
