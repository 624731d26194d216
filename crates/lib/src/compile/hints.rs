//! Remediation hints for a handful of well-known diagnostic codes.
//!
//! This is the only place that looks at compiler message content; all other
//! text is passed through untouched.

use super::Diagnostic;

/// Codes that get a remediation hint appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownCode {
  /// Unsafe code in a module that does not allow it.
  UnsafeCode,
  /// A symbol comes from a module that is not referenced.
  MissingReference,
  /// Wildcard version numbers break deterministic builds.
  NondeterministicVersion,
}

impl KnownCode {
  pub fn from_code(code: &str) -> Option<Self> {
    match code {
      "unsafe-code" => Some(KnownCode::UnsafeCode),
      "missing-reference" => Some(KnownCode::MissingReference),
      "nondeterministic-version" => Some(KnownCode::NondeterministicVersion),
      _ => None,
    }
  }

  fn hint(self, module: &str) -> String {
    match self {
      KnownCode::UnsafeCode => format!("Enable 'allow_unsafe' in the declaration of module '{}'.", module),
      KnownCode::MissingReference => format!(
        "The item may live in a module that is only explicitly referenced; add it to the references of '{}'.",
        module
      ),
      KnownCode::NondeterministicVersion => {
        "Wildcard version numbers are not compatible with deterministic builds; use a fixed version.".to_string()
      }
    }
  }
}

/// Append remediation hints to the messages of `module` in place.
pub fn enrich(module: &str, messages: &mut [Diagnostic]) {
  for message in messages.iter_mut() {
    let known = message.code.as_deref().and_then(KnownCode::from_code);
    if let Some(code) = known {
      message.message = format!("{} ({})", message.message, code.hint(module));
    }
  }
}
