//! Modules and the declarations they are built from.
//!
//! A module is a named compilation unit producing one output binary from a
//! set of source files. Modules come from two places:
//!
//! - **Declarations** ([`ModuleDecl`]): explicit module-definition files that
//!   own every source below their directory.
//! - **Default grouping**: sources no declaration owns land in one of the
//!   predefined modules (see [`crate::consts::RESERVED_MODULE_NAMES`]).
//!
//! Parsing declaration files is the caller's job; this module only defines the
//! parsed shape (all types deserialize with `serde`).

mod types;

pub use types::*;
