//! modforge-lib: incremental module build orchestration
//!
//! This crate provides the pieces of a non-blocking, tick-driven build loop:
//! - `Module`/`ModuleGraph`: modules built from declarations and the source set
//! - `DirtyState`: the ledger of modules and binaries needing recompilation
//! - `BuildPlan`/`CompilationTask`: ordered, concurrency-capped compilation
//! - `OutputPlacer`: moving finished binaries into the output directory
//! - `Orchestrator`: the façade the caller ticks

pub mod compile;
pub mod config;
pub mod consts;
pub mod dirty;
pub mod graph;
pub mod module;
pub mod orchestrator;
pub mod output;
pub mod schedule;
pub mod util;
