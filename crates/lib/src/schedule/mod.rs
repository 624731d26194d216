//! Compilation scheduling.
//!
//! This module provides:
//! - Build-plan computation from the graph and the dirty ledger
//! - A polled, non-blocking task that drives compiler invocations under a
//!   concurrency cap, codegen wave first
//! - Failure propagation: dependents of a failed module are skipped

mod plan;
mod task;
mod types;

pub use plan::{BuildPlan, PlanInput, precompiled_names};
pub use task::{CompilationTask, TaskContext};
pub use types::{CompilationEvent, Exclusion, ExclusionReason, ModuleState, TaskState};
