mod build;
mod clean;
mod graph;

pub use build::{BuildArgs, cmd_build};
pub use clean::cmd_clean;
pub use graph::cmd_graph;
