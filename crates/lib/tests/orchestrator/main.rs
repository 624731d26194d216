//! Integration tests for the orchestrator: full tick loops against scripted
//! compilers and real output directories.

mod common;
mod cycle_tests;
mod graph_tests;
mod output_tests;
