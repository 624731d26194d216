//! End-to-end tests running the modforge binary against small projects that
//! compile with a shell script.

mod build_tests;
mod clean_tests;
mod common;
