//! Content hashing for change detection, plus test doubles.

pub mod hash;
