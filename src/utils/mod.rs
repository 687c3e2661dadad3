//! Helpers for exercising targets and locks in tests and doc examples.
pub mod testing;
