//! Deterministic, pure logic of the work unit lifecycle.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod backstop;
pub mod checkpoint;
pub mod deps;
pub mod resolver;
pub mod role;
pub mod sequence;
pub mod strategy;
pub mod types;
