//! Core data structures for the Replicon virtual CPU.

pub mod flags;
pub mod genome;
pub mod instruction;
pub mod sequence;
