//! # Replicon IO
//!
//! Persistence layer for Replicon runs.
//!
//! This crate provides:
//! - Structured error handling with a custom error type
//! - JSON and hex serialization helpers
//! - Organism genome files (one instruction name per line)
//! - Gzip population checkpoints and rkyv genome archives

/// Error types and result aliases for I/O operations
pub mod error;
/// Organism genome files
pub mod genome_file;
/// Population checkpoints and binary genome archives
pub mod persistence;
/// Validated serialization helpers for JSON and hex formats
pub mod serialization;

pub use error::{IoError, Result};
pub use genome_file::{format_genome, parse_genome, read_genome_file, write_genome_file};
pub use persistence::{
    load_checkpoint, load_genome_archive, save_checkpoint, save_genome_archive, CheckpointEntry,
    PopulationCheckpoint,
};
pub use serialization::{from_hex, from_json, read_json_file, to_hex, to_json, write_json_file};
