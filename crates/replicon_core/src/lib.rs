//! # Replicon Core
//!
//! The virtual CPU at the heart of Replicon, a digital-evolution engine in
//! which self-replicating programs compete for CPU time.
//!
//! This crate contains:
//! - The heads CPU: memory spaces, heads, cooperative threads
//! - Instruction sets with per-instruction cost and failure settings
//! - Mutation operators applied while copying and at divide time
//! - The divide protocol and its viability checks
//! - A deterministic test CPU for isolated genome evaluation
//! - Metrics collection and structured logging
//!
//! ## Example
//!
//! ```
//! use replicon_core::{default_ancestor, AppConfig, InstSet, TestCpu};
//! use std::sync::Arc;
//!
//! let set = Arc::new(InstSet::heads_default());
//! let ancestor = default_ancestor(&set, 50);
//! let info = TestCpu::new(set, &AppConfig::default(), None).evaluate(&ancestor);
//! assert!(info.self_replicates);
//! ```

/// Seed genomes
pub mod ancestor;
/// Configuration management for run parameters
pub mod config;
/// Per-instruction cost accounting
pub mod cost;
/// Offspring viability, divide-time mutation and hand-off
pub mod divide;
/// The heads CPU and its instruction semantics
pub mod hardware;
/// Heads and labels
pub mod head;
/// Instruction sets and the operation catalogue
pub mod inst_set;
/// Seams between the CPU and its host population
pub mod interface;
/// Run metrics and logging setup
pub mod metrics;
/// Mutation operators
pub mod mutation;
/// Organisms: genome, hardware and phenotype together
pub mod organism;
/// Per-organism measured traits
pub mod phenotype;
/// Isolated deterministic evaluation
pub mod test_cpu;

pub use ancestor::default_ancestor;
pub use config::AppConfig;
pub use divide::{DivideFault, FitnessVerdict};
pub use hardware::{HeadsCpu, StepOutcome};
pub use inst_set::{InstEntry, InstOp, InstSet};
pub use interface::{
    Environment, ExecContext, InterruptKind, Message, NullInterface, OrganismInterface,
    TaskOutcome, TraceSink, TracingSink,
};
pub use interface::draw_normal;
pub use metrics::{init_logging, Metrics};
pub use mutation::{MutationKind, MutationRecord};
pub use organism::{Organism, OrganismState};
pub use phenotype::Phenotype;
pub use replicon_data::{GenomeBuffer, Instruction, Sequence, SiteFlags};
pub use test_cpu::{TestCpu, TestInfo};
