//! Capability seams between the hardware engine and its surroundings.
//!
//! The engine never reaches into a population or environment directly:
//! everything it needs arrives through an [`ExecContext`] built by the caller
//! for each step.

use crate::config::AppConfig;
use crate::phenotype::Phenotype;
use rand::{Rng, RngCore};
use replicon_data::Sequence;
use serde::{Deserialize, Serialize};

/// Rewards produced by evaluating an organism's output.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Indices of tasks completed by this output.
    pub tasks: Vec<usize>,
    /// Indices of reactions triggered.
    pub reactions: Vec<usize>,
    pub bonus_add: f64,
    pub bonus_mult: f64,
    pub energy: f64,
}

impl Default for TaskOutcome {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            reactions: Vec::new(),
            bonus_add: 0.0,
            bonus_mult: 1.0,
            energy: 0.0,
        }
    }
}

/// Task and reaction grammar. Implementations are shared read-only across
/// worker threads.
pub trait Environment: Send + Sync {
    fn num_tasks(&self) -> usize;

    fn num_reactions(&self) -> usize;

    fn task_name(&self, task: usize) -> &str;

    /// Scores `output` against the organism's recent `inputs`.
    fn evaluate(&self, inputs: &[i32], output: i32, task_counts: &[u32]) -> TaskOutcome;

    /// Tasks credited only at divide time.
    fn evaluate_on_divide(&self, _task_counts: &[u32]) -> TaskOutcome {
        TaskOutcome::default()
    }
}

/// An inter-organism message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: u64,
    pub label: i32,
    pub data: i32,
}

/// External events that can spawn a handler thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    Message(Message),
    Movement,
}

impl InterruptKind {
    /// Label values marking the start of the handler in the genome.
    #[must_use]
    pub const fn handler_label(&self) -> [usize; 2] {
        match self {
            InterruptKind::Message(_) => [0, 0],
            InterruptKind::Movement => [1, 1],
        }
    }
}

/// Everything the engine asks of the population. One implementation per
/// host (world cell, test CPU).
pub trait OrganismInterface {
    /// Offers a finished offspring. `false` means the host refused it and
    /// the parent keeps its state.
    fn divide(&mut self, parent_id: u64, parent: &Phenotype, offspring: &Sequence) -> bool;

    /// Next environmental input value.
    fn input(&mut self) -> i32;

    /// Scores an output value.
    fn test_output(&mut self, _inputs: &[i32], _output: i32, _task_counts: &[u32]) -> TaskOutcome {
        TaskOutcome::default()
    }

    /// Scores on-divide tasks.
    fn test_on_divide(&mut self, _task_counts: &[u32]) -> TaskOutcome {
        TaskOutcome::default()
    }

    /// Id of the organism currently faced, if any.
    fn neighbor(&self) -> Option<u64> {
        None
    }

    fn rotate(&mut self, _direction: i32) {}

    /// Steps into the faced cell. Returns whether the move happened.
    fn move_forward(&mut self) -> bool {
        false
    }

    /// Resource levels available at the organism's location.
    fn resources(&self) -> Vec<f64> {
        Vec::new()
    }

    /// Applies signed changes to the local resource levels.
    fn update_resources(&mut self, _deltas: &[f64]) {}

    fn send_message(&mut self, _message: Message) -> bool {
        false
    }

    fn receive_message(&mut self) -> Option<Message> {
        None
    }

    /// A genome fragment from some other organism for horizontal transfer.
    fn donor_fragment(&mut self, _rng: &mut dyn RngCore) -> Option<Sequence> {
        None
    }

    fn join_group(&mut self, _group: i32) {}

    fn group(&self) -> Option<i32> {
        None
    }

    /// Task grammar used to test-run offspring genomes.
    fn environment(&self) -> Option<&dyn Environment> {
        None
    }
}

/// Write-only sink for human-readable execution status lines.
pub trait TraceSink {
    fn status(&mut self, line: &str);
}

impl TraceSink for Vec<String> {
    fn status(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Routes status lines to `tracing` at TRACE level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn status(&mut self, line: &str) {
        tracing::trace!(target: "replicon::cpu", "{}", line);
    }
}

/// Per-step context: configuration, randomness, population access and an
/// optional trace sink.
pub struct ExecContext<'a, R: Rng> {
    pub config: &'a AppConfig,
    pub rng: &'a mut R,
    pub interface: &'a mut dyn OrganismInterface,
    pub trace: Option<&'a mut dyn TraceSink>,
}

impl<'a, R: Rng> ExecContext<'a, R> {
    pub fn new(
        config: &'a AppConfig,
        rng: &'a mut R,
        interface: &'a mut dyn OrganismInterface,
    ) -> Self {
        Self {
            config,
            rng,
            interface,
            trace: None,
        }
    }

    #[must_use]
    pub fn with_trace(mut self, trace: &'a mut dyn TraceSink) -> Self {
        self.trace = Some(trace);
        self
    }

    /// True when a sink is attached; callers skip formatting otherwise.
    #[must_use]
    pub fn tracing(&self) -> bool {
        self.trace.is_some()
    }

    pub fn emit(&mut self, line: &str) {
        if let Some(sink) = self.trace.as_deref_mut() {
            sink.status(line);
        }
    }
}

/// Interface that accepts every divide and feeds zero inputs. Useful for
/// running a lone organism.
#[derive(Debug, Default)]
pub struct NullInterface {
    pub offspring: Vec<Sequence>,
}

impl OrganismInterface for NullInterface {
    fn divide(&mut self, _parent_id: u64, _parent: &Phenotype, offspring: &Sequence) -> bool {
        self.offspring.push(offspring.clone());
        true
    }

    fn input(&mut self) -> i32 {
        0
    }
}

/// Gaussian draw via Box-Muller.
pub fn draw_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_vec_sink_collects_lines() {
        let mut sink: Vec<String> = Vec::new();
        sink.status("IP 0");
        assert_eq!(sink, vec!["IP 0".to_string()]);
    }

    #[test]
    fn test_handler_labels_differ() {
        let msg = InterruptKind::Message(Message {
            sender: 1,
            label: 0,
            data: 0,
        });
        assert_ne!(msg.handler_label(), InterruptKind::Movement.handler_label());
    }

    #[test]
    fn test_draw_normal_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| draw_normal(&mut rng, 2.0, 0.5)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((mean - 2.0).abs() < 0.02, "mean = {mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.02, "sd = {}", var.sqrt());
    }
}
