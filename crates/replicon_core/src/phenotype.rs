//! Per-organism record of performance during the current and last gestation.

use crate::divide::DivideFault;
use crate::interface::TaskOutcome;

/// Counters and rewards read by cost gating and the divide protocol.
///
/// A *gestation* runs from one successful divide to the next; `cur_*`
/// values belong to the running gestation and are rolled into `last_*` by
/// [`Phenotype::divide_reset`].
#[derive(Debug, Clone, PartialEq)]
pub struct Phenotype {
    pub merit: f64,
    pub cur_bonus: f64,
    pub energy_store: f64,
    pub cur_task_count: Vec<u32>,
    pub last_task_count: Vec<u32>,
    pub cur_reaction_count: Vec<u32>,
    pub last_reaction_count: Vec<u32>,
    pub stored_resources: Vec<f64>,
    pub is_fertile: bool,
    pub generation: u32,
    pub num_divides: u32,
    pub cpu_cycles: u64,
    pub gestation_start: u64,
    pub gestation_time: u64,
    /// Invalid opcodes executed this gestation.
    pub cur_num_errors: u32,
    pub num_faults: u32,
    pub last_fault: Option<DivideFault>,
    pub genome_length: usize,
    pub copied_size: usize,
    pub executed_size: usize,
    pub fitness: f64,
}

impl Phenotype {
    #[must_use]
    pub fn new(num_tasks: usize, num_reactions: usize, genome_length: usize) -> Self {
        Self {
            merit: genome_length as f64,
            cur_bonus: 1.0,
            energy_store: 0.0,
            cur_task_count: vec![0; num_tasks],
            last_task_count: vec![0; num_tasks],
            cur_reaction_count: vec![0; num_reactions],
            last_reaction_count: vec![0; num_reactions],
            stored_resources: Vec::new(),
            is_fertile: true,
            generation: 0,
            num_divides: 0,
            cpu_cycles: 0,
            gestation_start: 0,
            gestation_time: 0,
            cur_num_errors: 0,
            num_faults: 0,
            last_fault: None,
            genome_length,
            copied_size: 0,
            executed_size: 0,
            fitness: 0.0,
        }
    }

    /// Phenotype of an offspring produced by `parent`. Merit and the last
    /// gestation's measures are inherited so the newborn starts with its
    /// parent's standing.
    #[must_use]
    pub fn offspring_of(parent: &Phenotype, genome_length: usize) -> Self {
        let mut child = Self::new(
            parent.cur_task_count.len(),
            parent.cur_reaction_count.len(),
            genome_length,
        );
        child.merit = parent.merit;
        child.generation = parent.generation + 1;
        child.gestation_time = parent.gestation_time;
        child.fitness = parent.fitness;
        child.last_task_count = parent.last_task_count.clone();
        child.last_reaction_count = parent.last_reaction_count.clone();
        child
    }

    /// Credits the result of an output evaluation.
    pub fn apply_outcome(&mut self, outcome: &TaskOutcome) {
        for &task in &outcome.tasks {
            if let Some(count) = self.cur_task_count.get_mut(task) {
                *count += 1;
            }
        }
        for &reaction in &outcome.reactions {
            if let Some(count) = self.cur_reaction_count.get_mut(reaction) {
                *count += 1;
            }
        }
        self.cur_bonus += outcome.bonus_add;
        self.cur_bonus *= outcome.bonus_mult;
        self.energy_store += outcome.energy;
    }

    #[must_use]
    pub fn stored_resource(&self, idx: usize) -> f64 {
        self.stored_resources.get(idx).copied().unwrap_or(0.0)
    }

    pub fn add_resource(&mut self, idx: usize, amount: f64) {
        if self.stored_resources.len() <= idx {
            self.stored_resources.resize(idx + 1, 0.0);
        }
        self.stored_resources[idx] = (self.stored_resources[idx] + amount).max(0.0);
    }

    /// Any reaction performed during the running gestation.
    #[must_use]
    pub fn any_reaction(&self) -> bool {
        self.cur_reaction_count.iter().any(|&c| c > 0)
    }

    pub fn record_fault(&mut self, fault: DivideFault) {
        self.num_faults += 1;
        self.last_fault = Some(fault);
    }

    /// Closes the running gestation after a successful divide.
    ///
    /// Merit becomes `min(copied, executed) * bonus`; current counts move to
    /// the last-gestation slots and the bonus restarts at 1.
    pub fn divide_reset(&mut self, genome_length: usize, copied_size: usize, executed_size: usize) {
        self.genome_length = genome_length;
        self.copied_size = copied_size;
        self.executed_size = executed_size;

        let base = copied_size.min(executed_size).max(1) as f64;
        self.merit = base * self.cur_bonus;
        self.gestation_time = self.cpu_cycles - self.gestation_start;
        self.gestation_start = self.cpu_cycles;
        self.fitness = if self.gestation_time > 0 {
            self.merit / self.gestation_time as f64
        } else {
            0.0
        };

        self.last_task_count = std::mem::replace(
            &mut self.cur_task_count,
            vec![0; self.last_task_count.len()],
        );
        self.last_reaction_count = std::mem::replace(
            &mut self.cur_reaction_count,
            vec![0; self.last_reaction_count.len()],
        );
        self.cur_bonus = 1.0;
        self.cur_num_errors = 0;
        self.num_divides += 1;
        self.generation += 1;
    }
}
