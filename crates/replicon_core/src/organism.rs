use crate::config::AppConfig;
use crate::hardware::{HeadsCpu, StepOutcome};
use crate::inst_set::InstSet;
use crate::interface::{ExecContext, InterruptKind};
use crate::phenotype::Phenotype;
use rand::Rng;
use replicon_data::Sequence;
use std::sync::Arc;

/// Everything about an organism except its hardware.
#[derive(Debug, Clone)]
pub struct OrganismState {
    pub id: u64,
    /// Genome the organism was born with (or last split with).
    pub genome: Sequence,
    pub phenotype: Phenotype,
    /// Most recent input values, oldest first.
    pub inputs: Vec<i32>,
    pub alive: bool,
}

impl OrganismState {
    /// Records an input, keeping at most `capacity` values.
    pub fn push_input(&mut self, value: i32, capacity: usize) {
        self.inputs.push(value);
        if self.inputs.len() > capacity {
            let excess = self.inputs.len() - capacity;
            self.inputs.drain(..excess);
        }
    }
}

/// A genome bound to the CPU that runs it.
#[derive(Debug, Clone)]
pub struct Organism {
    pub hardware: HeadsCpu,
    pub state: OrganismState,
}

impl Organism {
    #[must_use]
    pub fn new(
        id: u64,
        genome: Sequence,
        inst_set: Arc<InstSet>,
        config: &AppConfig,
        num_tasks: usize,
        num_reactions: usize,
    ) -> Self {
        let phenotype = Phenotype::new(num_tasks, num_reactions, genome.len());
        Self::with_phenotype(id, genome, inst_set, config, phenotype)
    }

    /// Newborn whose phenotype is derived from `parent`.
    #[must_use]
    pub fn offspring(
        id: u64,
        genome: Sequence,
        parent: &Phenotype,
        inst_set: Arc<InstSet>,
        config: &AppConfig,
    ) -> Self {
        let phenotype = Phenotype::offspring_of(parent, genome.len());
        Self::with_phenotype(id, genome, inst_set, config, phenotype)
    }

    fn with_phenotype(
        id: u64,
        genome: Sequence,
        inst_set: Arc<InstSet>,
        config: &AppConfig,
        phenotype: Phenotype,
    ) -> Self {
        let hardware = HeadsCpu::new(inst_set, &genome, config);
        Self {
            hardware,
            state: OrganismState {
                id,
                genome,
                phenotype,
                inputs: Vec::with_capacity(config.cpu.input_buffer_size),
                alive: true,
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.state.id
    }

    #[must_use]
    pub fn genome(&self) -> &Sequence {
        &self.state.genome
    }

    #[must_use]
    pub fn phenotype(&self) -> &Phenotype {
        &self.state.phenotype
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.alive
    }

    pub fn kill(&mut self) {
        self.state.alive = false;
    }

    /// One engine step.
    pub fn process<R: Rng>(&mut self, ctx: &mut ExecContext<'_, R>) -> StepOutcome {
        self.hardware.single_process(&mut self.state, ctx)
    }

    /// Runs up to `cycles` steps, stopping early after a divide. Returns
    /// whether a divide happened.
    pub fn run_slice<R: Rng>(&mut self, cycles: u32, ctx: &mut ExecContext<'_, R>) -> bool {
        (0..cycles).any(|_| self.process(ctx) == StepOutcome::Divided)
    }

    pub fn interrupt(&mut self, kind: InterruptKind, config: &AppConfig) -> bool {
        self.hardware.interrupt_thread(kind, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_buffer_keeps_latest() {
        let config = AppConfig::default();
        let genome = Sequence::from_symbols("abc").unwrap();
        let mut org = Organism::new(1, genome, Arc::new(InstSet::heads_default()), &config, 0, 0);
        for v in 0..5 {
            org.state.push_input(v, 3);
        }
        assert_eq!(org.state.inputs, vec![2, 3, 4]);
    }
}
