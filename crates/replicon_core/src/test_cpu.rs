//! Isolated evaluation of a single genome.
//!
//! A [`TestCpu`] runs one organism alone with mutations disabled, fixed
//! inputs and a fixed random seed, so the same genome always produces the
//! same [`TestInfo`].

use crate::config::{AppConfig, DivideMethod, MutationConfig, RevertConfig};
use crate::hardware::StepOutcome;
use crate::inst_set::InstSet;
use crate::interface::{Environment, ExecContext, OrganismInterface, TaskOutcome, TraceSink};
use crate::organism::Organism;
use crate::phenotype::Phenotype;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use replicon_data::Sequence;
use std::sync::Arc;

/// Input values fed to organisms under test, in rotation.
pub const TEST_INPUTS: [i32; 3] = [0x0f13_149f, 0x3308_e53e, 0x5562_41eb];

const TEST_CPU_SEED: u64 = 0x7e57_c0de;

/// Measurements from one test run.
#[derive(Debug, Clone, PartialEq)]
pub struct TestInfo {
    /// Produced an offspring within the cycle limit.
    pub viable: bool,
    /// The offspring equals the tested genome.
    pub self_replicates: bool,
    pub merit: f64,
    pub gestation_time: u64,
    pub fitness: f64,
    pub task_counts: Vec<u32>,
    pub copied_size: usize,
    pub executed_size: usize,
    pub offspring: Option<Sequence>,
    pub cycles: u64,
}

/// Deterministic single-organism runner.
pub struct TestCpu<'a> {
    inst_set: Arc<InstSet>,
    config: AppConfig,
    max_cycles: u64,
    env: Option<&'a dyn Environment>,
}

impl<'a> TestCpu<'a> {
    #[must_use]
    pub fn new(inst_set: Arc<InstSet>, config: &AppConfig, env: Option<&'a dyn Environment>) -> Self {
        let max_cycles = config.revert.max_cycles();
        let mut config = config.clone();
        config.mutation = MutationConfig::zero();
        config.revert = RevertConfig::default();
        config.cpu.divide_method = DivideMethod::Split;
        Self {
            inst_set,
            config,
            max_cycles,
            env,
        }
    }

    #[must_use]
    pub fn with_max_cycles(mut self, max_cycles: u64) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    #[must_use]
    pub fn evaluate(&self, genome: &Sequence) -> TestInfo {
        self.run(genome, None)
    }

    /// Like [`TestCpu::evaluate`], writing one status line per step.
    pub fn trace(&self, genome: &Sequence, sink: &mut dyn TraceSink) -> TestInfo {
        self.run(genome, Some(sink))
    }

    fn run(&self, genome: &Sequence, trace: Option<&mut dyn TraceSink>) -> TestInfo {
        let num_tasks = self.env.map_or(0, |e| e.num_tasks());
        let num_reactions = self.env.map_or(0, |e| e.num_reactions());
        if genome.is_empty() {
            return TestInfo::failed(vec![0; num_tasks], 0);
        }

        let mut organism = Organism::new(
            0,
            genome.clone(),
            Arc::clone(&self.inst_set),
            &self.config,
            num_tasks,
            num_reactions,
        );
        let mut interface = TestInterface {
            env: self.env,
            next_input: 0,
            offspring: None,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(TEST_CPU_SEED);

        let mut cycles = 0;
        {
            let mut ctx = ExecContext::new(&self.config, &mut rng, &mut interface);
            if let Some(sink) = trace {
                ctx = ctx.with_trace(sink);
            }
            while cycles < self.max_cycles {
                cycles += 1;
                if organism.process(&mut ctx) == StepOutcome::Divided {
                    break;
                }
            }
        }

        let phenotype = organism.phenotype();
        match interface.offspring {
            Some(offspring) => TestInfo {
                viable: true,
                self_replicates: &offspring == genome,
                merit: phenotype.merit,
                gestation_time: phenotype.gestation_time,
                fitness: phenotype.fitness,
                task_counts: phenotype.last_task_count.clone(),
                copied_size: phenotype.copied_size,
                executed_size: phenotype.executed_size,
                offspring: Some(offspring),
                cycles,
            },
            None => TestInfo::failed(phenotype.cur_task_count.clone(), cycles),
        }
    }
}

impl TestInfo {
    fn failed(task_counts: Vec<u32>, cycles: u64) -> Self {
        Self {
            viable: false,
            self_replicates: false,
            merit: 0.0,
            gestation_time: 0,
            fitness: 0.0,
            task_counts,
            copied_size: 0,
            executed_size: 0,
            offspring: None,
            cycles,
        }
    }
}

struct TestInterface<'a> {
    env: Option<&'a dyn Environment>,
    next_input: usize,
    offspring: Option<Sequence>,
}

impl OrganismInterface for TestInterface<'_> {
    fn divide(&mut self, _parent_id: u64, _parent: &Phenotype, offspring: &Sequence) -> bool {
        if self.offspring.is_none() {
            self.offspring = Some(offspring.clone());
        }
        true
    }

    fn input(&mut self) -> i32 {
        let value = TEST_INPUTS[self.next_input % TEST_INPUTS.len()];
        self.next_input += 1;
        value
    }

    fn test_output(&mut self, inputs: &[i32], output: i32, task_counts: &[u32]) -> TaskOutcome {
        self.env
            .map(|env| env.evaluate(inputs, output, task_counts))
            .unwrap_or_default()
    }

    fn test_on_divide(&mut self, task_counts: &[u32]) -> TaskOutcome {
        self.env
            .map(|env| env.evaluate_on_divide(task_counts))
            .unwrap_or_default()
    }

    fn environment(&self) -> Option<&dyn Environment> {
        self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ancestor::default_ancestor;

    #[test]
    fn test_ancestor_self_replicates() {
        let set = Arc::new(InstSet::heads_default());
        let config = AppConfig::default();
        let ancestor = default_ancestor(&set, 50);
        let info = TestCpu::new(Arc::clone(&set), &config, None).evaluate(&ancestor);
        assert!(info.viable);
        assert!(info.self_replicates);
        assert_eq!(info.copied_size, 50);
        assert!(info.gestation_time > 0);
        assert!(info.fitness > 0.0);
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let set = Arc::new(InstSet::heads_default());
        let mut config = AppConfig::default();
        config.mutation.copy_mut_prob = 0.5;
        let ancestor = default_ancestor(&set, 40);
        let cpu = TestCpu::new(set, &config, None);
        assert_eq!(cpu.evaluate(&ancestor), cpu.evaluate(&ancestor));
        assert!(cpu.evaluate(&ancestor).self_replicates);
    }

    #[test]
    fn test_non_replicator_times_out() {
        let set = Arc::new(InstSet::heads_default());
        let config = AppConfig::default();
        let genome = Sequence::from_symbols("aaaaaaaaaa").unwrap();
        let info = TestCpu::new(set, &config, None)
            .with_max_cycles(200)
            .evaluate(&genome);
        assert!(!info.viable);
        assert_eq!(info.cycles, 200);
        assert_eq!(info.fitness, 0.0);
    }

    #[test]
    fn test_trace_writes_status_lines() {
        let set = Arc::new(InstSet::heads_default());
        let config = AppConfig::default();
        let genome = Sequence::from_symbols("aaaa").unwrap();
        let mut lines: Vec<String> = Vec::new();
        TestCpu::new(set, &config, None)
            .with_max_cycles(5)
            .trace(&genome, &mut lines);
        assert_eq!(lines.len(), 5);
    }
}
