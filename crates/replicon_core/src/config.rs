//! Configuration management for CPU, cost, mutation and divide parameters.
//!
//! This module provides strongly-typed configuration structures that map to
//! the `config.toml` file. Every section has defaults, so a file only needs
//! the keys it overrides.
//!
//! ## Example `config.toml`
//!
//! ```toml
//! [world]
//! width = 60
//! height = 60
//! seed = 42
//!
//! [mutation]
//! copy_mut_prob = 0.0075
//! divide_order = ["slip", "translocation", "insertion", "deletion"]
//!
//! [divide]
//! required_task = 1
//! ```

use crate::mutation::MutationKind;
use serde::{Deserialize, Serialize};

/// Longest label the CPU will read; base-3 values of longer labels stop
/// fitting thread ids.
pub const MAX_LABEL_SIZE: usize = 64;

/// How new offspring are placed by the population driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BirthPolicy {
    /// Offspring replace a random cell (well-mixed population).
    #[default]
    ReplaceRandom,
    /// Offspring only fill empty cells; divides are refused when full.
    EmptyOnly,
}

/// Population driver parameters.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WorldConfig {
    pub width: u16,
    pub height: u16,
    pub seed: Option<u64>,
    pub deterministic: bool,
    /// Average instructions executed per organism per update.
    pub ave_time_slice: u32,
    /// Relative standard deviation of each organism's slice; 0 disables.
    pub slice_jitter: f64,
    pub max_updates: u64,
    pub checkpoint_interval: u64,
    pub log_interval: u64,
    pub birth_policy: BirthPolicy,
    /// Advance organisms on the rayon pool (requires `ReplaceRandom`).
    pub parallel: bool,
    pub resource_inflow: f64,
    pub max_resource: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 60,
            height: 60,
            seed: None,
            deterministic: false,
            ave_time_slice: 30,
            slice_jitter: 0.0,
            max_updates: 1000,
            checkpoint_interval: 0,
            log_interval: 100,
            birth_policy: BirthPolicy::ReplaceRandom,
            parallel: false,
            resource_inflow: 1.0,
            max_resource: 1000.0,
        }
    }
}

/// What happens to the parent after a successful divide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DivideMethod {
    /// Parent hardware restarts from its genome, like a newborn.
    #[default]
    Split,
    /// Parent keeps its execution state; only the offspring memory is freed.
    Birth,
}

/// How the engine moves between threads after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSlicing {
    /// Advance to the next thread after every instruction.
    #[default]
    RoundRobin,
    /// Stay on the current thread until an instruction switches explicitly.
    Explicit,
}

/// Hardware engine parameters.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CpuConfig {
    /// Named instruction set (`heads_default` or `heads_extended`).
    pub inst_set: String,
    pub thread_slicing: ThreadSlicing,
    pub max_threads: usize,
    pub max_label_size: usize,
    /// Offspring memory allocated by `h-alloc`, as a multiple of the parent length.
    pub offspring_alloc_ratio: f64,
    /// Divide implicitly after this many cycles since the last divide.
    pub implicit_repro_cycles: Option<u64>,
    /// Divide implicitly whenever the IP wraps past the end of the genome.
    pub implicit_repro_end: bool,
    pub divide_method: DivideMethod,
    pub interrupts_enabled: bool,
    /// Fraction of an available resource taken by one `collect`.
    pub collect_fraction: f64,
    pub input_buffer_size: usize,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            inst_set: "heads_default".to_string(),
            thread_slicing: ThreadSlicing::RoundRobin,
            max_threads: 4,
            max_label_size: 10,
            offspring_alloc_ratio: 2.0,
            implicit_repro_cycles: None,
            implicit_repro_end: false,
            divide_method: DivideMethod::Split,
            interrupts_enabled: true,
            collect_fraction: 0.1,
            input_buffer_size: 3,
        }
    }
}

/// Toggles for the additive execution cost model.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CostConfig {
    /// Charge each instruction's per-use cycle cost.
    pub per_inst: bool,
    /// Charge the first-time cost the first time an opcode runs.
    pub first_time: bool,
    /// Charge `thread_cost` extra cycles while more than one thread is alive.
    pub per_thread: bool,
    pub thread_cost: u32,
    /// Gate instructions on the organism's energy store.
    pub energy: bool,
    /// Gate instructions on the organism's internally stored resource.
    pub resource: bool,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            per_inst: true,
            first_time: false,
            per_thread: false,
            thread_cost: 1,
            energy: false,
            resource: false,
        }
    }
}

/// Mutation rates. Per-site rates apply to each site independently;
/// divide rates fire at most once per divide.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MutationConfig {
    pub copy_mut_prob: f64,
    pub copy_ins_prob: f64,
    pub copy_del_prob: f64,
    pub point_mut_prob: f64,
    pub divide_mut_prob: f64,
    pub divide_ins_prob: f64,
    pub divide_del_prob: f64,
    pub divide_uniform_prob: f64,
    pub divide_slip_prob: f64,
    /// Per-site rates applied to the offspring at divide.
    pub divide_site_mut_prob: f64,
    pub divide_site_ins_prob: f64,
    pub divide_site_del_prob: f64,
    pub slip_dup_prob: f64,
    pub slip_del_prob: f64,
    pub divide_trans_prob: f64,
    pub hgt_prob: f64,
    /// Fixed number of substitutions per divide, drawn at distinct sites.
    pub exact_mutations: usize,
    /// Order in which the divide-time operators run.
    pub divide_order: Vec<MutationKind>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            copy_mut_prob: 0.0075,
            copy_ins_prob: 0.0,
            copy_del_prob: 0.0,
            point_mut_prob: 0.0,
            divide_mut_prob: 0.0,
            divide_ins_prob: 0.05,
            divide_del_prob: 0.05,
            divide_uniform_prob: 0.0,
            divide_slip_prob: 0.0,
            divide_site_mut_prob: 0.0,
            divide_site_ins_prob: 0.0,
            divide_site_del_prob: 0.0,
            slip_dup_prob: 0.5,
            slip_del_prob: 0.5,
            divide_trans_prob: 0.0,
            hgt_prob: 0.0,
            exact_mutations: 0,
            divide_order: MutationKind::DEFAULT_DIVIDE_ORDER.to_vec(),
        }
    }
}

impl MutationConfig {
    /// All rates zeroed; the divide order is kept.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            copy_mut_prob: 0.0,
            copy_ins_prob: 0.0,
            copy_del_prob: 0.0,
            point_mut_prob: 0.0,
            divide_mut_prob: 0.0,
            divide_ins_prob: 0.0,
            divide_del_prob: 0.0,
            divide_uniform_prob: 0.0,
            divide_slip_prob: 0.0,
            divide_site_mut_prob: 0.0,
            divide_site_ins_prob: 0.0,
            divide_site_del_prob: 0.0,
            divide_trans_prob: 0.0,
            hgt_prob: 0.0,
            exact_mutations: 0,
            ..Self::default()
        }
    }

    fn probabilities(&self) -> [(&'static str, f64); 16] {
        [
            ("copy_mut_prob", self.copy_mut_prob),
            ("copy_ins_prob", self.copy_ins_prob),
            ("copy_del_prob", self.copy_del_prob),
            ("point_mut_prob", self.point_mut_prob),
            ("divide_mut_prob", self.divide_mut_prob),
            ("divide_ins_prob", self.divide_ins_prob),
            ("divide_del_prob", self.divide_del_prob),
            ("divide_uniform_prob", self.divide_uniform_prob),
            ("divide_slip_prob", self.divide_slip_prob),
            ("divide_site_mut_prob", self.divide_site_mut_prob),
            ("divide_site_ins_prob", self.divide_site_ins_prob),
            ("divide_site_del_prob", self.divide_site_del_prob),
            ("slip_dup_prob", self.slip_dup_prob),
            ("slip_del_prob", self.slip_del_prob),
            ("divide_trans_prob", self.divide_trans_prob),
            ("hgt_prob", self.hgt_prob),
        ]
    }
}

/// Viability requirements checked before an offspring is released.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DivideConfig {
    pub required_task: Option<usize>,
    /// Performing this task waives `required_task`.
    pub immunity_task: Option<usize>,
    pub required_bonus: f64,
    pub required_reaction: Option<usize>,
    /// Require at least one reaction of any kind.
    pub require_any_reaction: bool,
    pub required_resource: Option<usize>,
    /// Stored amount of `required_resource` needed (consumed on success).
    pub required_resource_level: f64,
    /// Offspring/parent length ratio must lie within `[1/r, r]`.
    pub offspring_size_range: f64,
    pub min_copied_fraction: f64,
    pub min_executed_fraction: f64,
    pub min_genome_size: usize,
    pub max_genome_size: usize,
}

impl Default for DivideConfig {
    fn default() -> Self {
        Self {
            required_task: None,
            immunity_task: None,
            required_bonus: 0.0,
            required_reaction: None,
            require_any_reaction: false,
            required_resource: None,
            required_resource_level: 0.0,
            offspring_size_range: 2.0,
            min_copied_fraction: 0.5,
            min_executed_fraction: 0.5,
            min_genome_size: 8,
            max_genome_size: 2048,
        }
    }
}

/// Fitness-based revert/sterilize policy. Each value is the probability of
/// acting when the offspring falls in that category.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RevertConfig {
    pub revert_fatal: f64,
    pub revert_detrimental: f64,
    pub revert_neutral: f64,
    pub revert_beneficial: f64,
    pub revert_taskloss: f64,
    pub revert_equals: f64,
    pub sterilize_fatal: f64,
    pub sterilize_detrimental: f64,
    pub sterilize_neutral: f64,
    pub sterilize_beneficial: f64,
    pub sterilize_taskloss: f64,
    /// Relative fitness band treated as neutral.
    pub neutral_tolerance: f64,
    /// Cycle budget for each test-CPU evaluation.
    pub test_max_cycles: u64,
}

impl RevertConfig {
    fn probabilities(&self) -> [(&'static str, f64); 11] {
        [
            ("revert_fatal", self.revert_fatal),
            ("revert_detrimental", self.revert_detrimental),
            ("revert_neutral", self.revert_neutral),
            ("revert_beneficial", self.revert_beneficial),
            ("revert_taskloss", self.revert_taskloss),
            ("revert_equals", self.revert_equals),
            ("sterilize_fatal", self.sterilize_fatal),
            ("sterilize_detrimental", self.sterilize_detrimental),
            ("sterilize_neutral", self.sterilize_neutral),
            ("sterilize_beneficial", self.sterilize_beneficial),
            ("sterilize_taskloss", self.sterilize_taskloss),
        ]
    }

    /// True when any policy can fire, i.e. offspring must be test-run.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.probabilities().iter().any(|(_, p)| *p > 0.0)
    }

    #[must_use]
    pub fn max_cycles(&self) -> u64 {
        if self.test_max_cycles == 0 {
            10_000
        } else {
            self.test_max_cycles
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub world: WorldConfig,
    pub cpu: CpuConfig,
    pub cost: CostConfig,
    pub mutation: MutationConfig,
    pub divide: DivideConfig,
    pub revert: RevertConfig,
}

impl AppConfig {
    /// Validates all configuration parameters.
    ///
    /// Returns `Ok(())` if all parameters are valid, or `Err` with a description
    /// of the first validation failure.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.world.width > 0, "World width must be positive");
        anyhow::ensure!(self.world.height > 0, "World height must be positive");
        anyhow::ensure!(
            self.world.ave_time_slice > 0,
            "Average time slice must be positive"
        );
        anyhow::ensure!(
            self.world.slice_jitter >= 0.0,
            "Slice jitter must be non-negative"
        );
        anyhow::ensure!(
            !(self.world.parallel && self.world.birth_policy == BirthPolicy::EmptyOnly),
            "Parallel updates require the replace_random birth policy"
        );
        anyhow::ensure!(
            self.world.resource_inflow >= 0.0 && self.world.max_resource >= 0.0,
            "Resource inflow and capacity must be non-negative"
        );

        anyhow::ensure!(
            crate::inst_set::InstSet::by_set_name(&self.cpu.inst_set).is_some(),
            "Unknown instruction set {:?}",
            self.cpu.inst_set
        );
        anyhow::ensure!(self.cpu.max_threads > 0, "Max threads must be positive");
        anyhow::ensure!(
            (1..=MAX_LABEL_SIZE).contains(&self.cpu.max_label_size),
            "Max label size must be between 1 and {}",
            MAX_LABEL_SIZE
        );
        anyhow::ensure!(
            self.cpu.offspring_alloc_ratio >= 1.0,
            "Offspring allocation ratio must be at least 1.0"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.cpu.collect_fraction),
            "Collect fraction must be in [0.0, 1.0]"
        );
        anyhow::ensure!(
            self.cpu.input_buffer_size > 0,
            "Input buffer size must be positive"
        );

        for (name, p) in self.mutation.probabilities() {
            anyhow::ensure!((0.0..=1.0).contains(&p), "{} must be in [0.0, 1.0]", name);
        }
        anyhow::ensure!(
            self.mutation.slip_dup_prob + self.mutation.slip_del_prob <= 1.0,
            "slip_dup_prob + slip_del_prob must not exceed 1.0"
        );
        for kind in &self.mutation.divide_order {
            anyhow::ensure!(
                kind.is_divide_step(),
                "{:?} cannot appear in mutation.divide_order",
                kind
            );
        }

        anyhow::ensure!(
            self.divide.offspring_size_range >= 1.0,
            "Offspring size range must be at least 1.0"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.divide.min_copied_fraction),
            "Min copied fraction must be in [0.0, 1.0]"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.divide.min_executed_fraction),
            "Min executed fraction must be in [0.0, 1.0]"
        );
        anyhow::ensure!(
            self.divide.min_genome_size > 0
                && self.divide.min_genome_size <= self.divide.max_genome_size,
            "Genome size bounds must satisfy 0 < min <= max"
        );
        anyhow::ensure!(
            self.divide.required_resource_level >= 0.0,
            "Required resource level must be non-negative"
        );

        for (name, p) in self.revert.probabilities() {
            anyhow::ensure!((0.0..=1.0).contains(&p), "{} must be in [0.0, 1.0]", name);
        }
        anyhow::ensure!(
            self.revert.neutral_tolerance >= 0.0,
            "Neutral tolerance must be non-negative"
        );

        Ok(())
    }

    /// Parses and validates a `config.toml` document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config = toml::from_str::<Self>(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Hash of every parameter that influences evolution, used to tag
    /// checkpoints so they are not resumed under different rules.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.cpu).as_bytes());
        hasher.update(format!("{:?}", self.cost).as_bytes());
        hasher.update(format!("{:?}", self.mutation).as_bytes());
        hasher.update(format!("{:?}", self.divide).as_bytes());
        hasher.update(format!("{:?}", self.revert).as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_world_width() {
        let config = AppConfig {
            world: WorldConfig {
                width: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_label_size_bounded() {
        let mut config = AppConfig::default();
        config.cpu.max_label_size = MAX_LABEL_SIZE;
        assert!(config.validate().is_ok());
        config.cpu.max_label_size = MAX_LABEL_SIZE + 1;
        assert!(config.validate().is_err());
        config.cpu.max_label_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_copy_mutation_rate() {
        let config = AppConfig {
            mutation: MutationConfig {
                copy_mut_prob: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_slip_probabilities_must_fit() {
        let config = AppConfig {
            mutation: MutationConfig {
                slip_dup_prob: 0.7,
                slip_del_prob: 0.7,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parallel_requires_replace_policy() {
        let mut config = AppConfig::default();
        config.world.parallel = true;
        config.world.birth_policy = BirthPolicy::EmptyOnly;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [world]
            seed = 7

            [mutation]
            copy_mut_prob = 0.01
            divide_order = ["slip", "point"]

            [divide]
            required_task = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.world.seed, Some(7));
        assert_eq!(config.world.width, 60);
        assert_eq!(
            config.mutation.divide_order,
            vec![MutationKind::Slip, MutationKind::Point]
        );
        assert_eq!(config.divide.required_task, Some(2));
    }

    #[test]
    fn test_copy_step_rejected_in_divide_order() {
        let mut config = AppConfig::default();
        config.mutation.divide_order = vec![MutationKind::Copy];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_inst_set_rejected() {
        let mut config = AppConfig::default();
        config.cpu.inst_set = "transsmt".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_revert_disabled_by_default() {
        assert!(!RevertConfig::default().is_enabled());
    }

    #[test]
    fn test_fingerprint_consistency() {
        let config1 = AppConfig::default();
        let mut config2 = AppConfig::default();
        assert_eq!(config1.fingerprint(), config2.fingerprint());
        config2.mutation.copy_mut_prob = 0.02;
        assert_ne!(config1.fingerprint(), config2.fingerprint());
    }
}
