pub mod macros;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use replicon_core::{default_ancestor, ExecContext, NullInterface, Organism, StepOutcome};
use replicon_lib::model::config::{AppConfig, MutationConfig};
use replicon_lib::model::genome::Sequence;
use replicon_lib::model::inst_set::InstSet;
use replicon_lib::model::world::World;
use std::sync::Arc;

pub const ANCESTOR_LEN: usize = 50;

#[allow(dead_code)]
pub fn heads_set() -> Arc<InstSet> {
    Arc::new(InstSet::heads_default())
}

#[allow(dead_code)]
pub fn ancestor() -> Sequence {
    default_ancestor(&InstSet::heads_default(), ANCESTOR_LEN)
}

/// Defaults with every mutation rate at zero.
#[allow(dead_code)]
pub fn quiet_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.mutation = MutationConfig::zero();
    config.world.log_interval = 0;
    config
}

/// Steps a lone organism until it divides or `max_steps` pass. Returns the
/// number of steps taken and the offspring handed to the host.
#[allow(dead_code)]
pub fn run_alone(
    organism: &mut Organism,
    config: &AppConfig,
    seed: u64,
    max_steps: usize,
) -> (usize, Vec<Sequence>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut iface = NullInterface::default();
    let mut steps = 0;
    {
        let mut ctx = ExecContext::new(config, &mut rng, &mut iface);
        while steps < max_steps {
            steps += 1;
            if organism.process(&mut ctx) == StepOutcome::Divided {
                break;
            }
        }
    }
    (steps, iface.offspring)
}

#[allow(dead_code)]
pub struct WorldBuilder {
    config: AppConfig,
    genomes: Vec<(usize, Sequence)>,
    center: Option<Sequence>,
}

#[allow(dead_code)]
impl WorldBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.world.width = 8;
        config.world.height = 8;
        config.world.seed = Some(42);
        config.world.log_interval = 0;
        Self {
            config,
            genomes: Vec::new(),
            center: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.world.seed = Some(seed);
        self
    }

    pub fn with_size(mut self, width: u16, height: u16) -> Self {
        self.config.world.width = width;
        self.config.world.height = height;
        self
    }

    pub fn with_config<F>(mut self, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        modifier(&mut self.config);
        self
    }

    pub fn with_genome(mut self, cell: usize, genome: Sequence) -> Self {
        self.genomes.push((cell, genome));
        self
    }

    pub fn with_ancestor(mut self) -> Self {
        self.center = Some(ancestor());
        self
    }

    pub fn build(self) -> World {
        let mut world =
            World::new(self.config, heads_set()).expect("Failed to create world in test builder");
        if let Some(genome) = self.center {
            world.inject_center(genome).expect("center injection");
        }
        for (cell, genome) in self.genomes {
            world.inject(genome, cell).expect("injection");
        }
        world
    }
}
