use super::{Cell, Resident, World};
use crate::model::config::AppConfig;
use crate::model::environment::{LogicEnvironment, INPUT_MASK, INPUT_TAGS};
use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use replicon_core::{Environment, InstSet, Metrics, Organism, Phenotype, Sequence};
use replicon_io::{CheckpointEntry, PopulationCheckpoint};
use std::collections::VecDeque;
use std::sync::Arc;

/// Stream id of the world-level generator; cells use their index.
const WORLD_STREAM: u64 = u64::MAX;

impl World {
    /// Empty world. The seed comes from `config.world.seed`; deterministic
    /// runs without a seed use 0, others draw one from entropy.
    pub fn new(config: AppConfig, inst_set: Arc<InstSet>) -> anyhow::Result<Self> {
        config.validate()?;
        anyhow::ensure!(
            config.cpu.inst_set == inst_set.set_name(),
            "Instruction set {:?} does not match configured {:?}",
            inst_set.set_name(),
            config.cpu.inst_set
        );

        let seed = match config.world.seed {
            Some(seed) => seed,
            None if config.world.deterministic => 0,
            None => rand::thread_rng().gen(),
        };
        let num_cells = usize::from(config.world.width) * usize::from(config.world.height);
        let cells = (0..num_cells)
            .map(|idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(idx as u64);
                Cell {
                    resident: None,
                    rng,
                }
            })
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(WORLD_STREAM);

        tracing::info!(
            seed,
            cells = num_cells,
            inst_set = inst_set.set_name(),
            fingerprint = %config.fingerprint(),
            "World created"
        );

        Ok(Self {
            width: config.world.width,
            height: config.world.height,
            update: 0,
            cells,
            resources: vec![0.0],
            metrics: Metrics::new(),
            inst_set,
            env: Arc::new(LogicEnvironment::new()),
            rng,
            next_id: 0,
            config,
        })
    }

    /// Places a fresh organism with `genome` in `cell`, replacing any
    /// occupant. Returns the new organism's id.
    pub fn inject(&mut self, genome: Sequence, cell: usize) -> anyhow::Result<u64> {
        anyhow::ensure!(cell < self.cells.len(), "Cell {} out of range", cell);
        anyhow::ensure!(!genome.is_empty(), "Cannot inject an empty genome");
        let id = self.take_id();
        let organism = Organism::new(
            id,
            genome,
            Arc::clone(&self.inst_set),
            &self.config,
            self.env.num_tasks(),
            self.env.num_reactions(),
        );
        self.place(organism, cell);
        tracing::debug!(id, cell, "Organism injected");
        Ok(id)
    }

    /// Injects `genome` into the center cell.
    pub fn inject_center(&mut self, genome: Sequence) -> anyhow::Result<u64> {
        let center = usize::from(self.height / 2) * usize::from(self.width)
            + usize::from(self.width / 2);
        self.inject(genome, center)
    }

    /// Rebuilds a world from a checkpoint. Phenotypes restart except for
    /// generation and merit.
    pub fn from_checkpoint(
        checkpoint: &PopulationCheckpoint,
        config: AppConfig,
        inst_set: Arc<InstSet>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            checkpoint.inst_set == inst_set.set_name(),
            "Checkpoint uses instruction set {:?}, expected {:?}",
            checkpoint.inst_set,
            inst_set.set_name()
        );
        if checkpoint.fingerprint != config.fingerprint() {
            tracing::warn!(
                checkpoint = %checkpoint.fingerprint,
                current = %config.fingerprint(),
                "Checkpoint was written with different parameters"
            );
        }

        let mut world = Self::new(config, inst_set)?;
        world.update = checkpoint.update;
        for entry in &checkpoint.organisms {
            let cell = entry.cell;
            world
                .inject(entry.genome.clone(), cell)
                .with_context(|| format!("restoring organism {}", entry.id))?;
            if let Some(resident) = world.cells[cell].resident.as_mut() {
                let phenotype = &mut resident.organism.state.phenotype;
                phenotype.generation = entry.generation;
                phenotype.merit = entry.merit;
            }
        }
        tracing::info!(
            update = checkpoint.update,
            organisms = checkpoint.len(),
            "World restored"
        );
        Ok(world)
    }

    #[must_use]
    pub fn to_checkpoint(&self) -> PopulationCheckpoint {
        let organisms = self
            .cells
            .iter()
            .enumerate()
            .filter_map(|(cell, c)| {
                c.resident.as_ref().map(|r| CheckpointEntry {
                    cell,
                    id: r.organism.id(),
                    genome: r.organism.genome().clone(),
                    generation: r.organism.phenotype().generation,
                    merit: r.organism.phenotype().merit,
                })
            })
            .collect();
        PopulationCheckpoint {
            update: self.update,
            inst_set: self.inst_set.set_name().to_string(),
            fingerprint: self.config.fingerprint(),
            organisms,
        }
    }

    pub(crate) fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Offspring of `parent` carrying `genome`.
    pub(crate) fn spawn_offspring(&mut self, genome: Sequence, parent: &Phenotype) -> Organism {
        let id = self.take_id();
        Organism::offspring(id, genome, parent, Arc::clone(&self.inst_set), &self.config)
    }

    /// Puts `organism` in `cell` with fresh inputs. Returns the organism it
    /// replaced, if any.
    pub(crate) fn place(&mut self, organism: Organism, cell: usize) -> Option<Resident> {
        let inputs = INPUT_TAGS.map(|tag| tag | (self.rng.gen::<i32>() & INPUT_MASK));
        let resident = Resident {
            organism,
            facing: self.rng.gen_range(0..super::NUM_DIRECTIONS),
            inbox: VecDeque::new(),
            group: None,
            inputs,
            next_input: 0,
        };
        self.cells[cell].resident.replace(resident)
    }

    pub(crate) fn world_rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}
