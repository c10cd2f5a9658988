//! The population driver.
//!
//! A [`World`] is a torus of cells, each holding at most one organism. Every
//! update gives each organism a time slice proportional to its merit. During
//! the slice an organism only touches its own cell; everything that reaches
//! another cell (offspring, messages, movement, resource use) is queued and
//! applied afterwards in cell order, so parallel and sequential updates
//! produce the same population.

use crate::model::config::AppConfig;
use crate::model::environment::LogicEnvironment;
use rand_chacha::ChaCha8Rng;
use replicon_core::{Environment, InstSet, Message, Metrics, Organism, Sequence};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub mod cell;
pub mod init;
pub mod update;

pub use cell::{CellEffects, CellInterface, PendingBirth, Snapshot};

/// Messages waiting in a resident's inbox beyond this are dropped.
pub const INBOX_CAPACITY: usize = 8;

/// Directions an organism can face: N, NE, E, SE, S, SW, W, NW.
pub const NUM_DIRECTIONS: usize = 8;
const DIRECTIONS: [(i32, i32); NUM_DIRECTIONS] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// An organism together with the state that moves with it.
#[derive(Debug, Clone)]
pub struct Resident {
    pub organism: Organism,
    /// Index into the eight neighbor directions.
    pub facing: usize,
    pub inbox: VecDeque<Message>,
    pub group: Option<i32>,
    /// The three environment inputs this organism reads, in rotation.
    pub inputs: [i32; 3],
    pub next_input: usize,
}

/// One grid location. The random stream belongs to the location, not to
/// its occupant.
#[derive(Debug, Clone)]
pub struct Cell {
    pub resident: Option<Resident>,
    pub rng: ChaCha8Rng,
}

/// Population averages for one update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldStats {
    pub update: u64,
    pub population: usize,
    pub avg_merit: f64,
    pub avg_gestation: f64,
    pub avg_fitness: f64,
    pub avg_genome_len: f64,
    pub max_generation: u32,
    /// Organisms that performed each task during their last gestation.
    pub task_counts: Vec<usize>,
}

pub struct World {
    pub config: AppConfig,
    pub width: u16,
    pub height: u16,
    pub update: u64,
    pub cells: Vec<Cell>,
    pub resources: Vec<f64>,
    pub metrics: Metrics,
    inst_set: Arc<InstSet>,
    env: Arc<LogicEnvironment>,
    rng: ChaCha8Rng,
    next_id: u64,
}

impl World {
    #[must_use]
    pub fn inst_set(&self) -> &Arc<InstSet> {
        &self.inst_set
    }

    #[must_use]
    pub fn environment(&self) -> &LogicEnvironment {
        &self.env
    }

    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn population(&self) -> usize {
        self.cells.iter().filter(|c| c.resident.is_some()).count()
    }

    #[must_use]
    pub fn is_extinct(&self) -> bool {
        self.population() == 0
    }

    #[must_use]
    pub fn organism(&self, cell: usize) -> Option<&Organism> {
        self.cells
            .get(cell)?
            .resident
            .as_ref()
            .map(|r| &r.organism)
    }

    pub fn organisms(&self) -> impl Iterator<Item = &Organism> {
        self.cells
            .iter()
            .filter_map(|c| c.resident.as_ref().map(|r| &r.organism))
    }

    /// Cell reached by stepping from `cell` in `direction` on the torus.
    #[must_use]
    pub fn neighbor_cell(&self, cell: usize, direction: usize) -> usize {
        neighbor_index(self.width, self.height, cell, direction)
    }

    /// Most common genome and how many organisms carry it.
    #[must_use]
    pub fn dominant_genome(&self) -> Option<(Sequence, usize)> {
        let mut counts: HashMap<String, (usize, &Sequence)> = HashMap::new();
        for organism in self.organisms() {
            let entry = counts
                .entry(organism.genome().to_symbols())
                .or_insert((0, organism.genome()));
            entry.0 += 1;
        }
        counts
            .into_values()
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.to_symbols().cmp(&a.1.to_symbols())))
            .map(|(count, genome)| (genome.clone(), count))
    }

    #[must_use]
    pub fn stats(&self) -> WorldStats {
        let num_tasks = self.env.num_tasks();
        let mut stats = WorldStats {
            update: self.update,
            task_counts: vec![0; num_tasks],
            ..WorldStats::default()
        };
        for organism in self.organisms() {
            let phenotype = organism.phenotype();
            stats.population += 1;
            stats.avg_merit += phenotype.merit;
            stats.avg_gestation += phenotype.gestation_time as f64;
            stats.avg_fitness += phenotype.fitness;
            stats.avg_genome_len += organism.genome().len() as f64;
            stats.max_generation = stats.max_generation.max(phenotype.generation);
            for (task, &count) in phenotype.last_task_count.iter().enumerate() {
                if count > 0 && task < num_tasks {
                    stats.task_counts[task] += 1;
                }
            }
        }
        if stats.population > 0 {
            let n = stats.population as f64;
            stats.avg_merit /= n;
            stats.avg_gestation /= n;
            stats.avg_fitness /= n;
            stats.avg_genome_len /= n;
        }
        stats
    }
}

pub(crate) fn neighbor_index(width: u16, height: u16, cell: usize, direction: usize) -> usize {
    let (w, h) = (i32::from(width), i32::from(height));
    let (x, y) = ((cell % width as usize) as i32, (cell / width as usize) as i32);
    let (dx, dy) = DIRECTIONS[direction % NUM_DIRECTIONS];
    let nx = (x + dx).rem_euclid(w);
    let ny = (y + dy).rem_euclid(h);
    (ny * w + nx) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_wraps() {
        assert_eq!(neighbor_index(5, 4, 0, 0), 15);
        assert_eq!(neighbor_index(5, 4, 0, 6), 4);
        assert_eq!(neighbor_index(5, 4, 19, 3), 0);
        assert_eq!(neighbor_index(5, 4, 7, 2), 8);
    }
}
