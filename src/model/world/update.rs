use super::cell::deliver;
use super::{Cell, CellEffects, CellInterface, Snapshot, World};
use crate::model::config::{AppConfig, BirthPolicy};
use crate::model::environment::LogicEnvironment;
use rand::Rng;
use rayon::prelude::*;
use replicon_core::{draw_normal, ExecContext, InterruptKind};
use std::time::Instant;

/// What happened during one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub births: usize,
    pub deaths: usize,
    pub divide_faults: u64,
    pub instructions: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct SliceReport {
    cycles: u64,
    faults: u64,
}

impl World {
    /// Advances the population by one update.
    ///
    /// Every organism runs a merit-weighted slice against a snapshot of the
    /// world taken beforehand; queued effects are then applied in cell
    /// order: resources, movement, messages, births.
    pub fn update(&mut self) -> UpdateSummary {
        let start = Instant::now();
        self.update += 1;
        self.replenish_resources();

        let slices = self.time_slices();
        let snapshot = self.snapshot();
        let mut effects = vec![CellEffects::default(); self.cells.len()];

        let config = &self.config;
        let env: &LogicEnvironment = &self.env;
        let reports: Vec<SliceReport> = if config.world.parallel {
            self.cells
                .par_iter_mut()
                .zip(effects.par_iter_mut())
                .enumerate()
                .map(|(idx, (cell, fx))| {
                    run_cell(idx, cell, fx, slices[idx], config, env, &snapshot, None)
                })
                .collect()
        } else {
            let mut free = match config.world.birth_policy {
                BirthPolicy::EmptyOnly => Some(snapshot.ids.iter().filter(|id| id.is_none()).count()),
                BirthPolicy::ReplaceRandom => None,
            };
            self.cells
                .iter_mut()
                .zip(effects.iter_mut())
                .enumerate()
                .map(|(idx, (cell, fx))| {
                    run_cell(idx, cell, fx, slices[idx], config, env, &snapshot, free.as_mut())
                })
                .collect()
        };

        let mut summary = UpdateSummary {
            instructions: reports.iter().map(|r| r.cycles).sum(),
            divide_faults: reports.iter().map(|r| r.faults).sum(),
            ..UpdateSummary::default()
        };
        self.metrics.record_instructions(summary.instructions);
        for _ in 0..summary.divide_faults {
            self.metrics.record_divide_fault();
        }

        self.apply_effects(effects, &mut summary);

        self.metrics.record_update(
            start.elapsed(),
            self.population(),
            self.config.world.log_interval,
        );
        summary
    }

    fn replenish_resources(&mut self) {
        let (inflow, cap) = (
            self.config.world.resource_inflow,
            self.config.world.max_resource,
        );
        for level in &mut self.resources {
            *level = (*level + inflow).min(cap);
        }
    }

    /// Cycles per cell: `ave_time_slice` scaled by merit relative to the
    /// population mean, at least one for every living organism.
    fn time_slices(&self) -> Vec<u32> {
        let ave = self.config.world.ave_time_slice;
        let (total, count) = self
            .organisms()
            .fold((0.0, 0usize), |(t, c), o| (t + o.phenotype().merit, c + 1));
        let mean = if count > 0 { total / count as f64 } else { 0.0 };

        self.cells
            .iter()
            .map(|cell| match &cell.resident {
                None => 0,
                Some(_) if mean <= 0.0 => ave,
                Some(r) => {
                    let share = f64::from(ave) * r.organism.phenotype().merit / mean;
                    (share.round() as u32).max(1)
                }
            })
            .collect()
    }

    fn snapshot(&self) -> Snapshot {
        let with_genomes = self.config.mutation.hgt_prob > 0.0;
        Snapshot {
            width: self.width,
            height: self.height,
            ids: self
                .cells
                .iter()
                .map(|c| c.resident.as_ref().map(|r| r.organism.id()))
                .collect(),
            genomes: if with_genomes {
                self.cells
                    .iter()
                    .map(|c| c.resident.as_ref().map(|r| r.organism.genome().clone()))
                    .collect()
            } else {
                Vec::new()
            },
            resources: self.resources.clone(),
        }
    }

    fn apply_effects(&mut self, effects: Vec<CellEffects>, summary: &mut UpdateSummary) {
        for fx in &effects {
            for (level, delta) in self.resources.iter_mut().zip(&fx.resource_deltas) {
                *level = (*level + delta).max(0.0);
            }
        }

        for (idx, fx) in effects.iter().enumerate() {
            let Some(target) = fx.move_to else { continue };
            if self.cells[target].resident.is_some() {
                continue;
            }
            if let Some(mut resident) = self.cells[idx].resident.take() {
                resident
                    .organism
                    .interrupt(InterruptKind::Movement, &self.config);
                tracing::trace!(id = resident.organism.id(), from = idx, to = target, "Move");
                self.cells[target].resident = Some(resident);
            }
        }

        for fx in &effects {
            for &(target, message) in &fx.outbox {
                if let Some(resident) = self.cells[target].resident.as_mut() {
                    let kind = InterruptKind::Message(message);
                    if !resident.organism.interrupt(kind, &self.config) {
                        deliver(&mut resident.inbox, message);
                    }
                }
            }
        }

        for fx in effects {
            for birth in fx.births {
                let Some(target) = self.birth_target(birth.parent_cell) else {
                    tracing::warn!(parent = birth.parent_id, "No cell free for offspring");
                    continue;
                };
                let child = self.spawn_offspring(birth.genome, &birth.parent);
                let child_id = child.id();
                if self.place(child, target).is_some() {
                    summary.deaths += 1;
                    self.metrics.record_death();
                }
                summary.births += 1;
                self.metrics.record_birth();
                tracing::trace!(parent = birth.parent_id, child = child_id, cell = target, "Birth");
            }
        }
    }

    fn birth_target(&mut self, parent_cell: usize) -> Option<usize> {
        let n = self.cells.len();
        match self.config.world.birth_policy {
            BirthPolicy::ReplaceRandom if n == 1 => Some(0),
            BirthPolicy::ReplaceRandom => {
                let pick = self.world_rng().gen_range(0..n - 1);
                Some(if pick >= parent_cell { pick + 1 } else { pick })
            }
            BirthPolicy::EmptyOnly => {
                let empty: Vec<usize> = (0..n)
                    .filter(|&i| self.cells[i].resident.is_none())
                    .collect();
                if empty.is_empty() {
                    return None;
                }
                let pick = self.world_rng().gen_range(0..empty.len());
                Some(empty[pick])
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_cell(
    idx: usize,
    cell: &mut Cell,
    effects: &mut CellEffects,
    slice: u32,
    config: &AppConfig,
    env: &LogicEnvironment,
    snapshot: &Snapshot,
    empty_slots: Option<&mut usize>,
) -> SliceReport {
    let Some(resident) = cell.resident.as_mut() else {
        return SliceReport::default();
    };
    effects.resource_deltas = vec![0.0; snapshot.resources.len()];
    let slice = jittered_slice(slice, config.world.slice_jitter, &mut cell.rng);
    let cycles_before = resident.organism.phenotype().cpu_cycles;
    let faults_before = resident.organism.phenotype().num_faults;

    let (organism, mut interface) =
        CellInterface::for_resident(idx, resident, env, snapshot, effects, empty_slots);
    let mut ctx = ExecContext::new(config, &mut cell.rng, &mut interface);
    organism.run_slice(slice, &mut ctx);

    let phenotype = organism.phenotype();
    SliceReport {
        cycles: phenotype.cpu_cycles - cycles_before,
        faults: u64::from(phenotype.num_faults.saturating_sub(faults_before)),
    }
}

/// Gaussian jitter around `slice`; living organisms still get one cycle.
fn jittered_slice<R: Rng + ?Sized>(slice: u32, jitter: f64, rng: &mut R) -> u32 {
    if jitter <= 0.0 || slice == 0 {
        return slice;
    }
    let mean = f64::from(slice);
    let drawn = draw_normal(rng, mean, jitter * mean).round();
    drawn.clamp(1.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use replicon_core::{default_ancestor, InstSet};
    use std::sync::Arc;

    fn config(parallel: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.world.width = 6;
        config.world.height = 6;
        config.world.seed = Some(11);
        config.world.parallel = parallel;
        config.world.log_interval = 0;
        config
    }

    fn seeded(config: AppConfig) -> World {
        let set = Arc::new(InstSet::heads_default());
        let mut world = World::new(config, Arc::clone(&set)).unwrap();
        world.inject_center(default_ancestor(&set, 50)).unwrap();
        world
    }

    #[test]
    fn test_ancestor_reproduces() {
        let mut world = seeded(config(false));
        let births: usize = (0..40).map(|_| world.update().births).sum();
        assert!(births > 0);
        assert!(world.population() > 1);
        assert_eq!(world.metrics.births(), births as u64);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut seq = seeded(config(false));
        let mut par = seeded(config(true));
        for _ in 0..30 {
            assert_eq!(seq.update(), par.update());
        }
        assert_eq!(seq.to_checkpoint(), par.to_checkpoint());
    }

    #[test]
    fn test_empty_only_never_replaces() {
        let mut cfg = config(false);
        cfg.world.birth_policy = BirthPolicy::EmptyOnly;
        let mut world = seeded(cfg);
        let mut deaths = 0;
        for _ in 0..200 {
            deaths += world.update().deaths;
        }
        assert_eq!(deaths, 0);
        assert!(world.population() <= world.num_cells());
    }

    #[test]
    fn test_resources_capped() {
        let mut cfg = config(false);
        cfg.world.resource_inflow = 5.0;
        cfg.world.max_resource = 12.0;
        let set = Arc::new(InstSet::heads_default());
        let mut world = World::new(cfg, set).unwrap();
        for _ in 0..4 {
            world.update();
        }
        assert_eq!(world.resources, vec![12.0]);
    }

    #[test]
    fn test_slice_jitter_stays_positive_around_mean() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(4);
        assert_eq!(jittered_slice(30, 0.0, &mut rng), 30);
        assert_eq!(jittered_slice(0, 0.5, &mut rng), 0);

        let draws: Vec<u32> = (0..2_000).map(|_| jittered_slice(30, 0.5, &mut rng)).collect();
        assert!(draws.iter().all(|&d| d >= 1));
        let mean = draws.iter().map(|&d| f64::from(d)).sum::<f64>() / draws.len() as f64;
        assert!((mean - 30.0).abs() < 1.5, "mean = {mean}");
    }

    #[test]
    fn test_jittered_world_replays() {
        let mut cfg = config(false);
        cfg.world.slice_jitter = 0.3;
        let mut a = seeded(cfg.clone());
        let mut b = seeded(cfg);
        for _ in 0..20 {
            assert_eq!(a.update(), b.update());
        }
    }

    #[test]
    fn test_empty_world_idles() {
        let set = Arc::new(InstSet::heads_default());
        let mut world = World::new(config(false), set).unwrap();
        assert_eq!(world.update(), UpdateSummary::default());
        assert_eq!(world.update, 1);
    }
}
