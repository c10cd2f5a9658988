//! Headless run driver: configuration loading, world setup, the update loop
//! and periodic checkpoints.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::model::config::AppConfig;
use crate::model::inst_set::InstSet;
use crate::model::world::update::UpdateSummary;
use crate::model::world::{World, WorldStats};
use replicon_core::ancestor::{default_ancestor, MIN_ANCESTOR_LEN};

/// Per-interval population summaries, one JSON object per line.
pub const STATS_FILE: &str = "stats.jsonl";

/// Summary written once a run ends.
pub const FINAL_STATS_FILE: &str = "final_stats.json";

/// Length of the built-in ancestor when no genome file is given.
pub const DEFAULT_ANCESTOR_LEN: usize = 100;

/// Where the initial population comes from.
#[derive(Debug, Clone)]
pub enum Seeding {
    /// The built-in self-replicator of the given length.
    BuiltIn(usize),
    /// A genome file, one instruction name per line.
    GenomeFile(PathBuf),
    /// A gzip population checkpoint.
    Resume(PathBuf),
}

impl Default for Seeding {
    fn default() -> Self {
        Seeding::BuiltIn(DEFAULT_ANCESTOR_LEN)
    }
}

pub struct App {
    pub running: bool,
    pub world: World,
    pub config: AppConfig,
    /// Directory for checkpoints; none disables them.
    pub checkpoint_dir: Option<PathBuf>,
}

impl App {
    /// Reads `path` if it exists, otherwise writes the defaults there so the
    /// next run has a template.
    pub fn load_config(path: &Path) -> Result<AppConfig> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            return AppConfig::from_toml(&content)
                .with_context(|| format!("parsing {}", path.display()));
        }
        let default = AppConfig::default();
        match toml::to_string(&default) {
            Ok(toml_str) => {
                if let Err(e) = std::fs::write(path, toml_str) {
                    tracing::warn!(path = %path.display(), error = %e, "Could not write default config");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not serialize default config"),
        }
        Ok(default)
    }

    pub fn new(config: AppConfig, seeding: &Seeding, checkpoint_dir: Option<PathBuf>) -> Result<Self> {
        let inst_set = InstSet::by_set_name(&config.cpu.inst_set)
            .map(Arc::new)
            .with_context(|| format!("unknown instruction set {:?}", config.cpu.inst_set))?;

        let world = match seeding {
            Seeding::Resume(path) => {
                let checkpoint = replicon_io::load_checkpoint(path)
                    .with_context(|| format!("loading checkpoint {}", path.display()))?;
                World::from_checkpoint(&checkpoint, config.clone(), inst_set)?
            }
            Seeding::GenomeFile(path) => {
                let genome = replicon_io::read_genome_file(path, &inst_set)
                    .with_context(|| format!("loading ancestor {}", path.display()))?;
                let mut world = World::new(config.clone(), inst_set)?;
                world.inject_center(genome)?;
                world
            }
            &Seeding::BuiltIn(len) => {
                anyhow::ensure!(
                    len >= MIN_ANCESTOR_LEN,
                    "Ancestor length must be at least {}",
                    MIN_ANCESTOR_LEN
                );
                let genome = default_ancestor(&inst_set, len);
                let mut world = World::new(config.clone(), inst_set)?;
                world.inject_center(genome)?;
                world
            }
        };

        if let Some(dir) = &checkpoint_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }

        Ok(Self {
            running: true,
            world,
            config,
            checkpoint_dir,
        })
    }

    /// One update, followed by a checkpoint and a stats line when their
    /// intervals are reached.
    pub fn step(&mut self) -> Result<UpdateSummary> {
        let summary = self.world.update();
        let update = self.world.update;
        let interval = self.config.world.checkpoint_interval;
        if interval > 0 && update % interval == 0 {
            self.save_checkpoint()?;
        }
        let log_interval = self.config.world.log_interval;
        if log_interval > 0 && update % log_interval == 0 {
            self.append_stats()?;
        }
        if self.world.is_extinct() {
            tracing::warn!(update = self.world.update, "Population went extinct");
            self.running = false;
        }
        if self.config.world.max_updates > 0 && self.world.update >= self.config.world.max_updates {
            self.running = false;
        }
        Ok(summary)
    }

    /// Runs until `max_updates` or extinction and writes a final checkpoint.
    pub fn run(&mut self) -> Result<WorldStats> {
        while self.running {
            self.step()?;
        }
        let stats = self.world.stats();
        if let Some(dir) = &self.checkpoint_dir {
            self.save_checkpoint()?;
            replicon_io::write_json_file(&stats, dir.join(FINAL_STATS_FILE))?;
        }

        tracing::info!(
            update = stats.update,
            population = stats.population,
            avg_merit = stats.avg_merit,
            avg_gestation = stats.avg_gestation,
            max_generation = stats.max_generation,
            births = self.world.metrics.births(),
            elapsed_ms = self.world.metrics.elapsed().as_millis() as u64,
            "Run finished"
        );
        Ok(stats)
    }

    /// Writes `update-<n>.json.gz` to the checkpoint directory. Returns the
    /// path, or `None` when checkpoints are disabled.
    pub fn save_checkpoint(&self) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.checkpoint_dir else {
            return Ok(None);
        };
        let path = dir.join(format!("update-{}.json.gz", self.world.update));
        replicon_io::save_checkpoint(&self.world.to_checkpoint(), &path)
            .with_context(|| format!("writing checkpoint {}", path.display()))?;
        self.world
            .metrics
            .log_event("Checkpoint", &path.display().to_string());
        Ok(Some(path))
    }

    fn append_stats(&self) -> Result<()> {
        let Some(dir) = &self.checkpoint_dir else {
            return Ok(());
        };
        let path = dir.join(STATS_FILE);
        let line = replicon_io::to_json(&self.world.stats())?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
