use anyhow::Result;
use clap::Parser;
use replicon_lib::app::{App, Seeding, DEFAULT_ANCESTOR_LEN};
use replicon_lib::model::metrics::init_logging;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Ancestor genome file (one instruction per line)
    #[arg(short, long, conflicts_with = "resume")]
    ancestor: Option<PathBuf>,

    /// Length of the built-in ancestor
    #[arg(long, default_value_t = DEFAULT_ANCESTOR_LEN)]
    ancestor_len: usize,

    /// Resume from a population checkpoint
    #[arg(short, long)]
    resume: Option<PathBuf>,

    /// Directory for periodic checkpoints
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Override world.max_updates
    #[arg(short, long)]
    updates: Option<u64>,

    /// Override world.seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Advance organisms on all cores
    #[arg(long)]
    parallel: bool,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut config = App::load_config(&args.config)?;
    if let Some(updates) = args.updates {
        config.world.max_updates = updates;
    }
    if let Some(seed) = args.seed {
        config.world.seed = Some(seed);
    }
    if args.parallel {
        config.world.parallel = true;
    }
    config.validate()?;

    let seeding = match (args.resume, args.ancestor) {
        (Some(path), _) => Seeding::Resume(path),
        (None, Some(path)) => Seeding::GenomeFile(path),
        (None, None) => Seeding::BuiltIn(args.ancestor_len),
    };

    let mut app = App::new(config, &seeding, args.checkpoint_dir)?;
    let stats = app.run()?;

    println!(
        "update {}  population {}  avg merit {:.2}  avg gestation {:.1}  max generation {}",
        stats.update, stats.population, stats.avg_merit, stats.avg_gestation, stats.max_generation
    );
    if let Some((genome, count)) = app.world.dominant_genome() {
        println!("dominant ({} organisms, length {}): {}", count, genome.len(), genome.to_symbols());
    }
    Ok(())
}
