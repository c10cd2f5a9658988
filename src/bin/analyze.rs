use anyhow::Context;
use clap::Parser;
use replicon_core::{Environment, TestCpu, TestInfo, TraceSink, TracingSink};
use replicon_lib::app::App;
use replicon_lib::model::genome::Sequence;
use replicon_lib::model::inst_set::InstSet;
use replicon_lib::model::metrics::init_logging;
use replicon_lib::LogicEnvironment;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Genome file (one instruction name per line)
    #[arg(
        conflicts_with_all = ["symbols", "hex"],
        required_unless_present_any = ["symbols", "hex"]
    )]
    genome: Option<PathBuf>,

    /// Genome given as a string of instruction symbols
    #[arg(long, conflicts_with = "hex")]
    symbols: Option<String>,

    /// Genome in the hex form printed by a previous report
    #[arg(long)]
    hex: Option<String>,

    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Print the CPU state after every step
    #[arg(short, long)]
    trace: bool,

    /// Send CPU state lines to the log at TRACE level instead of stdout
    #[arg(long, conflicts_with = "trace")]
    trace_log: bool,

    /// Cycle budget for the test run
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Also write the report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

struct StdoutSink;

impl TraceSink for StdoutSink {
    fn status(&mut self, line: &str) {
        println!("{line}");
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let config = App::load_config(&args.config)?;
    let inst_set = InstSet::by_set_name(&config.cpu.inst_set)
        .map(Arc::new)
        .with_context(|| format!("unknown instruction set {:?}", config.cpu.inst_set))?;

    let genome = match (&args.genome, &args.symbols, &args.hex) {
        (Some(path), _, _) => replicon_io::read_genome_file(path, &inst_set)
            .with_context(|| format!("reading {}", path.display()))?,
        (None, Some(symbols), _) => Sequence::from_symbols(symbols)
            .with_context(|| format!("invalid symbol string {symbols:?}"))?,
        (None, None, Some(hex)) => replicon_io::from_hex(hex).context("invalid hex genome")?,
        (None, None, None) => anyhow::bail!("no genome given"),
    };

    let env = LogicEnvironment::new();
    let mut cpu = TestCpu::new(Arc::clone(&inst_set), &config, Some(&env));
    if let Some(max) = args.max_cycles {
        cpu = cpu.with_max_cycles(max);
    }

    let info = if args.trace {
        cpu.trace(&genome, &mut StdoutSink)
    } else if args.trace_log {
        cpu.trace(&genome, &mut TracingSink)
    } else {
        cpu.evaluate(&genome)
    };

    let report = render_report(&genome, &inst_set, &env, &info);
    print!("{report}");
    if let Some(path) = &args.output {
        std::fs::write(path, &report).with_context(|| format!("writing {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn render_report(
    genome: &Sequence,
    inst_set: &InstSet,
    env: &LogicEnvironment,
    info: &TestInfo,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Genome Analysis\n");
    let _ = writeln!(out, "- Instruction set: {}", inst_set.set_name());
    let _ = writeln!(out, "- Length: {}", genome.len());
    let _ = writeln!(out, "- Symbols: {}", genome.to_symbols());
    if let Ok(hex) = replicon_io::to_hex(genome) {
        let _ = writeln!(out, "- Hex: {hex}");
    }
    let _ = writeln!(out, "- Viable: {}", info.viable);
    let _ = writeln!(out, "- Self-replicating: {}", info.self_replicates);
    let _ = writeln!(out, "- Cycles run: {}", info.cycles);
    if info.viable {
        let _ = writeln!(out, "- Gestation time: {}", info.gestation_time);
        let _ = writeln!(out, "- Merit: {:.3}", info.merit);
        let _ = writeln!(out, "- Fitness: {:.5}", info.fitness);
        let _ = writeln!(out, "- Copied size: {}", info.copied_size);
        let _ = writeln!(out, "- Executed size: {}", info.executed_size);
    }
    if let Some(offspring) = &info.offspring {
        if offspring != genome {
            let _ = writeln!(out, "- Offspring: {}", offspring.to_symbols());
        }
    }

    let _ = writeln!(out, "\n## Tasks\n");
    let done: Vec<String> = info
        .task_counts
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(task, count)| format!("{} x{}", env.task_name(task), count))
        .collect();
    if done.is_empty() {
        let _ = writeln!(out, "none");
    } else {
        let _ = writeln!(out, "{}", done.join(", "));
    }
    out
}
