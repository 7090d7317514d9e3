use std::path::PathBuf;

use clap::Parser;
use paramsweep::{SweepFile, init_logging, run_sweep};

#[derive(Parser, Debug)]
#[command(name = "paramsweep")]
#[command(about = "Sweep a model over a grid or random sample of its inputs")]
struct Args {
    /// Path to the YAML sweep description
    config: PathBuf,

    /// Number of workers (overrides the file)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Seed for random sampling (overrides the file)
    #[arg(long)]
    seed: Option<u64>,

    /// Results table path (overrides the file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write logs to `<dir>/paramsweep.log` instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    init_logging(args.log_dir.as_deref(), &args.log_level)?;

    let mut file = SweepFile::load(&args.config)?;
    file.apply_overrides(args.workers, args.seed, args.output);

    let summary = run_sweep(&file)?;

    println!(
        "{} cases on {} worker(s): {} failed, {} interpolated",
        summary.cases, summary.workers, summary.failed, summary.interpolated
    );
    if let Some(path) = &summary.results_file {
        println!("results written to {}", path.display());
    }

    Ok(())
}
