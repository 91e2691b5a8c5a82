use anyhow::{Context, Result};
use clap::Parser;
use gridga::engines::dispatch::worker;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gridga-job-wrapper")]
#[command(about = "Evaluate one genome on an execute node and report its objective")]
struct Args {
    /// Job description written by the coordinator
    job: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let job = worker::load_job(&args.job)?;
    let work_dir = std::env::current_dir().context("Cannot determine working directory")?;

    let record = worker::run_job(&job, &work_dir, &worker::compute_host());
    let failed = record.error.is_some();
    worker::report(&job, record).context("Result was not delivered")?;

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
