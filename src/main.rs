use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gridga::config::{AppConfig, ConfigManager, CONFIG_FILE_NAME};
use gridga::engines::dispatch::{BatchDispatcher, ResultSender};
use gridga::engines::generation::{ConsoleProgressCallback, EvolutionEngine};
use gridga::types::{GenomeId, ResultEnvelope, ResultRecord};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cache of evaluated genomes kept in the run directory
const STATE_FILE_NAME: &str = "genetic-algo-cache.json";
const LOG_FILE_NAME: &str = "genetic-algo.log";

#[derive(Parser, Debug)]
#[command(name = "gridga")]
#[command(about = "Genetic parameter search with jobs evaluated on an HTCondor cluster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or resume the search configured in <DIR>/gridga.toml
    Run {
        dir: PathBuf,
        /// Log to stderr instead of <DIR>/genetic-algo.log
        #[arg(long, default_value_t = false)]
        log_stderr: bool,
    },
    /// Print an annotated example configuration
    ExampleConfig,
    /// Send a test result to a listening coordinator
    TestSend {
        /// host:port, optionally prefixed with tcp://
        address: String,
    },
    /// Remove generation directories, submit files, condor logs and the cache
    Clean { dir: PathBuf },
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn run(dir: &Path, log_stderr: bool) -> Result<()> {
    let log_file = dir.join(LOG_FILE_NAME);
    init_logging(if log_stderr { None } else { Some(&log_file) })?;

    let manager = ConfigManager::new();
    manager.load_from_file(dir.join(CONFIG_FILE_NAME))?;
    let config = manager.get();

    let descriptors = config.descriptors()?;
    let mut dispatcher = BatchDispatcher::from_config(&config.htcondor, dir)?;
    let mut engine = EvolutionEngine::new(config.genetic_algo.clone(), descriptors)?
        .with_state_file(dir.join(STATE_FILE_NAME));

    let restored = engine.restore_state();
    if restored.restored {
        println!("Resuming at generation {}", restored.generation);
    }
    if !log_stderr {
        println!("Logging to {}", log_file.display());
    }

    engine.run(&mut dispatcher, &mut ConsoleProgressCallback)?;
    Ok(())
}

fn test_send(address: &str) -> Result<()> {
    init_logging(None)?;
    let sender = ResultSender::new(address).with_retry(1, Duration::from_secs(1));
    let envelope = ResultEnvelope {
        results: ResultRecord::success(GenomeId(0), 0.0, "gridga-test-send"),
    };
    sender
        .send(&envelope)
        .with_context(|| format!("No acknowledgement from {}", sender.address()))?;
    println!("{} acknowledged the test message", sender.address());
    Ok(())
}

fn clean(dir: &Path) -> Result<()> {
    init_logging(None)?;
    let entries = std::fs::read_dir(dir).with_context(|| format!("Cannot read {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();

        if path.is_dir() && name.starts_with("generation-") {
            std::fs::remove_dir_all(&path)?;
        } else if (name.starts_with("generation-") && name.ends_with(".submit"))
            || name.starts_with("genetic-algo.condor.")
            || name == STATE_FILE_NAME
        {
            std::fs::remove_file(&path)?;
        } else {
            continue;
        }
        println!("Removed {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { dir, log_stderr } => run(&dir, log_stderr),
        Commands::ExampleConfig => {
            print!("{}", AppConfig::example_toml());
            Ok(())
        }
        Commands::TestSend { address } => test_send(&address),
        Commands::Clean { dir } => clean(&dir),
    }
}
