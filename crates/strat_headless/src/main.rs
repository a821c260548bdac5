//! Headless scenario runner.
//!
//! Plays scripted scenarios without a user interface. Reports go to stdout
//! as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Play one game
//! cargo run -p strat_headless -- run --scenario scenarios/channel.ron --seed 7
//!
//! # Run batch balance test
//! cargo run -p strat_headless -- batch --scenario scenarios/channel.ron --count 1000 --output results/
//!
//! # Check that a seed always plays the same game
//! cargo run -p strat_headless -- verify --scenario scenarios/channel.ron --seed 42 --runs 5
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use strat_core::replay::BattleReplay;
use strat_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{record_game, replay_game, run_game, GameReport},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "strat_headless")]
#[command(about = "Headless scenario runner for balance testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a scenario once
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Write the dice log to this replay file
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Run batch of games for balance testing
    Batch {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Number of games to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel games (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Verify determinism by playing one seed several times
    Verify {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Number of runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Replay a recorded game and check its final board
    Replay {
        /// Scenario the game was recorded on
        #[arg(short, long)]
        scenario: PathBuf,

        /// Replay file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Check that a scenario file loads and its orders name real things
    Validate {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is for reports. RUST_LOG overrides --verbose.
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            seed,
            record,
        } => cmd_run(&scenario, seed, record.as_deref()),
        Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
        } => cmd_batch(scenario, count, parallel, output, seed),
        Commands::Verify {
            scenario,
            seed,
            runs,
        } => cmd_verify(&scenario, seed, runs),
        Commands::Replay { scenario, file } => cmd_replay(&scenario, &file),
        Commands::Validate { scenario } => cmd_validate(&scenario),
    }
}

fn fatal(message: impl std::fmt::Display) -> ! {
    tracing::error!(%message, "Fatal");
    eprintln!("FATAL: {message}");
    std::process::exit(1);
}

fn load_scenario(path: &Path) -> Scenario {
    match Scenario::load(path) {
        Ok(scenario) => {
            tracing::info!(
                path = %path.display(),
                name = %scenario.name(),
                orders = scenario.orders.len(),
                "Loaded scenario"
            );
            scenario
        }
        Err(e) => fatal(e),
    }
}

fn print_report(report: &GameReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(e) => fatal(e),
    }
}

/// Play one game
fn cmd_run(path: &Path, seed: u64, record: Option<&Path>) {
    let scenario = load_scenario(path);
    let report = match record {
        Some(replay_path) => {
            let (report, replay) = record_game(&scenario, seed).unwrap_or_else(|e| fatal(e));
            if let Err(e) = replay.save(replay_path) {
                fatal(e);
            }
            eprintln!(
                "Recorded {} draws to {}",
                replay.log.len(),
                replay_path.display()
            );
            report
        }
        None => run_game(&scenario, seed).unwrap_or_else(|e| fatal(e)),
    };
    print_report(&report);
}

/// Run batch of games for balance testing
fn cmd_batch(path: PathBuf, count: u32, parallel: u32, output: PathBuf, seed: u64) {
    let scenario = load_scenario(&path);
    tracing::info!(
        scenario = %path.display(),
        count,
        parallel,
        seed,
        output = %output.display(),
        "Batch configuration"
    );

    let config = BatchConfig::new(path, count)
        .with_seed(seed)
        .with_threads(parallel);
    let results = run_batch(config, &scenario);

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        fatal(format!("Failed to save results: {e}"));
    }

    let summary = &results.summary;
    eprintln!(
        "{} games in {:.1}s, {} failed",
        results.games.len(),
        results.duration_seconds,
        results.errors.len()
    );
    eprintln!(
        "{} battles, attacker won {}%, {} distinct outcomes",
        summary.total_battles, summary.attacker_win_percent, summary.distinct_outcomes
    );
    for (territory, owners) in &summary.final_owners {
        let shares: Vec<String> = owners
            .iter()
            .map(|(owner, n)| format!("{owner} {n}"))
            .collect();
        eprintln!("  {territory}: {}", shares.join(", "));
    }
    for error in &results.errors {
        eprintln!("  seed {} failed: {}", error.seed, error.message);
    }
    eprintln!("Results saved to {}", results_path.display());
}

fn cmd_verify(path: &Path, seed: u64, runs: u32) {
    let scenario = load_scenario(path);
    tracing::info!(seed, runs, "Verifying determinism");
    if verify_determinism(&scenario, seed, runs) {
        eprintln!("PASS: All {runs} runs produced identical results");
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        std::process::exit(1);
    }
}

/// Replay a recorded game
fn cmd_replay(path: &Path, file: &Path) {
    let scenario = load_scenario(path);
    let replay = BattleReplay::load(file).unwrap_or_else(|e| fatal(e));

    eprintln!("Loaded replay:");
    eprintln!("  Scenario: {}", replay.scenario_id);
    eprintln!("  Seed: {}", replay.seed);
    eprintln!("  Draws: {}", replay.log.len());
    if replay.scenario_id != scenario.name() {
        tracing::warn!(
            recorded = %replay.scenario_id,
            loaded = %scenario.name(),
            "Replay was recorded on another scenario"
        );
    }

    match replay_game(&scenario, &replay) {
        Ok(report) => {
            eprintln!("PASS: Replay verification successful");
            eprintln!("  Final hash: {:016x}", report.final_hash);
            print_report(&report);
        }
        Err(e) => {
            eprintln!("FAIL: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_validate(path: &Path) {
    let scenario = load_scenario(path);
    let result = scenario.build().and_then(|(data, state)| {
        scenario.check_orders(&data)?;
        state.check_invariants()?;
        Ok(data)
    });
    match result {
        Ok(data) => eprintln!(
            "OK: {} territories, {} players, {} orders",
            data.map.len(),
            data.players.len(),
            scenario.orders.len()
        ),
        Err(e) => fatal(e),
    }
}
