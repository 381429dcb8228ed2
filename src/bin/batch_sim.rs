//! Batch simulator: large-scale matchup processing with checkpoint/resume.
//!
//! For interactive single runs with fewer matchups, use `battle_sim`.

use clap::Parser;
use grimdark_sim::analyzer::{self, ResultAnalyzer};
use grimdark_sim::model::RuleRegistry;
use grimdark_sim::parser::UnitParser;
use grimdark_sim::progress::ProgressInfo;
use grimdark_sim::{BatchConfig, BatchSimulator, ResultFormat, RunStatus};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "batch_sim")]
#[command(about = "Large-scale matchup batch processing with checkpoint/resume")]
struct Cli {
    /// Unit catalog text file
    units_file: PathBuf,
    /// Output results file
    #[arg(short = 'o', default_value = "results.bin")]
    output: String,
    /// Checkpoint file
    #[arg(short = 'c', default_value = "checkpoint.bin")]
    checkpoint: String,
    /// Batch size in matchups
    #[arg(short = 'b', default_value_t = 10_000)]
    batch_size: u64,
    /// Checkpoint interval in completed matchups
    #[arg(short = 'i', default_value_t = 1_000_000)]
    interval: u64,
    /// Extended format - full game statistics (24 bytes/result)
    #[arg(short = 'e', conflicts_with_all = ["compact_extended", "aggregated"])]
    extended: bool,
    /// Compact extended - compressed game stats (16 bytes/result)
    #[arg(short = 'E', conflicts_with = "aggregated")]
    compact_extended: bool,
    /// Aggregated format - per-unit summary stats (256 bytes/unit)
    #[arg(short = 'A')]
    aggregated: bool,
    /// Resume from checkpoint if available
    #[arg(short = 'r')]
    resume: bool,
    /// Quiet mode (no progress output)
    #[arg(short = 'q')]
    quiet: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let mut config = BatchConfig {
        output_file: cli.output.clone(),
        checkpoint_file: cli.checkpoint.clone(),
        batch_size: cli.batch_size,
        checkpoint_interval: cli.interval,
        format: if cli.extended {
            ResultFormat::Extended
        } else if cli.compact_extended {
            ResultFormat::CompactExtended
        } else if cli.aggregated {
            ResultFormat::Aggregated
        } else {
            ResultFormat::Compact
        },
        enable_progress: !cli.quiet,
        ..BatchConfig::default()
    };
    if let Err(err) = config.apply_env() {
        eprintln!("Error: {}", err);
        return err.exit_code();
    }

    let registry = Arc::new(RuleRegistry::initialize_faction_rules());

    println!("=== Batch Simulator ===\n");
    println!("Loading units from: {}", cli.units_file.display());
    let start_load = Instant::now();
    let outcome = match UnitParser::parse_file(&cli.units_file, &registry) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("Error: {}", err);
            return err.exit_code();
        }
    };
    if outcome.catalog.units.is_empty() {
        eprintln!(
            "Error: no units loaded from {}",
            cli.units_file.display()
        );
        return 1;
    }
    println!(
        "Loaded {} units in {:.2}s",
        outcome.catalog.units.len(),
        start_load.elapsed().as_secs_f64()
    );
    if !outcome.errors.is_empty() {
        println!("Warnings: {} parse errors", outcome.errors.len());
    }

    let units = outcome.catalog.units.len() as u64;
    let total_matchups = units * units;
    let estimated_bytes = if config.format == ResultFormat::Aggregated {
        units * config.format.record_size() + 20
    } else {
        total_matchups * config.format.record_size()
    };

    println!("\n--- Simulation Configuration ---");
    println!("Simulation Mode: Full Game (movement, AI, objectives, 4 rounds max)");
    println!("Result Format: {}", config.format.name());
    println!("Units: {}", units);
    print!("Total matchups: {}", total_matchups);
    if total_matchups >= 1_000_000_000 {
        print!(" ({:.1} billion)", total_matchups as f64 / 1e9);
    } else if total_matchups >= 1_000_000 {
        print!(" ({:.1} million)", total_matchups as f64 / 1e6);
    }
    println!();
    println!("Estimated output size: {}", format_bytes(estimated_bytes as f64));
    println!("Output file: {}", config.output_file);
    println!("Batch size: {}", config.batch_size);
    println!("Checkpoint interval: {}", config.checkpoint_interval);

    let sim = match BatchSimulator::new(config) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("Error: {}", err);
            return err.exit_code();
        }
    };
    println!("Threads: {}", sim.thread_count());

    if cli.resume {
        match sim.check_checkpoint(units, units) {
            Some(checkpoint) => {
                let percent = 100.0 * checkpoint.completed as f64 / total_matchups as f64;
                println!("\n*** RESUMING from checkpoint ***");
                println!(
                    "  Previously completed: {}/{} ({:.1}%)",
                    checkpoint.completed, total_matchups, percent
                );
                println!(
                    "  Remaining: {} matchups",
                    total_matchups - checkpoint.completed
                );
            }
            None => println!("\nNo valid checkpoint found - starting fresh"),
        }
    }

    // SIGINT raises the cooperative stop flag; in-flight batches finish and
    // a checkpoint is written before the driver returns.
    let stop = sim.stop_flag();
    if let Err(err) = signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop)) {
        eprintln!("Error: cannot install SIGINT handler: {}", err);
        return 1;
    }

    let mut progress_cb = |info: &ProgressInfo| {
        let percent = 100.0 * info.completed as f64 / info.total as f64;
        print!(
            "\r  {}Progress: {}/{} ({:.1}%) {:.0} matchups/sec",
            if info.resumed { "[RESUMED] " } else { "" },
            info.completed,
            info.total,
            percent,
            info.matchups_per_second
        );
        if info.estimated_remaining_seconds > 0.0 {
            print!(" | ETA: {}", format_eta(info.estimated_remaining_seconds));
        }
        print!("      ");
        let _ = std::io::stdout().flush();
    };

    println!("\n\n--- Running Simulation ---");
    let start_sim = Instant::now();
    let catalog = Arc::new(outcome.catalog);
    let status = if cli.quiet {
        sim.simulate_all(&catalog, &registry, None, cli.resume)
    } else {
        sim.simulate_all(&catalog, &registry, Some(&mut progress_cb), cli.resume)
    };

    let status = match status {
        Ok(status) => status,
        Err(err) => {
            eprintln!("\nError during simulation: {}", err);
            return err.exit_code();
        }
    };

    if status == RunStatus::Stopped && stop.load(Ordering::Relaxed) {
        println!("\n\nInterrupted - checkpoint written, resume with -r");
        return 130;
    }

    println!("\n\n--- Simulation Complete ---");
    println!("Session time: {}", format_eta(start_sim.elapsed().as_secs_f64()));
    println!("Results saved to: {}", cli.output);

    let stats = sim.game_stats();
    println!("\n--- Full Game Simulation Stats ---");
    println!("  Total games played: {}", stats.total_games_played());
    println!("  Avg wounds per game: {:.2}", stats.avg_wounds_per_game());
    println!(
        "  Avg models killed per game: {:.2}",
        stats.avg_models_killed_per_game()
    );
    println!(
        "  Total objective rounds: {}",
        stats.total_objective_rounds()
    );
    println!(
        "  Games with objective control: {:.1}%",
        stats.objective_game_percent()
    );

    println!("\n--- Quick Analysis ---");
    let mut analyzer = ResultAnalyzer::new();
    if analyzer.load_results(&cli.output) {
        print!("{}", analyzer.generate_summary_report());

        println!("\nTop 10 Units by Win Rate:");
        for (rank, (id, stats)) in analyzer.get_top_units(10, 3).iter().enumerate() {
            if let Some(unit) = catalog.units.get(*id as usize) {
                println!(
                    "  {}. {} ({}pts) - {:.1}% win rate",
                    rank + 1,
                    unit.name,
                    unit.points_cost,
                    analyzer::win_rate(stats)
                );
            }
        }
    }

    println!("\nUse 'analyze_results' tool for detailed analysis.");
    0
}

fn format_bytes(bytes: f64) -> String {
    if bytes >= 1e12 {
        format!("{:.2} TB", bytes / 1e12)
    } else if bytes >= 1e9 {
        format!("{:.2} GB", bytes / 1e9)
    } else if bytes >= 1e6 {
        format!("{:.2} MB", bytes / 1e6)
    } else {
        format!("{:.2} KB", bytes / 1e3)
    }
}

fn format_eta(seconds: f64) -> String {
    let seconds = seconds as u64;
    if seconds >= 86_400 {
        format!("{}d {}h", seconds / 86_400, (seconds % 86_400) / 3_600)
    } else if seconds >= 3_600 {
        format!("{}h {}m", seconds / 3_600, (seconds % 3_600) / 60)
    } else if seconds >= 60 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
