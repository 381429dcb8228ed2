//! Battle simulator: interactive full-matrix runs in the compact format.

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
#[command(name = "battle_sim")]
#[command(about = "Full-matrix matchup simulation (compact results)")]
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
        format: ResultFormat::Compact,
        enable_progress: !cli.quiet,
        ..BatchConfig::default()
    };
    if let Err(err) = config.apply_env() {
        eprintln!("Error: {}", err);
        return err.exit_code();
    }

    let registry = Arc::new(RuleRegistry::initialize_faction_rules());

    println!("=== Battle Simulator ===\n");
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
        eprintln!("Error: no units loaded from {}", cli.units_file.display());
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
    println!("\n--- Simulation Configuration ---");
    println!("Units: {}", units);
    println!("Total matchups: {}", total_matchups);
    println!("Output file: {}", config.output_file);

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
                println!("\n*** RESUMING from checkpoint ***");
                println!(
                    "  Previously completed: {}/{}",
                    checkpoint.completed, total_matchups
                );
            }
            None => println!("\nNo valid checkpoint found - starting fresh"),
        }
    }

    let stop = sim.stop_flag();
    if let Err(err) = signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop)) {
        eprintln!("Error: cannot install SIGINT handler: {}", err);
        return 1;
    }

    let mut progress_cb = |info: &ProgressInfo| {
        let percent = 100.0 * info.completed as f64 / info.total as f64;
        print!(
            "\r  {}Progress: {}/{} ({:.1}%) {:.0} matchups/sec      ",
            if info.resumed { "[RESUMED] " } else { "" },
            info.completed,
            info.total,
            percent,
            info.matchups_per_second
        );
        let _ = std::io::stdout().flush();
    };

    println!("\n--- Running Simulation ---");
    let catalog = Arc::new(outcome.catalog);
    let status = if cli.quiet {
        sim.simulate_all(&catalog, &registry, None, cli.resume)
    } else {
        sim.simulate_all(&catalog, &registry, Some(&mut progress_cb), cli.resume)
    };

    match status {
        Ok(RunStatus::Stopped) if stop.load(Ordering::Relaxed) => {
            println!("\n\nInterrupted - checkpoint written, resume with -r");
            130
        }
        Ok(_) => {
            println!("\n\n--- Simulation Complete ---");
            println!("Results saved to: {}", cli.output);

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
        Err(err) => {
            eprintln!("\nError during simulation: {}", err);
            err.exit_code()
        }
    }
}
