//! Offline analysis of result files: reports, rankings, CSV/JSON export.

use clap::{Parser, Subcommand};
use grimdark_sim::analyzer::{self, ResultAnalyzer};
use grimdark_sim::model::{RuleRegistry, Unit};
use grimdark_sim::parser::UnitParser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "analyze_results")]
#[command(about = "Analysis tools for simulation result files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a summary report
    Summary {
        /// Result file
        results: PathBuf,
    },
    /// Show the top N units by win rate
    Top {
        /// Result file
        results: PathBuf,
        /// Unit catalog text file
        units_file: PathBuf,
        /// How many units to list
        #[arg(default_value_t = 20)]
        count: usize,
    },
    /// Show stats for one unit
    Unit {
        /// Result file
        results: PathBuf,
        /// Unit catalog text file
        units_file: PathBuf,
        /// Unit id
        unit_id: u32,
    },
    /// Show the matchup between two units
    Matchup {
        /// Result file
        results: PathBuf,
        /// First unit id
        id_a: u32,
        /// Second unit id
        id_b: u32,
    },
    /// Export per-unit stats to CSV
    CsvStats {
        /// Result file
        results: PathBuf,
        /// Unit catalog text file
        units_file: PathBuf,
        /// Output CSV path
        output: PathBuf,
    },
    /// Export raw matchups to CSV
    CsvMatchups {
        /// Result file
        results: PathBuf,
        /// Output CSV path
        output: PathBuf,
    },
    /// Export per-unit stats as JSON to stdout
    Json {
        /// Result file
        results: PathBuf,
        /// Unit catalog text file
        units_file: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    match cli.command {
        Commands::Summary { results } => {
            let Some(analyzer) = load(&results) else {
                return 1;
            };
            print!("{}", analyzer.generate_summary_report());
            0
        }
        Commands::Top {
            results,
            units_file,
            count,
        } => {
            let Some(analyzer) = load(&results) else {
                return 1;
            };
            let Some(units) = load_units(&units_file) else {
                return 1;
            };

            println!("=== Top {} Units by Win Rate ===\n", count);
            println!(
                "{:<5} {:<40} {:<8} {:<10} {:<12}",
                "Rank", "Unit Name", "Points", "Win Rate", "Matches"
            );
            println!("{}", "-".repeat(75));
            for (rank, (id, stats)) in analyzer.get_top_units(count, 3).iter().enumerate() {
                if let Some(unit) = units.get(*id as usize) {
                    let mut name = unit.name.clone();
                    name.truncate(38);
                    println!(
                        "{:<5} {:<40} {:<8} {:<10} {:<12}",
                        rank + 1,
                        name,
                        unit.points_cost,
                        format!("{:.0}%", analyzer::win_rate(stats)),
                        stats.matches_played
                    );
                }
            }
            0
        }
        Commands::Unit {
            results,
            units_file,
            unit_id,
        } => {
            let Some(analyzer) = load(&results) else {
                return 1;
            };
            let Some(units) = load_units(&units_file) else {
                return 1;
            };
            print!("{}", analyzer.generate_unit_report(unit_id, &units));
            0
        }
        Commands::Matchup { results, id_a, id_b } => {
            let Some(analyzer) = load(&results) else {
                return 1;
            };
            let stats = analyzer.get_matchup(id_a, id_b);
            println!("=== Matchup: Unit {} vs Unit {} ===\n", id_a, id_b);
            println!("Total matches: {}", stats.total());
            println!("Unit A wins: {} ({:.1}%)", stats.a_wins, stats.a_win_rate());
            println!("Unit B wins: {} ({:.1}%)", stats.b_wins, stats.b_win_rate());
            println!("Draws: {}", stats.draws);
            println!("Games won - A: {}, B: {}", stats.games_a, stats.games_b);
            0
        }
        Commands::CsvStats {
            results,
            units_file,
            output,
        } => {
            let Some(analyzer) = load(&results) else {
                return 1;
            };
            let Some(units) = load_units(&units_file) else {
                return 1;
            };
            match analyzer.export_unit_stats_csv(&output, &units) {
                Ok(()) => {
                    println!("Exported stats to: {}", output.display());
                    0
                }
                Err(err) => {
                    eprintln!("Failed to export to {}: {}", output.display(), err);
                    err.exit_code()
                }
            }
        }
        Commands::CsvMatchups { results, output } => {
            let Some(analyzer) = load(&results) else {
                return 1;
            };
            match analyzer.export_matchups_csv(&output) {
                Ok(()) => {
                    println!("Exported matchups to: {}", output.display());
                    0
                }
                Err(err) => {
                    eprintln!("Failed to export to {}: {}", output.display(), err);
                    err.exit_code()
                }
            }
        }
        Commands::Json {
            results,
            units_file,
        } => {
            let Some(analyzer) = load(&results) else {
                return 1;
            };
            let Some(units) = load_units(&units_file) else {
                return 1;
            };
            match analyzer.export_unit_stats_json(&units) {
                Ok(json) => {
                    println!("{}", json);
                    0
                }
                Err(err) => {
                    eprintln!("Failed to export JSON: {}", err);
                    err.exit_code()
                }
            }
        }
    }
}

fn load(results: &PathBuf) -> Option<ResultAnalyzer> {
    let mut analyzer = ResultAnalyzer::new();
    if analyzer.load_results(results) {
        Some(analyzer)
    } else {
        eprintln!("Failed to load results from: {}", results.display());
        None
    }
}

fn load_units(units_file: &PathBuf) -> Option<Vec<Unit>> {
    let registry = RuleRegistry::initialize_faction_rules();
    match UnitParser::parse_file(units_file, &registry) {
        Ok(outcome) if !outcome.catalog.units.is_empty() => Some(outcome.catalog.units),
        Ok(_) => {
            eprintln!("Failed to load units from: {}", units_file.display());
            None
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            None
        }
    }
}
