//! Chunk-based batch simulator for jobs split across machines or sessions.
//!
//! Modes: `plan` writes a chunk manifest, `run` processes one chunk (the
//! next pending one unless a specific id is given), `status` prints
//! progress, and `merge` concatenates finished chunks into one result file.

use clap::{Parser, Subcommand};
use grimdark_sim::chunks::{ChunkManifest, ChunkState};
use grimdark_sim::model::RuleRegistry;
use grimdark_sim::parser::UnitParser;
use grimdark_sim::progress::ProgressInfo;
use grimdark_sim::{BatchConfig, BatchSimulator, ResultFormat, SimError};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chunk_sim")]
#[command(about = "Chunked matchup processing: plan, run, status, merge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a chunk manifest for a simulation
    Plan {
        /// Unit catalog text file
        units_file: PathBuf,
        /// Manifest path
        #[arg(short = 'm', default_value = "chunks.json")]
        manifest: PathBuf,
        /// Number of chunks
        #[arg(short = 'n', default_value_t = 10)]
        chunks: u32,
        /// Output file prefix for chunk results
        #[arg(short = 'o', default_value = "results")]
        prefix: String,
        /// Batch size in matchups
        #[arg(short = 'b', default_value_t = 10_000)]
        batch_size: u64,
        /// Extended format instead of compact
        #[arg(short = 'e')]
        extended: bool,
    },
    /// Process one chunk (next pending, or a specific id)
    Run {
        /// Unit catalog text file
        units_file: PathBuf,
        /// Manifest path
        #[arg(short = 'm', default_value = "chunks.json")]
        manifest: PathBuf,
        /// Specific chunk id to run
        #[arg(short = 'k')]
        chunk_id: Option<u32>,
        /// Quiet mode (no progress output)
        #[arg(short = 'q')]
        quiet: bool,
    },
    /// Show progress of a chunked simulation
    Status {
        /// Manifest path
        #[arg(short = 'm', default_value = "chunks.json")]
        manifest: PathBuf,
    },
    /// Combine chunk results into the final output
    Merge {
        /// Manifest path
        #[arg(short = 'm', default_value = "chunks.json")]
        manifest: PathBuf,
        /// Merged output file
        #[arg(short = 'o', default_value = "results.bin")]
        output: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Plan {
            units_file,
            manifest,
            chunks,
            prefix,
            batch_size,
            extended,
        } => plan(&units_file, &manifest, chunks, &prefix, batch_size, extended),
        Commands::Run {
            units_file,
            manifest,
            chunk_id,
            quiet,
        } => run_chunk(&units_file, &manifest, chunk_id, quiet),
        Commands::Status { manifest } => status(&manifest),
        Commands::Merge { manifest, output } => merge(&manifest, &output),
    };
    std::process::exit(code);
}

fn plan(
    units_file: &PathBuf,
    manifest_path: &PathBuf,
    chunks: u32,
    prefix: &str,
    batch_size: u64,
    extended: bool,
) -> i32 {
    let registry = RuleRegistry::initialize_faction_rules();
    let outcome = match UnitParser::parse_file(units_file, &registry) {
        Ok(outcome) => outcome,
        Err(err) => return fail(err),
    };
    let units = outcome.catalog.units.len() as u64;
    if units == 0 {
        eprintln!("Error: no units loaded from {}", units_file.display());
        return 1;
    }

    let mut config = BatchConfig::default();
    if let Err(err) = config.apply_env() {
        return fail(err);
    }
    let format = if extended {
        ResultFormat::Extended
    } else {
        ResultFormat::Compact
    };

    let manifest = match ChunkManifest::plan(
        units,
        chunks,
        config.master_seed,
        format,
        batch_size,
        prefix,
    ) {
        Ok(manifest) => manifest,
        Err(err) => return fail(err),
    };
    if let Err(err) = manifest.store(manifest_path) {
        return fail(err);
    }

    println!(
        "Planned {} chunks over {} matchups ({} units)",
        manifest.chunks.len(),
        units * units,
        units
    );
    println!("Manifest written to: {}", manifest_path.display());
    0
}

fn run_chunk(
    units_file: &PathBuf,
    manifest_path: &PathBuf,
    chunk_id: Option<u32>,
    quiet: bool,
) -> i32 {
    let registry = Arc::new(RuleRegistry::initialize_faction_rules());
    let outcome = match UnitParser::parse_file(units_file, &registry) {
        Ok(outcome) => outcome,
        Err(err) => return fail(err),
    };

    let mut manifest = match ChunkManifest::load(manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => return fail(err),
    };
    if outcome.catalog.units.len() as u64 != manifest.units {
        eprintln!(
            "Error: catalog has {} units but the manifest was planned for {}",
            outcome.catalog.units.len(),
            manifest.units
        );
        return 1;
    }

    let worker_tag = format!("{}:{}", hostname(), std::process::id());
    let claimed = match chunk_id {
        Some(id) => {
            let entry = manifest.chunks.iter_mut().find(|c| c.chunk_id == id);
            match entry {
                Some(entry) if entry.state != ChunkState::Done => {
                    entry.state = ChunkState::InProgress;
                    entry.assigned_to = Some(worker_tag.clone());
                    Some(entry.clone())
                }
                Some(_) => {
                    eprintln!("Error: chunk {} is already done", id);
                    return 1;
                }
                None => {
                    eprintln!("Error: no chunk {}", id);
                    return 1;
                }
            }
        }
        None => manifest.claim_next(&worker_tag).map(|entry| entry.clone()),
    };
    let Some(chunk) = claimed else {
        println!("No pending chunks - nothing to do");
        return 0;
    };
    if let Err(err) = manifest.store(manifest_path) {
        return fail(err);
    }

    println!(
        "Running chunk {} covering pairs [{}, {})",
        chunk.chunk_id, chunk.pair_lo, chunk.pair_hi
    );

    let config = BatchConfig {
        output_file: chunk.output_file.clone(),
        checkpoint_file: format!("{}.ckpt", chunk.output_file),
        batch_size: manifest.batch_size,
        format: manifest.format,
        master_seed: manifest.master_seed,
        enable_progress: !quiet,
        ..BatchConfig::default()
    };
    let sim = match BatchSimulator::new(config) {
        Ok(sim) => sim,
        Err(err) => return fail(err),
    };

    let mut progress_cb = |info: &ProgressInfo| {
        print!(
            "\r  Chunk progress: {}/{} ({:.0} matchups/sec)      ",
            info.completed, info.total, info.matchups_per_second
        );
        let _ = std::io::stdout().flush();
    };
    let catalog = Arc::new(outcome.catalog);
    let result = sim.run_range(
        &catalog,
        &registry,
        chunk.pair_lo,
        chunk.pair_hi,
        &chunk.output_file,
        if quiet { None } else { Some(&mut progress_cb) },
        true,
    );
    if let Err(err) = result {
        return fail(err);
    }

    // Reload before marking done so parallel claims are not clobbered.
    let mut manifest = match ChunkManifest::load(manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => return fail(err),
    };
    if let Err(err) = manifest
        .mark_done(chunk.chunk_id)
        .and_then(|()| manifest.store(manifest_path))
    {
        return fail(err);
    }

    println!("\nChunk {} complete -> {}", chunk.chunk_id, chunk.output_file);
    0
}

fn status(manifest_path: &PathBuf) -> i32 {
    let manifest = match ChunkManifest::load(manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => return fail(err),
    };
    let (pending, in_progress, done) = manifest.counts();
    println!("=== Chunk Status ===");
    println!("Units: {}", manifest.units);
    println!("Chunks: {} total", manifest.chunks.len());
    println!("  done:        {}", done);
    println!("  in progress: {}", in_progress);
    println!("  pending:     {}", pending);
    for chunk in &manifest.chunks {
        if chunk.state == ChunkState::InProgress {
            println!(
                "  chunk {} [{}, {}) claimed by {}",
                chunk.chunk_id,
                chunk.pair_lo,
                chunk.pair_hi,
                chunk.assigned_to.as_deref().unwrap_or("?")
            );
        }
    }
    0
}

fn merge(manifest_path: &PathBuf, output: &str) -> i32 {
    let manifest = match ChunkManifest::load(manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => return fail(err),
    };
    match manifest.merge(output) {
        Ok(()) => {
            println!("Merged {} chunks into {}", manifest.chunks.len(), output);
            0
        }
        Err(err) => fail(err),
    }
}

fn fail(err: SimError) -> i32 {
    eprintln!("Error: {}", err);
    err.exit_code()
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
