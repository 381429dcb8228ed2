//! Shared fixtures for the integration suites.

use grimdark_sim::model::{RuleRegistry, UnitCatalog};
use grimdark_sim::parser::UnitParser;
use grimdark_sim::{BatchConfig, ResultFormat, SimulationConfig};
use std::path::Path;
use std::sync::Arc;

/// Four small units with a mix of postures and rules.
pub const SMALL_CATALOG: &str = "\
Shield Brothers [5] Q4+ D4+ | 100pts |
5x CCWs (A2)

Long Rifles [5] Q4+ D5+ | 90pts |
5x CCWs (A1), 5x 24\" Rifles (A2)

Assault Walker [1] Q4+ D2+ | 350pts | Fearless, Regeneration, Tough(9)
Stomp (A3, AP(1)), Heavy Claw (A4, AP(1), Rending)

Grenadiers [3] Q3+ D4+ | 120pts |
3x CCWs (A1), 3x 18\" Launchers (A1, Blast(3))
";

pub fn small_catalog() -> (Arc<UnitCatalog>, Arc<RuleRegistry>) {
    let registry = Arc::new(RuleRegistry::initialize_faction_rules());
    let outcome = UnitParser::parse_str(SMALL_CATALOG, "Test Faction", &registry);
    assert!(
        outcome.errors.is_empty(),
        "fixture errors: {:?}",
        outcome.errors
    );
    (Arc::new(outcome.catalog), registry)
}

/// Batch config pointing into a temp directory, sized so a 4-unit catalog
/// exercises multiple batches and checkpoints.
pub fn batch_config(dir: &Path, format: ResultFormat, threads: usize) -> BatchConfig {
    BatchConfig {
        output_file: dir.join("results.bin").to_string_lossy().into_owned(),
        checkpoint_file: dir.join("checkpoint.bin").to_string_lossy().into_owned(),
        batch_size: 4,
        checkpoint_interval: 8,
        format,
        threads,
        master_seed: 42,
        enable_progress: true,
        simulation: SimulationConfig::default(),
    }
}

pub fn read_file(path: &str) -> Vec<u8> {
    std::fs::read(path).expect("result file exists")
}
