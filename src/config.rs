//! Simulation and batch-driver configuration
//!
//! Two layers: `SimulationConfig` parameterizes a single game (round limit,
//! games per match, movement table) and `BatchConfig` parameterizes the
//! batch driver (files, batch size, checkpoint cadence, output format).
//! Environment overrides `BSIM_SEED` and `BSIM_THREADS` are applied by
//! `BatchConfig::apply_env`.

use crate::error::{SimError, SimResult};
use crate::formats::ResultFormat;
use serde::{Deserialize, Serialize};

/// Parameters for one game between two units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Games played per matchup before the winner is declared.
    pub games_per_match: u16,
    /// Round limit; the game ends after this many rounds.
    pub max_rounds: u8,
    /// Deployment separation in inches.
    pub deployment_distance: f32,
    /// Distance from the central objective that counts as controlling it.
    pub objective_control_distance: f32,
    /// Base move distance in inches.
    pub move_distance: f32,
    /// Advance (double move, no shooting) distance in inches.
    pub advance_distance: f32,
    /// Maximum charge reach in inches.
    pub charge_distance: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            games_per_match: 1,
            max_rounds: 4,
            deployment_distance: 24.0,
            objective_control_distance: 3.0,
            move_distance: 6.0,
            advance_distance: 12.0,
            charge_distance: 12.0,
        }
    }
}

/// Parameters for a batch run over the pair-index space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Result file path.
    pub output_file: String,
    /// Checkpoint file path.
    pub checkpoint_file: String,
    /// Pairs per work batch handed to one worker.
    pub batch_size: u64,
    /// Completed pairs between checkpoints.
    pub checkpoint_interval: u64,
    /// On-disk result format.
    pub format: ResultFormat,
    /// Worker threads; 0 means one per hardware thread.
    pub threads: usize,
    /// Master seed; per-batch streams are derived from it.
    pub master_seed: u64,
    /// Whether the driver invokes the progress callback.
    pub enable_progress: bool,
    /// Per-game parameters used by every worker.
    pub simulation: SimulationConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_file: "results.bin".to_string(),
            checkpoint_file: "checkpoint.bin".to_string(),
            batch_size: 10_000,
            checkpoint_interval: 1_000_000,
            format: ResultFormat::Compact,
            threads: 0,
            master_seed: 0xB5EE_D5EE_D001,
            enable_progress: true,
            simulation: SimulationConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Apply `BSIM_SEED` and `BSIM_THREADS` overrides. Malformed values are
    /// configuration errors rather than silent fallbacks.
    pub fn apply_env(&mut self) -> SimResult<()> {
        if let Ok(raw) = std::env::var("BSIM_SEED") {
            self.master_seed = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| SimError::Config(format!("BSIM_SEED is not a u64: {:?}", raw)))?;
            log::info!("master seed overridden via BSIM_SEED: {}", self.master_seed);
        }
        if let Ok(raw) = std::env::var("BSIM_THREADS") {
            let threads = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| SimError::Config(format!("BSIM_THREADS is not a usize: {:?}", raw)))?;
            if threads == 0 {
                return Err(SimError::Config("BSIM_THREADS must be >= 1".to_string()));
            }
            self.threads = threads;
            log::info!("worker count overridden via BSIM_THREADS: {}", threads);
        }
        Ok(())
    }

    /// Effective worker count after defaults.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.batch_size == 0 {
            return Err(SimError::Config("batch size must be >= 1".to_string()));
        }
        if self.checkpoint_interval == 0 {
            return Err(SimError::Config(
                "checkpoint interval must be >= 1".to_string(),
            ));
        }
        if self.simulation.games_per_match == 0 {
            return Err(SimError::Config("games per match must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tool_documentation() {
        let config = BatchConfig::default();
        assert_eq!(config.output_file, "results.bin");
        assert_eq!(config.checkpoint_file, "checkpoint.bin");
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.checkpoint_interval, 1_000_000);
        assert_eq!(config.simulation.games_per_match, 1);
        assert_eq!(config.simulation.max_rounds, 4);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = BatchConfig {
            batch_size: 0,
            ..BatchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
