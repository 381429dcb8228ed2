//! Monte Carlo matchup simulator for Grimdark Future unit matrices
//!
//! The library is layered: `rng` and `model` at the bottom, the per-game
//! engine (`combat`, `ai`, `game`) above them, the batch execution layer
//! (`batch`, `checkpoint`, `chunks`, `formats`) above that, and the offline
//! reduce/report path (`aggregate`, `analyzer`) on top. The binaries under
//! `src/bin/` are thin wrappers over these modules.

pub mod aggregate;
pub mod ai;
pub mod analyzer;
pub mod batch;
pub mod checkpoint;
pub mod chunks;
pub mod combat;
pub mod config;
pub mod error;
pub mod formats;
pub mod game;
pub mod model;
pub mod parser;
pub mod progress;
pub mod rng;
pub mod stats;

// Re-export the types nearly every caller touches.
pub use batch::{BatchSimulator, RunStatus};
pub use config::{BatchConfig, SimulationConfig};
pub use error::{SimError, SimResult};
pub use formats::ResultFormat;
pub use game::{GameRunner, GameWinner, MatchResult};
pub use model::{RuleRegistry, Unit, UnitCatalog};
pub use parser::{ParseOutcome, UnitParser};
pub use rng::DiceStream;
