//! Per-worker and global run statistics
//!
//! Workers accumulate into a private `LocalStats` and merge it into the
//! shared `AtomicStats` at batch boundaries. The counters are monotone, so
//! relaxed ordering is sufficient; nothing synchronizes through them.

use crate::game::{GameWinner, MatchResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Worker-exclusive partial aggregate for one batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStats {
    pub attacker_wins: u64,
    pub defender_wins: u64,
    pub draws: u64,
    pub wounds_ab: u64,
    pub wounds_ba: u64,
    pub kills_ab: u64,
    pub kills_ba: u64,
    pub objective_rounds_a: u64,
    pub objective_rounds_b: u64,
    pub total_rounds: u64,
    pub games_played: u64,
    pub games_with_objective: u64,
}

impl LocalStats {
    pub fn record(&mut self, result: &MatchResult) {
        match result.overall_winner() {
            GameWinner::UnitA => self.attacker_wins += 1,
            GameWinner::UnitB => self.defender_wins += 1,
            GameWinner::Draw => self.draws += 1,
        }
        self.wounds_ab += u64::from(result.total_wounds_dealt_a);
        self.wounds_ba += u64::from(result.total_wounds_dealt_b);
        self.kills_ab += u64::from(result.total_models_killed_a);
        self.kills_ba += u64::from(result.total_models_killed_b);
        self.objective_rounds_a += u64::from(result.total_rounds_holding_a);
        self.objective_rounds_b += u64::from(result.total_rounds_holding_b);
        self.total_rounds += u64::from(result.total_rounds);
        self.games_played +=
            u64::from(result.games_won_a) + u64::from(result.games_won_b) + u64::from(result.draws);
        if result.total_rounds_holding_a > 0 || result.total_rounds_holding_b > 0 {
            self.games_with_objective += 1;
        }
    }

    pub fn merge_into(&self, global: &AtomicStats) {
        global.attacker_wins.fetch_add(self.attacker_wins, Ordering::Relaxed);
        global.defender_wins.fetch_add(self.defender_wins, Ordering::Relaxed);
        global.draws.fetch_add(self.draws, Ordering::Relaxed);
        global.wounds_ab.fetch_add(self.wounds_ab, Ordering::Relaxed);
        global.wounds_ba.fetch_add(self.wounds_ba, Ordering::Relaxed);
        global.kills_ab.fetch_add(self.kills_ab, Ordering::Relaxed);
        global.kills_ba.fetch_add(self.kills_ba, Ordering::Relaxed);
        global
            .objective_rounds_a
            .fetch_add(self.objective_rounds_a, Ordering::Relaxed);
        global
            .objective_rounds_b
            .fetch_add(self.objective_rounds_b, Ordering::Relaxed);
        global.total_rounds.fetch_add(self.total_rounds, Ordering::Relaxed);
        global.games_played.fetch_add(self.games_played, Ordering::Relaxed);
        global
            .games_with_objective
            .fetch_add(self.games_with_objective, Ordering::Relaxed);
    }
}

/// Global monotone counters, shared across all workers for the lifetime of
/// one run.
#[derive(Debug, Default)]
pub struct AtomicStats {
    pub attacker_wins: AtomicU64,
    pub defender_wins: AtomicU64,
    pub draws: AtomicU64,
    pub wounds_ab: AtomicU64,
    pub wounds_ba: AtomicU64,
    pub kills_ab: AtomicU64,
    pub kills_ba: AtomicU64,
    pub objective_rounds_a: AtomicU64,
    pub objective_rounds_b: AtomicU64,
    pub total_rounds: AtomicU64,
    pub games_played: AtomicU64,
    pub games_with_objective: AtomicU64,
}

impl AtomicStats {
    pub fn total_games_played(&self) -> u64 {
        self.games_played.load(Ordering::Relaxed)
    }

    pub fn total_objective_rounds(&self) -> u64 {
        self.objective_rounds_a.load(Ordering::Relaxed)
            + self.objective_rounds_b.load(Ordering::Relaxed)
    }

    pub fn avg_wounds_per_game(&self) -> f64 {
        let games = self.total_games_played();
        if games == 0 {
            return 0.0;
        }
        let wounds =
            self.wounds_ab.load(Ordering::Relaxed) + self.wounds_ba.load(Ordering::Relaxed);
        wounds as f64 / games as f64
    }

    pub fn avg_models_killed_per_game(&self) -> f64 {
        let games = self.total_games_played();
        if games == 0 {
            return 0.0;
        }
        let kills = self.kills_ab.load(Ordering::Relaxed) + self.kills_ba.load(Ordering::Relaxed);
        kills as f64 / games as f64
    }

    pub fn objective_game_percent(&self) -> f64 {
        let games = self.total_games_played();
        if games == 0 {
            return 0.0;
        }
        100.0 * self.games_with_objective.load(Ordering::Relaxed) as f64 / games as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_into_the_global_counters() {
        let global = AtomicStats::default();
        let local = LocalStats {
            attacker_wins: 3,
            defender_wins: 2,
            draws: 1,
            wounds_ab: 40,
            wounds_ba: 25,
            games_played: 6,
            ..LocalStats::default()
        };
        local.merge_into(&global);
        local.merge_into(&global);

        assert_eq!(global.attacker_wins.load(Ordering::Relaxed), 6);
        assert_eq!(global.total_games_played(), 12);
        assert!((global.avg_wounds_per_game() - (130.0 / 12.0)).abs() < 1e-9);
    }
}
