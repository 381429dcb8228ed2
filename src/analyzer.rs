//! Offline analysis of result files
//!
//! Loads any result format, computes per-unit and per-matchup statistics,
//! and renders the reports the CLI tools print. Aggregated inputs already
//! carry per-unit rollups; per-pair inputs are reduced on load and keep
//! their records for matchup queries and CSV export.

use crate::aggregate::{self, Aggregator};
use crate::error::{SimError, SimResult};
use crate::formats::{AggregatedRecord, FileHeader, MatchupOutcome, ResultFormat, RESULT_HEADER_LEN};
use crate::model::Unit;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

/// Head-to-head stats for one ordered pair, summed over both orderings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchupStats {
    pub a_wins: u32,
    pub b_wins: u32,
    pub draws: u32,
    pub games_a: u32,
    pub games_b: u32,
}

impl MatchupStats {
    pub fn total(&self) -> u32 {
        self.a_wins + self.b_wins + self.draws
    }

    pub fn a_win_rate(&self) -> f64 {
        percent(self.a_wins, self.total())
    }

    pub fn b_win_rate(&self) -> f64 {
        percent(self.b_wins, self.total())
    }
}

#[derive(Debug, Serialize)]
struct UnitStatsJson {
    id: u32,
    name: String,
    points: u32,
    matches_played: u32,
    wins: u32,
    losses: u32,
    draws: u32,
    win_rate: f64,
    mean_wounds_dealt: f64,
    mean_wounds_taken: f64,
}

pub struct ResultAnalyzer {
    header: Option<FileHeader>,
    records: Vec<MatchupOutcome>,
    unit_stats: Vec<AggregatedRecord>,
}

impl Default for ResultAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAnalyzer {
    pub fn new() -> Self {
        Self {
            header: None,
            records: Vec::new(),
            unit_stats: Vec::new(),
        }
    }

    /// Load a result file of any format. Returns false (with a log line)
    /// instead of failing so callers can continue without analysis.
    pub fn load_results(&mut self, path: impl AsRef<Path>) -> bool {
        match self.try_load(path.as_ref()) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("cannot analyze {}: {}", path.as_ref().display(), err);
                false
            }
        }
    }

    fn try_load(&mut self, path: &Path) -> SimResult<()> {
        let file = File::open(path)?;
        let total_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let header = FileHeader::read_from(&mut reader)?;

        if header.format == ResultFormat::Aggregated {
            let count = (total_len - RESULT_HEADER_LEN) / header.format.record_size();
            let mut stats = Vec::with_capacity(count as usize);
            for _ in 0..count {
                stats.push(AggregatedRecord::decode(&mut reader)?);
            }
            self.records.clear();
            self.unit_stats = stats;
        } else {
            let count = (total_len - RESULT_HEADER_LEN) / header.format.record_size();
            self.records = aggregate::read_outcomes(&mut reader, header.format, count)?;
            let mut aggregator = Aggregator::new(header.units_a.max(header.units_b) as usize);
            for outcome in &self.records {
                aggregator.record(outcome);
            }
            self.unit_stats = aggregator.finish();
        }

        self.header = Some(header);
        Ok(())
    }

    pub fn unit_stats(&self) -> &[AggregatedRecord] {
        &self.unit_stats
    }

    /// Units ranked by win rate, requiring a minimum match count.
    pub fn get_top_units(&self, n: usize, min_matches: u32) -> Vec<(u32, &AggregatedRecord)> {
        let mut ranked: Vec<_> = self
            .unit_stats
            .iter()
            .filter(|stats| stats.matches_played >= min_matches)
            .map(|stats| (stats.unit_id, stats))
            .collect();
        ranked.sort_by(|(id_a, a), (id_b, b)| {
            win_rate(b)
                .partial_cmp(&win_rate(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(id_a.cmp(id_b))
        });
        ranked.truncate(n);
        ranked
    }

    /// Head-to-head stats between two units, summed over both orderings.
    /// Only per-pair inputs can answer this.
    pub fn get_matchup(&self, id_a: u32, id_b: u32) -> MatchupStats {
        let mut stats = MatchupStats::default();
        for record in &self.records {
            let forward =
                u32::from(record.attacker_id) == id_a && u32::from(record.defender_id) == id_b;
            let reverse =
                u32::from(record.attacker_id) == id_b && u32::from(record.defender_id) == id_a;
            if forward {
                stats.games_a += u32::from(record.wins_a);
                stats.games_b += u32::from(record.wins_b);
                match record.wins_a.cmp(&record.wins_b) {
                    std::cmp::Ordering::Greater => stats.a_wins += 1,
                    std::cmp::Ordering::Less => stats.b_wins += 1,
                    std::cmp::Ordering::Equal => stats.draws += 1,
                }
            } else if reverse {
                stats.games_a += u32::from(record.wins_b);
                stats.games_b += u32::from(record.wins_a);
                match record.wins_b.cmp(&record.wins_a) {
                    std::cmp::Ordering::Greater => stats.a_wins += 1,
                    std::cmp::Ordering::Less => stats.b_wins += 1,
                    std::cmp::Ordering::Equal => stats.draws += 1,
                }
            }
        }
        stats
    }

    pub fn generate_summary_report(&self) -> String {
        let mut report = String::new();
        let Some(header) = self.header else {
            return "No results loaded.\n".to_string();
        };
        let _ = writeln!(report, "=== Result Summary ===");
        let _ = writeln!(report, "Format: {}", header.format.name());
        let _ = writeln!(
            report,
            "Units: {} x {}",
            header.units_a, header.units_b
        );
        if !self.records.is_empty() {
            let _ = writeln!(report, "Matchup records: {}", self.records.len());
        }

        let played: Vec<_> = self
            .unit_stats
            .iter()
            .filter(|stats| stats.matches_played > 0)
            .collect();
        if !played.is_empty() {
            let mean_rate =
                played.iter().map(|stats| win_rate(stats)).sum::<f64>() / played.len() as f64;
            let _ = writeln!(report, "Units with results: {}", played.len());
            let _ = writeln!(report, "Mean win rate: {:.1}%", mean_rate);
        }
        report
    }

    pub fn generate_unit_report(&self, unit_id: u32, units: &[Unit]) -> String {
        let mut report = String::new();
        let Some(stats) = self.unit_stats.iter().find(|s| s.unit_id == unit_id) else {
            return format!("No results for unit {}\n", unit_id);
        };
        let name = units
            .get(unit_id as usize)
            .map(|u| u.name.as_str())
            .unwrap_or("<unknown>");

        let _ = writeln!(report, "=== Unit {}: {} ===", unit_id, name);
        let _ = writeln!(report, "Matches played: {}", stats.matches_played);
        let _ = writeln!(
            report,
            "Record: {}W / {}L / {}D ({:.1}% win rate)",
            stats.wins,
            stats.losses,
            stats.draws,
            win_rate(stats)
        );
        let _ = writeln!(
            report,
            "Wounds: {:.2} dealt / {:.2} taken per match",
            stats.mean_wounds_dealt, stats.mean_wounds_taken
        );
        let _ = writeln!(
            report,
            "Models: {} killed / {} lost",
            stats.models_killed, stats.models_lost
        );
        let best_name = units
            .get(stats.best_matchup as usize)
            .map(|u| u.name.as_str())
            .unwrap_or("<unknown>");
        let worst_name = units
            .get(stats.worst_matchup as usize)
            .map(|u| u.name.as_str())
            .unwrap_or("<unknown>");
        let _ = writeln!(
            report,
            "Best matchup: {} ({:.0}%)",
            best_name,
            f64::from(stats.best_matchup_rate) * 100.0
        );
        let _ = writeln!(
            report,
            "Worst matchup: {} ({:.0}%)",
            worst_name,
            f64::from(stats.worst_matchup_rate) * 100.0
        );
        report
    }

    pub fn export_unit_stats_csv(&self, path: impl AsRef<Path>, units: &[Unit]) -> SimResult<()> {
        let mut file = File::create(path.as_ref())?;
        writeln!(
            file,
            "unit_id,name,points,matches,wins,losses,draws,win_rate,mean_wounds_dealt,mean_wounds_taken"
        )?;
        for stats in &self.unit_stats {
            let unit = units.get(stats.unit_id as usize);
            writeln!(
                file,
                "{},{:?},{},{},{},{},{},{:.2},{:.3},{:.3}",
                stats.unit_id,
                unit.map(|u| u.name.as_str()).unwrap_or(""),
                unit.map(|u| u.points_cost).unwrap_or(0),
                stats.matches_played,
                stats.wins,
                stats.losses,
                stats.draws,
                win_rate(stats),
                stats.mean_wounds_dealt,
                stats.mean_wounds_taken
            )?;
        }
        Ok(())
    }

    pub fn export_matchups_csv(&self, path: impl AsRef<Path>) -> SimResult<()> {
        if self.records.is_empty() {
            return Err(SimError::Input(
                "aggregated input has no per-matchup records".to_string(),
            ));
        }
        let mut file = File::create(path.as_ref())?;
        writeln!(file, "attacker_id,defender_id,wins_a,wins_b,wounds_a,wounds_b")?;
        for record in &self.records {
            writeln!(
                file,
                "{},{},{},{},{},{}",
                record.attacker_id,
                record.defender_id,
                record.wins_a,
                record.wins_b,
                record.wounds_a,
                record.wounds_b
            )?;
        }
        Ok(())
    }

    pub fn export_unit_stats_json(&self, units: &[Unit]) -> SimResult<String> {
        let rows: Vec<UnitStatsJson> = self
            .unit_stats
            .iter()
            .map(|stats| UnitStatsJson {
                id: stats.unit_id,
                name: units
                    .get(stats.unit_id as usize)
                    .map(|u| u.name.clone())
                    .unwrap_or_default(),
                points: units
                    .get(stats.unit_id as usize)
                    .map(|u| u.points_cost)
                    .unwrap_or(0),
                matches_played: stats.matches_played,
                wins: stats.wins,
                losses: stats.losses,
                draws: stats.draws,
                win_rate: win_rate(stats),
                mean_wounds_dealt: stats.mean_wounds_dealt,
                mean_wounds_taken: stats.mean_wounds_taken,
            })
            .collect();
        serde_json::to_string_pretty(&rows)
            .map_err(|e| SimError::Io(std::io::Error::other(e)))
    }
}

/// Win rate over matches, in percent.
pub fn win_rate(stats: &AggregatedRecord) -> f64 {
    percent(stats.wins, stats.matches_played)
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * f64::from(part) / f64::from(whole)
    }
}
