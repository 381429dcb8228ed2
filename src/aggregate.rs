//! Reduce pass: per-unit rollups from a result file
//!
//! Streams matchup records in file order through per-unit Welford
//! accumulators. The batch driver's Aggregated direct-write path feeds the
//! same accumulators in the same (pair-index) order, after normalizing each
//! outcome through the Extended codec, so reducing an Extended run
//! byte-reproduces a direct Aggregated run.

use crate::error::{SimError, SimResult};
use crate::formats::{
    AggregatedRecord, FileHeader, MatchupOutcome, ResultFormat, RESULT_HEADER_LEN,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Streaming mean/variance accumulator.
#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

/// Accumulator for one unit across all its matchups.
#[derive(Debug, Clone, Copy, Default)]
struct UnitAccumulator {
    matches_played: u32,
    wins: u32,
    losses: u32,
    draws: u32,
    wounds_dealt: Welford,
    wounds_taken: Welford,
    models_killed: u64,
    models_lost: u64,
    holding_hist: [u32; 5],
    best: Option<(u32, f32)>,
    worst: Option<(u32, f32)>,
}

impl UnitAccumulator {
    /// A match counts as won, lost, or drawn by comparing game wins; this
    /// is derivable identically from every on-disk format.
    fn record(&mut self, wins_for: u16, wins_against: u16, opponent: u32) {
        self.matches_played += 1;
        if wins_for > wins_against {
            self.wins += 1;
        } else if wins_against > wins_for {
            self.losses += 1;
        } else {
            self.draws += 1;
        }

        let decided = u32::from(wins_for) + u32::from(wins_against);
        if decided > 0 {
            let rate = f32::from(wins_for) / decided as f32;
            if self.best.map_or(true, |(_, best)| rate > best) {
                self.best = Some((opponent, rate));
            }
            if self.worst.map_or(true, |(_, worst)| rate < worst) {
                self.worst = Some((opponent, rate));
            }
        }
    }

    fn finish(&self, unit_id: u32) -> AggregatedRecord {
        AggregatedRecord {
            unit_id,
            matches_played: self.matches_played,
            wins: self.wins,
            losses: self.losses,
            draws: self.draws,
            mean_wounds_dealt: self.wounds_dealt.mean,
            var_wounds_dealt: self.wounds_dealt.variance(),
            mean_wounds_taken: self.wounds_taken.mean,
            var_wounds_taken: self.wounds_taken.variance(),
            models_killed: self.models_killed,
            models_lost: self.models_lost,
            holding_hist: self.holding_hist,
            best_matchup: self.best.map_or(0, |(id, _)| id),
            best_matchup_rate: self.best.map_or(0.0, |(_, rate)| rate),
            worst_matchup: self.worst.map_or(0, |(id, _)| id),
            worst_matchup_rate: self.worst.map_or(0.0, |(_, rate)| rate),
        }
    }
}

/// Per-unit reducer over matchup outcomes.
pub struct Aggregator {
    units: Vec<UnitAccumulator>,
}

impl Aggregator {
    pub fn new(unit_count: usize) -> Self {
        Self {
            units: vec![UnitAccumulator::default(); unit_count],
        }
    }

    /// Fold one matchup into both participants.
    pub fn record(&mut self, outcome: &MatchupOutcome) {
        let a = usize::from(outcome.attacker_id);
        let b = usize::from(outcome.defender_id);
        if a >= self.units.len() || b >= self.units.len() {
            log::warn!("matchup {}v{} outside unit table, skipped", a, b);
            return;
        }

        self.units[a].record(outcome.wins_a, outcome.wins_b, b as u32);
        self.units[a].wounds_dealt.add(f64::from(outcome.wounds_a));
        self.units[a].wounds_taken.add(f64::from(outcome.wounds_b));
        self.units[a].models_killed += u64::from(outcome.kills_a);
        self.units[a].models_lost += u64::from(outcome.kills_b);
        let bucket = usize::from(outcome.holding_a).min(4);
        self.units[a].holding_hist[bucket] += 1;

        self.units[b].record(outcome.wins_b, outcome.wins_a, a as u32);
        self.units[b].wounds_dealt.add(f64::from(outcome.wounds_b));
        self.units[b].wounds_taken.add(f64::from(outcome.wounds_a));
        self.units[b].models_killed += u64::from(outcome.kills_b);
        self.units[b].models_lost += u64::from(outcome.kills_a);
    }

    pub fn finish(&self) -> Vec<AggregatedRecord> {
        self.units
            .iter()
            .enumerate()
            .map(|(id, acc)| acc.finish(id as u32))
            .collect()
    }
}

/// Reduce a Compact/CompactExtended/Extended result file into per-unit
/// records. Statistics degrade to whatever the input format preserves.
pub fn reduce_file(path: impl AsRef<Path>) -> SimResult<(FileHeader, Vec<AggregatedRecord>)> {
    let file = File::open(path.as_ref())?;
    let total_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let header = FileHeader::read_from(&mut reader)?;
    if header.format == ResultFormat::Aggregated {
        return Err(SimError::Input(
            "file is already aggregated; nothing to reduce".to_string(),
        ));
    }

    let record_size = header.format.record_size();
    let records = (total_len - RESULT_HEADER_LEN) / record_size;
    let mut aggregator = Aggregator::new(header.units_a.max(header.units_b) as usize);
    for _ in 0..records {
        let outcome = MatchupOutcome::decode(header.format, &mut reader)?;
        aggregator.record(&outcome);
    }

    Ok((header, aggregator.finish()))
}

/// Write an Aggregated result file.
pub fn write_aggregated_file(
    path: impl AsRef<Path>,
    units_a: u32,
    units_b: u32,
    records: &[AggregatedRecord],
) -> SimResult<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    let header = FileHeader {
        format: ResultFormat::Aggregated,
        units_a,
        units_b,
    };
    header.write_to(&mut writer)?;
    for record in records {
        record.encode(&mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read back an Aggregated file.
pub fn read_aggregated_file(
    path: impl AsRef<Path>,
) -> SimResult<(FileHeader, Vec<AggregatedRecord>)> {
    let file = File::open(path.as_ref())?;
    let total_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let header = FileHeader::read_from(&mut reader)?;
    if header.format != ResultFormat::Aggregated {
        return Err(SimError::Input("not an aggregated file".to_string()));
    }
    let count = (total_len - RESULT_HEADER_LEN) / ResultFormat::Aggregated.record_size();
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        records.push(AggregatedRecord::decode(&mut reader)?);
    }
    Ok((header, records))
}

/// Normalize an outcome through a per-pair codec so in-memory aggregation
/// matches what a reduce pass over that format would see.
pub fn normalize_outcome(outcome: &MatchupOutcome, format: ResultFormat) -> MatchupOutcome {
    let mut buffer = Vec::with_capacity(format.record_size() as usize);
    outcome
        .encode(format, &mut buffer)
        .expect("in-memory encode cannot fail");
    MatchupOutcome::decode(format, &mut buffer.as_slice())
        .expect("round-trip decode cannot fail")
}

/// Read `count` matchup records from an open reader.
pub fn read_outcomes<R: Read>(
    reader: &mut R,
    format: ResultFormat,
    count: u64,
) -> SimResult<Vec<MatchupOutcome>> {
    let mut outcomes = Vec::with_capacity(count.min(1 << 20) as usize);
    for _ in 0..count {
        outcomes.push(MatchupOutcome::decode(format, reader)?);
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(a: u16, b: u16, wins_a: u16, wins_b: u16, wounds_a: u32) -> MatchupOutcome {
        MatchupOutcome {
            attacker_id: a,
            defender_id: b,
            wins_a,
            wins_b,
            wounds_a,
            wounds_b: 3,
            kills_a: 2,
            kills_b: 1,
            holding_a: 2,
            ..MatchupOutcome::default()
        }
    }

    #[test]
    fn matches_are_counted_for_both_participants() {
        let mut aggregator = Aggregator::new(3);
        aggregator.record(&outcome(0, 1, 1, 0, 10));
        aggregator.record(&outcome(1, 2, 0, 0, 4));
        let records = aggregator.finish();

        assert_eq!(records[0].wins, 1);
        assert_eq!(records[1].matches_played, 2);
        assert_eq!(records[1].losses, 1);
        assert_eq!(records[1].draws, 1);
        assert_eq!(records[2].draws, 1);
    }

    #[test]
    fn best_and_worst_matchups_track_win_rate() {
        let mut aggregator = Aggregator::new(3);
        aggregator.record(&outcome(0, 1, 1, 0, 10));
        aggregator.record(&outcome(0, 2, 0, 1, 2));
        let records = aggregator.finish();

        assert_eq!(records[0].best_matchup, 1);
        assert_eq!(records[0].worst_matchup, 2);
        assert!(records[0].best_matchup_rate > records[0].worst_matchup_rate);
    }

    #[test]
    fn welford_matches_closed_form() {
        let mut welford = Welford::default();
        for value in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            welford.add(value);
        }
        assert!((welford.mean - 5.0).abs() < 1e-12);
        assert!((welford.variance() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn holding_histogram_buckets_attacker_rounds() {
        let mut aggregator = Aggregator::new(2);
        let mut sample = outcome(0, 1, 1, 0, 5);
        sample.holding_a = 7;
        aggregator.record(&sample);
        let records = aggregator.finish();
        assert_eq!(records[0].holding_hist[4], 1);
    }
}
