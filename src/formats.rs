//! On-disk result formats
//!
//! Every format is little-endian and fixed-width. A result file is one
//! header followed by records in pair-index order; the Aggregated format
//! stores one record per unit instead of one per matchup and is produced
//! by the reduce pass in `aggregate`.

use crate::error::{SimError, SimResult};
use crate::game::MatchResult;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const RESULT_MAGIC: &[u8; 8] = b"BSIMRES\0";
pub const RESULT_VERSION: u16 = 1;
/// Header bytes: magic + version + format tag + two unit counts.
pub const RESULT_HEADER_LEN: u64 = 20;
pub const AGGREGATED_RECORD_LEN: u64 = 256;

/// On-disk record layout selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultFormat {
    /// 8 bytes: ids and win counts only.
    Compact,
    /// 16 bytes: Compact plus bit-packed wounds, kills, and holding.
    CompactExtended,
    /// 24 bytes: full-precision game statistics.
    Extended,
    /// 256 bytes per unit: per-unit rollup written by the reduce pass.
    Aggregated,
}

impl ResultFormat {
    pub fn tag(&self) -> u16 {
        match self {
            ResultFormat::Compact => 0,
            ResultFormat::CompactExtended => 1,
            ResultFormat::Extended => 2,
            ResultFormat::Aggregated => 3,
        }
    }

    pub fn from_tag(tag: u16) -> SimResult<Self> {
        match tag {
            0 => Ok(ResultFormat::Compact),
            1 => Ok(ResultFormat::CompactExtended),
            2 => Ok(ResultFormat::Extended),
            3 => Ok(ResultFormat::Aggregated),
            other => Err(SimError::Input(format!("unknown format tag {}", other))),
        }
    }

    /// Bytes per record. For Aggregated this is per unit, not per matchup.
    pub fn record_size(&self) -> u64 {
        match self {
            ResultFormat::Compact => 8,
            ResultFormat::CompactExtended => 16,
            ResultFormat::Extended => 24,
            ResultFormat::Aggregated => AGGREGATED_RECORD_LEN,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResultFormat::Compact => "Compact (8 bytes - win/loss only)",
            ResultFormat::CompactExtended => "Compact Extended (16 bytes - compressed game stats)",
            ResultFormat::Extended => "Extended (24 bytes - full game stats)",
            ResultFormat::Aggregated => "Aggregated (256 bytes/unit - per-unit summary stats)",
        }
    }
}

/// Result-file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub format: ResultFormat,
    pub units_a: u32,
    pub units_b: u32,
}

impl FileHeader {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> SimResult<()> {
        writer.write_all(RESULT_MAGIC)?;
        writer.write_u16::<LittleEndian>(RESULT_VERSION)?;
        writer.write_u16::<LittleEndian>(self.format.tag())?;
        writer.write_u32::<LittleEndian>(self.units_a)?;
        writer.write_u32::<LittleEndian>(self.units_b)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> SimResult<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != RESULT_MAGIC {
            return Err(SimError::Input("not a result file (bad magic)".to_string()));
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version != RESULT_VERSION {
            return Err(SimError::Input(format!(
                "unsupported result file version {}",
                version
            )));
        }
        let format = ResultFormat::from_tag(reader.read_u16::<LittleEndian>()?)?;
        let units_a = reader.read_u32::<LittleEndian>()?;
        let units_b = reader.read_u32::<LittleEndian>()?;
        Ok(Self {
            format,
            units_a,
            units_b,
        })
    }
}

/// Flags byte: which sides were wiped out in at least one game.
pub const FLAG_ATTACKER_WIPED: u8 = 1 << 0;
pub const FLAG_DEFENDER_WIPED: u8 = 1 << 1;

/// Full-precision per-pair totals produced by workers. The writer encodes
/// this into whichever on-disk format is active; decoding a narrower
/// format yields zeros in the fields it does not carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchupOutcome {
    pub attacker_id: u16,
    pub defender_id: u16,
    pub wins_a: u16,
    pub wins_b: u16,
    pub draws: u16,
    pub wounds_a: u32,
    pub wounds_b: u32,
    pub kills_a: u16,
    pub kills_b: u16,
    pub holding_a: u16,
    pub holding_b: u16,
    pub flags: u8,
    pub rounds: u16,
}

impl MatchupOutcome {
    pub fn from_match(attacker_id: u16, defender_id: u16, result: &MatchResult) -> Self {
        let mut flags = 0;
        if result.a_wiped {
            flags |= FLAG_ATTACKER_WIPED;
        }
        if result.b_wiped {
            flags |= FLAG_DEFENDER_WIPED;
        }
        Self {
            attacker_id,
            defender_id,
            wins_a: result.games_won_a,
            wins_b: result.games_won_b,
            draws: result.draws,
            wounds_a: result.total_wounds_dealt_a,
            wounds_b: result.total_wounds_dealt_b,
            kills_a: saturate_u16(result.total_models_killed_a),
            kills_b: saturate_u16(result.total_models_killed_b),
            holding_a: result.total_rounds_holding_a,
            holding_b: result.total_rounds_holding_b,
            flags,
            rounds: result.total_rounds,
        }
    }

    pub fn encode<W: Write>(&self, format: ResultFormat, writer: &mut W) -> SimResult<()> {
        writer.write_u16::<LittleEndian>(self.attacker_id)?;
        writer.write_u16::<LittleEndian>(self.defender_id)?;
        writer.write_u16::<LittleEndian>(self.wins_a)?;
        writer.write_u16::<LittleEndian>(self.wins_b)?;
        match format {
            ResultFormat::Compact => {}
            ResultFormat::CompactExtended => {
                let wounds = u32::from(saturate_u16(self.wounds_a))
                    | (u32::from(saturate_u16(self.wounds_b)) << 16);
                writer.write_u32::<LittleEndian>(wounds)?;
                let packed = u32::from(saturate_u8(self.kills_a))
                    | (u32::from(saturate_u8(self.kills_b)) << 8)
                    | (u32::from(saturate_nibble(self.holding_a)) << 16)
                    | (u32::from(saturate_nibble(self.holding_b)) << 20)
                    | (u32::from(self.flags) << 24);
                writer.write_u32::<LittleEndian>(packed)?;
            }
            ResultFormat::Extended => {
                writer.write_u32::<LittleEndian>(self.wounds_a)?;
                writer.write_u32::<LittleEndian>(self.wounds_b)?;
                writer.write_u16::<LittleEndian>(self.kills_a)?;
                writer.write_u16::<LittleEndian>(self.kills_b)?;
                writer.write_u8(saturate_u8(self.holding_a))?;
                writer.write_u8(saturate_u8(self.holding_b))?;
                writer.write_u8(self.flags)?;
                writer.write_u8(saturate_u8(self.rounds))?;
            }
            ResultFormat::Aggregated => {
                return Err(SimError::Input(
                    "Aggregated files hold per-unit records, not matchups".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn decode<R: Read>(format: ResultFormat, reader: &mut R) -> SimResult<Self> {
        let mut outcome = MatchupOutcome {
            attacker_id: reader.read_u16::<LittleEndian>()?,
            defender_id: reader.read_u16::<LittleEndian>()?,
            wins_a: reader.read_u16::<LittleEndian>()?,
            wins_b: reader.read_u16::<LittleEndian>()?,
            ..MatchupOutcome::default()
        };
        match format {
            ResultFormat::Compact => {}
            ResultFormat::CompactExtended => {
                let wounds = reader.read_u32::<LittleEndian>()?;
                outcome.wounds_a = wounds & 0xFFFF;
                outcome.wounds_b = wounds >> 16;
                let packed = reader.read_u32::<LittleEndian>()?;
                outcome.kills_a = (packed & 0xFF) as u16;
                outcome.kills_b = ((packed >> 8) & 0xFF) as u16;
                outcome.holding_a = ((packed >> 16) & 0xF) as u16;
                outcome.holding_b = ((packed >> 20) & 0xF) as u16;
                outcome.flags = (packed >> 24) as u8;
            }
            ResultFormat::Extended => {
                outcome.wounds_a = reader.read_u32::<LittleEndian>()?;
                outcome.wounds_b = reader.read_u32::<LittleEndian>()?;
                outcome.kills_a = reader.read_u16::<LittleEndian>()?;
                outcome.kills_b = reader.read_u16::<LittleEndian>()?;
                outcome.holding_a = u16::from(reader.read_u8()?);
                outcome.holding_b = u16::from(reader.read_u8()?);
                outcome.flags = reader.read_u8()?;
                outcome.rounds = u16::from(reader.read_u8()?);
            }
            ResultFormat::Aggregated => {
                return Err(SimError::Input(
                    "Aggregated files hold per-unit records, not matchups".to_string(),
                ));
            }
        }
        Ok(outcome)
    }
}

/// One per-unit rollup in an Aggregated file. Encoded length is exactly
/// `AGGREGATED_RECORD_LEN`; trailing bytes are reserved zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregatedRecord {
    pub unit_id: u32,
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub mean_wounds_dealt: f64,
    pub var_wounds_dealt: f64,
    pub mean_wounds_taken: f64,
    pub var_wounds_taken: f64,
    pub models_killed: u64,
    pub models_lost: u64,
    /// Rounds-holding histogram for this unit as attacker, buckets 0..=4.
    pub holding_hist: [u32; 5],
    pub best_matchup: u32,
    pub best_matchup_rate: f32,
    pub worst_matchup: u32,
    pub worst_matchup_rate: f32,
}

impl AggregatedRecord {
    pub fn encode<W: Write>(&self, writer: &mut W) -> SimResult<()> {
        writer.write_u32::<LittleEndian>(self.unit_id)?;
        writer.write_u32::<LittleEndian>(self.matches_played)?;
        writer.write_u32::<LittleEndian>(self.wins)?;
        writer.write_u32::<LittleEndian>(self.losses)?;
        writer.write_u32::<LittleEndian>(self.draws)?;
        writer.write_f64::<LittleEndian>(self.mean_wounds_dealt)?;
        writer.write_f64::<LittleEndian>(self.var_wounds_dealt)?;
        writer.write_f64::<LittleEndian>(self.mean_wounds_taken)?;
        writer.write_f64::<LittleEndian>(self.var_wounds_taken)?;
        writer.write_u64::<LittleEndian>(self.models_killed)?;
        writer.write_u64::<LittleEndian>(self.models_lost)?;
        for bucket in self.holding_hist {
            writer.write_u32::<LittleEndian>(bucket)?;
        }
        writer.write_u32::<LittleEndian>(self.best_matchup)?;
        writer.write_f32::<LittleEndian>(self.best_matchup_rate)?;
        writer.write_u32::<LittleEndian>(self.worst_matchup)?;
        writer.write_f32::<LittleEndian>(self.worst_matchup_rate)?;
        writer.write_all(&[0u8; 152])?;
        Ok(())
    }

    pub fn decode<R: Read>(reader: &mut R) -> SimResult<Self> {
        let mut record = AggregatedRecord {
            unit_id: reader.read_u32::<LittleEndian>()?,
            matches_played: reader.read_u32::<LittleEndian>()?,
            wins: reader.read_u32::<LittleEndian>()?,
            losses: reader.read_u32::<LittleEndian>()?,
            draws: reader.read_u32::<LittleEndian>()?,
            mean_wounds_dealt: reader.read_f64::<LittleEndian>()?,
            var_wounds_dealt: reader.read_f64::<LittleEndian>()?,
            mean_wounds_taken: reader.read_f64::<LittleEndian>()?,
            var_wounds_taken: reader.read_f64::<LittleEndian>()?,
            models_killed: reader.read_u64::<LittleEndian>()?,
            models_lost: reader.read_u64::<LittleEndian>()?,
            ..AggregatedRecord::default()
        };
        for bucket in &mut record.holding_hist {
            *bucket = reader.read_u32::<LittleEndian>()?;
        }
        record.best_matchup = reader.read_u32::<LittleEndian>()?;
        record.best_matchup_rate = reader.read_f32::<LittleEndian>()?;
        record.worst_matchup = reader.read_u32::<LittleEndian>()?;
        record.worst_matchup_rate = reader.read_f32::<LittleEndian>()?;
        let mut reserved = [0u8; 152];
        reader.read_exact(&mut reserved)?;
        Ok(record)
    }
}

fn saturate_u16(value: u32) -> u16 {
    value.min(u32::from(u16::MAX)) as u16
}

fn saturate_u8(value: u16) -> u8 {
    value.min(u16::from(u8::MAX)) as u8
}

fn saturate_nibble(value: u16) -> u8 {
    value.min(0xF) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_outcome() -> MatchupOutcome {
        MatchupOutcome {
            attacker_id: 3,
            defender_id: 7,
            wins_a: 2,
            wins_b: 1,
            draws: 0,
            wounds_a: 19,
            wounds_b: 11,
            kills_a: 4,
            kills_b: 2,
            holding_a: 3,
            holding_b: 0,
            flags: FLAG_DEFENDER_WIPED,
            rounds: 8,
        }
    }

    #[test]
    fn record_sizes_match_the_format_table() {
        assert_eq!(ResultFormat::Compact.record_size(), 8);
        assert_eq!(ResultFormat::CompactExtended.record_size(), 16);
        assert_eq!(ResultFormat::Extended.record_size(), 24);
        assert_eq!(ResultFormat::Aggregated.record_size(), 256);
    }

    #[test]
    fn encoded_lengths_match_record_sizes() {
        for format in [
            ResultFormat::Compact,
            ResultFormat::CompactExtended,
            ResultFormat::Extended,
        ] {
            let mut buffer = Vec::new();
            sample_outcome().encode(format, &mut buffer).unwrap();
            assert_eq!(buffer.len() as u64, format.record_size());
        }

        let mut buffer = Vec::new();
        AggregatedRecord::default().encode(&mut buffer).unwrap();
        assert_eq!(buffer.len() as u64, AGGREGATED_RECORD_LEN);
    }

    #[test]
    fn extended_round_trip_is_lossless() {
        let outcome = sample_outcome();
        let mut buffer = Vec::new();
        outcome.encode(ResultFormat::Extended, &mut buffer).unwrap();
        let decoded =
            MatchupOutcome::decode(ResultFormat::Extended, &mut buffer.as_slice()).unwrap();
        // Draws are not stored on disk; everything else survives.
        let expected = MatchupOutcome {
            draws: 0,
            ..outcome
        };
        assert_eq!(decoded, expected);
    }

    #[test]
    fn compact_extended_saturates_packed_fields() {
        let outcome = MatchupOutcome {
            wounds_a: 100_000,
            kills_a: 700,
            holding_a: 99,
            ..sample_outcome()
        };
        let mut buffer = Vec::new();
        outcome
            .encode(ResultFormat::CompactExtended, &mut buffer)
            .unwrap();
        let decoded =
            MatchupOutcome::decode(ResultFormat::CompactExtended, &mut buffer.as_slice()).unwrap();
        assert_eq!(decoded.wounds_a, u32::from(u16::MAX));
        assert_eq!(decoded.kills_a, u16::from(u8::MAX));
        assert_eq!(decoded.holding_a, 0xF);
    }

    #[test]
    fn header_round_trips_and_rejects_bad_magic() {
        let header = FileHeader {
            format: ResultFormat::Extended,
            units_a: 10,
            units_b: 12,
        };
        let mut buffer = Vec::new();
        header.write_to(&mut buffer).unwrap();
        assert_eq!(buffer.len() as u64, RESULT_HEADER_LEN);
        assert_eq!(FileHeader::read_from(&mut buffer.as_slice()).unwrap(), header);

        buffer[0] = b'X';
        assert!(FileHeader::read_from(&mut buffer.as_slice()).is_err());
    }
}
