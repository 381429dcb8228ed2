//! Checkpoint file: crash-safe resume marker for batch runs
//!
//! Fixed 64-byte layout with a crc32c over the meaningful prefix. Writes
//! are atomic (temp file + rename), and the driver only publishes a
//! checkpoint after the output file has been flushed to the recorded
//! length, so a valid checkpoint always describes durable bytes.

use crate::error::{SimError, SimResult};
use crate::formats::ResultFormat;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

pub const CHECKPOINT_MAGIC: &[u8; 8] = b"BSIMCKPT";
pub const CHECKPOINT_VERSION: u16 = 1;
pub const CHECKPOINT_LEN: usize = 64;
/// Bytes covered by the trailing crc32c.
const CHECKSUMMED_LEN: usize = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointData {
    pub format: ResultFormat,
    pub units_a: u32,
    pub units_b: u32,
    /// Completed pairs in pair-index order.
    pub completed: u64,
    /// Exact output-file length at checkpoint time.
    pub output_bytes: u64,
    pub master_seed: u64,
}

impl CheckpointData {
    pub fn encode(&self) -> [u8; CHECKPOINT_LEN] {
        let mut buffer = Vec::with_capacity(CHECKPOINT_LEN);
        buffer.extend_from_slice(CHECKPOINT_MAGIC);
        buffer.write_u16::<LittleEndian>(CHECKPOINT_VERSION).unwrap();
        buffer.write_u16::<LittleEndian>(self.format.tag()).unwrap();
        buffer.write_u32::<LittleEndian>(self.units_a).unwrap();
        buffer.write_u32::<LittleEndian>(self.units_b).unwrap();
        buffer.write_u64::<LittleEndian>(self.completed).unwrap();
        buffer.write_u64::<LittleEndian>(self.output_bytes).unwrap();
        buffer.write_u64::<LittleEndian>(self.master_seed).unwrap();
        debug_assert_eq!(buffer.len(), CHECKSUMMED_LEN);
        let crc = crc32c::crc32c(&buffer);
        buffer.write_u32::<LittleEndian>(crc).unwrap();
        buffer.resize(CHECKPOINT_LEN, 0);

        let mut bytes = [0u8; CHECKPOINT_LEN];
        bytes.copy_from_slice(&buffer);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> SimResult<Self> {
        if bytes.len() < CHECKPOINT_LEN {
            return Err(SimError::Checksum(format!(
                "checkpoint is {} bytes, expected {}",
                bytes.len(),
                CHECKPOINT_LEN
            )));
        }
        if &bytes[..8] != CHECKPOINT_MAGIC {
            return Err(SimError::Checksum("bad checkpoint magic".to_string()));
        }

        let stored_crc = (&bytes[CHECKSUMMED_LEN..CHECKSUMMED_LEN + 4])
            .read_u32::<LittleEndian>()?;
        let actual_crc = crc32c::crc32c(&bytes[..CHECKSUMMED_LEN]);
        if stored_crc != actual_crc {
            return Err(SimError::Checksum(format!(
                "checkpoint crc mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, actual_crc
            )));
        }

        let mut cursor = &bytes[8..];
        let version = cursor.read_u16::<LittleEndian>()?;
        if version != CHECKPOINT_VERSION {
            return Err(SimError::Checksum(format!(
                "unsupported checkpoint version {}",
                version
            )));
        }
        let format = ResultFormat::from_tag(cursor.read_u16::<LittleEndian>()?)
            .map_err(|_| SimError::Checksum("bad checkpoint format tag".to_string()))?;
        Ok(Self {
            format,
            units_a: cursor.read_u32::<LittleEndian>()?,
            units_b: cursor.read_u32::<LittleEndian>()?,
            completed: cursor.read_u64::<LittleEndian>()?,
            output_bytes: cursor.read_u64::<LittleEndian>()?,
            master_seed: cursor.read_u64::<LittleEndian>()?,
        })
    }

    /// Write atomically: temp file, fsync, rename over the target.
    pub fn write_atomic(&self, path: impl AsRef<Path>) -> SimResult<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&self.encode())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a checkpoint. `Ok(None)` when the file does not exist;
    /// `Err(Checksum)` when it exists but is unreadable or corrupt.
    pub fn load(path: impl AsRef<Path>) -> SimResult<Option<Self>> {
        let path = path.as_ref();
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut bytes = Vec::with_capacity(CHECKPOINT_LEN);
        file.read_to_end(&mut bytes)?;
        Self::decode(&bytes).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CheckpointData {
        CheckpointData {
            format: ResultFormat::Compact,
            units_a: 100,
            units_b: 100,
            completed: 40_000,
            output_bytes: 20 + 40_000 * 8,
            master_seed: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn encode_is_exactly_64_bytes_and_round_trips() {
        let checkpoint = sample();
        let bytes = checkpoint.encode();
        assert_eq!(bytes.len(), CHECKPOINT_LEN);
        assert_eq!(CheckpointData::decode(&bytes).unwrap(), checkpoint);
    }

    #[test]
    fn corruption_is_detected() {
        let mut bytes = sample().encode();
        bytes[20] ^= 0xFF;
        assert!(matches!(
            CheckpointData::decode(&bytes),
            Err(SimError::Checksum(_))
        ));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        assert!(CheckpointData::load(&path).unwrap().is_none());
    }

    #[test]
    fn atomic_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.bin");
        let checkpoint = sample();
        checkpoint.write_atomic(&path).unwrap();
        assert_eq!(CheckpointData::load(&path).unwrap(), Some(checkpoint));
    }
}
