//! Chunked execution: manifests for jobs too large for one machine-run
//!
//! A manifest splits the pair space into coarse chunks that can be run on
//! different machines or at different times. Each chunk produces its own
//! result file via `BatchSimulator::run_range`; the merge pass verifies
//! exact coverage and concatenates the chunk files in id order. The
//! manifest itself is JSON, rewritten atomically while holding a lock file.

use crate::error::{SimError, SimResult};
use crate::formats::{FileHeader, ResultFormat, RESULT_HEADER_LEN};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    Pending,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub chunk_id: u32,
    /// Pair range `[pair_lo, pair_hi)` in pair-index order.
    pub pair_lo: u64,
    pub pair_hi: u64,
    /// Hostname/pid tag of whoever claimed the chunk.
    pub assigned_to: Option<String>,
    pub state: ChunkState,
    pub output_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub units: u64,
    pub master_seed: u64,
    pub format: ResultFormat,
    pub batch_size: u64,
    pub chunks: Vec<ChunkEntry>,
}

impl ChunkManifest {
    /// Split the square pair space into `chunk_count` contiguous ranges.
    /// Chunk boundaries align to the batch size so every chunk derives the
    /// same per-batch dice seeds a single full run would.
    pub fn plan(
        units: u64,
        chunk_count: u32,
        master_seed: u64,
        format: ResultFormat,
        batch_size: u64,
        output_prefix: &str,
    ) -> SimResult<Self> {
        if units == 0 {
            return Err(SimError::Input("unit catalog is empty".to_string()));
        }
        if chunk_count == 0 {
            return Err(SimError::Config("chunk count must be >= 1".to_string()));
        }
        let total_pairs = units * units;
        let total_batches = total_pairs.div_ceil(batch_size);
        let batches_per_chunk = total_batches.div_ceil(u64::from(chunk_count));

        let mut chunks = Vec::new();
        let mut lo = 0u64;
        let mut chunk_id = 0u32;
        while lo < total_pairs {
            let hi = (lo + batches_per_chunk * batch_size).min(total_pairs);
            chunks.push(ChunkEntry {
                chunk_id,
                pair_lo: lo,
                pair_hi: hi,
                assigned_to: None,
                state: ChunkState::Pending,
                output_file: format!("{}_chunk{:04}.bin", output_prefix, chunk_id),
            });
            lo = hi;
            chunk_id += 1;
        }

        Ok(Self {
            units,
            master_seed,
            format,
            batch_size,
            chunks,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| SimError::Input(format!("cannot open manifest: {}", e)))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SimError::Input(format!("malformed manifest: {}", e)))
    }

    /// Rewrite the manifest atomically while holding its lock file.
    pub fn store(&self, path: impl AsRef<Path>) -> SimResult<()> {
        let path = path.as_ref();
        let _lock = ManifestLock::acquire(path)?;
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, self)
                .map_err(|e| SimError::Io(io::Error::other(e)))?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Claim the lowest-id pending chunk.
    pub fn claim_next(&mut self, worker_tag: &str) -> Option<&mut ChunkEntry> {
        let entry = self
            .chunks
            .iter_mut()
            .find(|c| c.state == ChunkState::Pending)?;
        entry.state = ChunkState::InProgress;
        entry.assigned_to = Some(worker_tag.to_string());
        Some(entry)
    }

    pub fn mark_done(&mut self, chunk_id: u32) -> SimResult<()> {
        let entry = self
            .chunks
            .iter_mut()
            .find(|c| c.chunk_id == chunk_id)
            .ok_or_else(|| SimError::Input(format!("no chunk {}", chunk_id)))?;
        entry.state = ChunkState::Done;
        Ok(())
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let mut pending = 0;
        let mut in_progress = 0;
        let mut done = 0;
        for chunk in &self.chunks {
            match chunk.state {
                ChunkState::Pending => pending += 1,
                ChunkState::InProgress => in_progress += 1,
                ChunkState::Done => done += 1,
            }
        }
        (pending, in_progress, done)
    }

    /// Verify coverage: chunks in id order, contiguous from zero, ending at
    /// `units^2`, so every pair appears exactly once.
    pub fn verify_coverage(&self) -> SimResult<()> {
        let mut expected_lo = 0u64;
        for (position, chunk) in self.chunks.iter().enumerate() {
            if chunk.chunk_id != position as u32 {
                return Err(SimError::Input(format!(
                    "chunk ids out of order at position {}",
                    position
                )));
            }
            if chunk.pair_lo != expected_lo || chunk.pair_hi <= chunk.pair_lo {
                return Err(SimError::Input(format!(
                    "chunk {} covers [{}, {}), expected to start at {}",
                    chunk.chunk_id, chunk.pair_lo, chunk.pair_hi, expected_lo
                )));
            }
            expected_lo = chunk.pair_hi;
        }
        if expected_lo != self.units * self.units {
            return Err(SimError::Input(format!(
                "chunks cover {} pairs, catalog needs {}",
                expected_lo,
                self.units * self.units
            )));
        }
        Ok(())
    }

    /// Concatenate all chunk outputs, in id order, into one result file.
    pub fn merge(&self, merged_path: impl AsRef<Path>) -> SimResult<()> {
        self.verify_coverage()?;
        if let Some(chunk) = self.chunks.iter().find(|c| c.state != ChunkState::Done) {
            return Err(SimError::Input(format!(
                "chunk {} is not done; cannot merge",
                chunk.chunk_id
            )));
        }

        let record_size = self.format.record_size();
        let mut writer = BufWriter::new(File::create(merged_path.as_ref())?);
        FileHeader {
            format: self.format,
            units_a: self.units as u32,
            units_b: self.units as u32,
        }
        .write_to(&mut writer)?;

        for chunk in &self.chunks {
            let file = File::open(&chunk.output_file).map_err(|e| {
                SimError::Input(format!("chunk file {} missing: {}", chunk.output_file, e))
            })?;
            let len = file.metadata()?.len();
            let expected = RESULT_HEADER_LEN + (chunk.pair_hi - chunk.pair_lo) * record_size;
            if len != expected {
                return Err(SimError::Input(format!(
                    "chunk {} file is {} bytes, expected {}",
                    chunk.chunk_id, len, expected
                )));
            }

            let mut reader = BufReader::new(file);
            let header = FileHeader::read_from(&mut reader)?;
            if header.format != self.format || u64::from(header.units_a) != self.units {
                return Err(SimError::Input(format!(
                    "chunk {} file header does not match the manifest",
                    chunk.chunk_id
                )));
            }
            io::copy(&mut reader, &mut writer)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Exclusive lock file guarding manifest rewrites. Created with
/// `create_new`; dropped (and removed) when the guard goes out of scope.
struct ManifestLock {
    path: PathBuf,
}

impl ManifestLock {
    fn acquire(manifest_path: &Path) -> SimResult<Self> {
        let path = manifest_path.with_extension("lock");
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(SimError::Config(
                format!("manifest is locked by another process ({})", path.display()),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
