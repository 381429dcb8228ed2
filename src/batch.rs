//! Batch driver: the full pair-index space across a thread pool
//!
//! The pair space `(i * n + j)` is cut into fixed-size batches. Workers on
//! a rayon pool each own one derived dice stream per batch and send their
//! outcome slices back over a channel; the driver holds them in a reorder
//! buffer keyed by batch index so the on-disk record order always equals
//! pair-index order, which resume correctness depends on. Checkpoints are
//! published only after the output file has been flushed and synced to the
//! recorded length.

use crate::aggregate::{self, Aggregator};
use crate::checkpoint::CheckpointData;
use crate::config::BatchConfig;
use crate::error::{SimError, SimResult};
use crate::formats::{FileHeader, MatchupOutcome, ResultFormat, RESULT_HEADER_LEN};
use crate::game::GameRunner;
use crate::model::{RuleRegistry, UnitCatalog};
use crate::progress::{ProgressInfo, ProgressThrottle};
use crate::rng::{derive_batch_seed, DiceStream};
use crate::stats::{AtomicStats, LocalStats};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// The cooperative stop flag was raised; in-flight batches were
    /// drained and a checkpoint written.
    Stopped,
}

type BatchMessage = (u64, Result<Vec<MatchupOutcome>, String>);

pub struct BatchSimulator {
    config: BatchConfig,
    pool: rayon::ThreadPool,
    stats: Arc<AtomicStats>,
    stop: Arc<AtomicBool>,
}

impl BatchSimulator {
    pub fn new(config: BatchConfig) -> SimResult<Self> {
        config.validate()?;
        let threads = config.effective_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sim-worker-{}", i))
            .build()
            .map_err(|e| SimError::Config(format!("cannot build thread pool: {}", e)))?;
        Ok(Self {
            config,
            pool,
            stats: Arc::new(AtomicStats::default()),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn game_stats(&self) -> &AtomicStats {
        &self.stats
    }

    /// Flag checked at batch boundaries; raising it lets in-flight batches
    /// finish, then checkpoints and returns `RunStatus::Stopped`.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Validate an on-disk checkpoint against this run's dimensions. A
    /// corrupt or mismatched checkpoint degrades to `None` with a warning.
    pub fn check_checkpoint(&self, units_a: u64, units_b: u64) -> Option<CheckpointData> {
        let checkpoint = match CheckpointData::load(&self.config.checkpoint_file) {
            Ok(found) => found?,
            Err(err) => {
                log::warn!("ignoring unreadable checkpoint: {}", err);
                return None;
            }
        };
        if u64::from(checkpoint.units_a) != units_a || u64::from(checkpoint.units_b) != units_b {
            log::warn!("checkpoint is for a different catalog, ignoring");
            return None;
        }
        if checkpoint.format != self.config.format {
            log::warn!("checkpoint is for a different result format, ignoring");
            return None;
        }
        if checkpoint.master_seed != self.config.master_seed {
            log::warn!("checkpoint is for a different master seed, ignoring");
            return None;
        }
        // Checkpoints land on batch boundaries; misalignment means the
        // batch size changed between runs.
        if checkpoint.completed % self.config.batch_size != 0 {
            log::warn!("checkpoint does not align with batch size, ignoring");
            return None;
        }
        Some(checkpoint)
    }

    /// Run every pair of the catalog against itself, writing the result
    /// file and maintaining the checkpoint.
    pub fn simulate_all(
        &self,
        catalog: &Arc<UnitCatalog>,
        registry: &Arc<RuleRegistry>,
        mut progress: Option<&mut dyn FnMut(&ProgressInfo)>,
        try_resume: bool,
    ) -> SimResult<RunStatus> {
        let n = catalog.units.len() as u64;
        if n == 0 {
            return Err(SimError::Input("unit catalog is empty".to_string()));
        }
        if n > u64::from(u16::MAX) {
            return Err(SimError::Input(format!(
                "catalog has {} units; record ids are 16-bit",
                n
            )));
        }
        self.run_range(catalog, registry, 0, n * n, &self.config.output_file, progress, try_resume)
    }

    /// Run a sub-range `[lo, hi)` of the pair space into `output_file`.
    /// Chunked jobs use this; `simulate_all` is the full-range case.
    pub fn run_range(
        &self,
        catalog: &Arc<UnitCatalog>,
        registry: &Arc<RuleRegistry>,
        range_lo: u64,
        range_hi: u64,
        output_file: &str,
        mut progress: Option<&mut dyn FnMut(&ProgressInfo)>,
        try_resume: bool,
    ) -> SimResult<RunStatus> {
        let n = catalog.units.len() as u64;
        let total_pairs = range_hi - range_lo;
        // Batch indices are global over the whole pair space so a chunk run
        // derives the same per-batch dice seeds as a single full run.
        if range_lo % self.config.batch_size != 0 {
            return Err(SimError::Config(format!(
                "range start {} does not align with batch size {}",
                range_lo, self.config.batch_size
            )));
        }
        let header = FileHeader {
            format: self.config.format,
            units_a: n as u32,
            units_b: n as u32,
        };

        // Aggregated runs reduce in memory and cannot resume mid-run.
        if self.config.format == ResultFormat::Aggregated {
            if try_resume {
                log::warn!("aggregated runs do not support resume; starting fresh");
            }
            return self.run_aggregated(catalog, registry, range_lo, range_hi, output_file, progress);
        }

        let record_size = self.config.format.record_size();
        let mut completed = 0u64;
        let mut resumed = false;
        if try_resume {
            if let Some(checkpoint) = self.check_checkpoint(n, n) {
                match reopen_for_resume(output_file, &header, checkpoint.output_bytes) {
                    Ok(true) => {
                        completed = checkpoint.completed;
                        resumed = completed > 0;
                        log::info!(
                            "resuming at {} completed pairs ({} bytes)",
                            completed,
                            checkpoint.output_bytes
                        );
                    }
                    Ok(false) => log::warn!("output file shorter than checkpoint, starting fresh"),
                    Err(err) => return Err(err),
                }
            }
        }

        let writer = Mutex::new(if resumed {
            open_resumed_writer(output_file, RESULT_HEADER_LEN + completed * record_size)?
        } else {
            create_fresh_writer(output_file, &header)?
        });

        let batch_size = self.config.batch_size;
        let end_batch = range_hi.div_ceil(batch_size);
        let start_batch = range_lo / batch_size + completed / batch_size;
        let max_in_flight = (self.thread_count() * 2).max(2) as u64;

        let (sender, receiver) = mpsc::channel::<BatchMessage>();
        let mut next_to_spawn = start_batch;
        let mut next_to_append = start_batch;
        let mut in_flight = 0u64;
        let mut pending: BTreeMap<u64, Vec<MatchupOutcome>> = BTreeMap::new();
        let mut last_checkpoint = completed;
        let mut throttle = ProgressThrottle::new(completed, resumed);
        let mut stopped = false;

        while next_to_spawn < end_batch
            && in_flight < max_in_flight
            && !self.stop.load(Ordering::Relaxed)
        {
            self.spawn_batch(catalog, registry, range_hi, n, next_to_spawn, &sender);
            next_to_spawn += 1;
            in_flight += 1;
        }

        while in_flight > 0 {
            let (batch_index, payload) = receiver
                .recv()
                .map_err(|_| SimError::Internal("worker channel closed unexpectedly".to_string()))?;
            in_flight -= 1;

            let records = match payload {
                Ok(records) => records,
                Err(message) => {
                    // Worker failure: drain nothing further, persist what is
                    // already durable, and surface the error.
                    let _ = self.write_checkpoint(output_file, &writer, n, completed, record_size);
                    return Err(SimError::Internal(format!(
                        "worker for batch {} failed: {}",
                        batch_index, message
                    )));
                }
            };

            if pending.insert(batch_index, records).is_some() {
                // Reorder buffer saw the same batch twice: driver bug.
                panic!("duplicate batch id {} in reorder buffer", batch_index);
            }

            while let Some(records) = pending.remove(&next_to_append) {
                let batch_start = RESULT_HEADER_LEN + completed * record_size;
                {
                    let mut guard = writer.lock().expect("writer mutex poisoned");
                    append_records(&mut guard, &records, self.config.format, output_file, batch_start)?;
                }
                completed += records.len() as u64;
                next_to_append += 1;

                if completed - last_checkpoint >= self.config.checkpoint_interval {
                    self.write_checkpoint(output_file, &writer, n, completed, record_size)?;
                    last_checkpoint = completed;
                }
            }

            if self.config.enable_progress {
                if let Some(callback) = progress.as_deref_mut() {
                    if let Some(info) = throttle.tick(completed, total_pairs) {
                        callback(&info);
                    }
                }
            }

            if self.stop.load(Ordering::Relaxed) {
                stopped = true;
            } else {
                while next_to_spawn < end_batch && in_flight < max_in_flight {
                    self.spawn_batch(catalog, registry, range_hi, n, next_to_spawn, &sender);
                    next_to_spawn += 1;
                    in_flight += 1;
                }
            }
        }

        self.write_checkpoint(output_file, &writer, n, completed, record_size)?;

        if let Some(callback) = progress.as_deref_mut() {
            if self.config.enable_progress {
                if let Some(info) = throttle.tick(completed, total_pairs) {
                    callback(&info);
                }
            }
        }

        if stopped || completed < total_pairs {
            Ok(RunStatus::Stopped)
        } else {
            Ok(RunStatus::Completed)
        }
    }

    /// Spawn one worker for global batch `batch_index`, covering pairs
    /// `[batch_index * batch_size, range_hi)` capped at one batch.
    fn spawn_batch(
        &self,
        catalog: &Arc<UnitCatalog>,
        registry: &Arc<RuleRegistry>,
        range_hi: u64,
        n: u64,
        batch_index: u64,
        sender: &mpsc::Sender<BatchMessage>,
    ) {
        let catalog = Arc::clone(catalog);
        let registry = Arc::clone(registry);
        let stats = Arc::clone(&self.stats);
        let sender = sender.clone();
        let config = self.config.simulation.clone();
        let batch_size = self.config.batch_size;
        let master_seed = self.config.master_seed;

        self.pool.spawn(move || {
            let payload = catch_unwind(AssertUnwindSafe(|| {
                let lo = batch_index * batch_size;
                let hi = (lo + batch_size).min(range_hi);
                let mut dice = DiceStream::new(derive_batch_seed(master_seed, batch_index));
                let runner = GameRunner::new(&catalog.weapons, &registry, &config);
                let mut local = LocalStats::default();
                let mut records = Vec::with_capacity((hi - lo) as usize);

                for pair in lo..hi {
                    let i = (pair / n) as usize;
                    let j = (pair % n) as usize;
                    let result = runner.run_match(&catalog.units[i], &catalog.units[j], &mut dice);
                    local.record(&result);
                    records.push(MatchupOutcome::from_match(i as u16, j as u16, &result));
                }

                local.merge_into(&stats);
                records
            }));

            let message = match payload {
                Ok(records) => (batch_index, Ok(records)),
                Err(panic) => {
                    let text = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "worker panicked".to_string());
                    (batch_index, Err(text))
                }
            };
            let _ = sender.send(message);
        });
    }

    /// Flush + sync the output, then atomically publish the checkpoint.
    /// Output bytes are durable before the checkpoint names them.
    fn write_checkpoint(
        &self,
        output_file: &str,
        writer: &Mutex<BufWriter<File>>,
        n: u64,
        completed: u64,
        record_size: u64,
    ) -> SimResult<()> {
        {
            let mut guard = writer.lock().expect("writer mutex poisoned");
            guard.flush()?;
            guard.get_ref().sync_data()?;
        }
        let checkpoint = CheckpointData {
            format: self.config.format,
            units_a: n as u32,
            units_b: n as u32,
            completed,
            output_bytes: RESULT_HEADER_LEN + completed * record_size,
            master_seed: self.config.master_seed,
        };
        checkpoint.write_atomic(&self.config.checkpoint_file)?;
        log::debug!(
            "checkpoint: {} pairs, {} bytes in {}",
            completed,
            checkpoint.output_bytes,
            output_file
        );
        Ok(())
    }

    /// Aggregated direct-write: run the range, normalize each outcome
    /// through the Extended codec, reduce in memory, write once at the end.
    fn run_aggregated(
        &self,
        catalog: &Arc<UnitCatalog>,
        registry: &Arc<RuleRegistry>,
        range_lo: u64,
        range_hi: u64,
        output_file: &str,
        mut progress: Option<&mut dyn FnMut(&ProgressInfo)>,
    ) -> SimResult<RunStatus> {
        let n = catalog.units.len() as u64;
        let total_pairs = range_hi - range_lo;
        let batch_size = self.config.batch_size;
        let start_batch = range_lo / batch_size;
        let end_batch = range_hi.div_ceil(batch_size);
        let max_in_flight = (self.thread_count() * 2).max(2) as u64;

        let (sender, receiver) = mpsc::channel::<BatchMessage>();
        let mut aggregator = Aggregator::new(catalog.units.len());
        let mut pending: BTreeMap<u64, Vec<MatchupOutcome>> = BTreeMap::new();
        let mut next_to_spawn = start_batch;
        let mut next_to_append = start_batch;
        let mut in_flight = 0u64;
        let mut completed = 0u64;
        let mut throttle = ProgressThrottle::new(0, false);
        let mut stopped = false;

        while next_to_spawn < end_batch && in_flight < max_in_flight {
            self.spawn_batch(catalog, registry, range_hi, n, next_to_spawn, &sender);
            next_to_spawn += 1;
            in_flight += 1;
        }

        while in_flight > 0 {
            let (batch_index, payload) = receiver
                .recv()
                .map_err(|_| SimError::Internal("worker channel closed unexpectedly".to_string()))?;
            in_flight -= 1;
            let records = payload.map_err(|message| {
                SimError::Internal(format!("worker for batch {} failed: {}", batch_index, message))
            })?;

            if pending.insert(batch_index, records).is_some() {
                panic!("duplicate batch id {} in reorder buffer", batch_index);
            }
            while let Some(records) = pending.remove(&next_to_append) {
                completed += records.len() as u64;
                for outcome in &records {
                    let normalized = aggregate::normalize_outcome(outcome, ResultFormat::Extended);
                    aggregator.record(&normalized);
                }
                next_to_append += 1;
            }

            if self.config.enable_progress {
                if let Some(callback) = progress.as_deref_mut() {
                    if let Some(info) = throttle.tick(completed, total_pairs) {
                        callback(&info);
                    }
                }
            }

            if self.stop.load(Ordering::Relaxed) {
                stopped = true;
            } else {
                while next_to_spawn < end_batch && in_flight < max_in_flight {
                    self.spawn_batch(catalog, registry, range_hi, n, next_to_spawn, &sender);
                    next_to_spawn += 1;
                    in_flight += 1;
                }
            }
        }

        aggregate::write_aggregated_file(output_file, n as u32, n as u32, &aggregator.finish())?;
        if stopped || completed < total_pairs {
            Ok(RunStatus::Stopped)
        } else {
            Ok(RunStatus::Completed)
        }
    }
}

fn create_fresh_writer(path: &str, header: &FileHeader) -> SimResult<BufWriter<File>> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    header.write_to(&mut writer)?;
    Ok(writer)
}

fn open_resumed_writer(path: &str, position: u64) -> SimResult<BufWriter<File>> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(position))?;
    Ok(BufWriter::new(file))
}

/// Validate the existing output file for resume and truncate any partial
/// tail append past the checkpointed length. Returns false when the file
/// is unusable (missing, short, or with a mismatched header).
fn reopen_for_resume(path: &str, expected: &FileHeader, output_bytes: u64) -> SimResult<bool> {
    let path_ref = Path::new(path);
    if !path_ref.exists() {
        return Ok(false);
    }
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    if len < output_bytes {
        return Ok(false);
    }
    let mut header_bytes = vec![0u8; RESULT_HEADER_LEN as usize];
    file.read_exact(&mut header_bytes)?;
    let Ok(found) = FileHeader::read_from(&mut header_bytes.as_slice()) else {
        return Ok(false);
    };
    if found != *expected {
        return Ok(false);
    }
    if len > output_bytes {
        log::warn!("truncating {} stray bytes from {}", len - output_bytes, path);
        file.set_len(output_bytes)?;
    }
    Ok(true)
}

/// Append one batch's records, retrying once through a reopen if the write
/// fails mid-stream. The retry truncates back to the batch's start offset
/// so a half-written tail can never duplicate records.
fn append_records(
    writer: &mut BufWriter<File>,
    records: &[MatchupOutcome],
    format: ResultFormat,
    path: &str,
    batch_start: u64,
) -> SimResult<()> {
    match write_all_records(writer, records, format) {
        Ok(()) => Ok(()),
        Err(first_err) => {
            log::warn!("output append failed ({}), reopening {}", first_err, path);
            let mut file = OpenOptions::new().write(true).open(path)?;
            file.set_len(batch_start)?;
            file.seek(SeekFrom::Start(batch_start))?;
            let stale = std::mem::replace(writer, BufWriter::new(file));
            // Discard the stale buffer instead of flushing it into the
            // truncated file.
            let _ = stale.into_parts();
            write_all_records(writer, records, format)
        }
    }
}

fn write_all_records(
    writer: &mut BufWriter<File>,
    records: &[MatchupOutcome],
    format: ResultFormat,
) -> SimResult<()> {
    for record in records {
        record.encode(format, writer)?;
    }
    Ok(())
}
