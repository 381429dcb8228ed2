//! Batch driver properties: determinism, ordering, resume, chunk merge.

mod common;

use common::{batch_config, read_file, small_catalog};
use grimdark_sim::aggregate;
use grimdark_sim::chunks::ChunkManifest;
use grimdark_sim::formats::{FileHeader, MatchupOutcome, RESULT_HEADER_LEN};
use grimdark_sim::{BatchSimulator, ResultFormat, RunStatus};
use std::fs::File;
use std::io::BufReader;

/// Byte-exact output independent of thread count (same seed, same batches).
#[test]
fn output_is_independent_of_thread_count() {
    let (catalog, registry) = small_catalog();

    let dir_one = tempfile::tempdir().unwrap();
    let config_one = batch_config(dir_one.path(), ResultFormat::Compact, 1);
    let sim_one = BatchSimulator::new(config_one.clone()).unwrap();
    assert_eq!(
        sim_one.simulate_all(&catalog, &registry, None, false).unwrap(),
        RunStatus::Completed
    );

    let dir_four = tempfile::tempdir().unwrap();
    let config_four = batch_config(dir_four.path(), ResultFormat::Compact, 4);
    let sim_four = BatchSimulator::new(config_four.clone()).unwrap();
    assert_eq!(
        sim_four.simulate_all(&catalog, &registry, None, false).unwrap(),
        RunStatus::Completed
    );

    assert_eq!(
        read_file(&config_one.output_file),
        read_file(&config_four.output_file)
    );
}

/// Record at offset `header + (i*n + j)*size` carries ids `(i, j)`.
#[test]
fn records_land_in_pair_index_order() {
    let (catalog, registry) = small_catalog();
    let dir = tempfile::tempdir().unwrap();
    let config = batch_config(dir.path(), ResultFormat::Extended, 2);
    let sim = BatchSimulator::new(config.clone()).unwrap();
    sim.simulate_all(&catalog, &registry, None, false).unwrap();

    let n = catalog.units.len() as u64;
    let file = File::open(&config.output_file).unwrap();
    assert_eq!(
        file.metadata().unwrap().len(),
        RESULT_HEADER_LEN + n * n * ResultFormat::Extended.record_size()
    );

    let mut reader = BufReader::new(file);
    let header = FileHeader::read_from(&mut reader).unwrap();
    assert_eq!(header.units_a, n as u32);
    for i in 0..n {
        for j in 0..n {
            let record = MatchupOutcome::decode(header.format, &mut reader).unwrap();
            assert_eq!((record.attacker_id, record.defender_id), (i as u16, j as u16));
        }
    }
}

/// A half-run plus a resumed run produces the same bytes as one full run.
#[test]
fn resume_reproduces_an_uninterrupted_run() {
    let (catalog, registry) = small_catalog();
    let n = catalog.units.len() as u64;

    // Reference: one uninterrupted run.
    let full_dir = tempfile::tempdir().unwrap();
    let full_config = batch_config(full_dir.path(), ResultFormat::Compact, 2);
    let full_sim = BatchSimulator::new(full_config.clone()).unwrap();
    full_sim.simulate_all(&catalog, &registry, None, false).unwrap();
    let expected = read_file(&full_config.output_file);

    // Interrupted: run only the first half of the pair space, leaving the
    // file and checkpoint exactly as a killed run would.
    let dir = tempfile::tempdir().unwrap();
    let config = batch_config(dir.path(), ResultFormat::Compact, 2);
    let half = (n * n) / 2;
    assert_eq!(half % config.batch_size, 0, "fixture must align to batches");
    let partial_sim = BatchSimulator::new(config.clone()).unwrap();
    partial_sim
        .run_range(&catalog, &registry, 0, half, &config.output_file, None, false)
        .unwrap();

    // Resume to completion and compare bytes.
    let resumed_sim = BatchSimulator::new(config.clone()).unwrap();
    let status = resumed_sim
        .simulate_all(&catalog, &registry, None, true)
        .unwrap();
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(read_file(&config.output_file), expected);
}

/// Chunks processed in reverse id order merge into the single-run output.
#[test]
fn chunk_merge_matches_a_single_run() {
    let (catalog, registry) = small_catalog();
    let n = catalog.units.len() as u64;

    let full_dir = tempfile::tempdir().unwrap();
    let full_config = batch_config(full_dir.path(), ResultFormat::Compact, 2);
    let full_sim = BatchSimulator::new(full_config.clone()).unwrap();
    full_sim.simulate_all(&catalog, &registry, None, false).unwrap();
    let expected = read_file(&full_config.output_file);

    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("part").to_string_lossy().into_owned();
    let mut manifest = ChunkManifest::plan(
        n,
        3,
        full_config.master_seed,
        ResultFormat::Compact,
        full_config.batch_size,
        &prefix,
    )
    .unwrap();

    for chunk in manifest.chunks.clone().iter().rev() {
        let config = grimdark_sim::BatchConfig {
            output_file: chunk.output_file.clone(),
            checkpoint_file: format!("{}.ckpt", chunk.output_file),
            ..batch_config(dir.path(), ResultFormat::Compact, 2)
        };
        let sim = BatchSimulator::new(config).unwrap();
        sim.run_range(
            &catalog,
            &registry,
            chunk.pair_lo,
            chunk.pair_hi,
            &chunk.output_file,
            None,
            false,
        )
        .unwrap();
        manifest.mark_done(chunk.chunk_id).unwrap();
    }

    let merged = dir.path().join("merged.bin");
    manifest.merge(&merged).unwrap();
    assert_eq!(std::fs::read(&merged).unwrap(), expected);
}

/// Reducing an Extended run reproduces a direct Aggregated run, byte for
/// byte.
#[test]
fn aggregated_direct_write_matches_reduce_pass() {
    let (catalog, registry) = small_catalog();
    let n = catalog.units.len() as u32;

    let extended_dir = tempfile::tempdir().unwrap();
    let extended_config = batch_config(extended_dir.path(), ResultFormat::Extended, 2);
    let extended_sim = BatchSimulator::new(extended_config.clone()).unwrap();
    extended_sim
        .simulate_all(&catalog, &registry, None, false)
        .unwrap();

    let (_, reduced) = aggregate::reduce_file(&extended_config.output_file).unwrap();
    let reduced_path = extended_dir.path().join("reduced.bin");
    aggregate::write_aggregated_file(&reduced_path, n, n, &reduced).unwrap();

    let direct_dir = tempfile::tempdir().unwrap();
    let direct_config = batch_config(direct_dir.path(), ResultFormat::Aggregated, 2);
    let direct_sim = BatchSimulator::new(direct_config.clone()).unwrap();
    direct_sim
        .simulate_all(&catalog, &registry, None, false)
        .unwrap();

    assert_eq!(
        std::fs::read(&reduced_path).unwrap(),
        read_file(&direct_config.output_file)
    );
}

/// Progress reports are monotone and bounded by the total.
#[test]
fn progress_is_monotone() {
    let (catalog, registry) = small_catalog();
    let dir = tempfile::tempdir().unwrap();
    let config = batch_config(dir.path(), ResultFormat::Compact, 2);
    let total = (catalog.units.len() * catalog.units.len()) as u64;

    let mut seen = Vec::new();
    let mut callback = |info: &grimdark_sim::progress::ProgressInfo| {
        seen.push((info.completed, info.total));
    };
    let sim = BatchSimulator::new(config).unwrap();
    sim.simulate_all(&catalog, &registry, Some(&mut callback), false)
        .unwrap();

    assert!(!seen.is_empty());
    let mut last = 0;
    for (completed, reported_total) in seen {
        assert_eq!(reported_total, total);
        assert!(completed >= last, "progress went backwards");
        assert!(completed <= total);
        last = completed;
    }
}

/// A corrupt checkpoint degrades to a fresh start instead of failing.
#[test]
fn corrupt_checkpoint_starts_fresh() {
    let (catalog, registry) = small_catalog();
    let dir = tempfile::tempdir().unwrap();
    let config = batch_config(dir.path(), ResultFormat::Compact, 2);

    let sim = BatchSimulator::new(config.clone()).unwrap();
    sim.simulate_all(&catalog, &registry, None, false).unwrap();
    let expected = read_file(&config.output_file);

    // Flip a byte in the checkpoint and resume; the run must start over
    // and still produce identical output.
    let mut bytes = std::fs::read(&config.checkpoint_file).unwrap();
    bytes[12] ^= 0xFF;
    std::fs::write(&config.checkpoint_file, &bytes).unwrap();

    let sim = BatchSimulator::new(config.clone()).unwrap();
    let status = sim.simulate_all(&catalog, &registry, None, true).unwrap();
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(read_file(&config.output_file), expected);
}
