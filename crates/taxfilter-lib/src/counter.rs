//! Minimizer counting (stage 2)
//!
//! Every (taxid, file) pair is processed in parallel: the file's sequences
//! are streamed, the distinct minimizer hashes of the whole file are
//! collected, and the set is appended to the taxid's scratch file as raw
//! little-endian u64 words. Each worker carries thread-local `FileInfo` and
//! hash-count deltas that are merged when the parallel region drains.
//!
//! A taxid with several files gets one appended block per file; the scratch
//! file is therefore the multiset union of per-file distinct sets, and
//! `hash_count[taxid]` the sum of their sizes. Appends to the same scratch
//! file are serialized by a per-taxid mutex pre-populated from the known
//! taxid set, so the map itself is never written inside the parallel region.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use ahash::{AHashMap, AHashSet};
use anyhow::Context;
use needletail::parse_fastx_file;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::hasher::MinimizerHasher;
use crate::manifest::{FileInfo, HashCount, InputFiles};
use crate::minimizer::sequence_minimizers;

/// Scratch file name for one taxid.
pub fn scratch_path(tmp_dir: &Path, taxid: &str) -> std::path::PathBuf {
    tmp_dir.join(format!("{taxid}.mini"))
}

/// Remove and recreate the scratch directory.
fn reset_scratch_dir(tmp_dir: &Path) -> Result<(), BuildError> {
    if tmp_dir.exists() {
        fs::remove_dir_all(tmp_dir)?;
        debug!("Removed existing scratch directory {}", tmp_dir.display());
    }
    fs::create_dir_all(tmp_dir)?;
    Ok(())
}

/// Count minimizers for every (taxid, file) pair, updating `hash_count` and
/// `file_info` and filling the scratch directory.
pub fn count_minimizers(
    config: &BuildConfig,
    input_files: &InputFiles,
    hash_count: &mut HashCount,
    file_info: &mut FileInfo,
) -> Result<(), BuildError> {
    reset_scratch_dir(&config.tmp_dir)?;

    // Flatten to (taxid, file) pairs in a stable order: sorted taxids, each
    // taxid's files in manifest order. With one worker this makes the
    // scratch layout reproducible.
    let mut taxids: Vec<&String> = input_files.keys().collect();
    taxids.sort_unstable();
    let pairs: Vec<(&str, &Path)> = taxids
        .iter()
        .flat_map(|taxid| {
            input_files[*taxid]
                .iter()
                .map(move |path| (taxid.as_str(), path.as_path()))
        })
        .collect();

    // Per-taxid append locks, populated before any worker runs.
    let scratch_locks: AHashMap<&str, Mutex<()>> = taxids
        .iter()
        .map(|taxid| (taxid.as_str(), Mutex::new(())))
        .collect();

    let hasher = MinimizerHasher::new(config.kmer_size);

    let (delta, stage_info) = pairs
        .par_iter()
        .fold(
            || (AHashMap::<&str, u64>::new(), FileInfo::default()),
            |(mut delta, mut info), &(taxid, path)| {
                let hashes = match file_minimizer_hashes(path, config, &hasher, &mut info) {
                    Ok(hashes) => hashes,
                    Err(e) => {
                        warn!("Skipping sequence file {}: {e:#}", path.display());
                        return (delta, info);
                    }
                };
                *delta.entry(taxid).or_insert(0) += hashes.len() as u64;

                let _guard = scratch_locks[taxid].lock().expect("scratch lock poisoned");
                if let Err(e) = append_scratch(&config.tmp_dir, taxid, &hashes) {
                    warn!("Unable to append scratch file for taxid {taxid}: {e}");
                }
                (delta, info)
            },
        )
        .reduce(
            || (AHashMap::new(), FileInfo::default()),
            |(mut delta_a, mut info_a), (delta_b, info_b)| {
                for (taxid, count) in delta_b {
                    *delta_a.entry(taxid).or_insert(0) += count;
                }
                info_a.merge(&info_b);
                (delta_a, info_a)
            },
        );

    for (taxid, count) in delta {
        *hash_count.get_mut(taxid).expect("taxid known from manifest") += count;
    }
    file_info.merge(&stage_info);
    Ok(())
}

/// Stream one sequence file and collect its distinct minimizer hashes,
/// sorted for a reproducible scratch layout.
fn file_minimizer_hashes(
    path: &Path,
    config: &BuildConfig,
    hasher: &MinimizerHasher,
    info: &mut FileInfo,
) -> anyhow::Result<Vec<u64>> {
    let mut reader = parse_fastx_file(path)
        .with_context(|| format!("failed to open sequence file {}", path.display()))?;

    let mut set = AHashSet::new();
    while let Some(record) = reader.next() {
        let record = record
            .with_context(|| format!("failed to parse record in {}", path.display()))?;
        let seq = record.seq();
        if seq.len() < config.min_length {
            info.skipped_num += 1;
            continue;
        }
        info.sequence_num += 1;
        info.bp_length += seq.len() as u64;
        sequence_minimizers(&seq, config.kmer_size, config.window_size, hasher, &mut set);
    }

    let mut hashes: Vec<u64> = set.into_iter().collect();
    hashes.sort_unstable();
    Ok(hashes)
}

/// Append a batch of hashes to the taxid's scratch file.
fn append_scratch(tmp_dir: &Path, taxid: &str, hashes: &[u64]) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(scratch_path(tmp_dir, taxid))?;
    let mut writer = BufWriter::new(file);
    for hash in hashes {
        writer.write_all(&hash.to_le_bytes())?;
    }
    writer.flush()
}
