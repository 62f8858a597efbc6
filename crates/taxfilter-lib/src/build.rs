//! Build pipeline orchestration (stage 5 and the `run` entry point)
//!
//! Stages run strictly in order: manifest parse, minimizer counting, filter
//! sizing, bin assignment, filter filling, archive write. Work inside a
//! stage is distributed dynamically over a scoped rayon pool sized to
//! `config.threads`.
//!
//! Filling is lock-free: bin ranges are disjoint by construction and the
//! filter tolerates concurrent writers on disjoint bins.

use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::archive;
use crate::assigner::{assign_taxid_bins, BinRange};
use crate::config::{BuildConfig, IcfConfig};
use crate::counter::{count_minimizers, scratch_path};
use crate::error::BuildError;
use crate::icf::InterleavedCuckooFilter;
use crate::manifest::{parse_manifest, FileInfo};
use crate::sizer::calculate_filter_size;

/// Summary of a completed build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Aggregate input statistics.
    pub file_info: FileInfo,
    /// Geometry of the filter that was written.
    pub icf_config: IcfConfig,
}

/// Run the full build pipeline.
///
/// Returns a summary on success. Recoverable input problems are logged and
/// absorbed; filter overflow and archive I/O failures abort with an error.
pub fn run(config: &BuildConfig) -> Result<BuildReport, BuildError> {
    config.validate()?;
    if config.verbose {
        config.print();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| BuildError::InvalidConfig(format!("failed to create thread pool: {e}")))?;
    pool.install(|| run_inner(config))
}

fn run_inner(config: &BuildConfig) -> Result<BuildReport, BuildError> {
    let build_start = Instant::now();
    let mut file_info = FileInfo::default();

    info!("Reading input manifest...");
    let parse_start = Instant::now();
    let manifest = parse_manifest(&config.input_file, &mut file_info);
    let mut hash_count = manifest.hash_count;
    debug!("Manifest parsed in {:.2?}", parse_start.elapsed());

    info!("Counting minimizers across {} files...", file_info.file_num);
    let count_start = Instant::now();
    count_minimizers(config, &manifest.input_files, &mut hash_count, &mut file_info)?;
    debug!("Minimizers counted in {:.2?}", count_start.elapsed());
    if config.verbose {
        info!("File information:");
        info!("  files: {}", file_info.file_num);
        info!("  invalid manifest lines: {}", file_info.invalid_num);
        info!("  sequences: {}", file_info.sequence_num);
        info!("  skipped sequences: {}", file_info.skipped_num);
        info!("  total bases: {}", file_info.bp_length);
    }

    info!("Calculating filter size...");
    let size_start = Instant::now();
    let size = calculate_filter_size(&hash_count, config.load_factor);
    debug!("Filter size chosen in {:.2?}", size_start.elapsed());
    info!(
        "Filter geometry: {} bins of capacity {}",
        size.bins, size.bin_size
    );

    let icf_config = IcfConfig {
        kmer_size: config.kmer_size,
        window_size: config.window_size,
        bins: size.bins,
        bin_size: size.bin_size,
    };

    info!("Creating filter...");
    let fill_start = Instant::now();
    let (ranges, taxid_bins) = assign_taxid_bins(&hash_count, size.bin_size);
    let icf = InterleavedCuckooFilter::new(size.bins, size.bin_size);
    fill_filter(&icf, &ranges, &config.tmp_dir)?;
    debug!("Filter filled in {:.2?}", fill_start.elapsed());

    // Linearize both maps in canonical range order so equal inputs produce
    // byte-identical archives
    let hash_count_pairs: Vec<(String, u64)> = ranges
        .iter()
        .map(|range| (range.taxid.clone(), hash_count[&range.taxid]))
        .collect();
    let taxid_bins_pairs: Vec<(String, u64)> = ranges
        .iter()
        .map(|range| (range.taxid.clone(), taxid_bins[&range.taxid]))
        .collect();

    info!("Saving index to {}...", config.output_file.display());
    archive::save(
        &config.output_file,
        &icf,
        &icf_config,
        &hash_count_pairs,
        &taxid_bins_pairs,
    )?;

    info!("Build finished in {:.2?}", build_start.elapsed());
    Ok(BuildReport {
        file_info,
        icf_config,
    })
}

/// Insert every scratch hash of every taxid into the taxid's bin range,
/// cycling through the range in file order. Scratch files are removed after
/// a successful pass; a missing scratch file only skips its taxid.
fn fill_filter(
    icf: &InterleavedCuckooFilter,
    ranges: &[BinRange],
    tmp_dir: &Path,
) -> Result<(), BuildError> {
    ranges.par_iter().try_for_each(|range| {
        if range.start == range.end {
            return Ok(());
        }
        let path = scratch_path(tmp_dir, &range.taxid);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    "Failed to open minimizer scratch file {}: {e}",
                    path.display()
                );
                return Ok(());
            }
        };

        let mut reader = BufReader::new(file);
        let mut word = [0u8; 8];
        let mut position = range.start;
        loop {
            match reader.read_exact(&mut word) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(BuildError::Io(e)),
            }
            icf.insert_tag(position, u64::from_le_bytes(word))?;
            position += 1;
            if position == range.end {
                position = range.start;
            }
        }
        drop(reader);

        if let Err(e) = fs::remove_file(&path) {
            warn!("Failed to remove scratch file {}: {e}", path.display());
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::HashCount;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn write_scratch(dir: &Path, taxid: &str, hashes: &[u64]) {
        let mut f = File::create(scratch_path(dir, taxid)).unwrap();
        for h in hashes {
            f.write_all(&h.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn test_fill_round_robins_across_range() {
        let dir = TempDir::new().unwrap();
        let hashes: Vec<u64> = (0..20).map(|i| crate::hasher::mix64(i)).collect();
        write_scratch(dir.path(), "t", &hashes);

        let icf = InterleavedCuckooFilter::new(4, 8);
        let ranges = vec![BinRange {
            taxid: "t".to_string(),
            start: 1,
            end: 4,
        }];
        fill_filter(&icf, &ranges, dir.path()).unwrap();

        // Hash i lands in bin 1 + (i mod 3)
        for (i, hash) in hashes.iter().enumerate() {
            let bin = 1 + (i as u64 % 3);
            assert!(icf.contains(bin, *hash), "hash {i} missing from bin {bin}");
        }
        // Scratch is consumed
        assert!(!scratch_path(dir.path(), "t").exists());
        // Bin 0 belongs to nobody and stays empty
        assert!(hashes.iter().all(|h| !icf.contains(0, *h)));
    }

    #[test]
    fn test_fill_missing_scratch_skips_taxid() {
        let dir = TempDir::new().unwrap();
        let icf = InterleavedCuckooFilter::new(2, 4);
        let ranges = vec![BinRange {
            taxid: "absent".to_string(),
            start: 0,
            end: 2,
        }];
        fill_filter(&icf, &ranges, dir.path()).unwrap();
        assert_eq!(icf.occupied_slots(), 0);
    }

    #[test]
    fn test_fill_skips_empty_ranges() {
        let dir = TempDir::new().unwrap();
        // A zero-width range must not even try to open its scratch file
        let icf = InterleavedCuckooFilter::new(1, 4);
        let ranges = vec![BinRange {
            taxid: "zero".to_string(),
            start: 0,
            end: 0,
        }];
        fill_filter(&icf, &ranges, dir.path()).unwrap();
        assert_eq!(icf.occupied_slots(), 0);
    }

    #[test]
    fn test_run_rejects_invalid_config() {
        let config = BuildConfig {
            kmer_size: 0,
            ..BuildConfig::default()
        };
        assert!(matches!(run(&config), Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn test_run_empty_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("manifest.txt");
        std::fs::write(&manifest, "").unwrap();

        let config = BuildConfig {
            kmer_size: 7,
            window_size: 11,
            input_file: manifest,
            output_file: dir.path().join("index.txf"),
            tmp_dir: dir.path().join("tmp"),
            threads: 1,
            ..BuildConfig::default()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.file_info, FileInfo::default());
        assert_eq!(report.icf_config.bins, 0);
        assert_eq!(report.icf_config.bin_size, 1);

        let archive = archive::load(&config.output_file).unwrap();
        assert_eq!(archive.config.bins, 0);
        assert!(archive.hash_count.is_empty());
    }

    #[test]
    fn test_range_widths_match_counts() {
        // Sanity check tying sizer and assigner together the way run() does
        let mut hash_count = HashCount::default();
        hash_count.insert("a".to_string(), 100);
        hash_count.insert("b".to_string(), 1);

        let size = calculate_filter_size(&hash_count, 0.95);
        let (ranges, _) = assign_taxid_bins(&hash_count, size.bin_size);
        for range in &ranges {
            assert_eq!(
                range.end - range.start,
                hash_count[&range.taxid].div_ceil(size.bin_size)
            );
        }
        assert_eq!(ranges.last().unwrap().end, size.bins);
    }
}
