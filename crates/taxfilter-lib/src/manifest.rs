//! Manifest parsing
//!
//! The manifest is UTF-8 text with one `<sequence-path> <taxid>` entry per
//! line (extra tokens ignored). Parsing is forgiving: malformed lines are
//! counted and skipped, and an unopenable manifest yields an empty result
//! with a diagnostic rather than an error.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use tracing::warn;

/// Taxid -> ordered list of sequence file paths.
pub type InputFiles = AHashMap<String, Vec<PathBuf>>;

/// Taxid -> total minimizer count (sum of per-file distinct set sizes).
pub type HashCount = AHashMap<String, u64>;

/// Taxid -> exclusive end of the taxid's bin range.
pub type TaxidBins = AHashMap<String, u64>;

/// Aggregate input statistics, accumulated across stages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Valid manifest entries.
    pub file_num: u64,
    /// Malformed manifest lines.
    pub invalid_num: u64,
    /// Sequences long enough to contribute minimizers.
    pub sequence_num: u64,
    /// Sequences below the minimum length.
    pub skipped_num: u64,
    /// Total bases across counted sequences.
    pub bp_length: u64,
}

impl FileInfo {
    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &FileInfo) {
        self.file_num += other.file_num;
        self.invalid_num += other.invalid_num;
        self.sequence_num += other.sequence_num;
        self.skipped_num += other.skipped_num;
        self.bp_length += other.bp_length;
    }
}

/// Parsed manifest: the file lists and zero-initialized hash counts.
#[derive(Debug, Default)]
pub struct Manifest {
    /// Taxid -> sequence files, in manifest order.
    pub input_files: InputFiles,
    /// Taxid -> 0, one entry per taxid seen.
    pub hash_count: HashCount,
}

/// Parse the manifest at `path`, updating `file_info` counters.
///
/// A valid line has at least two whitespace-separated tokens: a path and a
/// taxid. Anything else (including blank lines) increments `invalid_num`.
pub fn parse_manifest(path: &Path, file_info: &mut FileInfo) -> Manifest {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to open manifest {}: {e}", path.display());
            return Manifest::default();
        }
    };

    let mut manifest = Manifest::default();
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to read manifest line: {e}");
                file_info.invalid_num += 1;
                continue;
            }
        };
        let mut tokens = line.split_whitespace();
        let (Some(seq_path), Some(taxid)) = (tokens.next(), tokens.next()) else {
            warn!("Failed to parse manifest line: {line:?}");
            file_info.invalid_num += 1;
            continue;
        };
        manifest.hash_count.entry(taxid.to_string()).or_insert(0);
        manifest
            .input_files
            .entry(taxid.to_string())
            .or_default()
            .push(PathBuf::from(seq_path));
        file_info.file_num += 1;
    }
    manifest
}
