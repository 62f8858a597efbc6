//! Build configuration
//!
//! `BuildConfig` carries the immutable input parameters of a build;
//! `IcfConfig` is the derived filter geometry that travels with the archive.

use std::path::PathBuf;

use crate::error::BuildError;
use crate::kmer::MAX_KMER_SIZE;

/// Immutable parameters of one build run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// K-mer length in bases (1..=32).
    pub kmer_size: u8,

    /// Minimizer window length in bases (>= kmer_size).
    pub window_size: u8,

    /// Sequences shorter than this many bases are skipped.
    pub min_length: usize,

    /// Target filter load factor, in (0, 1].
    pub load_factor: f64,

    /// Number of worker threads (0 = all available cores).
    pub threads: usize,

    /// Build mode ("normal" or "fast").
    pub mode: String,

    /// Manifest listing `<sequence-path> <taxid>` pairs, one per line.
    pub input_file: PathBuf,

    /// Output archive path.
    pub output_file: PathBuf,

    /// Directory for per-taxid scratch files; reset when counting starts.
    pub tmp_dir: PathBuf,

    /// Dump configuration and per-stage statistics.
    pub verbose: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            kmer_size: 19,
            window_size: 31,
            min_length: 0,
            load_factor: 0.95,
            threads: 0,
            mode: "normal".to_string(),
            input_file: PathBuf::new(),
            output_file: PathBuf::new(),
            tmp_dir: PathBuf::from("tmp"),
            verbose: false,
        }
    }
}

impl BuildConfig {
    /// Validate parameter ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.kmer_size == 0 || self.kmer_size > MAX_KMER_SIZE {
            return Err(BuildError::InvalidConfig(format!(
                "kmer_size must be in 1..={MAX_KMER_SIZE}, got {}",
                self.kmer_size
            )));
        }
        if self.window_size < self.kmer_size {
            return Err(BuildError::InvalidConfig(format!(
                "window_size ({}) must be >= kmer_size ({})",
                self.window_size, self.kmer_size
            )));
        }
        if !(self.load_factor > 0.0 && self.load_factor <= 1.0) {
            return Err(BuildError::InvalidConfig(format!(
                "load_factor must be in (0, 1], got {}",
                self.load_factor
            )));
        }
        if self.mode != "normal" && self.mode != "fast" {
            return Err(BuildError::InvalidConfig(format!(
                "mode must be \"normal\" or \"fast\", got {:?}",
                self.mode
            )));
        }
        Ok(())
    }

    /// Log the configuration via tracing.
    pub fn print(&self) {
        tracing::info!("Build configuration:");
        tracing::info!("  kmer_size = {}", self.kmer_size);
        tracing::info!("  window_size = {}", self.window_size);
        tracing::info!("  min_length = {}", self.min_length);
        tracing::info!("  load_factor = {}", self.load_factor);
        if self.threads == 0 {
            tracing::info!("  threads = all available cores");
        } else {
            tracing::info!("  threads = {}", self.threads);
        }
        tracing::debug!("  mode = {}", self.mode);
        tracing::info!("  input_file = {}", self.input_file.display());
        tracing::info!("  output_file = {}", self.output_file.display());
        tracing::debug!("  tmp_dir = {}", self.tmp_dir.display());
    }
}

/// Filter geometry derived during the build and stored in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcfConfig {
    /// K-mer length the minimizers were computed with.
    pub kmer_size: u8,
    /// Minimizer window length.
    pub window_size: u8,
    /// Total number of bins.
    pub bins: u64,
    /// Nominal capacity of one bin, in fingerprints.
    pub bin_size: u64,
}
