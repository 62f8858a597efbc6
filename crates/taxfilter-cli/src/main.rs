use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taxfilter_lib::{archive, BuildConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "taxfilter")]
#[command(version = "0.1.0")]
#[command(about = "Taxid-partitioned minimizer membership index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from a manifest of sequence files
    Build {
        /// Manifest file: one "<sequence-path> <taxid>" pair per line
        #[arg(short, long)]
        input: PathBuf,

        /// Output index file
        #[arg(short, long)]
        output: PathBuf,

        /// K-mer length (1-32)
        #[arg(short, long, default_value = "19")]
        kmer_size: u8,

        /// Minimizer window length (>= k-mer length)
        #[arg(short, long, default_value = "31")]
        window_size: u8,

        /// Skip sequences shorter than this many bases
        #[arg(short = 'l', long, default_value = "0")]
        min_length: usize,

        /// Target filter load factor, in (0, 1]
        #[arg(short = 'f', long, default_value = "0.95")]
        load_factor: f64,

        /// Number of threads (0 = all available cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,

        /// Build mode: "normal" or "fast"
        #[arg(short, long, default_value = "normal")]
        mode: String,

        /// Directory for per-taxid scratch files
        #[arg(long, default_value = "tmp")]
        tmp_dir: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the contents of an index archive
    Inspect {
        /// Index file to inspect
        #[arg(short, long)]
        index: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            kmer_size,
            window_size,
            min_length,
            load_factor,
            threads,
            mode,
            tmp_dir,
            verbose,
        } => build_command(BuildConfig {
            kmer_size,
            window_size,
            min_length,
            load_factor,
            threads,
            mode,
            input_file: input,
            output_file: output,
            tmp_dir,
            verbose,
        }),
        Commands::Inspect { index } => inspect_command(index),
    }
}

fn build_command(config: BuildConfig) -> anyhow::Result<()> {
    let report = taxfilter_lib::run(&config)?;

    println!("Build summary:");
    println!("  files: {}", report.file_info.file_num);
    println!("  invalid manifest lines: {}", report.file_info.invalid_num);
    println!("  sequences: {}", report.file_info.sequence_num);
    println!("  skipped sequences: {}", report.file_info.skipped_num);
    println!("  total bases: {}", report.file_info.bp_length);
    println!(
        "  filter: {} bins x {} capacity",
        report.icf_config.bins, report.icf_config.bin_size
    );

    let archive_size = std::fs::metadata(&config.output_file)?.len();
    println!("  index file size: {}", format_size(archive_size));

    Ok(())
}

fn inspect_command(index: PathBuf) -> anyhow::Result<()> {
    info!("Loading index from {}...", index.display());
    let archive = archive::load(&index)?;

    println!("Index configuration:");
    println!("  kmer_size: {}", archive.config.kmer_size);
    println!("  window_size: {}", archive.config.window_size);
    println!("  bins: {}", archive.config.bins);
    println!("  bin_size: {}", archive.config.bin_size);
    println!("  taxids: {}", archive.hash_count.len());

    let bins: std::collections::HashMap<&str, u64> = archive
        .taxid_bins
        .iter()
        .map(|(taxid, end)| (taxid.as_str(), *end))
        .collect();

    println!("\n  {:<24} {:>14} {:>12}", "taxid", "minimizers", "range end");
    for (taxid, count) in &archive.hash_count {
        let end = bins.get(taxid.as_str()).copied().unwrap_or(0);
        println!("  {taxid:<24} {count:>14} {end:>12}");
    }

    Ok(())
}

/// Format a byte count as B/KB/MB/GB.
fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.2} KB", b / KB)
    } else {
        format!("{bytes} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
