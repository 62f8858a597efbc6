//! Rolling-window minimizer extraction
//!
//! Every window of `window_size` bases contributes one minimizer: the
//! smallest seeded hash among the canonical forms of the window's
//! `window_size - kmer_size + 1` k-mers. Consecutive windows that share a
//! minimizer value emit it once.
//!
//! The window minimum is maintained with a rescan scheme: track the k-mer
//! index where the minimum occurs and rescan the window only when that index
//! slides out. Sliding in a new k-mer is otherwise a single comparison, with
//! the older occurrence winning ties.

use ahash::AHashSet;

use crate::encoding::encode_base_lossy;
use crate::hasher::MinimizerHasher;
use crate::kmer::RollingKmer;

/// Emit the minimizer of every window of `seq`, suppressing consecutive
/// duplicates. Sequences shorter than `window_size` emit nothing.
pub fn for_each_window_minimizer(
    seq: &[u8],
    kmer_size: u8,
    window_size: u8,
    hasher: &MinimizerHasher,
    mut emit: impl FnMut(u64),
) {
    let k = kmer_size as usize;
    let w = window_size as usize;
    debug_assert!(w >= k, "window_size must be >= kmer_size");
    if seq.len() < w {
        return;
    }

    let kmers_per_window = w - k + 1;
    let mut ring = vec![0u64; kmers_per_window];
    let mut roll = RollingKmer::new(kmer_size);

    let mut min_hash = u64::MAX;
    let mut min_kmer = 0usize;
    let mut last_emitted: Option<u64> = None;

    for (pos, &base) in seq.iter().enumerate() {
        roll.push(encode_base_lossy(base));
        if pos + 1 < k {
            continue;
        }

        // Index of the k-mer ending at `pos`
        let i = pos + 1 - k;
        let hash = hasher.hash(roll.canonical());
        ring[i % kmers_per_window] = hash;

        if i + 1 < kmers_per_window {
            continue;
        }
        let window_start = i + 1 - kmers_per_window;

        if i + 1 == kmers_per_window || min_kmer < window_start {
            // First window, or the minimum slid out: rescan
            min_hash = u64::MAX;
            for j in window_start..=i {
                let h = ring[j % kmers_per_window];
                if h < min_hash {
                    min_hash = h;
                    min_kmer = j;
                }
            }
        } else if hash < min_hash {
            min_hash = hash;
            min_kmer = i;
        }

        if last_emitted != Some(min_hash) {
            emit(min_hash);
            last_emitted = Some(min_hash);
        }
    }
}

/// Collect the distinct minimizer hashes of one sequence into `out`.
pub fn sequence_minimizers(
    seq: &[u8],
    kmer_size: u8,
    window_size: u8,
    hasher: &MinimizerHasher,
    out: &mut AHashSet<u64>,
) {
    for_each_window_minimizer(seq, kmer_size, window_size, hasher, |hash| {
        out.insert(hash);
    });
}
