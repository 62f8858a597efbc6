//! Filter sizing (stage 3)
//!
//! Picks a single bin capacity by binary search so that the overall load
//! `total / (bins * bin_size)` comes as close to the target as possible
//! without exceeding it. Each feasible candidate is recorded and the search
//! continues toward smaller bin sizes, whose load sits closer to the target
//! from below; the last recorded candidate wins.

use rayon::prelude::*;
use tracing::debug;

use crate::manifest::HashCount;

/// Chosen filter geometry: `(bins, bin_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSize {
    /// Total number of bins, summed as `ceil(count / bin_size)` per taxid.
    pub bins: u64,
    /// Capacity of one bin, in fingerprints.
    pub bin_size: u64,
}

/// Total bins needed for `counts` at a candidate bin size.
fn total_bins(counts: &[u64], bin_size: u64) -> u64 {
    counts
        .par_iter()
        .map(|count| count.div_ceil(bin_size))
        .sum()
}

/// Choose `bins` and `bin_size` for the given per-taxid counts and target
/// load factor.
///
/// Degenerate input (no taxids, or all counts zero) yields an empty filter:
/// `bin_size = 1, bins = 0`.
pub fn calculate_filter_size(hash_count: &HashCount, load_factor: f64) -> FilterSize {
    let counts: Vec<u64> = hash_count.values().copied().collect();
    let total: u64 = counts.iter().sum();
    let max = counts.iter().copied().max().unwrap_or(0);
    if total == 0 {
        return FilterSize { bins: 0, bin_size: 1 };
    }

    let mut lo = 1u64;
    let mut hi = max * 2;
    let mut best: Option<FilterSize> = None;

    loop {
        while lo <= hi {
            let bin_size = lo + (hi - lo) / 2;
            let bins = total_bins(&counts, bin_size);
            let load = total as f64 / (bins * bin_size) as f64;
            debug!("sizer candidate bin_size={bin_size} bins={bins} load={load:.4}");

            if load > load_factor {
                lo = bin_size + 1;
            } else {
                best = Some(FilterSize { bins, bin_size });
                if load == load_factor {
                    return best.unwrap();
                }
                hi = bin_size - 1;
            }
        }
        if let Some(best) = best {
            return best;
        }
        // No candidate in [1, 2*max] met the target (possible for small
        // load factors). For bin sizes past the maximum count the load is
        // total / (nonzero_taxids * bin_size), strictly decreasing, so
        // widening the range always terminates.
        lo = hi + 1;
        hi = hi.saturating_mul(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> HashCount {
        pairs
            .iter()
            .map(|&(taxid, count)| (taxid.to_string(), count))
            .collect()
    }

    fn load(total: u64, size: FilterSize) -> f64 {
        total as f64 / (size.bins * size.bin_size) as f64
    }

    #[test]
    fn test_degenerate_all_zero() {
        let size = calculate_filter_size(&counts(&[("a", 0), ("b", 0)]), 0.95);
        assert_eq!(size, FilterSize { bins: 0, bin_size: 1 });

        let size = calculate_filter_size(&HashCount::default(), 0.95);
        assert_eq!(size, FilterSize { bins: 0, bin_size: 1 });
    }

    #[test]
    fn test_single_taxid_half_load() {
        // One taxid with a million hashes at load 0.5: the search lands on
        // bin_size = 2M with a single bin, hitting the target exactly
        let size = calculate_filter_size(&counts(&[("x", 1_000_000)]), 0.5);
        assert!(size.bins * size.bin_size >= 2_000_000);
        assert_eq!(load(1_000_000, size), 0.5);
    }

    #[test]
    fn test_two_unit_counts() {
        // Counts {1, 1}: bins is always 2; bin_size 1 is feasible only at
        // load factor 1.0
        let size = calculate_filter_size(&counts(&[("a", 1), ("b", 1)]), 1.0);
        assert_eq!(size, FilterSize { bins: 2, bin_size: 1 });

        let size = calculate_filter_size(&counts(&[("a", 1), ("b", 1)]), 0.95);
        assert_eq!(size.bins, 2);
        assert!(load(2, size) <= 0.95);
    }

    #[test]
    fn test_load_never_exceeds_target() {
        let hc = counts(&[("a", 1000), ("b", 250), ("c", 45), ("d", 77)]);
        for target in [0.3, 0.5, 0.75, 0.95, 1.0] {
            let size = calculate_filter_size(&hc, target);
            let total: u64 = hc.values().sum();
            assert!(
                load(total, size) <= target + f64::EPSILON,
                "load {} exceeds target {target}",
                load(total, size)
            );
        }
    }

    #[test]
    fn test_feasible_smaller_sizes_use_more_bins() {
        let hc = counts(&[("a", 100), ("b", 300), ("c", 50)]);
        let total: u64 = hc.values().sum();
        let target = 0.9;
        let size = calculate_filter_size(&hc, target);
        assert!(load(total, size) <= target);

        // Any smaller bin_size that is feasible gives at least as many bins
        for smaller in 1..size.bin_size {
            let bins: u64 = hc.values().map(|c| c.div_ceil(smaller)).sum();
            let l = total as f64 / (bins * smaller) as f64;
            if l <= target {
                assert!(bins >= size.bins);
            }
        }
    }

    #[test]
    fn test_small_load_factor_widens_search() {
        // load 0.1 with a single taxid cannot be met inside [1, 2*max]
        let size = calculate_filter_size(&counts(&[("x", 100)]), 0.1);
        assert!(load(100, size) <= 0.1);
        assert!(size.bin_size >= 1000);
    }
}
