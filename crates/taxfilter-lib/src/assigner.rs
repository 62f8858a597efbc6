//! Bin range assignment (stage 4)
//!
//! Gives every taxid a contiguous half-open bin range `[start, end)` whose
//! width is `ceil(count / bin_size)`. Taxids are laid out in lexicographic
//! order, so the taxid -> range mapping is identical across runs and thread
//! counts. Range ends are an inclusive prefix sum of the widths, computed
//! with a chunked parallel scan: per-chunk local prefixes, an exclusive
//! prefix over the chunk totals, then a parallel offset add.

use rayon::prelude::*;

use crate::manifest::{HashCount, TaxidBins};

/// One taxid's assigned range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinRange {
    /// Taxid owning the range.
    pub taxid: String,
    /// First bin (inclusive).
    pub start: u64,
    /// Last bin (exclusive); equals the next taxid's start.
    pub end: u64,
}

/// Assign bin ranges for every taxid.
///
/// Returns the ranges in canonical (lexicographic) taxid order together
/// with the `taxid -> end` map that is persisted in the archive. The last
/// range's `end` equals the total bin count.
pub fn assign_taxid_bins(hash_count: &HashCount, bin_size: u64) -> (Vec<BinRange>, TaxidBins) {
    debug_assert!(bin_size >= 1);

    let mut taxids: Vec<(&String, u64)> = hash_count
        .iter()
        .map(|(taxid, &count)| (taxid, count))
        .collect();
    taxids.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let widths: Vec<u64> = taxids
        .par_iter()
        .map(|&(_, count)| count.div_ceil(bin_size))
        .collect();

    let ends = parallel_inclusive_prefix_sum(widths);

    let mut ranges = Vec::with_capacity(taxids.len());
    let mut previous_end = 0;
    for (&(taxid, _), &end) in taxids.iter().zip(&ends) {
        ranges.push(BinRange {
            taxid: taxid.clone(),
            start: previous_end,
            end,
        });
        previous_end = end;
    }

    let taxid_bins: TaxidBins = ranges
        .iter()
        .map(|range| (range.taxid.clone(), range.end))
        .collect();
    (ranges, taxid_bins)
}

/// Inclusive prefix sum over near-equal chunks, one per pool thread.
fn parallel_inclusive_prefix_sum(mut values: Vec<u64>) -> Vec<u64> {
    if values.is_empty() {
        return values;
    }
    let num_chunks = rayon::current_num_threads().max(1);
    let chunk_len = values.len().div_ceil(num_chunks);

    // Local inclusive prefix per chunk; collect each chunk's total
    let chunk_totals: Vec<u64> = values
        .par_chunks_mut(chunk_len)
        .map(|chunk| {
            let mut running = 0u64;
            for value in chunk.iter_mut() {
                running += *value;
                *value = running;
            }
            running
        })
        .collect();

    // Exclusive prefix of the chunk totals
    let mut offsets = Vec::with_capacity(chunk_totals.len());
    let mut running = 0u64;
    for total in &chunk_totals {
        offsets.push(running);
        running += total;
    }

    // Add each chunk's offset
    values
        .par_chunks_mut(chunk_len)
        .zip(offsets.par_iter())
        .for_each(|(chunk, &offset)| {
            for value in chunk.iter_mut() {
                *value += offset;
            }
        });

    values
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

    #[test]
    fn test_prefix_sum_matches_sequential() {
        let values: Vec<u64> = (0..1000).map(|i| (i * 7 + 3) % 41).collect();
        let mut expect = values.clone();
        let mut running = 0;
        for value in &mut expect {
            running += *value;
            *value = running;
        }
        assert_eq!(parallel_inclusive_prefix_sum(values), expect);
    }

    #[test]
    fn test_prefix_sum_empty() {
        assert!(parallel_inclusive_prefix_sum(Vec::new()).is_empty());
    }

    #[test]
    fn test_ranges_are_contiguous_and_ordered() {
        let hc = counts(&[("b", 10), ("a", 25), ("c", 1)]);
        let (ranges, taxid_bins) = assign_taxid_bins(&hc, 10);

        // Lexicographic order: a, b, c
        assert_eq!(ranges[0].taxid, "a");
        assert_eq!(ranges[1].taxid, "b");
        assert_eq!(ranges[2].taxid, "c");

        // Widths are ceil(count / bin_size): 3, 1, 1
        assert_eq!((ranges[0].start, ranges[0].end), (0, 3));
        assert_eq!((ranges[1].start, ranges[1].end), (3, 4));
        assert_eq!((ranges[2].start, ranges[2].end), (4, 5));

        assert_eq!(taxid_bins["a"], 3);
        assert_eq!(taxid_bins["b"], 4);
        assert_eq!(taxid_bins["c"], 5);
    }

    #[test]
    fn test_zero_count_taxid_gets_empty_range() {
        let hc = counts(&[("a", 0), ("b", 7)]);
        let (ranges, _) = assign_taxid_bins(&hc, 4);
        assert_eq!((ranges[0].start, ranges[0].end), (0, 0));
        assert_eq!((ranges[1].start, ranges[1].end), (0, 2));
    }

    #[test]
    fn test_last_end_is_total_bins() {
        let hc = counts(&[("x", 100), ("y", 51), ("z", 3)]);
        let bin_size = 10;
        let (ranges, _) = assign_taxid_bins(&hc, bin_size);
        let total: u64 = hc.values().map(|c| c.div_ceil(bin_size)).sum();
        assert_eq!(ranges.last().unwrap().end, total);
    }

    #[test]
    fn test_deterministic_across_calls() {
        let hc = counts(&[("t3", 9), ("t1", 14), ("t2", 2)]);
        let (r1, b1) = assign_taxid_bins(&hc, 5);
        let (r2, b2) = assign_taxid_bins(&hc, 5);
        assert_eq!(r1, r2);
        assert_eq!(b1, b2);
    }
}
