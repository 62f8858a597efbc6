//! Interleaved Cuckoo Filter
//!
//! An array of small cuckoo tables ("bins") over one flat tag store. Each
//! bin holds up to `bin_size` 16-bit fingerprints in `buckets_per_bin`
//! buckets of [`SLOTS_PER_BUCKET`] slots; `buckets_per_bin` is rounded up to
//! a power of two so the alternate bucket of a fingerprint is an XOR away.
//! A fingerprint lives in one of two candidate buckets of its bin; insertion
//! evicts residents for at most [`MAX_EVICTIONS`] hops before giving up.
//!
//! Tag slots are atomics with relaxed ordering. Callers that partition the
//! bin space (one writer per bin range) get race-free concurrent insertion
//! without locks; the filter itself never synchronizes writers that share a
//! bin.
//!
//! Successful insertion guarantees no false negatives: `contains(bin, hash)`
//! is true for every hash accepted by `insert_tag(bin, hash)`.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU16, Ordering};

use crate::error::BuildError;
use crate::hasher::mix64;

/// Tag slots per cuckoo bucket.
pub const SLOTS_PER_BUCKET: usize = 4;

/// Eviction hops before an insertion is reported as failed.
pub const MAX_EVICTIONS: usize = 500;

/// Tag value marking an empty slot.
const EMPTY_TAG: u16 = 0;

/// Interleaved cuckoo filter with `bins` independent bin ranges.
#[derive(Debug)]
pub struct InterleavedCuckooFilter {
    bins: u64,
    bin_size: u64,
    buckets_per_bin: u64,
    tags: Vec<AtomicU16>,
}

/// Fingerprint and candidate bucket of a hash within a bin.
#[inline]
fn fingerprint_and_bucket(hash: u64, bucket_mask: u64) -> (u16, u64) {
    let h = mix64(hash);
    let mut fp = (h & 0xFFFF) as u16;
    if fp == EMPTY_TAG {
        fp = 1;
    }
    let bucket = (h >> 16) & bucket_mask;
    (fp, bucket)
}

/// The other candidate bucket for a fingerprint.
#[inline]
fn alternate_bucket(bucket: u64, fp: u16, bucket_mask: u64) -> u64 {
    bucket ^ (mix64(fp as u64) & bucket_mask)
}

impl InterleavedCuckooFilter {
    /// Allocate a filter of `bins` bins, each sized for `bin_size` entries.
    ///
    /// Every bin gets at least one bucket of slack beyond the nominal
    /// capacity; cuckoo placement needs headroom to stay under the eviction
    /// limit at full nominal load.
    ///
    /// `bins == 0` yields a valid empty filter.
    pub fn new(bins: u64, bin_size: u64) -> Self {
        let buckets_per_bin = (bin_size.div_ceil(SLOTS_PER_BUCKET as u64).max(1) + 1)
            .next_power_of_two();
        let num_tags = if bins == 0 {
            0
        } else {
            (bins * buckets_per_bin) as usize * SLOTS_PER_BUCKET
        };
        let mut tags = Vec::with_capacity(num_tags);
        tags.resize_with(num_tags, || AtomicU16::new(EMPTY_TAG));
        Self {
            bins,
            bin_size,
            buckets_per_bin,
            tags,
        }
    }

    /// Number of bins.
    pub fn bins(&self) -> u64 {
        self.bins
    }

    /// Nominal capacity of one bin.
    pub fn bin_size(&self) -> u64 {
        self.bin_size
    }

    /// First tag-slot index of a bucket within a bin.
    #[inline]
    fn slot_base(&self, bin: u64, bucket: u64) -> usize {
        ((bin * self.buckets_per_bin + bucket) as usize) * SLOTS_PER_BUCKET
    }

    /// Try to place `fp` in an empty slot of one bucket.
    #[inline]
    fn try_place(&self, bin: u64, bucket: u64, fp: u16) -> bool {
        let base = self.slot_base(bin, bucket);
        for slot in &self.tags[base..base + SLOTS_PER_BUCKET] {
            if slot.load(Ordering::Relaxed) == EMPTY_TAG {
                slot.store(fp, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    /// Insert the fingerprint of `hash` into bin `bin`.
    ///
    /// Concurrent calls are safe as long as no two writers target the same
    /// bin. Fails with [`BuildError::FilterFull`] when the eviction budget is
    /// exhausted, which invalidates the no-false-negative guarantee and must
    /// abort the build.
    pub fn insert_tag(&self, bin: u64, hash: u64) -> Result<(), BuildError> {
        debug_assert!(bin < self.bins, "bin {bin} out of range");
        let bucket_mask = self.buckets_per_bin - 1;
        let (mut fp, bucket) = fingerprint_and_bucket(hash, bucket_mask);

        if self.try_place(bin, bucket, fp) {
            return Ok(());
        }
        let alt = alternate_bucket(bucket, fp, bucket_mask);
        if self.try_place(bin, alt, fp) {
            return Ok(());
        }

        // Both candidates full: evict residents, reusing the hash bits as a
        // deterministic victim-slot sequence.
        let mut bucket = alt;
        let mut victim_state = mix64(hash ^ 0x9E37_79B9_7F4A_7C15);
        for _ in 0..MAX_EVICTIONS {
            let victim_slot = (victim_state as usize) % SLOTS_PER_BUCKET;
            victim_state = mix64(victim_state);

            let base = self.slot_base(bin, bucket);
            let evicted = self.tags[base + victim_slot].swap(fp, Ordering::Relaxed);
            fp = evicted;
            bucket = alternate_bucket(bucket, fp, bucket_mask);
            if self.try_place(bin, bucket, fp) {
                return Ok(());
            }
        }
        Err(BuildError::FilterFull {
            bin,
            evictions: MAX_EVICTIONS,
        })
    }

    /// Approximate membership of `hash` in bin `bin`.
    pub fn contains(&self, bin: u64, hash: u64) -> bool {
        if self.bins == 0 {
            return false;
        }
        debug_assert!(bin < self.bins, "bin {bin} out of range");
        let bucket_mask = self.buckets_per_bin - 1;
        let (fp, bucket) = fingerprint_and_bucket(hash, bucket_mask);
        let alt = alternate_bucket(bucket, fp, bucket_mask);
        self.bucket_has(bin, bucket, fp) || self.bucket_has(bin, alt, fp)
    }

    #[inline]
    fn bucket_has(&self, bin: u64, bucket: u64, fp: u16) -> bool {
        let base = self.slot_base(bin, bucket);
        self.tags[base..base + SLOTS_PER_BUCKET]
            .iter()
            .any(|slot| slot.load(Ordering::Relaxed) == fp)
    }

    /// Number of occupied tag slots.
    pub fn occupied_slots(&self) -> u64 {
        self.tags
            .iter()
            .filter(|slot| slot.load(Ordering::Relaxed) != EMPTY_TAG)
            .count() as u64
    }

    /// Serialize the filter as little-endian fields plus the raw tag array.
    pub fn write_into(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.bins.to_le_bytes())?;
        writer.write_all(&self.bin_size.to_le_bytes())?;
        writer.write_all(&self.buckets_per_bin.to_le_bytes())?;
        writer.write_all(&(self.tags.len() as u64).to_le_bytes())?;
        let mut buf = Vec::with_capacity(64 * 1024);
        for slot in &self.tags {
            buf.extend_from_slice(&slot.load(Ordering::Relaxed).to_le_bytes());
            if buf.len() >= 64 * 1024 {
                writer.write_all(&buf)?;
                buf.clear();
            }
        }
        writer.write_all(&buf)?;
        Ok(())
    }

    /// Deserialize a filter previously written by [`write_into`].
    ///
    /// [`write_into`]: InterleavedCuckooFilter::write_into
    pub fn read_from(reader: &mut impl Read) -> Result<Self, BuildError> {
        let mut word = [0u8; 8];
        reader.read_exact(&mut word)?;
        let bins = u64::from_le_bytes(word);
        reader.read_exact(&mut word)?;
        let bin_size = u64::from_le_bytes(word);
        reader.read_exact(&mut word)?;
        let buckets_per_bin = u64::from_le_bytes(word);
        reader.read_exact(&mut word)?;
        let num_tags = u64::from_le_bytes(word);

        if buckets_per_bin == 0 || !buckets_per_bin.is_power_of_two() {
            return Err(BuildError::InvalidArchive(format!(
                "buckets_per_bin must be a nonzero power of two, got {buckets_per_bin}"
            )));
        }
        let expected = if bins == 0 {
            0
        } else {
            bins * buckets_per_bin * SLOTS_PER_BUCKET as u64
        };
        if num_tags != expected {
            return Err(BuildError::InvalidArchive(format!(
                "tag count {num_tags} does not match {bins} bins"
            )));
        }

        let mut tags = Vec::with_capacity(num_tags as usize);
        let mut tag = [0u8; 2];
        for _ in 0..num_tags {
            reader.read_exact(&mut tag)?;
            tags.push(AtomicU16::new(u16::from_le_bytes(tag)));
        }
        Ok(Self {
            bins,
            bin_size,
            buckets_per_bin,
            tags,
        })
    }
}
