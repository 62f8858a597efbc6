//! Binary index archive
//!
//! One little-endian stream holding, in order: a magic/version header, the
//! interleaved cuckoo filter, the filter geometry, the per-taxid hash
//! counts, and the per-taxid bin-range ends. Strings are u32-length-prefixed
//! UTF-8; the pair lists are u64-length-prefixed.
//!
//! Compatibility is checked on the major version only; the magic rejects
//! foreign files outright.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::config::IcfConfig;
use crate::error::BuildError;
use crate::icf::InterleavedCuckooFilter;

/// Magic bytes identifying a taxfilter index.
const MAGIC: &[u8; 8] = b"TXFILT01";

/// Archive format version (major, minor).
const FORMAT_VERSION: (u32, u32) = (1, 0);

/// A fully deserialized index archive.
#[derive(Debug)]
pub struct Archive {
    /// The membership filter.
    pub icf: InterleavedCuckooFilter,
    /// Filter geometry and minimizer parameters.
    pub config: IcfConfig,
    /// Per-taxid hash counts, as written.
    pub hash_count: Vec<(String, u64)>,
    /// Per-taxid exclusive range ends, as written.
    pub taxid_bins: Vec<(String, u64)>,
}

/// Serialize the index to `path`. An unopenable output is fatal.
pub fn save(
    path: &Path,
    icf: &InterleavedCuckooFilter,
    config: &IcfConfig,
    hash_count: &[(String, u64)],
    taxid_bins: &[(String, u64)],
) -> Result<(), BuildError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC)?;
    writer.write_all(&FORMAT_VERSION.0.to_le_bytes())?;
    writer.write_all(&FORMAT_VERSION.1.to_le_bytes())?;

    icf.write_into(&mut writer)?;

    writer.write_all(&[config.kmer_size, config.window_size])?;
    writer.write_all(&config.bins.to_le_bytes())?;
    writer.write_all(&config.bin_size.to_le_bytes())?;

    write_pairs(&mut writer, hash_count)?;
    write_pairs(&mut writer, taxid_bins)?;

    writer.flush()?;
    Ok(())
}

/// Deserialize an index previously written by [`save`].
pub fn load(path: &Path) -> Result<Archive, BuildError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(BuildError::InvalidArchive(
            "bad magic, not a taxfilter index".to_string(),
        ));
    }
    let major = read_u32(&mut reader)?;
    let minor = read_u32(&mut reader)?;
    if major != FORMAT_VERSION.0 {
        return Err(BuildError::InvalidArchive(format!(
            "incompatible format version {major}.{minor}, expected {}.{}",
            FORMAT_VERSION.0, FORMAT_VERSION.1
        )));
    }

    let icf = InterleavedCuckooFilter::read_from(&mut reader)?;

    let mut sizes = [0u8; 2];
    reader.read_exact(&mut sizes)?;
    let config = IcfConfig {
        kmer_size: sizes[0],
        window_size: sizes[1],
        bins: read_u64(&mut reader)?,
        bin_size: read_u64(&mut reader)?,
    };

    let hash_count = read_pairs(&mut reader)?;
    let taxid_bins = read_pairs(&mut reader)?;

    Ok(Archive {
        icf,
        config,
        hash_count,
        taxid_bins,
    })
}

fn write_pairs(writer: &mut impl Write, pairs: &[(String, u64)]) -> io::Result<()> {
    writer.write_all(&(pairs.len() as u64).to_le_bytes())?;
    for (taxid, value) in pairs {
        writer.write_all(&(taxid.len() as u32).to_le_bytes())?;
        writer.write_all(taxid.as_bytes())?;
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

fn read_pairs(reader: &mut impl Read) -> Result<Vec<(String, u64)>, BuildError> {
    let len = read_u64(reader)?;
    let mut pairs = Vec::with_capacity(len.min(1 << 20) as usize);
    for _ in 0..len {
        let str_len = read_u32(reader)? as usize;
        let mut bytes = vec![0u8; str_len];
        reader.read_exact(&mut bytes)?;
        let taxid = String::from_utf8(bytes)
            .map_err(|e| BuildError::InvalidArchive(format!("taxid is not UTF-8: {e}")))?;
        let value = read_u64(reader)?;
        pairs.push((taxid, value));
    }
    Ok(pairs)
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
