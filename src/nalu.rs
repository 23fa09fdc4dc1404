//! 4-byte length-prefixed NAL unit framing, as used by `avc1`/`hvc1` samples.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::*;

const LENGTH_SIZE: usize = 4;

/// Splits a sample into its NAL units. The returned slices borrow `sample`.
///
/// Fails when fewer than 4 bytes remain for a length field or a length
/// runs past the end of the sample. An empty sample is an error.
pub fn nalus_from_sample(sample: &[u8]) -> Result<Vec<&[u8]>> {
    if sample.len() < LENGTH_SIZE {
        return Err(Error::NaluFrame("sample shorter than a length field"));
    }

    let mut nalus = Vec::new();
    let mut pos = 0;
    while pos < sample.len() {
        if sample.len() - pos < LENGTH_SIZE {
            return Err(Error::NaluFrame("trailing bytes shorter than a length field"));
        }
        let len = BigEndian::read_u32(&sample[pos..pos + LENGTH_SIZE]) as usize;
        pos += LENGTH_SIZE;
        if len > sample.len() - pos {
            return Err(Error::NaluFrame("NAL unit length runs past the sample"));
        }
        nalus.push(&sample[pos..pos + len]);
        pos += len;
    }
    Ok(nalus)
}

/// Joins NAL units into a length-prefixed sample. No units gives an empty sample.
pub fn sample_from_nalus<T: AsRef<[u8]>>(nalus: &[T]) -> Result<Vec<u8>> {
    let total = nalus
        .iter()
        .map(|n| LENGTH_SIZE + n.as_ref().len())
        .sum();
    let mut sample = Vec::with_capacity(total);
    for nalu in nalus {
        let nalu = nalu.as_ref();
        if nalu.len() > u32::MAX as usize {
            return Err(Error::NaluFrame("NAL unit too long for a 4-byte length"));
        }
        sample.write_u32::<BigEndian>(nalu.len() as u32)?;
        sample.extend_from_slice(nalu);
    }
    Ok(sample)
}

/// H.264 `nal_unit_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    NonIdrSlice,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    Other(u8),
}

impl From<u8> for NaluType {
    fn from(header: u8) -> Self {
        match header & 0x1f {
            1 => NaluType::NonIdrSlice,
            5 => NaluType::IdrSlice,
            6 => NaluType::Sei,
            7 => NaluType::Sps,
            8 => NaluType::Pps,
            9 => NaluType::AccessUnitDelimiter,
            t => NaluType::Other(t),
        }
    }
}

/// Types of every NAL unit in the sample. Empty units are skipped.
pub fn nalu_types(sample: &[u8]) -> Result<Vec<NaluType>> {
    Ok(nalus_from_sample(sample)?
        .iter()
        .filter_map(|n| n.first().map(|h| NaluType::from(*h)))
        .collect())
}

pub fn is_idr_sample(sample: &[u8]) -> Result<bool> {
    Ok(nalu_types(sample)?.contains(&NaluType::IdrSlice))
}
