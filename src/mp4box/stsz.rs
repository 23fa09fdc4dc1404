use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::mp4box::*;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StszBox {
    pub size_field: SizeField,
    pub version: u8,
    pub flags: u32,
    pub sample_size: u32,
    pub sample_count: u32,

    #[serde(skip_serializing)]
    pub sample_sizes: Vec<u32>,
}

impl StszBox {
    pub fn get_type(&self) -> BoxType {
        BoxType::StszBox
    }

    pub fn get_size(&self) -> u64 {
        let mut payload = HEADER_EXT_SIZE + 8;
        if self.sample_size == 0 {
            payload += 4 * self.sample_sizes.len() as u64;
        }
        self.size_field.box_size(payload)
    }

    /// Size of the 1-based sample `sample_nr`.
    pub fn sample_size(&self, sample_nr: u32) -> Result<u32> {
        if sample_nr == 0 || sample_nr > self.sample_count {
            return Err(Error::SampleOutOfRange {
                sample: sample_nr,
                count: self.sample_count,
            });
        }
        if self.sample_size > 0 {
            return Ok(self.sample_size);
        }
        match self.sample_sizes.get(sample_nr as usize - 1) {
            Some(size) => Ok(*size),
            None => Err(Error::MalformedBox(
                BoxType::StszBox,
                "sample_count larger than the sample size table",
            )),
        }
    }

    /// Sum of the sizes of samples `start..=end`.
    pub fn total_size(&self, start: u32, end: u32) -> Result<u64> {
        if start > end {
            return Err(Error::InvalidSampleRange(start, end));
        }
        self.sample_size(start)?;
        self.sample_size(end)?;
        if self.sample_size > 0 {
            return Ok(self.sample_size as u64 * (end - start + 1) as u64);
        }
        Ok(self.sample_sizes[start as usize - 1..end as usize]
            .iter()
            .map(|s| *s as u64)
            .sum())
    }
}

impl Mp4Box for StszBox {
    fn box_type(&self) -> BoxType {
        self.get_type()
    }

    fn box_size(&self) -> u64 {
        self.get_size()
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self)?)
    }

    fn summary(&self) -> Result<String> {
        let s = format!(
            "sample_size={} sample_count={} sample_sizes={}",
            self.sample_size,
            self.sample_count,
            self.sample_sizes.len()
        );
        Ok(s)
    }
}

impl<R: Read + ?Sized> ReadBox<&mut R> for StszBox {
    fn read_box(reader: &mut R, header: &BoxHeader) -> Result<Self> {
        let (version, flags) = read_box_header_ext(reader)?;

        let sample_size = reader.read_u32::<BigEndian>()?;
        let sample_count = reader.read_u32::<BigEndian>()?;
        let mut sample_sizes = Vec::new();
        if sample_size == 0 {
            check_entry_count(
                BoxType::StszBox,
                sample_count as u64,
                4,
                header.payload_size().saturating_sub(HEADER_EXT_SIZE + 8),
            )?;
            sample_sizes.reserve(sample_count as usize);
            for _ in 0..sample_count {
                let sample_number = reader.read_u32::<BigEndian>()?;
                sample_sizes.push(sample_number);
            }
        }

        Ok(StszBox {
            size_field: header.size_field,
            version,
            flags,
            sample_size,
            sample_count,
            sample_sizes,
        })
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for StszBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;

        write_box_header_ext(writer, self.version, self.flags)?;

        writer.write_u32::<BigEndian>(self.sample_size)?;
        writer.write_u32::<BigEndian>(self.sample_count)?;
        if self.sample_size == 0 {
            if self.sample_count != self.sample_sizes.len() as u32 {
                return Err(Error::InvalidData(
                    "stsz sample_count does not match the sample size table",
                ));
            }
            for sample_number in self.sample_sizes.iter() {
                writer.write_u32::<BigEndian>(*sample_number)?;
            }
        }

        Ok(size)
    }
}
