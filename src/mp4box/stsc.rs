use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::mp4box::*;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StscBox {
    pub size_field: SizeField,
    pub version: u8,
    pub flags: u32,

    #[serde(skip_serializing)]
    pub entries: Vec<StscEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,

    /// Derived on read, not stored in the box.
    pub first_sample: u32,
}

impl StscBox {
    pub fn get_type(&self) -> BoxType {
        BoxType::StscBox
    }

    pub fn get_size(&self) -> u64 {
        self.size_field
            .box_size(HEADER_EXT_SIZE + 4 + 12 * self.entries.len() as u64)
    }

    /// Recomputes `first_sample` for every entry from the chunk runs.
    pub fn update_first_samples(&mut self) -> Result<()> {
        let mut sample_id = 1u32;
        let count = self.entries.len();
        for i in 0..count {
            self.entries[i].first_sample = sample_id;
            if i + 1 < count {
                let entry = &self.entries[i];
                let next_first_chunk = self.entries[i + 1].first_chunk;
                let chunks = next_first_chunk
                    .checked_sub(entry.first_chunk)
                    .ok_or(Error::MalformedBox(
                        BoxType::StscBox,
                        "first_chunk values are not increasing",
                    ))?;
                sample_id = chunks
                    .checked_mul(entry.samples_per_chunk)
                    .and_then(|n| n.checked_add(sample_id))
                    .ok_or(Error::MalformedBox(BoxType::StscBox, "sample numbers overflow"))?;
            }
        }
        Ok(())
    }

    /// Chunk holding the 1-based `sample_id`, and the first sample of that chunk.
    pub fn chunk_of_sample(&self, sample_id: u32) -> Result<(u32, u32)> {
        let entry = self
            .entries
            .iter()
            .rev()
            .find(|entry| entry.first_sample <= sample_id)
            .ok_or(Error::MalformedBox(
                BoxType::StscBox,
                "no sample-to-chunk entry covers the sample",
            ))?;
        if entry.samples_per_chunk == 0 {
            return Err(Error::MalformedBox(BoxType::StscBox, "zero samples per chunk"));
        }

        let delta = sample_id - entry.first_sample;
        let chunk_id = entry
            .first_chunk
            .checked_add(delta / entry.samples_per_chunk)
            .ok_or(Error::MalformedBox(BoxType::StscBox, "chunk numbers overflow"))?;
        let first_sample_in_chunk = sample_id - delta % entry.samples_per_chunk;
        Ok((chunk_id, first_sample_in_chunk))
    }
}

impl Mp4Box for StscBox {
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
        let s = format!("entries={}", self.entries.len());
        Ok(s)
    }
}

impl<R: Read + ?Sized> ReadBox<&mut R> for StscBox {
    fn read_box(reader: &mut R, header: &BoxHeader) -> Result<Self> {
        let (version, flags) = read_box_header_ext(reader)?;

        let entry_count = reader.read_u32::<BigEndian>()?;
        check_entry_count(
            BoxType::StscBox,
            entry_count as u64,
            12,
            header.payload_size().saturating_sub(HEADER_EXT_SIZE + 4),
        )?;
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let entry = StscEntry {
                first_chunk: reader.read_u32::<BigEndian>()?,
                samples_per_chunk: reader.read_u32::<BigEndian>()?,
                sample_description_index: reader.read_u32::<BigEndian>()?,
                first_sample: 0,
            };
            entries.push(entry);
        }

        let mut stsc = StscBox {
            size_field: header.size_field,
            version,
            flags,
            entries,
        };
        stsc.update_first_samples()?;
        Ok(stsc)
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for StscBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;

        write_box_header_ext(writer, self.version, self.flags)?;

        writer.write_u32::<BigEndian>(self.entries.len() as u32)?;
        for entry in self.entries.iter() {
            writer.write_u32::<BigEndian>(entry.first_chunk)?;
            writer.write_u32::<BigEndian>(entry.samples_per_chunk)?;
            writer.write_u32::<BigEndian>(entry.sample_description_index)?;
        }

        Ok(size)
    }
}
