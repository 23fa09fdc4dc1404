use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::mp4box::*;

/// Segment index box.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SidxBox {
    pub size_field: SizeField,
    pub version: u8,
    pub flags: u32,
    pub reference_id: u32,
    pub timescale: u32,
    pub earliest_presentation_time: u64,
    pub first_offset: u64,
    pub reserved: u16,

    #[serde(skip_serializing)]
    pub references: Vec<SidxReference>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SidxReference {
    pub reference_type: bool,
    pub referenced_size: u32,
    pub subsegment_duration: u32,
    pub starts_with_sap: bool,
    pub sap_type: u8,
    pub sap_delta_time: u32,
}

impl SidxReference {
    const SIZE: u64 = 12;

    fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let a = reader.read_u32::<BigEndian>()?;
        let subsegment_duration = reader.read_u32::<BigEndian>()?;
        let b = reader.read_u32::<BigEndian>()?;
        Ok(SidxReference {
            reference_type: a >> 31 == 1,
            referenced_size: a & 0x7fff_ffff,
            subsegment_duration,
            starts_with_sap: b >> 31 == 1,
            sap_type: ((b >> 28) & 0b111) as u8,
            sap_delta_time: b & 0x0fff_ffff,
        })
    }

    fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        if self.referenced_size > 0x7fff_ffff
            || self.sap_type > 0b111
            || self.sap_delta_time > 0x0fff_ffff
        {
            return Err(Error::InvalidData("sidx reference field out of range"));
        }
        let a = ((self.reference_type as u32) << 31) | self.referenced_size;
        let b = ((self.starts_with_sap as u32) << 31)
            | ((self.sap_type as u32) << 28)
            | self.sap_delta_time;
        writer.write_u32::<BigEndian>(a)?;
        writer.write_u32::<BigEndian>(self.subsegment_duration)?;
        writer.write_u32::<BigEndian>(b)?;
        Ok(())
    }
}

impl SidxBox {
    pub fn get_type(&self) -> BoxType {
        BoxType::SidxBox
    }

    pub fn get_size(&self) -> u64 {
        self.size_field
            .box_size(self.fixed_size() + SidxReference::SIZE * self.references.len() as u64)
    }

    /// Payload bytes ahead of the references.
    fn fixed_size(&self) -> u64 {
        let mut size = HEADER_EXT_SIZE + 8;
        if self.version == 0 {
            size += 8;
        } else {
            size += 16;
        }
        size + 4
    }

    /// Total bytes covered by the references.
    pub fn referenced_size(&self) -> u64 {
        self.references
            .iter()
            .map(|r| r.referenced_size as u64)
            .sum()
    }
}

impl Mp4Box for SidxBox {
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
            "reference_id={} timescale={} references={}",
            self.reference_id,
            self.timescale,
            self.references.len()
        );
        Ok(s)
    }
}

impl<R: Read + ?Sized> ReadBox<&mut R> for SidxBox {
    fn read_box(reader: &mut R, header: &BoxHeader) -> Result<Self> {
        let (version, flags) = read_box_header_ext(reader)?;

        let reference_id = reader.read_u32::<BigEndian>()?;
        let timescale = reader.read_u32::<BigEndian>()?;
        let (earliest_presentation_time, first_offset) = match version {
            0 => (
                reader.read_u32::<BigEndian>()? as u64,
                reader.read_u32::<BigEndian>()? as u64,
            ),
            1 => (
                reader.read_u64::<BigEndian>()?,
                reader.read_u64::<BigEndian>()?,
            ),
            _ => return Err(Error::MalformedBox(BoxType::SidxBox, "version must be 0 or 1")),
        };
        let reserved = reader.read_u16::<BigEndian>()?;
        let reference_count = reader.read_u16::<BigEndian>()?;

        let mut sidx = SidxBox {
            size_field: header.size_field,
            version,
            flags,
            reference_id,
            timescale,
            earliest_presentation_time,
            first_offset,
            reserved,
            references: Vec::new(),
        };
        let available = header.payload_size().saturating_sub(sidx.fixed_size());
        check_entry_count(
            BoxType::SidxBox,
            reference_count as u64,
            SidxReference::SIZE,
            available,
        )?;

        sidx.references.reserve(reference_count as usize);
        for _ in 0..reference_count {
            sidx.references.push(SidxReference::read(reader)?);
        }

        Ok(sidx)
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for SidxBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        if self.references.len() > u16::MAX as usize {
            return Err(Error::InvalidData("too many sidx references"));
        }
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;

        write_box_header_ext(writer, self.version, self.flags)?;

        writer.write_u32::<BigEndian>(self.reference_id)?;
        writer.write_u32::<BigEndian>(self.timescale)?;
        if self.version == 0 {
            writer.write_u32::<BigEndian>(self.earliest_presentation_time as u32)?;
            writer.write_u32::<BigEndian>(self.first_offset as u32)?;
        } else {
            writer.write_u64::<BigEndian>(self.earliest_presentation_time)?;
            writer.write_u64::<BigEndian>(self.first_offset)?;
        }
        writer.write_u16::<BigEndian>(self.reserved)?;
        writer.write_u16::<BigEndian>(self.references.len() as u16)?;

        for reference in self.references.iter() {
            reference.write(writer)?;
        }

        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4box::BoxHeader;
    use std::io::Cursor;

    fn round_trip(src_box: &SidxBox) {
        let mut buf = Vec::new();
        src_box.write_box(&mut buf).unwrap();
        assert_eq!(buf.len(), src_box.box_size() as usize);

        let mut reader = Cursor::new(&buf);
        let header = BoxHeader::read(&mut reader).unwrap();
        assert_eq!(header.name, BoxType::SidxBox);
        assert_eq!(src_box.box_size(), header.size);

        let dst_box = SidxBox::read_box(&mut reader, &header).unwrap();
        assert_eq!(*src_box, dst_box);
    }

    #[test]
    fn test_sidx32() {
        let src_box = SidxBox {
            size_field: SizeField::Compact,
            version: 0,
            flags: 0,
            reference_id: 1,
            timescale: 90000,
            earliest_presentation_time: 1800,
            first_offset: 0,
            reserved: 0,
            references: vec![SidxReference {
                reference_type: false,
                referenced_size: 0x1234,
                subsegment_duration: 180000,
                starts_with_sap: true,
                sap_type: 1,
                sap_delta_time: 0,
            }],
        };
        assert_eq!(src_box.box_size(), 44);
        round_trip(&src_box);
    }

    #[test]
    fn test_sidx64() {
        let src_box = SidxBox {
            version: 1,
            reference_id: 2,
            timescale: 48000,
            earliest_presentation_time: u32::MAX as u64 + 7,
            first_offset: 512,
            references: vec![
                SidxReference {
                    reference_type: true,
                    referenced_size: 0x7fff_ffff,
                    subsegment_duration: 96000,
                    starts_with_sap: false,
                    sap_type: 7,
                    sap_delta_time: 0x0fff_ffff,
                },
                SidxReference {
                    referenced_size: 100,
                    subsegment_duration: 96000,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(src_box.referenced_size(), 0x7fff_ffff + 100);
        round_trip(&src_box);
    }

    #[test]
    fn test_sidx_reference_out_of_range() {
        let src_box = SidxBox {
            references: vec![SidxReference {
                sap_type: 8,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(src_box.write_box(&mut Vec::<u8>::new()).is_err());
    }
}
