use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::mp4box::*;

/// Track fragment run. Which per-sample fields are present is decided by
/// `flags`; an entry field is `Some` exactly when its flag bit is set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TrunBox {
    pub size_field: SizeField,
    pub version: u8,
    pub flags: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_offset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_sample_flags: Option<u32>,

    #[serde(skip_serializing)]
    pub entries: Vec<TrunEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TrunEntry {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<i32>,
}

impl TrunBox {
    pub const FLAG_DATA_OFFSET: u32 = 0x000001;
    pub const FLAG_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
    pub const FLAG_SAMPLE_DURATION: u32 = 0x000100;
    pub const FLAG_SAMPLE_SIZE: u32 = 0x000200;
    pub const FLAG_SAMPLE_FLAGS: u32 = 0x000400;
    pub const FLAG_SAMPLE_CTS: u32 = 0x000800;

    pub fn get_type(&self) -> BoxType {
        BoxType::TrunBox
    }

    pub fn get_size(&self) -> u64 {
        self.size_field
            .box_size(self.fixed_size() + self.entry_size() * self.entries.len() as u64)
    }

    /// Payload bytes ahead of the sample entries.
    fn fixed_size(&self) -> u64 {
        let mut size = HEADER_EXT_SIZE + 4;
        if self.flags & Self::FLAG_DATA_OFFSET != 0 {
            size += 4;
        }
        if self.flags & Self::FLAG_FIRST_SAMPLE_FLAGS != 0 {
            size += 4;
        }
        size
    }

    pub fn sample_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Sum of the sample sizes, when the run carries them.
    pub fn data_size(&self) -> Option<u64> {
        self.entries
            .iter()
            .map(|e| e.size.map(u64::from))
            .sum()
    }

    fn entry_size(&self) -> u64 {
        let fields = [
            Self::FLAG_SAMPLE_DURATION,
            Self::FLAG_SAMPLE_SIZE,
            Self::FLAG_SAMPLE_FLAGS,
            Self::FLAG_SAMPLE_CTS,
        ];
        4 * fields.iter().filter(|f| self.flags & **f != 0).count() as u64
    }
}

impl Mp4Box for TrunBox {
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
            "sample_count={} data_offset={:?}",
            self.sample_count(),
            self.data_offset
        );
        Ok(s)
    }
}

fn read_if<R: Read + ?Sized>(reader: &mut R, present: bool) -> Result<Option<u32>> {
    if present {
        Ok(Some(reader.read_u32::<BigEndian>()?))
    } else {
        Ok(None)
    }
}

impl<R: Read + ?Sized> ReadBox<&mut R> for TrunBox {
    fn read_box(reader: &mut R, header: &BoxHeader) -> Result<Self> {
        let (version, flags) = read_box_header_ext(reader)?;

        let sample_count = reader.read_u32::<BigEndian>()?;

        let data_offset = read_if(reader, flags & Self::FLAG_DATA_OFFSET != 0)?.map(|v| v as i32);
        let first_sample_flags = read_if(reader, flags & Self::FLAG_FIRST_SAMPLE_FLAGS != 0)?;

        let mut trun = TrunBox {
            size_field: header.size_field,
            version,
            flags,
            data_offset,
            first_sample_flags,
            entries: Vec::new(),
        };

        let available = header.payload_size().saturating_sub(trun.fixed_size());
        let entry_size = trun.entry_size();
        if entry_size == 0 {
            // every entry takes zero bytes; nothing bounds the count
            if sample_count as u64 > available.max(1) * 1024 {
                return Err(Error::MalformedBox(BoxType::TrunBox, "implausible sample count"));
            }
        } else {
            check_entry_count(BoxType::TrunBox, sample_count as u64, entry_size, available)?;
        }

        trun.entries.reserve(sample_count as usize);
        for _ in 0..sample_count {
            let duration = read_if(reader, flags & Self::FLAG_SAMPLE_DURATION != 0)?;
            let size = read_if(reader, flags & Self::FLAG_SAMPLE_SIZE != 0)?;
            let sample_flags = read_if(reader, flags & Self::FLAG_SAMPLE_FLAGS != 0)?;
            let composition_time_offset =
                read_if(reader, flags & Self::FLAG_SAMPLE_CTS != 0)?.map(|v| v as i32);
            trun.entries.push(TrunEntry {
                duration,
                size,
                flags: sample_flags,
                composition_time_offset,
            });
        }

        Ok(trun)
    }
}

fn write_if<W: Write + ?Sized>(writer: &mut W, present: bool, value: Option<u32>) -> Result<()> {
    match (present, value) {
        (true, Some(v)) => writer.write_u32::<BigEndian>(v)?,
        (false, None) => {}
        _ => return Err(Error::InvalidData("trun field presence does not match its flags")),
    }
    Ok(())
}

impl<W: Write + ?Sized> WriteBox<&mut W> for TrunBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;

        write_box_header_ext(writer, self.version, self.flags)?;

        writer.write_u32::<BigEndian>(self.sample_count())?;
        write_if(
            writer,
            self.flags & Self::FLAG_DATA_OFFSET != 0,
            self.data_offset.map(|v| v as u32),
        )?;
        write_if(
            writer,
            self.flags & Self::FLAG_FIRST_SAMPLE_FLAGS != 0,
            self.first_sample_flags,
        )?;

        for entry in self.entries.iter() {
            write_if(writer, self.flags & Self::FLAG_SAMPLE_DURATION != 0, entry.duration)?;
            write_if(writer, self.flags & Self::FLAG_SAMPLE_SIZE != 0, entry.size)?;
            write_if(writer, self.flags & Self::FLAG_SAMPLE_FLAGS != 0, entry.flags)?;
            write_if(
                writer,
                self.flags & Self::FLAG_SAMPLE_CTS != 0,
                entry.composition_time_offset.map(|v| v as u32),
            )?;
        }

        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4box::BoxHeader;
    use std::io::Cursor;

    fn round_trip(src_box: &TrunBox) {
        let mut buf = Vec::new();
        src_box.write_box(&mut buf).unwrap();
        assert_eq!(buf.len(), src_box.box_size() as usize);

        let mut reader = Cursor::new(&buf);
        let header = BoxHeader::read(&mut reader).unwrap();
        assert_eq!(header.name, BoxType::TrunBox);
        assert_eq!(src_box.box_size(), header.size);

        let dst_box = TrunBox::read_box(&mut reader, &header).unwrap();
        assert_eq!(*src_box, dst_box);
    }

    #[test]
    fn test_trun_same_size() {
        let src_box = TrunBox {
            size_field: SizeField::Compact,
            version: 0,
            flags: TrunBox::FLAG_DATA_OFFSET,
            data_offset: Some(0),
            first_sample_flags: None,
            entries: vec![],
        };
        assert_eq!(src_box.box_size(), 20);
        round_trip(&src_box);
    }

    #[test]
    fn test_trun_many_sizes() {
        let sizes = [1165, 11, 11, 8545, 10126, 10866, 9643, 9351, 7730];
        let src_box = TrunBox {
            size_field: SizeField::Compact,
            version: 0,
            flags: TrunBox::FLAG_DATA_OFFSET | TrunBox::FLAG_SAMPLE_SIZE,
            data_offset: Some(100),
            first_sample_flags: None,
            entries: sizes
                .iter()
                .map(|s| TrunEntry {
                    size: Some(*s),
                    ..Default::default()
                })
                .collect(),
        };
        assert_eq!(src_box.sample_count(), 9);
        assert_eq!(src_box.data_size(), Some(sizes.iter().map(|s| *s as u64).sum()));
        round_trip(&src_box);
    }

    #[test]
    fn test_trun_all_fields() {
        let src_box = TrunBox {
            size_field: SizeField::Compact,
            version: 1,
            flags: 0xf05,
            data_offset: Some(-8),
            first_sample_flags: Some(0x02000000),
            entries: vec![
                TrunEntry {
                    duration: Some(1024),
                    size: Some(300),
                    flags: Some(0x01010000),
                    composition_time_offset: Some(-512),
                };
                3
            ],
        };
        assert_eq!(src_box.box_size(), 8 + 4 + 4 + 8 + 3 * 16);
        round_trip(&src_box);
    }

    #[test]
    fn test_trun_flag_mismatch() {
        let src_box = TrunBox {
            flags: TrunBox::FLAG_SAMPLE_SIZE,
            entries: vec![TrunEntry::default()],
            ..Default::default()
        };
        assert!(src_box.write_box(&mut Vec::<u8>::new()).is_err());
        assert_eq!(src_box.data_size(), None);
    }

    #[test]
    fn test_trun_count_too_large() {
        let mut buf = Vec::new();
        BoxHeader::new(BoxType::TrunBox, 20).write(&mut buf).unwrap();
        buf.extend_from_slice(&[0, 0, 0x02, 0]);
        buf.extend_from_slice(&[0, 0, 0, 2]);
        buf.extend_from_slice(&[0, 0, 0, 7]);

        let mut reader = Cursor::new(&buf);
        let header = BoxHeader::read(&mut reader).unwrap();
        assert!(matches!(
            TrunBox::read_box(&mut reader, &header),
            Err(Error::MalformedBox(BoxType::TrunBox, _))
        ));
    }
}
