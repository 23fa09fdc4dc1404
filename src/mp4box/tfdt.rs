use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::mp4box::*;

// Track Fragment Decode Time box
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TfdtBox {
    pub size_field: SizeField,
    pub version: u8,
    pub flags: u32,
    pub base_media_decode_time: u64,
}

impl TfdtBox {
    pub fn get_type(&self) -> BoxType {
        BoxType::TfdtBox
    }

    pub fn get_size(&self) -> u64 {
        let mut payload = HEADER_EXT_SIZE;
        if self.version == 1 {
            payload += 8;
        } else {
            payload += 4;
        }
        self.size_field.box_size(payload)
    }
}

impl Mp4Box for TfdtBox {
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
        let s = format!("base_media_decode_time={}", self.base_media_decode_time);
        Ok(s)
    }
}

impl<R: Read + ?Sized> ReadBox<&mut R> for TfdtBox {
    fn read_box(reader: &mut R, header: &BoxHeader) -> Result<Self> {
        let (version, flags) = read_box_header_ext(reader)?;

        let base_media_decode_time = match version {
            0 => reader.read_u32::<BigEndian>()? as u64,
            1 => reader.read_u64::<BigEndian>()?,
            _ => return Err(Error::MalformedBox(BoxType::TfdtBox, "version must be 0 or 1")),
        };

        Ok(TfdtBox {
            size_field: header.size_field,
            version,
            flags,
            base_media_decode_time,
        })
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for TfdtBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;

        write_box_header_ext(writer, self.version, self.flags)?;

        if self.version == 1 {
            writer.write_u64::<BigEndian>(self.base_media_decode_time)?;
        } else {
            writer.write_u32::<BigEndian>(self.base_media_decode_time as u32)?;
        }

        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4box::BoxHeader;
    use std::io::Cursor;

    #[test]
    fn test_tfdt32() {
        let src_box = TfdtBox {
            size_field: SizeField::Compact,
            version: 0,
            flags: 0,
            base_media_decode_time: 0,
        };
        let mut buf = Vec::new();
        src_box.write_box(&mut buf).unwrap();
        assert_eq!(buf.len(), src_box.box_size() as usize);

        let mut reader = Cursor::new(&buf);
        let header = BoxHeader::read(&mut reader).unwrap();
        assert_eq!(header.name, BoxType::TfdtBox);
        assert_eq!(src_box.box_size(), header.size);

        let dst_box = TfdtBox::read_box(&mut reader, &header).unwrap();
        assert_eq!(src_box, dst_box);
    }

    #[test]
    fn test_tfdt64() {
        let src_box = TfdtBox {
            size_field: SizeField::Compact,
            version: 1,
            flags: 0,
            base_media_decode_time: u32::MAX as u64 + 1,
        };
        let mut buf = Vec::new();
        src_box.write_box(&mut buf).unwrap();
        assert_eq!(buf.len(), src_box.box_size() as usize);

        let mut reader = Cursor::new(&buf);
        let header = BoxHeader::read(&mut reader).unwrap();
        let dst_box = TfdtBox::read_box(&mut reader, &header).unwrap();
        assert_eq!(src_box, dst_box);
    }
}
