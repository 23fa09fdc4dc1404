use serde::Serialize;
use std::io::{Read, Write};

use crate::mp4box::*;

/// A box nobody decodes. The payload is kept verbatim so it re-encodes
/// exactly as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownBox {
    pub box_type: BoxType,
    pub size_field: SizeField,

    #[serde(skip_serializing)]
    pub data: Bytes,
}

impl UnknownBox {
    pub fn new(box_type: BoxType, data: Bytes) -> Self {
        Self {
            box_type,
            size_field: SizeField::Compact,
            data,
        }
    }

    pub fn get_size(&self) -> u64 {
        let payload = self.data.len() as u64;
        self.size_field.header_size(payload) + payload
    }
}

impl Mp4Box for UnknownBox {
    fn box_type(&self) -> BoxType {
        self.box_type
    }

    fn box_size(&self) -> u64 {
        self.get_size()
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self)?)
    }

    fn summary(&self) -> Result<String> {
        let s = format!("payload={} bytes", self.data.len());
        Ok(s)
    }
}

impl<R: Read + ?Sized> ReadBox<&mut R> for UnknownBox {
    fn read_box(reader: &mut R, header: &BoxHeader) -> Result<Self> {
        Ok(UnknownBox {
            box_type: header.name,
            size_field: header.size_field,
            data: read_payload(reader, header.payload_size())?,
        })
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for UnknownBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let size = self.box_size();
        BoxHeader::new(self.box_type, size)
            .with_size_field(self.size_field)
            .write(writer)?;
        writer.write_all(&self.data)?;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_unknown() {
        let src_box = UnknownBox::new(BoxType::UnknownBox(0x75756964), Bytes::from_static(b"abcdef"));
        let mut buf = Vec::new();
        src_box.write_box(&mut buf).unwrap();
        assert_eq!(buf.len(), 14);
        assert_eq!(&buf[4..8], b"uuid");

        let mut reader = Cursor::new(&buf);
        let header = BoxHeader::read(&mut reader).unwrap();
        let dst_box = UnknownBox::read_box(&mut reader, &header).unwrap();
        assert_eq!(src_box, dst_box);
    }

    #[test]
    fn test_unknown_keeps_large_header() {
        let mut buf = Vec::new();
        BoxHeader::new(BoxType::FreeBox, 20)
            .with_size_field(SizeField::Large)
            .write(&mut buf)
            .unwrap();
        buf.extend_from_slice(&[1, 2, 3, 4]);

        let mut reader = Cursor::new(&buf);
        let header = BoxHeader::read(&mut reader).unwrap();
        let unknown = UnknownBox::read_box(&mut reader, &header).unwrap();
        assert_eq!(unknown.box_size(), 20);

        let mut out = Vec::new();
        unknown.write_box(&mut out).unwrap();
        assert_eq!(out, buf);
    }
}
