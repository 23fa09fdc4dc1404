use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::mp4box::*;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Co64Box {
    pub size_field: SizeField,
    pub version: u8,
    pub flags: u32,

    #[serde(skip_serializing)]
    pub entries: Vec<u64>,
}

impl Co64Box {
    pub fn get_type(&self) -> BoxType {
        BoxType::Co64Box
    }

    pub fn get_size(&self) -> u64 {
        self.size_field
            .box_size(HEADER_EXT_SIZE + 4 + 8 * self.entries.len() as u64)
    }
}

impl Mp4Box for Co64Box {
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
        let s = format!("entries_count={}", self.entries.len());
        Ok(s)
    }
}

impl<R: Read + ?Sized> ReadBox<&mut R> for Co64Box {
    fn read_box(reader: &mut R, header: &BoxHeader) -> Result<Self> {
        let (version, flags) = read_box_header_ext(reader)?;

        let entry_count = reader.read_u32::<BigEndian>()?;
        check_entry_count(
            BoxType::Co64Box,
            entry_count as u64,
            8,
            header.payload_size().saturating_sub(HEADER_EXT_SIZE + 4),
        )?;
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _i in 0..entry_count {
            let chunk_offset = reader.read_u64::<BigEndian>()?;
            entries.push(chunk_offset);
        }

        Ok(Co64Box {
            size_field: header.size_field,
            version,
            flags,
            entries,
        })
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for Co64Box {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;

        write_box_header_ext(writer, self.version, self.flags)?;

        writer.write_u32::<BigEndian>(self.entries.len() as u32)?;
        for chunk_offset in self.entries.iter() {
            writer.write_u64::<BigEndian>(*chunk_offset)?;
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
    fn test_co64() {
        let src_box = Co64Box {
            size_field: SizeField::Compact,
            version: 0,
            flags: 0,
            entries: vec![267, 1970, 2535, 2803, 11843, 22223, 33584, u32::MAX as u64 + 7],
        };
        let mut buf = Vec::new();
        src_box.write_box(&mut buf).unwrap();
        assert_eq!(buf.len(), src_box.box_size() as usize);

        let mut reader = Cursor::new(&buf);
        let header = BoxHeader::read(&mut reader).unwrap();
        assert_eq!(header.name, BoxType::Co64Box);
        assert_eq!(src_box.box_size(), header.size);

        let dst_box = Co64Box::read_box(&mut reader, &header).unwrap();
        assert_eq!(src_box, dst_box);
    }
}
