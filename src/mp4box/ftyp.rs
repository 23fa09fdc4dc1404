use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::mp4box::*;

/// File type box. Also used for `styp`, which has the same layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FtypBox {
    pub box_type: BoxType,
    pub size_field: SizeField,
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl Default for FtypBox {
    fn default() -> Self {
        FtypBox {
            box_type: BoxType::FtypBox,
            size_field: SizeField::Compact,
            major_brand: FourCC::default(),
            minor_version: 0,
            compatible_brands: Vec::new(),
        }
    }
}

impl FtypBox {
    pub fn get_type(&self) -> BoxType {
        self.box_type
    }

    pub fn get_size(&self) -> u64 {
        self.size_field
            .box_size(8 + 4 * self.compatible_brands.len() as u64)
    }
}

impl Mp4Box for FtypBox {
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
        let mut compatible_brands = Vec::new();
        for brand in self.compatible_brands.iter() {
            compatible_brands.push(brand.to_string());
        }
        let s = format!(
            "major_brand={} minor_version={} compatible_brands={}",
            self.major_brand,
            self.minor_version,
            compatible_brands.join("-")
        );
        Ok(s)
    }
}

impl<R: Read + ?Sized> ReadBox<&mut R> for FtypBox {
    fn read_box(reader: &mut R, header: &BoxHeader) -> Result<Self> {
        let payload = header.payload_size();
        if payload < 8 || payload % 4 != 0 {
            return Err(Error::MalformedBox(header.name, "size too small or not aligned"));
        }
        let brand_count = (payload - 8) / 4; // major + minor
        let major = reader.read_u32::<BigEndian>()?;
        let minor = reader.read_u32::<BigEndian>()?;

        let mut brands = Vec::with_capacity(brand_count as usize);
        for _ in 0..brand_count {
            let b = reader.read_u32::<BigEndian>()?;
            brands.push(From::from(b));
        }

        Ok(FtypBox {
            box_type: header.name,
            size_field: header.size_field,
            major_brand: From::from(major),
            minor_version: minor,
            compatible_brands: brands,
        })
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for FtypBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;

        writer.write_u32::<BigEndian>((&self.major_brand).into())?;
        writer.write_u32::<BigEndian>(self.minor_version)?;
        for b in self.compatible_brands.iter() {
            writer.write_u32::<BigEndian>(b.into())?;
        }
        Ok(size)
    }
}
