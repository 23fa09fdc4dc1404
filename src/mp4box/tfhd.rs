use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::mp4box::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TfhdBox {
    pub size_field: SizeField,
    pub version: u8,
    /// Flags as read. Bits that announce optional fields are recomputed
    /// from those fields on write; every other bit is kept.
    pub flags: u32,
    pub track_id: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_data_offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_description_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_sample_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_sample_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_sample_flags: Option<u32>,
}

impl Default for TfhdBox {
    fn default() -> Self {
        TfhdBox {
            size_field: SizeField::Compact,
            version: 0,
            flags: Self::FLAG_DEFAULT_BASE_IS_MOOF,
            track_id: 0,
            base_data_offset: None,
            sample_description_index: None,
            default_sample_duration: None,
            default_sample_size: None,
            default_sample_flags: None,
        }
    }
}

impl TfhdBox {
    pub const FLAG_BASE_DATA_OFFSET: u32 = 0x000001;
    pub const FLAG_SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
    pub const FLAG_DEFAULT_SAMPLE_DURATION: u32 = 0x000008;
    pub const FLAG_DEFAULT_SAMPLE_SIZE: u32 = 0x000010;
    pub const FLAG_DEFAULT_SAMPLE_FLAGS: u32 = 0x000020;
    pub const FLAG_DURATION_IS_EMPTY: u32 = 0x010000;
    pub const FLAG_DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

    const FIELD_FLAGS: u32 = Self::FLAG_BASE_DATA_OFFSET
        | Self::FLAG_SAMPLE_DESCRIPTION_INDEX
        | Self::FLAG_DEFAULT_SAMPLE_DURATION
        | Self::FLAG_DEFAULT_SAMPLE_SIZE
        | Self::FLAG_DEFAULT_SAMPLE_FLAGS;

    pub fn get_type(&self) -> BoxType {
        BoxType::TfhdBox
    }

    pub fn get_size(&self) -> u64 {
        let mut payload = HEADER_EXT_SIZE;
        payload += 4;
        if self.base_data_offset.is_some() {
            payload += 8;
        }
        if self.sample_description_index.is_some() {
            payload += 4;
        }
        if self.default_sample_duration.is_some() {
            payload += 4;
        }
        if self.default_sample_size.is_some() {
            payload += 4;
        }
        if self.default_sample_flags.is_some() {
            payload += 4;
        }
        self.size_field.box_size(payload)
    }

    pub fn duration_is_empty(&self) -> bool {
        self.flags & Self::FLAG_DURATION_IS_EMPTY != 0
    }

    pub fn default_base_is_moof(&self) -> bool {
        self.flags & Self::FLAG_DEFAULT_BASE_IS_MOOF != 0
    }

    /// The flags written for this box.
    pub fn encoded_flags(&self) -> u32 {
        let mut flags = self.flags & !Self::FIELD_FLAGS;
        if self.base_data_offset.is_some() {
            flags |= Self::FLAG_BASE_DATA_OFFSET;
        }
        if self.sample_description_index.is_some() {
            flags |= Self::FLAG_SAMPLE_DESCRIPTION_INDEX;
        }
        if self.default_sample_duration.is_some() {
            flags |= Self::FLAG_DEFAULT_SAMPLE_DURATION;
        }
        if self.default_sample_size.is_some() {
            flags |= Self::FLAG_DEFAULT_SAMPLE_SIZE;
        }
        if self.default_sample_flags.is_some() {
            flags |= Self::FLAG_DEFAULT_SAMPLE_FLAGS;
        }
        flags
    }
}

impl Mp4Box for TfhdBox {
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
        let s = format!("track_id={}", self.track_id);
        Ok(s)
    }
}

impl<R: Read + ?Sized> ReadBox<&mut R> for TfhdBox {
    fn read_box(reader: &mut R, header: &BoxHeader) -> Result<Self> {
        let (version, flags) = read_box_header_ext(reader)?;

        let track_id = reader.read_u32::<BigEndian>()?;

        let base_data_offset = if flags & Self::FLAG_BASE_DATA_OFFSET != 0 {
            Some(reader.read_u64::<BigEndian>()?)
        } else {
            None
        };
        let sample_description_index = if flags & Self::FLAG_SAMPLE_DESCRIPTION_INDEX != 0 {
            Some(reader.read_u32::<BigEndian>()?)
        } else {
            None
        };
        let default_sample_duration = if flags & Self::FLAG_DEFAULT_SAMPLE_DURATION != 0 {
            Some(reader.read_u32::<BigEndian>()?)
        } else {
            None
        };
        let default_sample_size = if flags & Self::FLAG_DEFAULT_SAMPLE_SIZE != 0 {
            Some(reader.read_u32::<BigEndian>()?)
        } else {
            None
        };
        let default_sample_flags = if flags & Self::FLAG_DEFAULT_SAMPLE_FLAGS != 0 {
            Some(reader.read_u32::<BigEndian>()?)
        } else {
            None
        };

        Ok(TfhdBox {
            size_field: header.size_field,
            version,
            flags,
            track_id,
            base_data_offset,
            sample_description_index,
            default_sample_duration,
            default_sample_size,
            default_sample_flags,
        })
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for TfhdBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;

        write_box_header_ext(writer, self.version, self.encoded_flags())?;

        writer.write_u32::<BigEndian>(self.track_id)?;

        if let Some(val) = self.base_data_offset {
            writer.write_u64::<BigEndian>(val)?;
        }
        if let Some(val) = self.sample_description_index {
            writer.write_u32::<BigEndian>(val)?;
        }
        if let Some(val) = self.default_sample_duration {
            writer.write_u32::<BigEndian>(val)?;
        }
        if let Some(val) = self.default_sample_size {
            writer.write_u32::<BigEndian>(val)?;
        }
        if let Some(val) = self.default_sample_flags {
            writer.write_u32::<BigEndian>(val)?;
        }

        Ok(size)
    }
}
