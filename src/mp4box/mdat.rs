use log::trace;
use serde::Serialize;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::mp4box::*;

/// Where an mdat payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdatPayload {
    /// Payload held in memory.
    Buffered(Bytes),
    /// Payload left in the source; only its length is known.
    Lazy { size: u64 },
}

/// Media data box.
///
/// `payload_offset` is the absolute stream position of the first payload
/// byte when the box was decoded (0 for boxes built in memory). A lazy box
/// does not keep the source: every call that touches its bytes takes the
/// stream it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MdatBox {
    pub size_field: SizeField,
    pub payload_offset: u64,

    #[serde(skip_serializing)]
    pub payload: MdatPayload,
}

impl Default for MdatBox {
    fn default() -> Self {
        MdatBox::new(Bytes::new())
    }
}

impl MdatBox {
    pub fn new<T: Into<Bytes>>(data: T) -> Self {
        MdatBox {
            size_field: SizeField::Compact,
            payload_offset: 0,
            payload: MdatPayload::Buffered(data.into()),
        }
    }

    pub fn decode(decoder: &mut BoxDecoder<'_>, header: &BoxHeader) -> Result<Self> {
        let payload_offset = decoder.position()?;
        let size = header.payload_size();

        let payload = match decoder.mode() {
            DecodeMode::Eager => MdatPayload::Buffered(read_payload(decoder.reader(), size)?),
            DecodeMode::LazyMdat => {
                decoder.reader().seek(SeekFrom::Start(payload_offset + size))?;
                MdatPayload::Lazy { size }
            }
        };
        trace!("mdat payload at {} ({} bytes, {:?})", payload_offset, size, decoder.mode());

        Ok(MdatBox {
            size_field: header.size_field,
            payload_offset,
            payload,
        })
    }

    pub fn get_type(&self) -> BoxType {
        BoxType::MdatBox
    }

    pub fn get_size(&self) -> u64 {
        let payload = self.data_size();
        self.size_field.header_size(payload) + payload
    }

    /// Payload length in either state.
    pub fn data_size(&self) -> u64 {
        match &self.payload {
            MdatPayload::Buffered(data) => data.len() as u64,
            MdatPayload::Lazy { size } => *size,
        }
    }

    /// Bytes still left in the source: the payload length when lazy, else 0.
    pub fn lazy_data_size(&self) -> u64 {
        match &self.payload {
            MdatPayload::Buffered(_) => 0,
            MdatPayload::Lazy { size } => *size,
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.payload, MdatPayload::Lazy { .. })
    }

    /// The buffered payload, `None` while lazy.
    pub fn data(&self) -> Option<&Bytes> {
        match &self.payload {
            MdatPayload::Buffered(data) => Some(data),
            MdatPayload::Lazy { .. } => None,
        }
    }

    /// Whether the absolute stream range `[offset, offset + len)` lies inside the payload.
    pub fn contains(&self, offset: u64, len: u64) -> bool {
        offset >= self.payload_offset
            && offset
                .checked_add(len)
                .map_or(false, |end| end <= self.payload_offset + self.data_size())
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        let size = self.data_size();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(Error::ByteRangeOutOfRange { offset, len, size }),
        }
    }

    /// Reads `len` payload bytes starting `offset` bytes into the payload.
    /// Buffered payloads are sliced without copying.
    pub fn read_data<R>(&self, source: &mut R, offset: u64, len: u64) -> Result<Bytes>
    where
        R: Read + Seek + ?Sized,
    {
        self.check_range(offset, len)?;
        match &self.payload {
            MdatPayload::Buffered(data) => {
                Ok(data.slice(offset as usize..(offset + len) as usize))
            }
            MdatPayload::Lazy { .. } => {
                source.seek(SeekFrom::Start(self.payload_offset + offset))?;
                let mut data = vec![0u8; len as usize];
                source.read_exact(&mut data)?;
                Ok(Bytes::from(data))
            }
        }
    }

    /// Copies `len` payload bytes starting at `offset` into `dst`.
    ///
    /// A lazy payload is streamed straight from the source, or through
    /// `scratch` in blocks of at most `scratch.len()` bytes when one is given.
    pub fn copy_data<W, R>(
        &self,
        dst: &mut W,
        source: &mut R,
        offset: u64,
        len: u64,
        scratch: Option<&mut [u8]>,
    ) -> Result<u64>
    where
        W: Write + ?Sized,
        R: Read + Seek + ?Sized,
    {
        self.check_range(offset, len)?;
        match &self.payload {
            MdatPayload::Buffered(data) => {
                dst.write_all(&data[offset as usize..(offset + len) as usize])?;
            }
            MdatPayload::Lazy { .. } => {
                source.seek(SeekFrom::Start(self.payload_offset + offset))?;
                match scratch {
                    Some(buf) if !buf.is_empty() => {
                        let mut remaining = len;
                        while remaining > 0 {
                            let n = remaining.min(buf.len() as u64) as usize;
                            source.read_exact(&mut buf[..n])?;
                            dst.write_all(&buf[..n])?;
                            remaining -= n as u64;
                        }
                    }
                    _ => {
                        let copied = io::copy(&mut (&mut *source).take(len), dst)?;
                        if copied != len {
                            return Err(Error::IoError(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "source ended inside mdat payload",
                            )));
                        }
                    }
                }
            }
        }
        Ok(len)
    }

    /// Reads a lazy payload into memory. Does nothing when already buffered.
    pub fn load_payload<R: Read + Seek + ?Sized>(&mut self, source: &mut R) -> Result<()> {
        if let MdatPayload::Lazy { size } = self.payload {
            let data = self.read_data(source, 0, size)?;
            self.payload = MdatPayload::Buffered(data);
        }
        Ok(())
    }

    pub fn write_box_with_source<W, R>(&self, writer: &mut W, source: &mut R) -> Result<u64>
    where
        W: Write + ?Sized,
        R: Read + Seek + ?Sized,
    {
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;
        self.copy_data(writer, source, 0, self.data_size(), None)?;
        Ok(size)
    }
}

impl Mp4Box for MdatBox {
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
            "payload_offset={} data_size={} lazy={}",
            self.payload_offset,
            self.data_size(),
            self.is_lazy()
        );
        Ok(s)
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for MdatBox {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        let data = match &self.payload {
            MdatPayload::Buffered(data) => data,
            MdatPayload::Lazy { .. } => {
                return Err(Error::InvalidData("lazy mdat can only be written with its source"))
            }
        };
        let size = self.box_size();
        BoxHeader::new(self.box_type(), size)
            .with_size_field(self.size_field)
            .write(writer)?;
        writer.write_all(data)?;
        Ok(size)
    }
}
