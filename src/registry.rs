use log::{debug, trace};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::mp4box::*;
use crate::*;

/// Anything boxes can be decoded from.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Decodes the body of one box. The reader sits right after `header`, whose
/// size is already resolved. The decoder must consume exactly
/// `header.payload_size()` bytes.
pub type DecodeFn = fn(&mut BoxDecoder<'_>, &BoxHeader) -> Result<BoxNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Read every mdat payload into memory.
    Eager,
    /// Record mdat payload position and length only.
    LazyMdat,
}

impl Default for DecodeMode {
    fn default() -> Self {
        DecodeMode::Eager
    }
}

/// Mapping from box type to the decoder used for it.
#[derive(Debug, Clone, Default)]
pub struct BoxRegistry {
    decoders: HashMap<BoxType, DecodeFn>,
}

impl BoxRegistry {
    /// A registry without decoders: every box decodes as [`UnknownBox`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// The containers and leaf boxes this crate knows.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for container in [
            BoxType::MoovBox,
            BoxType::TrakBox,
            BoxType::MdiaBox,
            BoxType::MinfBox,
            BoxType::StblBox,
            BoxType::DinfBox,
            BoxType::EdtsBox,
            BoxType::MvexBox,
            BoxType::MoofBox,
            BoxType::TrafBox,
            BoxType::MfraBox,
        ]
        .iter()
        {
            registry.register(*container, |d, h| {
                ContainerBox::decode(d, h).map(BoxNode::Container)
            });
        }

        registry.register(BoxType::FtypBox, |d, h| {
            FtypBox::read_box(d.reader(), h).map(BoxNode::Ftyp)
        });
        registry.register(BoxType::StypBox, |d, h| {
            FtypBox::read_box(d.reader(), h).map(BoxNode::Ftyp)
        });
        registry.register(BoxType::TkhdBox, |d, h| {
            TkhdBox::read_box(d.reader(), h).map(BoxNode::Tkhd)
        });
        registry.register(BoxType::StscBox, |d, h| {
            StscBox::read_box(d.reader(), h).map(BoxNode::Stsc)
        });
        registry.register(BoxType::StszBox, |d, h| {
            StszBox::read_box(d.reader(), h).map(BoxNode::Stsz)
        });
        registry.register(BoxType::StcoBox, |d, h| {
            StcoBox::read_box(d.reader(), h).map(BoxNode::Stco)
        });
        registry.register(BoxType::Co64Box, |d, h| {
            Co64Box::read_box(d.reader(), h).map(BoxNode::Co64)
        });
        registry.register(BoxType::MfhdBox, |d, h| {
            MfhdBox::read_box(d.reader(), h).map(BoxNode::Mfhd)
        });
        registry.register(BoxType::TfhdBox, |d, h| {
            TfhdBox::read_box(d.reader(), h).map(BoxNode::Tfhd)
        });
        registry.register(BoxType::TfdtBox, |d, h| {
            TfdtBox::read_box(d.reader(), h).map(BoxNode::Tfdt)
        });
        registry.register(BoxType::TrunBox, |d, h| {
            TrunBox::read_box(d.reader(), h).map(BoxNode::Trun)
        });
        registry.register(BoxType::SidxBox, |d, h| {
            SidxBox::read_box(d.reader(), h).map(BoxNode::Sidx)
        });
        registry.register(BoxType::MdatBox, |d, h| {
            MdatBox::decode(d, h).map(BoxNode::Mdat)
        });
        registry
    }

    /// Adds or replaces the decoder for `box_type`.
    pub fn register(&mut self, box_type: BoxType, decode: DecodeFn) -> &mut Self {
        self.decoders.insert(box_type, decode);
        self
    }

    pub fn get(&self, box_type: BoxType) -> Option<DecodeFn> {
        self.decoders.get(&box_type).copied()
    }
}

/// Decode configuration.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub mode: DecodeMode,
    pub registry: BoxRegistry,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            mode: DecodeMode::Eager,
            registry: BoxRegistry::standard(),
        }
    }
}

impl DecodeOptions {
    pub fn lazy() -> Self {
        Self::default().with_mode(DecodeMode::LazyMdat)
    }

    pub fn with_mode(mut self, mode: DecodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_registry(mut self, registry: BoxRegistry) -> Self {
        self.registry = registry;
        self
    }
}

/// Recursive box decoder over a borrowed source.
pub struct BoxDecoder<'a> {
    reader: &'a mut dyn ReadSeek,
    options: &'a DecodeOptions,
    stream_len: Option<u64>,
}

impl<'a> BoxDecoder<'a> {
    pub fn new(reader: &'a mut dyn ReadSeek, options: &'a DecodeOptions) -> Result<Self> {
        let mut decoder = Self::sequential(reader, options);
        decoder.stream_len()?;
        Ok(decoder)
    }

    /// A decoder that measures the stream only when a top-level box runs
    /// to its end. Use it over a [`StreamReader`](crate::StreamReader).
    pub fn sequential(reader: &'a mut dyn ReadSeek, options: &'a DecodeOptions) -> Self {
        Self {
            reader,
            options,
            stream_len: None,
        }
    }

    pub fn reader(&mut self) -> &mut (dyn ReadSeek + 'a) {
        &mut *self.reader
    }

    pub fn mode(&self) -> DecodeMode {
        self.options.mode
    }

    pub fn stream_len(&mut self) -> Result<u64> {
        if let Some(len) = self.stream_len {
            return Ok(len);
        }
        let current = self.reader.stream_position()?;
        let len = self.reader.seek(SeekFrom::End(0))?;
        self.reader.seek(SeekFrom::Start(current))?;
        self.stream_len = Some(len);
        Ok(len)
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.reader.stream_position()?)
    }

    /// Decodes the box at the current position. `end` is the end of the
    /// enclosing box, or the stream length for top-level boxes.
    pub fn decode_box(&mut self, end: u64) -> Result<BoxNode> {
        self.decode_within(Some(end))
    }

    /// Decodes one top-level box without knowing where the stream ends.
    pub fn decode_top_level(&mut self) -> Result<BoxNode> {
        self.decode_within(None)
    }

    fn decode_within(&mut self, parent_end: Option<u64>) -> Result<BoxNode> {
        let start = self.position()?;
        let mut header = match BoxHeader::read(&mut *self.reader) {
            Ok(header) => header,
            Err(e) => {
                let available = self.available(parent_end, start)?;
                return Err(e.truncated_in(BoxType::UnknownBox(0), HEADER_SIZE, available));
            }
        };

        let end = match parent_end {
            Some(end) => Some(end),
            None if header.size_field == SizeField::ToEnd => Some(self.stream_len()?),
            None => self.stream_len,
        };
        if let (SizeField::ToEnd, Some(end)) = (header.size_field, end) {
            header.size = end.saturating_sub(start);
        }
        if header.size < header.header_size() {
            return Err(Error::MalformedBox(header.name, "box size smaller than its header"));
        }
        if let Some(end) = end {
            let available = end.saturating_sub(start);
            if header.size > available {
                if parent_end.is_none() || Some(end) == self.stream_len {
                    return Err(Error::TruncatedStream {
                        box_type: header.name,
                        needed: header.size,
                        available,
                    });
                }
                return Err(Error::MalformedBox(header.name, "box extends past its parent"));
            }
        }

        trace!("{} box at {} size {}", header.name, start, header.size);
        let decoded = match self.options.registry.get(header.name) {
            Some(decode) => decode(self, &header),
            None => {
                debug!("passing through {} box ({} bytes)", header.name, header.size);
                UnknownBox::read_box(self.reader(), &header).map(BoxNode::Unknown)
            }
        };
        let node = match decoded {
            Ok(node) => node,
            Err(e) => {
                let available = self.available(end, start)?;
                return Err(e.truncated_in(header.name, header.size, available));
            }
        };

        let consumed = self.position()? - start;
        if consumed != header.size {
            return Err(Error::BoxSizeMismatch {
                box_type: header.name,
                declared: header.size,
                consumed,
            });
        }
        Ok(node)
    }

    /// Bytes from `start` to `end`, or to the current position when the end
    /// of a sequential stream is not known yet.
    fn available(&mut self, end: Option<u64>, start: u64) -> Result<u64> {
        match end {
            Some(end) => Ok(end.saturating_sub(start)),
            None => Ok(self.position()?.saturating_sub(start)),
        }
    }

    /// Decodes sibling boxes until exactly `end` is reached.
    pub fn decode_children(&mut self, end: u64) -> Result<Vec<BoxNode>> {
        let mut children = Vec::new();
        let mut current = self.position()?;
        while current < end {
            children.push(self.decode_box(end)?);
            current = self.position()?;
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn free_box(payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        BoxHeader::new(BoxType::FreeBox, HEADER_SIZE + payload.len() as u64)
            .write(&mut buf)
            .unwrap();
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_unregistered_box_passes_through() {
        let buf = free_box(&[1, 2, 3, 4]);
        let options = DecodeOptions::default();
        let mut reader = Cursor::new(&buf);
        let mut decoder = BoxDecoder::new(&mut reader, &options).unwrap();
        let node = decoder.decode_box(buf.len() as u64).unwrap();
        let unknown = node.as_unknown().unwrap();
        assert_eq!(unknown.box_type(), BoxType::FreeBox);
        assert_eq!(&unknown.data[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_registry_makes_containers_opaque() {
        let mut buf = Vec::new();
        let child = free_box(&[9; 3]);
        BoxHeader::new(BoxType::MoovBox, HEADER_SIZE + child.len() as u64)
            .write(&mut buf)
            .unwrap();
        buf.extend_from_slice(&child);

        let options = DecodeOptions::default().with_registry(BoxRegistry::empty());
        let mut reader = Cursor::new(&buf);
        let mut decoder = BoxDecoder::new(&mut reader, &options).unwrap();
        let node = decoder.decode_box(buf.len() as u64).unwrap();
        assert_eq!(node.as_unknown().unwrap().data.as_ref(), &child[..]);

        let mut out = Vec::new();
        node.write_box(&mut out).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn test_box_past_stream_end_is_truncated() {
        let mut buf = free_box(&[0; 8]);
        buf.truncate(12);
        let options = DecodeOptions::default();
        let mut reader = Cursor::new(&buf);
        let mut decoder = BoxDecoder::new(&mut reader, &options).unwrap();
        match decoder.decode_box(buf.len() as u64) {
            Err(Error::TruncatedStream { needed, available, .. }) => {
                assert_eq!(needed, 16);
                assert_eq!(available, 12);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_size_below_header_is_malformed() {
        let buf = [0, 0, 0, 4, b'f', b'r', b'e', b'e'];
        let options = DecodeOptions::default();
        let mut reader = Cursor::new(&buf[..]);
        let mut decoder = BoxDecoder::new(&mut reader, &options).unwrap();
        assert!(matches!(
            decoder.decode_box(buf.len() as u64),
            Err(Error::MalformedBox(BoxType::FreeBox, _))
        ));
    }

    #[test]
    fn test_registry_override() {
        let mut registry = BoxRegistry::standard();
        assert!(registry.get(BoxType::StszBox).is_some());
        assert!(registry.get(BoxType::FreeBox).is_none());
        registry.register(BoxType::FreeBox, |d, h| {
            ContainerBox::decode(d, h).map(BoxNode::Container)
        });
        assert!(registry.get(BoxType::FreeBox).is_some());
    }
}
