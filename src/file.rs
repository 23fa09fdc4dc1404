use log::{debug, warn};
use std::io::{Read, Seek, Write};

use crate::mp4box::*;
use crate::*;

/// Boxes that belong to one `moof`: optional prefix boxes (`emsg`, `prft`),
/// the `moof`, its `mdat` and anything else up to the next fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub children: Vec<BoxNode>,
}

impl Fragment {
    pub fn moof(&self) -> Option<&ContainerBox> {
        self.children
            .iter()
            .find(|c| c.box_type() == BoxType::MoofBox)
            .and_then(BoxNode::as_container)
    }

    pub fn mdat(&self) -> Option<&MdatBox> {
        self.children.iter().find_map(BoxNode::as_mdat)
    }

    pub fn sequence_number(&self) -> Option<u32> {
        self.moof()
            .and_then(|moof| moof.child(BoxType::MfhdBox))
            .and_then(BoxNode::as_mfhd)
            .map(|mfhd| mfhd.sequence_number)
    }

    pub fn size(&self) -> u64 {
        self.children.iter().map(|c| c.box_size()).sum()
    }

    fn has_moof(&self) -> bool {
        self.moof().is_some()
    }
}

/// A media segment: the boxes that open it (`styp`, `sidx`, ...) and its fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub children: Vec<BoxNode>,
    pub fragments: Vec<Fragment>,
}

impl Segment {
    pub fn styp(&self) -> Option<&FtypBox> {
        self.children.iter().find_map(BoxNode::as_ftyp)
    }

    pub fn sidxs(&self) -> impl Iterator<Item = &SidxBox> {
        self.children.iter().filter_map(BoxNode::as_sidx)
    }

    pub fn size(&self) -> u64 {
        let own: u64 = self.children.iter().map(|c| c.box_size()).sum();
        own + self.fragments.iter().map(Fragment::size).sum::<u64>()
    }
}

/// Where a byte range of sample data lives: `len` bytes at `offset` into
/// the payload of the `mdat`-th mdat of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSegment {
    pub mdat: usize,
    pub offset: u64,
    pub len: u64,
}

/// A decoded ISO BMFF file.
///
/// `children` holds the top-level boxes that precede the first segment
/// (for a progressive file, all of them). Boxes keep stream order across
/// `children`, `segments` and their fragments, so encoding an unchanged
/// file reproduces its bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct File {
    pub children: Vec<BoxNode>,
    pub segments: Vec<Segment>,
}

impl File {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes from the current position to the end of `reader`, buffering mdat payloads.
    pub fn decode<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Self::decode_with(reader, &DecodeOptions::default())
    }

    pub fn decode_with<R: Read + Seek>(reader: &mut R, options: &DecodeOptions) -> Result<Self> {
        let mut decoder = BoxDecoder::new(reader, options)?;
        let end = decoder.stream_len()?;

        let mut file = File::new();
        let mut prev = None;
        while decoder.position()? < end {
            let node = decoder.decode_box(end)?;
            prev = Some(file.push(node, prev));
        }
        file.log_decoded();
        Ok(file)
    }

    /// Decodes everything `reader` yields, reading it strictly in order.
    ///
    /// Mdat payloads are always buffered; lazy decoding needs a seekable
    /// source to read them from later. A top-level box with `size == 0`
    /// makes the rest of the stream be read into memory first.
    pub fn decode_stream<R: Read>(reader: R) -> Result<Self> {
        Self::decode_stream_with(reader, &DecodeOptions::default())
    }

    pub fn decode_stream_with<R: Read>(reader: R, options: &DecodeOptions) -> Result<Self> {
        if options.mode == DecodeMode::LazyMdat {
            return Err(Error::InvalidData("lazy mdat decoding needs a seekable source"));
        }
        let mut stream = StreamReader::new(reader);

        let mut file = File::new();
        let mut prev = None;
        while !stream.at_eof()? {
            let node = BoxDecoder::sequential(&mut stream, options).decode_top_level()?;
            prev = Some(file.push(node, prev));
        }
        file.log_decoded();
        Ok(file)
    }

    fn push(&mut self, node: BoxNode, prev: Option<BoxType>) -> BoxType {
        let box_type = node.box_type();
        self.place(node, prev);
        box_type
    }

    fn log_decoded(&self) {
        debug!(
            "decoded {} top-level boxes, {} segments",
            self.children.len(),
            self.segments.len()
        );
    }

    /// Adds a top-level box after `prev`, the type of the box before it.
    fn place(&mut self, node: BoxNode, prev: Option<BoxType>) {
        let box_type = node.box_type();
        match box_type {
            BoxType::StypBox => {
                debug!("styp opens segment {}", self.segments.len());
                self.segments.push(Segment {
                    children: vec![node],
                    fragments: Vec::new(),
                });
            }
            BoxType::SidxBox => {
                let continues = matches!(prev, Some(BoxType::StypBox) | Some(BoxType::SidxBox));
                match self.segments.last_mut() {
                    Some(segment) if continues => segment.children.push(node),
                    _ => {
                        debug!("sidx opens segment {}", self.segments.len());
                        self.segments.push(Segment {
                            children: vec![node],
                            fragments: Vec::new(),
                        });
                    }
                }
            }
            BoxType::MoofBox => {
                let segment = self.current_segment();
                match segment.fragments.last_mut() {
                    Some(fragment) if !fragment.has_moof() => fragment.children.push(node),
                    _ => segment.fragments.push(Fragment {
                        children: vec![node],
                    }),
                }
            }
            BoxType::EmsgBox | BoxType::PrftBox if !self.segments.is_empty() => {
                let segment = self.current_segment();
                match segment.fragments.last_mut() {
                    Some(fragment) if !fragment.has_moof() => fragment.children.push(node),
                    _ => segment.fragments.push(Fragment {
                        children: vec![node],
                    }),
                }
            }
            _ => match self.segments.last_mut() {
                None => self.children.push(node),
                Some(segment) => match segment.fragments.last_mut() {
                    Some(fragment) => {
                        if box_type == BoxType::MdatBox && !fragment.has_moof() {
                            warn!("mdat in a fragment without moof");
                        }
                        fragment.children.push(node)
                    }
                    None => {
                        if box_type == BoxType::MdatBox {
                            warn!("mdat in a segment before any moof");
                        }
                        segment.children.push(node)
                    }
                },
            },
        }
    }

    fn current_segment(&mut self) -> &mut Segment {
        if self.segments.is_empty() {
            debug!("moof without styp opens segment 0");
            self.segments.push(Segment::default());
        }
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    /// Every top-level box in stream order.
    pub fn boxes(&self) -> impl Iterator<Item = &BoxNode> {
        self.children.iter().chain(self.segments.iter().flat_map(|segment| {
            segment
                .children
                .iter()
                .chain(segment.fragments.iter().flat_map(|f| f.children.iter()))
        }))
    }

    pub fn boxes_mut(&mut self) -> impl Iterator<Item = &mut BoxNode> {
        self.children.iter_mut().chain(self.segments.iter_mut().flat_map(
            |Segment {
                 children,
                 fragments,
             }| {
                children
                    .iter_mut()
                    .chain(fragments.iter_mut().flat_map(|f| f.children.iter_mut()))
            },
        ))
    }

    pub fn ftyp(&self) -> Option<&FtypBox> {
        self.children
            .iter()
            .filter_map(BoxNode::as_ftyp)
            .find(|ftyp| ftyp.box_type == BoxType::FtypBox)
    }

    pub fn moov(&self) -> Option<&ContainerBox> {
        self.boxes()
            .find(|b| b.box_type() == BoxType::MoovBox)
            .and_then(BoxNode::as_container)
    }

    pub fn is_fragmented(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn tracks(&self) -> Result<Vec<Track<'_>>> {
        let moov = self.moov().ok_or(Error::BoxNotFound(BoxType::MoovBox))?;
        moov.children_of(BoxType::TrakBox)
            .filter_map(BoxNode::as_container)
            .map(Track::new)
            .collect()
    }

    pub fn track(&self, track_id: u32) -> Result<Track<'_>> {
        self.tracks()?
            .into_iter()
            .find(|t| t.track_id() == track_id)
            .ok_or(Error::TrakNotFound(track_id))
    }

    /// Every mdat in stream order.
    pub fn mdats(&self) -> impl Iterator<Item = &MdatBox> {
        self.boxes().filter_map(BoxNode::as_mdat)
    }

    /// Encoded size of the whole file.
    pub fn size(&self) -> u64 {
        self.boxes().map(|b| b.box_size()).sum()
    }

    /// Writes the file. Fails on lazy mdats, which need [`File::encode_with_source`].
    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<u64> {
        let mut written = 0;
        for node in self.boxes() {
            written += node.write_box(writer)?;
        }
        Ok(written)
    }

    /// Writes the file, reading lazy mdat payloads from `source`.
    pub fn encode_with_source<W, R>(&self, writer: &mut W, source: &mut R) -> Result<u64>
    where
        W: Write + ?Sized,
        R: Read + Seek + ?Sized,
    {
        let mut written = 0;
        for node in self.boxes() {
            written += node.write_box_with_source(writer, source)?;
        }
        Ok(written)
    }

    /// Encodes into `buf`, whose length must equal [`File::size`].
    pub fn encode_to_slice(&self, buf: &mut [u8]) -> Result<u64> {
        let mut writer = SliceWriter::new(buf);
        self.check_capacity(writer.capacity())?;
        self.encode(&mut writer)?;
        Ok(writer.offset() as u64)
    }

    pub fn encode_to_slice_with_source<R>(&self, buf: &mut [u8], source: &mut R) -> Result<u64>
    where
        R: Read + Seek + ?Sized,
    {
        let mut writer = SliceWriter::new(buf);
        self.check_capacity(writer.capacity())?;
        self.encode_with_source(&mut writer, source)?;
        Ok(writer.offset() as u64)
    }

    fn check_capacity(&self, capacity: usize) -> Result<()> {
        let computed = self.size();
        if computed != capacity as u64 {
            return Err(Error::SizeMismatch {
                computed,
                capacity: capacity as u64,
            });
        }
        Ok(())
    }

    /// Buffers every lazy mdat payload.
    pub fn load_lazy_mdats<R: Read + Seek + ?Sized>(&mut self, source: &mut R) -> Result<()> {
        for node in self.boxes_mut() {
            if let BoxNode::Mdat(mdat) = node {
                mdat.load_payload(source)?;
            }
        }
        Ok(())
    }

    /// Maps samples `start..=end` of `track` to byte ranges inside this file's mdats.
    pub fn resolve_sample_range(
        &self,
        track: &Track<'_>,
        start: u32,
        end: u32,
    ) -> Result<Vec<SampleSegment>> {
        if self.moov().is_none() {
            return Err(Error::InvalidData("sample lookup needs a moov sample table"));
        }
        let mdats: Vec<&MdatBox> = self.mdats().collect();
        let mut segments = Vec::new();
        for (offset, len) in track.sample_runs(start, end)? {
            let index = mdats
                .iter()
                .position(|mdat| mdat.contains(offset, len))
                .ok_or(Error::InvalidData("sample data is not inside any mdat"))?;
            segments.push(SampleSegment {
                mdat: index,
                offset: offset - mdats[index].payload_offset,
                len,
            });
        }
        Ok(segments)
    }

    /// Copies the bytes of samples `start..=end` of `track` into `dst`.
    ///
    /// Lazy payloads are read from `source`, through `scratch` when it is
    /// given and non-empty. Returns the number of bytes copied, which is
    /// the sum of the sample sizes.
    pub fn copy_sample_data<W, R>(
        &self,
        dst: &mut W,
        source: &mut R,
        track: &Track<'_>,
        start: u32,
        end: u32,
        mut scratch: Option<&mut [u8]>,
    ) -> Result<u64>
    where
        W: Write + ?Sized,
        R: Read + Seek + ?Sized,
    {
        let segments = self.resolve_sample_range(track, start, end)?;
        let mdats: Vec<&MdatBox> = self.mdats().collect();
        let mut copied = 0;
        for segment in segments {
            copied += mdats[segment.mdat].copy_data(
                dst,
                source,
                segment.offset,
                segment.len,
                scratch.as_deref_mut(),
            )?;
        }
        debug!(
            "copied {} bytes of samples {}..={} of track {}",
            copied,
            start,
            end,
            track.track_id()
        );
        Ok(copied)
    }
}
