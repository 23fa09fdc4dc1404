//! All ISO-MP4 boxes (atoms) this crate decodes into typed structures.
//!
//! Every box is a [`BoxNode`]. Boxes whose type code has a decoder in the
//! [`BoxRegistry`](crate::BoxRegistry) become typed variants, plain
//! containers become [`ContainerBox`] and anything else is kept verbatim as
//! an [`UnknownBox`].
//!
//! Typed boxes:
//! ftyp / styp
//! moov, trak, mdia, minf, stbl, dinf, edts, mvex (containers)
//!     tkhd
//!     stsc
//!     stsz
//!     stco
//!     co64
//! moof, traf, mfra (containers)
//!     mfhd
//!     tfhd
//!     tfdt
//!     trun
//! sidx
//! mdat

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Write};

use crate::*;

pub(crate) mod co64;
pub(crate) mod container;
pub(crate) mod ftyp;
pub(crate) mod mdat;
pub(crate) mod mfhd;
pub(crate) mod sidx;
pub(crate) mod stco;
pub(crate) mod stsc;
pub(crate) mod stsz;
pub(crate) mod tfdt;
pub(crate) mod tfhd;
pub(crate) mod tkhd;
pub(crate) mod trun;
pub(crate) mod unknown;

pub use co64::Co64Box;
pub use container::ContainerBox;
pub use ftyp::FtypBox;
pub use mdat::{MdatBox, MdatPayload};
pub use mfhd::MfhdBox;
pub use sidx::{SidxBox, SidxReference};
pub use stco::StcoBox;
pub use stsc::{StscBox, StscEntry};
pub use stsz::StszBox;
pub use tfdt::TfdtBox;
pub use tfhd::TfhdBox;
pub use tkhd::{Matrix, TkhdBox};
pub use trun::{TrunBox, TrunEntry};
pub use unknown::UnknownBox;

pub const HEADER_SIZE: u64 = 8;
pub const HEADER_LARGE_SIZE: u64 = 16;
pub const HEADER_EXT_SIZE: u64 = 4;

macro_rules! boxtype {
    ($( $name:ident => $value:expr ),*) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub enum BoxType {
            $( $name, )*
            UnknownBox(u32),
        }

        impl From<u32> for BoxType {
            fn from(t: u32) -> BoxType {
                match t {
                    $( $value => BoxType::$name, )*
                    _ => BoxType::UnknownBox(t),
                }
            }
        }

        impl From<BoxType> for u32 {
            fn from(b: BoxType) -> u32 {
                match b {
                    $( BoxType::$name => $value, )*
                    BoxType::UnknownBox(t) => t,
                }
            }
        }
    }
}

boxtype! {
    FtypBox => 0x66747970,
    StypBox => 0x73747970,
    MvhdBox => 0x6d766864,
    MfhdBox => 0x6d666864,
    FreeBox => 0x66726565,
    SkipBox => 0x736b6970,
    MdatBox => 0x6d646174,
    MoovBox => 0x6d6f6f76,
    MvexBox => 0x6d766578,
    MehdBox => 0x6d656864,
    TrexBox => 0x74726578,
    EmsgBox => 0x656d7367,
    PrftBox => 0x70726674,
    MoofBox => 0x6d6f6f66,
    TkhdBox => 0x746b6864,
    TfhdBox => 0x74666864,
    TfdtBox => 0x74666474,
    EdtsBox => 0x65647473,
    MdiaBox => 0x6d646961,
    ElstBox => 0x656c7374,
    MdhdBox => 0x6d646864,
    HdlrBox => 0x68646c72,
    MinfBox => 0x6d696e66,
    VmhdBox => 0x766d6864,
    StblBox => 0x7374626c,
    StsdBox => 0x73747364,
    SttsBox => 0x73747473,
    CttsBox => 0x63747473,
    StssBox => 0x73747373,
    StscBox => 0x73747363,
    StszBox => 0x7374737A,
    StcoBox => 0x7374636F,
    Co64Box => 0x636F3634,
    TrakBox => 0x7472616b,
    TrafBox => 0x74726166,
    TrunBox => 0x7472756E,
    SidxBox => 0x73696478,
    MfraBox => 0x6d667261,
    TfraBox => 0x74667261,
    MfroBox => 0x6d66726f,
    UdtaBox => 0x75647461,
    MetaBox => 0x6d657461,
    DinfBox => 0x64696e66,
    DrefBox => 0x64726566,
    SmhdBox => 0x736d6864
}

/// How a box header encodes its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SizeField {
    /// 32-bit size, promoted to 64-bit only when the box outgrows it.
    Compact,
    /// `size == 1` followed by a 64-bit `largesize`.
    Large,
    /// `size == 0`, the box runs to the end of its enclosing box or stream.
    ToEnd,
}

impl Default for SizeField {
    fn default() -> Self {
        SizeField::Compact
    }
}

impl SizeField {
    /// Header length used when this field is written in front of `payload_size` bytes.
    pub fn header_size(self, payload_size: u64) -> u64 {
        match self {
            SizeField::Large => HEADER_LARGE_SIZE,
            SizeField::ToEnd => HEADER_SIZE,
            SizeField::Compact => {
                if payload_size + HEADER_SIZE > u32::MAX as u64 {
                    HEADER_LARGE_SIZE
                } else {
                    HEADER_SIZE
                }
            }
        }
    }

    /// Full size of a box with `payload_size` bytes behind this header form.
    pub fn box_size(self, payload_size: u64) -> u64 {
        self.header_size(payload_size) + payload_size
    }
}

pub trait Mp4Box: Sized {
    fn box_type(&self) -> BoxType;
    fn box_size(&self) -> u64;
    fn to_json(&self) -> Result<String>;
    fn summary(&self) -> Result<String>;
}

/// Decodes a box body. The reader is positioned right after `header`.
pub trait ReadBox<T>: Sized {
    fn read_box(_: T, header: &BoxHeader) -> Result<Self>;
}

pub trait WriteBox<T>: Sized {
    fn write_box(&self, _: T) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub name: BoxType,
    pub size: u64,
    pub size_field: SizeField,
}

impl BoxHeader {
    pub fn new(name: BoxType, size: u64) -> Self {
        Self {
            name,
            size,
            size_field: SizeField::Compact,
        }
    }

    pub fn with_size_field(mut self, size_field: SizeField) -> Self {
        self.size_field = size_field;
        self
    }

    /// Reads a header. A `size == 0` header comes back with `size` 0 and
    /// [`SizeField::ToEnd`]; the decoder resolves it against the enclosing end.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let size = reader.read_u32::<BigEndian>()?;
        let typ = reader.read_u32::<BigEndian>()?;

        match size {
            1 => {
                let largesize = reader.read_u64::<BigEndian>()?;
                Ok(BoxHeader {
                    name: BoxType::from(typ),
                    size: largesize,
                    size_field: SizeField::Large,
                })
            }
            0 => Ok(BoxHeader {
                name: BoxType::from(typ),
                size: 0,
                size_field: SizeField::ToEnd,
            }),
            _ => Ok(BoxHeader {
                name: BoxType::from(typ),
                size: size as u64,
                size_field: SizeField::Compact,
            }),
        }
    }

    /// Number of header bytes as read from the stream.
    pub fn header_size(&self) -> u64 {
        match self.size_field {
            SizeField::Large => HEADER_LARGE_SIZE,
            _ => HEADER_SIZE,
        }
    }

    pub fn payload_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size())
    }

    /// Writes the header in its recorded form. A to-end header is always
    /// `size == 0`, whatever the box size; a compact one is promoted to a
    /// largesize header when the size does not fit 32 bits.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<u64> {
        let large = match self.size_field {
            SizeField::ToEnd => false,
            SizeField::Large => true,
            SizeField::Compact => self.size > u32::MAX as u64,
        };
        if large {
            writer.write_u32::<BigEndian>(1)?;
            writer.write_u32::<BigEndian>(self.name.into())?;
            writer.write_u64::<BigEndian>(self.size)?;
            Ok(HEADER_LARGE_SIZE)
        } else {
            let size = match self.size_field {
                SizeField::ToEnd => 0,
                _ => self.size as u32,
            };
            writer.write_u32::<BigEndian>(size)?;
            writer.write_u32::<BigEndian>(self.name.into())?;
            Ok(HEADER_SIZE)
        }
    }
}

pub fn read_box_header_ext<R: Read + ?Sized>(reader: &mut R) -> Result<(u8, u32)> {
    let version = reader.read_u8()?;
    let flags = reader.read_u24::<BigEndian>()?;
    Ok((version, flags))
}

pub fn write_box_header_ext<W: Write + ?Sized>(w: &mut W, v: u8, f: u32) -> Result<u64> {
    w.write_u8(v)?;
    w.write_u24::<BigEndian>(f)?;
    Ok(4)
}

/// Reads exactly `size` payload bytes. Memory grows with the bytes that
/// actually arrive, so a bogus size on a sequential stream fails at its end
/// instead of allocating up front.
pub(crate) fn read_payload<R: Read + ?Sized>(reader: &mut R, size: u64) -> Result<Bytes> {
    const PREALLOC_LIMIT: u64 = 16 << 20;
    let mut data = Vec::with_capacity(size.min(PREALLOC_LIMIT) as usize);
    reader.take(size).read_to_end(&mut data)?;
    if (data.len() as u64) < size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "stream ended inside a box payload",
        )
        .into());
    }
    Ok(Bytes::from(data))
}

/// Rejects entry counts that cannot fit in the remaining `available` bytes
/// before anything is allocated for them.
pub(crate) fn check_entry_count(
    box_type: BoxType,
    entry_count: u64,
    entry_size: u64,
    available: u64,
) -> Result<()> {
    if entry_count > available / entry_size {
        return Err(Error::MalformedBox(
            box_type,
            "entry count indicates more entries than could fit in the box",
        ));
    }
    Ok(())
}

/// A decoded box of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BoxNode {
    Container(ContainerBox),
    Ftyp(FtypBox),
    Tkhd(TkhdBox),
    Stsc(StscBox),
    Stsz(StszBox),
    Stco(StcoBox),
    Co64(Co64Box),
    Mfhd(MfhdBox),
    Tfhd(TfhdBox),
    Tfdt(TfdtBox),
    Trun(TrunBox),
    Sidx(SidxBox),
    Mdat(MdatBox),
    Unknown(UnknownBox),
}

macro_rules! dispatch {
    ($node:expr, $b:ident => $e:expr) => {
        match $node {
            BoxNode::Container($b) => $e,
            BoxNode::Ftyp($b) => $e,
            BoxNode::Tkhd($b) => $e,
            BoxNode::Stsc($b) => $e,
            BoxNode::Stsz($b) => $e,
            BoxNode::Stco($b) => $e,
            BoxNode::Co64($b) => $e,
            BoxNode::Mfhd($b) => $e,
            BoxNode::Tfhd($b) => $e,
            BoxNode::Tfdt($b) => $e,
            BoxNode::Trun($b) => $e,
            BoxNode::Sidx($b) => $e,
            BoxNode::Mdat($b) => $e,
            BoxNode::Unknown($b) => $e,
        }
    };
}

macro_rules! node_accessors {
    ($( $variant:ident => $typ:ty, $as_ref:ident, $as_mut:ident; )*) => {
        impl BoxNode {
            $(
                pub fn $as_ref(&self) -> Option<&$typ> {
                    match self {
                        BoxNode::$variant(b) => Some(b),
                        _ => None,
                    }
                }

                pub fn $as_mut(&mut self) -> Option<&mut $typ> {
                    match self {
                        BoxNode::$variant(b) => Some(b),
                        _ => None,
                    }
                }
            )*
        }
    };
}

node_accessors! {
    Container => ContainerBox, as_container, as_container_mut;
    Ftyp => FtypBox, as_ftyp, as_ftyp_mut;
    Tkhd => TkhdBox, as_tkhd, as_tkhd_mut;
    Stsc => StscBox, as_stsc, as_stsc_mut;
    Stsz => StszBox, as_stsz, as_stsz_mut;
    Stco => StcoBox, as_stco, as_stco_mut;
    Co64 => Co64Box, as_co64, as_co64_mut;
    Mfhd => MfhdBox, as_mfhd, as_mfhd_mut;
    Tfhd => TfhdBox, as_tfhd, as_tfhd_mut;
    Tfdt => TfdtBox, as_tfdt, as_tfdt_mut;
    Trun => TrunBox, as_trun, as_trun_mut;
    Sidx => SidxBox, as_sidx, as_sidx_mut;
    Mdat => MdatBox, as_mdat, as_mdat_mut;
    Unknown => UnknownBox, as_unknown, as_unknown_mut;
}

impl BoxNode {
    /// Writes this box, streaming lazy mdat payloads from `source`.
    pub fn write_box_with_source<W, R>(&self, writer: &mut W, source: &mut R) -> Result<u64>
    where
        W: Write + ?Sized,
        R: Read + std::io::Seek + ?Sized,
    {
        match self {
            BoxNode::Mdat(mdat) => mdat.write_box_with_source(writer, source),
            BoxNode::Container(container) => container.write_box_with_source(writer, source),
            other => other.write_box(writer),
        }
    }
}

impl Mp4Box for BoxNode {
    fn box_type(&self) -> BoxType {
        dispatch!(self, b => b.box_type())
    }

    fn box_size(&self) -> u64 {
        dispatch!(self, b => b.box_size())
    }

    fn to_json(&self) -> Result<String> {
        dispatch!(self, b => b.to_json())
    }

    fn summary(&self) -> Result<String> {
        dispatch!(self, b => b.summary())
    }
}

impl<W: Write + ?Sized> WriteBox<&mut W> for BoxNode {
    fn write_box(&self, writer: &mut W) -> Result<u64> {
        dispatch!(self, b => b.write_box(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_compact() {
        let mut buf = Vec::new();
        BoxHeader::new(BoxType::FreeBox, 24).write(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 24, b'f', b'r', b'e', b'e']);

        let header = BoxHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(header.name, BoxType::FreeBox);
        assert_eq!(header.size, 24);
        assert_eq!(header.header_size(), 8);
        assert_eq!(header.payload_size(), 16);
    }

    #[test]
    fn test_header_large() {
        let header = BoxHeader::new(BoxType::MdatBox, 40).with_size_field(SizeField::Large);
        let mut buf = Vec::new();
        assert_eq!(header.write(&mut buf).unwrap(), HEADER_LARGE_SIZE);
        assert_eq!(buf.len(), 16);

        let read = BoxHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(read, header);
        assert_eq!(read.payload_size(), 24);
    }

    #[test]
    fn test_header_promoted_when_oversized() {
        let size = u32::MAX as u64 + 100;
        let mut buf = Vec::new();
        BoxHeader::new(BoxType::MdatBox, size).write(&mut buf).unwrap();
        let read = BoxHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(read.size, size);
        assert_eq!(read.size_field, SizeField::Large);
        assert_eq!(SizeField::Compact.header_size(size), HEADER_LARGE_SIZE);
    }

    #[test]
    fn test_header_to_end() {
        let buf = [0, 0, 0, 0, b'm', b'd', b'a', b't'];
        let header = BoxHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(header.size_field, SizeField::ToEnd);
        assert_eq!(header.size, 0);

        let mut out = Vec::new();
        header.with_size_field(SizeField::ToEnd).write(&mut out).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn test_header_to_end_never_promoted() {
        let size = u32::MAX as u64 + 10;
        let header = BoxHeader::new(BoxType::MdatBox, size).with_size_field(SizeField::ToEnd);
        let mut buf = Vec::new();
        let written = header.write(&mut buf).unwrap();
        assert_eq!(written, SizeField::ToEnd.header_size(size - HEADER_SIZE));
        assert_eq!(buf, [0, 0, 0, 0, b'm', b'd', b'a', b't']);
        assert_eq!(SizeField::ToEnd.box_size(size - HEADER_SIZE), size);
    }

    #[test]
    fn test_header_truncated() {
        let buf = [0, 0, 0];
        assert!(BoxHeader::read(&mut Cursor::new(&buf)).is_err());
    }
}
