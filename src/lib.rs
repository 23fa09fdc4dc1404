//! `bmff` decodes ISO base media files (MP4 and fragmented MP4) into a tree
//! of boxes and writes that tree back out byte for byte.
//!
//! ```
//! use std::io::Cursor;
//! use bmff::{BoxNode, File, FtypBox, MdatBox, WriteBox};
//!
//! fn main() -> bmff::Result<()> {
//!     let mut bytes = Vec::new();
//!     BoxNode::Ftyp(FtypBox::default()).write_box(&mut bytes)?;
//!     BoxNode::Mdat(MdatBox::new(vec![1u8, 2, 3])).write_box(&mut bytes)?;
//!
//!     let file = File::decode(&mut Cursor::new(&bytes))?;
//!     assert_eq!(file.mdats().count(), 1);
//!
//!     let mut out = vec![0u8; file.size() as usize];
//!     file.encode_to_slice(&mut out)?;
//!     assert_eq!(out, bytes);
//!     Ok(())
//! }
//! ```
//!
//! Mdat payloads can be left in the source with [`DecodeOptions::lazy`];
//! anything that needs those bytes afterwards takes the source again.

mod error;
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

mod types;
pub use types::*;

mod mp4box;
pub use mp4box::*;

mod registry;
pub use registry::{BoxDecoder, BoxRegistry, DecodeFn, DecodeMode, DecodeOptions, ReadSeek};

mod stream;
pub use stream::StreamReader;

mod track;
pub use track::Track;

mod writer;
pub use writer::SliceWriter;

pub mod nalu;
pub use nalu::{is_idr_sample, nalu_types, nalus_from_sample, sample_from_nalus, NaluType};

mod file;
pub use file::{File, Fragment, SampleSegment, Segment};
