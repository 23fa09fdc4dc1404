use thiserror::Error;

use crate::mp4box::BoxType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    IoError(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidData(&'static str),
    #[error("malformed {0} box: {1}")]
    MalformedBox(BoxType, &'static str),
    #[error("{box_type} box declares {declared} bytes but {consumed} were decoded")]
    BoxSizeMismatch {
        box_type: BoxType,
        declared: u64,
        consumed: u64,
    },
    #[error("{box_type} box needs {needed} bytes but only {available} remain in the stream")]
    TruncatedStream {
        box_type: BoxType,
        needed: u64,
        available: u64,
    },
    #[error("sample {sample} out of range 1..={count}")]
    SampleOutOfRange { sample: u32, count: u32 },
    #[error("invalid sample range {0}..={1}")]
    InvalidSampleRange(u32, u32),
    #[error("byte range {offset}+{len} exceeds payload size {size}")]
    ByteRangeOutOfRange { offset: u64, len: u64, size: u64 },
    #[error("encoded size {computed} does not match buffer capacity {capacity}")]
    SizeMismatch { computed: u64, capacity: u64 },
    #[error("bad NAL unit framing: {0}")]
    NaluFrame(&'static str),
    #[error("{0} not found")]
    BoxNotFound(BoxType),
    #[error("trak[{0}] not found")]
    TrakNotFound(u32),
    #[error("trak[{0}].{1} not found")]
    BoxInTrakNotFound(u32, BoxType),
    #[error("trak[{0}].stbl.{1}.entry[{2}] not found")]
    EntryInStblNotFound(u32, BoxType, u32),
}

impl Error {
    /// Rewrites an unexpected end of stream into `TruncatedStream` for `box_type`.
    pub(crate) fn truncated_in(self, box_type: BoxType, needed: u64, available: u64) -> Self {
        match self {
            Error::IoError(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::TruncatedStream {
                    box_type,
                    needed,
                    available,
                }
            }
            other => other,
        }
    }
}
