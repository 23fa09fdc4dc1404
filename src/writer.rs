use std::io::{self, Write};

/// Writes into a caller-owned slice without ever reallocating.
///
/// A write that does not fit fails with `WriteZero`; bytes already
/// written stay in the slice.
#[derive(Debug)]
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> SliceWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Bytes written so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }
}

impl<'a> Write for SliceWriter<'a> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.len() > self.remaining() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write past the end of the output slice",
            ));
        }
        let end = self.offset + data.len();
        self.buf[self.offset..end].copy_from_slice(data);
        self.offset = end;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
