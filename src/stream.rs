use std::io::{self, Read, Seek, SeekFrom};

/// Lets boxes be decoded from a plain [`Read`] such as a pipe or socket.
///
/// The adapter counts the bytes it hands out, so positions match what a
/// seekable source would report. Forward seeks discard bytes. Seeking
/// relative to the end reads the rest of the stream into memory, after
/// which the buffered tail can be revisited. Any other backward seek fails
/// with `Unsupported`.
#[derive(Debug)]
pub struct StreamReader<R> {
    inner: R,
    pos: u64,
    // bytes [tail_start, tail_start + tail.len()) already pulled from `inner`
    tail: Vec<u8>,
    tail_start: u64,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pos: 0,
            tail: Vec::new(),
            tail_start: 0,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// True when nothing follows the current position.
    pub fn at_eof(&mut self) -> io::Result<bool> {
        if self.pos < self.tail_end() {
            return Ok(false);
        }
        self.release_tail();
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.tail.push(byte[0]);
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn tail_end(&self) -> u64 {
        self.tail_start + self.tail.len() as u64
    }

    fn release_tail(&mut self) {
        if self.pos >= self.tail_end() {
            self.tail.clear();
            self.tail_start = self.pos;
        }
    }
}

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.tail_end() {
            let from = (self.pos - self.tail_start) as usize;
            let n = buf.len().min(self.tail.len() - from);
            buf[..n].copy_from_slice(&self.tail[from..from + n]);
            self.pos += n as u64;
            return Ok(n);
        }
        self.release_tail();
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        self.tail_start = self.pos;
        Ok(n)
    }
}

fn offset_by(base: u64, delta: i64) -> io::Result<u64> {
    let target = if delta >= 0 {
        base.checked_add(delta as u64)
    } else {
        base.checked_sub(delta.unsigned_abs())
    };
    target.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek out of range"))
}

impl<R: Read> Seek for StreamReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(delta) => offset_by(self.pos, delta)?,
            SeekFrom::End(delta) => {
                self.release_tail();
                self.inner.read_to_end(&mut self.tail)?;
                offset_by(self.tail_end(), delta)?
            }
        };

        if target < self.tail_start {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot seek back on a sequential stream",
            ));
        }
        if target > self.tail_end() {
            self.pos = self.tail_end();
            self.release_tail();
            let wanted = target - self.pos;
            let skipped = io::copy(&mut self.inner.by_ref().take(wanted), &mut io::sink())?;
            self.pos += skipped;
            self.tail_start = self.pos;
            if skipped < wanted {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended before the seek target",
                ));
            }
            return Ok(self.pos);
        }
        self.pos = target;
        Ok(self.pos)
    }
}
