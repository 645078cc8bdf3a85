//! The destination of a `get` transfer: either a file opened for binary
//! write, or an in-memory buffer (source: `open(self.filename, 'wb')` vs.
//! `io.BytesIO()` in `__handle_open_ro_reply`).

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

#[derive(Debug)]
pub enum Sink {
    Memory(Cursor<Vec<u8>>),
    File(File),
}

impl Sink {
    pub fn open_file(path: &str) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Sink::File(file))
    }

    pub fn memory() -> Self {
        Sink::Memory(Cursor::new(Vec::new()))
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    /// Consume the sink and return its bytes, for the `local == "-"` path
    /// that decodes the result as UTF-8 and logs it rather than handing the
    /// caller a handle.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for Sink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Sink::Memory(c) => c.read(buf),
            Sink::File(f) => f.read(buf),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Memory(c) => c.write(buf),
            Sink::File(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Memory(c) => c.flush(),
            Sink::File(f) => f.flush(),
        }
    }
}

impl Seek for Sink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Sink::Memory(c) => c.seek(pos),
            Sink::File(f) => f.seek(pos),
        }
    }
}

/// Seeks to `offset` and writes `payload`, leaving the cursor positioned
/// right after it (the source's `__write_payload`: `seek(op.offset);
/// write(op.payload)`). For in-order and forward-jump writes this is exactly
/// where the read cursor should end up; callers repairing a gap that lies
/// behind the cursor must restore it themselves afterwards.
pub fn write_at(sink: &mut Sink, offset: u32, payload: &[u8]) -> io::Result<()> {
    sink.seek(SeekFrom::Start(offset as u64))?;
    sink.write_all(payload)?;
    Ok(())
}

/// Like [`write_at`], but restores the cursor to its pre-call position
/// afterwards. Used when filling a gap that lies behind the main read
/// cursor, so the next sequential write still lands at the right spot
/// (the source's explicit `self.fh.seek(ofs)` right after `__write_payload`
/// in the `op.offset < ofs` branch).
pub fn write_at_and_restore(sink: &mut Sink, offset: u32, payload: &[u8]) -> io::Result<()> {
    let restore_to = sink.stream_position()?;
    write_at(sink, offset, payload)?;
    sink.seek(SeekFrom::Start(restore_to))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_at_and_restore_preserves_cursor() {
        let mut sink = Sink::memory();
        sink.write_all(&[0u8; 100]).unwrap();
        sink.seek(SeekFrom::Start(50)).unwrap();
        write_at_and_restore(&mut sink, 10, &[1, 2, 3]).unwrap();
        assert_eq!(sink.stream_position().unwrap(), 50);
        let bytes = sink.into_bytes().unwrap();
        assert_eq!(&bytes[10..13], &[1, 2, 3]);
    }
}
