//! Seekable sink that hands out bytes as they are written
//!
//! Writers like hound's need `Write + Seek` because they go back to patch
//! length fields once the stream is done. Here everything after the header
//! is drained chunk by chunk, and a copy of the header region is kept so
//! those late patches still land somewhere.

use parking_lot::Mutex;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Staged {
    /// Bytes already drained; nothing below this offset is buffered
    drained: u64,
    /// Bytes at or after `drained`
    pending: Vec<u8>,
    /// Copy of the header region `[0, header.len())`
    header: Vec<u8>,
    pos: u64,
}

impl Staged {
    fn len(&self) -> u64 {
        self.drained + self.pending.len() as u64
    }

    fn write_at(&mut self, buf: &[u8]) -> io::Result<()> {
        let end = self.pos + buf.len() as u64;

        if self.pos < self.drained {
            if end > self.header.len() as u64 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "write reaches past the header into drained bytes",
                ));
            }
            self.header[self.pos as usize..end as usize].copy_from_slice(buf);
        } else {
            let offset = (self.pos - self.drained) as usize;
            if offset > self.pending.len() {
                self.pending.resize(offset, 0);
            }
            let overlap = (self.pending.len() - offset).min(buf.len());
            self.pending[offset..offset + overlap].copy_from_slice(&buf[..overlap]);
            self.pending.extend_from_slice(&buf[overlap..]);
        }

        self.pos = end;
        Ok(())
    }
}

/// Cloneable handle; the writer owns one clone, the encoder keeps another
#[derive(Debug, Clone, Default)]
pub(crate) struct StagingSink {
    inner: Arc<Mutex<Staged>>,
}

impl StagingSink {
    /// Drain everything written so far as the header and keep a copy of it
    pub fn take_header(&self) -> Vec<u8> {
        let mut staged = self.inner.lock();
        let header = std::mem::take(&mut staged.pending);
        staged.drained += header.len() as u64;
        staged.header = header.clone();
        header
    }

    /// Drain bytes written since the last call
    pub fn take(&self) -> Vec<u8> {
        let mut staged = self.inner.lock();
        let bytes = std::mem::take(&mut staged.pending);
        staged.drained += bytes.len() as u64;
        bytes
    }

    /// Current header region, including any patches
    pub fn header(&self) -> Vec<u8> {
        self.inner.lock().header.clone()
    }

    /// Total bytes written, drained or not
    pub fn len(&self) -> u64 {
        self.inner.lock().len()
    }
}

impl Write for StagingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write_at(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for StagingSink {
    fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        let mut staged = self.inner.lock();
        let target = match to {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => staged.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => staged.pos.checked_add_signed(delta),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream"))?;

        staged.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_body_and_patches_header() {
        let mut sink = StagingSink::default();
        sink.write_all(b"HEAD0000").unwrap();
        assert_eq!(sink.take_header(), b"HEAD0000");

        sink.write_all(b"abc").unwrap();
        assert_eq!(sink.take(), b"abc");
        sink.write_all(b"def").unwrap();

        sink.seek(SeekFrom::Start(4)).unwrap();
        sink.write_all(b"0006").unwrap();
        sink.seek(SeekFrom::End(0)).unwrap();
        sink.write_all(b"g").unwrap();

        assert_eq!(sink.header(), b"HEAD0006");
        assert_eq!(sink.take(), b"defg");
        assert_eq!(sink.len(), 15);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn rejects_writes_into_drained_body() {
        let mut sink = StagingSink::default();
        sink.write_all(b"HD").unwrap();
        sink.take_header();
        sink.write_all(b"body").unwrap();
        sink.take();

        sink.seek(SeekFrom::Start(1)).unwrap();
        assert!(sink.write_all(b"xyz").is_err());
        assert!(sink.seek(SeekFrom::Current(-10)).is_err());
    }
}
