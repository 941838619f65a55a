//! CRC-32 (polynomial 0xEDB88320, reflected, init/final XOR 0xFFFFFFFF) —
//! the standard ISO-HDLC/zlib CRC that `crc32fast` computes. Used for the
//! superblock's trailing check and for each blob's `data_size` logical
//! bytes.

use std::io::{self, Seek, SeekFrom};

/// Pure function of an input byte range.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Wraps a writer, accumulating a running CRC-32 over everything written
/// through it. Lets the codec compute a record's CRC while it is being
/// serialized rather than re-reading the assembled buffer.
pub struct Crc32Writer<W: io::Write> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: io::Write> Crc32Writer<W> {
    pub fn new(writer: W) -> Self {
        Crc32Writer {
            inner: writer,
            hasher: crc32fast::Hasher::new(),
        }
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl<W: io::Write> io::Write for Crc32Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: io::Write + Seek> Seek for Crc32Writer<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if let SeekFrom::Current(0) = pos {
            self.inner.seek(pos)
        } else {
            panic!("seek other than Current(0) is not supported on Crc32Writer");
        }
    }
}

/// Read-side counterpart of [`Crc32Writer`].
pub struct Crc32Reader<R: io::Read> {
    inner: R,
    hasher: crc32fast::Hasher,
}

impl<R: io::Read> Crc32Reader<R> {
    pub fn new(reader: R) -> Self {
        Crc32Reader {
            inner: reader,
            hasher: crc32fast::Hasher::new(),
        }
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl<R: io::Read> io::Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

impl<R: io::Read + Seek> Seek for Crc32Reader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if let SeekFrom::Current(0) = pos {
            self.inner.seek(pos)
        } else {
            panic!("seek other than Current(0) is not supported on Crc32Reader");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // "123456789" is the standard CRC-32/ISO-HDLC check string.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn writer_matches_pure_function() {
        let mut out = Vec::new();
        let mut w = Crc32Writer::new(&mut out);
        io::Write::write_all(&mut w, b"hello cluster").unwrap();
        assert_eq!(w.crc32(), crc32(b"hello cluster"));
    }
}
