// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Byte-level plumbing for the persisted index layout.
//!
//! Every section file is a sequence of little-endian fixed-width integers and
//! raw 64-bit words, terminated by a CRC32 footer over everything before it.
//! Writers go through [`CrcWriter`], readers through [`CrcReader`]; both hash
//! as they go so the footer check is a single comparison at the end.
//! Memory-mapped loads use [`MapCursor`], which validates the footer once at
//! open and then hands out offsets into the shared map.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

/// Writer that tracks a CRC32 of every byte written.
///
/// Call [`CrcWriter::finish`] to append the 4-byte footer; the value returned
/// is the total number of bytes written including the footer.
pub struct CrcWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<W: Write> CrcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }
    }

    pub fn finish(mut self) -> io::Result<u64> {
        let crc = self.hasher.finalize();
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.flush()?;
        Ok(self.written + 4)
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that tracks a CRC32 of every byte read.
///
/// After the logical content has been consumed, [`CrcReader::finish`] reads
/// the 4-byte footer and fails with `InvalidData` on a mismatch, which catches
/// both corruption and framing bugs (a desynchronized reader hashes different
/// bytes than the writer did).
pub struct CrcReader<R: Read> {
    inner: R,
    hasher: crc32fast::Hasher,
    consumed: u64,
}

impl<R: Read> CrcReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            consumed: 0,
        }
    }

    pub fn finish(mut self) -> io::Result<u64> {
        let expected = self.hasher.clone().finalize();
        let mut footer = [0u8; 4];
        self.inner.read_exact(&mut footer).map_err(|_| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "missing CRC32 footer")
        })?;
        let stored = u32::from_le_bytes(footer);
        if stored != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "CRC32 mismatch: stored {:#010x}, computed {:#010x} (file corrupted)",
                    stored, expected
                ),
            ));
        }
        Ok(self.consumed + 4)
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.consumed += n as u64;
        Ok(n)
    }
}

pub fn write_u8<W: Write>(out: &mut W, v: u8) -> io::Result<()> {
    out.write_all(&[v])
}

pub fn write_u32<W: Write>(out: &mut W, v: u32) -> io::Result<()> {
    out.write_all(&v.to_le_bytes())
}

pub fn write_u64<W: Write>(out: &mut W, v: u64) -> io::Result<()> {
    out.write_all(&v.to_le_bytes())
}

pub fn write_i64<W: Write>(out: &mut W, v: i64) -> io::Result<()> {
    out.write_all(&v.to_le_bytes())
}

pub fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    input.read_exact(&mut b)?;
    Ok(b[0])
}

pub fn read_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    input.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

pub fn read_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut b = [0u8; 8];
    input.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

pub fn read_i64<R: Read>(input: &mut R) -> io::Result<i64> {
    let mut b = [0u8; 8];
    input.read_exact(&mut b)?;
    Ok(i64::from_le_bytes(b))
}

/// Write a u64 vector as `count` followed by the elements.
pub fn write_vec_u64<W: Write>(out: &mut W, v: &[u64]) -> io::Result<()> {
    write_u64(out, v.len() as u64)?;
    for &x in v {
        write_u64(out, x)?;
    }
    Ok(())
}

/// Read a u64 vector written by [`write_vec_u64`].
pub fn read_vec_u64<R: Read>(input: &mut R) -> io::Result<Vec<u64>> {
    let count = read_u64(input)? as usize;
    let mut v = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        v.push(read_u64(input)?);
    }
    Ok(v)
}

/// Cursor over a memory-mapped section file.
///
/// The footer is validated once at open; afterwards scalar reads copy out of
/// the map while word sections are handed back as `(map, byte offset, words)`
/// triples for zero-copy views.
pub struct MapCursor {
    map: Arc<Mmap>,
    pos: usize,
    end: usize,
}

impl MapCursor {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the map is read-only and held alive by the Arc for as long
        // as any view into it exists. Concurrent truncation of the underlying
        // file is outside the persisted-layout contract.
        let map = unsafe { Mmap::map(&file)? };
        if map.len() < 4 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{}: too short for CRC32 footer", path.display()),
            ));
        }
        let end = map.len() - 4;
        let stored = u32::from_le_bytes(map[end..end + 4].try_into().unwrap_or([0; 4]));
        let computed = crc32fast::hash(&map[..end]);
        if stored != computed {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{}: CRC32 mismatch: stored {:#010x}, computed {:#010x}",
                    path.display(),
                    stored,
                    computed
                ),
            ));
        }
        Ok(Self {
            map: Arc::new(map),
            pos: 0,
            end,
        })
    }

    fn take(&mut self, n: usize) -> io::Result<&[u8]> {
        if self.pos + n > self.end {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "mapped section truncated",
            ));
        }
        let s = &self.map[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().expect("4-byte slice")))
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().expect("8-byte slice")))
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes(b.try_into().expect("8-byte slice")))
    }

    pub fn read_vec_u64(&mut self) -> io::Result<Vec<u64>> {
        let count = self.read_u64()? as usize;
        let mut v = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            v.push(self.read_u64()?);
        }
        Ok(v)
    }

    pub fn read_vec_i64(&mut self) -> io::Result<Vec<i64>> {
        let count = self.read_u64()? as usize;
        let mut v = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            v.push(self.read_i64()?);
        }
        Ok(v)
    }

    /// Consume `words` 64-bit words and return a handle for a zero-copy view.
    pub fn take_words(&mut self, words: usize) -> io::Result<(Arc<Mmap>, usize)> {
        let off = self.pos;
        self.take(words * 8)?;
        Ok((Arc::clone(&self.map), off))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_roundtrip() {
        let mut buf = Vec::new();
        {
            let mut w = CrcWriter::new(&mut buf);
            write_u64(&mut w, 42).unwrap();
            write_vec_u64(&mut w, &[1, 2, 3]).unwrap();
            w.finish().unwrap();
        }
        let mut r = CrcReader::new(&buf[..]);
        assert_eq!(read_u64(&mut r).unwrap(), 42);
        assert_eq!(read_vec_u64(&mut r).unwrap(), vec![1, 2, 3]);
        r.finish().unwrap();
    }

    #[test]
    fn crc_detects_corruption() {
        let mut buf = Vec::new();
        {
            let mut w = CrcWriter::new(&mut buf);
            write_u64(&mut w, 7).unwrap();
            w.finish().unwrap();
        }
        buf[3] ^= 0xFF;
        let mut r = CrcReader::new(&buf[..]);
        let _ = read_u64(&mut r).unwrap();
        assert!(r.finish().is_err());
    }

    #[test]
    fn crc_detects_truncation() {
        let mut buf = Vec::new();
        {
            let mut w = CrcWriter::new(&mut buf);
            write_u64(&mut w, 7).unwrap();
            w.finish().unwrap();
        }
        buf.truncate(buf.len() - 2);
        let mut r = CrcReader::new(&buf[..]);
        let _ = read_u64(&mut r).unwrap();
        assert!(r.finish().is_err());
    }
}
