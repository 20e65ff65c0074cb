use crate::error::{PkgError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// Random-access byte source an archive can be parsed from.
///
/// Implemented for in-memory buffers and open files. Archives can be
/// multiple gigabytes, so the parser only ever requests the header block,
/// the entry table and the payloads of the sub-blocks it needs.
pub trait ByteSource {
    /// Total number of bytes available.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` from `offset`. A short read is a [`PkgError::Truncated`].
    fn read_at(&mut self, what: &'static str, offset: u64, buf: &mut [u8]) -> Result<()>;
}

impl ByteSource for &[u8] {
    fn len(&self) -> u64 {
        (**self).len() as u64
    }

    fn read_at(&mut self, what: &'static str, offset: u64, buf: &mut [u8]) -> Result<()> {
        let have = (**self).len() as u64;
        let end = offset.checked_add(buf.len() as u64);
        match end {
            Some(end) if end <= have => {
                buf.copy_from_slice(&self[offset as usize..end as usize]);
                Ok(())
            }
            _ => Err(PkgError::Truncated {
                what,
                offset,
                need: buf.len(),
                have,
            }),
        }
    }
}

/// A source backed by an open file and its cached length.
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    pub fn new(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, what: &'static str, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset.checked_add(buf.len() as u64);
        if !matches!(end, Some(end) if end <= self.len) {
            return Err(PkgError::Truncated {
                what,
                offset,
                need: buf.len(),
                have: self.len,
            });
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                PkgError::Truncated {
                    what,
                    offset,
                    need: buf.len(),
                    have: self.len,
                }
            } else {
                PkgError::Io(e)
            }
        })
    }
}
