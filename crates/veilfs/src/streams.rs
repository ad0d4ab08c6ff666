//! `std::io` adapters over an open descriptor.
//!
//! `FileReader`/`FileWriter` keep a cursor and translate the standard
//! traits onto the positioned read/write pipeline. Streams obtained from
//! [`EncryptedFs::open_reader`]/[`EncryptedFs::open_writer`] own their
//! descriptor and close it on drop; streams wrapped around an existing
//! descriptor leave closing to the caller.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use veilfs_core::{FsError, FsResult, OpenFlags, StoreFd};

use crate::fs::EncryptedFs;

fn to_io(err: FsError) -> io::Error {
    let kind = match &err {
        FsError::NotFound(_) => io::ErrorKind::NotFound,
        FsError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
        FsError::Store { source, .. } => source.kind(),
        FsError::Corruption(_) => io::ErrorKind::InvalidData,
    };
    io::Error::new(kind, err)
}

pub struct FileReader<'a> {
    fs: &'a EncryptedFs,
    fd: StoreFd,
    pos: u64,
    owned: bool,
}

impl FileReader<'_> {
    pub fn fd(&self) -> StoreFd {
        self.fd
    }

    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for FileReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.fs.read(self.fd, buf, self.pos).map_err(to_io)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for FileReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let next = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.fs.size(self.fd).map_err(to_io)? as i128 + delta as i128,
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos = next as u64;
        Ok(self.pos)
    }
}

impl Drop for FileReader<'_> {
    fn drop(&mut self) {
        if self.owned {
            let _ = self.fs.close(self.fd);
        }
    }
}

pub struct FileWriter<'a> {
    fs: &'a EncryptedFs,
    fd: StoreFd,
    pos: u64,
    owned: bool,
}

impl FileWriter<'_> {
    pub fn fd(&self) -> StoreFd {
        self.fd
    }

    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Write for FileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.fs.write(self.fd, buf, self.pos).map_err(to_io)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Chunk writes are already durable per the backing store's own
        // durability semantics.
        Ok(())
    }
}

impl Drop for FileWriter<'_> {
    fn drop(&mut self) {
        if self.owned {
            let _ = self.fs.close(self.fd);
        }
    }
}

impl EncryptedFs {
    /// Wrap an existing open descriptor in a reader; the caller keeps
    /// ownership of the descriptor.
    pub fn reader(&self, fd: StoreFd) -> FsResult<FileReader<'_>> {
        self.size(fd)?;
        Ok(FileReader {
            fs: self,
            fd,
            pos: 0,
            owned: false,
        })
    }

    /// Wrap an existing open descriptor in a writer; the caller keeps
    /// ownership of the descriptor.
    pub fn writer(&self, fd: StoreFd) -> FsResult<FileWriter<'_>> {
        self.size(fd)?;
        Ok(FileWriter {
            fs: self,
            fd,
            pos: 0,
            owned: false,
        })
    }

    /// Open `path` read-only and return an owning reader.
    pub fn open_reader(&self, path: impl AsRef<Path>) -> FsResult<FileReader<'_>> {
        let fd = self.open(path, OpenFlags::read(), 0)?;
        Ok(FileReader {
            fs: self,
            fd,
            pos: 0,
            owned: true,
        })
    }

    /// Open `path` for writing (create + truncate) and return an owning
    /// writer.
    pub fn open_writer(&self, path: impl AsRef<Path>) -> FsResult<FileWriter<'_>> {
        let fd = self.open(path, OpenFlags::write_create(), 0o666)?;
        Ok(FileWriter {
            fs: self,
            fd,
            pos: 0,
            owned: true,
        })
    }
}
