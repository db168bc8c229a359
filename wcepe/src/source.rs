//! Random-access views over executable images.
//!
//! Every read is addressed by absolute file offset. Nothing downstream ever depends on a
//! cursor position, so nested decoders cannot disturb each other.


use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::Error;


/// A read-only, bounds-checked view over the bytes of an image.
pub trait ByteSource {
    /// The total number of bytes in the image.
    fn len(&self) -> u64;

    /// Reads exactly `length` bytes starting at `offset`.
    ///
    /// Fails with [`Error::OutOfBounds`] if any of the requested bytes lie beyond the end of the
    /// image.
    fn read_exact(&self, offset: u64, length: usize) -> Result<Vec<u8>, Error>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of bytes between `offset` and the end of the image.
    fn remaining_from(&self, offset: u64) -> u64 {
        self.len().saturating_sub(offset)
    }

    /// Reads a NUL-terminated byte string of at most `max_length` bytes (terminator included).
    ///
    /// The terminator is not part of the returned bytes.
    fn read_cstring_bounded(&self, offset: u64, max_length: usize) -> Result<Vec<u8>, Error> {
        check_start(self, offset)?;
        let take = clamp_length(self.remaining_from(offset), max_length);
        let mut bytes = self.read_exact(offset, take)?;
        match bytes.iter().position(|&b| b == 0x00) {
            Some(nul_index) => {
                bytes.truncate(nul_index);
                Ok(bytes)
            },
            None => Err(Error::Unterminated { offset, max_length }),
        }
    }

    /// Reads a NUL-terminated UTF-16LE string of at most `max_length` bytes (terminator
    /// included).
    ///
    /// Returns the raw little-endian code unit bytes without the terminator.
    fn read_utf16_cstring_bounded(&self, offset: u64, max_length: usize) -> Result<Vec<u8>, Error> {
        check_start(self, offset)?;
        let take = clamp_length(self.remaining_from(offset), max_length) & !1;
        let mut bytes = self.read_exact(offset, take)?;
        match bytes.chunks_exact(2).position(|unit| unit == [0x00, 0x00]) {
            Some(nul_index) => {
                bytes.truncate(nul_index * 2);
                Ok(bytes)
            },
            None => Err(Error::Unterminated { offset, max_length }),
        }
    }

    fn read_array<const N: usize>(&self, offset: u64) -> Result<[u8; N], Error> {
        let bytes = self.read_exact(offset, N)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(&bytes);
        Ok(buf)
    }

    fn read_u16_le(&self, offset: u64) -> Result<u16, Error> {
        Ok(u16::from_le_bytes(self.read_array(offset)?))
    }

    fn read_u32_le(&self, offset: u64) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.read_array(offset)?))
    }
}

fn check_start<S: ByteSource + ?Sized>(source: &S, offset: u64) -> Result<(), Error> {
    if offset >= source.len() {
        Err(Error::OutOfBounds { offset, length: 1, image_size: source.len() })
    } else {
        Ok(())
    }
}

fn clamp_length(available: u64, max_length: usize) -> usize {
    match usize::try_from(available) {
        Ok(available) => available.min(max_length),
        Err(_) => max_length,
    }
}

fn check_range(offset: u64, length: usize, image_size: u64) -> Result<(), Error> {
    let length_u64 = length as u64;
    match offset.checked_add(length_u64) {
        Some(end) if end <= image_size => Ok(()),
        _ => Err(Error::OutOfBounds { offset, length: length_u64, image_size }),
    }
}


impl ByteSource for [u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_exact(&self, offset: u64, length: usize) -> Result<Vec<u8>, Error> {
        check_range(offset, length, ByteSource::len(self))?;
        // check_range guarantees that both ends fit into the slice
        let start = offset as usize;
        Ok(self[start..start+length].to_vec())
    }
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> u64 {
        ByteSource::len(self.as_slice())
    }

    fn read_exact(&self, offset: u64, length: usize) -> Result<Vec<u8>, Error> {
        ByteSource::read_exact(self.as_slice(), offset, length)
    }
}


/// An image backed by a file that is kept open for the lifetime of the source.
///
/// The length is captured when the file is opened; the file must not change while it is being
/// analyzed.
#[derive(Debug)]
pub struct FileSource {
    file: RefCell<File>,
    len: u64,
}
impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Self::from_file(file)
    }

    pub fn from_file(file: File) -> Result<Self, Error> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: RefCell::new(file),
            len,
        })
    }
}
impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_exact(&self, offset: u64, length: usize) -> Result<Vec<u8>, Error> {
        check_range(offset, length, self.len)?;
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}
