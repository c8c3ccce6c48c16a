//! HTTP byte ranges over backing files
//!
//! Exactly one range per request; a multi-range header is rejected rather
//! than silently narrowed to its first range.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

/// An inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// The whole of a non-empty file
    pub fn full(size: u64) -> Option<Self> {
        (size > 0).then(|| Self {
            start: 0,
            end: size - 1,
        })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Parse a `Range` header against a file of `size` bytes.
    ///
    /// Supports `bytes=a-b`, `bytes=a-` and `bytes=-n`.
    pub fn parse(header: &str, size: u64) -> Result<Self> {
        let spec = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(|| Error::Range(format!("unsupported unit in {:?}", header)))?;
        if spec.contains(',') {
            return Err(Error::Range("multiple ranges".into()));
        }
        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| Error::Range(format!("malformed range {:?}", spec)))?;
        let (start, end) = (start.trim(), end.trim());

        let parse = |s: &str| {
            s.parse::<u64>()
                .map_err(|_| Error::Range(format!("malformed range {:?}", spec)))
        };
        let unsatisfiable = || Error::Range(format!("{} outside of {} bytes", spec, size));

        let range = match (start.is_empty(), end.is_empty()) {
            (true, false) => {
                let suffix = parse(end)?;
                if suffix == 0 || size == 0 {
                    return Err(unsatisfiable());
                }
                Self {
                    start: size.saturating_sub(suffix),
                    end: size - 1,
                }
            }
            (false, true) => Self {
                start: parse(start)?,
                end: size.saturating_sub(1),
            },
            (false, false) => {
                let start = parse(start)?;
                let end = parse(end)?;
                if end < start {
                    return Err(unsatisfiable());
                }
                Self {
                    start,
                    end: end.min(size.saturating_sub(1)),
                }
            }
            (true, true) => return Err(Error::Range(format!("malformed range {:?}", spec))),
        };

        if range.start >= size {
            return Err(unsatisfiable());
        }
        Ok(range)
    }

    /// `Content-Range` header value
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Largest block a [`FileSlice`] reads at once
pub const BLOCK_SIZE: usize = 64 * 1024;

/// A range of a backing file, read lazily in blocks of at most
/// [`BLOCK_SIZE`] bytes so a response never holds the whole file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlice {
    pub path: PathBuf,
    pub range: ByteRange,
}

impl FileSlice {
    pub fn new(path: impl Into<PathBuf>, range: ByteRange) -> Self {
        Self {
            path: path.into(),
            range,
        }
    }

    pub fn len(&self) -> u64 {
        self.range.len()
    }

    /// Open the file positioned at the start of the range
    pub fn blocks(&self) -> Result<FileBlocks> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.range.start))?;
        Ok(FileBlocks {
            file,
            remaining: self.range.len(),
        })
    }
}

/// Iterator over the blocks of a [`FileSlice`]
#[derive(Debug)]
pub struct FileBlocks {
    file: File,
    remaining: u64,
}

impl Iterator for FileBlocks {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let n = self.remaining.min(BLOCK_SIZE as u64) as usize;
        let mut buf = BytesMut::zeroed(n);
        if let Err(e) = self.file.read_exact(&mut buf) {
            self.remaining = 0;
            return Some(Err(e.into()));
        }
        self.remaining -= n as u64;
        Some(Ok(buf.freeze()))
    }
}
