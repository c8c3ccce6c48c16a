//! Box readers
//!
//! [`ByteReader`] walks an in-memory box payload; [`read_box_header`] and
//! [`read_box_body`] walk the top level of a file without buffering `mdat`.

use std::io::{Read, Seek, SeekFrom};

use super::atoms::{BoxHeader, BoxType};
use super::error::ParseError;

/// Largest box payload the engine buffers (moov, moof). Guards against
/// malformed size fields.
pub const MAX_BOX_BODY: u64 = 64 * 1024 * 1024;

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Big-endian cursor over a box payload
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bytes(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(ParseError::Underflow {
                need: n,
                have: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> ParseResult<()> {
        self.bytes(n).map(|_| ())
    }

    pub fn u8(&mut self) -> ParseResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> ParseResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u24(&mut self) -> ParseResult<u32> {
        let b = self.bytes(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn u32(&mut self) -> ParseResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> ParseResult<i32> {
        self.u32().map(|v| v as i32)
    }

    pub fn u64(&mut self) -> ParseResult<u64> {
        let b = self.bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    /// Version and flags of a full box
    pub fn version_flags(&mut self) -> ParseResult<(u8, u32)> {
        let word = self.u32()?;
        Ok(((word >> 24) as u8, word & 0x00FF_FFFF))
    }

    /// A 32-bit value for version 0 boxes, 64-bit for version 1
    pub fn versioned_u64(&mut self, version: u8) -> ParseResult<u64> {
        if version == 1 {
            self.u64()
        } else {
            self.u32().map(u64::from)
        }
    }

    /// Next child box in the buffer: its type and payload.
    pub fn next_box(&mut self) -> ParseResult<Option<(BoxType, &'a [u8])>> {
        if self.remaining() < 8 {
            return Ok(None);
        }
        let start = self.pos;
        let size = self.u32()? as u64;
        let mut box_type = [0u8; 4];
        box_type.copy_from_slice(self.bytes(4)?);
        let box_type = BoxType(box_type);

        let (size, header) = match size {
            0 => ((self.data.len() - start) as u64, 8),
            1 => (self.u64()?, 16),
            n => (n, 8),
        };
        if size < header as u64 || size > (self.data.len() - start) as u64 {
            return Err(ParseError::invalid(box_type, format!("bad box size {}", size)));
        }

        let body_start = start + header;
        let end = start + size as usize;
        self.pos = end;
        Ok(Some((box_type, &self.data[body_start..end])))
    }
}

/// First child of `data` with the given type
pub fn find_child(data: &[u8], wanted: BoxType) -> ParseResult<Option<&[u8]>> {
    let mut reader = ByteReader::new(data);
    while let Some((box_type, body)) = reader.next_box()? {
        if box_type == wanted {
            return Ok(Some(body));
        }
    }
    Ok(None)
}

/// Like [`find_child`] but missing is an error
pub fn require_child<'a>(data: &'a [u8], wanted: BoxType, name: &'static str) -> ParseResult<&'a [u8]> {
    find_child(data, wanted)?.ok_or(ParseError::MissingBox(name))
}

/// All children of `data` with the given type
pub fn children_of(data: &[u8], wanted: BoxType) -> ParseResult<Vec<&[u8]>> {
    let mut reader = ByteReader::new(data);
    let mut out = Vec::new();
    while let Some((box_type, body)) = reader.next_box()? {
        if box_type == wanted {
            out.push(body);
        }
    }
    Ok(out)
}

/// Read the box header at `offset`. Returns `None` at or past `end`, or when
/// the remaining bytes cannot hold a header.
pub fn read_box_header<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    end: u64,
) -> crate::Result<Option<BoxHeader>> {
    if offset + 8 > end {
        return Ok(None);
    }
    reader.seek(SeekFrom::Start(offset))?;

    let mut raw = [0u8; 8];
    reader.read_exact(&mut raw)?;
    let size = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64;
    let box_type = BoxType([raw[4], raw[5], raw[6], raw[7]]);

    let (size, header_size) = match size {
        0 => (end - offset, 8u8),
        1 => {
            let mut ext = [0u8; 8];
            reader.read_exact(&mut ext)?;
            (u64::from_be_bytes(ext), 16u8)
        }
        n => (n, 8u8),
    };

    if size < header_size as u64 || offset + size > end {
        let reason = format!("box size {} at {} overruns file", size, offset);
        return Err(ParseError::invalid(box_type, reason).into());
    }

    Ok(Some(BoxHeader {
        box_type,
        offset,
        size,
        header_size,
    }))
}

/// Buffer a box payload, refusing anything above [`MAX_BOX_BODY`].
pub fn read_box_body<R: Read + Seek>(reader: &mut R, header: &BoxHeader) -> crate::Result<Vec<u8>> {
    let size = header.data_size();
    if size > MAX_BOX_BODY {
        return Err(ParseError::TooLarge {
            box_type: header.box_type,
            size,
        }
        .into());
    }
    reader.seek(SeekFrom::Start(header.data_offset()))?;
    let mut body = vec![0u8; size as usize];
    reader.read_exact(&mut body)?;
    Ok(body)
}
