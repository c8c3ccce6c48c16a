//! Box writer
//!
//! Boxes are opened with a zero size placeholder and patched when closed, so
//! nested structures can be written in one pass.

use bytes::{BufMut, Bytes, BytesMut};

use super::atoms::BoxType;

#[derive(Debug, Default)]
pub struct BoxWriter {
    buf: BytesMut,
    open: Vec<usize>,
}

impl BoxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            open: Vec::new(),
        }
    }

    /// Open a plain box
    pub fn start(&mut self, box_type: BoxType) -> &mut Self {
        self.open.push(self.buf.len());
        self.buf.put_u32(0);
        self.buf.put_slice(&box_type.0);
        self
    }

    /// Open a full box with version and flags
    pub fn start_full(&mut self, box_type: BoxType, version: u8, flags: u32) -> &mut Self {
        self.start(box_type);
        self.buf.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
        self
    }

    /// Open a `uuid` full box with the given extended type
    pub fn start_uuid(&mut self, user_type: &[u8; 16], version: u8, flags: u32) -> &mut Self {
        self.start(BoxType::UUID);
        self.buf.put_slice(user_type);
        self.buf.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
        self
    }

    /// Close the innermost open box, patching its size
    pub fn end(&mut self) -> &mut Self {
        if let Some(start) = self.open.pop() {
            let size = (self.buf.len() - start) as u32;
            self.buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
        }
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.put_i32(v);
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.put_u64(v);
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.put_slice(v);
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.buf.put_bytes(0, n);
        self
    }

    /// Current length; positions returned here can be patched later
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Overwrite a big-endian u32 written earlier
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// `mdat` header for a payload of `data_size` bytes (8 bytes, 16 when the
/// size does not fit 32 bits)
pub fn mdat_header(data_size: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    if data_size + 8 > u32::MAX as u64 {
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&BoxType::MDAT.0);
        out.extend_from_slice(&(data_size + 16).to_be_bytes());
    } else {
        out.extend_from_slice(&((data_size + 8) as u32).to_be_bytes());
        out.extend_from_slice(&BoxType::MDAT.0);
    }
    out
}
