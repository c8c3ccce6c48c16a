//! Fragment header serialization
//!
//! Rebuilds a `moof` for one fragment. The trun data offset points just past
//! the `mdat` header that [`assemble_payload`](super::Container::assemble_payload)
//! prefixes to the sample bytes, so header and payload can be written back to
//! back.

use bytes::Bytes;

use super::atoms::{uuid, BoxType};
use super::fragment::Fragment;
use super::writer::{mdat_header, BoxWriter};

/// tfhd: default-base-is-moof
const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

/// trun: data offset, sample duration, size, flags, composition offset
const TRUN_FLAGS: u32 = 0x01 | 0x100 | 0x200 | 0x400 | 0x800;

/// Serialize the `moof` of `fragment`. When `ivs` is given (one per sample)
/// a PIFF sample-encryption box is added to the `traf`.
pub fn serialize_fragment_header(fragment: &Fragment, ivs: Option<&[[u8; 8]]>) -> Bytes {
    let n = fragment.samples.len();
    let mut w = BoxWriter::with_capacity(128 + n * 24);

    w.start(BoxType::MOOF);
    w.start_full(BoxType::MFHD, 0, 0)
        .u32(fragment.index + 1)
        .end();

    w.start(BoxType::TRAF);
    w.start_full(BoxType::TFHD, 0, TFHD_DEFAULT_BASE_IS_MOOF)
        .u32(fragment.track_id)
        .end();
    w.start_full(BoxType::TFDT, 1, 0)
        .u64(fragment.decode_time)
        .end();

    w.start_full(BoxType::TRUN, 1, TRUN_FLAGS).u32(n as u32);
    let data_offset_pos = w.len();
    w.i32(0);
    for sample in &fragment.samples {
        w.u32(sample.duration)
            .u32(sample.size)
            .u32(sample.flags)
            .i32(sample.cts_offset);
    }
    w.end();

    if let Some(ivs) = ivs {
        w.start_uuid(&uuid::PIFF_SENC, 0, 0);
        w.u32(ivs.len() as u32);
        for iv in ivs {
            w.bytes(iv);
        }
        w.end();
    }

    w.end(); // traf
    w.end(); // moof

    let moof_len = w.len();
    let header_len = mdat_header(fragment.size).len();
    w.patch_u32(data_offset_pos, (moof_len + header_len) as u32);
    w.freeze()
}
