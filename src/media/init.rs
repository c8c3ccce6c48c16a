//! Initialization segments
//!
//! A single-track `ftyp` + `moov` with empty sample tables and an `mvex`,
//! reusing the source track's `stsd` verbatim so decoder configuration and any
//! protection scheme boxes carry over.

use bytes::Bytes;

use super::atoms::{handler, BoxType};
use super::track::{Track, TrackKind};
use super::writer::BoxWriter;

const MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

pub fn init_segment(track: &Track) -> Bytes {
    let mut w = BoxWriter::with_capacity(512 + track.stsd.len());

    w.start(BoxType::FTYP)
        .bytes(b"iso6")
        .u32(1)
        .bytes(b"iso6")
        .bytes(b"piff")
        .bytes(b"dash")
        .bytes(b"mp41")
        .end();

    w.start(BoxType::MOOV);

    w.start_full(BoxType::MVHD, 0, 0)
        .u32(0)
        .u32(0)
        .u32(track.timescale)
        .u32(0)
        .u32(0x0001_0000)
        .u16(0x0100)
        .zeros(10);
    for v in MATRIX {
        w.u32(v);
    }
    w.zeros(24).u32(track.id + 1).end();

    w.start(BoxType::TRAK);
    w.start_full(BoxType::TKHD, 0, 0x07)
        .u32(0)
        .u32(0)
        .u32(track.id)
        .u32(0)
        .u32(0)
        .zeros(8)
        .u16(0)
        .u16(0)
        .u16(if track.kind == TrackKind::Audio { 0x0100 } else { 0 })
        .u16(0);
    for v in MATRIX {
        w.u32(v);
    }
    w.u32((track.width as u32) << 16)
        .u32((track.height as u32) << 16)
        .end();

    w.start(BoxType::MDIA);
    w.start_full(BoxType::MDHD, 0, 0)
        .u32(0)
        .u32(0)
        .u32(track.timescale)
        .u32(0)
        // "und"
        .u16(0x55C4)
        .u16(0)
        .end();

    let (handler_type, name): (&[u8; 4], &[u8]) = match track.kind {
        TrackKind::Video => (&handler::VIDEO, &b"VideoHandler\0"[..]),
        TrackKind::Audio => (&handler::AUDIO, &b"SoundHandler\0"[..]),
        TrackKind::Other => (b"meta", &b"Handler\0"[..]),
    };
    w.start_full(BoxType::HDLR, 0, 0)
        .u32(0)
        .bytes(handler_type)
        .zeros(12)
        .bytes(name)
        .end();

    w.start(BoxType::MINF);
    match track.kind {
        TrackKind::Video => {
            w.start_full(BoxType::VMHD, 0, 1).zeros(8).end();
        }
        TrackKind::Audio => {
            w.start_full(BoxType::SMHD, 0, 0).zeros(4).end();
        }
        TrackKind::Other => {
            w.start_full(BoxType::NMHD, 0, 0).end();
        }
    }
    w.start(BoxType::DINF);
    w.start_full(BoxType::DREF, 0, 0).u32(1);
    w.start_full(BoxType::URL, 0, 1).end();
    w.end().end();

    w.start(BoxType::STBL);
    w.bytes(&track.stsd);
    w.start_full(BoxType::STTS, 0, 0).u32(0).end();
    w.start_full(BoxType::STSC, 0, 0).u32(0).end();
    w.start_full(BoxType::STSZ, 0, 0).u32(0).u32(0).end();
    w.start_full(BoxType::STCO, 0, 0).u32(0).end();
    w.end(); // stbl
    w.end(); // minf
    w.end(); // mdia
    w.end(); // trak

    w.start(BoxType::MVEX);
    w.start_full(BoxType::TREX, 0, 0)
        .u32(track.id)
        .u32(1)
        .u32(0)
        .u32(0)
        .u32(0)
        .end();
    w.end(); // mvex

    w.end(); // moov
    w.freeze()
}
