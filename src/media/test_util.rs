//! Synthetic ISOBMFF fixtures for tests

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::atoms::{handler, BoxType};
use super::fragment::{Chunk, Fragment, FragmentSample, NON_SYNC_SAMPLE_FLAGS, SYNC_SAMPLE_FLAGS};
use super::moof::serialize_fragment_header;
use super::writer::{mdat_header, BoxWriter};

pub const SPS: [u8; 4] = [0x67, 0x42, 0xC0, 0x1F];
pub const PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];
pub const AUDIO_CONFIG: [u8; 2] = [0x12, 0x10];

/// Sample tables of a non-fragmented track: every sample in one chunk
#[derive(Debug, Clone)]
pub struct SampleTables {
    pub durations: Vec<u32>,
    pub sizes: Vec<u32>,
    /// 1-based sync sample numbers, `None` for all-sync
    pub sync: Option<Vec<u32>>,
    pub chunk_offset: u64,
}

pub fn video_trak(id: u32, width: u16, height: u16, timescale: u32, tables: Option<&SampleTables>) -> Vec<u8> {
    let mut w = BoxWriter::new();
    write_trak(&mut w, id, handler::VIDEO, timescale, width, height, tables, |w| {
        w.start(BoxType::AVC1).zeros(6).u16(1);
        w.zeros(16).u16(width).u16(height);
        w.u32(0x0048_0000).u32(0x0048_0000).u32(0).u16(1).zeros(32).u16(0x18).u16(0xFFFF);
        w.start(BoxType::AVCC)
            .u8(1)
            .u8(SPS[1])
            .u8(SPS[2])
            .u8(SPS[3])
            .u8(0xFF)
            .u8(0xE1)
            .u16(SPS.len() as u16)
            .bytes(&SPS)
            .u8(1)
            .u16(PPS.len() as u16)
            .bytes(&PPS)
            .end();
        w.end();
    });
    w.freeze().to_vec()
}

pub fn audio_trak(id: u32, sample_rate: u32, tables: Option<&SampleTables>) -> Vec<u8> {
    let mut w = BoxWriter::new();
    write_trak(&mut w, id, handler::AUDIO, sample_rate, 0, 0, tables, |w| {
        w.start(BoxType::MP4A).zeros(6).u16(1);
        w.zeros(8).u16(2).u16(16).u32(0).u32(sample_rate << 16);
        w.start_full(BoxType::ESDS, 0, 0);
        // ES descriptor
        w.u8(0x03).u8(25).u16(1).u8(0);
        // DecoderConfigDescriptor
        w.u8(0x04).u8(17).u8(0x40).u8(0x15).zeros(3).u32(128_000).u32(128_000);
        // DecoderSpecificInfo
        w.u8(0x05).u8(AUDIO_CONFIG.len() as u8).bytes(&AUDIO_CONFIG);
        // SLConfigDescriptor
        w.u8(0x06).u8(1).u8(0x02);
        w.end();
        w.end();
    });
    w.freeze().to_vec()
}

#[allow(clippy::too_many_arguments)]
fn write_trak(
    w: &mut BoxWriter,
    id: u32,
    handler_type: [u8; 4],
    timescale: u32,
    width: u16,
    height: u16,
    tables: Option<&SampleTables>,
    sample_entry: impl FnOnce(&mut BoxWriter),
) {
    w.start(BoxType::TRAK);
    w.start_full(BoxType::TKHD, 0, 7).u32(0).u32(0).u32(id).u32(0).u32(0);
    w.zeros(8).u16(0).u16(0).u16(0).u16(0).zeros(36);
    w.u32((width as u32) << 16).u32((height as u32) << 16).end();

    w.start(BoxType::MDIA);
    w.start_full(BoxType::MDHD, 0, 0).u32(0).u32(0).u32(timescale).u32(0).u16(0x55C4).u16(0).end();
    w.start_full(BoxType::HDLR, 0, 0).u32(0).bytes(&handler_type).zeros(12).bytes(b"test\0").end();
    w.start(BoxType::MINF);
    w.start(BoxType::STBL);
    w.start_full(BoxType::STSD, 0, 0).u32(1);
    sample_entry(w);
    w.end();

    match tables {
        None => {
            w.start_full(BoxType::STTS, 0, 0).u32(0).end();
            w.start_full(BoxType::STSC, 0, 0).u32(0).end();
            w.start_full(BoxType::STSZ, 0, 0).u32(0).u32(0).end();
            w.start_full(BoxType::STCO, 0, 0).u32(0).end();
        }
        Some(t) => {
            w.start_full(BoxType::STTS, 0, 0).u32(t.durations.len() as u32);
            for &d in &t.durations {
                w.u32(1).u32(d);
            }
            w.end();
            if let Some(sync) = &t.sync {
                w.start_full(BoxType::STSS, 0, 0).u32(sync.len() as u32);
                for &n in sync {
                    w.u32(n);
                }
                w.end();
            }
            w.start_full(BoxType::STSC, 0, 0)
                .u32(1)
                .u32(1)
                .u32(t.sizes.len() as u32)
                .u32(1)
                .end();
            w.start_full(BoxType::STSZ, 0, 0).u32(0).u32(t.sizes.len() as u32);
            for &s in &t.sizes {
                w.u32(s);
            }
            w.end();
            w.start_full(BoxType::CO64, 0, 0).u32(1).u64(t.chunk_offset).end();
        }
    }
    w.end(); // stbl
    w.end(); // minf
    w.end(); // mdia
    w.end(); // trak
}

fn ftyp() -> Vec<u8> {
    let mut w = BoxWriter::new();
    w.start(BoxType::FTYP).bytes(b"isml").u32(1).bytes(b"piff").bytes(b"iso2").end();
    w.freeze().to_vec()
}

fn moov(traks: &[Vec<u8>], track_ids: &[u32], fragmented: bool) -> Vec<u8> {
    let mut w = BoxWriter::new();
    w.start(BoxType::MOOV);
    w.start_full(BoxType::MVHD, 0, 0).u32(0).u32(0).u32(1000).u32(0).zeros(80).end();
    for trak in traks {
        w.bytes(trak);
    }
    if fragmented {
        w.start(BoxType::MVEX);
        for &id in track_ids {
            w.start_full(BoxType::TREX, 0, 0).u32(id).u32(1).u32(0).u32(0).u32(0).end();
        }
        w.end();
    }
    w.end();
    w.freeze().to_vec()
}

/// Shape of a generated fragmented asset
#[derive(Debug, Clone)]
pub struct AssetSpec {
    pub fragments: u32,
    pub fragment_secs: u64,
    pub video_timescale: u32,
    pub samples_per_fragment: u32,
    pub video_sample_size: u32,
    pub width: u16,
    pub height: u16,
    pub audio: bool,
    pub audio_sample_size: u32,
}

impl Default for AssetSpec {
    fn default() -> Self {
        Self {
            fragments: 3,
            fragment_secs: 1,
            video_timescale: 10_000_000,
            samples_per_fragment: 2,
            video_sample_size: 1000,
            width: 640,
            height: 360,
            audio: true,
            audio_sample_size: 400,
        }
    }
}

impl AssetSpec {
    /// Payload filler byte of fragment `index` of `track_id`
    pub fn fill_byte(&self, track_id: u32, index: u32) -> u8 {
        (track_id * 16 + index) as u8
    }
}

const AUDIO_RATE: u32 = 44_100;

/// Fragmented file bytes: one `moof`/`mdat` pair per track per fragment
pub fn fragmented_bytes(spec: &AssetSpec) -> Vec<u8> {
    let mut traks = vec![video_trak(1, spec.width, spec.height, spec.video_timescale, None)];
    let mut ids = vec![1];
    if spec.audio {
        traks.push(audio_trak(2, AUDIO_RATE, None));
        ids.push(2);
    }

    let mut out = ftyp();
    out.extend(moov(&traks, &ids, true));

    for index in 0..spec.fragments {
        let video_span = spec.fragment_secs * spec.video_timescale as u64;
        let n = spec.samples_per_fragment.max(1);
        let video = (0..n)
            .map(|i| FragmentSample {
                duration: (video_span / n as u64) as u32,
                size: spec.video_sample_size,
                flags: if i == 0 {
                    SYNC_SAMPLE_FLAGS
                } else {
                    NON_SYNC_SAMPLE_FLAGS
                },
                cts_offset: 0,
            })
            .collect();
        write_pair(&mut out, spec, 1, index, index as u64 * video_span, video);

        if spec.audio {
            let audio_span = spec.fragment_secs * AUDIO_RATE as u64;
            let audio = vec![FragmentSample {
                duration: audio_span as u32,
                size: spec.audio_sample_size,
                flags: SYNC_SAMPLE_FLAGS,
                cts_offset: 0,
            }];
            write_pair(&mut out, spec, 2, index, index as u64 * audio_span, audio);
        }
    }
    out
}

fn write_pair(
    out: &mut Vec<u8>,
    spec: &AssetSpec,
    track_id: u32,
    index: u32,
    decode_time: u64,
    samples: Vec<FragmentSample>,
) {
    let size: u64 = samples.iter().map(|s| s.size as u64).sum();
    let fragment = Fragment {
        track_id,
        index,
        timestamp: 0,
        duration: 0,
        decode_time,
        size,
        chunks: vec![Chunk { offset: 0, len: size }],
        samples,
        file_range: None,
    };
    out.extend_from_slice(&serialize_fragment_header(&fragment, None));
    out.extend(mdat_header(size));
    out.extend(std::iter::repeat(spec.fill_byte(track_id, index)).take(size as usize));
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(bytes).unwrap();
}

pub fn fragmented_asset(spec: &AssetSpec) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&fragmented_bytes(spec)).unwrap();
    file
}

/// Non-fragmented single video track of `count` one-second samples with a
/// keyframe every `keyframe_interval` samples
pub fn progressive_asset(count: u32, keyframe_interval: u32) -> NamedTempFile {
    let sizes: Vec<u32> = (0..count).map(|i| 100 + i).collect();
    let mut tables = SampleTables {
        durations: vec![1000; count as usize],
        sizes: sizes.clone(),
        sync: Some((0..count).step_by(keyframe_interval.max(1) as usize).map(|i| i + 1).collect()),
        chunk_offset: 0,
    };

    let head_len = {
        let trak = video_trak(1, 320, 240, 1000, Some(&tables));
        ftyp().len() + moov(&[trak], &[1], false).len()
    };
    let data_len: u64 = sizes.iter().map(|&s| s as u64).sum();
    tables.chunk_offset = head_len as u64 + 8;

    let mut out = ftyp();
    out.extend(moov(&[video_trak(1, 320, 240, 1000, Some(&tables))], &[1], false));
    out.extend(mdat_header(data_len));
    out.extend(std::iter::repeat(0xAB).take(data_len as usize));

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&out).unwrap();
    file
}

/// `{root}/{key}/{key}.ismv` generated from `spec`, with an optional
/// `asset.toml`
pub fn asset_dir(key: &str, spec: &AssetSpec, descriptor: Option<&str>) -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join(key);
    std::fs::create_dir(&dir).unwrap();
    write_file(&dir.join(format!("{}.ismv", key)), &fragmented_bytes(spec));
    if let Some(text) = descriptor {
        write_file(&dir.join("asset.toml"), text.as_bytes());
    }
    root
}
