//! Track metadata and codec configuration

use std::sync::OnceLock;

use bytes::Bytes;

use super::atoms::{handler, BoxType};
use super::error::ParseError;
use super::fragment::Fragment;
use super::reader::{find_child, require_child, ByteReader};
use super::sample_table::SampleTableBuilder;

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Media kind of a track, from its `hdlr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Other => "other",
        }
    }
}

/// Decoder configuration taken from the first sample entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecConfig {
    Avc {
        sps: Vec<Bytes>,
        pps: Vec<Bytes>,
    },
    Aac {
        /// AudioSpecificConfig
        config: Bytes,
        sample_rate: u32,
        channels: u16,
        sample_size: u16,
    },
    Unknown(BoxType),
}

impl CodecConfig {
    /// Smooth Streaming FourCC
    pub fn fourcc(&self) -> &'static str {
        match self {
            CodecConfig::Avc { .. } => "H264",
            CodecConfig::Aac { .. } => "AACL",
            CodecConfig::Unknown(_) => "",
        }
    }

    /// `CodecPrivateData` in uppercase hex: Annex B SPS/PPS for H.264, the
    /// AudioSpecificConfig for AAC.
    pub fn codec_private_data(&self) -> String {
        match self {
            CodecConfig::Avc { sps, pps } => {
                let mut out = String::new();
                for nal in sps.iter().chain(pps.iter()) {
                    out.push_str("00000001");
                    out.push_str(&hex::encode_upper(nal));
                }
                out
            }
            CodecConfig::Aac { config, .. } => hex::encode_upper(config),
            CodecConfig::Unknown(_) => String::new(),
        }
    }

    /// RFC 6381 codec string for DASH
    pub fn codecs(&self) -> String {
        match self {
            CodecConfig::Avc { sps, .. } => match sps.first() {
                Some(sps) if sps.len() >= 4 => {
                    format!("avc1.{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3])
                }
                _ => "avc1".to_string(),
            },
            CodecConfig::Aac { config, .. } => {
                let object_type = config.first().map(|b| b >> 3).unwrap_or(2);
                format!("mp4a.40.{}", object_type)
            }
            CodecConfig::Unknown(t) => t.as_str().trim().to_string(),
        }
    }
}

/// Defaults from `trex`, used when `tfhd`/`trun` omit a field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackDefaults {
    pub sample_duration: u32,
    pub sample_size: u32,
    pub sample_flags: u32,
}

/// A track of a loaded container
#[derive(Debug)]
pub struct Track {
    pub id: u32,
    pub kind: TrackKind,
    pub timescale: u32,
    /// Duration from `mdhd`, in the track timescale
    pub duration: u64,
    pub width: u16,
    pub height: u16,
    pub codec: CodecConfig,
    /// The raw `stsd` box, header included
    pub stsd: Bytes,
    pub defaults: TrackDefaults,
    pub(crate) samples: Option<SampleTableBuilder>,
    pub(crate) fragments: OnceLock<Vec<Fragment>>,
}

impl Track {
    /// Parse a `trak` payload
    pub fn parse(trak: &[u8]) -> ParseResult<Self> {
        let tkhd = require_child(trak, BoxType::TKHD, "tkhd")?;
        let (id, width, height) = parse_tkhd(tkhd)?;

        let mdia = require_child(trak, BoxType::MDIA, "mdia")?;
        let (timescale, duration) = parse_mdhd(require_child(mdia, BoxType::MDHD, "mdhd")?)?;
        if timescale == 0 {
            return Err(ParseError::invalid(BoxType::MDHD, "zero timescale"));
        }

        let kind = {
            let mut r = ByteReader::new(require_child(mdia, BoxType::HDLR, "hdlr")?);
            r.version_flags()?;
            r.skip(4)?;
            match r.bytes(4)? {
                t if t == handler::VIDEO => TrackKind::Video,
                t if t == handler::AUDIO => TrackKind::Audio,
                _ => TrackKind::Other,
            }
        };

        let minf = require_child(mdia, BoxType::MINF, "minf")?;
        let stbl = require_child(minf, BoxType::STBL, "stbl")?;
        let stsd_body = require_child(stbl, BoxType::STSD, "stsd")?;
        let codec = parse_stsd(stsd_body)?;

        let mut stsd = Vec::with_capacity(stsd_body.len() + 8);
        stsd.extend_from_slice(&((stsd_body.len() + 8) as u32).to_be_bytes());
        stsd.extend_from_slice(&BoxType::STSD.0);
        stsd.extend_from_slice(stsd_body);

        let table = SampleTableBuilder::from_stbl(stbl)?;
        let samples = (table.sample_count() > 0).then_some(table);

        Ok(Self {
            id,
            kind,
            timescale,
            duration,
            width,
            height,
            codec,
            stsd: Bytes::from(stsd),
            defaults: TrackDefaults::default(),
            samples,
            fragments: OnceLock::new(),
        })
    }

    /// Convert a time in this track's timescale to 100 ns units
    pub fn to_hns(&self, t: u64) -> u64 {
        ((t as u128 * 10_000_000) / self.timescale as u128) as u64
    }

    /// Whether the fragment index comes from the file's own `moof` boxes
    pub fn is_fragmented(&self) -> bool {
        self.samples.is_none()
    }
}

fn parse_tkhd(body: &[u8]) -> ParseResult<(u32, u16, u16)> {
    let mut r = ByteReader::new(body);
    let (version, _) = r.version_flags()?;
    if version == 1 {
        r.skip(16)?;
    } else {
        r.skip(8)?;
    }
    let id = r.u32()?;
    // reserved, duration, reserved[2], layer, alternate_group, volume,
    // reserved, matrix
    r.skip(4)?;
    r.skip(if version == 1 { 8 } else { 4 })?;
    r.skip(8 + 2 + 2 + 2 + 2 + 36)?;
    let width = (r.u32()? >> 16) as u16;
    let height = (r.u32()? >> 16) as u16;
    Ok((id, width, height))
}

fn parse_mdhd(body: &[u8]) -> ParseResult<(u32, u64)> {
    let mut r = ByteReader::new(body);
    let (version, _) = r.version_flags()?;
    r.skip(if version == 1 { 16 } else { 8 })?;
    let timescale = r.u32()?;
    let duration = r.versioned_u64(version)?;
    Ok((timescale, duration))
}

fn parse_stsd(body: &[u8]) -> ParseResult<CodecConfig> {
    let mut r = ByteReader::new(body);
    r.version_flags()?;
    if r.u32()? == 0 {
        return Err(ParseError::invalid(BoxType::STSD, "no sample entries"));
    }
    let (entry_type, entry) = r
        .next_box()?
        .ok_or_else(|| ParseError::invalid(BoxType::STSD, "truncated sample entry"))?;

    match entry_type {
        BoxType::AVC1 | BoxType::AVC3 | BoxType::ENCV => {
            // VisualSampleEntry fields before child boxes
            let children = entry.get(78..).unwrap_or_default();
            match find_child(children, BoxType::AVCC)? {
                Some(avcc) => parse_avcc(avcc),
                None => Ok(CodecConfig::Unknown(entry_type)),
            }
        }
        BoxType::MP4A | BoxType::ENCA => {
            let mut e = ByteReader::new(entry);
            e.skip(16)?;
            let channels = e.u16()?;
            let sample_size = e.u16()?;
            e.skip(4)?;
            let sample_rate = e.u32()? >> 16;
            let config = match find_child(entry.get(28..).unwrap_or_default(), BoxType::ESDS)? {
                Some(esds) => parse_esds(esds)?,
                None => Bytes::new(),
            };
            Ok(CodecConfig::Aac {
                config,
                sample_rate,
                channels,
                sample_size,
            })
        }
        other => Ok(CodecConfig::Unknown(other)),
    }
}

fn parse_avcc(body: &[u8]) -> ParseResult<CodecConfig> {
    let mut r = ByteReader::new(body);
    r.skip(5)?;
    let n_sps = r.u8()? & 0x1F;
    let mut sps = Vec::with_capacity(n_sps as usize);
    for _ in 0..n_sps {
        let len = r.u16()? as usize;
        sps.push(Bytes::copy_from_slice(r.bytes(len)?));
    }
    let n_pps = r.u8()?;
    let mut pps = Vec::with_capacity(n_pps as usize);
    for _ in 0..n_pps {
        let len = r.u16()? as usize;
        pps.push(Bytes::copy_from_slice(r.bytes(len)?));
    }
    Ok(CodecConfig::Avc { sps, pps })
}

/// Dig the DecoderSpecificInfo out of an `esds` payload
fn parse_esds(body: &[u8]) -> ParseResult<Bytes> {
    fn descriptor(r: &mut ByteReader<'_>) -> ParseResult<(u8, usize)> {
        let tag = r.u8()?;
        let mut len = 0usize;
        for _ in 0..4 {
            let b = r.u8()?;
            len = (len << 7) | (b & 0x7F) as usize;
            if b & 0x80 == 0 {
                break;
            }
        }
        Ok((tag, len))
    }

    let mut r = ByteReader::new(body);
    r.version_flags()?;

    let (tag, _) = descriptor(&mut r)?;
    if tag != 0x03 {
        return Err(ParseError::invalid(BoxType::ESDS, "missing ES descriptor"));
    }
    r.skip(2)?;
    let flags = r.u8()?;
    if flags & 0x80 != 0 {
        r.skip(2)?;
    }
    if flags & 0x40 != 0 {
        let url_len = r.u8()? as usize;
        r.skip(url_len)?;
    }
    if flags & 0x20 != 0 {
        r.skip(2)?;
    }

    let (tag, _) = descriptor(&mut r)?;
    if tag != 0x04 {
        return Err(ParseError::invalid(BoxType::ESDS, "missing decoder config"));
    }
    r.skip(13)?;

    let (tag, len) = descriptor(&mut r)?;
    if tag != 0x05 {
        return Ok(Bytes::new());
    }
    Ok(Bytes::copy_from_slice(r.bytes(len)?))
}
