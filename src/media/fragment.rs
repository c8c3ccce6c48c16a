//! Fragments and fragment indices
//!
//! A fragment is one time-indexed run of samples of a single track. Its
//! timestamp and duration are kept in 100 ns units (the Smooth Streaming and
//! manifest timescale); `decode_time` and per-sample durations stay in the
//! track timescale for the `tfdt`/`trun` boxes.

use super::atoms::{uuid, BoxType};
use super::error::ParseError;
use super::reader::{children_of, find_child, ByteReader};
use super::sample_table::Sample;
use super::track::{Track, TrackDefaults, TrackKind};

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Target fragment length when cutting non-fragmented files, in seconds
pub const TARGET_FRAGMENT_SECS: u64 = 2;

/// `trun` sample flags for sync and non-sync samples
pub const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;
pub const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

/// A byte range of sample data in the backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: u64,
    pub len: u64,
}

/// Per-sample data needed to rebuild a `trun`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentSample {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub cts_offset: i32,
}

impl FragmentSample {
    pub fn is_sync(&self) -> bool {
        // sample_is_non_sync_sample bit
        self.flags & 0x0001_0000 == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub track_id: u32,
    /// Position in the track's fragment index
    pub index: u32,
    /// Start time in 100 ns units
    pub timestamp: u64,
    /// Duration in 100 ns units
    pub duration: u64,
    /// Start time in the track timescale
    pub decode_time: u64,
    /// Total sample bytes
    pub size: u64,
    /// Sample data, in payload order
    pub chunks: Vec<Chunk>,
    pub samples: Vec<FragmentSample>,
    /// `moof` + `mdat` span in the backing file when the file is already
    /// fragmented with one track per `moof`
    pub file_range: Option<Chunk>,
}

impl Fragment {
    /// End time in 100 ns units
    pub fn end(&self) -> u64 {
        self.timestamp + self.duration
    }
}

/// Accumulates samples and coalesces their byte ranges into chunks
#[derive(Debug)]
struct FragmentBuilder {
    track_id: u32,
    decode_time: u64,
    elapsed: u64,
    size: u64,
    chunks: Vec<Chunk>,
    samples: Vec<FragmentSample>,
}

impl FragmentBuilder {
    fn new(track_id: u32, decode_time: u64) -> Self {
        Self {
            track_id,
            decode_time,
            elapsed: 0,
            size: 0,
            chunks: Vec::new(),
            samples: Vec::new(),
        }
    }

    fn push(&mut self, offset: u64, sample: FragmentSample) {
        let len = sample.size as u64;
        match self.chunks.last_mut() {
            Some(last) if last.offset + last.len == offset => last.len += len,
            _ => self.chunks.push(Chunk { offset, len }),
        }
        self.size += len;
        self.elapsed += sample.duration as u64;
        self.samples.push(sample);
    }

    fn finish(self, track: &Track, index: u32, file_range: Option<Chunk>) -> Fragment {
        let timestamp = track.to_hns(self.decode_time);
        let end = track.to_hns(self.decode_time + self.elapsed);
        Fragment {
            track_id: self.track_id,
            index,
            timestamp,
            duration: end - timestamp,
            decode_time: self.decode_time,
            size: self.size,
            chunks: self.chunks,
            samples: self.samples,
            file_range,
        }
    }
}

/// One-time fragmentization pass over a resolved sample table. Video is cut
/// at the first sync sample after the target length; other tracks purely on
/// length.
pub fn fragmentize(track: &Track, samples: &[Sample]) -> Vec<Fragment> {
    let target = TARGET_FRAGMENT_SECS * track.timescale as u64;
    let mut fragments = Vec::new();
    let mut current: Option<FragmentBuilder> = None;

    for sample in samples {
        let cut = match &current {
            None => true,
            Some(b) if b.elapsed < target => false,
            Some(_) => track.kind != TrackKind::Video || sample.is_sync,
        };
        if cut {
            if let Some(b) = current.take() {
                let index = fragments.len() as u32;
                fragments.push(b.finish(track, index, None));
            }
            current = Some(FragmentBuilder::new(track.id, sample.dts));
        }

        if let Some(b) = current.as_mut() {
            b.push(
                sample.offset,
                FragmentSample {
                    duration: sample.duration,
                    size: sample.size,
                    flags: if sample.is_sync {
                        SYNC_SAMPLE_FLAGS
                    } else {
                        NON_SYNC_SAMPLE_FLAGS
                    },
                    cts_offset: sample.cts_offset,
                },
            );
        }
    }

    if let Some(b) = current {
        let index = fragments.len() as u32;
        fragments.push(b.finish(track, index, None));
    }
    fragments
}

/// Fragments found in one `moof`, keyed by track id
#[derive(Debug)]
pub struct MoofFragments {
    pub fragments: Vec<(u32, FragmentParts)>,
}

/// A fragment read from a `traf`, before the track assigns its index
#[derive(Debug)]
pub struct FragmentParts {
    /// Explicit decode time from `tfdt` or `tfxd`
    pub decode_time: Option<u64>,
    builder_samples: Vec<(u64, FragmentSample)>,
}

impl FragmentParts {
    /// Finish into a fragment, falling back to `next_decode_time` when the
    /// `traf` carried no time of its own.
    pub fn into_fragment(
        self,
        track: &Track,
        index: u32,
        next_decode_time: u64,
        file_range: Option<Chunk>,
    ) -> Fragment {
        let mut b = FragmentBuilder::new(track.id, self.decode_time.unwrap_or(next_decode_time));
        for (offset, sample) in self.builder_samples {
            b.push(offset, sample);
        }
        b.finish(track, index, file_range)
    }
}

/// Parse a `moof` payload located at `moof_offset` in the file. `mdat_data`
/// is the file offset of the following `mdat` payload.
pub fn parse_moof(
    moof: &[u8],
    moof_offset: u64,
    mdat_data: u64,
    defaults: &dyn Fn(u32) -> Option<TrackDefaults>,
) -> ParseResult<MoofFragments> {
    let mut fragments = Vec::new();

    for traf in children_of(moof, BoxType::TRAF)? {
        let tfhd = find_child(traf, BoxType::TFHD)?.ok_or(ParseError::MissingBox("tfhd"))?;
        let mut r = ByteReader::new(tfhd);
        let (_, tf_flags) = r.version_flags()?;
        let track_id = r.u32()?;
        let mut d = defaults(track_id).unwrap_or_default();

        let base = if tf_flags & 0x01 != 0 {
            Some(r.u64()?)
        } else {
            None
        };
        if tf_flags & 0x02 != 0 {
            r.skip(4)?;
        }
        if tf_flags & 0x08 != 0 {
            d.sample_duration = r.u32()?;
        }
        if tf_flags & 0x10 != 0 {
            d.sample_size = r.u32()?;
        }
        if tf_flags & 0x20 != 0 {
            d.sample_flags = r.u32()?;
        }
        let base = base.unwrap_or(moof_offset);

        let mut decode_time = match find_child(traf, BoxType::TFDT)? {
            Some(tfdt) => {
                let mut r = ByteReader::new(tfdt);
                let (version, _) = r.version_flags()?;
                Some(r.versioned_u64(version)?)
            }
            None => None,
        };
        if decode_time.is_none() {
            decode_time = tfxd_time(traf)?;
        }

        let mut samples = Vec::new();
        let mut cursor = mdat_data;
        for trun in children_of(traf, BoxType::TRUN)? {
            let mut r = ByteReader::new(trun);
            let (_, flags) = r.version_flags()?;
            let count = r.u32()?;
            if flags & 0x01 != 0 {
                let data_offset = r.i32()? as i64;
                cursor = (base as i64 + data_offset).max(0) as u64;
            }
            let first_flags = if flags & 0x04 != 0 {
                Some(r.u32()?)
            } else {
                None
            };

            for i in 0..count {
                let duration = if flags & 0x100 != 0 {
                    r.u32()?
                } else {
                    d.sample_duration
                };
                let size = if flags & 0x200 != 0 {
                    r.u32()?
                } else {
                    d.sample_size
                };
                let mut sample_flags = if flags & 0x400 != 0 {
                    r.u32()?
                } else {
                    d.sample_flags
                };
                if i == 0 {
                    if let Some(f) = first_flags {
                        sample_flags = f;
                    }
                }
                let cts_offset = if flags & 0x800 != 0 { r.i32()? } else { 0 };

                samples.push((
                    cursor,
                    FragmentSample {
                        duration,
                        size,
                        flags: sample_flags,
                        cts_offset,
                    },
                ));
                cursor += size as u64;
            }
        }

        fragments.push((
            track_id,
            FragmentParts {
                decode_time,
                builder_samples: samples,
            },
        ));
    }

    Ok(MoofFragments { fragments })
}

/// Absolute time from a Smooth Streaming `tfxd` box
fn tfxd_time(traf: &[u8]) -> ParseResult<Option<u64>> {
    for body in children_of(traf, BoxType::UUID)? {
        let mut r = ByteReader::new(body);
        if r.bytes(16)? != uuid::TFXD {
            continue;
        }
        let (version, _) = r.version_flags()?;
        return Ok(Some(r.versioned_u64(version)?));
    }
    Ok(None)
}
