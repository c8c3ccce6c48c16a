//! Loaded ISOBMFF containers
//!
//! Loading reads `moov` and every `moof` header; sample data is only touched
//! when a fragment payload is assembled.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};

use super::atoms::{BoxHeader, BoxType};
use super::error::ParseError;
use super::fragment::{fragmentize, parse_moof, Chunk, Fragment};
use super::init::init_segment;
use super::moof::serialize_fragment_header;
use super::reader::{children_of, find_child, read_box_body, read_box_header, ByteReader, MAX_BOX_BODY};
use super::track::{Track, TrackDefaults};
use super::writer::mdat_header;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    file_size: u64,
    tracks: Vec<Track>,
    /// `ftyp` through the end of `moov`, when they lead the file
    init_range: Option<Chunk>,
}

impl Container {
    /// Parse the container at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        let mut headers: Vec<BoxHeader> = Vec::new();
        let mut offset = 0;
        while let Some(header) = read_box_header(&mut file, offset, file_size)? {
            offset = header.end();
            headers.push(header);
        }

        let moov = headers
            .iter()
            .find(|h| h.box_type == BoxType::MOOV)
            .copied()
            .ok_or(ParseError::MissingBox("moov"))?;
        let moov_body = read_box_body(&mut file, &moov)?;

        let mut tracks = children_of(&moov_body, BoxType::TRAK)?
            .into_iter()
            .map(Track::parse)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if tracks.is_empty() {
            return Err(ParseError::MissingBox("trak").into());
        }
        apply_trex_defaults(&moov_body, &mut tracks)?;

        let init_range = headers
            .iter()
            .find(|h| h.box_type == BoxType::FTYP)
            .filter(|ftyp| ftyp.offset < moov.offset)
            .map(|ftyp| Chunk {
                offset: ftyp.offset,
                len: moov.end() - ftyp.offset,
            });

        let container = Self {
            path,
            file_size,
            tracks,
            init_range,
        };
        container.index_moofs(&mut file, &headers)?;

        tracing::debug!(
            path = %container.path.display(),
            tracks = container.tracks.len(),
            "Loaded container"
        );
        Ok(container)
    }

    /// Build fragment indices from the file's own `moof` boxes
    fn index_moofs(&self, file: &mut File, headers: &[BoxHeader]) -> Result<()> {
        let mut per_track: HashMap<u32, Vec<Fragment>> = HashMap::new();
        let mut next_time: HashMap<u32, u64> = HashMap::new();
        let defaults = |id: u32| -> Option<TrackDefaults> {
            self.tracks.iter().find(|t| t.id == id).map(|t| t.defaults)
        };

        for (i, moof) in headers.iter().enumerate() {
            if moof.box_type != BoxType::MOOF {
                continue;
            }
            let mdat = headers
                .get(i + 1)
                .filter(|h| h.box_type == BoxType::MDAT)
                .copied();
            let mdat_data = mdat.map(|m| m.data_offset()).unwrap_or(moof.end());

            let body = read_box_body(file, moof)?;
            let parsed = parse_moof(&body, moof.offset, mdat_data, &defaults)?;
            let single_track = parsed.fragments.len() == 1;

            for (track_id, parts) in parsed.fragments {
                let Some(track) = self.track(track_id) else {
                    continue;
                };
                let list = per_track.entry(track_id).or_default();
                let file_range = mdat.filter(|_| single_track).map(|m| Chunk {
                    offset: moof.offset,
                    len: m.end() - moof.offset,
                });
                let next = next_time.get(&track_id).copied().unwrap_or(0);
                let fragment = parts.into_fragment(track, list.len() as u32, next, file_range);
                let elapsed: u64 = fragment.samples.iter().map(|s| s.duration as u64).sum();
                next_time.insert(track_id, fragment.decode_time + elapsed);
                list.push(fragment);
            }
        }

        for track in self.tracks.iter().filter(|t| t.is_fragmented()) {
            let fragments = per_track.remove(&track.id).unwrap_or_default();
            let _ = track.fragments.set(fragments);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, track_id: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    /// Byte span of `ftyp` + `moov` for range-addressed manifests
    pub fn init_range(&self) -> Option<Chunk> {
        self.init_range
    }

    /// Ordered fragments of a track. Tracks without `moof`-based fragments
    /// are fragmentized from their sample tables on first use and the result
    /// is cached for the life of the container.
    pub fn fragment_index(&self, track_id: u32) -> Result<&[Fragment]> {
        let track = self
            .track(track_id)
            .ok_or_else(|| Error::not_found(format!("track {}", track_id)))?;

        if let Some(fragments) = track.fragments.get() {
            return Ok(fragments);
        }

        let samples = match &track.samples {
            Some(table) => table.build()?,
            None => Vec::new(),
        };
        let fragments = fragmentize(track, &samples);
        tracing::debug!(
            path = %self.path.display(),
            track = track_id,
            fragments = fragments.len(),
            "Fragmentized track"
        );
        let _ = track.fragments.set(fragments);
        Ok(track.fragments.get().map(Vec::as_slice).unwrap_or_default())
    }

    /// The fragment starting exactly at `timestamp` (100 ns units)
    pub fn fragment_by_timestamp(&self, track_id: u32, timestamp: u64) -> Result<&Fragment> {
        let fragments = self.fragment_index(track_id)?;
        fragments
            .binary_search_by_key(&timestamp, |f| f.timestamp)
            .map(|i| &fragments[i])
            .map_err(|_| Error::not_found(format!("track {} has no fragment at {}", track_id, timestamp)))
    }

    /// `mdat` header followed by the fragment's sample bytes
    pub fn assemble_payload(&self, fragment: &Fragment) -> Result<BytesMut> {
        if fragment.size > MAX_BOX_BODY {
            return Err(ParseError::TooLarge {
                box_type: BoxType::MDAT,
                size: fragment.size,
            }
            .into());
        }
        let header = mdat_header(fragment.size);
        let mut buf = BytesMut::with_capacity(header.len() + fragment.size as usize);
        buf.extend_from_slice(&header);

        let mut file = File::open(&self.path)?;
        for chunk in &fragment.chunks {
            file.seek(SeekFrom::Start(chunk.offset))?;
            let start = buf.len();
            buf.resize(start + chunk.len as usize, 0);
            file.read_exact(&mut buf[start..])?;
        }
        Ok(buf)
    }

    /// The `moof` for `fragment`, with per-sample IVs when encrypted
    pub fn serialize_fragment_header(&self, fragment: &Fragment, ivs: Option<&[[u8; 8]]>) -> Bytes {
        serialize_fragment_header(fragment, ivs)
    }

    /// Single-track initialization segment
    pub fn init_segment(&self, track_id: u32) -> Result<Bytes> {
        let track = self
            .track(track_id)
            .ok_or_else(|| Error::not_found(format!("track {}", track_id)))?;
        Ok(init_segment(track))
    }
}

fn apply_trex_defaults(moov: &[u8], tracks: &mut [Track]) -> Result<()> {
    let Some(mvex) = find_child(moov, BoxType::MVEX)? else {
        return Ok(());
    };
    for trex in children_of(mvex, BoxType::TREX)? {
        let mut r = ByteReader::new(trex);
        r.version_flags()?;
        let track_id = r.u32()?;
        r.skip(4)?;
        let defaults = TrackDefaults {
            sample_duration: r.u32()?,
            sample_size: r.u32()?,
            sample_flags: r.u32()?,
        };
        if let Some(track) = tracks.iter_mut().find(|t| t.id == track_id) {
            track.defaults = defaults;
        }
    }
    Ok(())
}
