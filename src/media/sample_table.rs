//! Sample tables of non-fragmented files
//!
//! Resolves stts/stss/stsc/stsz/stco/ctts into one flat list of samples so the
//! fragmentizer can cut it into fragments.

use super::atoms::BoxType;
use super::error::ParseError;
use super::reader::{find_child, ByteReader};

type ParseResult<T> = std::result::Result<T, ParseError>;

/// One resolved sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// File offset of the sample data
    pub offset: u64,
    pub size: u32,
    /// Decode time in the track timescale
    pub dts: u64,
    pub duration: u32,
    pub cts_offset: i32,
    pub is_sync: bool,
}

#[derive(Debug, Default)]
pub struct SampleTableBuilder {
    stts: Vec<(u32, u32)>,
    sync: Option<Vec<u32>>,
    stsc: Vec<(u32, u32)>,
    uniform_size: u32,
    sizes: Vec<u32>,
    sample_count: u32,
    chunk_offsets: Vec<u64>,
    ctts: Vec<(u32, i32)>,
}

impl SampleTableBuilder {
    /// Read every table out of an `stbl` payload
    pub fn from_stbl(stbl: &[u8]) -> ParseResult<Self> {
        let mut builder = Self::default();

        if let Some(body) = find_child(stbl, BoxType::STTS)? {
            let mut r = ByteReader::new(body);
            r.version_flags()?;
            for _ in 0..r.u32()? {
                builder.stts.push((r.u32()?, r.u32()?));
            }
        }

        if let Some(body) = find_child(stbl, BoxType::STSS)? {
            let mut r = ByteReader::new(body);
            r.version_flags()?;
            let count = r.u32()?;
            let mut sync = Vec::with_capacity(count.min(1 << 20) as usize);
            for _ in 0..count {
                sync.push(r.u32()?);
            }
            builder.sync = Some(sync);
        }

        if let Some(body) = find_child(stbl, BoxType::STSC)? {
            let mut r = ByteReader::new(body);
            r.version_flags()?;
            for _ in 0..r.u32()? {
                let first_chunk = r.u32()?;
                let per_chunk = r.u32()?;
                r.skip(4)?;
                builder.stsc.push((first_chunk, per_chunk));
            }
        }

        if let Some(body) = find_child(stbl, BoxType::STSZ)? {
            let mut r = ByteReader::new(body);
            r.version_flags()?;
            builder.uniform_size = r.u32()?;
            builder.sample_count = r.u32()?;
            if builder.uniform_size == 0 {
                for _ in 0..builder.sample_count {
                    builder.sizes.push(r.u32()?);
                }
            }
        }

        if let Some(body) = find_child(stbl, BoxType::STCO)? {
            let mut r = ByteReader::new(body);
            r.version_flags()?;
            for _ in 0..r.u32()? {
                builder.chunk_offsets.push(r.u32()? as u64);
            }
        } else if let Some(body) = find_child(stbl, BoxType::CO64)? {
            let mut r = ByteReader::new(body);
            r.version_flags()?;
            for _ in 0..r.u32()? {
                builder.chunk_offsets.push(r.u64()?);
            }
        }

        if let Some(body) = find_child(stbl, BoxType::CTTS)? {
            let mut r = ByteReader::new(body);
            r.version_flags()?;
            for _ in 0..r.u32()? {
                builder.ctts.push((r.u32()?, r.i32()?));
            }
        }

        Ok(builder)
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Resolve the flat sample list
    pub fn build(&self) -> ParseResult<Vec<Sample>> {
        let count = self.sample_count as usize;
        let mut samples = Vec::with_capacity(count);
        if count == 0 {
            return Ok(samples);
        }

        let chunk_of = self.chunk_per_sample(count)?;
        let mut durations = self.stts.iter().flat_map(|&(n, d)| std::iter::repeat(d).take(n as usize));
        let mut cts = self.ctts.iter().flat_map(|&(n, o)| std::iter::repeat(o).take(n as usize));
        let mut sync = self.sync.as_ref().map(|s| s.iter().copied().peekable());

        let mut dts = 0u64;
        let mut last_duration = 0u32;
        let mut current_chunk = u32::MAX;
        let mut offset = 0u64;

        for (i, &chunk) in chunk_of.iter().enumerate() {
            if chunk != current_chunk {
                current_chunk = chunk;
                offset = *self.chunk_offsets.get(chunk as usize).ok_or_else(|| {
                    ParseError::invalid(BoxType::STCO, format!("chunk {} has no offset", chunk + 1))
                })?;
            }
            let size = if self.uniform_size > 0 {
                self.uniform_size
            } else {
                self.sizes[i]
            };
            let duration = durations.next().unwrap_or(last_duration);
            last_duration = duration;

            let number = i as u32 + 1;
            let is_sync = match sync.as_mut() {
                None => true,
                Some(iter) => {
                    while iter.next_if(|&n| n < number).is_some() {}
                    iter.next_if_eq(&number).is_some()
                }
            };

            samples.push(Sample {
                offset,
                size,
                dts,
                duration,
                cts_offset: cts.next().unwrap_or(0),
                is_sync,
            });
            offset += size as u64;
            dts += duration as u64;
        }

        Ok(samples)
    }

    /// Zero-based chunk index of every sample
    fn chunk_per_sample(&self, count: usize) -> ParseResult<Vec<u32>> {
        if self.stsc.is_empty() {
            return Err(ParseError::MissingBox("stsc"));
        }
        let n_chunks = self.chunk_offsets.len() as u32;
        let mut out = Vec::with_capacity(count);

        for (i, &(first, per_chunk)) in self.stsc.iter().enumerate() {
            let next_first = self.stsc.get(i + 1).map(|e| e.0).unwrap_or(n_chunks + 1);
            for chunk in first..next_first.min(n_chunks + 1) {
                for _ in 0..per_chunk {
                    if out.len() == count {
                        return Ok(out);
                    }
                    out.push(chunk.saturating_sub(1));
                }
            }
        }

        if out.len() < count {
            return Err(ParseError::invalid(
                BoxType::STSC,
                format!("maps {} of {} samples", out.len(), count),
            ));
        }
        Ok(out)
    }
}
