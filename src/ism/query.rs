//! `content` query parsing

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::media::TrackKind;

/// Requested start of a `content` fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTime {
    /// Initialization segment
    Init,
    /// Fragment timestamp in 100 ns units
    At(u64),
}

/// `stream={audio|video}&bitrate=N&start_time={N|init}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentQuery {
    pub kind: TrackKind,
    pub bitrate: u32,
    pub start: StartTime,
}

impl ContentQuery {
    /// Parse from decoded query parameters. Anything malformed is NotFound.
    pub fn parse(query: &HashMap<String, String>) -> Result<Self> {
        let field = |name: &str| {
            query
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::not_found(format!("missing query parameter {}", name)))
        };

        let kind = match field("stream")? {
            "video" => TrackKind::Video,
            "audio" => TrackKind::Audio,
            other => return Err(Error::not_found(format!("bad stream {:?}", other))),
        };
        let bitrate = field("bitrate")?
            .parse::<u32>()
            .map_err(|_| Error::not_found("bad bitrate"))?;
        let start = match field("start_time")? {
            "init" => StartTime::Init,
            t => StartTime::At(t.parse::<u64>().map_err(|_| Error::not_found("bad start_time"))?),
        };

        Ok(Self {
            kind,
            bitrate,
            start,
        })
    }
}
