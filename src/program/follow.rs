//! Follow programs
//!
//! A pull-follow program mirrors a program on another server: it fetches the
//! upstream `.list` and relays every stream listed there.

use std::future::Future;
use std::pin::Pin;

use super::stream::{Stream, StreamType};
use crate::error::{Error, Result};

/// One line of a `.list` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub index: usize,
    pub stream_type: StreamType,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub location: String,
}

/// Render the `.list` body for `streams`
pub fn render_stream_list(streams: &[Stream]) -> String {
    streams
        .iter()
        .map(|s| {
            format!(
                "{} {} {} {} {} {}\n",
                s.index,
                s.stream_type.type_id(),
                s.width,
                s.height,
                s.bitrate,
                s.location
            )
        })
        .collect()
}

/// Parse a `.list` body. Lines that do not have exactly six well-formed
/// fields are skipped.
pub fn parse_stream_list(body: &str) -> Vec<ListEntry> {
    body.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<ListEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [index, type_id, width, height, bitrate, location] = fields.as_slice() else {
        return None;
    };
    if !location.starts_with('/') {
        return None;
    }
    Some(ListEntry {
        index: index.parse().ok()?,
        stream_type: StreamType::from_type_id(type_id)?,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
        bitrate: bitrate.parse().ok()?,
        location: location.to_string(),
    })
}

/// Stream geometry of single-stream follow programs
pub const RELAY_WIDTH: u32 = 640;
pub const RELAY_HEIGHT: u32 = 360;
pub const RELAY_BITRATE: u64 = 700_000;

/// The one Ogg stream of an HTTP-follow program
pub fn relay_stream(program: &str, index: usize, uri: &str) -> Stream {
    Stream::new(
        program,
        index,
        StreamType::OggTheoraVorbis,
        RELAY_WIDTH,
        RELAY_HEIGHT,
        RELAY_BITRATE,
    )
    .following(uri)
}

/// URL of a program's stream list on `host`
pub fn list_url(host: &str, program: &str) -> String {
    format!("http://{}/{}.list", host, program)
}

/// Future returned by [`UpstreamFetcher::fetch`]
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

/// Fetches small text documents from upstream servers
pub trait UpstreamFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> FetchFuture;
}

/// Result of a stream-list fetch, delivered into the dispatch loop
#[derive(Debug)]
pub struct UpstreamEvent {
    pub program: String,
    pub result: Result<String>,
}

/// [`UpstreamFetcher`] over `reqwest`
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl UpstreamFetcher for ReqwestFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        let request = self.client.get(url);
        let url = url.to_string();
        Box::pin(async move {
            let response = request
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::Upstream(format!("{}: {}", url, e)))?;
            response
                .text()
                .await
                .map_err(|e| Error::Upstream(format!("{}: {}", url, e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_list() {
        let streams = vec![
            Stream::new("news", 0, StreamType::OggTheoraVorbis, 640, 360, 700_000),
            Stream::new("news", 1, StreamType::TsMain, 1280, 720, 2_000_000),
        ];
        assert_eq!(
            render_stream_list(&streams),
            "0 ogg 640 360 700000 /news-640x360-700kbps.ogv\n\
             1 mpeg-ts-main 1280 720 2000000 /news-1280x720-2000kbps-main.ts\n"
        );
    }

    #[test]
    fn test_parse_list_skips_malformed_lines() {
        let body = "0 webm 640 360 600000 /news-640x360-600kbps.webm\n\
                    garbage\n\
                    1 mkv 640 360 600000 /x.mkv\n\
                    2 flv 320 240 300000 /news-320x240-300kbps.flv extra\n\
                    3 flv 320 240 abc /news.flv\n\
                    4 flv 320 240 300000 /news-320x240-300kbps.flv\n";
        let entries = parse_stream_list(body);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stream_type, StreamType::Webm);
        assert_eq!(entries[0].location, "/news-640x360-600kbps.webm");
        assert_eq!(entries[1].index, 4);
        assert_eq!(entries[1].bitrate, 300_000);
    }

    #[test]
    fn test_list_roundtrip_through_render() {
        let streams = vec![Stream::new("a", 0, StreamType::Flv, 320, 240, 250_000)];
        let entries = parse_stream_list(&render_stream_list(&streams));
        assert_eq!(entries[0].location, streams[0].location);
        assert_eq!(entries[0].width, 320);
    }

    #[test]
    fn test_relay_stream() {
        let stream = relay_stream("relay", 0, "http://upstream.example/a.ogv");
        assert_eq!(stream.stream_type, StreamType::OggTheoraVorbis);
        assert_eq!((stream.width, stream.height, stream.bitrate), (640, 360, 700_000));
        assert_eq!(stream.follow_uri.as_deref(), Some("http://upstream.example/a.ogv"));
    }

    #[test]
    fn test_list_url() {
        assert_eq!(list_url("upstream:8008", "news"), "http://upstream:8008/news.list");
    }
}
