//! On-demand asset resources under `/ism-vod/{key}/...`

use http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use http::StatusCode;

use crate::error::{Error, Result};
use crate::ism::{dash, smooth, Content, ContentQuery};
use crate::media::{ByteRange, FileSlice, TrackKind};
use crate::server::engine::Server;
use crate::server::http::{Body, Request, Response};
use crate::server::resource::Resource;

const DASH_CONTENT_TYPE: &str = "application/dash+xml";

/// Dispatch on the path below the asset key
pub fn vod(server: &mut Server, resource: &Resource, req: &Request) -> Result<Response> {
    let rest = req
        .path
        .strip_prefix(resource.location.as_str())
        .ok_or_else(|| Error::not_found(req.path.clone()))?;
    let (key, what) = rest
        .split_once('/')
        .ok_or_else(|| Error::not_found(req.path.clone()))?;

    let asset = server.assets.get(key)?;
    match what {
        "Manifest" => Ok(Response::ok("text/xml", smooth::render_manifest(&asset)?)),
        "manifest-range.mpd" => Ok(Response::ok(DASH_CONTENT_TYPE, dash::render_range_mpd(&asset)?)),
        "manifest-live.mpd" => Ok(Response::ok(DASH_CONTENT_TYPE, dash::render_live_mpd(&asset)?)),
        "content" => {
            let query = ContentQuery::parse(&req.query)?;
            let content_type = match query.kind {
                TrackKind::Audio => "audio/mp4",
                _ => "video/mp4",
            };
            match asset.content(&query)? {
                Content::Init(init) => Ok(Response::ok(content_type, init)),
                Content::Fragment { header, payload } => {
                    Ok(Response::parts(content_type, vec![header, payload]))
                }
            }
        }
        _ => match what.strip_prefix("content-range/") {
            Some(id) => content_range(&asset.level_by_id(id)?.container, req),
            None => Err(Error::not_found(req.path.clone())),
        },
    }
}

/// Serve the backing file of a level, honouring a single `Range`
fn content_range(container: &crate::media::Container, req: &Request) -> Result<Response> {
    let size = container.file_size();
    let (status, range) = match req.header_str("range") {
        Some(header) => (StatusCode::PARTIAL_CONTENT, ByteRange::parse(header, size)?),
        None => (
            StatusCode::OK,
            ByteRange::full(size).ok_or_else(|| Error::not_found("empty file"))?,
        ),
    };

    let mut response = Response::new(status)
        .with_header(CONTENT_TYPE, "video/mp4")
        .with_header(ACCEPT_RANGES, "bytes")
        .with_header(CONTENT_LENGTH, &range.len().to_string())
        .with_body(Body::File(FileSlice::new(container.path(), range)));
    if status == StatusCode::PARTIAL_CONTENT {
        response = response.with_header(CONTENT_RANGE, &range.content_range(size));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use crate::media::test_util::{asset_dir, AssetSpec};
    use crate::server::{events, Body, Request, Server, ServerConfig};

    const DESCRIPTOR: &str = r#"
[[level]]
file = "clip.ismv"
video_bitrate = 2962000
audio_bitrate = 128000
"#;

    fn server(root: &std::path::Path) -> Server {
        let (tx, _rx) = events::channel();
        Server::new(ServerConfig::default().vod_root(root), tx)
    }

    #[test]
    fn test_manifests() {
        let root = asset_dir("clip", &AssetSpec::default(), Some(DESCRIPTOR));
        let mut server = server(root.path());

        let res = server.handle_request(Request::get("/ism-vod/clip/Manifest"));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header_str("content-type"), Some("text/xml"));
        let body = String::from_utf8(res.body_bytes().to_vec()).unwrap();
        assert!(body.contains("SmoothStreamingMedia"));

        let res = server.handle_request(Request::get("/ism-vod/clip/manifest-live.mpd"));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header_str("content-type"), Some("application/dash+xml"));

        let res = server.handle_request(Request::get("/ism-vod/clip/manifest-range.mpd"));
        assert_eq!(res.status, StatusCode::OK);
    }

    #[test]
    fn test_content() {
        let root = asset_dir("clip", &AssetSpec::default(), Some(DESCRIPTOR));
        let mut server = server(root.path());

        let res = server.handle_request(Request::get(
            "/ism-vod/clip/content?stream=video&bitrate=2962000&start_time=init",
        ));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header_str("content-type"), Some("video/mp4"));
        assert!(matches!(res.body, Body::Full(_)));

        let res = server.handle_request(Request::get(
            "/ism-vod/clip/content?stream=audio&bitrate=128000&start_time=10000000",
        ));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header_str("content-type"), Some("audio/mp4"));
        match &res.body {
            Body::Parts(parts) => assert_eq!(parts.len(), 2),
            other => panic!("unexpected body {:?}", other),
        }

        // No fragment starts here
        let res = server.handle_request(Request::get(
            "/ism-vod/clip/content?stream=video&bitrate=2962000&start_time=5000000",
        ));
        assert_eq!(res.status, StatusCode::NOT_FOUND);

        let res = server.handle_request(Request::get("/ism-vod/clip/content?stream=text"));
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    /// Concatenated blocks of a file body
    fn file_body(res: &crate::server::Response) -> Vec<u8> {
        match &res.body {
            Body::File(slice) => slice.blocks().unwrap().flat_map(|b| b.unwrap().to_vec()).collect(),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_content_range() {
        let root = asset_dir("clip", &AssetSpec::default(), Some(DESCRIPTOR));
        let mut server = server(root.path());
        let size = std::fs::metadata(root.path().join("clip/clip.ismv")).unwrap().len();

        let res = server.handle_request(Request::get("/ism-vod/clip/content-range/v0"));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header_str("content-length"), Some(size.to_string().as_str()));
        assert_eq!(file_body(&res).len() as u64, size);

        let res = server.handle_request(Request::get("/ism-vod/clip/content-range/v0").header("range", "bytes=0-7"));
        assert_eq!(res.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            res.header_str("content-range"),
            Some(format!("bytes 0-7/{}", size).as_str())
        );
        let body = file_body(&res);
        assert_eq!(body.len(), 8);
        assert_eq!(&body[4..8], b"ftyp");

        let res = server.handle_request(
            Request::get("/ism-vod/clip/content-range/v0").header("range", "bytes=0-1,4-5"),
        );
        assert_eq!(res.status, StatusCode::RANGE_NOT_SATISFIABLE);

        let res = server.handle_request(Request::get("/ism-vod/clip/content-range/x9"));
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_content_range_large_file_not_buffered() {
        use crate::media::range::BLOCK_SIZE;
        use std::io::Write;

        let root = asset_dir("clip", &AssetSpec::default(), Some(DESCRIPTOR));
        let path = root.path().join("clip/clip.ismv");
        // Trailing box running to the end of the file, then a sparse extension
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0, 0, 0, 0, b'f', b'r', b'e', b'e']).unwrap();
        let size: u64 = 512 * 1024 * 1024;
        file.set_len(size).unwrap();
        drop(file);

        let mut server = server(root.path());
        let res = server.handle_request(Request::get("/ism-vod/clip/content-range/v0"));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header_str("content-length"), Some(size.to_string().as_str()));
        assert!(res.body_bytes().is_empty());

        let slice = match &res.body {
            Body::File(slice) => slice.clone(),
            other => panic!("unexpected body {:?}", other),
        };
        assert_eq!(slice.len(), size);
        let mut blocks = slice.blocks().unwrap();
        assert_eq!(blocks.next().unwrap().unwrap().len(), BLOCK_SIZE);

        let res = server.handle_request(
            Request::get("/ism-vod/clip/content-range/v0").header("range", "bytes=-16"),
        );
        assert_eq!(res.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(file_body(&res), vec![0u8; 16]);
    }

    #[test]
    fn test_unknown_assets() {
        let root = asset_dir("clip", &AssetSpec::default(), Some(DESCRIPTOR));
        let mut server = server(root.path());

        for path in ["/ism-vod/other/Manifest", "/ism-vod/clip", "/ism-vod/clip/nothing", "/ism-vod/../clip/Manifest"] {
            let res = server.handle_request(Request::get(path));
            assert_eq!(res.status, StatusCode::NOT_FOUND, "{}", path);
        }
    }
}
