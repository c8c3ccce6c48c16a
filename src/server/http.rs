//! Request and response types at the HTTP-layer boundary
//!
//! Wire parsing and TLS termination belong to the embedding HTTP layer. It
//! hands the server a parsed [`Request`], writes back the [`Response`], and
//! reports connection lifecycle as [`HttpEvent`]s.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, Method, StatusCode};

use crate::error::Error;
use crate::media::FileSlice;
use crate::registry::{ClientId, ClientSocket};

/// The Icecast source method, routed like `PUT`
pub fn source_method() -> Method {
    Method::from_bytes(b"SOURCE").unwrap_or(Method::PUT)
}

/// A parsed inbound request
#[derive(Debug, Clone)]
pub struct Request {
    /// Connection the request arrived on
    pub client: ClientId,
    pub method: Method,
    /// Path without the query string
    pub path: String,
    pub query: HashMap<String, String>,
    /// Query string as received, without `?`
    pub raw_query: Option<String>,
    pub headers: HeaderMap,
    /// Arrived on the TLS listener
    pub tls: bool,
    /// Arrived on the administrative listener
    pub admin_listener: bool,
}

impl Request {
    /// Build a request for `target` (`/path?query`)
    pub fn new(method: Method, target: &str) -> Self {
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        let query = raw_query
            .as_deref()
            .map(parse_query)
            .unwrap_or_default();

        Self {
            client: ClientId(0),
            method,
            path: path.to_string(),
            query,
            raw_query,
            headers: HeaderMap::new(),
            tls: false,
            admin_listener: false,
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn put(target: &str) -> Self {
        Self::new(Method::PUT, target)
    }

    pub fn source(target: &str) -> Self {
        Self::new(source_method(), target)
    }

    pub fn client(mut self, id: u64) -> Self {
        self.client = ClientId(id);
        self
    }

    /// Add a header; invalid names or values are dropped
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::debug!(header = name, "Dropping invalid header"),
        }
        self
    }

    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn admin_listener(mut self, admin: bool) -> Self {
        self.admin_listener = admin;
        self
    }

    /// Replace the query string
    pub fn set_query(&mut self, raw_query: Option<String>) {
        self.query = raw_query.as_deref().map(parse_query).unwrap_or_default();
        self.raw_query = raw_query;
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Icecast `SOURCE`
    pub fn is_source(&self) -> bool {
        self.method.as_str() == "SOURCE"
    }
}

/// Malformed query strings parse as empty
fn parse_query(query: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}

/// When an ingest response is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Write `200` now, then read the body (Icecast)
    Immediate,
    /// Read the body to its end, then write the response
    AtEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Full(Bytes),
    /// Written in order; used for fragment header then payload
    Parts(Vec<Bytes>),
    /// A file range, written block by block from [`FileSlice::blocks`]
    File(FileSlice),
    /// Write headers, report `HeadersWritten`, then stream from the socket
    /// channel until it closes
    Handoff,
    /// Forward the request body as `BodyChunk` events
    Ingest(IngestMode),
}

/// A response for the HTTP layer to write
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn ok(content_type: &str, body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, content_type)
            .with_body(Body::Full(body.into()))
    }

    pub fn html(body: String) -> Self {
        Self::ok("text/html; charset=utf-8", body)
    }

    pub fn text(body: String) -> Self {
        Self::ok("text/plain; charset=utf-8", body)
    }

    pub fn parts(content_type: &str, parts: Vec<Bytes>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, content_type)
            .with_body(Body::Parts(parts))
    }

    pub fn handoff(content_type: &str) -> Self {
        Self::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, content_type)
            .with_body(Body::Handoff)
    }

    pub fn ingest(mode: IngestMode) -> Self {
        Self::new(StatusCode::OK).with_body(Body::Ingest(mode))
    }

    pub fn redirect(location: &str) -> Self {
        Self::new(StatusCode::TEMPORARY_REDIRECT).with_header(LOCATION, location)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn from_error(error: &Error) -> Self {
        Self::new(error.status())
    }

    /// Set a header; an unrepresentable value is dropped
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body bytes in write order; empty for streaming bodies
    pub fn body_bytes(&self) -> Bytes {
        match &self.body {
            Body::Full(bytes) => bytes.clone(),
            Body::Parts(parts) => {
                let mut buf = BytesMut::with_capacity(parts.iter().map(Bytes::len).sum());
                for part in parts {
                    buf.extend_from_slice(part);
                }
                buf.freeze()
            }
            Body::Empty | Body::File(_) | Body::Handoff | Body::Ingest(_) => Bytes::new(),
        }
    }
}

/// Connection lifecycle reported by the HTTP layer
#[derive(Debug)]
pub enum HttpEvent {
    /// Headers of a `Handoff` response are on the wire
    HeadersWritten { client: ClientId, socket: ClientSocket },
    /// Part of an ingest request body
    BodyChunk { client: ClientId, data: Bytes },
    /// The peer went away
    Disconnected { client: ClientId },
}
