//! Resources and the path registry
//!
//! A resource binds a location to per-method handlers. Exact locations live
//! in a map; prefix resources are kept in an ordered list and the first
//! registered prefix that matches wins.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitflags::bitflags;
use bytes::Bytes;
use http::Method;
use sha2::{Digest, Sha256};

use super::engine::Server;
use super::http::{Request, Response};
use crate::error::{Error, Result};

bitflags! {
    /// Access rules checked before a handler runs
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        /// Part of the public UI; hidden on public listeners when the UI is off
        const UI = 1 << 0;
        /// Needs an admin session
        const ADMIN = 1 << 1;
        /// Only served over TLS
        const HTTPS_ONLY = 1 << 2;
        /// Never served over TLS; TLS requests get a one-time redirect
        const HTTP_ONLY = 1 << 3;
        /// Location is a path prefix
        const PREFIX = 1 << 4;
    }
}

/// Who registered a resource; removing the owner removes its resources
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceOwner {
    Server,
    Program(String),
    Stream { program: String, index: usize },
    Vod,
}

impl ResourceOwner {
    /// Program this owner belongs to
    pub fn program(&self) -> Option<&str> {
        match self {
            ResourceOwner::Program(name) | ResourceOwner::Stream { program: name, .. } => Some(name),
            ResourceOwner::Server | ResourceOwner::Vod => None,
        }
    }
}

/// Request handler. Handlers get the server mutably; the resource is a
/// snapshot taken at dispatch time.
pub type Handler = fn(&mut Server, &Resource, &Request) -> Result<Response>;

#[derive(Clone)]
pub struct Resource {
    pub location: String,
    pub flags: ResourceFlags,
    pub content_type: Option<String>,
    pub owner: ResourceOwner,
    pub get: Option<Handler>,
    pub put: Option<Handler>,
    pub post: Option<Handler>,
    /// Cache validator compared against `If-None-Match`
    pub etag: Option<String>,
    /// Body of static resources
    pub content: Option<Bytes>,
}

impl Resource {
    pub fn new(location: impl Into<String>, owner: ResourceOwner) -> Self {
        Self {
            location: location.into(),
            flags: ResourceFlags::empty(),
            content_type: None,
            owner,
            get: None,
            put: None,
            post: None,
            etag: None,
            content: None,
        }
    }

    pub fn flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn get(mut self, handler: Handler) -> Self {
        self.get = Some(handler);
        self
    }

    pub fn put(mut self, handler: Handler) -> Self {
        self.put = Some(handler);
        self
    }

    pub fn post(mut self, handler: Handler) -> Self {
        self.post = Some(handler);
        self
    }

    /// Serve `content` with a content-hash ETag
    pub fn static_content(mut self, content: Bytes) -> Self {
        self.etag = Some(content_etag(&content));
        self.content = Some(content);
        self.get = Some(serve_static);
        self
    }

    pub fn is_prefix(&self) -> bool {
        self.flags.contains(ResourceFlags::PREFIX)
    }

    /// Handler for `method`; `SOURCE` uses the `PUT` handler
    pub fn handler(&self, method: &Method) -> Option<Handler> {
        match method.as_str() {
            "GET" => self.get,
            "PUT" | "SOURCE" => self.put,
            "POST" => self.post,
            _ => None,
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("location", &self.location)
            .field("flags", &self.flags)
            .field("owner", &self.owner)
            .field("etag", &self.etag)
            .finish()
    }
}

/// Quoted base64 SHA-256 of `content`
pub fn content_etag(content: &[u8]) -> String {
    format!("\"{}\"", STANDARD.encode(Sha256::digest(content)))
}

fn serve_static(_server: &mut Server, resource: &Resource, _req: &Request) -> Result<Response> {
    let content = resource
        .content
        .clone()
        .ok_or_else(|| Error::not_found(resource.location.clone()))?;
    let content_type = resource
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    Ok(Response::ok(content_type, content))
}

/// Location → resource table
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    exact: HashMap<String, Resource>,
    prefixes: Vec<Resource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource; locations are unique
    pub fn register(&mut self, resource: Resource) -> Result<()> {
        if self.exact.contains_key(&resource.location)
            || self.prefixes.iter().any(|r| r.location == resource.location)
        {
            return Err(Error::Config(format!("resource {} already registered", resource.location)));
        }

        tracing::debug!(location = %resource.location, owner = ?resource.owner, "Resource registered");
        if resource.is_prefix() {
            self.prefixes.push(resource);
        } else {
            self.exact.insert(resource.location.clone(), resource);
        }
        Ok(())
    }

    pub fn remove(&mut self, location: &str) -> Option<Resource> {
        if let Some(resource) = self.exact.remove(location) {
            return Some(resource);
        }
        let index = self.prefixes.iter().position(|r| r.location == location)?;
        Some(self.prefixes.remove(index))
    }

    /// Remove every resource whose owner matches; returns how many
    pub fn remove_where(&mut self, mut matches: impl FnMut(&ResourceOwner) -> bool) -> usize {
        let before = self.len();
        self.exact.retain(|_, r| !matches(&r.owner));
        self.prefixes.retain(|r| !matches(&r.owner));
        before - self.len()
    }

    /// Exact match first, then the first strict prefix
    pub fn resolve(&self, path: &str) -> Option<&Resource> {
        self.exact.get(path).or_else(|| {
            self.prefixes
                .iter()
                .find(|r| path.len() > r.location.len() && path.starts_with(&r.location))
        })
    }

    pub fn contains(&self, location: &str) -> bool {
        self.exact.contains_key(location) || self.prefixes.iter().any(|r| r.location == location)
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
