//! One-time redirect resources
//!
//! An http-only resource requested over TLS is answered with a redirect to a
//! freshly generated plain-HTTP path. That path serves the wrapped resource
//! once; it is gone after the first GET or after its lifetime, whichever
//! comes first.

use std::collections::HashMap;
use std::time::Duration;

use rand::RngCore;
use tokio::time::Instant;

use super::resource::Resource;

/// Location prefix of generated paths
pub const ONETIME_PREFIX: &str = "/onetime/";

#[derive(Debug)]
struct OnetimeEntry {
    target: Resource,
    raw_query: Option<String>,
    expires_at: Instant,
}

/// A consumed one-time path
#[derive(Debug)]
pub struct OnetimeHit {
    pub target: Resource,
    /// Query string of the original request
    pub raw_query: Option<String>,
}

#[derive(Debug)]
pub struct OnetimeResources {
    entries: HashMap<String, OnetimeEntry>,
    lifetime: Duration,
}

impl OnetimeResources {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lifetime,
        }
    }

    pub fn set_lifetime(&mut self, lifetime: Duration) {
        self.lifetime = lifetime;
    }

    /// Wrap `target` in a new single-use path and return the path
    pub fn create(&mut self, target: Resource, raw_query: Option<String>) -> String {
        let path = loop {
            let mut raw = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut raw);
            let path = format!("{}{}", ONETIME_PREFIX, hex::encode(raw));
            if !self.entries.contains_key(&path) {
                break path;
            }
        };

        tracing::debug!(path = %path, target = %target.location, "One-time resource created");
        self.entries.insert(
            path.clone(),
            OnetimeEntry {
                target,
                raw_query,
                expires_at: Instant::now() + self.lifetime,
            },
        );
        path
    }

    /// Consume `path`. Expired entries are dropped and never served.
    pub fn take(&mut self, path: &str) -> Option<OnetimeHit> {
        let entry = self.entries.remove(path)?;
        if Instant::now() >= entry.expires_at {
            tracing::debug!(path = %path, "One-time resource expired");
            return None;
        }
        Some(OnetimeHit {
            target: entry.target,
            raw_query: entry.raw_query,
        })
    }

    /// Drop expired entries; returns how many
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| now < e.expires_at);
        before - self.entries.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::resource::ResourceOwner;

    fn target() -> Resource {
        Resource::new("/live-640x360-600kbps.webm", ResourceOwner::Server)
    }

    #[tokio::test]
    async fn test_single_use() {
        let mut onetime = OnetimeResources::new(Duration::from_secs(5));
        let path = onetime.create(target(), Some("a=b".into()));

        assert!(path.starts_with(ONETIME_PREFIX));
        assert_eq!(path.len(), ONETIME_PREFIX.len() + 32);

        let hit = onetime.take(&path).unwrap();
        assert_eq!(hit.target.location, "/live-640x360-600kbps.webm");
        assert_eq!(hit.raw_query.as_deref(), Some("a=b"));
        assert!(onetime.take(&path).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let mut onetime = OnetimeResources::new(Duration::from_secs(5));
        let early = onetime.create(target(), None);
        let late = onetime.create(target(), None);

        tokio::time::advance(Duration::from_millis(4900)).await;
        assert!(onetime.take(&early).is_some());

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(onetime.take(&late).is_none());
        assert!(onetime.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge() {
        let mut onetime = OnetimeResources::new(Duration::from_secs(5));
        onetime.create(target(), None);

        assert_eq!(onetime.purge_expired(), 0);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(onetime.purge_expired(), 1);
        assert!(onetime.is_empty());
    }
}
