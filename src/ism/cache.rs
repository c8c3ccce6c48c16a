//! Process-wide asset cache
//!
//! Assets are loaded on first access and kept for the life of the cache. The
//! cache is owned by the server actor, so lookups need no lock. Failed loads
//! are not cached; a later request retries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::asset::Asset;
use crate::error::Result;

#[derive(Debug)]
pub struct AssetCache {
    root: PathBuf,
    assets: HashMap<String, Arc<Asset>>,
}

impl AssetCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            assets: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Point the cache at a new root, dropping everything loaded so far
    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if root != self.root {
            self.root = root;
            self.assets.clear();
        }
    }

    /// The asset `key`, loading it on first access
    pub fn get(&mut self, key: &str) -> Result<Arc<Asset>> {
        if let Some(asset) = self.assets.get(key) {
            return Ok(asset.clone());
        }
        let asset = match Asset::load(&self.root, key) {
            Ok(asset) => Arc::new(asset),
            Err(e) => {
                tracing::debug!(asset = key, error = %e, "Asset load failed");
                return Err(e);
            }
        };
        self.assets.insert(key.to_string(), asset.clone());
        Ok(asset)
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        self.assets.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
