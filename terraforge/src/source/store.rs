//! Persistent tile stores.
//!
//! A store holds raw (encoded) tile bytes keyed by the exact
//! `(zoom, x, y, source)` tuple. Lookups are checked before the network, and
//! in store-only mode they are the only way a tile can load.
//!
//! # Disk layout
//!
//! ```text
//! <root>/<first 16 hex chars of sha256(source)>/<z>/<x>/<y>.tile
//! ```
//!
//! Hashing the source keeps arbitrary URL templates out of path names while
//! separating sources from each other.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::trace;

use super::{BoxFuture, SourceError};
use crate::tile::{SourceId, TileKey};

/// Storage backend for raw tile bytes.
pub trait TileStore: Send + Sync {
    /// Returns the stored bytes for a tile, or `None` if absent.
    fn get<'a>(&'a self, key: &'a TileKey) -> BoxFuture<'a, Result<Option<Bytes>, SourceError>>;

    /// Stores the bytes for a tile, replacing any previous value.
    fn put<'a>(&'a self, key: &'a TileKey, data: Bytes) -> BoxFuture<'a, Result<(), SourceError>>;
}

/// Directory name used for a source inside a [`DiskTileStore`].
pub fn source_dir_name(source: &SourceId) -> String {
    let digest = Sha256::digest(source.as_str().as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

/// Tile store backed by a directory tree.
#[derive(Debug, Clone)]
pub struct DiskTileStore {
    root: PathBuf,
}

impl DiskTileStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path a tile is stored at.
    pub fn tile_path(&self, key: &TileKey) -> PathBuf {
        self.root
            .join(source_dir_name(&key.source))
            .join(key.zoom.to_string())
            .join(key.x.to_string())
            .join(format!("{}.tile", key.y))
    }
}

impl TileStore for DiskTileStore {
    fn get<'a>(&'a self, key: &'a TileKey) -> BoxFuture<'a, Result<Option<Bytes>, SourceError>> {
        Box::pin(async move {
            let path = self.tile_path(key);
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    trace!(tile = %key, path = %path.display(), "Store hit");
                    Ok(Some(Bytes::from(data)))
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(SourceError::Store(format!("{}: {}", path.display(), e))),
            }
        })
    }

    fn put<'a>(&'a self, key: &'a TileKey, data: Bytes) -> BoxFuture<'a, Result<(), SourceError>> {
        Box::pin(async move {
            let path = self.tile_path(key);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SourceError::Store(format!("{}: {}", parent.display(), e)))?;
            }

            // Readers must never observe a partially written tile
            let tmp = path.with_extension("tile.part");
            tokio::fs::write(&tmp, &data)
                .await
                .map_err(|e| SourceError::Store(format!("{}: {}", tmp.display(), e)))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|e| SourceError::Store(format!("{}: {}", path.display(), e)))
        })
    }
}

/// In-memory tile store.
///
/// Useful for tests and for hosts that pre-seed tiles without touching disk.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    tiles: RwLock<HashMap<TileKey, Bytes>>,
}

impl MemoryTileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tile synchronously.
    pub fn insert(&self, key: TileKey, data: impl Into<Bytes>) {
        self.tiles.write().insert(key, data.into());
    }

    /// Number of stored tiles.
    pub fn len(&self) -> usize {
        self.tiles.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tiles.read().is_empty()
    }
}

impl TileStore for MemoryTileStore {
    fn get<'a>(&'a self, key: &'a TileKey) -> BoxFuture<'a, Result<Option<Bytes>, SourceError>> {
        let found = self.tiles.read().get(key).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn put<'a>(&'a self, key: &'a TileKey, data: Bytes) -> BoxFuture<'a, Result<(), SourceError>> {
        self.tiles.write().insert(key.clone(), data);
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(zoom: u8, x: i32, y: i32) -> TileKey {
        TileKey::new(zoom, x, y, SourceId::new("https://tiles/{z}/{x}/{y}.png", None))
    }

    #[test]
    fn test_source_dir_name_is_stable_and_short() {
        let a = SourceId::new("https://tiles/{z}/{x}/{y}.png", None);
        let b = SourceId::new("https://other/{z}/{x}/{y}.png", None);

        assert_eq!(source_dir_name(&a), source_dir_name(&a.clone()));
        assert_ne!(source_dir_name(&a), source_dir_name(&b));
        assert_eq!(source_dir_name(&a).len(), 16);
    }

    #[test]
    fn test_tile_path_layout() {
        let store = DiskTileStore::new("/data/tiles");
        let path = store.tile_path(&key(12, 2200, 1343));

        assert!(path.starts_with("/data/tiles"));
        assert!(path.ends_with("12/2200/1343.tile"));
    }

    #[tokio::test]
    async fn test_disk_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = DiskTileStore::new(dir.path());

        assert!(store.get(&key(3, 1, 2)).await.unwrap().is_none());

        store
            .put(&key(3, 1, 2), Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();

        let data = store.get(&key(3, 1, 2)).await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"png-bytes"[..]));
        assert!(!store.tile_path(&key(3, 1, 2)).with_extension("tile.part").exists());
    }

    #[tokio::test]
    async fn test_disk_store_keys_by_source() {
        let dir = TempDir::new().unwrap();
        let store = DiskTileStore::new(dir.path());
        let other = TileKey::new(3, 1, 2, SourceId::new("https://other/{z}/{x}/{y}", None));

        store.put(&key(3, 1, 2), Bytes::from_static(b"a")).await.unwrap();
        assert!(store.get(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryTileStore::new();
        store.insert(key(1, 0, 0), Bytes::from_static(b"x"));

        assert_eq!(store.len(), 1);
        assert!(store.get(&key(1, 0, 0)).await.unwrap().is_some());
        assert!(store.get(&key(1, 1, 0)).await.unwrap().is_none());
    }
}
