use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{Key, SlotMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::assets::{AssetHandle, AssetPayload, AssetSink};
use crate::errors::Result;

// Internal data structure, protected by a lock.
struct StorageInner<H: Key, T> {
    map: SlotMap<H, Arc<T>>,
    lookup: FxHashMap<Uuid, H>,
    names: FxHashSet<String>,
}

impl<H: Key, T> Default for StorageInner<H, T> {
    fn default() -> Self {
        Self {
            map: SlotMap::default(),
            lookup: FxHashMap::default(),
            names: FxHashSet::default(),
        }
    }
}

// Thread-safe container exposed to external consumers.
pub struct AssetStorage<H: Key, T> {
    inner: RwLock<StorageInner<H, T>>,
}

impl<H: Key, T> Default for AssetStorage<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Key, T> AssetStorage<H, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::default(),
        }
    }

    /// [Write] Adds a resource under a fresh UUID and a name that no other
    /// stored asset uses. Returns the handle, the UUID, and the final name.
    pub fn add_unique(&self, suggested_name: &str, asset: impl Into<T>) -> (H, Uuid, String) {
        let mut guard = self.inner.write();

        let mut name = suggested_name.to_string();
        let mut counter = 1;
        while guard.names.contains(&name) {
            name = format!("{suggested_name} {counter}");
            counter += 1;
        }
        guard.names.insert(name.clone());

        let uuid = Uuid::new_v4();
        let handle = guard.map.insert(Arc::new(asset.into()));
        guard.lookup.insert(uuid, handle);
        (handle, uuid, name)
    }

    /// [Read] Gets a single resource by its UUID.
    pub fn get_by_uuid(&self, uuid: &Uuid) -> Option<Arc<T>> {
        let guard = self.inner.read();
        let handle = guard.lookup.get(uuid)?;
        guard.map.get(*handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

slotmap::new_key_type! {
    pub struct StoredAssetKey;
}

/// An [`AssetSink`] that keeps every written asset in memory.
///
/// Useful for tests and for hosts that persist the outputs themselves after
/// the run returns.
#[derive(Default)]
pub struct MemoryAssetStore {
    storage: AssetStorage<StoredAssetKey, AssetPayload>,
}

impl MemoryAssetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payload written under `handle`.
    pub fn get(&self, handle: &AssetHandle) -> Option<Arc<AssetPayload>> {
        self.storage.get_by_uuid(&handle.uuid)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl AssetSink for MemoryAssetStore {
    fn write_asset(&self, asset: AssetPayload, suggested_name: &str) -> Result<AssetHandle> {
        let kind = asset.kind();
        let (_, uuid, name) = self.storage.add_unique(suggested_name, asset);
        log::debug!("[AssetSink] wrote {kind:?} '{name}'");
        Ok(AssetHandle { uuid, name, kind })
    }
}
