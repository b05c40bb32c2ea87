//! Asset Persistence
//!
//! The optimizer never touches disk. Every object it produces (fused
//! meshes, generated materials, rewritten clips) is handed to an
//! [`AssetSink`], which owns persistence and guarantees a unique identity
//! per write.

pub mod storage;

pub use storage::{AssetStorage, MemoryAssetStore};

use uuid::Uuid;

use crate::animation::AnimationClip;
use crate::errors::Result;
use crate::resources::{Material, MeshData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Mesh,
    Material,
    Clip,
}

/// An object to persist, in the host's native representation.
#[derive(Debug, Clone)]
pub enum AssetPayload {
    Mesh(MeshData),
    Material(Material),
    Clip(AnimationClip),
}

impl AssetPayload {
    #[must_use]
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetPayload::Mesh(_) => AssetKind::Mesh,
            AssetPayload::Material(_) => AssetKind::Material,
            AssetPayload::Clip(_) => AssetKind::Clip,
        }
    }
}

/// Identity of a persisted asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetHandle {
    pub uuid: Uuid,
    /// Final, unique name chosen by the sink.
    pub name: String,
    pub kind: AssetKind,
}

/// Persistence collaborator.
pub trait AssetSink: Send + Sync {
    /// Persists `asset`. Each call yields a distinct identity, even for
    /// identical payloads and names.
    fn write_asset(&self, asset: AssetPayload, suggested_name: &str) -> Result<AssetHandle>;
}
