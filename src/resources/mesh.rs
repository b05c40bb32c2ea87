use glam::{Mat4, Vec3, Vec4};
use smallvec::SmallVec;

use crate::resources::blend_shape::BlendShape;

/// Number of UV channels a mesh may carry.
pub const MAX_UV_CHANNELS: usize = 8;

/// A single skinning influence: bone index into the owning surface's bone
/// list plus its weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneWeight {
    pub bone: u32,
    pub weight: f32,
}

impl BoneWeight {
    #[must_use]
    pub const fn new(bone: u32, weight: f32) -> Self {
        Self { bone, weight }
    }
}

/// Per-vertex skinning influences. Four fit inline, which covers the common
/// case without a heap allocation per vertex.
pub type VertexWeights = SmallVec<[BoneWeight; 4]>;

/// An index list drawn with one material slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMesh {
    pub indices: Vec<u32>,
}

impl SubMesh {
    #[must_use]
    pub fn new(indices: Vec<u32>) -> Self {
        Self { indices }
    }
}

/// CPU-side mesh data of a surface.
///
/// Optional attributes are stored as empty vectors when absent. When
/// present, every per-vertex attribute has exactly
/// [`vertex_count`](Self::vertex_count) entries.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub name: String,

    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub uvs: [Vec<Vec4>; MAX_UV_CHANNELS],
    pub colors: Vec<Vec4>,

    // === Skinning ===
    pub bone_weights: Vec<VertexWeights>,
    /// Inverse bind matrices, one per entry of the surface's bone list.
    pub bind_poses: Vec<Mat4>,

    pub sub_meshes: Vec<SubMesh>,
    pub blend_shapes: Vec<BlendShape>,
}

impl MeshData {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    #[must_use]
    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn has_tangents(&self) -> bool {
        !self.tangents.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn has_uv(&self, channel: usize) -> bool {
        self.uvs.get(channel).is_some_and(|uv| !uv.is_empty())
    }

    #[inline]
    #[must_use]
    pub fn has_skinning(&self) -> bool {
        !self.bone_weights.is_empty()
    }

    /// Index of the named blend shape, if present.
    #[must_use]
    pub fn blend_shape_index(&self, name: &str) -> Option<usize> {
        self.blend_shapes.iter().position(|shape| shape.name == name)
    }
}
