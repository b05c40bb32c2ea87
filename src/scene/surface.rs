use bitflags::bitflags;

use crate::animation::TargetKind;
use crate::resources::MeshData;
use crate::scene::{MaterialKey, NodeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererKind {
    /// Deformable surface driven by bones and blend shapes.
    Skinned,
    /// Rigid surface drawn with its node's transform.
    Static,
}

impl RendererKind {
    #[must_use]
    pub fn target_kind(self) -> TargetKind {
        match self {
            RendererKind::Skinned => TargetKind::SkinnedMeshRenderer,
            RendererKind::Static => TargetKind::MeshRenderer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowCastingMode {
    Off,
    #[default]
    On,
    TwoSided,
    ShadowsOnly,
}

/// Render state that must be equal for two surfaces to share a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub layer: u32,
    pub shadow_casting: ShadowCastingMode,
    pub receive_shadows: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            layer: 0,
            shadow_casting: ShadowCastingMode::On,
            receive_shadows: true,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceFlags: u32 {
        /// A particle system samples this surface by its own index.
        const PARTICLE_SHAPE_SOURCE = 1 << 0;
    }
}

/// A drawable attached to a node.
#[derive(Debug, Clone)]
pub struct Surface {
    pub node: NodeKey,
    pub kind: RendererKind,
    pub mesh: MeshData,
    /// Material slots; slot `i` draws sub-mesh `i`.
    pub materials: Vec<Option<MaterialKey>>,
    pub enabled: bool,
    pub render_state: RenderState,

    // === Skinning ===
    /// Bone nodes, indexed by the mesh's bone weights and bind poses. An
    /// entry is `None` when the bone node no longer exists.
    pub bones: Vec<Option<NodeKey>>,
    pub root_bone: Option<NodeKey>,

    /// Default weight of every blend shape, indexed like
    /// `mesh.blend_shapes`.
    pub blend_shape_weights: Vec<f32>,

    pub flags: SurfaceFlags,
}

impl Surface {
    #[must_use]
    pub fn new(node: NodeKey, kind: RendererKind, mesh: MeshData) -> Self {
        let weights = vec![0.0; mesh.blend_shapes.len()];
        Self {
            node,
            kind,
            mesh,
            materials: Vec::new(),
            enabled: true,
            render_state: RenderState::default(),
            bones: Vec::new(),
            root_bone: None,
            blend_shape_weights: weights,
            flags: SurfaceFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_materials(mut self, materials: Vec<Option<MaterialKey>>) -> Self {
        self.materials = materials;
        self
    }

    #[must_use]
    pub fn with_bones(mut self, bones: Vec<Option<NodeKey>>, root_bone: Option<NodeKey>) -> Self {
        self.bones = bones;
        self.root_bone = root_bone;
        self
    }

    #[inline]
    #[must_use]
    pub fn target_kind(&self) -> TargetKind {
        self.kind.target_kind()
    }

    /// Default weight of a blend shape; missing entries read as zero.
    #[must_use]
    pub fn blend_shape_weight(&self, index: usize) -> f32 {
        self.blend_shape_weights.get(index).copied().unwrap_or(0.0)
    }
}
