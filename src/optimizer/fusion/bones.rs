use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::resources::{BoneWeight, VertexWeights};
use crate::scene::{NodeKey, RendererKind, Surface};

/// Fused bone list.
///
/// A slot is keyed by `(bone node, bind pose bits)`: two source bones share
/// a fused slot only when both the node and the bind pose are bit-identical.
#[derive(Debug, Default)]
pub struct BoneTable {
    slots: FxHashMap<(NodeKey, [u32; 16]), u32>,
    nodes: Vec<NodeKey>,
    bind_poses: Vec<Mat4>,
}

#[inline]
fn bind_pose_bits(bind_pose: Mat4) -> [u32; 16] {
    bytemuck::cast(bind_pose.to_cols_array())
}

impl BoneTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fused index of `(node, bind_pose)`, allocating a new slot on first use.
    pub fn slot(&mut self, node: NodeKey, bind_pose: Mat4) -> u32 {
        let key = (node, bind_pose_bits(bind_pose));
        if let Some(&index) = self.slots.get(&key) {
            return index;
        }
        let index = self.nodes.len() as u32;
        self.slots.insert(key, index);
        self.nodes.push(node);
        self.bind_poses.push(bind_pose);
        index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `(bones, bind poses)` in slot order.
    #[must_use]
    pub fn into_parts(self) -> (Vec<NodeKey>, Vec<Mat4>) {
        (self.nodes, self.bind_poses)
    }
}

/// Weights remapped into a [`BoneTable`], plus the number of bone
/// references that had to be clamped.
pub struct RemappedWeights {
    pub weights: Vec<VertexWeights>,
    pub clamped: usize,
}

/// Re-expresses every vertex of `surface` against the fused bone list.
///
/// Rigid vertices (static surfaces, or skinned vertices without weights)
/// bind to the surface's own node with an identity bind pose, which draws
/// them exactly where their node puts them. Bone indices outside the bone
/// or bind pose arrays fall back to index 0.
pub fn remap_weights(table: &mut BoneTable, surface: &Surface) -> RemappedWeights {
    let mesh = &surface.mesh;
    let skinned = surface.kind == RendererKind::Skinned && mesh.has_skinning();
    let mut clamped = 0;

    let weights: Vec<VertexWeights> = (0..mesh.vertex_count())
        .map(|v| {
            let source = if skinned { mesh.bone_weights.get(v) } else { None };
            match source {
                Some(source) if !source.is_empty() => source
                    .iter()
                    .map(|w| {
                        let mut bone = w.bone as usize;
                        if bone >= surface.bones.len() || bone >= mesh.bind_poses.len() {
                            clamped += 1;
                            bone = 0;
                        }
                        let node = surface.bones.get(bone).copied().flatten().unwrap_or(surface.node);
                        let bind_pose = mesh.bind_poses.get(bone).copied().unwrap_or(Mat4::IDENTITY);
                        BoneWeight::new(table.slot(node, bind_pose), w.weight)
                    })
                    .collect(),
                _ => {
                    let mut rigid = VertexWeights::new();
                    rigid.push(BoneWeight::new(table.slot(surface.node, Mat4::IDENTITY), 1.0));
                    rigid
                }
            }
        })
        .collect();

    RemappedWeights { weights, clamped }
}
