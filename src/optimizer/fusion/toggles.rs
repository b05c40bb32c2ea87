//! Keeping fused source surfaces independently toggleable.
//!
//! Two techniques replace a source surface's own enabled/active curves:
//! - an off-switch bone: every vertex of the surface gets a tiny weight on
//!   an extra bone whose scale is NaN while the surface is off, so skinning
//!   degenerates the whole surface;
//! - a constant index: the fused materials read a per-surface float
//!   property and discard the surface while it is zero.
//!
//! When the group's curves are congruent the toggles can also drive the
//! fused surface directly: enabled curves go to the fused renderer, active
//! curves to the host node. Visibility stays `enabled && active`.

use glam::Vec3;

use crate::animation::{CurveBinding, TargetKind, property};
use crate::optimizer::rewrite::{RewriteTable, RewriteTarget, ValueMap};
use crate::resources::{BoneWeight, VertexWeights};
use crate::scene::{Model, Node, NodeKey, Transform};
use crate::utils::join_path;

/// Weight given to the off-switch bone.
pub const OFF_SWITCH_WEIGHT: f32 = 1.0e-6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleTechnique {
    /// The surface needs no toggle of its own.
    None,
    /// Off-switch bone at `bone_path`.
    NanBone { bone_path: String },
    /// Per-surface material constant, indexed by the surface's position in
    /// its group.
    ConstantIndex { index: usize },
    /// Enabled curves drive the fused renderer, active curves the host node.
    Direct,
}

/// Technique chosen for one source surface, for the material codegen and
/// for late consumers of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechniqueRecord {
    pub surface_path: String,
    pub fused_path: String,
    pub technique: ToggleTechnique,
}

#[must_use]
pub fn enabled_property(index: usize) -> String {
    format!("_RigFuseSurfaceEnabled{index}")
}

#[must_use]
pub fn active_property(index: usize) -> String {
    format!("_RigFuseSurfaceActive{index}")
}

/// Per-surface name of an animated material property under shader toggle.
#[must_use]
pub fn surface_material_property(name: &str, index: usize) -> String {
    format!("{name}_RigFuse{index}")
}

/// Toggle state of one source surface.
#[derive(Debug, Clone)]
pub struct SurfaceToggle<'p> {
    pub index: usize,
    pub path: &'p str,
    pub node: NodeKey,
    pub kind: TargetKind,
    pub enabled_animated: bool,
    pub active_animated: bool,
    pub default_enabled: bool,
    pub default_active: bool,
}

/// Adds the off-switch bone under the surface's node. Its default scale
/// encodes the surface's design-time state.
pub fn create_off_switch(model: &mut Model, toggle: &SurfaceToggle<'_>) -> (NodeKey, String) {
    let name = format!("$$nan_off_{}", toggle.index);
    let on = |b: bool| if b { 1.0 } else { f32::NAN };
    let scale = Vec3::new(on(toggle.default_enabled), on(toggle.default_active), 1.0);
    let node = Node::new(&name).with_transform(Transform::new().with_scale(scale));
    let key = model.add_node(node, toggle.node);
    (key, join_path(toggle.path, &name))
}

/// Gives every vertex a tiny weight on `bone`, rescaling the others so the
/// weights still sum to their original total.
pub fn add_off_switch_weights(weights: &mut [VertexWeights], bone: u32) {
    for vertex in weights {
        for w in vertex.iter_mut() {
            w.weight *= 1.0 - OFF_SWITCH_WEIGHT;
        }
        vertex.push(BoneWeight::new(bone, OFF_SWITCH_WEIGHT));
    }
}

/// Registers the rules moving the surface's enabled and active curves onto
/// `technique`. Active curves are fanned out: the node keeps its own curve
/// since it may still hold other children.
pub fn register_rules(table: &mut RewriteTable, toggle: &SurfaceToggle<'_>, technique: &ToggleTechnique, host_path: &str) {
    let enabled = CurveBinding::renderer_enabled(toggle.path, toggle.kind);
    let active = CurveBinding::active(toggle.path);

    let (enabled_target, active_target) = match technique {
        ToggleTechnique::None => return,
        ToggleTechnique::NanBone { bone_path } => (
            RewriteTarget {
                binding: CurveBinding::new(bone_path, property::LOCAL_SCALE[0], TargetKind::Transform),
                map: ValueMap::NanScale,
            },
            RewriteTarget {
                binding: CurveBinding::new(bone_path, property::LOCAL_SCALE[1], TargetKind::Transform),
                map: ValueMap::NanScale,
            },
        ),
        ToggleTechnique::ConstantIndex { index } => (
            RewriteTarget::identity(CurveBinding::new(
                host_path,
                &property::material(&enabled_property(*index), ""),
                TargetKind::SkinnedMeshRenderer,
            )),
            RewriteTarget::identity(CurveBinding::new(
                host_path,
                &property::material(&active_property(*index), ""),
                TargetKind::SkinnedMeshRenderer,
            )),
        ),
        // Members with an active toggle only share a group when every member
        // has one, so the host is then a fresh node owned by the fused surface.
        ToggleTechnique::Direct => (
            RewriteTarget::identity(CurveBinding::renderer_enabled(
                host_path,
                TargetKind::SkinnedMeshRenderer,
            )),
            RewriteTarget::identity(CurveBinding::active(host_path)),
        ),
    };

    if toggle.enabled_animated {
        table.add_rule(&enabled, enabled_target);
    }
    if toggle.active_animated {
        table.keep(&active);
        table.add_rule(&active, active_target);
    }
}
