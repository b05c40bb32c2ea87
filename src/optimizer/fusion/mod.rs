//! Mesh fusion: turns one merge group into a single skinned surface.
//!
//! The fused surface carries the concatenated geometry of every member, a
//! bone list covering every member's skin (rigid members bind to their own
//! node), the members' blend shapes and material slots. Every animated
//! value that moved is recorded in the context's rewrite table.

pub mod blend_shapes;
pub mod bones;
pub mod toggles;

use glam::{Mat4, Vec3, Vec4};
use rustc_hash::FxHashSet;

use crate::animation::{CurveBinding, TargetKind, property};
use crate::optimizer::binding_index::AnimationBindingIndex;
use crate::optimizer::collaborators::{ToggleProperty, VariantRequest};
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::eligibility::MergeGroup;
use crate::optimizer::path_index::PathIndex;
use crate::optimizer::rewrite::{RendererMove, RewriteTarget};
use crate::resources::{BlendShape, BlendShapeFrame, MAX_UV_CHANNELS, MeshData, SubMesh, VertexWeights};
use crate::scene::{Model, Node, NodeKey, RendererKind, Surface, SurfaceKey};
use crate::settings::OptimizerSettings;
use crate::utils::join_path;

use blend_shapes::ShapeChannel;
use bones::{BoneTable, remap_weights};
use toggles::{SurfaceToggle, add_off_switch_weights, create_off_switch, register_rules, surface_material_property};

pub use toggles::{TechniqueRecord, ToggleTechnique};

const COMPONENT: &str = "MeshFusion";

/// Result of fusing one group.
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    pub surface: SurfaceKey,
    pub host_path: String,
    /// Material variants to generate, one per fused slot, for shader-toggle
    /// groups. Empty otherwise.
    pub variants: Vec<VariantRequest>,
}

/// A member taken off its node, with everything fusion needs to know about
/// it from before the structural edit.
struct Member {
    surface: Surface,
    path: String,
    technique: ToggleTechnique,
}

pub struct MeshFusionEngine<'a> {
    paths: &'a PathIndex,
    bindings: &'a AnimationBindingIndex,
    settings: &'a OptimizerSettings,
    merged: usize,
}

impl<'a> MeshFusionEngine<'a> {
    #[must_use]
    pub fn new(paths: &'a PathIndex, bindings: &'a AnimationBindingIndex, settings: &'a OptimizerSettings) -> Self {
        Self {
            paths,
            bindings,
            settings,
            merged: 0,
        }
    }

    /// Fuses a group of two or more surfaces. `nan_legal` holds the members
    /// for which the off-switch bone may replace their enabled and active
    /// curves.
    ///
    /// Returns `None` when fewer than two members could be read.
    pub fn fuse(
        &mut self,
        model: &mut Model,
        group: &MergeGroup,
        nan_legal: &FxHashSet<SurfaceKey>,
        ctx: &mut OptimizationContext,
    ) -> Option<FusionOutcome> {
        let plan: Vec<(SurfaceKey, NodeKey, String)> = group
            .members
            .iter()
            .filter_map(|&key| {
                let node = model.surfaces.get(key)?.node;
                let path = self.paths.path_of(node)?;
                Some((key, node, path.to_string()))
            })
            .collect();
        if plan.len() < 2 {
            return None;
        }

        // Host: the first member whose node is never deactivated by animation.
        let (host_node, fresh_host) = match plan.iter().find(|(_, _, path)| !self.bindings.has_active_toggle(path)) {
            Some((_, node, _)) => (*node, false),
            None => {
                let nodes: Vec<NodeKey> = plan.iter().map(|(_, node, _)| *node).collect();
                let parent = model.lowest_common_ancestor(&nodes);
                let name = format!("$$Merged{}", self.merged);
                self.merged += 1;
                (model.add_node(Node::new(&name), parent), true)
            }
        };
        let host_path = match self.paths.path_of(host_node) {
            Some(path) => path.to_string(),
            None => {
                let parent_path = model
                    .node(host_node)
                    .and_then(Node::parent)
                    .and_then(|p| self.paths.path_of(p))
                    .unwrap_or_default();
                let name = model.node(host_node).map(|n| n.name.clone()).unwrap_or_default();
                join_path(parent_path, &name)
            }
        };

        let group_default = plan
            .first()
            .and_then(|(key, node, _)| model.surfaces.get(*key).map(|s| s.enabled && model.active_in_hierarchy(*node)))
            .unwrap_or(true);

        let mut members = Vec::with_capacity(plan.len());
        for (key, node, path) in plan {
            let default_enabled = model
                .surfaces
                .get(key)
                .is_some_and(|s| s.enabled && model.active_in_hierarchy(node));
            let Some(surface) = model.detach_surface(node) else {
                continue;
            };
            let technique = self.choose_technique(
                &path,
                members.len(),
                group,
                nan_legal.contains(&key),
                default_enabled != group_default,
            );
            members.push(Member {
                surface,
                path,
                technique,
            });
        }

        // Direct members hand their active curves to a fresh host, which
        // must then start out as active as the first member was.
        if fresh_host
            && members.iter().any(|m| m.technique == ToggleTechnique::Direct)
            && let Some(first) = members.first()
        {
            let active = active_below(model, first.surface.node, host_node);
            if let Some(node) = model.node_mut(host_node) {
                node.active = active;
            }
        }

        let (fused, variants) = self.build(model, host_node, &host_path, group, &mut members, ctx);
        let (key, _) = model.attach_surface(fused);

        for member in &members {
            ctx.techniques.push(TechniqueRecord {
                surface_path: member.path.clone(),
                fused_path: host_path.clone(),
                technique: member.technique.clone(),
            });
        }
        ctx.info(
            COMPONENT,
            format!(
                "fused {} surfaces into '{host_path}'{}",
                members.len(),
                if group.shader_toggle { " (shader toggle)" } else { "" }
            ),
        );

        Some(FusionOutcome {
            surface: key,
            host_path,
            variants,
        })
    }

    /// Runs the blend shape passes on a skinned surface that merges with
    /// nothing. Returns `true` when its mesh changed.
    pub fn optimize_singleton(&mut self, model: &mut Model, key: SurfaceKey, ctx: &mut OptimizationContext) -> bool {
        let Some(surface) = model.surfaces.get(key) else {
            return false;
        };
        if surface.kind != RendererKind::Skinned || surface.mesh.blend_shapes.is_empty() {
            return false;
        }
        let Some(path) = self.paths.path_of(surface.node) else {
            return false;
        };

        let mut mesh = surface.mesh.clone();
        let mut channels: Vec<ShapeChannel> = std::mem::take(&mut mesh.blend_shapes)
            .into_iter()
            .enumerate()
            .map(|(i, shape)| {
                let source = CurveBinding::blend_shape(path, &shape.name);
                ShapeChannel::new(shape, surface.blend_shape_weight(i), source)
            })
            .collect();

        let (frozen, merged) = self.blend_shape_passes(model, &mut mesh, &mut channels);
        if frozen == 0 && merged == 0 {
            return false;
        }
        ctx.debug(
            COMPONENT,
            format!("'{path}': froze {frozen} and ratio-merged {merged} blend shapes"),
        );

        let (shapes, weights) = blend_shapes::finish(channels, path, &mut ctx.rules);
        mesh.blend_shapes = shapes;
        if let Some(surface) = model.surfaces.get_mut(key) {
            surface.mesh = mesh;
            surface.blend_shape_weights = weights;
        }
        true
    }

    // ========================================================================
    // Toggles
    // ========================================================================

    fn choose_technique(
        &self,
        path: &str,
        index: usize,
        group: &MergeGroup,
        nan_legal: bool,
        default_differs: bool,
    ) -> ToggleTechnique {
        let enabled = self.enabled_animated(path);
        let active = self.bindings.has_active_toggle(path);
        if !enabled && !active && !default_differs {
            return ToggleTechnique::None;
        }
        // Only the off-switch bone encodes a default without a curve to
        // drive it.
        if nan_legal || (default_differs && !group.shader_toggle) {
            return ToggleTechnique::NanBone {
                bone_path: String::new(),
            };
        }
        if group.shader_toggle {
            return ToggleTechnique::ConstantIndex { index };
        }
        ToggleTechnique::Direct
    }

    fn enabled_animated(&self, path: &str) -> bool {
        [TargetKind::SkinnedMeshRenderer, TargetKind::MeshRenderer]
            .into_iter()
            .any(|kind| self.bindings.is_animated(&CurveBinding::renderer_enabled(path, kind)))
    }

    // ========================================================================
    // Building
    // ========================================================================

    fn build(
        &self,
        model: &mut Model,
        host_node: NodeKey,
        host_path: &str,
        group: &MergeGroup,
        members: &mut [Member],
        ctx: &mut OptimizationContext,
    ) -> (Surface, Vec<VariantRequest>) {
        let vertex_total: usize = members.iter().map(|m| m.surface.mesh.vertex_count()).sum();
        let name = model.node(host_node).map(|n| n.name.clone()).unwrap_or_default();
        let mut mesh = MeshData::new(&name);

        let any = |f: &dyn Fn(&MeshData) -> bool| members.iter().any(|m| f(&m.surface.mesh));
        let with_normals = any(&|m: &MeshData| m.has_normals());
        let with_tangents = any(&|m: &MeshData| m.has_tangents());
        let with_colors = any(&|m: &MeshData| m.has_colors());
        let uv_used: [bool; MAX_UV_CHANNELS] = std::array::from_fn(|c| any(&|m: &MeshData| m.has_uv(c)));
        let id_channel = uv_used.iter().position(|used| !used);
        if id_channel.is_none() {
            ctx.warn(
                COMPONENT,
                format!("'{host_path}': every UV channel is in use, source surface ids are not written"),
            );
        }

        // Bone 0 is the first member's own node.
        let mut table = BoneTable::new();
        table.slot(members[0].surface.node, Mat4::IDENTITY);
        let mut weights: Vec<VertexWeights> = Vec::with_capacity(vertex_total);
        let mut channels: Vec<ShapeChannel> = Vec::new();
        let mut slots = Vec::new();
        let mut variants = Vec::new();

        for (index, member) in members.iter_mut().enumerate() {
            let source = &member.surface.mesh;
            let count = source.vertex_count();
            let offset = mesh.positions.len();

            // === Attributes ===
            mesh.positions.extend_from_slice(&source.positions);
            if with_normals {
                extend_or(&mut mesh.normals, &source.normals, count, Vec3::ZERO);
            }
            if with_tangents {
                extend_or(&mut mesh.tangents, &source.tangents, count, Vec4::new(1.0, 0.0, 0.0, 1.0));
            }
            if with_colors {
                extend_or(&mut mesh.colors, &source.colors, count, Vec4::ONE);
            }
            for (channel, used) in uv_used.iter().enumerate() {
                if *used {
                    extend_or(&mut mesh.uvs[channel], &source.uvs[channel], count, Vec4::ZERO);
                }
            }
            if let Some(channel) = id_channel {
                let id = Vec4::new(index as f32, 0.0, 0.0, 0.0);
                mesh.uvs[channel].extend(std::iter::repeat_n(id, count));
            }

            // === Skin ===
            let remapped = remap_weights(&mut table, &member.surface);
            if remapped.clamped > 0 {
                ctx.warn(
                    COMPONENT,
                    format!(
                        "'{}': {} bone references were out of range and bound to bone 0",
                        member.path, remapped.clamped
                    ),
                );
            }
            let mut member_weights = remapped.weights;

            let toggle = SurfaceToggle {
                index,
                path: &member.path,
                node: member.surface.node,
                kind: member.surface.target_kind(),
                enabled_animated: self.enabled_animated(&member.path),
                active_animated: self.bindings.has_active_toggle(&member.path),
                default_enabled: member.surface.enabled,
                default_active: model.active_in_hierarchy(member.surface.node),
            };
            member.technique = match &member.technique {
                ToggleTechnique::NanBone { .. } => {
                    let (bone, bone_path) = create_off_switch(model, &toggle);
                    let slot = table.slot(bone, Mat4::IDENTITY);
                    add_off_switch_weights(&mut member_weights, slot);
                    ToggleTechnique::NanBone { bone_path }
                }
                other => other.clone(),
            };
            weights.extend(member_weights);
            register_rules(&mut ctx.rules, &toggle, &member.technique, host_path);

            // === Renderer bindings ===
            ctx.rules.add_move(
                &member.path,
                RendererMove {
                    path: host_path.to_string(),
                    target: TargetKind::SkinnedMeshRenderer,
                },
            );
            let renamed = if group.shader_toggle {
                self.rename_material_properties(&member.path, index, host_path, ctx)
            } else {
                Vec::new()
            };

            // === Blend shapes ===
            for (k, shape) in source.blend_shapes.iter().enumerate() {
                let taken = |n: &str| channels.iter().any(|c: &ShapeChannel| c.shape.name == n);
                let fused_name = if taken(&shape.name) {
                    format!("{} ({index})", shape.name)
                } else {
                    shape.name.clone()
                };
                let frames = shape
                    .frames
                    .iter()
                    .map(|f| BlendShapeFrame {
                        weight: f.weight,
                        delta_positions: place(&f.delta_positions, offset, vertex_total),
                        delta_normals: place_optional(&f.delta_normals, offset, vertex_total),
                        delta_tangents: place_optional(&f.delta_tangents, offset, vertex_total),
                    })
                    .collect();
                channels.push(ShapeChannel::new(
                    BlendShape::new(&fused_name, frames),
                    member.surface.blend_shape_weight(k),
                    CurveBinding::blend_shape(&member.path, &shape.name),
                ));
            }

            // === Slots ===
            let slot_count = member.surface.materials.len().min(source.sub_meshes.len());
            if member.surface.materials.len() != source.sub_meshes.len() {
                ctx.warn(
                    COMPONENT,
                    format!(
                        "'{}': {} material slots for {} sub-meshes, kept {slot_count}",
                        member.path,
                        member.surface.materials.len(),
                        source.sub_meshes.len()
                    ),
                );
            }
            for j in 0..slot_count {
                let fused_slot = slots.len();
                let material = member.surface.materials[j];
                slots.push(material);
                mesh.sub_meshes.push(SubMesh::new(
                    source.sub_meshes[j]
                        .indices
                        .iter()
                        .map(|i| i + offset as u32)
                        .collect(),
                ));
                ctx.rules
                    .add_slot((member.path.clone(), j), (host_path.to_string(), fused_slot));

                if group.shader_toggle
                    && let Some(material) = material.and_then(|m| model.materials.get(m))
                {
                    variants.push(VariantRequest {
                        slot: fused_slot,
                        material: material.clone(),
                        surface_index: index,
                        toggles: constant_index_toggles(&member.technique, &toggle),
                        renamed_properties: renamed.clone(),
                    });
                }
            }
        }

        // === Blend shape passes ===
        let (frozen, merged) = self.blend_shape_passes(model, &mut mesh, &mut channels);
        if frozen + merged > 0 {
            ctx.debug(
                COMPONENT,
                format!("'{host_path}': froze {frozen} and ratio-merged {merged} blend shapes"),
            );
        }
        let (shapes, shape_weights) = blend_shapes::finish(channels, host_path, &mut ctx.rules);
        mesh.blend_shapes = shapes;

        let (bone_nodes, bind_poses) = table.into_parts();
        mesh.bind_poses = bind_poses;
        mesh.bone_weights = weights;

        let first = &members[0].surface;
        let toggled_in_mesh = members
            .iter()
            .any(|m| matches!(m.technique, ToggleTechnique::NanBone { .. } | ToggleTechnique::ConstantIndex { .. }));
        let root_bone = first.root_bone.or(Some(first.node));
        let mut fused = Surface::new(host_node, RendererKind::Skinned, mesh)
            .with_materials(slots)
            .with_bones(bone_nodes.into_iter().map(Some).collect(), root_bone);
        fused.render_state = first.render_state;
        fused.blend_shape_weights = shape_weights;
        fused.enabled = toggled_in_mesh || first.enabled;

        (fused, variants)
    }

    /// Gives every animated material property of a shader-toggle member its
    /// own per-surface name. Returns `(original, renamed)` pairs.
    fn rename_material_properties(
        &self,
        path: &str,
        index: usize,
        host_path: &str,
        ctx: &mut OptimizationContext,
    ) -> Vec<(String, String)> {
        let mut renamed: Vec<(String, String)> = Vec::new();
        for entry in self.bindings.curves_at(path) {
            let Some((name, component)) = entry.binding.material_property() else {
                continue;
            };
            let new_name = surface_material_property(name, index);
            ctx.rules.add_rule(
                &entry.binding,
                RewriteTarget::identity(CurveBinding::new(
                    host_path,
                    &property::material(&new_name, component),
                    TargetKind::SkinnedMeshRenderer,
                )),
            );
            if !renamed.iter().any(|(original, _)| original == name) {
                renamed.push((name.to_string(), new_name));
            }
        }
        renamed
    }

    fn blend_shape_passes(&self, model: &Model, mesh: &mut MeshData, channels: &mut Vec<ShapeChannel>) -> (usize, usize) {
        let frozen = if self.settings.freeze_static_blend_shapes {
            blend_shapes::freeze_unanimated(mesh, channels, self.bindings)
        } else {
            0
        };
        let merged = if self.settings.merge_blend_shapes_by_ratio {
            blend_shapes::merge_by_ratio(model, self.bindings, channels, mesh.vertex_count())
        } else {
            0
        };
        (frozen, merged)
    }
}

/// Whether `node` and its ancestors up to the parent of `host` are active.
fn active_below(model: &Model, node: NodeKey, host: NodeKey) -> bool {
    let stop = model.node(host).and_then(Node::parent);
    std::iter::once(node)
        .chain(model.ancestors(node))
        .take_while(|&k| Some(k) != stop)
        .all(|k| model.node(k).is_some_and(|n| n.active))
}

fn constant_index_toggles(technique: &ToggleTechnique, toggle: &SurfaceToggle<'_>) -> Vec<ToggleProperty> {
    if !matches!(technique, ToggleTechnique::ConstantIndex { .. }) {
        return Vec::new();
    }
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    vec![
        ToggleProperty {
            name: toggles::enabled_property(toggle.index),
            default_value: flag(toggle.default_enabled),
        },
        ToggleProperty {
            name: toggles::active_property(toggle.index),
            default_value: flag(toggle.default_active),
        },
    ]
}

/// Appends `source`, or `count` copies of `default` when the source lacks
/// the attribute.
fn extend_or<T: Copy>(target: &mut Vec<T>, source: &[T], count: usize, default: T) {
    if source.len() == count {
        target.extend_from_slice(source);
    } else {
        target.extend(std::iter::repeat_n(default, count));
    }
}

fn place(deltas: &[Vec3], offset: usize, total: usize) -> Vec<Vec3> {
    let mut out = vec![Vec3::ZERO; total];
    for (slot, delta) in out[offset..].iter_mut().zip(deltas) {
        *slot = *delta;
    }
    out
}

fn place_optional(deltas: &[Vec3], offset: usize, total: usize) -> Vec<Vec3> {
    if deltas.is_empty() {
        Vec::new()
    } else {
        place(deltas, offset, total)
    }
}
