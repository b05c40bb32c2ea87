//! Merge eligibility: which surfaces may be fused without changing any
//! animated behaviour.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::animation::CurveBinding;
use crate::optimizer::binding_index::{AnimationBindingIndex, CurveEntry};
use crate::optimizer::collaborators::MaterialAnalyzer;
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::path_index::PathIndex;
use crate::scene::{ClipKey, MaterialKey, Model, NodeFlags, RendererKind, Surface, SurfaceFlags, SurfaceKey};
use crate::settings::OptimizerSettings;

const COMPONENT: &str = "MergeEligibility";

pub type SwapMaterials = FxHashMap<SurfaceKey, SmallVec<[MaterialKey; 4]>>;

/// Outcome of `CanJoin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinVerdict {
    /// Animation is congruent; geometry-only merge.
    Exact,
    /// Animation differs; legal with per-surface material variants.
    ShaderToggle,
    Reject(String),
}

/// Surfaces decided to be fused into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeGroup {
    /// Members in discovery order.
    pub members: Vec<SurfaceKey>,
    /// Members need per-surface material variants.
    pub shader_toggle: bool,
}

impl MergeGroup {
    #[must_use]
    pub fn new(first: SurfaceKey) -> Self {
        Self {
            members: vec![first],
            shader_toggle: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// Materials each surface can show: its slots plus every material swapped
/// in by an object curve at its path.
#[must_use]
pub fn collect_swap_materials(model: &Model, paths: &PathIndex, bindings: &AnimationBindingIndex) -> SwapMaterials {
    let mut out = SwapMaterials::default();
    for (key, surface) in &model.surfaces {
        let mut set: SmallVec<[MaterialKey; 4]> = surface.materials.iter().flatten().copied().collect();
        if let Some(path) = paths.path_of(surface.node) {
            for entry in bindings.curves_at(path) {
                if entry.binding.material_slot_index().is_none() {
                    continue;
                }
                if let Some(curve) = entry.object_curve(model) {
                    set.extend(curve.keys.iter().filter_map(|k| k.value));
                }
            }
        }
        let mut seen = rustc_hash::FxHashSet::default();
        set.retain(|m| seen.insert(*m));
        out.insert(key, set);
    }
    out
}

pub struct MergeEligibilityEngine<'a> {
    model: &'a Model,
    paths: &'a PathIndex,
    bindings: &'a AnimationBindingIndex,
    settings: &'a OptimizerSettings,
    analyzer: &'a dyn MaterialAnalyzer,
    swap_materials: &'a SwapMaterials,
    congruence: FxHashMap<(SurfaceKey, SurfaceKey), bool>,
}

impl<'a> MergeEligibilityEngine<'a> {
    #[must_use]
    pub fn new(
        model: &'a Model,
        paths: &'a PathIndex,
        bindings: &'a AnimationBindingIndex,
        settings: &'a OptimizerSettings,
        analyzer: &'a dyn MaterialAnalyzer,
        swap_materials: &'a SwapMaterials,
    ) -> Self {
        Self {
            model,
            paths,
            bindings,
            settings,
            analyzer,
            swap_materials,
            congruence: FxHashMap::default(),
        }
    }

    // ========================================================================
    // Candidates
    // ========================================================================

    /// Mergeable surfaces in discovery order.
    pub fn candidates(&self, ctx: &mut OptimizationContext) -> Vec<SurfaceKey> {
        if !self.settings.merge_surfaces {
            ctx.info(COMPONENT, "surface merging is disabled");
            return Vec::new();
        }

        let mut out = Vec::new();
        for key in self.model.surfaces_in_discovery_order() {
            let surface = &self.model.surfaces[key];
            let Some(path) = self.paths.path_of(surface.node) else {
                ctx.debug(COMPONENT, format!("surface {key:?} has no unique path, left unmerged"));
                continue;
            };
            let excluded = self
                .model
                .node(surface.node)
                .is_some_and(|n| n.flags.contains(NodeFlags::EXCLUDED));
            if excluded || self.settings.is_path_excluded(path) {
                ctx.debug(COMPONENT, format!("'{path}' is excluded"));
                continue;
            }
            if surface.mesh.sub_meshes.is_empty() {
                ctx.debug(COMPONENT, format!("'{path}' has no sub-meshes"));
                continue;
            }
            if surface.kind == RendererKind::Static && !self.settings.merge_static_surfaces {
                ctx.debug(COMPONENT, format!("'{path}' is static and static merging is disabled"));
                continue;
            }
            if surface.flags.contains(SurfaceFlags::PARTICLE_SHAPE_SOURCE) {
                ctx.debug(COMPONENT, format!("'{path}' is sampled by a particle system"));
                continue;
            }
            let unsupported = self
                .materials(key)
                .iter()
                .filter_map(|m| self.model.materials.get(*m))
                .find(|m| !self.analyzer.is_material_mergeable(m));
            if let Some(material) = unsupported {
                ctx.warn(
                    COMPONENT,
                    format!("'{path}' uses unsupported material '{}', left unmerged", material.name),
                );
                continue;
            }
            out.push(key);
        }
        out
    }

    // ========================================================================
    // Grouping
    // ========================================================================

    /// Greedy first-fit: each candidate joins the first compatible group,
    /// else starts a new one.
    pub fn partition(&mut self, candidates: &[SurfaceKey], ctx: &mut OptimizationContext) -> Vec<MergeGroup> {
        let mut groups: Vec<MergeGroup> = Vec::new();
        'candidates: for &candidate in candidates {
            for (index, group) in groups.iter_mut().enumerate() {
                match self.can_join(group, candidate) {
                    JoinVerdict::Exact => {
                        group.members.push(candidate);
                        continue 'candidates;
                    }
                    JoinVerdict::ShaderToggle => {
                        group.members.push(candidate);
                        group.shader_toggle = true;
                        continue 'candidates;
                    }
                    JoinVerdict::Reject(reason) => {
                        ctx.debug(
                            COMPONENT,
                            format!("'{}' cannot join group {index}: {reason}", self.path(candidate)),
                        );
                    }
                }
            }
            groups.push(MergeGroup::new(candidate));
        }
        groups
    }

    /// Whether `candidate` may join `group`, and how.
    pub fn can_join(&mut self, group: &MergeGroup, candidate: SurfaceKey) -> JoinVerdict {
        let mut toggle = group.shader_toggle;
        for &member in &group.members {
            match self.can_join_pair(member, candidate) {
                JoinVerdict::Exact => {}
                JoinVerdict::ShaderToggle => toggle = true,
                reject @ JoinVerdict::Reject(_) => return reject,
            }
        }
        if !toggle {
            return JoinVerdict::Exact;
        }
        let all_support = group
            .members
            .iter()
            .chain(std::iter::once(&candidate))
            .all(|s| self.supports_shader_toggle(*s));
        if all_support {
            JoinVerdict::ShaderToggle
        } else {
            JoinVerdict::Reject("a group member does not support a mesh index".to_string())
        }
    }

    /// Pairwise join check, most specific disqualifier first.
    pub fn can_join_pair(&mut self, a: SurfaceKey, b: SurfaceKey) -> JoinVerdict {
        let (Some(sa), Some(sb)) = (self.model.surfaces.get(a), self.model.surfaces.get(b)) else {
            return JoinVerdict::Reject("surface no longer exists".to_string());
        };

        if sa.render_state != sb.render_state {
            return JoinVerdict::Reject("render state differs".to_string());
        }

        let sign = |s: &Surface| {
            let root = s.root_bone.unwrap_or(s.node);
            self.model.lossy_scale(root).is_negative_bitmask()
        };
        if sign(sa) != sign(sb) {
            return JoinVerdict::Reject("root bone scale sign differs".to_string());
        }

        if !self.toggle_scope_contains(sa, sb) || !self.toggle_scope_contains(sb, sa) {
            return JoinVerdict::Reject("an animated ancestor toggle does not enclose both surfaces".to_string());
        }

        if self.settings.require_same_default_enabled && self.default_enabled(sa) != self.default_enabled(sb) {
            return JoinVerdict::Reject("default enabled state differs".to_string());
        }

        if self.congruent(a, b) {
            return JoinVerdict::Exact;
        }

        if !self.settings.allow_shader_toggle {
            return JoinVerdict::Reject("animation differs and shader toggle is disabled".to_string());
        }
        if self.supports_shader_toggle(a) && self.supports_shader_toggle(b) {
            JoinVerdict::ShaderToggle
        } else {
            JoinVerdict::Reject("animation differs and a material does not support a mesh index".to_string())
        }
    }

    // ========================================================================
    // Congruence
    // ========================================================================

    /// Whether `a` and `b` animate identically. Symmetric and memoized per pair.
    pub fn congruent(&mut self, a: SurfaceKey, b: SurfaceKey) -> bool {
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(&known) = self.congruence.get(&key) {
            return known;
        }
        let result = self.compute_congruence(key.0, key.1);
        self.congruence.insert(key, result);
        result
    }

    fn compute_congruence(&self, a: SurfaceKey, b: SurfaceKey) -> bool {
        let relevant_a = self.relevant_curves(a);
        let relevant_b = self.relevant_curves(b);

        let clips = |curves: &[&CurveEntry]| curves.iter().map(|e| e.clip).collect::<BTreeSet<ClipKey>>();
        if clips(relevant_a.as_slice()) != clips(relevant_b.as_slice()) {
            return false;
        }
        self.mirrored_in(&relevant_a, b) && self.mirrored_in(&relevant_b, a)
    }

    /// Every curve of `curves` has a structurally identical twin at the
    /// path of `other`, in the same clip.
    fn mirrored_in(&self, curves: &[&CurveEntry], other: SurfaceKey) -> bool {
        let Some(surface) = self.model.surfaces.get(other) else {
            return false;
        };
        let Some(path) = self.paths.path_of(surface.node) else {
            return false;
        };

        curves.iter().all(|entry| {
            let mut mirrored = entry.binding.with_path(path);
            if mirrored.target.is_renderer() {
                mirrored = mirrored.with_target(surface.target_kind());
            }
            let Some(twin) = self.bindings.curves_of(&mirrored).find(|e| e.clip == entry.clip) else {
                return false;
            };
            match (entry.float_track(self.model), twin.float_track(self.model)) {
                (Some(x), Some(y)) => x.structurally_equal(y),
                (None, None) => match (entry.object_curve(self.model), twin.object_curve(self.model)) {
                    (Some(x), Some(y)) => x.structurally_equal(y),
                    _ => false,
                },
                _ => false,
            }
        })
    }

    /// Curves at the surface's own path that congruence must compare.
    #[must_use]
    pub fn relevant_curves(&self, key: SurfaceKey) -> Vec<&'a CurveEntry> {
        let Some(surface) = self.model.surfaces.get(key) else {
            return Vec::new();
        };
        let Some(path) = self.paths.path_of(surface.node) else {
            return Vec::new();
        };
        let nan = self.nanimation_legal(key);
        self.bindings
            .curves_at(path)
            .iter()
            .filter(|e| self.is_relevant(key, surface, &e.binding, nan))
            .collect()
    }

    fn is_relevant(&self, key: SurfaceKey, surface: &Surface, binding: &CurveBinding, nan: bool) -> bool {
        if binding.is_active_toggle() {
            return !nan;
        }
        if binding.target != surface.target_kind() || binding.blend_shape_name().is_some() {
            return false;
        }
        if binding.is_renderer_enabled() {
            return !nan;
        }
        if let Some((property, _)) = binding.material_property() {
            return self
                .materials(key)
                .iter()
                .filter_map(|m| self.model.materials.get(*m))
                .any(|m| self.analyzer.has_property(m, property));
        }
        true
    }

    /// The NaN off-switch can stand in for the surface's enabled and
    /// active curves: it is allowed and nothing else animates the surface.
    #[must_use]
    pub fn nanimation_legal(&self, key: SurfaceKey) -> bool {
        if !self.settings.allow_nanimation {
            return false;
        }
        let Some(surface) = self.model.surfaces.get(key) else {
            return false;
        };
        let Some(path) = self.paths.path_of(surface.node) else {
            return false;
        };
        self.bindings
            .curves_at(path)
            .iter()
            .all(|e| !self.is_relevant(key, surface, &e.binding, true))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn materials(&self, key: SurfaceKey) -> &'a [MaterialKey] {
        self.swap_materials.get(&key).map_or(&[], |m| m.as_slice())
    }

    fn supports_shader_toggle(&self, key: SurfaceKey) -> bool {
        let swaps = self.relevant_curves(key).iter().any(|e| e.binding.material_slot_index().is_some());
        !swaps
            && self
                .materials(key)
                .iter()
                .filter_map(|m| self.model.materials.get(*m))
                .all(|m| self.analyzer.supports_mesh_index(m))
    }

    /// Every animated-active strict ancestor of `inner` also encloses `outer`.
    fn toggle_scope_contains(&self, inner: &Surface, outer: &Surface) -> bool {
        self.model.ancestors(inner.node).all(|ancestor| {
            let toggled = self
                .paths
                .path_of(ancestor)
                .is_some_and(|p| self.bindings.has_active_toggle(p));
            !toggled || self.model.is_descendant_of(outer.node, ancestor)
        })
    }

    fn default_enabled(&self, surface: &Surface) -> bool {
        surface.enabled && self.model.active_in_hierarchy(surface.node)
    }

    fn path(&self, key: SurfaceKey) -> &str {
        self.model
            .surfaces
            .get(key)
            .and_then(|s| self.paths.path_of(s.node))
            .unwrap_or_default()
    }
}
