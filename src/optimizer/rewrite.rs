//! Animation reference rewriting.
//!
//! Fusion and eligibility record where each animated value went; this
//! module replays those records over every referenced clip so the
//! optimized model animates exactly what the original did.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::animation::{
    AnimationClip, CurveBinding, FloatCurve, InterpolationMode, KeyframeTrack, ObjectCurve, TargetKind,
};
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::path_index::PathIndex;
use crate::scene::{ClipKey, Model};

/// Path of the curve injected into clips that lost every binding.
pub const PLACEHOLDER_PATH: &str = "$$placeholder";

const COMPONENT: &str = "AnimationRewrite";

/// How source keyframe values map onto the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueMap {
    Identity,
    /// Non-zero becomes `1`, zero becomes NaN. Drives an off-switch bone scale.
    NanScale,
    Scale(f32),
}

impl ValueMap {
    #[must_use]
    pub fn apply(self, track: &KeyframeTrack<f32>) -> KeyframeTrack<f32> {
        match self {
            ValueMap::Identity => track.clone(),
            ValueMap::Scale(factor) => track.map_values(|v| v * factor),
            ValueMap::NanScale => KeyframeTrack::new(
                track.times.clone(),
                track
                    .key_values()
                    .map(|v| if v != 0.0 { 1.0 } else { f32::NAN })
                    .collect(),
                InterpolationMode::Step,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteTarget {
    pub binding: CurveBinding,
    pub map: ValueMap,
}

impl RewriteTarget {
    #[must_use]
    pub fn identity(binding: CurveBinding) -> Self {
        Self {
            binding,
            map: ValueMap::Identity,
        }
    }
}

/// `source → targets`. A target equal to the source with an identity map
/// keeps the original curve next to the fanned-out ones.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteRule {
    pub source: CurveBinding,
    pub targets: SmallVec<[RewriteTarget; 2]>,
}

/// Renderer bindings at a moved path are retargeted to the fused surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererMove {
    pub path: String,
    pub target: TargetKind,
}

/// Every rewrite recorded during one run.
#[derive(Debug, Default, Clone)]
pub struct RewriteTable {
    rules: FxHashMap<CurveBinding, SmallVec<[RewriteTarget; 2]>>,
    order: Vec<CurveBinding>,
    moves: FxHashMap<String, RendererMove>,
    slots: FxHashMap<(String, usize), (String, usize)>,
}

impl RewriteTable {
    pub fn clear(&mut self) {
        self.rules.clear();
        self.order.clear();
        self.moves.clear();
        self.slots.clear();
    }

    /// Adds a target for `source`. Renderer bindings are registered for
    /// both renderer kinds so a curve authored against either still matches.
    pub fn add_rule(&mut self, source: &CurveBinding, target: RewriteTarget) {
        let widened = match source.target {
            TargetKind::SkinnedMeshRenderer => Some(source.with_target(TargetKind::MeshRenderer)),
            TargetKind::MeshRenderer => Some(source.with_target(TargetKind::SkinnedMeshRenderer)),
            _ => None,
        };
        for key in std::iter::once(source.clone()).chain(widened) {
            let targets = self.rules.entry(key.clone()).or_insert_with(|| {
                self.order.push(key);
                SmallVec::new()
            });
            if !targets.contains(&target) {
                targets.push(target.clone());
            }
        }
    }

    /// Keeps `source` in place in addition to its other targets.
    pub fn keep(&mut self, source: &CurveBinding) {
        self.add_rule(source, RewriteTarget::identity(source.clone()));
    }

    pub fn add_move(&mut self, from_path: &str, to: RendererMove) {
        self.moves.insert(from_path.to_string(), to);
    }

    pub fn add_slot(&mut self, from: (String, usize), to: (String, usize)) {
        self.slots.insert(from, to);
    }

    #[must_use]
    pub fn targets(&self, binding: &CurveBinding) -> Option<&[RewriteTarget]> {
        self.rules.get(binding).map(SmallVec::as_slice)
    }

    #[must_use]
    pub fn renderer_move(&self, path: &str) -> Option<&RendererMove> {
        self.moves.get(path)
    }

    #[must_use]
    pub fn slot(&self, path: &str, index: usize) -> Option<&(String, usize)> {
        self.slots.get(&(path.to_string(), index))
    }

    /// Rules in registration order.
    #[must_use]
    pub fn rules(&self) -> Vec<RewriteRule> {
        self.order
            .iter()
            .filter_map(|source| {
                self.rules.get(source).map(|targets| RewriteRule {
                    source: source.clone(),
                    targets: targets.clone(),
                })
            })
            .collect()
    }

    /// `(old path, old slot) → (new path, new slot)`.
    #[must_use]
    pub fn slot_remap(&self) -> &FxHashMap<(String, usize), (String, usize)> {
        &self.slots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.moves.is_empty() && self.slots.is_empty()
    }
}

/// Applies a [`RewriteTable`] to clips.
///
/// `paths` must describe the hierarchy after every structural change of the
/// run; targets it cannot resolve are dropped.
pub struct AnimationRewriteEngine<'a> {
    table: &'a RewriteTable,
    paths: &'a PathIndex,
}

impl<'a> AnimationRewriteEngine<'a> {
    #[must_use]
    pub fn new(table: &'a RewriteTable, paths: &'a PathIndex) -> Self {
        Self { table, paths }
    }

    /// Rewrites every clip in `clips` in place and returns the keys of the
    /// clips that changed. Unchanged clips are left untouched.
    pub fn rewrite_model(&self, model: &mut Model, clips: &[ClipKey], ctx: &mut OptimizationContext) -> Vec<ClipKey> {
        let mut seen = FxHashSet::default();
        let mut changed = Vec::new();
        for &key in clips {
            if !seen.insert(key) {
                continue;
            }
            let Some(clip) = model.clips.get(key) else {
                continue;
            };
            if let Some(rewritten) = self.rewrite_clip(clip, ctx) {
                model.clips[key] = rewritten;
                changed.push(key);
            }
        }
        changed
    }

    /// The rewritten clip, or `None` when no binding of `clip` changes.
    pub fn rewrite_clip(&self, clip: &AnimationClip, ctx: &mut OptimizationContext) -> Option<AnimationClip> {
        let mut changed = false;
        let mut seen: FxHashSet<CurveBinding> = FxHashSet::default();
        let mut dropped_at: Option<f32> = None;
        let mut floats = Vec::with_capacity(clip.float_curves.len());
        let mut objects = Vec::with_capacity(clip.object_curves.len());

        for curve in &clip.float_curves {
            let targets: SmallVec<[RewriteTarget; 2]> = match self.table.targets(&curve.binding) {
                Some(targets) => targets.iter().cloned().collect(),
                None => smallvec::smallvec![RewriteTarget::identity(self.fallback(&curve.binding))],
            };
            if !(targets.len() == 1 && targets[0] == RewriteTarget::identity(curve.binding.clone())) {
                changed = true;
            }

            let end = curve.track.last_time();
            for target in targets {
                if target.binding != curve.binding && !self.paths.contains(&target.binding.path) {
                    ctx.debug(
                        COMPONENT,
                        format!("'{}': dropped {} (target {} is dangling)", clip.name, curve.binding, target.binding),
                    );
                    dropped_at = max_time(dropped_at, end);
                    continue;
                }
                if !seen.insert(target.binding.clone()) {
                    continue;
                }
                floats.push(FloatCurve {
                    binding: target.binding,
                    track: target.map.apply(&curve.track),
                });
            }
        }

        for curve in &clip.object_curves {
            let binding = &curve.binding;
            let target = match binding.material_slot_index() {
                Some(slot) => match self.table.slot(&binding.path, slot) {
                    Some((path, index)) => {
                        let kind = self
                            .table
                            .renderer_move(&binding.path)
                            .map_or(binding.target, |m| m.target);
                        Some(CurveBinding::material_slot(path, *index, kind))
                    }
                    None if self.table.renderer_move(&binding.path).is_some() => None,
                    None => Some(binding.clone()),
                },
                None => Some(self.fallback(binding)),
            };

            match target {
                Some(target) if target == *binding || self.paths.contains(&target.path) => {
                    changed |= target != *binding;
                    if seen.insert(target.clone()) {
                        objects.push(ObjectCurve {
                            binding: target,
                            keys: curve.keys.clone(),
                        });
                    }
                }
                _ => {
                    changed = true;
                    ctx.debug(COMPONENT, format!("'{}': dropped {binding} (slot no longer exists)", clip.name));
                    dropped_at = max_time(dropped_at, curve.last_time());
                }
            }
        }

        if !changed {
            return None;
        }

        if floats.is_empty() && objects.is_empty() && !clip.is_empty() {
            let time = dropped_at.unwrap_or(clip.duration);
            floats.push(FloatCurve {
                binding: CurveBinding::new(PLACEHOLDER_PATH, "placeholder", TargetKind::Other),
                track: KeyframeTrack::new(vec![time], vec![0.0], InterpolationMode::Step),
            });
            ctx.debug(COMPONENT, format!("'{}': every curve was dropped, kept a placeholder at {time}s", clip.name));
        }

        let mut rewritten = AnimationClip::new(&clip.name, floats, objects);
        rewritten.duration = rewritten.duration.max(clip.duration);
        Some(rewritten)
    }

    /// Path-only remap for bindings without an explicit rule.
    fn fallback(&self, binding: &CurveBinding) -> CurveBinding {
        if binding.target.is_renderer()
            && let Some(to) = self.table.renderer_move(&binding.path)
        {
            return binding.with_path(&to.path).with_target(to.target);
        }
        binding.clone()
    }
}

fn max_time(current: Option<f32>, candidate: Option<f32>) -> Option<f32> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
