//! Blend shape passes over a fused (or singleton) surface: freezing shapes
//! nothing animates, and merging shapes whose animated values always keep
//! a constant ratio.

use glam::Vec3;
use rustc_hash::FxHashSet;

use crate::animation::{CurveBinding, KeyframeTrack};
use crate::optimizer::binding_index::AnimationBindingIndex;
use crate::optimizer::rewrite::{RewriteTable, RewriteTarget, ValueMap};
use crate::resources::{BlendShape, BlendShapeFrame, MeshData};
use crate::scene::{ClipKey, Model};
use crate::settings::RATIO_TOLERANCE;

/// A blend shape of the surface being built, with the source bindings that
/// drive it and how their values map onto it.
#[derive(Debug, Clone)]
pub struct ShapeChannel {
    pub shape: BlendShape,
    pub default_weight: f32,
    pub sources: Vec<(CurveBinding, ValueMap)>,
}

impl ShapeChannel {
    #[must_use]
    pub fn new(shape: BlendShape, default_weight: f32, source: CurveBinding) -> Self {
        Self {
            shape,
            default_weight,
            sources: vec![(source, ValueMap::Identity)],
        }
    }

    fn is_animated(&self, bindings: &AnimationBindingIndex) -> bool {
        self.sources.iter().any(|(b, _)| bindings.is_animated(b))
    }

    /// Curve of this channel in `clip`, from its first animated source.
    fn track_in<'m>(
        &self,
        model: &'m Model,
        bindings: &AnimationBindingIndex,
        clip: ClipKey,
    ) -> Option<&'m KeyframeTrack<f32>> {
        self.sources.iter().find_map(|(b, _)| {
            bindings
                .curves_of(b)
                .find(|e| e.clip == clip)
                .and_then(|e| e.float_track(model))
        })
    }
}

// ============================================================================
// Freezing
// ============================================================================

/// Removes every channel no clip animates. A non-zero default weight is
/// baked into the base mesh first. Returns the number of frozen channels.
pub fn freeze_unanimated(mesh: &mut MeshData, channels: &mut Vec<ShapeChannel>, bindings: &AnimationBindingIndex) -> usize {
    let before = channels.len();
    let vertex_count = mesh.vertex_count();

    channels.retain(|channel| {
        if channel.is_animated(bindings) {
            return true;
        }
        if channel.default_weight != 0.0 {
            let deltas = channel.shape.evaluate(channel.default_weight, vertex_count);
            for (p, d) in mesh.positions.iter_mut().zip(&deltas.positions) {
                *p += *d;
            }
            for (n, d) in mesh.normals.iter_mut().zip(&deltas.normals) {
                *n += *d;
            }
            for (t, d) in mesh.tangents.iter_mut().zip(&deltas.tangents) {
                *t += d.extend(0.0);
            }
        }
        false
    });
    before - channels.len()
}

// ============================================================================
// Ratio detection
// ============================================================================

/// Normalizes so the largest component is 1. A maximum of exactly 0 or 1
/// leaves the values as they are.
#[must_use]
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == 0.0 || max == 1.0 || !max.is_finite() {
        return values.to_vec();
    }
    values.iter().map(|v| v / max).collect()
}

/// Per-column ratios shared by every observed vector, restricted to
/// `columns`, or `None` when some vector disagrees beyond the tolerance.
///
/// Vectors in which every selected value is zero are consistent with any
/// ratio.
#[must_use]
pub fn consistent_ratios(vectors: &[Vec<f32>], columns: &[usize]) -> Option<Vec<f32>> {
    let mut reference: Option<Vec<f32>> = None;
    for vector in vectors {
        let selected: Vec<f32> = columns.iter().map(|&c| vector[c]).collect();
        if selected.iter().all(|v| v.abs() <= RATIO_TOLERANCE) {
            continue;
        }
        let normalized = normalize(&selected);
        match &reference {
            None => {
                let max = normalized.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                if (max - 1.0).abs() > RATIO_TOLERANCE {
                    return None;
                }
                reference = Some(normalized);
            }
            Some(r) => {
                if r.iter().zip(&normalized).any(|(a, b)| (a - b).abs() > RATIO_TOLERANCE) {
                    return None;
                }
            }
        }
    }
    reference
}

/// Every distinct weight vector observed for `candidates`: the default
/// weights, then the values at every key time of every clip touching them.
/// A channel without a curve in a clip holds its default weight.
#[must_use]
pub fn observed_vectors(
    model: &Model,
    bindings: &AnimationBindingIndex,
    channels: &[ShapeChannel],
    candidates: &[usize],
) -> Vec<Vec<f32>> {
    let defaults: Vec<f32> = candidates.iter().map(|&c| channels[c].default_weight).collect();
    let mut seen: FxHashSet<Vec<u32>> = FxHashSet::default();
    let mut vectors = Vec::new();
    let mut push = |v: Vec<f32>| {
        if seen.insert(v.iter().map(|x| x.to_bits()).collect()) {
            vectors.push(v);
        }
    };
    push(defaults.clone());

    for &clip in bindings.clips() {
        let tracks: Vec<Option<&KeyframeTrack<f32>>> = candidates
            .iter()
            .map(|&c| channels[c].track_in(model, bindings, clip))
            .collect();
        if tracks.iter().all(Option::is_none) {
            continue;
        }

        let mut times: Vec<f32> = tracks.iter().flatten().flat_map(|t| t.times.iter().copied()).collect();
        times.sort_by(f32::total_cmp);
        times.dedup_by(|a, b| a.to_bits() == b.to_bits());

        for time in times {
            let vector = tracks
                .iter()
                .zip(&defaults)
                .map(|(track, default)| track.and_then(|t| t.sample(time)).unwrap_or(*default))
                .collect();
            push(vector);
        }
    }
    vectors
}

/// Greedy union of candidate columns: each group absorbs every later group
/// it stays ratio-consistent with.
#[must_use]
pub fn ratio_groups(vectors: &[Vec<f32>], column_count: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = (0..column_count).map(|c| vec![c]).collect();
    let mut i = 0;
    while i < groups.len() {
        let mut j = i + 1;
        while j < groups.len() {
            let mut union = groups[i].clone();
            union.extend_from_slice(&groups[j]);
            if consistent_ratios(vectors, &union).is_some() {
                groups[i] = union;
                groups.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    groups
}

// ============================================================================
// Merging
// ============================================================================

/// Merges single-frame channels whose observed values always keep the same
/// ratio into one channel. Returns the number of channels removed.
pub fn merge_by_ratio(
    model: &Model,
    bindings: &AnimationBindingIndex,
    channels: &mut Vec<ShapeChannel>,
    vertex_count: usize,
) -> usize {
    let candidates: Vec<usize> = (0..channels.len())
        .filter(|&i| {
            let c = &channels[i];
            c.shape.is_single_frame()
                && c.shape.frames[0].weight != 0.0
                && is_nonzero_somewhere(model, bindings, c)
        })
        .collect();
    if candidates.len() < 2 {
        return 0;
    }

    let vectors = observed_vectors(model, bindings, channels, &candidates);
    let mut absorbed = FxHashSet::default();

    for group in ratio_groups(&vectors, candidates.len()) {
        if group.len() < 2 {
            continue;
        }
        let Some(ratios) = consistent_ratios(&vectors, &group) else {
            continue;
        };
        if ratios.iter().any(|r| *r <= RATIO_TOLERANCE) {
            continue;
        }

        let members: Vec<(usize, f32)> = group.iter().map(|&col| candidates[col]).zip(ratios).collect();
        let Some(&(primary, _)) = members
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };

        let fused = fuse_channels(channels, &members, primary, vertex_count);
        channels[primary] = fused;
        absorbed.extend(members.iter().map(|(i, _)| *i).filter(|i| *i != primary));
    }

    let before = channels.len();
    let mut index = 0;
    channels.retain(|_| {
        let keep = !absorbed.contains(&index);
        index += 1;
        keep
    });
    before - channels.len()
}

fn is_nonzero_somewhere(model: &Model, bindings: &AnimationBindingIndex, channel: &ShapeChannel) -> bool {
    channel.default_weight != 0.0
        || channel.sources.iter().any(|(b, _)| {
            bindings
                .curves_of(b)
                .filter_map(|e| e.float_track(model))
                .any(|t| t.key_values().any(|v| v != 0.0))
        })
}

/// `Σ r_s · F / f_s · Δ_s` over the members, `F` being the primary's frame
/// weight, so driving the fused channel like the primary reproduces every
/// member's contribution.
fn fuse_channels(channels: &[ShapeChannel], members: &[(usize, f32)], primary: usize, vertex_count: usize) -> ShapeChannel {
    let primary_channel = &channels[primary];
    let frame_weight = primary_channel.shape.frames[0].weight;

    let has = |f: fn(&BlendShapeFrame) -> bool| members.iter().any(|(i, _)| f(&channels[*i].shape.frames[0]));
    let mut frame = BlendShapeFrame {
        weight: frame_weight,
        delta_positions: vec![Vec3::ZERO; vertex_count],
        delta_normals: if has(|f| !f.delta_normals.is_empty()) {
            vec![Vec3::ZERO; vertex_count]
        } else {
            Vec::new()
        },
        delta_tangents: if has(|f| !f.delta_tangents.is_empty()) {
            vec![Vec3::ZERO; vertex_count]
        } else {
            Vec::new()
        },
    };

    let mut sources = Vec::new();
    for &(index, ratio) in members {
        let channel = &channels[index];
        let source_frame = &channel.shape.frames[0];
        let factor = ratio * frame_weight / source_frame.weight;
        accumulate(&mut frame.delta_positions, &source_frame.delta_positions, factor);
        accumulate(&mut frame.delta_normals, &source_frame.delta_normals, factor);
        accumulate(&mut frame.delta_tangents, &source_frame.delta_tangents, factor);

        for (binding, map) in &channel.sources {
            let map = if index == primary {
                *map
            } else {
                compose_scale(*map, 1.0 / ratio)
            };
            sources.push((binding.clone(), map));
        }
    }
    // Primary sources first so its curves win when a clip drives several.
    sources.sort_by_key(|(b, _)| !primary_channel.sources.iter().any(|(p, _)| p == b));

    ShapeChannel {
        shape: BlendShape::new(&primary_channel.shape.name, vec![frame]),
        default_weight: primary_channel.default_weight,
        sources,
    }
}

fn compose_scale(map: ValueMap, factor: f32) -> ValueMap {
    match map {
        ValueMap::Identity => ValueMap::Scale(factor),
        ValueMap::Scale(s) => ValueMap::Scale(s * factor),
        ValueMap::NanScale => ValueMap::NanScale,
    }
}

fn accumulate(target: &mut [Vec3], deltas: &[Vec3], scale: f32) {
    for (t, d) in target.iter_mut().zip(deltas) {
        *t += *d * scale;
    }
}

// ============================================================================
// Output
// ============================================================================

/// Writes the channels back as blend shapes and default weights, and
/// registers a rewrite rule for every source whose curve must move.
pub fn finish(channels: Vec<ShapeChannel>, host_path: &str, table: &mut RewriteTable) -> (Vec<BlendShape>, Vec<f32>) {
    let mut shapes = Vec::with_capacity(channels.len());
    let mut weights = Vec::with_capacity(channels.len());
    for channel in channels {
        let target = CurveBinding::blend_shape(host_path, &channel.shape.name);
        for (source, map) in &channel.sources {
            if *source != target || *map != ValueMap::Identity {
                table.add_rule(
                    source,
                    RewriteTarget {
                        binding: target.clone(),
                        map: *map,
                    },
                );
            }
        }
        shapes.push(channel.shape);
        weights.push(channel.default_weight);
    }
    (shapes, weights)
}
