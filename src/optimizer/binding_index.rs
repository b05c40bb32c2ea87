use rustc_hash::{FxHashMap, FxHashSet};

use crate::animation::{CurveBinding, CurveSlot, KeyframeTrack, ObjectCurve};
use crate::scene::{ClipKey, Model};
use crate::utils::{PathInterner, Symbol};

/// One curve of one clip, addressed by its binding.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveEntry {
    pub binding: CurveBinding,
    pub clip: ClipKey,
    pub slot: CurveSlot,
}

impl CurveEntry {
    #[must_use]
    pub fn float_track<'m>(&self, model: &'m Model) -> Option<&'m KeyframeTrack<f32>> {
        match self.slot {
            CurveSlot::Float(i) => model.clips.get(self.clip)?.float_curves.get(i).map(|c| &c.track),
            CurveSlot::Object(_) => None,
        }
    }

    #[must_use]
    pub fn object_curve<'m>(&self, model: &'m Model) -> Option<&'m ObjectCurve> {
        match self.slot {
            CurveSlot::Object(i) => model.clips.get(self.clip)?.object_curves.get(i),
            CurveSlot::Float(_) => None,
        }
    }
}

/// Path-keyed lookup over every curve of a set of clips.
///
/// Read-only derived data: built once per pass, after layer folding, from
/// the clips of every layer that still has an effect.
#[derive(Debug, Default)]
pub struct AnimationBindingIndex {
    clips: Vec<ClipKey>,
    interner: PathInterner,
    by_path: FxHashMap<Symbol, Vec<CurveEntry>>,
}

impl AnimationBindingIndex {
    /// Indexes `clips` (duplicates ignored, first occurrence order kept).
    /// Clip keys missing from the model are skipped.
    #[must_use]
    pub fn build(model: &Model, clips: impl IntoIterator<Item = ClipKey>) -> Self {
        let mut index = Self::default();
        let mut seen = FxHashSet::default();

        for key in clips {
            if !seen.insert(key) {
                continue;
            }
            let Some(clip) = model.clips.get(key) else {
                log::warn!("AnimationBindingIndex: clip {key:?} is referenced but missing");
                continue;
            };
            index.clips.push(key);
            for (binding, slot) in clip.bindings() {
                let sym = index.interner.intern(&binding.path);
                index.by_path.entry(sym).or_default().push(CurveEntry {
                    binding: binding.clone(),
                    clip: key,
                    slot,
                });
            }
        }
        index
    }

    /// Indexed clips in first-reference order.
    #[must_use]
    pub fn clips(&self) -> &[ClipKey] {
        &self.clips
    }

    /// Every curve bound at `path`, in clip order.
    #[must_use]
    pub fn curves_at(&self, path: &str) -> &[CurveEntry] {
        self.interner
            .get(path)
            .and_then(|sym| self.by_path.get(&sym))
            .map_or(&[], Vec::as_slice)
    }

    /// Curves of `binding` across all clips.
    pub fn curves_of<'a>(&'a self, binding: &'a CurveBinding) -> impl Iterator<Item = &'a CurveEntry> + 'a {
        self.curves_at(&binding.path)
            .iter()
            .filter(move |e| &e.binding == binding)
    }

    #[must_use]
    pub fn is_animated(&self, binding: &CurveBinding) -> bool {
        self.curves_of(binding).next().is_some()
    }

    /// `true` if any clip animates the active flag of the node at `path`.
    #[must_use]
    pub fn has_active_toggle(&self, path: &str) -> bool {
        self.curves_at(path).iter().any(|e| e.binding.is_active_toggle())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}
