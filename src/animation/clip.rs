use crate::animation::binding::CurveBinding;
use crate::animation::tracks::KeyframeTrack;
use crate::scene::MaterialKey;

/// A float curve and the binding it drives.
#[derive(Debug, Clone)]
pub struct FloatCurve {
    pub binding: CurveBinding,
    pub track: KeyframeTrack<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectKeyframe {
    pub time: f32,
    pub value: Option<MaterialKey>,
}

/// An object-reference curve (material swap) and the binding it drives.
#[derive(Debug, Clone)]
pub struct ObjectCurve {
    pub binding: CurveBinding,
    pub keys: Vec<ObjectKeyframe>,
}

impl ObjectCurve {
    #[must_use]
    pub fn last_time(&self) -> Option<f32> {
        self.keys.last().map(|k| k.time)
    }

    #[must_use]
    pub fn structurally_equal(&self, other: &Self) -> bool {
        self.keys.len() == other.keys.len()
            && self
                .keys
                .iter()
                .zip(&other.keys)
                .all(|(a, b)| a.time.to_bits() == b.time.to_bits() && a.value == b.value)
    }
}

/// Identifies one curve inside a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveSlot {
    Float(usize),
    Object(usize),
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub float_curves: Vec<FloatCurve>,
    pub object_curves: Vec<ObjectCurve>,
}

impl AnimationClip {
    pub fn new(name: &str, float_curves: Vec<FloatCurve>, object_curves: Vec<ObjectCurve>) -> Self {
        let mut clip = Self {
            name: name.to_string(),
            duration: 0.0,
            float_curves,
            object_curves,
        };
        clip.recompute_duration();
        clip
    }

    /// Recomputes `duration` as the latest key time over all curves.
    pub fn recompute_duration(&mut self) {
        let float_end = self
            .float_curves
            .iter()
            .filter_map(|c| c.track.last_time())
            .fold(0.0_f32, f32::max);
        let object_end = self
            .object_curves
            .iter()
            .filter_map(ObjectCurve::last_time)
            .fold(0.0_f32, f32::max);
        self.duration = float_end.max(object_end);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.float_curves.is_empty() && self.object_curves.is_empty()
    }

    #[must_use]
    pub fn has_object_curves(&self) -> bool {
        !self.object_curves.is_empty()
    }

    /// Every binding of the clip with the slot of its curve.
    pub fn bindings(&self) -> impl Iterator<Item = (&CurveBinding, CurveSlot)> + '_ {
        let floats = self
            .float_curves
            .iter()
            .enumerate()
            .map(|(i, c)| (&c.binding, CurveSlot::Float(i)));
        let objects = self
            .object_curves
            .iter()
            .enumerate()
            .map(|(i, c)| (&c.binding, CurveSlot::Object(i)));
        floats.chain(objects)
    }

    #[must_use]
    pub fn float_curve(&self, binding: &CurveBinding) -> Option<&KeyframeTrack<f32>> {
        self.float_curves
            .iter()
            .find(|c| &c.binding == binding)
            .map(|c| &c.track)
    }

    #[must_use]
    pub fn object_curve(&self, binding: &CurveBinding) -> Option<&ObjectCurve> {
        self.object_curves.iter().find(|c| &c.binding == binding)
    }
}
