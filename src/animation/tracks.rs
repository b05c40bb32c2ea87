use crate::animation::values::Interpolatable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpolationMode {
    Linear,
    Step,
    CubicSpline,
}

#[derive(Debug, Clone)]
pub struct KeyframeTrack<T: Interpolatable> {
    pub times: Vec<f32>,
    pub values: Vec<T>, // For CubicSpline, length is times.len() * 3
    pub interpolation: InterpolationMode,
}

impl<T: Interpolatable> KeyframeTrack<T> {
    #[must_use]
    pub fn new(times: Vec<f32>, values: Vec<T>, interpolation: InterpolationMode) -> Self {
        Self {
            times,
            values,
            interpolation,
        }
    }

    /// A single-key track holding `value` at time 0.
    #[must_use]
    pub fn constant(value: T) -> Self {
        Self::new(vec![0.0], vec![value], InterpolationMode::Step)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    #[must_use]
    pub fn last_time(&self) -> Option<f32> {
        self.times.last().copied()
    }

    /// Samples the track; `None` for an empty track.
    #[must_use]
    pub fn sample(&self, time: f32) -> Option<T> {
        if self.times.is_empty() {
            return None;
        }

        // partition_point finds the first index where t > time, i.e. next_index
        let next_idx = self.times.partition_point(|&t| t <= time);
        let index = next_idx.saturating_sub(1);
        Some(self.sample_at_frame(index, time))
    }

    /// Keyframe values, one per key, ignoring cubic tangents.
    pub fn key_values(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.times.len()).map(|i| *self.get_value_at(i))
    }

    /// Same key count, key times, key values, and interpolation, compared
    /// bit for bit.
    #[must_use]
    pub fn structurally_equal(&self, other: &Self) -> bool {
        self.interpolation == other.interpolation
            && self.times.len() == other.times.len()
            && self.values.len() == other.values.len()
            && self
                .times
                .iter()
                .zip(&other.times)
                .all(|(a, b)| a.to_bits() == b.to_bits())
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| T::bit_eq(*a, *b))
    }

    /// Returns a track with every value (tangents included) mapped through
    /// `f`. Keyframe times are preserved.
    #[must_use]
    pub fn map_values(&self, f: impl Fn(T) -> T) -> Self {
        Self {
            times: self.times.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
            interpolation: self.interpolation,
        }
    }

    /// Helper method: unified value accessor.
    /// For Linear/Step, the index is used directly.
    /// For CubicSpline, the value is at index * 3 + 1.
    fn get_value_at(&self, index: usize) -> &T {
        match self.interpolation {
            InterpolationMode::CubicSpline => &self.values[index * 3 + 1],
            _ => &self.values[index],
        }
    }

    fn sample_at_frame(&self, index: usize, time: f32) -> T {
        let len = self.times.len();

        // 1. Boundary case: no next frame available
        if index >= len - 1 {
            return *self.get_value_at(len - 1);
        }
        if time <= self.times[0] {
            return *self.get_value_at(0);
        }

        let next_idx = index + 1;
        let t0 = self.times[index];
        let t1 = self.times[next_idx];
        let dt = t1 - t0;

        // Prevent division by zero
        let t = if dt > 1e-6 { (time - t0) / dt } else { 0.0 };
        let t = t.clamp(0.0, 1.0);

        match self.interpolation {
            InterpolationMode::Step => *self.get_value_at(index),
            InterpolationMode::Linear => {
                let v0 = *self.get_value_at(index);
                let v1 = *self.get_value_at(next_idx);
                T::interpolate_linear(v0, v1, t)
            }
            InterpolationMode::CubicSpline => {
                let i_prev = index * 3;
                let i_next = next_idx * 3;

                let v0 = self.values[i_prev + 1];
                let out_tangent0 = self.values[i_prev + 2];
                let in_tangent1 = self.values[i_next];
                let v1 = self.values[i_next + 1];

                T::interpolate_cubic(v0, out_tangent0, in_tangent1, v1, t, dt)
            }
        }
    }
}

impl KeyframeTrack<f32> {
    /// `true` if every key holds the same value.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        let mut values = self.key_values();
        match values.next() {
            Some(first) => values.all(|v| v.to_bits() == first.to_bits()),
            None => true,
        }
    }
}
