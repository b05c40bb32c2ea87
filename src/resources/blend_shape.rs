use glam::Vec3;

/// One keyed shape of a blend shape channel, reached at `weight`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendShapeFrame {
    pub weight: f32,
    pub delta_positions: Vec<Vec3>,
    /// Empty when the frame carries no normal deltas.
    pub delta_normals: Vec<Vec3>,
    /// Empty when the frame carries no tangent deltas.
    pub delta_tangents: Vec<Vec3>,
}

impl BlendShapeFrame {
    #[must_use]
    pub fn new(weight: f32, delta_positions: Vec<Vec3>) -> Self {
        Self {
            weight,
            delta_positions,
            delta_normals: Vec::new(),
            delta_tangents: Vec::new(),
        }
    }
}

/// A named, animatable blend shape channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendShape {
    pub name: String,
    pub frames: Vec<BlendShapeFrame>,
}

/// Deltas of one blend shape evaluated at a channel weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendShapeDeltas {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
}

impl BlendShape {
    #[must_use]
    pub fn new(name: &str, frames: Vec<BlendShapeFrame>) -> Self {
        Self {
            name: name.to_string(),
            frames,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_single_frame(&self) -> bool {
        self.frames.len() == 1
    }

    /// Evaluates the channel at `weight` over `vertex_count` vertices.
    ///
    /// Below the first frame the first frame is scaled from zero; between
    /// frames the two neighbours are interpolated; past the last frame the
    /// last frame is extrapolated linearly.
    #[must_use]
    pub fn evaluate(&self, weight: f32, vertex_count: usize) -> BlendShapeDeltas {
        let mut out = BlendShapeDeltas {
            positions: vec![Vec3::ZERO; vertex_count],
            normals: vec![Vec3::ZERO; vertex_count],
            tangents: vec![Vec3::ZERO; vertex_count],
        };

        if weight == 0.0 || self.frames.is_empty() {
            return out;
        }

        let next = self.frames.partition_point(|f| f.weight <= weight);
        let (lower, upper, t) = if next == 0 {
            let first = &self.frames[0];
            (None, first, ratio(weight, first.weight))
        } else if next >= self.frames.len() {
            let last = &self.frames[self.frames.len() - 1];
            (None, last, ratio(weight, last.weight))
        } else {
            let a = &self.frames[next - 1];
            let b = &self.frames[next];
            let dt = b.weight - a.weight;
            let t = if dt.abs() > 1e-6 {
                (weight - a.weight) / dt
            } else {
                0.0
            };
            (Some(a), b, t)
        };

        accumulate(&mut out.positions, &upper.delta_positions, t);
        accumulate(&mut out.normals, &upper.delta_normals, t);
        accumulate(&mut out.tangents, &upper.delta_tangents, t);
        if let Some(lower) = lower {
            accumulate(&mut out.positions, &lower.delta_positions, 1.0 - t);
            accumulate(&mut out.normals, &lower.delta_normals, 1.0 - t);
            accumulate(&mut out.tangents, &lower.delta_tangents, 1.0 - t);
        }
        out
    }
}

fn ratio(weight: f32, frame_weight: f32) -> f32 {
    if frame_weight.abs() > 1e-6 {
        weight / frame_weight
    } else {
        1.0
    }
}

fn accumulate(target: &mut [Vec3], deltas: &[Vec3], scale: f32) {
    for (t, d) in target.iter_mut().zip(deltas) {
        *t += *d * scale;
    }
}
