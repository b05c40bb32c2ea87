use glam::{Quat, Vec3};

/// Local TRS transform of a node.
///
/// The optimizer never plays animation, so only the design-time TRS is
/// kept. Scale is what eligibility reads, through
/// [`Model::lossy_scale`](crate::scene::Model::lossy_scale).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[must_use]
    pub fn new() -> Self {
        Self::IDENTITY
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
