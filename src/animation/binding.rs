use std::fmt;

/// Well-known animated property names.
pub mod property {
    /// Active flag of a node (`GameObject`).
    pub const IS_ACTIVE: &str = "m_IsActive";
    /// Enabled flag of a renderer or behaviour.
    pub const ENABLED: &str = "m_Enabled";
    /// Prefix of blend shape weight properties.
    pub const BLEND_SHAPE_PREFIX: &str = "blendShape.";
    /// Prefix of material property overrides on a renderer.
    pub const MATERIAL_PREFIX: &str = "material.";
    /// Prefix of material slot (object reference) properties.
    pub const MATERIAL_SLOT_PREFIX: &str = "m_Materials.Array.data[";
    /// Per-axis local scale of a transform.
    pub const LOCAL_SCALE: [&str; 3] = ["m_LocalScale.x", "m_LocalScale.y", "m_LocalScale.z"];

    #[must_use]
    pub fn blend_shape(name: &str) -> String {
        format!("{BLEND_SHAPE_PREFIX}{name}")
    }

    #[must_use]
    pub fn material_slot(index: usize) -> String {
        format!("{MATERIAL_SLOT_PREFIX}{index}]")
    }

    /// `material.<name><component>`, e.g. `material._Color.r`.
    #[must_use]
    pub fn material(name: &str, component: &str) -> String {
        format!("{MATERIAL_PREFIX}{name}{component}")
    }
}

/// The kind of component an animation binding targets on its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    GameObject,
    Transform,
    SkinnedMeshRenderer,
    MeshRenderer,
    /// A physics-driven bone chain whose enabled state may mirror a mesh.
    PhysicsBone,
    Other,
}

impl TargetKind {
    #[inline]
    #[must_use]
    pub fn is_renderer(self) -> bool {
        matches!(self, Self::SkinnedMeshRenderer | Self::MeshRenderer)
    }
}

/// `(path, property, target-kind)`: the address of one animated value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurveBinding {
    pub path: String,
    pub property: String,
    pub target: TargetKind,
}

impl CurveBinding {
    #[must_use]
    pub fn new(path: &str, property: &str, target: TargetKind) -> Self {
        Self {
            path: path.to_string(),
            property: property.to_string(),
            target,
        }
    }

    #[must_use]
    pub fn active(path: &str) -> Self {
        Self::new(path, property::IS_ACTIVE, TargetKind::GameObject)
    }

    #[must_use]
    pub fn renderer_enabled(path: &str, target: TargetKind) -> Self {
        Self::new(path, property::ENABLED, target)
    }

    #[must_use]
    pub fn blend_shape(path: &str, name: &str) -> Self {
        Self::new(path, &property::blend_shape(name), TargetKind::SkinnedMeshRenderer)
    }

    #[must_use]
    pub fn material_slot(path: &str, index: usize, target: TargetKind) -> Self {
        Self::new(path, &property::material_slot(index), target)
    }

    #[must_use]
    pub fn with_path(&self, path: &str) -> Self {
        Self::new(path, &self.property, self.target)
    }

    #[must_use]
    pub fn with_target(&self, target: TargetKind) -> Self {
        Self {
            target,
            ..self.clone()
        }
    }

    #[inline]
    #[must_use]
    pub fn is_active_toggle(&self) -> bool {
        self.target == TargetKind::GameObject && self.property == property::IS_ACTIVE
    }

    #[inline]
    #[must_use]
    pub fn is_renderer_enabled(&self) -> bool {
        self.target.is_renderer() && self.property == property::ENABLED
    }

    /// Name of the animated blend shape, for renderer blend shape bindings.
    #[must_use]
    pub fn blend_shape_name(&self) -> Option<&str> {
        if self.target != TargetKind::SkinnedMeshRenderer {
            return None;
        }
        self.property.strip_prefix(property::BLEND_SHAPE_PREFIX)
    }

    /// `(property name, component suffix)` for material property bindings,
    /// e.g. `("_Color", ".r")` for `material._Color.r`.
    #[must_use]
    pub fn material_property(&self) -> Option<(&str, &str)> {
        if !self.target.is_renderer() {
            return None;
        }
        let rest = self.property.strip_prefix(property::MATERIAL_PREFIX)?;
        Some(match rest.find('.') {
            Some(dot) => (&rest[..dot], &rest[dot..]),
            None => (rest, ""),
        })
    }

    /// Slot index for material slot (object reference) bindings.
    #[must_use]
    pub fn material_slot_index(&self) -> Option<usize> {
        if !self.target.is_renderer() {
            return None;
        }
        self.property
            .strip_prefix(property::MATERIAL_SLOT_PREFIX)?
            .strip_suffix(']')?
            .parse()
            .ok()
    }
}

impl fmt::Display for CurveBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}.{}", self.path, self.target, self.property)
    }
}
