use bitflags::bitflags;
use glam::Vec4;
use rustc_hash::FxHashMap;
use uuid::Uuid;

bitflags! {
    /// Capabilities the shader-analysis collaborator established for a
    /// material's shader.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MaterialTraits: u32 {
        /// The shader could be parsed and its properties enumerated.
        const MERGEABLE  = 1 << 0;
        /// Properties may be turned into per-surface arrays indexed by an
        /// "active mesh index" constant.
        const MESH_INDEX = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterialValue {
    Float(f32),
    Vector(Vec4),
    Texture(Option<String>),
    FloatArray(Vec<f32>),
    VectorArray(Vec<Vec4>),
}

#[derive(Debug, Clone)]
pub struct Material {
    pub uuid: Uuid,
    pub name: String,
    pub shader: String,
    pub properties: FxHashMap<String, MaterialValue>,
    pub traits: MaterialTraits,
}

impl Material {
    #[must_use]
    pub fn new(name: &str, shader: &str) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            shader: shader.to_string(),
            properties: FxHashMap::default(),
            traits: MaterialTraits::MERGEABLE | MaterialTraits::MESH_INDEX,
        }
    }

    #[must_use]
    pub fn with_property(mut self, name: &str, value: MaterialValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_traits(mut self, traits: MaterialTraits) -> Self {
        self.traits = traits;
        self
    }

    #[inline]
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Float value of a scalar property, if the property is a scalar.
    #[must_use]
    pub fn float(&self, name: &str) -> Option<f32> {
        match self.properties.get(name) {
            Some(MaterialValue::Float(v)) => Some(*v),
            _ => None,
        }
    }
}
