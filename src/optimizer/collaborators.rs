//! Narrow interfaces to the systems the optimizer does not own: material
//! analysis and material/shader generation. Persistence lives in
//! [`crate::assets`].

use crate::errors::Result;
use crate::resources::{Material, MaterialTraits, MaterialValue};

/// Shader-analysis collaborator.
pub trait MaterialAnalyzer: Send + Sync {
    /// `false` for materials whose shader could not be analysed; surfaces
    /// holding one are left out of merging.
    fn is_material_mergeable(&self, material: &Material) -> bool;

    /// Whether the material can be parameterized by a per-instance
    /// "active mesh index" constant.
    fn supports_mesh_index(&self, material: &Material) -> bool;

    fn has_property(&self, material: &Material, property: &str) -> bool {
        material.has_property(property)
    }
}

/// Reads the capabilities declared on the material itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredMaterialAnalyzer;

impl MaterialAnalyzer for DeclaredMaterialAnalyzer {
    fn is_material_mergeable(&self, material: &Material) -> bool {
        material.traits.contains(MaterialTraits::MERGEABLE)
    }

    fn supports_mesh_index(&self, material: &Material) -> bool {
        material.traits.contains(MaterialTraits::MESH_INDEX)
    }
}

/// Per-surface toggle data a generated material must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleProperty {
    pub name: String,
    pub default_value: f32,
}

/// One material variant to generate for a fused surface slot.
#[derive(Debug, Clone)]
pub struct VariantRequest {
    /// Index of the fused slot the result is assigned to.
    pub slot: usize,
    pub material: Material,
    /// Index of the source surface inside its merge group.
    pub surface_index: usize,
    /// Constant-index toggles of the source surface (enabled, active).
    pub toggles: Vec<ToggleProperty>,
    /// Animated material properties renamed for this surface:
    /// `(original, renamed)`.
    pub renamed_properties: Vec<(String, String)>,
}

/// Material/shader generation collaborator. Called from the parallel
/// codegen region.
pub trait ShaderCodegen: Send + Sync {
    fn generate(&self, request: &VariantRequest) -> Result<Material>;
}

/// Property name carrying the source surface index of a generated variant.
pub const SURFACE_INDEX_PROPERTY: &str = "_RigFuseSurfaceIndex";

/// Emits the per-surface property data without rewriting shader source:
/// the variant keeps the original shader and gains the index constant, the
/// toggle properties, and a copy of each renamed property.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertyArrayCodegen;

impl ShaderCodegen for PropertyArrayCodegen {
    fn generate(&self, request: &VariantRequest) -> Result<Material> {
        let source = &request.material;
        let mut material = Material::new(
            &format!("{} #{}", source.name, request.surface_index),
            &source.shader,
        )
        .with_traits(source.traits);
        material.properties = source.properties.clone();

        material.properties.insert(
            SURFACE_INDEX_PROPERTY.to_string(),
            MaterialValue::Float(request.surface_index as f32),
        );
        for toggle in &request.toggles {
            material
                .properties
                .insert(toggle.name.clone(), MaterialValue::Float(toggle.default_value));
        }
        for (original, renamed) in &request.renamed_properties {
            if let Some(value) = source.properties.get(original) {
                material.properties.insert(renamed.clone(), value.clone());
            }
        }
        Ok(material)
    }
}
