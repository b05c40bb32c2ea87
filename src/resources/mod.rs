//! Core Resource Definitions
//!
//! Asset-level data attached to the hierarchy, independent of any GPU or
//! file representation:
//! - MeshData: vertex attributes, skinning, sub-meshes
//! - BlendShape: animatable per-vertex delta channels
//! - Material: shader name and property table

pub mod blend_shape;
pub mod material;
pub mod mesh;

pub use blend_shape::{BlendShape, BlendShapeDeltas, BlendShapeFrame};
pub use material::{Material, MaterialTraits, MaterialValue};
pub use mesh::{BoneWeight, MAX_UV_CHANNELS, MeshData, SubMesh, VertexWeights};
