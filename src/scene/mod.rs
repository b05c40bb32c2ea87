//! Scene Model
//!
//! The host-side representation of a character model:
//! - Model: node arena, asset pools, animation controllers
//! - Node: hierarchy entry (parent/children, transform, active flag)
//! - Surface: drawable attached to a node (mesh, material slots, skinning)
//! - Transform: local TRS

pub mod model;
pub mod node;
pub mod surface;
pub mod transform;

pub use model::Model;
pub use node::{Node, NodeFlags};
pub use surface::{RenderState, RendererKind, ShadowCastingMode, Surface, SurfaceFlags};
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeKey;
    pub struct SurfaceKey;
    pub struct MaterialKey;
    pub struct ClipKey;
}
