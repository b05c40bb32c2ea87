use bitflags::bitflags;

use crate::scene::transform::Transform;
use crate::scene::{NodeKey, SurfaceKey};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u32 {
        /// The surface on this node must not take part in merging.
        const EXCLUDED     = 1 << 0;
        /// The node carries a physics bone chain.
        const PHYSICS_BONE = 1 << 1;
    }
}

/// An entry of the rigid hierarchy.
///
/// # Hierarchy
///
/// Nodes form a tree through parent-child relationships:
/// - `parent`: Optional key of the parent node (None for the root)
/// - `children`: Ordered child keys; the order defines discovery order
///
/// Nodes are addressed by path (see `PathIndex`) by every optimizer
/// component; keys are only stable until the next structural edit.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,

    // === Core Hierarchy ===
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,

    pub transform: Transform,

    /// Local active flag. The node is active in the hierarchy only if it and
    /// all of its ancestors are active.
    pub active: bool,

    /// Drawable attached to this node, if any.
    pub surface: Option<SurfaceKey>,

    pub flags: NodeFlags,
}

impl Node {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            active: true,
            surface: None,
            flags: NodeFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Returns the parent node key, if any.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Returns a read-only slice of child node keys.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }
}
