use glam::Vec3;
use slotmap::SlotMap;

use crate::animation::{AnimationClip, AnimatorController};
use crate::errors::{OptimizerError, Result};
use crate::resources::Material;
use crate::scene::node::Node;
use crate::scene::surface::Surface;
use crate::scene::{ClipKey, MaterialKey, NodeKey, SurfaceKey};

/// An in-memory character model: the rigid hierarchy plus every asset the
/// optimizer reads or rewrites.
///
/// Model is pure data. Paths are derived from it by `PathIndex`; nothing in
/// here caches derived state, so structural edits never leave stale caches
/// behind in the model itself.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,

    pub nodes: SlotMap<NodeKey, Node>,
    root: NodeKey,

    // ==== Asset pools ====
    pub surfaces: SlotMap<SurfaceKey, Surface>,
    pub materials: SlotMap<MaterialKey, Material>,
    pub clips: SlotMap<ClipKey, AnimationClip>,

    pub controllers: Vec<AnimatorController>,
}

impl Model {
    /// Creates a model with a single root node named after the model.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(name));
        Self {
            name: name.to_string(),
            nodes,
            root,
            surfaces: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            clips: SlotMap::with_key(),
            controllers: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeKey {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    #[inline]
    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    /// Adds `node` as the last child of `parent`.
    pub fn add_node(&mut self, mut node: Node, parent: NodeKey) -> NodeKey {
        node.parent = Some(parent);
        let key = self.nodes.insert(node);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(key);
        }
        key
    }

    /// Attaches a surface to its node, replacing (and returning) any surface
    /// the node already had.
    pub fn attach_surface(&mut self, surface: Surface) -> (SurfaceKey, Option<Surface>) {
        let node = surface.node;
        let key = self.surfaces.insert(surface);
        let previous = self
            .nodes
            .get_mut(node)
            .and_then(|n| n.surface.replace(key))
            .and_then(|old| self.surfaces.remove(old));
        (key, previous)
    }

    /// Detaches and returns the surface of `node`.
    pub fn detach_surface(&mut self, node: NodeKey) -> Option<Surface> {
        let key = self.nodes.get_mut(node)?.surface.take()?;
        self.surfaces.remove(key)
    }

    #[must_use]
    pub fn surface_of(&self, node: NodeKey) -> Option<(SurfaceKey, &Surface)> {
        let key = self.nodes.get(node)?.surface?;
        self.surfaces.get(key).map(|s| (key, s))
    }

    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    pub fn add_clip(&mut self, clip: AnimationClip) -> ClipKey {
        self.clips.insert(clip)
    }

    // ========================================================================
    // Hierarchy queries
    // ========================================================================

    /// Pre-order traversal from the root, children in order. This is the
    /// discovery order every greedy decision in the optimizer follows.
    #[must_use]
    pub fn traverse(&self) -> Vec<NodeKey> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            out.push(key);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Surfaces in discovery order.
    #[must_use]
    pub fn surfaces_in_discovery_order(&self) -> Vec<SurfaceKey> {
        self.traverse()
            .into_iter()
            .filter_map(|n| self.nodes[n].surface)
            .filter(|s| self.surfaces.contains_key(*s))
            .collect()
    }

    /// Strict ancestors of `node`, nearest first.
    pub fn ancestors(&self, node: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        std::iter::from_fn(move || {
            let key = current?;
            current = self.nodes.get(key).and_then(|n| n.parent);
            Some(key)
        })
    }

    /// `true` if `ancestor` is a strict ancestor of `node`.
    #[must_use]
    pub fn is_descendant_of(&self, node: NodeKey, ancestor: NodeKey) -> bool {
        self.ancestors(node).any(|a| a == ancestor)
    }

    /// `enabled`-style hierarchy activity: the node and every ancestor are
    /// active.
    #[must_use]
    pub fn active_in_hierarchy(&self, node: NodeKey) -> bool {
        self.nodes.get(node).is_some_and(|n| n.active)
            && self.ancestors(node).all(|a| self.nodes[a].active)
    }

    /// Component-wise product of local scales up to the root. The sign of
    /// each axis tells whether the accumulated transform mirrors that axis.
    #[must_use]
    pub fn lossy_scale(&self, node: NodeKey) -> Vec3 {
        std::iter::once(node)
            .chain(self.ancestors(node))
            .filter_map(|k| self.nodes.get(k))
            .fold(Vec3::ONE, |acc, n| acc * n.transform.scale)
    }

    /// Deepest node that is `node` itself or an ancestor of every node in
    /// `nodes`.
    #[must_use]
    pub fn lowest_common_ancestor(&self, nodes: &[NodeKey]) -> NodeKey {
        let Some((&first, rest)) = nodes.split_first() else {
            return self.root;
        };
        let mut chain: Vec<NodeKey> = std::iter::once(first).chain(self.ancestors(first)).collect();
        for &other in rest {
            let other_chain: Vec<NodeKey> =
                std::iter::once(other).chain(self.ancestors(other)).collect();
            chain.retain(|k| other_chain.contains(k));
        }
        chain.first().copied().unwrap_or(self.root)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Checks the invariants the optimizer relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.nodes.contains_key(self.root) {
            return Err(OptimizerError::MissingRoot);
        }
        for (key, node) in &self.nodes {
            for &child in &node.children {
                match self.nodes.get(child) {
                    Some(c) if c.parent == Some(key) => {}
                    _ => {
                        return Err(OptimizerError::InvalidModel(format!(
                            "node '{}' lists a child that does not point back to it",
                            node.name
                        )));
                    }
                }
            }
            if let Some(surface) = node.surface {
                match self.surfaces.get(surface) {
                    Some(s) if s.node == key => {}
                    _ => {
                        return Err(OptimizerError::InvalidModel(format!(
                            "node '{}' references a surface that is not attached to it",
                            node.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
