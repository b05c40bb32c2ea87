use rustc_hash::FxHashMap;
use slotmap::SecondaryMap;

use crate::scene::{Model, NodeKey};
use crate::utils::{PathInterner, Symbol, join_path};

/// Bidirectional map between nodes and their `/`-joined paths.
///
/// Valid only while the hierarchy is unchanged. Any structural edit
/// (new node, removed node, renamed node) requires a rebuild.
#[derive(Debug, Default)]
pub struct PathIndex {
    interner: PathInterner,
    nodes: FxHashMap<Symbol, NodeKey>,
    paths: SecondaryMap<NodeKey, Symbol>,
    duplicates: Vec<String>,
}

impl PathIndex {
    /// Walks the hierarchy from the root. The root path is the empty string.
    /// When siblings share a name, the first one in child order owns the
    /// path; the others are unaddressable and listed in `duplicates`.
    #[must_use]
    pub fn build(model: &Model) -> Self {
        let mut index = Self::default();
        let mut stack = vec![(model.root(), String::new())];

        while let Some((key, path)) = stack.pop() {
            let Some(node) = model.node(key) else {
                continue;
            };

            let sym = index.interner.intern(&path);
            if index.nodes.contains_key(&sym) {
                log::warn!("PathIndex: duplicate path '{path}', only the first node is addressable");
                index.duplicates.push(path);
                continue;
            }
            index.nodes.insert(sym, key);
            index.paths.insert(key, sym);

            for &child in node.children().iter().rev() {
                if let Some(c) = model.node(child) {
                    let child_path = if key == model.root() {
                        c.name.clone()
                    } else {
                        join_path(&path, &c.name)
                    };
                    stack.push((child, child_path));
                }
            }
        }
        index
    }

    /// Node addressed by `path`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<NodeKey> {
        let sym = self.interner.get(path)?;
        self.nodes.get(&sym).copied()
    }

    /// Path of `node`, if it is addressable.
    #[must_use]
    pub fn path_of(&self, node: NodeKey) -> Option<&str> {
        self.paths.get(node).map(|sym| self.interner.resolve(*sym))
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Paths that more than one node maps to.
    #[must_use]
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
