//! Path String Interner
//!
//! Turns hierarchy paths into compact integer [`Symbol`]s so that lookups in
//! the path and binding indices hash a `u32` instead of a full path string.
//!
//! Unlike a process-wide interner, a [`PathInterner`] is owned by the index
//! that created it. Symbols are only meaningful for the interner that issued
//! them and become stale together with it when the index is rebuilt.

use lasso::{Rodeo, Spur};

/// Symbol type alias
///
/// A Symbol is a compact integer identifier for an interned path.
pub type Symbol = Spur;

#[derive(Debug, Default)]
pub struct PathInterner {
    rodeo: Rodeo,
}

impl PathInterner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rodeo: Rodeo::new(),
        }
    }

    /// Interns a path, returning the existing Symbol if it is already known.
    #[inline]
    pub fn intern(&mut self, path: &str) -> Symbol {
        self.rodeo.get_or_intern(path)
    }

    /// Looks up a path without allocating.
    #[inline]
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Symbol> {
        self.rodeo.get(path)
    }

    /// Resolves a Symbol back to its path.
    ///
    /// # Panics
    /// Panics if the Symbol was issued by a different interner.
    #[inline]
    #[must_use]
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.rodeo.resolve(&sym)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

/// Joins a parent path and a child name with `/`. The root path is empty.
#[must_use]
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        let mut path = String::with_capacity(parent.len() + name.len() + 1);
        path.push_str(parent);
        path.push('/');
        path.push_str(name);
        path
    }
}
