//! Utility Module
//!
//! - [`interner`]: path interning for the hierarchy and binding indices
//!
//! # Path Interning
//!
//! Paths are the only way components address nodes, so they are hashed and
//! compared constantly. Interned paths (Symbols) compare in O(1).
//!
//! ```rust,ignore
//! use rigfuse::utils::interner::PathInterner;
//!
//! let mut interner = PathInterner::new();
//! let a = interner.intern("Armature/Hips");
//! let b = interner.intern("Armature/Hips");
//! assert_eq!(a, b); // O(1) comparison
//! ```

pub mod interner;

pub use interner::{PathInterner, Symbol, join_path};
