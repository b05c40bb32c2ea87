use log::Level;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::optimizer::fusion::TechniqueRecord;
use crate::optimizer::rewrite::RewriteTable;
use crate::scene::{ClipKey, MaterialKey, SurfaceKey};

/// Mutable state shared by every component during one optimization run.
///
/// Owned by the [`Optimizer`](crate::optimizer::Optimizer) and cleared at
/// the start of each run. Derived indices (`PathIndex`,
/// `AnimationBindingIndex`) are not stored here: they are rebuilt by the
/// pipeline whenever the model changes structurally.
#[derive(Debug, Default)]
pub struct OptimizationContext {
    /// Rewrite rules, renderer moves and the slot remap.
    pub rules: RewriteTable,
    /// How each fused source surface keeps its own visibility.
    pub techniques: Vec<TechniqueRecord>,
    /// Materials each surface can show: its slots plus every material an
    /// object curve swaps in.
    pub swap_materials: FxHashMap<SurfaceKey, SmallVec<[MaterialKey; 4]>>,
    /// Clips created during the run (layer folding completions).
    pub generated_clips: Vec<ClipKey>,
    diagnostics: Vec<String>,
}

impl OptimizationContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything from a previous run.
    pub fn clear(&mut self) {
        self.rules.clear();
        self.techniques.clear();
        self.swap_materials.clear();
        self.generated_clips.clear();
        self.diagnostics.clear();
    }

    /// Logs `message` and records it as `"[component] message"`.
    pub fn diagnostic(&mut self, level: Level, component: &str, message: impl AsRef<str>) {
        let line = format!("[{component}] {}", message.as_ref());
        log::log!(level, "{line}");
        self.diagnostics.push(line);
    }

    #[inline]
    pub fn info(&mut self, component: &str, message: impl AsRef<str>) {
        self.diagnostic(Level::Info, component, message);
    }

    #[inline]
    pub fn warn(&mut self, component: &str, message: impl AsRef<str>) {
        self.diagnostic(Level::Warn, component, message);
    }

    #[inline]
    pub fn debug(&mut self, component: &str, message: impl AsRef<str>) {
        self.diagnostic(Level::Debug, component, message);
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}
