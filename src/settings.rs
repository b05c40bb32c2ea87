//! Optimizer Settings
//!
//! This module defines the knobs of one optimization run.
//!
//! Every switch only ever *removes* opportunities: turning a feature off can
//! make the output larger, never different in behavior. The defaults enable
//! everything the engine can prove exact.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rigfuse::{Optimizer, OptimizerSettings};
//!
//! // Default: every merge technique enabled
//! let settings = OptimizerSettings::default();
//!
//! // Conservative: geometry-only merges, never generate material variants
//! let settings = OptimizerSettings {
//!     allow_shader_toggle: false,
//!     allow_nanimation: false,
//!     ..Default::default()
//! };
//!
//! // From a host build configuration
//! let settings = OptimizerSettings::from_json_str(r#"{ "fold_layers": false }"#)?;
//!
//! let output = Optimizer::new(settings).run(model)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Tolerance used when comparing normalized blend-shape ratio vectors.
pub const RATIO_TOLERANCE: f32 = 0.01;

/// Configuration of one optimization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Master switch for surface merging.
    pub merge_surfaces: bool,

    /// Whether static (non-skinned) surfaces are merge candidates. A static
    /// surface that joins a group is converted into a skinned one.
    pub merge_static_surfaces: bool,

    /// Require equal default-enabled state (`enabled && activeInHierarchy`)
    /// before two surfaces may share a group.
    ///
    /// When disabled, a differing default state is reproduced through the
    /// toggle technique of the disabled surface instead.
    pub require_same_default_enabled: bool,

    /// Allow the shader-toggle fallback: keep per-surface property variants
    /// resident in the fused material and select them by a per-instance
    /// constant when exact animation congruence fails.
    pub allow_shader_toggle: bool,

    /// Allow the NaN-poisoned off-switch bone technique for surfaces whose
    /// only animation is their enabled/active state.
    pub allow_nanimation: bool,

    /// Fold mergeable animation layers into one generated layer.
    pub fold_layers: bool,

    /// Layers with an index below this value are never merged.
    pub reserved_layer_count: usize,

    /// Merge blend shapes that are always animated in a constant ratio.
    pub merge_blend_shapes_by_ratio: bool,

    /// Bake or remove blend shapes that no clip ever animates.
    pub freeze_static_blend_shapes: bool,

    /// Node paths whose whole subtree is excluded from merging.
    pub excluded_paths: Vec<String>,

    /// Run shader/material codegen for merge groups on the rayon pool.
    pub parallel_codegen: bool,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            merge_surfaces: true,
            merge_static_surfaces: true,
            require_same_default_enabled: true,
            allow_shader_toggle: true,
            allow_nanimation: true,
            fold_layers: true,
            reserved_layer_count: 3,
            merge_blend_shapes_by_ratio: true,
            freeze_static_blend_shapes: true,
            excluded_paths: Vec::new(),
            parallel_codegen: true,
        }
    }
}

impl OptimizerSettings {
    /// Parses settings from a JSON document. Missing fields take their
    /// default value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns `true` if `path` equals or lies below an excluded path.
    #[must_use]
    pub fn is_path_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|excluded| {
            path == excluded
                || (path.starts_with(excluded.as_str())
                    && path.as_bytes().get(excluded.len()) == Some(&b'/'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings =
            OptimizerSettings::from_json_str(r#"{ "fold_layers": false, "reserved_layer_count": 1 }"#)
                .unwrap();
        assert!(!settings.fold_layers);
        assert_eq!(settings.reserved_layer_count, 1);
        assert!(settings.merge_surfaces);
        assert!(settings.allow_nanimation);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(OptimizerSettings::from_json_str("{ merge_surfaces: ").is_err());
    }

    #[test]
    fn excluded_paths_cover_subtrees_only() {
        let settings = OptimizerSettings {
            excluded_paths: vec!["Body/Hair".to_string()],
            ..Default::default()
        };
        assert!(settings.is_path_excluded("Body/Hair"));
        assert!(settings.is_path_excluded("Body/Hair/Front"));
        assert!(!settings.is_path_excluded("Body/HairClip"));
        assert!(!settings.is_path_excluded("Body"));
    }
}
