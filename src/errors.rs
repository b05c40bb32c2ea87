//! Error Types
//!
//! This module defines the fatal error type of an optimization run.
//!
//! # Overview
//!
//! Only conditions that make the whole run meaningless are errors:
//! - The model has no root node or is internally inconsistent
//! - The persistence collaborator refused to write an asset
//! - The shader codegen collaborator failed for a decided merge group
//! - The settings document could not be parsed
//!
//! Structural defects in authored content (out-of-range bone indices,
//! missing bind poses, dangling rewrite targets) are *not* errors. They are
//! clamped, logged, and reported through the run's diagnostics.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rigfuse::errors::{OptimizerError, Result};
//!
//! fn write_outputs() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The fatal error type for an optimization run.
///
/// When [`Optimizer::run`](crate::Optimizer::run) returns one of these, the
/// partially mutated model has already been consumed; the caller should fall
/// back to its original, unmodified asset.
#[derive(Error, Debug)]
pub enum OptimizerError {
    // ========================================================================
    // Model Errors
    // ========================================================================
    /// The model has no root node.
    #[error("Model has no root node")]
    MissingRoot,

    /// The model violates one of its own structural invariants.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// The asset sink failed to persist an object.
    #[error("Failed to write asset '{name}': {reason}")]
    AssetWrite {
        /// Suggested name of the asset being written
        name: String,
        /// Reason reported by the sink
        reason: String,
    },

    /// The shader codegen collaborator failed for a merge group.
    #[error("Material codegen failed for '{material}': {reason}")]
    Codegen {
        /// Name of the source material
        material: String,
        /// Reason reported by the collaborator
        reason: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings JSON parsing error.
    #[error("Settings parse error: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Alias for `Result<T, OptimizerError>`.
pub type Result<T> = std::result::Result<T, OptimizerError>;
