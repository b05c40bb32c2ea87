#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::float_cmp)]

pub mod animation;
pub mod assets;
pub mod errors;
pub mod optimizer;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod utils;

pub use animation::{AnimationClip, AnimatorController, CurveBinding, KeyframeTrack, TargetKind};
pub use assets::{AssetHandle, AssetKind, AssetPayload, AssetSink, MemoryAssetStore};
pub use errors::{OptimizerError, Result};
pub use optimizer::{
    LayerClassification, MaterialAnalyzer, OptimizationContext, OptimizedModel, Optimizer, RunReport, ShaderCodegen,
    TechniqueRecord, ToggleTechnique,
};
pub use resources::{BlendShape, Material, MeshData};
pub use scene::{Model, Node, RendererKind, Surface};
pub use settings::OptimizerSettings;
pub use utils::interner;
