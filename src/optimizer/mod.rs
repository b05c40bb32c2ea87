//! Optimizer Module
//!
//! The merge-eligibility and fusion pipeline behind [`Optimizer::run`].
//!
//! # Pipeline
//!
//! 1. **Paths**: [`PathIndex`] addresses every node by its `/`-joined path
//! 2. **Layers**: [`StateMachineClassifier`] classifies controller layers;
//!    useless layers are removed and foldable ones folded
//! 3. **Bindings**: [`AnimationBindingIndex`] indexes every curve of every
//!    clip still referenced by a layer
//! 4. **Eligibility**: [`MergeEligibilityEngine`] buckets candidate surfaces
//!    into merge groups, greedy first-fit in discovery order
//! 5. **Fusion**: [`MeshFusionEngine`] turns each group into one skinned
//!    surface and records where every animated value went
//! 6. **Codegen**: material variants for shader-toggle groups, the only
//!    parallel region of the run
//! 7. **Rewrite**: [`AnimationRewriteEngine`] replays the recorded moves over
//!    every referenced clip
//!
//! All structural mutation is single-threaded. Indices are rebuilt after the
//! structural edits, never patched in place.

pub mod binding_index;
pub mod classifier;
pub mod collaborators;
pub mod context;
pub mod eligibility;
pub mod fusion;
pub mod layer_fold;
pub mod path_index;
pub mod rewrite;

pub use binding_index::{AnimationBindingIndex, CurveEntry};
pub use classifier::{LayerClassification, MultiValueToggle, SingleToggle, StateMachineClassifier};
pub use collaborators::{
    DeclaredMaterialAnalyzer, MaterialAnalyzer, PropertyArrayCodegen, ShaderCodegen, ToggleProperty, VariantRequest,
};
pub use context::OptimizationContext;
pub use eligibility::{JoinVerdict, MergeEligibilityEngine, MergeGroup};
pub use fusion::{FusionOutcome, MeshFusionEngine, TechniqueRecord, ToggleTechnique};
pub use path_index::PathIndex;
pub use rewrite::{AnimationRewriteEngine, RendererMove, RewriteRule, RewriteTable, RewriteTarget, ValueMap};

use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::assets::{AssetHandle, AssetPayload, AssetSink, MemoryAssetStore};
use crate::errors::Result;
use crate::resources::Material;
use crate::scene::{ClipKey, Model, SurfaceKey};
use crate::settings::OptimizerSettings;

const COMPONENT: &str = "Optimizer";

/// A merge group as reported after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    /// Member surface paths in discovery order.
    pub members: Vec<String>,
    /// Path of the fused surface; `None` for groups of one.
    pub fused_path: Option<String>,
    pub shader_toggle: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerReport {
    pub controller: String,
    pub layer: String,
    pub classification: LayerClassification,
}

/// Everything a late consumer of the run needs besides the model itself.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub rules: Vec<RewriteRule>,
    /// `(old path, old slot) → (new path, new slot)`, sorted by old path.
    pub slot_remap: Vec<((String, usize), (String, usize))>,
    pub techniques: Vec<TechniqueRecord>,
    pub groups: Vec<GroupReport>,
    /// Layers as they are after folding.
    pub layers: Vec<LayerReport>,
    pub assets: Vec<AssetHandle>,
    /// `"[Component] message"` lines.
    pub diagnostics: Vec<String>,
}

/// Output of [`Optimizer::run`].
#[derive(Debug)]
pub struct OptimizedModel {
    pub model: Model,
    pub report: RunReport,
}

/// Entry point of the pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use rigfuse::{Optimizer, OptimizerSettings};
///
/// let mut optimizer = Optimizer::new(OptimizerSettings::default());
/// let optimized = optimizer.run(model)?;
/// for line in &optimized.report.diagnostics {
///     println!("{line}");
/// }
/// ```
pub struct Optimizer {
    settings: OptimizerSettings,
    analyzer: Box<dyn MaterialAnalyzer>,
    codegen: Box<dyn ShaderCodegen>,
    sink: Arc<dyn AssetSink>,
    context: OptimizationContext,
}

impl Optimizer {
    /// Creates an optimizer with the declared-traits analyzer, the property
    /// array codegen and an in-memory asset store.
    #[must_use]
    pub fn new(settings: OptimizerSettings) -> Self {
        Self {
            settings,
            analyzer: Box::new(DeclaredMaterialAnalyzer),
            codegen: Box::new(PropertyArrayCodegen),
            sink: Arc::new(MemoryAssetStore::new()),
            context: OptimizationContext::new(),
        }
    }

    #[must_use]
    pub fn with_analyzer(mut self, analyzer: impl MaterialAnalyzer + 'static) -> Self {
        self.analyzer = Box::new(analyzer);
        self
    }

    #[must_use]
    pub fn with_codegen(mut self, codegen: impl ShaderCodegen + 'static) -> Self {
        self.codegen = Box::new(codegen);
        self
    }

    #[must_use]
    pub fn with_asset_sink(mut self, sink: Arc<dyn AssetSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Context of the last run.
    #[must_use]
    pub fn context(&self) -> &OptimizationContext {
        &self.context
    }

    /// Runs the whole pipeline over `model`.
    ///
    /// On error the model is lost; callers keep their original asset as the
    /// source of truth.
    pub fn run(&mut self, mut model: Model) -> Result<OptimizedModel> {
        self.context.clear();
        model.validate()?;

        let settings = &self.settings;
        let ctx = &mut self.context;
        let mut report = RunReport::default();

        // === Paths ===
        let paths = PathIndex::build(&model);
        for path in paths.duplicates() {
            ctx.warn(COMPONENT, format!("duplicate path '{path}', later nodes are not addressable"));
        }

        // === Layers ===
        let mut classifier = StateMachineClassifier::new(settings);
        let mut live_clips: Vec<ClipKey> = Vec::new();
        for index in 0..model.controllers.len() {
            let classes = classifier.classify_controller(&model, &paths, index).to_vec();
            let classes = if settings.fold_layers {
                layer_fold::fold_controller(&mut model, &paths, index, &classes, ctx)
            } else {
                classes
            };
            let controller = &model.controllers[index];
            for (layer, classification) in controller.layers.iter().zip(classes) {
                if classification != LayerClassification::Useless {
                    live_clips.extend(layer.referenced_clips());
                }
                if let Some(reasons) = classification.reasons() {
                    let reasons: Vec<&str> = reasons.iter().map(String::as_str).collect();
                    ctx.debug(
                        COMPONENT,
                        format!("layer '{}' is not mergeable: {}", layer.name, reasons.join(", ")),
                    );
                }
                report.layers.push(LayerReport {
                    controller: controller.name.clone(),
                    layer: layer.name.clone(),
                    classification,
                });
            }
        }

        // === Bindings & eligibility ===
        let bindings = AnimationBindingIndex::build(&model, live_clips);
        let swap_materials = eligibility::collect_swap_materials(&model, &paths, &bindings);
        let (groups, nan_legal) = {
            let mut engine = MergeEligibilityEngine::new(
                &model,
                &paths,
                &bindings,
                settings,
                self.analyzer.as_ref(),
                &swap_materials,
            );
            let candidates = engine.candidates(ctx);
            let nan_legal: FxHashSet<SurfaceKey> =
                candidates.iter().copied().filter(|k| engine.nanimation_legal(*k)).collect();
            (engine.partition(&candidates, ctx), nan_legal)
        };
        ctx.swap_materials = swap_materials;

        // === Fusion ===
        let mut fusion = MeshFusionEngine::new(&paths, &bindings, settings);
        let mut outcomes: Vec<FusionOutcome> = Vec::new();
        let mut changed_meshes: Vec<SurfaceKey> = Vec::new();
        for group in &groups {
            let members: Vec<String> = group
                .members
                .iter()
                .filter_map(|k| model.surfaces.get(*k))
                .filter_map(|s| paths.path_of(s.node))
                .map(str::to_string)
                .collect();

            let fused_path = if group.is_singleton() {
                if fusion.optimize_singleton(&mut model, group.members[0], ctx) {
                    changed_meshes.push(group.members[0]);
                }
                None
            } else if let Some(outcome) = fusion.fuse(&mut model, group, &nan_legal, ctx) {
                let path = outcome.host_path.clone();
                changed_meshes.push(outcome.surface);
                outcomes.push(outcome);
                Some(path)
            } else {
                ctx.warn(COMPONENT, format!("group {members:?} lost its members before fusion"));
                None
            };

            report.groups.push(GroupReport {
                members,
                fused_path,
                shader_toggle: group.shader_toggle,
            });
        }

        // === Codegen ===
        let requests: Vec<(SurfaceKey, &VariantRequest)> = outcomes
            .iter()
            .flat_map(|o| o.variants.iter().map(move |v| (o.surface, v)))
            .collect();
        let codegen = self.codegen.as_ref();
        let generate = |(surface, request): &(SurfaceKey, &VariantRequest)| {
            codegen.generate(request).map(|m| (*surface, request.slot, m))
        };
        let generated: Vec<Result<(SurfaceKey, usize, Material)>> = if settings.parallel_codegen {
            requests.par_iter().map(generate).collect()
        } else {
            requests.iter().map(generate).collect()
        };
        for result in generated {
            let (surface, slot, material) = result?;
            let name = material.name.clone();
            let key = model.add_material(material.clone());
            if let Some(slot) = model.surfaces.get_mut(surface).and_then(|s| s.materials.get_mut(slot)) {
                *slot = Some(key);
            }
            report.assets.push(self.sink.write_asset(AssetPayload::Material(material), &name)?);
        }

        // === Rewrite ===
        let paths = PathIndex::build(&model);
        let clips: Vec<ClipKey> = model
            .controllers
            .iter()
            .flat_map(|c| c.referenced_clips())
            .collect();
        let rules = std::mem::take(&mut ctx.rules);
        let mut written = AnimationRewriteEngine::new(&rules, &paths).rewrite_model(&mut model, &clips, ctx);
        ctx.rules = rules;
        for clip in &ctx.generated_clips {
            if !written.contains(clip) {
                written.push(*clip);
            }
        }

        // === Persistence ===
        for key in written {
            if let Some(clip) = model.clips.get(key) {
                let name = clip.name.clone();
                report.assets.push(self.sink.write_asset(AssetPayload::Clip(clip.clone()), &name)?);
            }
        }
        for key in changed_meshes {
            if let Some(surface) = model.surfaces.get(key) {
                let name = surface.mesh.name.clone();
                report.assets.push(self.sink.write_asset(AssetPayload::Mesh(surface.mesh.clone()), &name)?);
            }
        }

        ctx.info(
            COMPONENT,
            format!(
                "{} merge groups, {} fused surfaces, {} rewrite rules, {} assets written",
                groups.len(),
                outcomes.len(),
                ctx.rules.len(),
                report.assets.len()
            ),
        );

        report.rules = ctx.rules.rules();
        let mut slot_remap: Vec<_> = ctx
            .rules
            .slot_remap()
            .iter()
            .map(|(from, to)| (from.clone(), to.clone()))
            .collect();
        slot_remap.sort();
        report.slot_remap = slot_remap;
        report.techniques = ctx.techniques.clone();
        report.diagnostics = ctx.diagnostics().to_vec();

        Ok(OptimizedModel { model, report })
    }
}
