//! End-to-End Pipeline Tests
//!
//! Tests for:
//! - A toggled accessory fused into the body through the off-switch bone
//! - Shader-toggle groups and generated material variants
//! - Every toggle technique keeps each source surface's visibility
//! - Dangling controller data is tolerated
//! - Fatal errors: invalid models, failing collaborators
//! - Settings loaded from JSON

mod common;

use std::sync::Arc;

use glam::Mat4;

use rigfuse::animation::{
    AnimationClip, Condition, ConditionMode, CurveBinding, Layer, Motion, State, StateMachine, TargetKind, Transition,
    property,
};
use rigfuse::assets::{AssetHandle, AssetKind, AssetPayload, AssetSink, MemoryAssetStore};
use rigfuse::optimizer::fusion::toggles::{active_property, enabled_property};
use rigfuse::optimizer::layer_fold::FOLDED_LAYER_NAME;
use rigfuse::optimizer::{
    MaterialAnalyzer, OptimizedModel, PathIndex, ShaderCodegen, TechniqueRecord, ToggleTechnique, ValueMap,
    VariantRequest,
};
use rigfuse::resources::Material;
use rigfuse::scene::{Model, Node, NodeKey};
use rigfuse::{Optimizer, OptimizerError, OptimizerSettings, Result};

use common::{
    active_clip, add_skinned, add_static, bool_param, controller_with, int_param, material, single_toggle_layer,
    step_curve,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Body (skinned to Hips) and Hat (static), both on one material. A layer
/// toggles Hat through `HatOn`.
fn avatar_with_hat() -> Model {
    let mut model = Model::new("Avatar");
    let root = model.root();
    let hips = model.add_node(Node::new("Hips"), root);
    let skin = material(&mut model, "Skin");
    add_skinned(&mut model, root, "Body", skin, &[(hips, Mat4::IDENTITY)]);
    add_static(&mut model, root, "Hat", skin);

    let off = active_clip(&mut model, "Hat Off", "Hat", 0.0);
    let on = active_clip(&mut model, "Hat On", "Hat", 1.0);
    model.controllers.push(controller_with(
        "FX",
        vec![bool_param("HatOn")],
        vec![single_toggle_layer("Hat", "HatOn", off, on)],
    ));
    model
}

fn count(assets: &[AssetHandle], kind: AssetKind) -> usize {
    assets.iter().filter(|a| a.kind == kind).count()
}

// ============================================================================
// Fusion
// ============================================================================

#[test]
fn toggled_hat_is_fused_into_body() {
    init_logger();
    let store = Arc::new(MemoryAssetStore::new());
    let mut optimizer = Optimizer::new(OptimizerSettings::default()).with_asset_sink(store.clone());

    let optimized = optimizer.run(avatar_with_hat()).unwrap();
    let report = &optimized.report;
    let model = &optimized.model;

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].members, vec!["Body", "Hat"]);
    assert_eq!(report.groups[0].fused_path.as_deref(), Some("Body"));
    assert!(!report.groups[0].shader_toggle);
    assert_eq!(model.surfaces.len(), 1);

    let hat = report.techniques.iter().find(|t| t.surface_path == "Hat").unwrap();
    assert_eq!(
        hat.technique,
        ToggleTechnique::NanBone {
            bone_path: "Hat/$$nan_off_1".to_string()
        }
    );

    let rule = report
        .rules
        .iter()
        .find(|r| r.source == CurveBinding::active("Hat"))
        .unwrap();
    assert_eq!(rule.targets[0].binding, CurveBinding::active("Hat"));
    assert_eq!(rule.targets[1].binding.path, "Hat/$$nan_off_1");
    assert_eq!(rule.targets[1].binding.property, property::LOCAL_SCALE[1]);
    assert_eq!(rule.targets[1].map, ValueMap::NanScale);
    assert_eq!(
        report.slot_remap,
        vec![
            (("Body".to_string(), 0), ("Body".to_string(), 0)),
            (("Hat".to_string(), 0), ("Body".to_string(), 1)),
        ]
    );

    // Both toggle clips now also drive the off-switch bone.
    for clip in model.clips.values() {
        let switch = CurveBinding::new("Hat/$$nan_off_1", property::LOCAL_SCALE[1], TargetKind::Transform);
        assert!(clip.float_curve(&switch).is_some(), "'{}' lost its toggle", clip.name);
        assert!(clip.float_curve(&CurveBinding::active("Hat")).is_some());
    }

    assert_eq!(count(&report.assets, AssetKind::Clip), 2);
    assert_eq!(count(&report.assets, AssetKind::Mesh), 1);
    assert_eq!(store.len(), report.assets.len());
    assert!(report.diagnostics.iter().any(|l| l == "[MeshFusion] fused 2 surfaces into 'Body'"));
    assert!(report.layers.iter().any(|l| l.layer == "Hat" && l.classification.is_mergeable()));
}

#[test]
fn disabled_merging_leaves_the_model_alone() {
    init_logger();
    let settings = OptimizerSettings {
        merge_surfaces: false,
        ..OptimizerSettings::default()
    };
    let optimized = Optimizer::new(settings).run(avatar_with_hat()).unwrap();

    assert_eq!(optimized.model.surfaces.len(), 2);
    assert!(optimized.report.groups.is_empty());
    assert!(optimized.report.rules.is_empty());
    assert!(optimized.report.assets.is_empty());
}

#[test]
fn shader_toggle_group_generates_one_variant_per_slot() {
    init_logger();
    let settings = OptimizerSettings {
        allow_nanimation: false,
        ..OptimizerSettings::default()
    };
    let mut optimizer = Optimizer::new(settings);
    let optimized = optimizer.run(avatar_with_hat()).unwrap();
    let report = &optimized.report;
    let model = &optimized.model;

    assert!(report.groups[0].shader_toggle);
    // Hat is toggled, so Body still hosts the fused surface.
    assert_eq!(report.groups[0].fused_path.as_deref(), Some("Body"));
    assert_eq!(count(&report.assets, AssetKind::Material), 2);

    let (_, fused) = model.surfaces.iter().next().unwrap();
    let names: Vec<&str> = fused
        .materials
        .iter()
        .flatten()
        .map(|m| model.materials[*m].name.as_str())
        .collect();
    assert_eq!(names, vec!["Skin #0", "Skin #1"]);

    let hat = report.techniques.iter().find(|t| t.surface_path == "Hat").unwrap();
    assert_eq!(hat.technique, ToggleTechnique::ConstantIndex { index: 1 });
    let rule = report
        .rules
        .iter()
        .find(|r| r.source == CurveBinding::active("Hat"))
        .unwrap();
    assert!(rule.targets.iter().any(|t| t.binding.path == "Body"
        && t.binding.property == property::material("_RigFuseSurfaceActive1", "")));
}

/// Only knows the shaders it was told about.
struct ShaderAllowList(&'static [&'static str]);

impl MaterialAnalyzer for ShaderAllowList {
    fn is_material_mergeable(&self, material: &Material) -> bool {
        self.0.contains(&material.shader.as_str())
    }

    fn supports_mesh_index(&self, _material: &Material) -> bool {
        false
    }
}

#[test]
fn analyzer_decides_which_materials_merge() {
    init_logger();
    let optimized = Optimizer::new(OptimizerSettings::default())
        .with_analyzer(ShaderAllowList(&["Standard"]))
        .run(avatar_with_hat())
        .unwrap();

    assert_eq!(optimized.model.surfaces.len(), 2);
    assert!(optimized.report.groups.is_empty());
    assert!(optimized
        .report
        .diagnostics
        .iter()
        .any(|l| l == "[MergeEligibility] 'Hat' uses unsupported material 'Skin', left unmerged"));
}

// ============================================================================
// Visibility
// ============================================================================

const SAMPLE_TIMES: [f32; 6] = [0.0, 0.5, 1.0, 1.5, 2.0, 3.0];

fn flag(on: bool) -> f32 {
    if on { 1.0 } else { 0.0 }
}

/// Value of `binding` at `time`, or `default` when the clip leaves it alone.
fn value_at(clip: &AnimationClip, binding: &CurveBinding, time: f32, default: f32) -> f32 {
    clip.float_curve(binding)
        .and_then(|track| track.sample(time))
        .unwrap_or(default)
}

/// `node` and every ancestor are active at `time`.
fn active_at(model: &Model, paths: &PathIndex, node: NodeKey, clip: &AnimationClip, time: f32) -> bool {
    std::iter::once(node).chain(model.ancestors(node)).all(|key| {
        let default = model.node(key).is_some_and(|n| n.active);
        match paths.path_of(key) {
            Some(path) => value_at(clip, &CurveBinding::active(path), time, flag(default)) >= 0.5,
            None => default,
        }
    })
}

/// The renderer at `path` draws at `time`: enabled, and active in hierarchy.
fn renderer_visible(model: &Model, paths: &PathIndex, path: &str, clip: &AnimationClip, time: f32) -> bool {
    let node = paths.resolve(path).unwrap();
    let (_, surface) = model.surface_of(node).unwrap();
    let enabled = CurveBinding::renderer_enabled(path, surface.target_kind());
    value_at(clip, &enabled, time, flag(surface.enabled)) >= 0.5 && active_at(model, paths, node, clip, time)
}

/// Whether the part of the fused surface that came from `record` draws.
fn member_visible(model: &Model, paths: &PathIndex, record: &TechniqueRecord, clip: &AnimationClip, time: f32) -> bool {
    if !renderer_visible(model, paths, &record.fused_path, clip, time) {
        return false;
    }
    match &record.technique {
        ToggleTechnique::None | ToggleTechnique::Direct => true,
        ToggleTechnique::NanBone { bone_path } => {
            let bone = paths.resolve(bone_path).unwrap();
            let scale = model.node(bone).unwrap().transform.scale;
            [0, 1].into_iter().all(|axis| {
                let binding = CurveBinding::new(bone_path, property::LOCAL_SCALE[axis], TargetKind::Transform);
                !value_at(clip, &binding, time, scale[axis]).is_nan()
            })
        }
        ToggleTechnique::ConstantIndex { index } => {
            let host = paths.resolve(&record.fused_path).unwrap();
            let (_, fused) = model.surface_of(host).unwrap();
            [enabled_property(*index), active_property(*index)].iter().all(|name| {
                let default = fused
                    .materials
                    .iter()
                    .flatten()
                    .find_map(|m| model.materials[*m].float(name))
                    .unwrap();
                let binding = CurveBinding::new(
                    &record.fused_path,
                    &property::material(name, ""),
                    TargetKind::SkinnedMeshRenderer,
                );
                value_at(clip, &binding, time, default) >= 0.5
            })
        }
    }
}

/// Every source surface draws after the run exactly when it drew before,
/// in every clip and at every sampled time.
fn assert_visibility_preserved(original: &Model, optimized: &OptimizedModel) {
    let before = PathIndex::build(original);
    let after = PathIndex::build(&optimized.model);
    assert!(!optimized.report.techniques.is_empty());

    for record in &optimized.report.techniques {
        for (key, clip) in &original.clips {
            let rewritten = &optimized.model.clips[key];
            for time in SAMPLE_TIMES {
                assert_eq!(
                    renderer_visible(original, &before, &record.surface_path, clip, time),
                    member_visible(&optimized.model, &after, record, rewritten, time),
                    "'{}' ({:?}) in '{}' at {time}s",
                    record.surface_path,
                    record.technique,
                    clip.name
                );
            }
        }
    }
}

fn techniques_of(optimized: &OptimizedModel) -> Vec<ToggleTechnique> {
    optimized.report.techniques.iter().map(|t| t.technique.clone()).collect()
}

#[test]
fn off_switch_bone_keeps_visibility() {
    let original = avatar_with_hat();
    let optimized = Optimizer::new(OptimizerSettings::default())
        .run(original.clone())
        .unwrap();

    assert!(matches!(
        techniques_of(&optimized).as_slice(),
        [ToggleTechnique::None, ToggleTechnique::NanBone { .. }]
    ));
    assert_visibility_preserved(&original, &optimized);
}

#[test]
fn constant_index_keeps_visibility() {
    let original = avatar_with_hat();
    let settings = OptimizerSettings {
        allow_nanimation: false,
        ..OptimizerSettings::default()
    };
    let optimized = Optimizer::new(settings).run(original.clone()).unwrap();

    assert_eq!(
        techniques_of(&optimized),
        vec![ToggleTechnique::None, ToggleTechnique::ConstantIndex { index: 1 }]
    );
    assert_visibility_preserved(&original, &optimized);
}

/// A and B share a toggle that animates both their renderer and their node:
/// shown only while both flags are on.
fn avatar_with_flickering_pair() -> Model {
    let mut model = Model::new("Avatar");
    let root = model.root();
    let skin = material(&mut model, "Skin");
    add_static(&mut model, root, "A", skin);
    add_static(&mut model, root, "B", skin);

    let curves = |enabled: &[f32], active: &[f32]| {
        let times = [0.0, 1.0, 2.0];
        ["A", "B"]
            .into_iter()
            .flat_map(|path| {
                [
                    step_curve(CurveBinding::renderer_enabled(path, TargetKind::MeshRenderer), &times, enabled),
                    step_curve(CurveBinding::active(path), &times, active),
                ]
            })
            .collect::<Vec<_>>()
    };
    let flicker = model.add_clip(AnimationClip::new("Flicker", curves(&[1.0, 0.0, 1.0], &[0.0, 1.0, 1.0]), Vec::new()));
    let shown = model.add_clip(AnimationClip::new("Shown", curves(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]), Vec::new()));
    model.controllers.push(controller_with(
        "FX",
        vec![bool_param("Pair")],
        vec![single_toggle_layer("Pair", "Pair", flicker, shown)],
    ));
    model
}

#[test]
fn direct_toggle_keeps_enabled_and_active_apart() {
    let original = avatar_with_flickering_pair();
    let settings = OptimizerSettings {
        allow_nanimation: false,
        ..OptimizerSettings::default()
    };
    let optimized = Optimizer::new(settings).run(original.clone()).unwrap();
    let report = &optimized.report;

    assert!(!report.groups[0].shader_toggle);
    assert_eq!(report.groups[0].fused_path.as_deref(), Some("$$Merged0"));
    assert_eq!(techniques_of(&optimized), vec![ToggleTechnique::Direct, ToggleTechnique::Direct]);

    // The fused surface is hidden at 0s: enabled but inactive.
    let flicker = optimized.model.clips.values().find(|c| c.name == "Flicker").unwrap();
    let enabled = flicker.float_curve(&CurveBinding::renderer_enabled("$$Merged0", TargetKind::SkinnedMeshRenderer));
    let active = flicker.float_curve(&CurveBinding::active("$$Merged0"));
    assert_eq!(enabled.unwrap().values, vec![1.0, 0.0, 1.0]);
    assert_eq!(active.unwrap().values, vec![0.0, 1.0, 1.0]);

    assert_visibility_preserved(&original, &optimized);
}

#[test]
fn untoggled_member_keeps_visibility() {
    let mut original = Model::new("Avatar");
    let root = original.root();
    let skin = material(&mut original, "Skin");
    add_static(&mut original, root, "A", skin);
    add_static(&mut original, root, "B", skin);
    let sway = original.add_clip(AnimationClip::new(
        "Sway",
        vec![step_curve(
            CurveBinding::new("A", "m_LocalPosition.x", TargetKind::Transform),
            &[0.0, 1.0],
            &[0.0, 0.25],
        )],
        Vec::new(),
    ));
    let state = State::new("Sway").with_motion(Motion::Clip(sway));
    original.controllers.push(controller_with(
        "FX",
        Vec::new(),
        vec![Layer::new("Sway", StateMachine::new(vec![state]))],
    ));

    let optimized = Optimizer::new(OptimizerSettings::default()).run(original.clone()).unwrap();

    assert_eq!(techniques_of(&optimized), vec![ToggleTechnique::None, ToggleTechnique::None]);
    assert_visibility_preserved(&original, &optimized);
}

// ============================================================================
// Dangling controller data
// ============================================================================

#[test]
fn dangling_sync_and_state_references_are_tolerated() {
    let mut model = avatar_with_hat();
    let root = model.root();
    let glasses = material(&mut model, "Glasses");
    add_static(&mut model, root, "Glasses", glasses);
    model.add_node(Node::new("Outfit"), root);
    model.add_node(Node::new("Scarf"), root);
    let glasses_off = active_clip(&mut model, "Glasses Off", "Glasses", 0.0);
    let glasses_on = active_clip(&mut model, "Glasses On", "Glasses", 1.0);
    let scarf_off = active_clip(&mut model, "Scarf Off", "Scarf", 0.0);
    let scarf_on = active_clip(&mut model, "Scarf On", "Scarf", 1.0);

    // Mode 2 leads to a state that does not exist.
    let modes: Vec<State> = (0..3)
        .map(|k| {
            let clip = active_clip(&mut model, &format!("Mode {k}"), "Outfit", (k % 2) as f32);
            State::new(&format!("Mode {k}")).with_motion(Motion::Clip(clip))
        })
        .collect();
    let to = |state: usize, value: f32| Transition::to(state).when(Condition::new(ConditionMode::Equals, "Mode", value));
    let modes = Layer::new(
        "Modes",
        StateMachine::new(modes)
            .with_any_state_transition(to(0, 0.0))
            .with_any_state_transition(to(1, 1.0))
            .with_any_state_transition(to(7, 2.0)),
    );
    // Synced to a layer index past the end.
    let mut follower = single_toggle_layer("Follower", "Scarf", scarf_off, scarf_on);
    follower.synced_layer = Some(42);

    let controller = &mut model.controllers[0];
    controller
        .parameters
        .extend([bool_param("Glasses"), bool_param("Scarf"), int_param("Mode")]);
    controller.layers.extend([
        single_toggle_layer("Glasses", "Glasses", glasses_off, glasses_on),
        modes,
        follower,
    ]);

    let optimized = Optimizer::new(OptimizerSettings::default()).run(model).unwrap();

    assert!(optimized.report.layers.iter().any(|l| l.layer == "Modes"
        && l.classification
            .reasons()
            .is_some_and(|r| r.contains("a transition targets a missing state"))));
    let layers = &optimized.model.controllers[0].layers;
    let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names[3..], ["Modes", "Follower", FOLDED_LAYER_NAME]);
    assert_eq!(layers[4].synced_layer, None);
    assert!(optimized
        .report
        .diagnostics
        .iter()
        .any(|l| l.starts_with("[LayerFolding] layer 'Follower': sync to layer 42 dropped")));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn model_without_root_is_rejected() {
    let mut model = avatar_with_hat();
    let root = model.root();
    model.nodes.remove(root);

    let err = Optimizer::new(OptimizerSettings::default()).run(model).unwrap_err();
    assert!(matches!(err, OptimizerError::MissingRoot));
}

#[test]
fn surface_attached_to_the_wrong_node_is_rejected() {
    let mut model = avatar_with_hat();
    let root = model.root();
    let key = model.surfaces.keys().next().unwrap();
    model.surfaces[key].node = root;

    let err = Optimizer::new(OptimizerSettings::default()).run(model).unwrap_err();
    assert!(matches!(err, OptimizerError::InvalidModel(_)));
}

struct FailingCodegen;

impl ShaderCodegen for FailingCodegen {
    fn generate(&self, request: &VariantRequest) -> Result<Material> {
        Err(OptimizerError::Codegen {
            material: request.material.name.clone(),
            reason: "no template".to_string(),
        })
    }
}

#[test]
fn codegen_failure_aborts_the_run() {
    let settings = OptimizerSettings {
        allow_nanimation: false,
        ..OptimizerSettings::default()
    };
    let err = Optimizer::new(settings)
        .with_codegen(FailingCodegen)
        .run(avatar_with_hat())
        .unwrap_err();
    assert!(matches!(err, OptimizerError::Codegen { ref material, .. } if material == "Skin"));
}

struct ReadOnlySink;

impl AssetSink for ReadOnlySink {
    fn write_asset(&self, _asset: AssetPayload, suggested_name: &str) -> Result<AssetHandle> {
        Err(OptimizerError::AssetWrite {
            name: suggested_name.to_string(),
            reason: "read-only".to_string(),
        })
    }
}

#[test]
fn sink_failure_aborts_the_run() {
    let err = Optimizer::new(OptimizerSettings::default())
        .with_asset_sink(Arc::new(ReadOnlySink))
        .run(avatar_with_hat())
        .unwrap_err();
    assert!(matches!(err, OptimizerError::AssetWrite { .. }));
}

// ============================================================================
// Settings & reuse
// ============================================================================

#[test]
fn settings_from_json_drive_the_run() {
    let settings = OptimizerSettings::from_json_str(r#"{ "excluded_paths": ["Hat"] }"#).unwrap();
    let optimized = Optimizer::new(settings).run(avatar_with_hat()).unwrap();

    assert_eq!(optimized.model.surfaces.len(), 2);
    assert!(optimized.report.groups.iter().all(|g| g.fused_path.is_none()));
    assert!(optimized.report.diagnostics.iter().any(|l| l.contains("'Hat' is excluded")));
}

#[test]
fn context_is_cleared_between_runs() {
    let mut optimizer = Optimizer::new(OptimizerSettings::default());
    let first = optimizer.run(avatar_with_hat()).unwrap();
    let second = optimizer.run(avatar_with_hat()).unwrap();

    assert_eq!(first.report.rules.len(), second.report.rules.len());
    assert_eq!(first.report.diagnostics, second.report.diagnostics);
    assert_eq!(optimizer.context().techniques.len(), 2);
}
