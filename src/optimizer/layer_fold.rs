//! Folds mergeable controller layers into one generated layer.
//!
//! The generated layer has a single state playing a Direct blend tree. Each
//! folded layer becomes one child driven by a constant-1 parameter: toggles
//! turn into 1D blend trees over their (now float) parameter, passthrough
//! layers contribute their blend tree unchanged.

use std::collections::BTreeSet;

use crate::animation::{
    AnimationClip, AnimatorController, BlendTree, BlendTreeKind, ChildMotion, Condition,
    ConditionMode, CurveBinding, FloatCurve, KeyframeTrack, Layer, Motion, Parameter,
    ParameterKind, State, StateMachine,
};
use crate::optimizer::classifier::{LayerClassification, layer_properties, state_properties};
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::path_index::PathIndex;
use crate::scene::Model;

pub const FOLDED_LAYER_NAME: &str = "$$Folded Layers";
pub const CONSTANT_ONE_PARAMETER: &str = "$$One";

const COMPONENT: &str = "LayerFolding";

/// Removes useless layers and folds foldable ones of
/// `model.controllers[controller_index]`.
///
/// Returns the classifications re-aligned with the resulting layer list; the
/// generated layer is reported as a blend tree passthrough.
pub fn fold_controller(
    model: &mut Model,
    paths: &PathIndex,
    controller_index: usize,
    classes: &[LayerClassification],
    ctx: &mut OptimizationContext,
) -> Vec<LayerClassification> {
    let Some(mut controller) = model.controllers.get(controller_index).cloned() else {
        return classes.to_vec();
    };

    let mergeable = classes.iter().filter(|c| c.is_mergeable()).count();
    if mergeable < 2 {
        ctx.debug(
            COMPONENT,
            format!("'{}': {mergeable} mergeable layer(s), nothing to fold", controller.name),
        );
        return classes.to_vec();
    }

    let useless: Vec<bool> = classes
        .iter()
        .map(|c| matches!(c, LayerClassification::Useless))
        .collect();
    let props: Vec<BTreeSet<CurveBinding>> = controller
        .layers
        .iter()
        .map(|l| layer_properties(model, l))
        .collect();

    let mut folded: Vec<bool> = classes
        .iter()
        .map(|c| {
            matches!(
                c,
                LayerClassification::SingleToggle(_)
                    | LayerClassification::MultiValueToggle(_)
                    | LayerClassification::BlendTreePassthrough { motion_time: false }
            )
        })
        .collect();

    for i in 0..folded.len() {
        if !folded[i] {
            continue;
        }
        if let Some(p) = toggle_parameter(&classes[i])
            && parameter_used_with_not_equal(&controller, p, i)
        {
            folded[i] = false;
            ctx.debug(
                COMPONENT,
                format!("layer '{}' kept: parameter {p} is compared with NotEqual", controller.layers[i].name),
            );
            continue;
        }
        let overlaps = (0..props.len())
            .filter(|&j| j != i && !useless[j])
            .any(|j| !props[i].is_disjoint(&props[j]));
        if overlaps {
            folded[i] = false;
            ctx.debug(
                COMPONENT,
                format!("layer '{}' kept: animates properties shared with another layer", controller.layers[i].name),
            );
        }
    }

    let folded_count = folded.iter().filter(|f| **f).count();
    if folded_count < 2 {
        folded.iter_mut().for_each(|f| *f = false);
    }

    // Build the generated layer before the source layers are dropped.
    let mut children = Vec::with_capacity(folded_count);
    let mut toggle_parameters = BTreeSet::new();
    for (i, class) in classes.iter().enumerate() {
        if !folded[i] {
            continue;
        }
        let layer = &controller.layers[i];
        let motion = match class {
            LayerClassification::SingleToggle(toggle) => {
                let off = completed_motion(model, paths, ctx, layer, toggle.off_state, toggle.on_state);
                let on = completed_motion(model, paths, ctx, layer, toggle.on_state, toggle.off_state);
                off.zip(on).map(|(off, on)| {
                    toggle_parameters.insert(toggle.parameter.clone());
                    Motion::BlendTree(BlendTree::simple_1d(
                        &layer.name,
                        &toggle.parameter,
                        vec![(off, 0.0), (on, 1.0)],
                    ))
                })
            }
            LayerClassification::MultiValueToggle(toggle) => {
                let motions: Option<Vec<(Motion, f32)>> = toggle
                    .states
                    .iter()
                    .enumerate()
                    .map(|(value, &state)| {
                        completed_motion(model, paths, ctx, layer, state, state).map(|m| (m, value as f32))
                    })
                    .collect();
                motions.map(|motions| {
                    toggle_parameters.insert(toggle.parameter.clone());
                    Motion::BlendTree(BlendTree::simple_1d(&layer.name, &toggle.parameter, motions))
                })
            }
            _ => layer.state_machine.states.first().and_then(|s| s.motion.clone()),
        };
        let Some(motion) = motion else {
            folded[i] = false;
            ctx.warn(COMPONENT, format!("layer '{}' kept: it names a missing state", layer.name));
            continue;
        };
        children.push(ChildMotion {
            motion,
            threshold: 0.0,
            direct_parameter: Some(CONSTANT_ONE_PARAMETER.to_string()),
        });
    }
    let folded_count = children.len();

    for name in &toggle_parameters {
        if let Some(p) = controller.parameter_mut(name) {
            p.kind = ParameterKind::Float;
        }
    }
    if folded_count > 0 && controller.parameter(CONSTANT_ONE_PARAMETER).is_none() {
        controller
            .parameters
            .push(Parameter::new(CONSTANT_ONE_PARAMETER, ParameterKind::Float, 1.0));
    }

    // Reassemble the layer list.
    let layer_count = controller.layers.len();
    let mut remap = vec![None; layer_count];
    let mut layers = Vec::with_capacity(layer_count);
    let mut new_classes = Vec::with_capacity(layer_count);
    for (i, layer) in std::mem::take(&mut controller.layers).into_iter().enumerate() {
        if useless[i] || folded[i] {
            continue;
        }
        remap[i] = Some(layers.len());
        layers.push(layer);
        new_classes.push(classes[i].clone());
    }
    for layer in &mut layers {
        for transition in layer.state_machine.transitions_mut() {
            transition.conditions = std::mem::take(&mut transition.conditions)
                .into_iter()
                .flat_map(|c| float_conditions(c, &toggle_parameters))
                .collect();
        }
        if let Some(synced) = layer.synced_layer {
            layer.synced_layer = remap.get(synced).copied().flatten();
            if layer.synced_layer.is_none() {
                ctx.warn(
                    COMPONENT,
                    format!("layer '{}': sync to layer {synced} dropped, that layer is gone", layer.name),
                );
            }
        }
    }
    if folded_count > 0 {
        let tree = BlendTree {
            name: FOLDED_LAYER_NAME.to_string(),
            kind: BlendTreeKind::Direct,
            parameter: None,
            children,
        };
        let state = State::new(FOLDED_LAYER_NAME).with_motion(Motion::BlendTree(tree));
        layers.push(Layer::new(FOLDED_LAYER_NAME, StateMachine::new(vec![state])));
        new_classes.push(LayerClassification::BlendTreePassthrough { motion_time: false });
    }

    let removed = useless.iter().filter(|u| **u).count();
    ctx.info(
        COMPONENT,
        format!(
            "'{}': folded {} layer(s), removed {removed} useless layer(s)",
            controller.name,
            folded_count
        ),
    );

    controller.layers = layers;
    model.controllers[controller_index] = controller;
    new_classes
}

fn toggle_parameter(class: &LayerClassification) -> Option<&str> {
    match class {
        LayerClassification::SingleToggle(t) => Some(&t.parameter),
        LayerClassification::MultiValueToggle(t) => Some(&t.parameter),
        _ => None,
    }
}

fn parameter_used_with_not_equal(controller: &AnimatorController, parameter: &str, except: usize) -> bool {
    controller
        .layers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != except)
        .flat_map(|(_, l)| l.state_machine.transitions())
        .flat_map(|t| t.conditions.iter())
        .any(|c| c.mode == ConditionMode::NotEqual && c.parameter == parameter)
}

/// Rewrites a condition on a parameter that became a float.
fn float_conditions(condition: Condition, converted: &BTreeSet<String>) -> Vec<Condition> {
    if !converted.contains(&condition.parameter) {
        return vec![condition];
    }
    let p = condition.parameter.as_str();
    match condition.mode {
        ConditionMode::If => vec![Condition::new(ConditionMode::Greater, p, 0.5)],
        ConditionMode::IfNot => vec![Condition::new(ConditionMode::Less, p, 0.5)],
        ConditionMode::Equals => vec![
            Condition::new(ConditionMode::Greater, p, condition.threshold - 0.5),
            Condition::new(ConditionMode::Less, p, condition.threshold + 0.5),
        ],
        _ => vec![condition],
    }
}

/// Motion of `state`, plus constant default curves for every toggle
/// property that `other` animates and `state` does not. `None` when `state`
/// is not a state of `layer`.
fn completed_motion(
    model: &mut Model,
    paths: &PathIndex,
    ctx: &mut OptimizationContext,
    layer: &Layer,
    state: usize,
    other: usize,
) -> Option<Motion> {
    let states = &layer.state_machine.states;
    let source = states.get(state)?;
    let own = state_properties(model, source);
    let missing: Vec<CurveBinding> = states
        .get(other)
        .map(|s| state_properties(model, s))
        .unwrap_or_default()
        .into_iter()
        .filter(|b| !own.contains(b))
        .collect();

    if missing.is_empty()
        && let Some(motion) = &source.motion
    {
        return Some(motion.clone());
    }

    let (mut floats, objects) = match &source.motion {
        Some(Motion::Clip(key)) => model
            .clips
            .get(*key)
            .map(|c| (c.float_curves.clone(), c.object_curves.clone()))
            .unwrap_or_default(),
        Some(motion @ Motion::BlendTree(_)) => return Some(motion.clone()),
        None => (Vec::new(), Vec::new()),
    };
    for binding in missing {
        if let Some(value) = default_value(model, paths, &binding) {
            floats.push(FloatCurve {
                binding,
                track: KeyframeTrack::constant(value),
            });
        }
    }

    let clip = AnimationClip::new(&format!("{} {} (completed)", layer.name, source.name), floats, objects);
    let key = model.add_clip(clip);
    ctx.generated_clips.push(key);
    Some(Motion::Clip(key))
}

/// Design-time value of a toggle property.
fn default_value(model: &Model, paths: &PathIndex, binding: &CurveBinding) -> Option<f32> {
    let node = paths.resolve(&binding.path)?;
    let as_float = |b: bool| if b { 1.0 } else { 0.0 };
    if binding.is_active_toggle() {
        return model.node(node).map(|n| as_float(n.active));
    }
    if binding.is_renderer_enabled() {
        return model.surface_of(node).map(|(_, s)| as_float(s.enabled));
    }
    None
}
