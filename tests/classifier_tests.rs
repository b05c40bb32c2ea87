//! Layer Classification Tests
//!
//! Tests for:
//! - Single toggle and multi-value toggle detection
//! - Blend tree passthrough and useless layers
//! - Unmergeable reasons (condition modes, parameters, reserved layers)
//! - Synced layers and the classification cache
//! - Folding mergeable layers into one generated layer

mod common;

use rigfuse::animation::{
    BlendTree, Condition, ConditionMode, Layer, Motion, ParameterKind, State, StateMachine, Transition,
};
use rigfuse::optimizer::classifier::{LayerClassification, classify_layer};
use rigfuse::optimizer::layer_fold::{CONSTANT_ONE_PARAMETER, FOLDED_LAYER_NAME, fold_controller};
use rigfuse::optimizer::{OptimizationContext, PathIndex, StateMachineClassifier};
use rigfuse::scene::{Model, Node};
use rigfuse::settings::OptimizerSettings;

use common::{active_clip, bool_param, controller_with, int_param, single_toggle_layer};

fn avatar() -> Model {
    let mut model = Model::new("Avatar");
    let root = model.root();
    for name in ["Hat", "Glasses", "Outfit"] {
        model.add_node(Node::new(name), root);
    }
    model
}

fn reasons(class: &LayerClassification) -> Vec<String> {
    class.reasons().map(|r| r.iter().cloned().collect()).unwrap_or_default()
}

// ============================================================================
// Shapes
// ============================================================================

#[test]
fn two_state_bool_toggle_is_single_toggle() {
    let mut model = avatar();
    let off = active_clip(&mut model, "Hat Off", "Hat", 0.0);
    let on = active_clip(&mut model, "Hat On", "Hat", 1.0);
    let controller = controller_with(
        "FX",
        vec![bool_param("Enabled")],
        vec![single_toggle_layer("Hat", "Enabled", off, on)],
    );
    let paths = PathIndex::build(&model);

    let class = classify_layer(&model, &paths, &controller, 3, 3);
    match class {
        LayerClassification::SingleToggle(toggle) => {
            assert_eq!(toggle.parameter, "Enabled");
            assert_eq!(toggle.off_state, 0);
            assert_eq!(toggle.on_state, 1);
        }
        other => panic!("expected a single toggle, got {other:?}"),
    }
}

#[test]
fn any_state_int_switch_is_multi_value_toggle() {
    let mut model = avatar();
    let states: Vec<State> = (0..4)
        .map(|k| {
            let clip = active_clip(&mut model, &format!("Mode {k}"), "Outfit", k as f32);
            State::new(&format!("Mode {k}")).with_motion(Motion::Clip(clip))
        })
        .collect();
    let mut sm = StateMachine::new(states);
    for k in 0..4 {
        sm = sm.with_any_state_transition(
            Transition::to(k).when(Condition::new(ConditionMode::Equals, "Mode", k as f32)),
        );
    }
    let controller = controller_with("FX", vec![int_param("Mode")], vec![Layer::new("Outfit", sm)]);
    let paths = PathIndex::build(&model);

    match classify_layer(&model, &paths, &controller, 3, 3) {
        LayerClassification::MultiValueToggle(toggle) => {
            assert_eq!(toggle.parameter, "Mode");
            assert_eq!(toggle.states, vec![0, 1, 2, 3]);
        }
        other => panic!("expected a multi-value toggle, got {other:?}"),
    }
}

#[test]
fn single_blend_tree_state_is_passthrough() {
    let mut model = avatar();
    let a = active_clip(&mut model, "A", "Hat", 0.0);
    let b = active_clip(&mut model, "B", "Hat", 1.0);
    let tree = BlendTree::simple_1d("Blend", "Amount", vec![(Motion::Clip(a), 0.0), (Motion::Clip(b), 1.0)]);
    let state = State::new("Tree").with_motion(Motion::BlendTree(tree));
    let controller = controller_with(
        "FX",
        Vec::new(),
        vec![Layer::new("Blend", StateMachine::new(vec![state]))],
    );
    let paths = PathIndex::build(&model);

    assert_eq!(
        classify_layer(&model, &paths, &controller, 3, 3),
        LayerClassification::BlendTreePassthrough { motion_time: false }
    );
}

// ============================================================================
// Useless layers
// ============================================================================

#[test]
fn empty_and_zero_weight_layers_are_useless() {
    let mut model = avatar();
    let off = active_clip(&mut model, "Off", "Hat", 0.0);
    let on = active_clip(&mut model, "On", "Hat", 1.0);
    let controller = controller_with(
        "FX",
        vec![bool_param("Enabled")],
        vec![
            Layer::new("Empty", StateMachine::default()),
            single_toggle_layer("Muted", "Enabled", off, on).with_weight(0.0),
        ],
    );
    let paths = PathIndex::build(&model);

    assert_eq!(classify_layer(&model, &paths, &controller, 3, 3), LayerClassification::Useless);
    assert_eq!(classify_layer(&model, &paths, &controller, 4, 3), LayerClassification::Useless);
}

#[test]
fn layer_animating_only_missing_paths_is_useless() {
    let mut model = avatar();
    let off = active_clip(&mut model, "Off", "Removed/Prop", 0.0);
    let on = active_clip(&mut model, "On", "Removed/Prop", 1.0);
    let controller = controller_with(
        "FX",
        vec![bool_param("Enabled")],
        vec![single_toggle_layer("Prop", "Enabled", off, on)],
    );
    let paths = PathIndex::build(&model);

    assert_eq!(classify_layer(&model, &paths, &controller, 3, 3), LayerClassification::Useless);
}

// ============================================================================
// Unmergeable reasons
// ============================================================================

#[test]
fn reserved_layers_are_never_merged() {
    let mut model = avatar();
    let off = active_clip(&mut model, "Off", "Hat", 0.0);
    let on = active_clip(&mut model, "On", "Hat", 1.0);
    let mut controller = controller_with("FX", vec![bool_param("Enabled")], Vec::new());
    controller.layers[0] = single_toggle_layer("Base", "Enabled", off, on);
    let paths = PathIndex::build(&model);

    let class = classify_layer(&model, &paths, &controller, 0, 3);
    assert_eq!(reasons(&class), vec!["is a reserved layer".to_string()]);
}

#[test]
fn greater_conditions_are_reported() {
    let mut model = avatar();
    let off = active_clip(&mut model, "Off", "Hat", 0.0);
    let on = active_clip(&mut model, "On", "Hat", 1.0);
    let off_state = State::new("Off")
        .with_motion(Motion::Clip(off))
        .with_transition(Transition::to(1).when(Condition::new(ConditionMode::Greater, "Amount", 0.5)));
    let on_state = State::new("On")
        .with_motion(Motion::Clip(on))
        .with_transition(Transition::to(0).when(Condition::new(ConditionMode::Less, "Amount", 0.5)));
    let controller = controller_with(
        "FX",
        vec![rigfuse::animation::Parameter::new("Amount", ParameterKind::Float, 0.0)],
        vec![Layer::new("Hat", StateMachine::new(vec![off_state, on_state]))],
    );
    let paths = PathIndex::build(&model);

    let found = reasons(&classify_layer(&model, &paths, &controller, 3, 3));
    assert!(found.contains(&"a transition condition mode is Greater".to_string()));
    assert!(found.contains(&"a transition condition mode is Less".to_string()));
    assert!(found.contains(&"transition conditions are not negations of each other".to_string()));
    assert!(found.contains(&"parameter Amount is not Bool".to_string()));
}

#[test]
fn missing_parameter_and_extra_transitions_are_reported() {
    let mut model = avatar();
    let off = active_clip(&mut model, "Off", "Hat", 0.0);
    let on = active_clip(&mut model, "On", "Hat", 1.0);
    let mut layer = single_toggle_layer("Hat", "Ghost", off, on);
    layer.state_machine.states[0].transitions.push(Transition::to(1));
    let controller = controller_with("FX", Vec::new(), vec![layer]);
    let paths = PathIndex::build(&model);

    let found = reasons(&classify_layer(&model, &paths, &controller, 3, 3));
    assert_eq!(found, vec!["states do not have exactly one transition each".to_string()]);

    let mut model = avatar();
    let off = active_clip(&mut model, "Off", "Hat", 0.0);
    let on = active_clip(&mut model, "On", "Hat", 1.0);
    let controller = controller_with("FX", Vec::new(), vec![single_toggle_layer("Hat", "Ghost", off, on)]);
    let paths = PathIndex::build(&model);
    let found = reasons(&classify_layer(&model, &paths, &controller, 3, 3));
    assert_eq!(found, vec!["parameter Ghost does not exist".to_string()]);
}

#[test]
fn toggle_only_layers_tolerate_timing_but_need_write_defaults() {
    let mut model = avatar();
    let hat_off = active_clip(&mut model, "Hat Off", "Hat", 0.0);
    let glasses_on = active_clip(&mut model, "Glasses On", "Glasses", 1.0);
    let layer = |write_defaults: bool| {
        let off_state = State::new("Off")
            .with_motion(Motion::Clip(hat_off))
            .with_write_defaults(write_defaults)
            .with_transition(
                Transition::to(1)
                    .when(Condition::new(ConditionMode::If, "Enabled", 0.0))
                    .with_exit_time(0.9)
                    .with_duration(0.25),
            );
        let on_state = State::new("On")
            .with_motion(Motion::Clip(glasses_on))
            .with_write_defaults(write_defaults)
            .with_transition(Transition::to(0).when(Condition::new(ConditionMode::IfNot, "Enabled", 0.0)));
        Layer::new("Accessories", StateMachine::new(vec![off_state, on_state]))
    };
    let paths = PathIndex::build(&model);

    let controller = controller_with("FX", vec![bool_param("Enabled")], vec![layer(true)]);
    assert!(matches!(
        classify_layer(&model, &paths, &controller, 3, 3),
        LayerClassification::SingleToggle(_)
    ));

    let controller = controller_with("FX", vec![bool_param("Enabled")], vec![layer(false)]);
    assert_eq!(
        reasons(&classify_layer(&model, &paths, &controller, 3, 3)),
        vec!["m_IsActive is not animated in both states".to_string()]
    );
}

#[test]
fn behaviours_and_weights_are_reported() {
    let mut model = avatar();
    let off = active_clip(&mut model, "Off", "Hat", 0.0);
    let on = active_clip(&mut model, "On", "Hat", 1.0);
    let mut layer = single_toggle_layer("Hat", "Enabled", off, on).with_weight(0.5);
    layer.state_machine.behaviours.push("ParameterDriver".to_string());
    let controller = controller_with("FX", vec![bool_param("Enabled")], vec![layer]);
    let paths = PathIndex::build(&model);

    let found = reasons(&classify_layer(&model, &paths, &controller, 3, 3));
    assert!(found.contains(&"has state machine behaviours".to_string()));
    assert!(found.contains(&"layer weight is not 1".to_string()));
}

#[test]
fn multi_value_gaps_are_reported() {
    let mut model = avatar();
    let states: Vec<State> = (0..3)
        .map(|k| {
            let clip = active_clip(&mut model, &format!("Mode {k}"), "Outfit", k as f32);
            State::new(&format!("Mode {k}")).with_motion(Motion::Clip(clip))
        })
        .collect();
    let sm = StateMachine::new(states)
        .with_any_state_transition(Transition::to(0).when(Condition::new(ConditionMode::Equals, "Mode", 0.0)))
        .with_any_state_transition(Transition::to(1).when(Condition::new(ConditionMode::Equals, "Mode", 1.0)))
        .with_any_state_transition(Transition::to(2).when(Condition::new(ConditionMode::Equals, "Mode", 5.0)));
    let controller = controller_with("FX", vec![int_param("Mode")], vec![Layer::new("Outfit", sm)]);
    let paths = PathIndex::build(&model);

    let found = reasons(&classify_layer(&model, &paths, &controller, 3, 3));
    assert_eq!(found, vec!["transition values do not cover 0..2".to_string()]);
}

/// Three `Mode` states whose last any-state transition points at `last`.
fn mode_layer(model: &mut Model, last: usize) -> Layer {
    let states: Vec<State> = (0..3)
        .map(|k| {
            let clip = active_clip(model, &format!("Mode {k}"), "Outfit", k as f32);
            State::new(&format!("Mode {k}")).with_motion(Motion::Clip(clip))
        })
        .collect();
    let sm = StateMachine::new(states)
        .with_any_state_transition(Transition::to(0).when(Condition::new(ConditionMode::Equals, "Mode", 0.0)))
        .with_any_state_transition(Transition::to(1).when(Condition::new(ConditionMode::Equals, "Mode", 1.0)))
        .with_any_state_transition(Transition::to(last).when(Condition::new(ConditionMode::Equals, "Mode", 2.0)));
    Layer::new("Outfit", sm)
}

#[test]
fn transition_to_a_missing_state_is_reported() {
    let mut model = avatar();
    let layer = mode_layer(&mut model, 7);
    let controller = controller_with("FX", vec![int_param("Mode")], vec![layer]);
    let paths = PathIndex::build(&model);

    let found = reasons(&classify_layer(&model, &paths, &controller, 3, 3));
    assert!(found.contains(&"a transition targets a missing state".to_string()));
}

// ============================================================================
// Synced layers & cache
// ============================================================================

#[test]
fn synced_layers_are_unmergeable_on_both_sides() {
    let mut model = avatar();
    let off = active_clip(&mut model, "Off", "Hat", 0.0);
    let on = active_clip(&mut model, "On", "Hat", 1.0);
    let mut follower = single_toggle_layer("Follower", "Enabled", off, on);
    follower.synced_layer = Some(3);
    let controller = controller_with(
        "FX",
        vec![bool_param("Enabled")],
        vec![single_toggle_layer("Leader", "Enabled", off, on), follower],
    );
    model.controllers.push(controller);
    let paths = PathIndex::build(&model);

    let mut classifier = StateMachineClassifier::new(&OptimizerSettings::default());
    let classes = classifier.classify_controller(&model, &paths, 0).to_vec();
    assert_eq!(classes.len(), 5);
    assert_eq!(reasons(&classes[4]), vec!["is synced to layer 'Leader'".to_string()]);
    assert_eq!(reasons(&classes[3]), vec!["layer 'Follower' is synced to this layer".to_string()]);

    // Served from the cache until invalidated.
    model.controllers.clear();
    assert_eq!(classifier.classify_controller(&model, &paths, 0).len(), 5);
    classifier.invalidate();
    assert!(classifier.classify_controller(&model, &paths, 0).is_empty());
}

// ============================================================================
// Folding
// ============================================================================

#[test]
fn two_disjoint_toggles_fold_into_one_layer() {
    let mut model = avatar();
    let hat_off = active_clip(&mut model, "Hat Off", "Hat", 0.0);
    let hat_on = active_clip(&mut model, "Hat On", "Hat", 1.0);
    let glasses_off = active_clip(&mut model, "Glasses Off", "Glasses", 0.0);
    let glasses_on = active_clip(&mut model, "Glasses On", "Glasses", 1.0);
    model.controllers.push(controller_with(
        "FX",
        vec![bool_param("Hat"), bool_param("Glasses")],
        vec![
            single_toggle_layer("Hat", "Hat", hat_off, hat_on),
            single_toggle_layer("Glasses", "Glasses", glasses_off, glasses_on),
            Layer::new("Empty", StateMachine::default()),
        ],
    ));
    let paths = PathIndex::build(&model);
    let mut classifier = StateMachineClassifier::new(&OptimizerSettings::default());
    let classes = classifier.classify_controller(&model, &paths, 0).to_vec();

    let mut ctx = OptimizationContext::new();
    let folded = fold_controller(&mut model, &paths, 0, &classes, &mut ctx);

    let controller = &model.controllers[0];
    let names: Vec<&str> = controller.layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Reserved 0", "Reserved 1", "Reserved 2", FOLDED_LAYER_NAME]);
    assert_eq!(folded.len(), 4);
    assert_eq!(folded[3], LayerClassification::BlendTreePassthrough { motion_time: false });

    assert_eq!(controller.parameter("Hat").map(|p| p.kind), Some(ParameterKind::Float));
    assert_eq!(controller.parameter("Glasses").map(|p| p.kind), Some(ParameterKind::Float));
    assert_eq!(
        controller.parameter(CONSTANT_ONE_PARAMETER).map(|p| p.default_value),
        Some(1.0)
    );

    let Some(Motion::BlendTree(tree)) = &controller.layers[3].state_machine.states[0].motion else {
        panic!("folded layer must play a blend tree");
    };
    assert_eq!(tree.children.len(), 2);
    assert!(ctx.generated_clips.is_empty());
}

#[test]
fn a_single_foldable_layer_is_left_alone() {
    let mut model = avatar();
    let off = active_clip(&mut model, "Off", "Hat", 0.0);
    let on = active_clip(&mut model, "On", "Hat", 1.0);
    model.controllers.push(controller_with(
        "FX",
        vec![bool_param("Hat")],
        vec![
            single_toggle_layer("Hat", "Hat", off, on),
            Layer::new("Empty", StateMachine::default()),
        ],
    ));
    let paths = PathIndex::build(&model);
    let mut classifier = StateMachineClassifier::new(&OptimizerSettings::default());
    let classes = classifier.classify_controller(&model, &paths, 0).to_vec();

    let mut ctx = OptimizationContext::new();
    fold_controller(&mut model, &paths, 0, &classes, &mut ctx);

    let controller = &model.controllers[0];
    // The useless layer goes, the toggle stays.
    assert_eq!(controller.layers.len(), 4);
    assert_eq!(controller.layers[3].name, "Hat");
    assert_eq!(controller.parameter("Hat").map(|p| p.kind), Some(ParameterKind::Bool));
}

#[test]
fn dangling_layer_data_does_not_stop_folding() {
    let mut model = avatar();
    let hat_off = active_clip(&mut model, "Hat Off", "Hat", 0.0);
    let hat_on = active_clip(&mut model, "Hat On", "Hat", 1.0);
    let glasses_off = active_clip(&mut model, "Glasses Off", "Glasses", 0.0);
    let glasses_on = active_clip(&mut model, "Glasses On", "Glasses", 1.0);
    let mut follower = mode_layer(&mut model, 7);
    follower.name = "Follower".to_string();
    follower.synced_layer = Some(42);
    model.controllers.push(controller_with(
        "FX",
        vec![bool_param("Hat"), bool_param("Glasses"), int_param("Mode")],
        vec![
            single_toggle_layer("Hat", "Hat", hat_off, hat_on),
            single_toggle_layer("Glasses", "Glasses", glasses_off, glasses_on),
            follower,
        ],
    ));
    let paths = PathIndex::build(&model);
    let mut classifier = StateMachineClassifier::new(&OptimizerSettings::default());
    let classes = classifier.classify_controller(&model, &paths, 0).to_vec();
    assert_eq!(reasons(&classes[5]), vec!["is synced to a missing layer".to_string()]);

    let mut ctx = OptimizationContext::new();
    fold_controller(&mut model, &paths, 0, &classes, &mut ctx);

    let controller = &model.controllers[0];
    let names: Vec<&str> = controller.layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Reserved 0", "Reserved 1", "Reserved 2", "Follower", FOLDED_LAYER_NAME]
    );
    assert_eq!(controller.layers[3].synced_layer, None);
    assert!(ctx
        .diagnostics()
        .iter()
        .any(|l| l == "[LayerFolding] layer 'Follower': sync to layer 42 dropped, that layer is gone"));
}
