//! Animation layer classification.
//!
//! Each layer of a controller is matched against a few closed shapes whose
//! behaviour can be reproduced exactly by a single generated Direct blend
//! tree layer. A layer matching none of them is unmergeable, tagged with
//! every condition it falsified.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::animation::{
    AnimatorController, ConditionMode, CurveBinding, Layer, LayerBlending, Motion, ObjectCurve,
    ParameterKind, State, StateMachine, TargetKind, Transition,
};
use crate::optimizer::path_index::PathIndex;
use crate::scene::{Model, NodeFlags};
use crate::settings::OptimizerSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleToggle {
    pub parameter: String,
    pub off_state: usize,
    pub on_state: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiValueToggle {
    pub parameter: String,
    /// `states[k]` is entered when the parameter equals `k`.
    pub states: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerClassification {
    SingleToggle(SingleToggle),
    MultiValueToggle(MultiValueToggle),
    BlendTreePassthrough { motion_time: bool },
    Useless,
    Unmergeable(BTreeSet<String>),
}

impl LayerClassification {
    #[inline]
    #[must_use]
    pub fn is_mergeable(&self) -> bool {
        !matches!(self, Self::Unmergeable(_))
    }

    #[must_use]
    pub fn reasons(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Unmergeable(reasons) => Some(reasons),
            _ => None,
        }
    }

    fn add_reason(&mut self, reason: String) {
        match self {
            Self::Unmergeable(reasons) => {
                reasons.insert(reason);
            }
            other => *other = Self::Unmergeable(BTreeSet::from([reason])),
        }
    }
}

/// Classifies controller layers, caching results per controller index.
///
/// The cache is valid until the controllers or the hierarchy change;
/// [`invalidate`](Self::invalidate) drops it.
#[derive(Debug)]
pub struct StateMachineClassifier {
    reserved_layer_count: usize,
    cache: FxHashMap<usize, Vec<LayerClassification>>,
}

impl StateMachineClassifier {
    #[must_use]
    pub fn new(settings: &OptimizerSettings) -> Self {
        Self {
            reserved_layer_count: settings.reserved_layer_count,
            cache: FxHashMap::default(),
        }
    }

    /// Classifications of every layer of `model.controllers[controller]`,
    /// indexed like its layers. Empty for an unknown controller.
    pub fn classify_controller(
        &mut self,
        model: &Model,
        paths: &PathIndex,
        controller: usize,
    ) -> &[LayerClassification] {
        if !self.cache.contains_key(&controller) {
            let classes = match model.controllers.get(controller) {
                Some(c) => classify_layers(model, paths, c, self.reserved_layer_count),
                None => Vec::new(),
            };
            self.cache.insert(controller, classes);
        }
        self.cache.get(&controller).map_or(&[], Vec::as_slice)
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }
}

fn classify_layers(
    model: &Model,
    paths: &PathIndex,
    controller: &AnimatorController,
    reserved: usize,
) -> Vec<LayerClassification> {
    let mut classes: Vec<_> = (0..controller.layers.len())
        .map(|i| classify_layer(model, paths, controller, i, reserved))
        .collect();

    // Synced layers follow another layer's state machine; neither side can
    // be folded independently.
    for (index, layer) in controller.layers.iter().enumerate() {
        let Some(target) = layer.synced_layer else {
            continue;
        };
        match controller.layers.get(target) {
            Some(synced_to) => {
                classes[index] = LayerClassification::Unmergeable(BTreeSet::from([format!(
                    "is synced to layer '{}'",
                    synced_to.name
                )]));
                classes[target].add_reason(format!("layer '{}' is synced to this layer", layer.name));
            }
            None => {
                classes[index] = LayerClassification::Unmergeable(BTreeSet::from([
                    "is synced to a missing layer".to_string(),
                ]));
            }
        }
    }
    classes
}

/// Classifies one layer, ignoring layer sync.
#[must_use]
pub fn classify_layer(
    model: &Model,
    paths: &PathIndex,
    controller: &AnimatorController,
    index: usize,
    reserved: usize,
) -> LayerClassification {
    let Some(layer) = controller.layers.get(index) else {
        return LayerClassification::Useless;
    };
    if index < reserved {
        return LayerClassification::Unmergeable(BTreeSet::from(["is a reserved layer".to_string()]));
    }

    let sm = &layer.state_machine;
    if sm.is_empty() {
        return LayerClassification::Useless;
    }
    if layer.default_weight == 0.0 && !layer.weight_controlled_externally {
        return LayerClassification::Useless;
    }

    let mut reasons = BTreeSet::new();
    if !sm.behaviours.is_empty() || sm.states.iter().any(|s| !s.behaviours.is_empty()) {
        reasons.insert("has state machine behaviours".to_string());
    }
    if reasons.is_empty() && has_no_effect(model, paths, layer) {
        return LayerClassification::Useless;
    }

    if sm.sub_state_machines > 0 {
        reasons.insert("has sub state machines".to_string());
    }
    if layer.blending == LayerBlending::Additive {
        reasons.insert("blending mode is additive".to_string());
    }
    if layer.weight_controlled_externally {
        reasons.insert("layer weight is controlled externally".to_string());
    } else if layer.default_weight != 1.0 {
        reasons.insert("layer weight is not 1".to_string());
    }

    let shape = match sm.states.len() {
        1 => blend_tree_passthrough(model, sm, &mut reasons),
        2 => single_toggle(model, controller, sm, &mut reasons).map(LayerClassification::SingleToggle),
        _ => multi_value_toggle(model, controller, sm, &mut reasons)
            .map(LayerClassification::MultiValueToggle),
    };

    match shape {
        Some(class) if reasons.is_empty() => class,
        _ => LayerClassification::Unmergeable(reasons),
    }
}

// ============================================================================
// Shapes
// ============================================================================

fn single_toggle(
    model: &Model,
    controller: &AnimatorController,
    sm: &StateMachine,
    reasons: &mut BTreeSet<String>,
) -> Option<SingleToggle> {
    let before = reasons.len();
    let (a, b) = (&sm.states[0], &sm.states[1]);

    if !sm.any_state_transitions.is_empty() {
        reasons.insert("has any state transitions".to_string());
    }
    if !sm.entry_transitions.is_empty() {
        reasons.insert("has entry transitions".to_string());
    }
    check_motion_time(sm, reasons);

    let props_a = state_properties(model, a);
    let props_b = state_properties(model, b);

    let mut on_state = None;
    if a.transitions.len() != 1 || b.transitions.len() != 1 {
        reasons.insert("states do not have exactly one transition each".to_string());
    } else {
        let (ab, ba) = (&a.transitions[0], &b.transitions[0]);
        if ab.destination() != Some(1) || ba.destination() != Some(0) {
            reasons.insert("transitions are not a mutual pair".to_string());
        }

        let only_toggles = props_a.iter().chain(&props_b).all(is_toggle_property);
        for t in [ab, ba] {
            check_timing(t, only_toggles, reasons);
        }

        if ab.conditions.len() != 1 || ba.conditions.len() != 1 {
            reasons.insert("a transition does not have exactly one condition".to_string());
        } else {
            let (c_ab, c_ba) = (&ab.conditions[0], &ba.conditions[0]);
            for c in [c_ab, c_ba] {
                if !matches!(c.mode, ConditionMode::If | ConditionMode::IfNot) {
                    reasons.insert(format!("a transition condition mode is {:?}", c.mode));
                }
            }
            if !c_ab.is_negation_of(c_ba) {
                reasons.insert("transition conditions are not negations of each other".to_string());
            }
            check_parameter(controller, &c_ab.parameter, ParameterKind::Bool, reasons);
            on_state = Some(if c_ab.mode == ConditionMode::If { 1 } else { 0 });
        }
    }

    if props_a != props_b {
        let completable = a.write_defaults
            && b.write_defaults
            && props_a.symmetric_difference(&props_b).all(is_toggle_property);
        for binding in props_a.symmetric_difference(&props_b) {
            let missing_in = if props_a.contains(binding) { b } else { a };
            let can_complete = !matches!(missing_in.motion, Some(Motion::BlendTree(_)));
            if !completable || !can_complete {
                reasons.insert(format!("{} is not animated in both states", binding.property));
            }
        }
    }

    let on_state = on_state?;
    (reasons.len() == before).then(|| SingleToggle {
        parameter: a.transitions[0].conditions[0].parameter.clone(),
        off_state: 1 - on_state,
        on_state,
    })
}

fn multi_value_toggle(
    model: &Model,
    controller: &AnimatorController,
    sm: &StateMachine,
    reasons: &mut BTreeSet<String>,
) -> Option<MultiValueToggle> {
    let before = reasons.len();
    let n = sm.states.len();

    if sm.states.iter().any(|s| !s.transitions.is_empty()) {
        reasons.insert("a state has its own transitions".to_string());
    }
    if !sm.entry_transitions.is_empty() {
        reasons.insert("has entry transitions".to_string());
    }
    check_motion_time(sm, reasons);

    let mut parameter: Option<&str> = None;
    let mut states = vec![None; n];
    if sm.any_state_transitions.len() != n {
        reasons.insert("any state transitions do not match the states".to_string());
    }
    for t in &sm.any_state_transitions {
        check_timing(t, false, reasons);
        let [condition] = t.conditions.as_slice() else {
            reasons.insert("a transition does not have exactly one condition".to_string());
            continue;
        };
        if condition.mode != ConditionMode::Equals {
            reasons.insert(format!("a transition condition mode is {:?}", condition.mode));
            continue;
        }
        match parameter {
            None => parameter = Some(&condition.parameter),
            Some(p) if p != condition.parameter => {
                reasons.insert("any state transitions use different parameters".to_string());
            }
            Some(_) => {}
        }

        let value = condition.threshold;
        let in_range = value.fract() == 0.0 && value >= 0.0 && (value as usize) < n;
        match (in_range, t.destination()) {
            (_, Some(dest)) if dest >= n => {
                reasons.insert("a transition targets a missing state".to_string());
            }
            (true, Some(dest)) if states[value as usize].is_none() && !states.contains(&Some(dest)) => {
                states[value as usize] = Some(dest);
            }
            _ => {
                reasons.insert(format!("transition values do not cover 0..{}", n - 1));
            }
        }
    }
    if states.iter().any(Option::is_none) {
        reasons.insert(format!("transition values do not cover 0..{}", n - 1));
    }
    if let Some(p) = parameter {
        check_parameter(controller, p, ParameterKind::Int, reasons);
    }

    let props: Vec<_> = sm.states.iter().map(|s| state_properties(model, s)).collect();
    for other in &props[1..] {
        for binding in props[0].symmetric_difference(other) {
            reasons.insert(format!("{} is not animated in all states", binding.property));
        }
    }

    let parameter = parameter?.to_string();
    (reasons.len() == before).then(|| MultiValueToggle {
        parameter,
        states: states.into_iter().flatten().collect(),
    })
}

fn blend_tree_passthrough(
    model: &Model,
    sm: &StateMachine,
    reasons: &mut BTreeSet<String>,
) -> Option<LayerClassification> {
    let before = reasons.len();
    let state = &sm.states[0];

    if sm.transitions().next().is_some() {
        reasons.insert("has transitions".to_string());
    }

    let motion_time = match &state.motion {
        Some(Motion::BlendTree(_)) => false,
        Some(Motion::Clip(_)) if state.motion_time_parameter.is_some() => true,
        Some(Motion::Clip(_)) => {
            reasons.insert("motion is a clip without motion time".to_string());
            false
        }
        None => {
            reasons.insert("state has no motion".to_string());
            false
        }
    };

    let mut clips = Vec::new();
    if let Some(motion) = &state.motion {
        motion.collect_clips(&mut clips);
    }
    if clips
        .iter()
        .filter_map(|c| model.clips.get(*c))
        .any(|c| c.has_object_curves())
    {
        reasons.insert("has object reference curves".to_string());
    }

    (reasons.len() == before).then_some(LayerClassification::BlendTreePassthrough { motion_time })
}

// ============================================================================
// Checks
// ============================================================================

fn check_motion_time(sm: &StateMachine, reasons: &mut BTreeSet<String>) {
    if sm.states.iter().any(|s| s.motion_time_parameter.is_some()) {
        reasons.insert("a state uses motion time".to_string());
    }
}

fn check_timing(transition: &Transition, only_toggles: bool, reasons: &mut BTreeSet<String>) {
    if only_toggles {
        return;
    }
    if transition.has_exit_time {
        reasons.insert("a transition has exit time".to_string());
    }
    if transition.duration != 0.0 {
        reasons.insert("a transition has a duration".to_string());
    }
}

fn check_parameter(
    controller: &AnimatorController,
    name: &str,
    kind: ParameterKind,
    reasons: &mut BTreeSet<String>,
) {
    match controller.parameter(name) {
        None => {
            reasons.insert(format!("parameter {name} does not exist"));
        }
        Some(p) if p.kind != kind => {
            reasons.insert(format!("parameter {name} is not {kind:?}"));
        }
        Some(_) => {}
    }
}

/// Renderer enabled flag or node active flag.
#[must_use]
pub fn is_toggle_property(binding: &CurveBinding) -> bool {
    binding.is_renderer_enabled() || binding.is_active_toggle()
}

/// Every binding animated by the motion of `state`.
#[must_use]
pub fn state_properties(model: &Model, state: &State) -> BTreeSet<CurveBinding> {
    let mut clips = Vec::new();
    if let Some(motion) = &state.motion {
        motion.collect_clips(&mut clips);
    }
    clips
        .iter()
        .filter_map(|c| model.clips.get(*c))
        .flat_map(|clip| clip.bindings().map(|(b, _)| b.clone()))
        .collect()
}

/// Every binding animated by any state of `layer`.
#[must_use]
pub fn layer_properties(model: &Model, layer: &Layer) -> BTreeSet<CurveBinding> {
    layer
        .state_machine
        .states
        .iter()
        .flat_map(|s| state_properties(model, s))
        .collect()
}

/// `true` if `binding` addresses something that exists in the model.
#[must_use]
pub fn binding_resolves(model: &Model, paths: &PathIndex, binding: &CurveBinding) -> bool {
    let Some(node_key) = paths.resolve(&binding.path) else {
        return false;
    };
    let Some(node) = model.node(node_key) else {
        return false;
    };
    match binding.target {
        TargetKind::GameObject | TargetKind::Transform | TargetKind::Other => true,
        TargetKind::PhysicsBone => node.flags.contains(NodeFlags::PHYSICS_BONE),
        TargetKind::SkinnedMeshRenderer | TargetKind::MeshRenderer => {
            let Some((_, surface)) = model.surface_of(node_key) else {
                return false;
            };
            if surface.target_kind() != binding.target {
                return false;
            }
            match binding.blend_shape_name() {
                Some(name) => surface.mesh.blend_shape_index(name).is_some(),
                None => true,
            }
        }
    }
}

/// A slot swap that only ever shows the material already in the slot.
fn is_noop_slot_swap(model: &Model, paths: &PathIndex, curve: &ObjectCurve) -> bool {
    let Some(slot) = curve.binding.material_slot_index() else {
        return false;
    };
    let current = paths
        .resolve(&curve.binding.path)
        .and_then(|n| model.surface_of(n))
        .and_then(|(_, s)| s.materials.get(slot).copied().flatten());
    current.is_some() && curve.keys.iter().all(|k| k.value == current)
}

fn has_no_effect(model: &Model, paths: &PathIndex, layer: &Layer) -> bool {
    layer
        .referenced_clips()
        .iter()
        .filter_map(|c| model.clips.get(*c))
        .all(|clip| {
            clip.float_curves
                .iter()
                .all(|c| !binding_resolves(model, paths, &c.binding))
                && clip.object_curves.iter().all(|c| {
                    !binding_resolves(model, paths, &c.binding) || is_noop_slot_swap(model, paths, c)
                })
        })
}
