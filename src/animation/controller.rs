//! Animation controller data: parameters, layers, state machines, states,
//! transitions, and blend trees.

use crate::scene::ClipKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Float,
    Int,
    Bool,
    Trigger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub default_value: f32,
}

impl Parameter {
    #[must_use]
    pub fn new(name: &str, kind: ParameterKind, default_value: f32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionMode {
    If,
    IfNot,
    Greater,
    Less,
    Equals,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub mode: ConditionMode,
    pub parameter: String,
    pub threshold: f32,
}

impl Condition {
    #[must_use]
    pub fn new(mode: ConditionMode, parameter: &str, threshold: f32) -> Self {
        Self {
            mode,
            parameter: parameter.to_string(),
            threshold,
        }
    }

    #[must_use]
    pub fn is_negation_of(&self, other: &Condition) -> bool {
        self.parameter == other.parameter
            && matches!(
                (self.mode, other.mode),
                (ConditionMode::If, ConditionMode::IfNot) | (ConditionMode::IfNot, ConditionMode::If)
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionTarget {
    State(usize),
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub target: TransitionTarget,
    pub conditions: Vec<Condition>,
    pub has_exit_time: bool,
    pub exit_time: f32,
    pub duration: f32,
    pub can_transition_to_self: bool,
}

impl Transition {
    /// An immediate, condition-less transition to `state`.
    #[must_use]
    pub fn to(state: usize) -> Self {
        Self {
            target: TransitionTarget::State(state),
            conditions: Vec::new(),
            has_exit_time: false,
            exit_time: 0.0,
            duration: 0.0,
            can_transition_to_self: false,
        }
    }

    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn with_exit_time(mut self, exit_time: f32) -> Self {
        self.has_exit_time = true;
        self.exit_time = exit_time;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: f32) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn destination(&self) -> Option<usize> {
        match self.target {
            TransitionTarget::State(index) => Some(index),
            TransitionTarget::Exit => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendTreeKind {
    Simple1D,
    Freeform2D,
    Direct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildMotion {
    pub motion: Motion,
    pub threshold: f32,
    /// Weight parameter of a child of a Direct blend tree.
    pub direct_parameter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlendTree {
    pub name: String,
    pub kind: BlendTreeKind,
    pub parameter: Option<String>,
    pub children: Vec<ChildMotion>,
}

impl BlendTree {
    /// A 1D blend tree over `parameter` with `(motion, threshold)` children.
    #[must_use]
    pub fn simple_1d(name: &str, parameter: &str, children: Vec<(Motion, f32)>) -> Self {
        Self {
            name: name.to_string(),
            kind: BlendTreeKind::Simple1D,
            parameter: Some(parameter.to_string()),
            children: children
                .into_iter()
                .map(|(motion, threshold)| ChildMotion {
                    motion,
                    threshold,
                    direct_parameter: None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Motion {
    Clip(ClipKey),
    BlendTree(BlendTree),
}

impl Motion {
    /// Appends every clip reachable from this motion.
    pub fn collect_clips(&self, out: &mut Vec<ClipKey>) {
        match self {
            Motion::Clip(clip) => out.push(*clip),
            Motion::BlendTree(tree) => {
                for child in &tree.children {
                    child.motion.collect_clips(out);
                }
            }
        }
    }

    /// Replaces every clip through `map`.
    pub fn remap_clips(&mut self, map: &impl Fn(ClipKey) -> ClipKey) {
        match self {
            Motion::Clip(clip) => *clip = map(*clip),
            Motion::BlendTree(tree) => {
                for child in &mut tree.children {
                    child.motion.remap_clips(map);
                }
            }
        }
    }

    /// Parameters read by this motion and its children.
    pub fn collect_parameters<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Motion::BlendTree(tree) = self {
            if let Some(p) = &tree.parameter {
                out.push(p);
            }
            for child in &tree.children {
                if let Some(p) = &child.direct_parameter {
                    out.push(p);
                }
                child.motion.collect_parameters(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub name: String,
    pub motion: Option<Motion>,
    pub transitions: Vec<Transition>,
    /// Names of attached state behaviours.
    pub behaviours: Vec<String>,
    pub write_defaults: bool,
    /// Parameter driving normalized motion time, when motion time is enabled.
    pub motion_time_parameter: Option<String>,
}

impl State {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            motion: None,
            transitions: Vec::new(),
            behaviours: Vec::new(),
            write_defaults: true,
            motion_time_parameter: None,
        }
    }

    #[must_use]
    pub fn with_motion(mut self, motion: Motion) -> Self {
        self.motion = Some(motion);
        self
    }

    #[must_use]
    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    #[must_use]
    pub fn with_write_defaults(mut self, write_defaults: bool) -> Self {
        self.write_defaults = write_defaults;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateMachine {
    pub states: Vec<State>,
    pub default_state: usize,
    pub any_state_transitions: Vec<Transition>,
    pub entry_transitions: Vec<Transition>,
    /// Number of nested state machines.
    pub sub_state_machines: usize,
    /// Names of behaviours attached to the state machine itself.
    pub behaviours: Vec<String>,
}

impl StateMachine {
    #[must_use]
    pub fn new(states: Vec<State>) -> Self {
        Self {
            states,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_any_state_transition(mut self, transition: Transition) -> Self {
        self.any_state_transitions.push(transition);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Every transition of the machine: per state, then any-state, then entry.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> + '_ {
        self.states
            .iter()
            .flat_map(|s| s.transitions.iter())
            .chain(self.any_state_transitions.iter())
            .chain(self.entry_transitions.iter())
    }

    pub fn transitions_mut(&mut self) -> impl Iterator<Item = &mut Transition> + '_ {
        self.states
            .iter_mut()
            .flat_map(|s| s.transitions.iter_mut())
            .chain(self.any_state_transitions.iter_mut())
            .chain(self.entry_transitions.iter_mut())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerBlending {
    #[default]
    Override,
    Additive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub default_weight: f32,
    /// Weight is changed at runtime by a behaviour or an external system.
    pub weight_controlled_externally: bool,
    /// Index of the layer whose state machine this layer follows.
    pub synced_layer: Option<usize>,
    pub blending: LayerBlending,
    pub state_machine: StateMachine,
}

impl Layer {
    #[must_use]
    pub fn new(name: &str, state_machine: StateMachine) -> Self {
        Self {
            name: name.to_string(),
            default_weight: 1.0,
            weight_controlled_externally: false,
            synced_layer: None,
            blending: LayerBlending::Override,
            state_machine,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.default_weight = weight;
        self
    }

    /// Clips referenced by the states of this layer, in state order.
    #[must_use]
    pub fn referenced_clips(&self) -> Vec<ClipKey> {
        let mut clips = Vec::new();
        for state in &self.state_machine.states {
            if let Some(motion) = &state.motion {
                motion.collect_clips(&mut clips);
            }
        }
        clips
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimatorController {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub layers: Vec<Layer>,
}

impl AnimatorController {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    /// Distinct clips referenced by any layer, in first-reference order.
    #[must_use]
    pub fn referenced_clips(&self) -> Vec<ClipKey> {
        let mut seen = rustc_hash::FxHashSet::default();
        self.layers
            .iter()
            .flat_map(Layer::referenced_clips)
            .filter(|clip| seen.insert(*clip))
            .collect()
    }
}
