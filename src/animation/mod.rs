mod values;
pub mod binding;
pub mod clip;
pub mod controller;
pub mod tracks;

pub use binding::{CurveBinding, TargetKind, property};
pub use clip::{AnimationClip, CurveSlot, FloatCurve, ObjectCurve, ObjectKeyframe};
pub use controller::{
    AnimatorController, BlendTree, BlendTreeKind, ChildMotion, Condition, ConditionMode, Layer,
    LayerBlending, Motion, Parameter, ParameterKind, State, StateMachine, Transition,
    TransitionTarget,
};
pub use tracks::{InterpolationMode, KeyframeTrack};
pub use values::Interpolatable;
