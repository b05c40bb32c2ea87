//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use glam::{Mat4, Vec3, Vec4};

use rigfuse::animation::{
    AnimationClip, AnimatorController, Condition, ConditionMode, CurveBinding, FloatCurve, InterpolationMode,
    KeyframeTrack, Layer, Motion, Parameter, ParameterKind, State, StateMachine, TargetKind, Transition,
};
use rigfuse::resources::{BoneWeight, Material, MeshData, SubMesh, VertexWeights};
use rigfuse::scene::{ClipKey, MaterialKey, Model, Node, NodeKey, RendererKind, Surface, SurfaceKey};

pub const EPSILON: f32 = 1e-5;

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

pub fn approx_vec3(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPSILON
}

/// A unit quad at `offset`, with normals and UV0, one sub-mesh.
pub fn quad_mesh(name: &str, offset: Vec3) -> MeshData {
    let mut mesh = MeshData::new(name);
    mesh.positions = vec![
        offset,
        offset + Vec3::X,
        offset + Vec3::X + Vec3::Y,
        offset + Vec3::Y,
    ];
    mesh.normals = vec![Vec3::Z; 4];
    mesh.uvs[0] = vec![
        Vec4::new(0.0, 0.0, 0.0, 0.0),
        Vec4::new(1.0, 0.0, 0.0, 0.0),
        Vec4::new(1.0, 1.0, 0.0, 0.0),
        Vec4::new(0.0, 1.0, 0.0, 0.0),
    ];
    mesh.sub_meshes = vec![SubMesh::new(vec![0, 1, 2, 0, 2, 3])];
    mesh
}

pub fn material(model: &mut Model, name: &str) -> MaterialKey {
    model.add_material(Material::new(name, "Toon"))
}

/// Adds `name` under `parent` carrying a static quad.
pub fn add_static(
    model: &mut Model,
    parent: NodeKey,
    name: &str,
    material: MaterialKey,
) -> (NodeKey, SurfaceKey) {
    let node = model.add_node(Node::new(name), parent);
    let surface = Surface::new(node, RendererKind::Static, quad_mesh(name, Vec3::ZERO))
        .with_materials(vec![Some(material)]);
    let (key, _) = model.attach_surface(surface);
    (node, key)
}

/// Adds `name` under `parent` carrying a quad fully skinned to `bones[0]`.
pub fn add_skinned(
    model: &mut Model,
    parent: NodeKey,
    name: &str,
    material: MaterialKey,
    bones: &[(NodeKey, Mat4)],
) -> (NodeKey, SurfaceKey) {
    let node = model.add_node(Node::new(name), parent);
    let mut mesh = quad_mesh(name, Vec3::ZERO);
    mesh.bind_poses = bones.iter().map(|(_, bp)| *bp).collect();
    mesh.bone_weights = (0..4)
        .map(|v| {
            let mut w = VertexWeights::new();
            w.push(BoneWeight::new((v % bones.len()) as u32, 1.0));
            w
        })
        .collect();
    let surface = Surface::new(node, RendererKind::Skinned, mesh)
        .with_materials(vec![Some(material)])
        .with_bones(bones.iter().map(|(n, _)| Some(*n)).collect(), Some(bones[0].0));
    let (key, _) = model.attach_surface(surface);
    (node, key)
}

pub fn step_curve(binding: CurveBinding, times: &[f32], values: &[f32]) -> FloatCurve {
    FloatCurve {
        binding,
        track: KeyframeTrack::new(times.to_vec(), values.to_vec(), InterpolationMode::Step),
    }
}

pub fn linear_curve(binding: CurveBinding, times: &[f32], values: &[f32]) -> FloatCurve {
    FloatCurve {
        binding,
        track: KeyframeTrack::new(times.to_vec(), values.to_vec(), InterpolationMode::Linear),
    }
}

/// A clip holding one constant `m_IsActive` curve at `path`.
pub fn active_clip(model: &mut Model, name: &str, path: &str, value: f32) -> ClipKey {
    model.add_clip(AnimationClip::new(
        name,
        vec![step_curve(CurveBinding::active(path), &[0.0], &[value])],
        Vec::new(),
    ))
}

/// Two states "Off"/"On" mutually gated by `If`/`IfNot` on a bool.
pub fn single_toggle_layer(name: &str, parameter: &str, off: ClipKey, on: ClipKey) -> Layer {
    let off_state = State::new("Off")
        .with_motion(Motion::Clip(off))
        .with_transition(Transition::to(1).when(Condition::new(ConditionMode::If, parameter, 0.0)));
    let on_state = State::new("On")
        .with_motion(Motion::Clip(on))
        .with_transition(Transition::to(0).when(Condition::new(ConditionMode::IfNot, parameter, 0.0)));
    Layer::new(name, StateMachine::new(vec![off_state, on_state]))
}

/// A controller with three placeholder layers in front, so every layer under
/// test sits outside the reserved range.
pub fn controller_with(name: &str, parameters: Vec<Parameter>, layers: Vec<Layer>) -> AnimatorController {
    let mut controller = AnimatorController::new(name);
    controller.parameters = parameters;
    controller.layers = (0..3)
        .map(|i| Layer::new(&format!("Reserved {i}"), StateMachine::default()))
        .chain(layers)
        .collect();
    controller
}

pub fn bool_param(name: &str) -> Parameter {
    Parameter::new(name, ParameterKind::Bool, 0.0)
}

pub fn int_param(name: &str) -> Parameter {
    Parameter::new(name, ParameterKind::Int, 0.0)
}

pub fn skinned_enabled(path: &str) -> CurveBinding {
    CurveBinding::renderer_enabled(path, TargetKind::SkinnedMeshRenderer)
}
