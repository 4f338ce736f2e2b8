//! Built-in component kinds and the registry that names them.

use std::any::Any;

use bevy::math::Vec3;

use super::members::{MemberKind, MemberSpec, MemberValue, Members, Rgba};
use super::NodeId;

/// A component attached to a node. Member access goes through
/// [`Members`]; `as_any` exists so engine code can reach typed state.
pub trait SceneComponent: Members + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

macro_rules! scene_component {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SceneComponent for $ty {
                fn as_any(&self) -> &dyn Any {
                    self
                }

                fn as_any_mut(&mut self) -> &mut dyn Any {
                    self
                }
            }
        )*
    };
}

pub const TRANSFORM: &str = "Transform";

pub const MESH_SHAPES: &[&str] = &["Cube", "Sphere", "Capsule", "Cylinder", "Plane", "Quad"];
pub const LIGHT_TYPES: &[&str] = &["Directional", "Point", "Spot"];
pub const PATH_ACTIVATION: &[&str] = &["Always", "Never", "OnSignal"];
pub const MOTION_MODES: &[&str] = &["PTP", "LIN"];

// ── Rendering ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: Rgba,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "Default-Material".to_string(),
            color: Rgba::WHITE,
        }
    }
}

impl Members for Material {
    fn type_name(&self) -> &'static str {
        "Material"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("name", MemberKind::Str),
            MemberSpec::rw("color", MemberKind::Color),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "name" => Some(MemberValue::Str(self.name.clone())),
            "color" => Some(MemberValue::Color(self.color)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("name", MemberValue::Str(v)) => self.name = v,
            ("color", MemberValue::Color(v)) => self.color = v,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Renderer {
    pub enabled: bool,
    pub cast_shadows: bool,
    pub sorting_order: i64,
    pub material: Material,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            enabled: true,
            cast_shadows: true,
            sorting_order: 0,
            material: Material::default(),
        }
    }
}

impl Members for Renderer {
    fn type_name(&self) -> &'static str {
        "Renderer"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("enabled", MemberKind::Bool),
            MemberSpec::rw("castShadows", MemberKind::Bool),
            MemberSpec::rw("sortingOrder", MemberKind::Int),
            MemberSpec::rw("material", MemberKind::Object),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "enabled" => Some(MemberValue::Bool(self.enabled)),
            "castShadows" => Some(MemberValue::Bool(self.cast_shadows)),
            "sortingOrder" => Some(MemberValue::Int(self.sorting_order)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("enabled", MemberValue::Bool(v)) => self.enabled = v,
            ("castShadows", MemberValue::Bool(v)) => self.cast_shadows = v,
            ("sortingOrder", MemberValue::Int(v)) => self.sorting_order = v,
            _ => return false,
        }
        true
    }

    fn object(&self, member: &str) -> Option<&dyn Members> {
        match member {
            "material" => Some(&self.material),
            _ => None,
        }
    }

    fn object_mut(&mut self, member: &str) -> Option<&mut dyn Members> {
        match member {
            "material" => Some(&mut self.material),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub shape: &'static str,
}

impl Default for Mesh {
    fn default() -> Self {
        Self { shape: "Cube" }
    }
}

impl Members for Mesh {
    fn type_name(&self) -> &'static str {
        "Mesh"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[MemberSpec::rw("shape", MemberKind::Enum(MESH_SHAPES))];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "shape" => Some(MemberValue::Enum(self.shape)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("shape", MemberValue::Enum(v)) => self.shape = v,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: &'static str,
    pub enabled: bool,
    pub intensity: f32,
    pub range: f32,
    pub color: Rgba,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: "Point",
            enabled: true,
            intensity: 1.0,
            range: 10.0,
            color: Rgba::WHITE,
        }
    }
}

impl Members for Light {
    fn type_name(&self) -> &'static str {
        "Light"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("type", MemberKind::Enum(LIGHT_TYPES)),
            MemberSpec::rw("enabled", MemberKind::Bool),
            MemberSpec::rw("intensity", MemberKind::Float),
            MemberSpec::rw("range", MemberKind::Float),
            MemberSpec::rw("color", MemberKind::Color),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "type" => Some(MemberValue::Enum(self.kind)),
            "enabled" => Some(MemberValue::Bool(self.enabled)),
            "intensity" => Some(MemberValue::Float(self.intensity)),
            "range" => Some(MemberValue::Float(self.range)),
            "color" => Some(MemberValue::Color(self.color)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("type", MemberValue::Enum(v)) => self.kind = v,
            ("enabled", MemberValue::Bool(v)) => self.enabled = v,
            ("intensity", MemberValue::Float(v)) => self.intensity = v,
            ("range", MemberValue::Float(v)) => self.range = v,
            ("color", MemberValue::Color(v)) => self.color = v,
            _ => return false,
        }
        true
    }
}

// ── Physics ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Rigidbody {
    pub mass: f32,
    pub drag: f32,
    pub use_gravity: bool,
    pub is_kinematic: bool,
    pub velocity: Vec3,
}

impl Default for Rigidbody {
    fn default() -> Self {
        Self {
            mass: 1.0,
            drag: 0.0,
            use_gravity: true,
            is_kinematic: false,
            velocity: Vec3::ZERO,
        }
    }
}

impl Members for Rigidbody {
    fn type_name(&self) -> &'static str {
        "Rigidbody"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("mass", MemberKind::Float),
            MemberSpec::rw("drag", MemberKind::Float),
            MemberSpec::rw("useGravity", MemberKind::Bool),
            MemberSpec::rw("isKinematic", MemberKind::Bool),
            MemberSpec::rw("velocity", MemberKind::Vec3),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "mass" => Some(MemberValue::Float(self.mass)),
            "drag" => Some(MemberValue::Float(self.drag)),
            "useGravity" => Some(MemberValue::Bool(self.use_gravity)),
            "isKinematic" => Some(MemberValue::Bool(self.is_kinematic)),
            "velocity" => Some(MemberValue::Vec3(self.velocity)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("mass", MemberValue::Float(v)) => self.mass = v,
            ("drag", MemberValue::Float(v)) => self.drag = v,
            ("useGravity", MemberValue::Bool(v)) => self.use_gravity = v,
            ("isKinematic", MemberValue::Bool(v)) => self.is_kinematic = v,
            ("velocity", MemberValue::Vec3(v)) => self.velocity = v,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxCollider {
    pub center: Vec3,
    pub size: Vec3,
    pub is_trigger: bool,
}

impl Default for BoxCollider {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            size: Vec3::ONE,
            is_trigger: false,
        }
    }
}

impl Members for BoxCollider {
    fn type_name(&self) -> &'static str {
        "BoxCollider"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("center", MemberKind::Vec3),
            MemberSpec::rw("size", MemberKind::Vec3),
            MemberSpec::rw("isTrigger", MemberKind::Bool),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "center" => Some(MemberValue::Vec3(self.center)),
            "size" => Some(MemberValue::Vec3(self.size)),
            "isTrigger" => Some(MemberValue::Bool(self.is_trigger)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("center", MemberValue::Vec3(v)) => self.center = v,
            ("size", MemberValue::Vec3(v)) => self.size = v,
            ("isTrigger", MemberValue::Bool(v)) => self.is_trigger = v,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mover {
    pub enabled: bool,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl Default for Mover {
    fn default() -> Self {
        Self {
            enabled: true,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }
}

impl Members for Mover {
    fn type_name(&self) -> &'static str {
        "Mover"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("enabled", MemberKind::Bool),
            MemberSpec::rw("velocity", MemberKind::Vec3),
            MemberSpec::rw("angularVelocity", MemberKind::Vec3),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "enabled" => Some(MemberValue::Bool(self.enabled)),
            "velocity" => Some(MemberValue::Vec3(self.velocity)),
            "angularVelocity" => Some(MemberValue::Vec3(self.angular_velocity)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("enabled", MemberValue::Bool(v)) => self.enabled = v,
            ("velocity", MemberValue::Vec3(v)) => self.velocity = v,
            ("angularVelocity", MemberValue::Vec3(v)) => self.angular_velocity = v,
            _ => return false,
        }
        true
    }
}

// ── Motion ──────────────────────────────────────────────────────────

/// Solver entry point of a robot. An empty axis list means the robot
/// cannot be driven.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotIk {
    pub axes: Vec<String>,
    /// Workspace radius override; zero means "use the solver default".
    pub reach: f32,
}

impl Members for RobotIk {
    fn type_name(&self) -> &'static str {
        "RobotIK"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("axes", MemberKind::StrList),
            MemberSpec::rw("reach", MemberKind::Float),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "axes" => Some(MemberValue::StrList(self.axes.clone())),
            "reach" => Some(MemberValue::Float(self.reach)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("axes", MemberValue::StrList(v)) => self.axes = v,
            ("reach", MemberValue::Float(v)) => self.reach = v,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkPath {
    pub robot_ik: Option<NodeId>,
    pub looped: bool,
    pub speed_override: f32,
    pub draw_path: bool,
    pub activation: &'static str,
    pub targets: Vec<NodeId>,
    pub is_active: bool,
    pub is_finished: bool,
}

impl Default for IkPath {
    fn default() -> Self {
        Self {
            robot_ik: None,
            looped: false,
            speed_override: 1.0,
            draw_path: false,
            activation: "Always",
            targets: Vec::new(),
            is_active: false,
            is_finished: false,
        }
    }
}

impl Members for IkPath {
    fn type_name(&self) -> &'static str {
        "IKPath"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("robotIK", MemberKind::NodeRef),
            MemberSpec::rw("loop", MemberKind::Bool),
            MemberSpec::rw("speedOverride", MemberKind::Float),
            MemberSpec::rw("drawPath", MemberKind::Bool),
            MemberSpec::rw("active", MemberKind::Enum(PATH_ACTIVATION)),
            MemberSpec::rw("targets", MemberKind::NodeList),
            MemberSpec::ro("isActive", MemberKind::Bool),
            MemberSpec::ro("isFinished", MemberKind::Bool),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "robotIK" => Some(MemberValue::NodeRef(self.robot_ik)),
            "loop" => Some(MemberValue::Bool(self.looped)),
            "speedOverride" => Some(MemberValue::Float(self.speed_override)),
            "drawPath" => Some(MemberValue::Bool(self.draw_path)),
            "active" => Some(MemberValue::Enum(self.activation)),
            "targets" => Some(MemberValue::NodeList(self.targets.clone())),
            "isActive" => Some(MemberValue::Bool(self.is_active)),
            "isFinished" => Some(MemberValue::Bool(self.is_finished)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("robotIK", MemberValue::NodeRef(v)) => self.robot_ik = v,
            ("loop", MemberValue::Bool(v)) => self.looped = v,
            ("speedOverride", MemberValue::Float(v)) => self.speed_override = v,
            ("drawPath", MemberValue::Bool(v)) => self.draw_path = v,
            ("active", MemberValue::Enum(v)) => self.activation = v,
            ("targets", MemberValue::NodeList(v)) => self.targets = v,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionMode {
    #[default]
    PointToPoint,
    Linear,
}

impl MotionMode {
    pub fn label(&self) -> &'static str {
        match self {
            MotionMode::PointToPoint => "PTP",
            MotionMode::Linear => "LIN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PTP" | "POINTTOPOINT" => Some(MotionMode::PointToPoint),
            "LIN" | "LINEAR" => Some(MotionMode::Linear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IkTarget {
    pub robot_ik: Option<NodeId>,
    pub mode: MotionMode,
    pub axis_correction: Vec<f32>,
    pub turn_correction: bool,
    pub wait_for_signal: bool,
    pub reachable: bool,
}

impl Members for IkTarget {
    fn type_name(&self) -> &'static str {
        "IKTarget"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[
            MemberSpec::rw("robotIK", MemberKind::NodeRef),
            MemberSpec::rw("mode", MemberKind::Enum(MOTION_MODES)),
            MemberSpec::rw("axisCorrection", MemberKind::FloatList),
            MemberSpec::rw("turnCorrection", MemberKind::Bool),
            MemberSpec::rw("waitForSignal", MemberKind::Bool),
            MemberSpec::ro("reachable", MemberKind::Bool),
        ];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "robotIK" => Some(MemberValue::NodeRef(self.robot_ik)),
            "mode" => Some(MemberValue::Enum(self.mode.label())),
            "axisCorrection" => Some(MemberValue::FloatList(self.axis_correction.clone())),
            "turnCorrection" => Some(MemberValue::Bool(self.turn_correction)),
            "waitForSignal" => Some(MemberValue::Bool(self.wait_for_signal)),
            "reachable" => Some(MemberValue::Bool(self.reachable)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("robotIK", MemberValue::NodeRef(v)) => self.robot_ik = v,
            ("mode", MemberValue::Enum(v)) => match MotionMode::parse(v) {
                Some(mode) => self.mode = mode,
                None => return false,
            },
            ("axisCorrection", MemberValue::FloatList(v)) => self.axis_correction = v,
            ("turnCorrection", MemberValue::Bool(v)) => self.turn_correction = v,
            ("waitForSignal", MemberValue::Bool(v)) => self.wait_for_signal = v,
            _ => return false,
        }
        true
    }
}

/// Marker for the node that hosts the motion environment.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionController {
    pub enabled: bool,
}

impl Default for MotionController {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Members for MotionController {
    fn type_name(&self) -> &'static str {
        "MotionController"
    }

    fn specs(&self) -> &'static [MemberSpec] {
        const SPECS: &[MemberSpec] = &[MemberSpec::rw("enabled", MemberKind::Bool)];
        SPECS
    }

    fn read(&self, member: &str) -> Option<MemberValue> {
        match member {
            "enabled" => Some(MemberValue::Bool(self.enabled)),
            _ => None,
        }
    }

    fn write(&mut self, member: &str, value: MemberValue) -> bool {
        match (member, value) {
            ("enabled", MemberValue::Bool(v)) => self.enabled = v,
            _ => return false,
        }
        true
    }
}

scene_component!(
    Renderer,
    Mesh,
    Light,
    Rigidbody,
    BoxCollider,
    Mover,
    RobotIk,
    IkPath,
    IkTarget,
    MotionController,
);

// ── Registry ────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
pub struct ComponentKind {
    pub name: &'static str,
    pub qualified: &'static str,
    /// Structural kinds exist exactly once per node and cannot be added
    /// or removed.
    pub structural: bool,
    pub create: Option<fn() -> Box<dyn SceneComponent>>,
}

impl ComponentKind {
    pub const fn new(
        name: &'static str,
        qualified: &'static str,
        create: fn() -> Box<dyn SceneComponent>,
    ) -> Self {
        Self {
            name,
            qualified,
            structural: false,
            create: Some(create),
        }
    }

    pub fn instantiate(&self) -> Option<Box<dyn SceneComponent>> {
        self.create.map(|create| create())
    }
}

impl std::fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentKind")
            .field("name", &self.name)
            .field("qualified", &self.qualified)
            .field("structural", &self.structural)
            .finish()
    }
}

/// The closed catalog of component kinds the bridge can manipulate.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    kinds: Vec<ComponentKind>,
}

impl ComponentRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(ComponentKind {
            name: TRANSFORM,
            qualified: "core.Transform",
            structural: true,
            create: None,
        });
        registry.register(ComponentKind::new("Renderer", "render.Renderer", || {
            Box::<Renderer>::default()
        }));
        registry.register(ComponentKind::new("Mesh", "render.Mesh", || {
            Box::<Mesh>::default()
        }));
        registry.register(ComponentKind::new("Light", "render.Light", || {
            Box::<Light>::default()
        }));
        registry.register(ComponentKind::new("Rigidbody", "physics.Rigidbody", || {
            Box::<Rigidbody>::default()
        }));
        registry.register(ComponentKind::new("BoxCollider", "physics.BoxCollider", || {
            Box::<BoxCollider>::default()
        }));
        registry.register(ComponentKind::new("Mover", "motion.Mover", || {
            Box::<Mover>::default()
        }));
        registry.register(ComponentKind::new("RobotIK", "motion.RobotIK", || {
            Box::<RobotIk>::default()
        }));
        registry.register(ComponentKind::new("IKPath", "motion.IKPath", || {
            Box::<IkPath>::default()
        }));
        registry.register(ComponentKind::new("IKTarget", "motion.IKTarget", || {
            Box::<IkTarget>::default()
        }));
        registry.register(ComponentKind::new(
            "MotionController",
            "motion.MotionController",
            || Box::<MotionController>::default(),
        ));
        registry
    }

    /// Later registrations replace earlier ones with the same bare name.
    pub fn register(&mut self, kind: ComponentKind) {
        self.kinds.retain(|k| k.name != kind.name);
        self.kinds.push(kind);
    }

    /// Bare name first, then the qualified name, then a case-insensitive
    /// bare name.
    pub fn resolve(&self, name: &str) -> Option<&ComponentKind> {
        let name = name.trim();
        self.kinds
            .iter()
            .find(|k| k.name == name)
            .or_else(|| self.kinds.iter().find(|k| k.qualified == name))
            .or_else(|| self.kinds.iter().find(|k| k.name.eq_ignore_ascii_case(name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.iter().map(|k| k.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::members::{get, set};
    use serde_json::json;

    #[test]
    fn registry_resolves_bare_then_qualified_then_loose_names() {
        let registry = ComponentRegistry::builtin();
        assert_eq!(registry.resolve("Rigidbody").map(|k| k.name), Some("Rigidbody"));
        assert_eq!(registry.resolve("physics.Rigidbody").map(|k| k.name), Some("Rigidbody"));
        assert_eq!(registry.resolve("rigidbody").map(|k| k.name), Some("Rigidbody"));
        assert!(registry.resolve("Teleporter").is_none());
        assert!(registry.resolve("transform").is_some_and(|k| k.structural));
    }

    #[test]
    fn every_instantiable_kind_reports_its_registered_name() {
        let registry = ComponentRegistry::builtin();
        for name in registry.names() {
            let kind = registry.resolve(name).expect("registered");
            if let Some(component) = kind.instantiate() {
                assert_eq!(component.type_name(), name);
            }
        }
    }

    #[test]
    fn renderer_material_color_is_reachable_by_dotted_path() {
        let mut renderer = Renderer::default();
        set(&mut renderer, "material.color", &json!([0.2, 0.4, 0.6])).expect("set color");
        assert_eq!(
            get(&renderer, "material.color").expect("get color"),
            MemberValue::Color(Rgba::new(0.2, 0.4, 0.6, 1.0))
        );
    }

    #[test]
    fn path_status_flags_are_read_only() {
        let mut path = IkPath::default();
        assert!(set(&mut path, "isFinished", &json!(true)).is_err());
        set(&mut path, "Loop", &json!(true)).expect("loop is writable");
        assert!(path.looped);
    }

    #[test]
    fn target_mode_accepts_both_labels() {
        let mut target = IkTarget::default();
        set(&mut target, "mode", &json!("lin")).expect("mode");
        assert_eq!(target.mode, MotionMode::Linear);
        assert_eq!(MotionMode::parse("PointToPoint"), Some(MotionMode::PointToPoint));
    }
}
