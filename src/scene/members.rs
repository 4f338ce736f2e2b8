//! Dynamic member access for components.
//!
//! Every component kind publishes a static table of [`MemberSpec`]s plus
//! `read`/`write` over canonical member names. Everything in this module
//! works on top of that table: case-insensitive resolution, dotted nested
//! paths, and conversion of loose JSON into the member's declared type.

use bevy::math::Vec3;
use serde_json::{json, Map, Value};

use super::NodeId;
use crate::error::MemberError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Str,
    Int,
    Float,
    Bool,
    Vec3,
    Color,
    Enum(&'static [&'static str]),
    StrList,
    FloatList,
    NodeRef,
    NodeList,
    /// Intermediate object reachable through a dotted path.
    Object,
    /// Anything else; stored as raw JSON.
    Json,
}

impl MemberKind {
    pub fn label(&self) -> &'static str {
        match self {
            MemberKind::Str => "string",
            MemberKind::Int => "int",
            MemberKind::Float => "float",
            MemberKind::Bool => "bool",
            MemberKind::Vec3 => "vector3",
            MemberKind::Color => "color",
            MemberKind::Enum(_) => "enum",
            MemberKind::StrList => "string list",
            MemberKind::FloatList => "float list",
            MemberKind::NodeRef => "node reference",
            MemberKind::NodeList => "node list",
            MemberKind::Object => "object",
            MemberKind::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSpec {
    pub name: &'static str,
    pub kind: MemberKind,
    pub writable: bool,
}

impl MemberSpec {
    pub const fn rw(name: &'static str, kind: MemberKind) -> Self {
        Self {
            name,
            kind,
            writable: true,
        }
    }

    pub const fn ro(name: &'static str, kind: MemberKind) -> Self {
        Self {
            name,
            kind,
            writable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberValue {
    Str(String),
    Int(i64),
    Float(f32),
    Bool(bool),
    Vec3(Vec3),
    Color(Rgba),
    Enum(&'static str),
    StrList(Vec<String>),
    FloatList(Vec<f32>),
    NodeRef(Option<NodeId>),
    NodeList(Vec<NodeId>),
    Json(Value),
}

impl MemberValue {
    pub fn to_json(&self) -> Value {
        match self {
            MemberValue::Str(s) => Value::String(s.clone()),
            MemberValue::Int(i) => json!(i),
            MemberValue::Float(f) => json!(f),
            MemberValue::Bool(b) => Value::Bool(*b),
            MemberValue::Vec3(v) => vec3_json(*v),
            MemberValue::Color(c) => json!({ "r": c.r, "g": c.g, "b": c.b, "a": c.a }),
            MemberValue::Enum(name) => Value::String((*name).to_string()),
            MemberValue::StrList(items) => json!(items),
            MemberValue::FloatList(items) => json!(items),
            MemberValue::NodeRef(id) => id.map(|id| json!(id.0)).unwrap_or(Value::Null),
            MemberValue::NodeList(ids) => Value::Array(ids.iter().map(|id| json!(id.0)).collect()),
            MemberValue::Json(v) => v.clone(),
        }
    }
}

pub fn vec3_json(v: Vec3) -> Value {
    json!({ "x": v.x, "y": v.y, "z": v.z })
}

/// Capability interface implemented by every component kind and by the
/// nested objects they expose.
pub trait Members {
    fn type_name(&self) -> &'static str;

    fn specs(&self) -> &'static [MemberSpec];

    /// Reads a member by its canonical name.
    fn read(&self, member: &str) -> Option<MemberValue>;

    /// Writes an already converted value. Returns `false` when the value
    /// does not fit the member.
    fn write(&mut self, member: &str, value: MemberValue) -> bool;

    fn object(&self, _member: &str) -> Option<&dyn Members> {
        None
    }

    fn object_mut(&mut self, _member: &str) -> Option<&mut dyn Members> {
        None
    }
}

/// Case-insensitive lookup of a member spec.
pub fn resolve<M: Members + ?Sized>(target: &M, name: &str) -> Option<&'static MemberSpec> {
    let name = name.trim();
    let specs = target.specs();
    specs
        .iter()
        .find(|spec| spec.name == name)
        .or_else(|| specs.iter().find(|spec| spec.name.eq_ignore_ascii_case(name)))
}

/// Reads a possibly dotted member path.
pub fn get<M: Members + ?Sized>(target: &M, path: &str) -> Result<MemberValue, MemberError> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(not_found(target.type_name(), path));
    };
    let Some((first, rest)) = parents.split_first() else {
        return read_direct(target, last);
    };
    let spec = object_spec(target, first, path)?;
    let mut current = target
        .object(spec.name)
        .ok_or_else(|| broken(path, first))?;
    for segment in rest {
        let spec = object_spec(current, segment, path)?;
        current = current
            .object(spec.name)
            .ok_or_else(|| broken(path, segment))?;
    }
    read_direct(current, last)
}

/// Converts `raw` and assigns it to a possibly dotted member path. A broken
/// link anywhere in the chain fails only this assignment.
pub fn set<M: Members + ?Sized>(target: &mut M, path: &str, raw: &Value) -> Result<(), MemberError> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(not_found(target.type_name(), path));
    };
    let Some((first, rest)) = parents.split_first() else {
        return set_direct(target, last, raw);
    };
    let spec = object_spec(target, first, path)?;
    let mut current = target
        .object_mut(spec.name)
        .ok_or_else(|| broken(path, first))?;
    for segment in rest {
        let spec = object_spec(current, segment, path)?;
        current = current
            .object_mut(spec.name)
            .ok_or_else(|| broken(path, segment))?;
    }
    set_direct(current, last, raw)
}

/// Applies a property bag, collecting per-key failures instead of
/// stopping at the first one.
pub fn apply_properties<M: Members + ?Sized>(target: &mut M, props: &Map<String, Value>) -> Vec<String> {
    let mut warnings = Vec::new();
    for (key, value) in props {
        if let Err(err) = set(target, key, value) {
            tracing::warn!(component = target.type_name(), key = %key, error = %err, "property not applied");
            warnings.push(err.to_string());
        }
    }
    warnings
}

/// Every readable member as JSON, nested objects included.
pub fn snapshot<M: Members + ?Sized>(target: &M) -> Map<String, Value> {
    let mut out = Map::new();
    for spec in target.specs() {
        let value = if spec.kind == MemberKind::Object {
            target
                .object(spec.name)
                .map(|obj| Value::Object(snapshot(obj)))
        } else {
            target.read(spec.name).map(|v| v.to_json())
        };
        if let Some(value) = value {
            out.insert(spec.name.to_string(), value);
        }
    }
    out
}

fn read_direct<M: Members + ?Sized>(target: &M, name: &str) -> Result<MemberValue, MemberError> {
    let spec = resolve(target, name).ok_or_else(|| not_found(target.type_name(), name))?;
    if spec.kind == MemberKind::Object {
        return target
            .object(spec.name)
            .map(|obj| MemberValue::Json(Value::Object(snapshot(obj))))
            .ok_or_else(|| not_found(target.type_name(), name));
    }
    target
        .read(spec.name)
        .ok_or_else(|| not_found(target.type_name(), name))
}

fn set_direct<M: Members + ?Sized>(target: &mut M, name: &str, raw: &Value) -> Result<(), MemberError> {
    let spec = resolve(target, name).ok_or_else(|| not_found(target.type_name(), name))?;
    if spec.kind == MemberKind::Object {
        // An object literal assigned to an object member is applied key by key.
        let (Some(props), Some(obj)) = (raw.as_object(), target.object_mut(spec.name)) else {
            return Err(conversion(spec, raw));
        };
        for (key, value) in props {
            set(obj, key, value)?;
        }
        return Ok(());
    }
    if !spec.writable {
        return Err(MemberError::ReadOnly {
            owner: target.type_name().to_string(),
            member: spec.name.to_string(),
        });
    }
    let value = convert(raw, spec)?;
    if target.write(spec.name, value) {
        Ok(())
    } else {
        Err(conversion(spec, raw))
    }
}

fn object_spec<M: Members + ?Sized>(
    target: &M,
    segment: &str,
    path: &str,
) -> Result<&'static MemberSpec, MemberError> {
    resolve(target, segment)
        .filter(|spec| spec.kind == MemberKind::Object)
        .ok_or_else(|| broken(path, segment))
}

/// Converts loose JSON into the declared type of `spec`.
pub fn convert(raw: &Value, spec: &MemberSpec) -> Result<MemberValue, MemberError> {
    let fail = || conversion(spec, raw);
    let value = match spec.kind {
        MemberKind::Str => match raw {
            Value::String(s) => MemberValue::Str(s.clone()),
            Value::Number(n) => MemberValue::Str(n.to_string()),
            Value::Bool(b) => MemberValue::Str(b.to_string()),
            _ => return Err(fail()),
        },
        MemberKind::Int => MemberValue::Int(as_int(raw).ok_or_else(fail)?),
        MemberKind::Float => MemberValue::Float(as_float(raw).ok_or_else(fail)?),
        MemberKind::Bool => MemberValue::Bool(as_bool(raw).ok_or_else(fail)?),
        MemberKind::Vec3 => MemberValue::Vec3(as_vec3(raw).ok_or_else(fail)?),
        MemberKind::Color => MemberValue::Color(as_color(raw).ok_or_else(fail)?),
        MemberKind::Enum(variants) => MemberValue::Enum(as_variant(raw, variants).ok_or_else(fail)?),
        MemberKind::StrList => match raw {
            Value::String(s) => MemberValue::StrList(vec![s.clone()]),
            Value::Array(items) => MemberValue::StrList(
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(fail)?,
            ),
            _ => return Err(fail()),
        },
        MemberKind::FloatList => match raw {
            Value::Array(items) => MemberValue::FloatList(
                items
                    .iter()
                    .map(as_float)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(fail)?,
            ),
            _ => MemberValue::FloatList(vec![as_float(raw).ok_or_else(fail)?]),
        },
        MemberKind::NodeRef => match raw {
            Value::Null => MemberValue::NodeRef(None),
            _ => MemberValue::NodeRef(Some(as_node_id(raw).ok_or_else(fail)?)),
        },
        MemberKind::NodeList => match raw {
            Value::Array(items) => MemberValue::NodeList(
                items
                    .iter()
                    .map(as_node_id)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(fail)?,
            ),
            _ => return Err(fail()),
        },
        MemberKind::Object => return Err(fail()),
        MemberKind::Json => MemberValue::Json(raw.clone()),
    };
    Ok(value)
}

pub fn as_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub fn as_float(raw: &Value) -> Option<f32> {
    match raw {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// `[x, y, z]` or `{"x":..,"y":..,"z":..}`.
pub fn as_vec3(raw: &Value) -> Option<Vec3> {
    match raw {
        Value::Array(items) if items.len() == 3 => Some(Vec3::new(
            as_float(&items[0])?,
            as_float(&items[1])?,
            as_float(&items[2])?,
        )),
        Value::Object(map) => Some(Vec3::new(
            as_float(map.get("x")?)?,
            as_float(map.get("y")?)?,
            as_float(map.get("z")?)?,
        )),
        _ => None,
    }
}

/// `[r, g, b]`, `[r, g, b, a]` or `{"r":..,"g":..,"b":..,"a"?:..}`.
/// Alpha defaults to 1.
pub fn as_color(raw: &Value) -> Option<Rgba> {
    match raw {
        Value::Array(items) if items.len() == 3 || items.len() == 4 => Some(Rgba::new(
            as_float(&items[0])?,
            as_float(&items[1])?,
            as_float(&items[2])?,
            match items.get(3) {
                Some(a) => as_float(a)?,
                None => 1.0,
            },
        )),
        Value::Object(map) => Some(Rgba::new(
            as_float(map.get("r")?)?,
            as_float(map.get("g")?)?,
            as_float(map.get("b")?)?,
            match map.get("a") {
                Some(a) => as_float(a)?,
                None => 1.0,
            },
        )),
        _ => None,
    }
}

fn as_variant(raw: &Value, variants: &'static [&'static str]) -> Option<&'static str> {
    match raw {
        Value::String(s) => {
            let s = s.trim();
            variants.iter().copied().find(|v| v.eq_ignore_ascii_case(s))
        }
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| variants.get(usize::try_from(i).ok()?))
            .copied(),
        _ => None,
    }
}

fn as_node_id(raw: &Value) -> Option<NodeId> {
    match raw {
        Value::Number(n) => n.as_u64().map(NodeId),
        Value::Object(map) => map.get("instanceID").and_then(Value::as_u64).map(NodeId),
        _ => None,
    }
}

fn not_found(owner: &str, member: &str) -> MemberError {
    MemberError::NotFound {
        owner: owner.to_string(),
        member: member.to_string(),
    }
}

fn broken(path: &str, segment: &str) -> MemberError {
    MemberError::BrokenPath {
        path: path.to_string(),
        segment: segment.to_string(),
    }
}

fn conversion(spec: &MemberSpec, raw: &Value) -> MemberError {
    MemberError::Conversion {
        member: spec.name.to_string(),
        expected: spec.kind.label(),
        value: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Inner {
        color: Option<Rgba>,
    }

    impl Members for Inner {
        fn type_name(&self) -> &'static str {
            "Inner"
        }

        fn specs(&self) -> &'static [MemberSpec] {
            const SPECS: &[MemberSpec] = &[MemberSpec::rw("color", MemberKind::Color)];
            SPECS
        }

        fn read(&self, member: &str) -> Option<MemberValue> {
            match member {
                "color" => Some(MemberValue::Color(self.color.unwrap_or(Rgba::WHITE))),
                _ => None,
            }
        }

        fn write(&mut self, member: &str, value: MemberValue) -> bool {
            match (member, value) {
                ("color", MemberValue::Color(c)) => self.color = Some(c),
                _ => return false,
            }
            true
        }
    }

    #[derive(Default)]
    struct Probe {
        speed: f32,
        label: String,
        id: i64,
        inner: Inner,
    }

    impl Members for Probe {
        fn type_name(&self) -> &'static str {
            "Probe"
        }

        fn specs(&self) -> &'static [MemberSpec] {
            const SPECS: &[MemberSpec] = &[
                MemberSpec::rw("speed", MemberKind::Float),
                MemberSpec::rw("label", MemberKind::Str),
                MemberSpec::ro("id", MemberKind::Int),
                MemberSpec::rw("inner", MemberKind::Object),
            ];
            SPECS
        }

        fn read(&self, member: &str) -> Option<MemberValue> {
            match member {
                "speed" => Some(MemberValue::Float(self.speed)),
                "label" => Some(MemberValue::Str(self.label.clone())),
                "id" => Some(MemberValue::Int(self.id)),
                _ => None,
            }
        }

        fn write(&mut self, member: &str, value: MemberValue) -> bool {
            match (member, value) {
                ("speed", MemberValue::Float(v)) => self.speed = v,
                ("label", MemberValue::Str(v)) => self.label = v,
                _ => return false,
            }
            true
        }

        fn object(&self, member: &str) -> Option<&dyn Members> {
            (member == "inner").then_some(&self.inner as &dyn Members)
        }

        fn object_mut(&mut self, member: &str) -> Option<&mut dyn Members> {
            (member == "inner").then_some(&mut self.inner as &mut dyn Members)
        }
    }

    #[test]
    fn resolution_ignores_case() {
        let mut probe = Probe::default();
        set(&mut probe, "SPEED", &json!("2.5")).expect("set speed");
        assert_eq!(probe.speed, 2.5);
        assert_eq!(get(&probe, "Speed").expect("get"), MemberValue::Float(2.5));
    }

    #[test]
    fn nested_path_writes_the_last_segment() {
        let mut probe = Probe::default();
        set(&mut probe, "inner.color", &json!([1, 0, 0])).expect("set nested");
        assert_eq!(probe.inner.color, Some(Rgba::new(1.0, 0.0, 0.0, 1.0)));

        let err = set(&mut probe, "label.color", &json!([1, 0, 0])).unwrap_err();
        assert!(matches!(err, MemberError::BrokenPath { .. }));
        let err = set(&mut probe, "missing.color", &json!([1, 0, 0])).unwrap_err();
        assert!(matches!(err, MemberError::BrokenPath { .. }));
    }

    #[test]
    fn bulk_apply_keeps_going_after_bad_keys() {
        let mut probe = Probe::default();
        let props = json!({ "speed": 4, "bogus": 1, "id": 9, "label": "arm" });
        let warnings = apply_properties(&mut probe, props.as_object().unwrap());
        assert_eq!(warnings.len(), 2);
        assert_eq!(probe.speed, 4.0);
        assert_eq!(probe.label, "arm");
        assert_eq!(probe.id, 0);
    }

    #[test]
    fn object_literal_applies_into_nested_object() {
        let mut probe = Probe::default();
        set(&mut probe, "inner", &json!({ "color": { "r": 0, "g": 1, "b": 0, "a": 0.5 } }))
            .expect("set object");
        assert_eq!(probe.inner.color, Some(Rgba::new(0.0, 1.0, 0.0, 0.5)));
        let snap = snapshot(&probe);
        assert_eq!(snap["inner"]["color"]["g"], json!(1.0));
    }

    #[test]
    fn conversions_follow_declared_kinds() {
        let spec = MemberSpec::rw("v", MemberKind::Vec3);
        assert_eq!(
            convert(&json!([1, 2, 3]), &spec).unwrap(),
            MemberValue::Vec3(Vec3::new(1.0, 2.0, 3.0))
        );
        assert!(convert(&json!([1, 2]), &spec).is_err());

        let spec = MemberSpec::rw("c", MemberKind::Color);
        assert_eq!(
            convert(&json!([0.1, 0.2, 0.3]), &spec).unwrap(),
            MemberValue::Color(Rgba::new(0.1, 0.2, 0.3, 1.0))
        );
        assert!(convert(&json!([0.1, 0.2, 0.3, 0.4, 0.5]), &spec).is_err());

        let spec = MemberSpec::rw("e", MemberKind::Enum(&["Point", "Spot"]));
        assert_eq!(convert(&json!("spot"), &spec).unwrap(), MemberValue::Enum("Spot"));
        assert!(convert(&json!("laser"), &spec).is_err());

        let spec = MemberSpec::rw("b", MemberKind::Bool);
        assert_eq!(convert(&json!("TRUE"), &spec).unwrap(), MemberValue::Bool(true));

        let spec = MemberSpec::rw("i", MemberKind::Int);
        assert_eq!(convert(&json!(3.0), &spec).unwrap(), MemberValue::Int(3));
        assert!(convert(&json!(3.5), &spec).is_err());
    }

    mod round_trip {
        use super::*;
        use crate::scene::components::{Light, Renderer, Rigidbody, LIGHT_TYPES};
        use proptest::prelude::*;

        fn close(a: f32, b: f32) -> bool {
            (a - b).abs() <= 1e-4 * a.abs().max(1.0)
        }

        fn unit() -> impl Strategy<Value = f32> {
            0.0f32..=1.0
        }

        fn color_of(value: MemberValue) -> Option<Rgba> {
            match value {
                MemberValue::Color(c) => Some(c),
                _ => None,
            }
        }

        proptest! {
            #[test]
            fn scalars_read_back_as_written(
                mass in -1.0e6f32..1.0e6,
                gravity in any::<bool>(),
                order in any::<i64>(),
                label in "\\PC{0,24}",
            ) {
                let mut body = Rigidbody::default();
                set(&mut body, "mass", &json!(mass)).unwrap();
                set(&mut body, "useGravity", &json!(gravity)).unwrap();
                match get(&body, "mass").unwrap() {
                    MemberValue::Float(v) => prop_assert!(close(v, mass), "{v} != {mass}"),
                    other => prop_assert!(false, "mass read back as {other:?}"),
                }
                prop_assert_eq!(get(&body, "useGravity").unwrap(), MemberValue::Bool(gravity));

                let mut renderer = Renderer::default();
                set(&mut renderer, "sortingOrder", &json!(order)).unwrap();
                set(&mut renderer, "material.name", &json!(label)).unwrap();
                prop_assert_eq!(get(&renderer, "sortingOrder").unwrap(), MemberValue::Int(order));
                prop_assert_eq!(get(&renderer, "material.name").unwrap(), MemberValue::Str(label));
            }

            #[test]
            fn vectors_read_back_within_tolerance(
                x in -1.0e4f32..1.0e4,
                y in -1.0e4f32..1.0e4,
                z in -1.0e4f32..1.0e4,
                as_object in any::<bool>(),
            ) {
                let raw = if as_object {
                    json!({ "x": x, "y": y, "z": z })
                } else {
                    json!([x, y, z])
                };
                let mut body = Rigidbody::default();
                set(&mut body, "velocity", &raw).unwrap();
                match get(&body, "velocity").unwrap() {
                    MemberValue::Vec3(v) => {
                        prop_assert!(close(v.x, x) && close(v.y, y) && close(v.z, z), "{v:?}");
                    }
                    other => prop_assert!(false, "velocity read back as {other:?}"),
                }
            }

            #[test]
            fn colors_read_back_with_optional_alpha(
                r in unit(),
                g in unit(),
                b in unit(),
                alpha in proptest::option::of(unit()),
            ) {
                let raw = match alpha {
                    Some(a) => json!([r, g, b, a]),
                    None => json!([r, g, b]),
                };
                let expected = Rgba::new(r, g, b, alpha.unwrap_or(1.0));

                let mut light = Light::default();
                set(&mut light, "color", &raw).unwrap();
                let mut renderer = Renderer::default();
                set(&mut renderer, "material.color", &raw).unwrap();

                for read in [get(&light, "color"), get(&renderer, "material.color")] {
                    let c = color_of(read.unwrap());
                    prop_assert!(c.is_some());
                    let c = c.unwrap_or(Rgba::WHITE);
                    prop_assert!(
                        close(c.r, expected.r)
                            && close(c.g, expected.g)
                            && close(c.b, expected.b)
                            && close(c.a, expected.a),
                        "{c:?} != {expected:?}"
                    );
                }
            }

            #[test]
            fn enums_read_back_in_canonical_case(index in 0..LIGHT_TYPES.len(), upper in any::<bool>()) {
                let variant = LIGHT_TYPES[index];
                let written = if upper {
                    variant.to_ascii_uppercase()
                } else {
                    variant.to_ascii_lowercase()
                };
                let mut light = Light::default();
                set(&mut light, "TYPE", &json!(written)).unwrap();
                prop_assert_eq!(get(&light, "type").unwrap(), MemberValue::Enum(variant));
            }
        }
    }
}
