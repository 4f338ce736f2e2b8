use bevy::math::Vec3;
use serde_json::{Map, Value};

use crate::error::{BridgeError, BridgeResult};
use crate::scene::members::{as_bool, as_color, as_float, as_int, as_vec3, Rgba};

/// Action parameters with lenient typed accessors. Explicit `null`
/// counts as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    map: Map<String, Value>,
}

impl Params {
    pub fn new(map: Map<String, Value>) -> Self {
        Self { map }
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.map
    }

    /// The action payload: the `json` field when present (object or JSON
    /// text), otherwise these params.
    pub fn payload(&self) -> BridgeResult<Params> {
        match self.map.get("json") {
            None | Some(Value::Null) => Ok(self.clone()),
            Some(Value::Object(map)) => Ok(Params::new(map.clone())),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text)? {
                Value::Object(map) => Ok(Params::new(map)),
                _ => Err(BridgeError::malformed("'json' must encode an object.")),
            },
            Some(_) => Err(BridgeError::malformed(
                "'json' must be an object or a JSON string.",
            )),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// String value, trimmed; numbers are rendered as text.
    pub fn str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn require_str(&self, key: &str) -> BridgeResult<String> {
        self.str(key)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BridgeError::missing(key))
    }

    pub fn bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        self.typed(key, "a boolean", as_bool)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> BridgeResult<bool> {
        Ok(self.bool(key)?.unwrap_or(default))
    }

    pub fn f32(&self, key: &str) -> BridgeResult<Option<f32>> {
        self.typed(key, "a number", as_float)
    }

    pub fn u64(&self, key: &str) -> BridgeResult<Option<u64>> {
        self.typed(key, "a non-negative integer", |v| {
            as_int(v).and_then(|i| u64::try_from(i).ok())
        })
    }

    pub fn vec3(&self, key: &str) -> BridgeResult<Option<Vec3>> {
        self.typed(key, "a 3-vector", as_vec3)
    }

    pub fn color(&self, key: &str) -> BridgeResult<Option<Rgba>> {
        self.typed(key, "a color", as_color)
    }

    pub fn floats(&self, key: &str) -> BridgeResult<Vec<f32>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| as_float(v).ok_or_else(|| invalid(key, "a list of numbers")))
                .collect(),
            Some(_) => Err(invalid(key, "a list of numbers")),
        }
    }

    pub fn object(&self, key: &str) -> BridgeResult<Option<&Map<String, Value>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(invalid(key, "an object")),
        }
    }

    pub fn nested(&self, key: &str) -> BridgeResult<Params> {
        Ok(self
            .object(key)?
            .map(|map| Params::new(map.clone()))
            .unwrap_or_default())
    }

    /// First value under any of `keys`.
    pub fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.str(key))
    }

    fn typed<T>(
        &self,
        key: &str,
        expected: &str,
        parse: impl Fn(&Value) -> Option<T>,
    ) -> BridgeResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => parse(value).map(Some).ok_or_else(|| invalid(key, expected)),
        }
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self::new(map)
    }
}

fn invalid(key: &str, expected: &str) -> BridgeError {
    BridgeError::malformed(format!("'{key}' must be {expected}."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => Params::new(map),
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn json_field_takes_precedence_as_text_or_object() {
        let text = params(json!({ "robot": "outer", "json": "{\"robot\":\"inner\"}" }));
        assert_eq!(text.payload().unwrap().str("robot").as_deref(), Some("inner"));

        let object = params(json!({ "robot": "outer", "json": { "robot": "inner" } }));
        assert_eq!(object.payload().unwrap().str("robot").as_deref(), Some("inner"));

        let direct = params(json!({ "robot": "outer" }));
        assert_eq!(direct.payload().unwrap().str("robot").as_deref(), Some("outer"));

        assert!(params(json!({ "json": "[1]" })).payload().is_err());
        assert!(params(json!({ "json": 3 })).payload().is_err());
    }

    #[test]
    fn typed_getters_reject_bad_values_and_ignore_null() {
        let p = params(json!({
            "pos": [1, "2", 3.5],
            "bad": [1, 2],
            "flag": "yes",
            "none": null,
            "count": 4,
        }));
        assert_eq!(p.vec3("pos").unwrap(), Some(Vec3::new(1.0, 2.0, 3.5)));
        assert!(p.vec3("bad").is_err());
        assert_eq!(p.bool("flag").unwrap(), Some(true));
        assert_eq!(p.bool("none").unwrap(), None);
        assert_eq!(p.u64("count").unwrap(), Some(4));
        assert!(matches!(
            p.require_str("missing"),
            Err(BridgeError::RequestMalformed { .. })
        ));
        assert_eq!(p.str("count").as_deref(), Some("4"));
    }
}
