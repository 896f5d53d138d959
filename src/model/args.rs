use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// A pointer from one step's argument to a field of an earlier step's result.
///
/// `from_step` must name a step that appears earlier in the same plan. When the
/// field at `path` is absent at execution time, `default` is used, otherwise
/// resolution fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct StepValueReference {
    pub from_step: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts-bindings", ts(type = "unknown"))]
    pub default: Option<Value>,
}

impl StepValueReference {
    pub fn new(from_step: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            from_step: from_step.into(),
            path: path.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Detect a reference in plain JSON: a non-array object whose `fromStep`
    /// and `path` fields are both non-empty strings.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let from_step = obj.get("fromStep")?.as_str().filter(|s| !s.is_empty())?;
        let path = obj.get("path")?.as_str().filter(|s| !s.is_empty())?;
        Some(Self {
            from_step: from_step.to_string(),
            path: path.to_string(),
            default: obj.get("default").cloned(),
        })
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("fromStep".into(), Value::String(self.from_step.clone()));
        obj.insert("path".into(), Value::String(self.path.clone()));
        if let Some(default) = &self.default {
            obj.insert("default".into(), default.clone());
        }
        Value::Object(obj)
    }
}

/// Ordered argument object of a plan step.
pub type ArgMap = IndexMap<String, ArgValue>;

/// A step argument: any JSON-like value, or a reference to an earlier step's
/// result that is substituted at execution time.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ArgValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<ArgValue>),
    Object(ArgMap),
    Reference(StepValueReference),
}

impl ArgValue {
    pub fn is_reference(&self) -> bool {
        matches!(self, ArgValue::Reference(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&StepValueReference> {
        match self {
            ArgValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// True when no reference appears anywhere in the tree.
    pub fn is_literal(&self) -> bool {
        match self {
            ArgValue::Reference(_) => false,
            ArgValue::Array(items) => items.iter().all(ArgValue::is_literal),
            ArgValue::Object(map) => map.values().all(ArgValue::is_literal),
            _ => true,
        }
    }

    /// Render as plain JSON; references keep their `{fromStep, path, default?}` shape.
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Null => Value::Null,
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Number(n) => Value::Number(n.clone()),
            ArgValue::String(s) => Value::String(s.clone()),
            ArgValue::Array(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            ArgValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            ArgValue::Reference(r) => r.to_json(),
        }
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        if let Some(reference) = StepValueReference::from_json(&value) {
            return ArgValue::Reference(reference);
        }
        match value {
            Value::Null => ArgValue::Null,
            Value::Bool(b) => ArgValue::Bool(b),
            Value::Number(n) => ArgValue::Number(n),
            Value::String(s) => ArgValue::String(s),
            Value::Array(items) => ArgValue::Array(items.into_iter().map(ArgValue::from).collect()),
            Value::Object(obj) => ArgValue::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, ArgValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<StepValueReference> for ArgValue {
    fn from(r: StepValueReference) -> Self {
        ArgValue::Reference(r)
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl From<f64> for ArgValue {
    /// Non-finite numbers have no JSON form and become `Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(ArgValue::Null, ArgValue::Number)
    }
}

impl From<u64> for ArgValue {
    fn from(n: u64) -> Self {
        ArgValue::Number(n.into())
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Number(n.into())
    }
}

impl From<ArgMap> for ArgValue {
    fn from(map: ArgMap) -> Self {
        ArgValue::Object(map)
    }
}

/// Build an argument object from key/value pairs.
pub fn arg_map<I, K, V>(pairs: I) -> ArgMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ArgValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ArgValue::from)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_reference_by_shape() {
        let v = ArgValue::from(json!({ "fromStep": "s1", "path": "data.id", "default": "a1" }));
        let r = v.as_reference().expect("reference");
        assert_eq!(r.from_step, "s1");
        assert_eq!(r.path, "data.id");
        assert_eq!(r.default, Some(json!("a1")));
    }

    #[test]
    fn empty_fields_are_not_references() {
        assert!(!ArgValue::from(json!({ "fromStep": "", "path": "data" })).is_reference());
        assert!(!ArgValue::from(json!({ "fromStep": "s1", "path": 3 })).is_reference());
        assert!(!ArgValue::from(json!([{ "x": 1 }])).is_reference());
    }

    #[test]
    fn nested_references_survive_json_round_trip() {
        let original = json!({
            "sequenceId": "seq_1",
            "items": [{ "assetId": { "fromStep": "lookup", "path": "data[0].id" } }]
        });
        let parsed = ArgValue::from(original.clone());
        assert!(!parsed.is_literal());
        assert_eq!(parsed.to_json(), original);
    }

    #[test]
    fn non_finite_numbers_become_null() {
        assert_eq!(ArgValue::from(f64::NAN), ArgValue::Null);
    }
}
