use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, rc::Rc};

/// The map type backing [Value::Object].
pub type Map = BTreeMap<String, Value>;

/// A dynamically typed, reference counted state tree.
///
/// Arrays and objects are stored behind an [Rc], so cloning a
/// [Value] is cheap and a clone shares all of its subtrees with the
/// original. Mutation goes through [Rc::make_mut], which copies a
/// node only if it is shared, meaning that a subtree which is not
/// touched by a mutation keeps its identity (see [Value::same()]).
/// Listeners and UI bindings can rely on this to skip work for
/// unchanged parts of the state.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Map>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// An empty object.
    pub fn object() -> Self {
        Value::Object(Rc::new(Map::new()))
    }

    /// An empty array.
    pub fn array() -> Self {
        Value::Array(Rc::new(Vec::new()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Look up `key` if this value is an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Mutable access to `key` if this value is an object. Only the
    /// path down to the returned value is copied if it was shared.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Object(map) => Rc::make_mut(map).get_mut(key),
            _ => None,
        }
    }

    /// Follow a path of object keys.
    pub fn at(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(self, |value, key| value.get(key))
    }

    /// Follow a path of object keys, copying (only) the nodes along
    /// the way that are shared.
    pub fn at_mut(&mut self, path: &[&str]) -> Option<&mut Value> {
        let mut value = self;
        for key in path {
            value = value.get_mut(key)?;
        }
        Some(value)
    }

    /// Insert `value` under `key`. A value which is not an object is
    /// replaced with an empty object first.
    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> Option<Value> {
        self.object_mut().insert(key.into(), value.into())
    }

    /// Mutable access to `key`, inserting [Value::Null] if it is
    /// absent. A value which is not an object is replaced with an
    /// empty object first.
    pub fn entry<K: Into<String>>(&mut self, key: K) -> &mut Value {
        self.object_mut().entry(key.into()).or_insert(Value::Null)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) if map.contains_key(key) => Rc::make_mut(map).remove(key),
            _ => None,
        }
    }

    /// Append to an array. A value which is not an array is replaced
    /// with an empty array first.
    pub fn push<V: Into<Value>>(&mut self, value: V) {
        if !matches!(self, Value::Array(_)) {
            *self = Value::array();
        }
        if let Value::Array(items) = self {
            Rc::make_mut(items).push(value.into());
        }
    }

    /// Builder form of [Value::insert()].
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    fn object_mut(&mut self) -> &mut Map {
        if !self.is_object() {
            *self = Value::object();
        }
        match self {
            Value::Object(map) => Rc::make_mut(map),
            _ => unreachable!("value was just replaced with an object"),
        }
    }

    /// Identity comparison: arrays and objects are the same only if
    /// they share the same allocation, scalars are compared by value.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(_), _) | (Value::Object(_), _) => false,
            (_, Value::Array(_)) | (_, Value::Object(_)) => false,
            (a, b) => a == b,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => items.iter().map(Value::to_json).collect(),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_), Value::Float(_))
            | (Value::Float(_), Value::Int(_))
            | (Value::Float(_), Value::Float(_)) => self.as_f64() == other.as_f64(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => serializer.collect_seq(items.iter()),
            Value::Object(map) => serializer.collect_map(map.iter()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::Array(Rc::new(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Object(Rc::new(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(Rc::new(map))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(option: Option<T>) -> Self {
        option.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::Value;
    use serde_json::json;

    #[test]
    fn mutation_keeps_untouched_subtrees() {
        let prev = Value::from(json!({"a": {"b": {"c": 1}}, "d": {"e": [1, 2]}}));
        let mut next = prev.clone();

        *next.at_mut(&["a", "b", "c"]).unwrap() = Value::from(2);

        assert_eq!(Some(&Value::from(1)), prev.at(&["a", "b", "c"]));
        assert_eq!(Some(&Value::from(2)), next.at(&["a", "b", "c"]));
        assert!(next.get("d").unwrap().same(prev.get("d").unwrap()));
        assert!(!next.get("a").unwrap().same(prev.get("a").unwrap()));
        assert!(!next.same(&prev));
    }

    #[test]
    fn entry_creates_intermediate_objects() {
        let mut value = Value::Null;
        value.entry("effects").entry("counter").insert("add", true);

        assert_eq!(Value::from(json!({"effects": {"counter": {"add": true}}})), value);
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::from("1"));
        assert_eq!(Some(3), Value::Float(3.0).as_i64());
    }

    #[test]
    fn json_conversion() {
        let json = json!({"list": [1, 2.5, "x", null, true]});
        let value = Value::from(json.clone());
        assert_eq!(json, value.to_json());
        assert_eq!(json.to_string(), serde_json::to_string(&value).unwrap());

        let parsed: Value = serde_json::from_str(r#"{"n": 5}"#).unwrap();
        assert_eq!(Some(5), parsed.get("n").and_then(Value::as_i64));
    }

    #[test]
    fn scalars_are_the_same_by_value() {
        assert!(Value::from(4).same(&Value::from(4)));
        assert!(!Value::object().same(&Value::object()));
        let object = Value::object();
        assert!(object.same(&object.clone()));
    }
}
