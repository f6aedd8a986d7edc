//! Property path resolution.
//!
//! A [`Path`] names a value inside a target: a dotted property path, an
//! arbitrary extractor function, or a recorded [`Puppet`].

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StreamError};
use crate::func::ValueFn;
use crate::puppet::Puppet;
use crate::value::{Dynamic, Key, Value};

#[derive(Clone)]
pub enum Path {
    /// The target itself.
    Identity,
    /// Dot separated property names, e.g. `"publisher.name"`.
    Dotted(String),
    Func(ValueFn),
    Puppet(Puppet),
}

impl Path {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Path::Func(Arc::new(f))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Identity => f.write_str("Identity"),
            Path::Dotted(path) => f.debug_tuple("Dotted").field(path).finish(),
            Path::Func(_) => f.write_str("Func(..)"),
            Path::Puppet(puppet) => f.debug_tuple("Puppet").field(puppet).finish(),
        }
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Path::Dotted(path.to_string())
    }
}

impl From<String> for Path {
    fn from(path: String) -> Self {
        Path::Dotted(path)
    }
}

impl From<Puppet> for Path {
    fn from(puppet: Puppet) -> Self {
        Path::Puppet(puppet)
    }
}

/// Resolves a [`Path`] against a target value.
///
/// For objects each segment is tried as a getter (`get_<name>`,
/// `has_<name>`, `<name>`), then as a public property, then as an index.
/// Arrays resolve by key and yield `Null` for a missing key.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyAccessor;

impl PropertyAccessor {
    /// Resolve `path` against `target`. Fails with
    /// [`StreamError::PropertyUnreadable`] when a segment meets a scalar or an
    /// object exposing nothing under that name.
    pub fn get_value(&self, target: &Value, path: &Path) -> Result<Value> {
        match path {
            Path::Identity => Ok(target.clone()),
            Path::Func(f) => f(target),
            Path::Puppet(puppet) => puppet.play(target.clone()),
            Path::Dotted(path) => {
                let mut current = target.clone();
                for segment in path.split('.') {
                    current = read_property(&current, segment)?;
                }
                Ok(current)
            }
        }
    }
}

fn read_property(target: &Value, name: &str) -> Result<Value> {
    match target {
        Value::Array(elements) => Ok(elements
            .get(&Key::parse(name))
            .cloned()
            .unwrap_or(Value::Null)),
        Value::Object(object) => read_object_property(object.as_ref(), name),
        _ => Err(StreamError::PropertyUnreadable(name.to_string())),
    }
}

fn read_object_property(object: &dyn Dynamic, name: &str) -> Result<Value> {
    let getters = [format!("get_{name}"), format!("has_{name}"), name.to_string()];
    for getter in &getters {
        if let Some(result) = object.call(getter, &[]) {
            return result;
        }
    }
    if let Some(value) = object.property(name) {
        return Ok(value);
    }
    if let Some(value) = object.offset(&Key::parse(name)) {
        return Ok(value);
    }
    Err(StreamError::PropertyUnreadable(name.to_string()))
}

/// Extractor for `path`, usable wherever a value function is expected.
///
/// ```
/// use streams_rs::{property, Stream, Value};
///
/// let people = Value::from(serde_json::json!([
///     {"name": "John", "age": 33},
///     {"name": "Jolka", "age": 21},
/// ]));
/// let total = Stream::of(people).sum_by(property::value("age")).unwrap();
/// assert_eq!(total, Value::Int(54));
/// ```
pub fn value(path: impl Into<Path>) -> impl Fn(&Value) -> Result<Value> + Send + Sync + 'static {
    let path = path.into();
    move |target| PropertyAccessor.get_value(target, &path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Elements;
    use serde_json::json;

    #[derive(Debug)]
    struct Sample {
        property1: Value,
        property2: Value,
    }

    impl Dynamic for Sample {
        fn type_name(&self) -> &str {
            "Sample"
        }

        fn property(&self, name: &str) -> Option<Value> {
            (name == "property1").then(|| self.property1.clone())
        }

        fn call(&self, method: &str, _args: &[Value]) -> Option<Result<Value>> {
            match method {
                "get_property2" => Some(Ok(self.property2.clone())),
                _ => None,
            }
        }
    }

    #[derive(Debug)]
    struct Bag(Elements);

    impl Dynamic for Bag {
        fn type_name(&self) -> &str {
            "Bag"
        }

        fn offset(&self, key: &Key) -> Option<Value> {
            self.0.get(key).cloned()
        }
    }

    fn sample(p1: impl Into<Value>, p2: impl Into<Value>) -> Value {
        Value::object(Sample {
            property1: p1.into(),
            property2: p2.into(),
        })
    }

    #[test]
    fn test_public_property() {
        let v = PropertyAccessor.get_value(&sample("p1", "p2"), &"property1".into());
        assert_eq!(v.unwrap(), Value::from("p1"));
    }

    #[test]
    fn test_getter_is_preferred() {
        let v = PropertyAccessor.get_value(&sample("p1", "p2"), &"property2".into());
        assert_eq!(v.unwrap(), Value::from("p2"));
    }

    #[test]
    fn test_array_key_and_missing_key() {
        let target = Value::from(json!({"prop1": "p1"}));
        assert_eq!(
            PropertyAccessor.get_value(&target, &"prop1".into()).unwrap(),
            Value::from("p1")
        );
        assert_eq!(
            PropertyAccessor.get_value(&target, &"prop2".into()).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_nested_dotted_path() {
        let target = sample(Value::from(json!({"nestedProp": "value"})), "p2");
        let v = PropertyAccessor.get_value(&target, &"property1.nestedProp".into());
        assert_eq!(v.unwrap(), Value::from("value"));
    }

    #[test]
    fn test_puppet_path() {
        let path = Path::from(Puppet::object().call("get_property2", []));
        let v = PropertyAccessor.get_value(&sample("p1", "p2"), &path);
        assert_eq!(v.unwrap(), Value::from("p2"));
    }

    #[test]
    fn test_index_access_fallback() {
        let mut elements = Elements::new();
        elements.insert(Key::from("name"), Value::from("value"));
        let target = Value::object(Bag(elements));
        let v = PropertyAccessor.get_value(&target, &"name".into());
        assert_eq!(v.unwrap(), Value::from("value"));
    }

    #[test]
    fn test_unreadable_property_fails() {
        let err = PropertyAccessor
            .get_value(&sample("p1", "p2"), &"missing".into())
            .unwrap_err();
        assert!(matches!(err, StreamError::PropertyUnreadable(name) if name == "missing"));
    }

    #[test]
    fn test_scalar_segment_fails() {
        let err = PropertyAccessor
            .get_value(&Value::from("text"), &"len".into())
            .unwrap_err();
        assert!(matches!(err, StreamError::PropertyUnreadable(_)));
    }

    #[test]
    fn test_identity_and_func_paths() {
        let target = Value::Int(4);
        assert_eq!(
            PropertyAccessor.get_value(&target, &Path::Identity).unwrap(),
            Value::Int(4)
        );
        let squared = Path::func(|v| Ok(Value::Int(v.as_i64().unwrap_or(0).pow(2))));
        assert_eq!(
            PropertyAccessor.get_value(&target, &squared).unwrap(),
            Value::Int(16)
        );
    }

    #[test]
    fn test_value_extractor_is_reusable() {
        let extract = value("property1");
        let target = sample("p1", "p2");
        assert_eq!(extract(&target).unwrap(), Value::from("p1"));
        assert_eq!(extract(&target).unwrap(), Value::from("p1"));
    }
}
