//! Dynamic value model.
//!
//! Streams hold heterogeneous data: scalars, nested key-value arrays, host
//! objects exposed through [`Dynamic`], optional containers and callables.
//! Ordering and equality follow loose comparison rules so that mixed numeric
//! and string data sorts the way users expect.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::elements::Elements;
use crate::error::{Result, StreamError};
use crate::func::Func;

/// Key of an element inside [`Elements`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    /// Build a key from text. Canonical decimal integers ("7", "-3") become
    /// integer keys, everything else (including "07") stays a string key.
    pub fn parse(text: &str) -> Key {
        match canonical_int(text) {
            Some(i) => Key::Int(i),
            None => Key::Str(text.to_string()),
        }
    }

    /// Convert a computed value into a key, as done by `group` and `remap`.
    pub fn from_value(value: &Value, operation: &'static str) -> Result<Key> {
        match value {
            Value::Int(i) => Ok(Key::Int(*i)),
            Value::Str(s) => Ok(Key::parse(s)),
            Value::Bool(b) => Ok(Key::Int(i64::from(*b))),
            Value::Null => Ok(Key::Str(String::new())),
            Value::Float(f) if f.is_finite() => Ok(Key::Int(f.trunc() as i64)),
            other => Err(StreamError::type_mismatch(
                operation,
                "key",
                other.type_name(),
            )),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(i) => Some(*i),
            Key::Str(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(i) => Value::Int(*i),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

fn canonical_int(text: &str) -> Option<i64> {
    let parsed: i64 = text.parse().ok()?;
    (parsed.to_string() == text).then_some(parsed)
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::parse(s)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::parse(&s)
    }
}

/// Capability interface for host objects placed inside a [`Value`].
///
/// Puppets and the property accessor only ever talk to objects through this
/// trait. Every method has a "not supported" default so implementors expose
/// just what they have.
pub trait Dynamic: fmt::Debug + Send + Sync {
    /// Name used in error messages.
    fn type_name(&self) -> &str;

    /// Read a public property.
    fn property(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Invoke a method. `None` means the object has no such callable member.
    fn call(&self, _method: &str, _args: &[Value]) -> Option<Result<Value>> {
        None
    }

    /// Index access (`object[key]`).
    fn offset(&self, _key: &Key) -> Option<Value> {
        None
    }

    /// Assign a property, used by `to_object`.
    fn set_property(&self, _name: &str, _value: Value) -> Result<()> {
        Err(StreamError::UnsupportedOperation("property assignment"))
    }

    /// Public properties in declaration order, used by `Stream::of_objects`.
    fn properties(&self) -> Elements {
        Elements::new()
    }
}

/// A dynamically typed value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Elements),
    Object(Arc<dyn Dynamic>),
    /// Optional container: `Some` is present (possibly holding `Null`), `None` is absent.
    Maybe(Option<Box<Value>>),
    Func(Func),
}

/// Numeric view of a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn cmp_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.cmp(&y),
        _ => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
    }
}

pub(crate) fn numeric_str(text: &str) -> Option<Number> {
    let t = text.trim();
    if let Ok(i) = t.parse::<i64>() {
        return Some(Number::Int(i));
    }
    let looks_numeric = !t.is_empty()
        && t.chars().any(|c| c.is_ascii_digit())
        && t
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if looks_numeric {
        t.parse::<f64>().ok().map(Number::Float)
    } else {
        None
    }
}

impl Value {
    /// Array of `items` keyed `0..n`.
    pub fn list<I, T>(items: I) -> Value
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Array(Elements::list(items.into_iter().map(Into::into)))
    }

    /// Wrap a dynamic object.
    pub fn object<D: Dynamic + 'static>(object: D) -> Value {
        Value::Object(Arc::new(object))
    }

    /// Callable taking its arguments as a slice.
    pub fn func<F>(f: F) -> Value
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Value::Func(Func::new(f))
    }

    /// Present optional holding `value`.
    pub fn some(value: impl Into<Value>) -> Value {
        Value::Maybe(Some(Box::new(value.into())))
    }

    /// Absent optional.
    pub fn none() -> Value {
        Value::Maybe(None)
    }

    /// Wrap into an optional container, treating `Null` as absent.
    pub fn from_nullable(value: Option<Value>) -> Value {
        match value {
            Some(Value::Null) | None => Value::Maybe(None),
            Some(v) => Value::Maybe(Some(Box::new(v))),
        }
    }

    /// Short type name used in error messages and traces.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(o) => o.type_name(),
            Value::Maybe(_) => "option",
            Value::Func(_) => "callable",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether a puppet may apply a movement to this value.
    pub fn is_navigable(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_) | Value::Maybe(_))
    }

    /// Boolean conversion: `Null`, `false`, zero, `""`, `"0"` and empty arrays are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::Array(a) => !a.is_empty(),
            Value::Object(_) | Value::Maybe(_) | Value::Func(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
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

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Elements> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<dyn Dynamic>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Present/absent view of an optional container; `None` if not a `Maybe`.
    pub fn as_maybe(&self) -> Option<Option<&Value>> {
        match self {
            Value::Maybe(inner) => Some(inner.as_deref()),
            _ => None,
        }
    }

    pub(crate) fn number(&self) -> Option<Number> {
        match self {
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Str(s) => numeric_str(s),
            _ => None,
        }
    }

    /// String form of a scalar; `None` for arrays, objects, options and callables.
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(true) => Some("1".to_string()),
            Value::Bool(false) => Some(String::new()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Identity-sensitive equality: no numeric coercion between `Int` and `Float`.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => false,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.strict_eq(vb))
            }
            _ => self == other,
        }
    }

    /// Loose equality used by `unique` and non-strict `keys` searches.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            (Value::Object(_) | Value::Maybe(_) | Value::Func(_), _)
            | (_, Value::Object(_) | Value::Maybe(_) | Value::Func(_)) => self == other,
            _ => compare(self, other) == Ordering::Equal,
        }
    }
}

/// Natural ordering between two values.
///
/// Numbers compare numerically, numeric strings as numbers, other strings
/// bytewise. `Null` and `Bool` compare by truthiness (`Null` against a string
/// compares as the empty string). Arrays compare by size, then element-wise
/// and rank above every scalar. Objects, options and callables are unordered.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    use Value::*;
    match (a, b) {
        (Str(x), Str(y)) => match (numeric_str(x), numeric_str(y)) {
            (Some(p), Some(q)) => cmp_numbers(p, q),
            _ => x.as_bytes().cmp(y.as_bytes()),
        },
        (Null, Str(s)) => "".cmp(s.as_str()),
        (Str(s), Null) => s.as_str().cmp(""),
        (Null | Bool(_), _) | (_, Null | Bool(_)) => a.is_truthy().cmp(&b.is_truthy()),
        (Int(_) | Float(_), Int(_) | Float(_)) => match (a.number(), b.number()) {
            (Some(p), Some(q)) => cmp_numbers(p, q),
            _ => Ordering::Equal,
        },
        (Int(_) | Float(_), Str(s)) => compare_number_with_str(a, s),
        (Str(s), Int(_) | Float(_)) => compare_number_with_str(b, s).reverse(),
        (Array(x), Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            for (k, v) in x.iter() {
                let Some(w) = y.get(k) else {
                    return Ordering::Equal;
                };
                let ord = compare(v, w);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }),
        (Array(_), _) => Ordering::Greater,
        (_, Array(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn compare_number_with_str(number: &Value, text: &str) -> Ordering {
    match (number.number(), numeric_str(text)) {
        (Some(p), Some(q)) => cmp_numbers(p, q),
        _ => number
            .scalar_string()
            .unwrap_or_default()
            .as_bytes()
            .cmp(text.as_bytes()),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Value::Maybe(a), Value::Maybe(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Elements> for Value {
    fn from(elements: Elements) -> Self {
        Value::Array(elements)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        key.to_value()
    }
}

impl From<Func> for Value {
    fn from(func: Func) -> Self {
        Value::Func(func)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items)
    }
}
