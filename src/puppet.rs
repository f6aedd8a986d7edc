//! Recording puppet.
//!
//! A `Puppet` records property reads, method calls and index reads without a
//! target, then replays them against any number of targets later:
//!
//! ```
//! use streams_rs::{Puppet, Value};
//! use serde_json::json;
//!
//! let second_author = Puppet::record().index("authors").index(1);
//! let book = Value::from(json!({"authors": ["Eddy", "psliwa"]}));
//! assert_eq!(second_author.play(book).unwrap(), Value::from("psliwa"));
//!
//! let publisher_name = Puppet::record().index("publisher").index("name");
//! let book = Value::from(json!({"publisher": null}));
//! assert_eq!(publisher_name.play(book).unwrap(), Value::Null);
//! ```
//!
//! Replay is a left fold over the movements. Before each movement the
//! running value must be an array, an object or an optional; anything else
//! (null, a scalar) stops the replay and yields `Value::Null`. Reads never
//! fail; a method the target does not expose is an error.

use tracing::trace;

use crate::error::{Result, StreamError};
use crate::option;
use crate::value::{Key, Value};

/// One recorded access step.
#[derive(Debug, Clone)]
pub enum Movement {
    /// Read a named property of an object.
    Property(String),
    /// Call a method on an object or an optional.
    Method { name: String, args: Vec<Value> },
    /// Read an array element or an object offset.
    Index(Key),
}

impl Movement {
    /// Apply this movement to a navigable target.
    fn apply(&self, target: &Value) -> Result<Value> {
        match self {
            Movement::Property(name) => Ok(match target {
                Value::Object(object) => object.property(name).unwrap_or(Value::Null),
                _ => Value::Null,
            }),
            Movement::Method { name, args } => {
                let called = match target {
                    Value::Object(object) => object.call(name, args),
                    Value::Maybe(inner) => option::call(inner.as_deref(), name, args),
                    _ => None,
                };
                called.unwrap_or_else(|| {
                    Err(StreamError::NoSuchMethod {
                        type_name: target.type_name().to_string(),
                        method: name.clone(),
                    })
                })
            }
            Movement::Index(key) => Ok(match target {
                Value::Array(elements) => elements.get(key).cloned().unwrap_or(Value::Null),
                Value::Object(object) => object.offset(key).unwrap_or(Value::Null),
                _ => Value::Null,
            }),
        }
    }
}

/// An ordered chain of [`Movement`]s recorded against no target.
///
/// Builders consume and return the puppet; [`Puppet::play`] replays the chain
/// without consuming it, so one recording serves any number of targets.
#[derive(Debug, Clone, Default)]
pub struct Puppet {
    movements: Vec<Movement>,
}

impl Puppet {
    /// Start an empty recording.
    pub fn record() -> Self {
        Self::default()
    }

    /// Alias of [`Puppet::record`], reads better when used as a path.
    pub fn object() -> Self {
        Self::record()
    }

    /// Record a property read. Missing properties replay as `Null`.
    pub fn prop(mut self, name: impl Into<String>) -> Self {
        self.push(Movement::Property(name.into()));
        self
    }

    /// Record a method call. Replay fails with [`StreamError::NoSuchMethod`]
    /// when the target does not expose `method`.
    pub fn call(
        mut self,
        method: impl Into<String>,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.push(Movement::Method {
            name: method.into(),
            args: args.into_iter().collect(),
        });
        self
    }

    /// Record an index read. Missing keys replay as `Null`.
    pub fn index(mut self, key: impl Into<Key>) -> Self {
        self.push(Movement::Index(key.into()));
        self
    }

    /// Append a movement in place. Recording stays open after replays.
    pub fn push(&mut self, movement: Movement) {
        self.movements.push(movement);
    }

    /// Recorded movements, in replay order.
    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    /// Number of recorded movements.
    pub fn len(&self) -> usize {
        self.movements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    /// Replay the recorded chain against `target`.
    ///
    /// Yields `Null` as soon as the running value is neither an array, an
    /// object nor an optional. Only method calls can fail.
    pub fn play(&self, target: Value) -> Result<Value> {
        let mut current = target;
        for (step, movement) in self.movements.iter().enumerate() {
            if !current.is_navigable() {
                trace!(step, kind = current.type_name(), "puppet replay short-circuited");
                return Ok(Value::Null);
            }
            current = movement.apply(&current)?;
        }
        Ok(current)
    }

    /// Always fails: a recording is read-only.
    pub fn set_index(&self, _key: impl Into<Key>, _value: Value) -> Result<()> {
        Err(StreamError::UnsupportedOperation("puppet index assignment"))
    }

    /// Always fails: a recording cannot answer existence checks.
    pub fn has_index(&self, _key: impl Into<Key>) -> Result<bool> {
        Err(StreamError::UnsupportedOperation("puppet index existence check"))
    }

    /// Always fails: a recording is read-only.
    pub fn unset_index(&self, _key: impl Into<Key>) -> Result<()> {
        Err(StreamError::UnsupportedOperation("puppet index removal"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dynamic;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Publisher {
        name: String,
    }

    impl Dynamic for Publisher {
        fn type_name(&self) -> &str {
            "Publisher"
        }

        fn property(&self, name: &str) -> Option<Value> {
            (name == "name").then(|| Value::from(self.name.as_str()))
        }

        fn call(&self, method: &str, _args: &[Value]) -> Option<Result<Value>> {
            match method {
                "get_name" => Some(Ok(Value::from(self.name.as_str()))),
                _ => None,
            }
        }
    }

    #[derive(Debug)]
    struct Author(String);

    impl Dynamic for Author {
        fn type_name(&self) -> &str {
            "Author"
        }

        fn call(&self, method: &str, _args: &[Value]) -> Option<Result<Value>> {
            (method == "get_name").then(|| Ok(Value::from(self.0.as_str())))
        }
    }

    #[derive(Debug, Default)]
    struct Book {
        title: String,
        short_title: Option<String>,
        authors: Vec<String>,
        publisher: Option<Arc<Publisher>>,
        cool: bool,
    }

    impl Book {
        fn publisher_value(&self) -> Value {
            match &self.publisher {
                Some(p) => Value::Object(p.clone()),
                None => Value::Null,
            }
        }
    }

    impl Dynamic for Book {
        fn type_name(&self) -> &str {
            "Book"
        }

        fn property(&self, name: &str) -> Option<Value> {
            match name {
                "authors" => Some(Value::list(
                    self.authors
                        .iter()
                        .map(|a| Value::object(Author(a.clone()))),
                )),
                "publisher" => Some(self.publisher_value()),
                _ => None,
            }
        }

        fn call(&self, method: &str, args: &[Value]) -> Option<Result<Value>> {
            match method {
                "get_publisher" => Some(Ok(self.publisher_value())),
                "is_cool" => Some(Ok(Value::Bool(self.cool))),
                "get_title" => {
                    let title: &str = match args.first().and_then(Value::as_str) {
                        Some("short") => self.short_title.as_deref().unwrap_or(&self.title),
                        _ => &self.title,
                    };
                    Some(Ok(Value::from(title)))
                }
                _ => None,
            }
        }
    }

    fn book_with_publisher(name: &str) -> Value {
        Value::object(Book {
            publisher: Some(Arc::new(Publisher {
                name: name.to_string(),
            })),
            ..Book::default()
        })
    }

    #[test]
    fn test_empty_puppet_returns_target() {
        let book = book_with_publisher("O'rly");
        assert_eq!(Puppet::record().play(book.clone()).unwrap(), book);
    }

    #[test]
    fn test_single_method_call() {
        let puppet = Puppet::record().call("get_publisher", []);
        let result = puppet.play(book_with_publisher("O'rly")).unwrap();
        assert_eq!(result.type_name(), "Publisher");
    }

    #[test]
    fn test_single_property_access() {
        let puppet = Puppet::record().prop("name");
        let publisher = Value::object(Publisher {
            name: "adison".to_string(),
        });
        assert_eq!(puppet.play(publisher).unwrap(), Value::from("adison"));
    }

    #[test]
    fn test_chained_method_and_property() {
        let puppet = Puppet::record().call("get_publisher", []).prop("name");
        let result = puppet.play(book_with_publisher("halion")).unwrap();
        assert_eq!(result, Value::from("halion"));
    }

    #[test]
    fn test_method_call_with_argument() {
        let puppet = Puppet::record().call("get_title", [Value::from("short")]);
        let book = Value::object(Book {
            title: "title".to_string(),
            short_title: Some("short title".to_string()),
            ..Book::default()
        });
        assert_eq!(puppet.play(book).unwrap(), Value::from("short title"));
    }

    #[test]
    fn test_second_call_on_null_returns_null() {
        let puppet = Puppet::record().call("get_publisher", []).call("get_name", []);
        let book = Value::object(Book::default());
        assert_eq!(puppet.play(book).unwrap(), Value::Null);
    }

    #[test]
    fn test_null_property_short_circuits() {
        // "publisher" is null, so "name" must never be read.
        let puppet = Puppet::record().prop("publisher").prop("name");
        let book = Value::object(Book::default());
        assert_eq!(puppet.play(book).unwrap(), Value::Null);
    }

    #[test]
    fn test_method_returning_false() {
        let puppet = Puppet::record().call("is_cool", []);
        let book = Value::object(Book::default());
        assert_eq!(puppet.play(book).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_property_and_index_access() {
        let puppet = Puppet::record().prop("authors").index(1).call("get_name", []);
        let book = Value::object(Book {
            authors: vec!["Eddy".to_string(), "psliwa".to_string()],
            ..Book::default()
        });
        assert_eq!(puppet.play(book).unwrap(), Value::from("psliwa"));
    }

    #[test]
    fn test_missing_offset_returns_null() {
        let puppet = Puppet::record().prop("authors").index(1).call("get_name", []);
        let book = Value::object(Book::default());
        assert_eq!(puppet.play(book).unwrap(), Value::Null);
    }

    #[test]
    fn test_missing_method_fails() {
        let puppet = Puppet::record().call("unexisted_method", []);
        let err = puppet.play(Value::object(Book::default())).unwrap_err();
        match err {
            StreamError::NoSuchMethod { type_name, method } => {
                assert_eq!(type_name, "Book");
                assert_eq!(method, "unexisted_method");
            }
            other => panic!("Expected NoSuchMethod, got {other:?}"),
        }
    }

    #[test]
    fn test_method_on_array_fails() {
        let puppet = Puppet::record().call("count", []);
        let err = puppet.play(Value::list([1, 2])).unwrap_err();
        assert!(matches!(err, StreamError::NoSuchMethod { type_name, .. } if type_name == "array"));
    }

    #[test]
    fn test_scalar_and_null_targets_yield_null() {
        let puppet = Puppet::record().prop("name");
        assert_eq!(puppet.play(Value::Null).unwrap(), Value::Null);
        assert_eq!(puppet.play(Value::from("scalar")).unwrap(), Value::Null);
        // Even a missing method is not reached on a scalar.
        let calling = Puppet::record().call("missing", []);
        assert_eq!(calling.play(Value::Int(3)).unwrap(), Value::Null);
    }

    #[test]
    fn test_scalar_mid_chain_stops_silently() {
        let puppet = Puppet::record()
            .call("get_publisher", [])
            .call("get_name", [])
            .call("len", []);
        let result = puppet.play(book_with_publisher("halion")).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn test_optional_methods_through_puppet() {
        let puppet = Puppet::record()
            .call("map", [Value::func(|args| Ok(Value::Int(args[0].as_i64().unwrap_or(0) + 1)))])
            .call("get_or_else", [Value::Int(0)]);
        assert_eq!(puppet.play(Value::some(41)).unwrap(), Value::Int(42));
        assert_eq!(puppet.play(Value::none()).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_recording_after_replay() {
        let mut puppet = Puppet::record().call("get_publisher", []);
        let book = book_with_publisher("halion");
        assert_eq!(puppet.play(book.clone()).unwrap().type_name(), "Publisher");
        puppet.push(Movement::Property("name".to_string()));
        assert_eq!(puppet.play(book).unwrap(), Value::from("halion"));
        assert_eq!(puppet.len(), 2);
    }

    #[test]
    fn test_index_mutation_is_unsupported() {
        let puppet = Puppet::record();
        assert!(matches!(
            puppet.set_index(0, Value::Null),
            Err(StreamError::UnsupportedOperation(_))
        ));
        assert!(matches!(puppet.has_index("k"), Err(StreamError::UnsupportedOperation(_))));
        assert!(matches!(puppet.unset_index(1), Err(StreamError::UnsupportedOperation(_))));
    }
}
