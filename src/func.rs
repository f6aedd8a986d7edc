//! Callables stored in values and the callback shapes used by streams.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::elements::Elements;
use crate::error::Result;
use crate::value::{Dynamic, Key, Value};

/// A callable carried inside a [`Value`], e.g. the argument of a recorded
/// `map` call on an optional result.
#[derive(Clone)]
pub struct Func(Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>);

impl Func {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Func(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Func) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Func(..)")
    }
}

/// `(value, key) -> value`, used by `map`, `flat_map`, `group`, `remap`.
pub type MapFn = Arc<dyn Fn(&Value, &Key) -> Result<Value> + Send + Sync>;
/// `(value, key) -> bool`, used by `filter`, `partition` and matchers.
pub type Predicate = Arc<dyn Fn(&Value, &Key) -> Result<bool> + Send + Sync>;
pub type Comparator = Arc<dyn Fn(&Value, &Value) -> Result<Ordering> + Send + Sync>;
/// Value extractor, used by `sort_by`, `sum_by`, `max_by`, `min_by`.
pub type ValueFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
/// `(carry, item) -> carry`
pub type ReduceFn = Arc<dyn Fn(Value, &Value) -> Result<Value> + Send + Sync>;
pub type ZipFn = Arc<dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync>;
pub type EntryFn = Arc<dyn Fn(&Value, &Key) -> Result<(Key, Value)> + Send + Sync>;
pub type CollectFn = Arc<dyn Fn(&Elements) -> Result<Value> + Send + Sync>;
pub type VisitFn = Arc<dyn Fn(&Value, &Key) -> Result<()> + Send + Sync>;
/// Builds a fresh target for `to_object` on every pipeline invocation.
pub type ObjectFactory = Arc<dyn Fn() -> Arc<dyn Dynamic> + Send + Sync>;
