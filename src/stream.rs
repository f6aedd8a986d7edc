//! The stream: an ordered key-value collection with chainable operations.
//!
//! Intermediate operations consume the stream and return a new one, so they
//! chain. Operations that run user callbacks return `Result` and stop at the
//! first callback error. Terminal operations produce plain values; results
//! that may be missing come back as `Option<Value>`, with a stored `Null`
//! counting as missing.
//!
//! ```
//! use streams_rs::{Stream, Value};
//!
//! let shouted = Stream::of_list(["Asia", "php", "Apple"])
//!     .map(|v, _| Ok(Value::from(v.as_str().unwrap_or_default().to_uppercase())))
//!     .unwrap()
//!     .filter(|v, _| Ok(v.as_str().is_some_and(|s| s.starts_with('A'))))
//!     .unwrap()
//!     .to_list();
//! assert_eq!(shouted, vec![Value::from("ASIA"), Value::from("APPLE")]);
//! ```

use std::cmp::Ordering;
use std::sync::Arc;

use crate::elements::Elements;
use crate::error::{Result, StreamError};
use crate::property::{Path, PropertyAccessor};
use crate::sort::{Direction, SortFlag, by_value, stable_sort_by, try_sort_by};
use crate::value::{Dynamic, Key, Number, Value, compare};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stream {
    elements: Elements,
}

fn present(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

/// Equality used by `intersect` and `diff`: string forms for scalars.
fn same_repr(a: &Value, b: &Value) -> bool {
    match (a.scalar_string(), b.scalar_string()) {
        (Some(x), Some(y)) => x == y,
        _ => a.loose_eq(b),
    }
}

fn slice_bounds(len: usize, offset: i64, length: Option<i64>) -> (usize, usize) {
    let n = i64::try_from(len).unwrap_or(i64::MAX);
    let start = if offset < 0 {
        n.saturating_add(offset).max(0)
    } else {
        offset.min(n)
    };
    let end = match length {
        None => n,
        Some(l) if l < 0 => n.saturating_add(l).max(start),
        Some(l) => start.saturating_add(l).min(n),
    };
    (start as usize, end as usize)
}

fn merge_elements(left: Elements, right: Elements) -> Elements {
    let mut merged = Elements::new();
    for (key, value) in left.into_iter().chain(right) {
        match key {
            Key::Int(_) => merged.push(value),
            Key::Str(_) => {
                merged.insert(key, value);
            }
        }
    }
    merged
}

fn into_list(value: Value) -> Elements {
    match value {
        Value::Array(elements) => elements,
        other => Elements::list([other]),
    }
}

fn merge_elements_recursive(left: Elements, right: Elements) -> Elements {
    let mut merged = left.reindexed();
    for (key, value) in right {
        match key {
            Key::Int(_) => merged.push(value),
            Key::Str(_) => {
                let combined = match merged.get(&key) {
                    Some(existing) => Value::Array(merge_elements_recursive(
                        into_list(existing.clone()),
                        into_list(value),
                    )),
                    None => value,
                };
                merged.insert(key, combined);
            }
        }
    }
    merged
}

fn sum_of<'a, I>(values: I) -> Result<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut int_total: i64 = 0;
    let mut float_total: Option<f64> = None;
    for value in values {
        let number = match value {
            Value::Null => Number::Int(0),
            Value::Bool(b) => Number::Int(i64::from(*b)),
            other => other
                .number()
                .ok_or_else(|| StreamError::type_mismatch("sum", "number", other.type_name()))?,
        };
        float_total = match (float_total, number) {
            (Some(total), n) => Some(total + n.as_f64()),
            (None, Number::Int(i)) => match int_total.checked_add(i) {
                Some(total) => {
                    int_total = total;
                    None
                }
                None => Some(int_total as f64 + i as f64),
            },
            (None, Number::Float(f)) => Some(int_total as f64 + f),
        };
    }
    Ok(float_total.map_or(Value::Int(int_total), Value::Float))
}

fn walk_leaves<F>(elements: &Elements, f: &F) -> Result<()>
where
    F: Fn(&Value, &Key) -> Result<()>,
{
    for (key, value) in elements.iter() {
        match value {
            Value::Array(inner) => walk_leaves(inner, f)?,
            leaf => f(leaf, key)?,
        }
    }
    Ok(())
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stream from any value.
    ///
    /// Arrays are taken as-is, `Null` and an absent optional give an empty
    /// stream, a present optional gives its value, objects give their
    /// properties and any other scalar becomes a single element.
    pub fn of(input: impl Into<Value>) -> Self {
        let elements = match input.into() {
            Value::Null | Value::Maybe(None) => Elements::new(),
            Value::Array(elements) => elements,
            Value::Maybe(Some(value)) => Elements::list([*value]),
            Value::Object(object) => object.properties(),
            scalar => Elements::list([scalar]),
        };
        Self { elements }
    }

    /// Stream of `items` keyed `0..n`.
    pub fn of_list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::of_elements(Elements::list(items.into_iter().map(Into::into)))
    }

    /// Stream over an existing collection, keys kept.
    pub fn of_elements(elements: Elements) -> Self {
        Self { elements }
    }

    /// One element per object: its property map.
    pub fn of_objects<I>(objects: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Dynamic>>,
    {
        Self::of_list(objects.into_iter().map(|o| Value::Array(o.properties())))
    }

    /// One element per string: the list of its parts split on `separator`.
    ///
    /// Fails with [`StreamError::InvalidArgument`] for an empty separator.
    pub fn of_string<I, S>(separator: &str, strings: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if separator.is_empty() {
            return Err(StreamError::InvalidArgument(
                "string separator must not be empty".to_string(),
            ));
        }
        Ok(Self::of_list(
            strings
                .into_iter()
                .map(|s| Value::list(s.as_ref().split(separator))),
        ))
    }

    /// Inclusive integer range, counting down when `start > end`.
    pub fn of_range(start: i64, end: i64, step: i64) -> Result<Self> {
        if step == 0 {
            return Err(StreamError::InvalidArgument(
                "range step must not be zero".to_string(),
            ));
        }
        let step = i128::from(step).abs();
        let (start, end) = (i128::from(start), i128::from(end));
        let mut elements = Elements::new();
        let mut current = start;
        if start <= end {
            while current <= end {
                elements.push(Value::Int(current as i64));
                current += step;
            }
        } else {
            while current >= end {
                elements.push(Value::Int(current as i64));
                current -= step;
            }
        }
        Ok(Self { elements })
    }

    pub fn elements(&self) -> &Elements {
        &self.elements
    }

    pub fn into_elements(self) -> Elements {
        self.elements
    }

    // ------------------------------------------------------------------
    // Intermediate operations
    // ------------------------------------------------------------------

    /// Replace each value with `f(value, key)`; keys are preserved.
    pub fn map<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<Value>,
    {
        let mut mapped = Elements::new();
        for (key, value) in self.elements {
            let value = f(&value, &key)?;
            mapped.insert(key, value);
        }
        Ok(Self::of_elements(mapped))
    }

    /// Keep elements matching `predicate`; keys are preserved.
    pub fn filter<F>(self, predicate: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<bool>,
    {
        let mut kept = Elements::new();
        for (key, value) in self.elements {
            if predicate(&value, &key)? {
                kept.insert(key, value);
            }
        }
        Ok(Self::of_elements(kept))
    }

    /// Stable sort by `comparator`, keeping each key with its value.
    pub fn sort<F>(self, comparator: F) -> Result<Self>
    where
        F: Fn(&Value, &Value) -> Result<Ordering>,
    {
        let entries = self.elements.into_entries();
        let sorted = try_sort_by(entries, |(_, a), (_, b)| comparator(a, b))?;
        Ok(Self::of_elements(sorted.into_iter().collect()))
    }

    /// Stable ascending sort using `flag`, keeping each key with its value.
    pub fn sort_asc(self, flag: SortFlag) -> Self {
        let entries = self.elements.into_entries();
        let sorted = stable_sort_by(entries, |(_, a), (_, b)| flag.compare(a, b));
        Self::of_elements(sorted.into_iter().collect())
    }

    /// Stable descending sort using `flag`; equal elements keep their order.
    pub fn sort_desc(self, flag: SortFlag) -> Self {
        let entries = self.elements.into_entries();
        let sorted = stable_sort_by(entries, |(_, a), (_, b)| flag.compare(b, a));
        Self::of_elements(sorted.into_iter().collect())
    }

    /// Sort by the value `f` extracts from each element.
    pub fn sort_by<F>(self, f: F, direction: Direction) -> Result<Self>
    where
        F: Fn(&Value) -> Result<Value>,
    {
        self.sort(by_value(f, direction))
    }

    /// Slice with keys preserved. A negative `offset` counts from the end; a
    /// negative `length` stops that many elements before the end.
    pub fn slice(self, offset: i64, length: Option<i64>) -> Self {
        let (start, end) = slice_bounds(self.elements.len(), offset, length);
        Self::of_elements(
            self.elements
                .into_iter()
                .skip(start)
                .take(end - start)
                .collect(),
        )
    }

    /// Drop the first `n` entries.
    pub fn skip(self, n: usize) -> Self {
        self.slice(i64::try_from(n).unwrap_or(i64::MAX), None)
    }

    /// Keep at most the first `n` entries.
    pub fn limit(self, n: usize) -> Self {
        self.slice(0, Some(i64::try_from(n).unwrap_or(i64::MAX)))
    }

    /// Group values into lists keyed by `f(value, key)`.
    pub fn group<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<Value>,
    {
        let mut groups = Elements::new();
        for (key, value) in self.elements {
            let group_key = Key::from_value(&f(&value, &key)?, "group")?;
            if let Some(Value::Array(members)) = groups.get_mut(&group_key) {
                members.push(value);
                continue;
            }
            groups.insert(group_key, Value::Array(Elements::list([value])));
        }
        Ok(Self::of_elements(groups))
    }

    /// Split into `[0 => matching, 1 => the rest]`.
    pub fn partition<F>(self, predicate: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<bool>,
    {
        let mut matching = Elements::new();
        let mut rest = Elements::new();
        for (key, value) in self.elements {
            if predicate(&value, &key)? {
                matching.push(value);
            } else {
                rest.push(value);
            }
        }
        Ok(Self::of_list([Value::Array(matching), Value::Array(rest)]))
    }

    /// Integer keys are renumbered; string keys overwrite in place.
    pub fn merge(self, other: impl Into<Value>) -> Self {
        let other = Stream::of(other).elements;
        Self::of_elements(merge_elements(self.elements, other))
    }

    /// Like [`Stream::merge`], but colliding string keys are combined into
    /// lists, recursively for nested arrays.
    pub fn merge_recursive(self, other: impl Into<Value>) -> Self {
        let other = Stream::of(other).elements;
        Self::of_elements(merge_elements_recursive(self.elements, other))
    }

    /// Pair elements positionally into `[a, b]` lists.
    pub fn zip(self, other: impl Into<Value>) -> Self {
        let (left, right) = (self.elements.into_values(), Stream::of(other).elements.into_values());
        let width = left.len().max(right.len());
        let mut left = left.into_iter();
        let mut right = right.into_iter();
        Self::of_list((0..width).map(|_| {
            Value::list([
                left.next().unwrap_or_default(),
                right.next().unwrap_or_default(),
            ])
        }))
    }

    /// Combine elements positionally with `f`. The result is as long as the
    /// longer side; the shorter side contributes `Null`.
    pub fn zip_with<F>(self, other: impl Into<Value>, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Value) -> Result<Value>,
    {
        let left = self.elements.into_values();
        let right = Stream::of(other).elements.into_values();
        let mut zipped = Elements::new();
        for i in 0..left.len().max(right.len()) {
            let a = left.get(i).unwrap_or(&Value::Null);
            let b = right.get(i).unwrap_or(&Value::Null);
            zipped.push(f(a, b)?);
        }
        Ok(Self::of_elements(zipped))
    }

    /// Drop values loosely equal to an earlier one.
    pub fn unique(self) -> Self {
        let mut kept: Vec<(Key, Value)> = Vec::new();
        for (key, value) in self.elements {
            if !kept.iter().any(|(_, seen)| seen.loose_eq(&value)) {
                kept.push((key, value));
            }
        }
        Self::of_elements(kept.into_iter().collect())
    }

    /// Reverse the order, renumbering integer keys; string keys are kept.
    pub fn reverse(self) -> Self {
        let reversed: Elements = self.elements.into_entries().into_iter().rev().collect();
        Self::of_elements(reversed.reindexed())
    }

    /// The keys, as a list of values.
    pub fn keys(self) -> Self {
        Self::of_list(self.elements.keys().map(Key::to_value).collect::<Vec<_>>())
    }

    /// Keys whose value equals `search`, loosely or strictly.
    pub fn keys_of(self, search: &Value, strict: bool) -> Self {
        let keys: Vec<Value> = self
            .elements
            .iter()
            .filter(|(_, v)| {
                if strict {
                    v.strict_eq(search)
                } else {
                    v.loose_eq(search)
                }
            })
            .map(|(k, _)| k.to_value())
            .collect();
        Self::of_list(keys)
    }

    /// Renumber keys `0..n`, keeping the order.
    pub fn values(self) -> Self {
        Self::of_list(self.elements.into_values())
    }

    /// Keep elements also present in `other`; keys are preserved.
    pub fn intersect(self, other: impl Into<Value>) -> Self {
        let other = Stream::of(other).elements;
        Self::of_elements(
            self.elements
                .into_iter()
                .filter(|(_, v)| other.values().any(|w| same_repr(v, w)))
                .collect(),
        )
    }

    /// Drop elements present in `other`; keys are preserved.
    pub fn diff(self, other: impl Into<Value>) -> Self {
        let other = Stream::of(other).elements;
        Self::of_elements(
            self.elements
                .into_iter()
                .filter(|(_, v)| !other.values().any(|w| same_repr(v, w)))
                .collect(),
        )
    }

    /// Add `element` under the next integer key.
    pub fn append(mut self, element: impl Into<Value>) -> Self {
        self.elements.push(element.into());
        self
    }

    /// Insert `element` first, renumbering integer keys.
    pub fn prepend(mut self, element: impl Into<Value>) -> Self {
        self.elements.prepend(element.into());
        self
    }

    /// Concatenate nested lists. Every element must be an array or an optional.
    pub fn flat(self) -> Result<Self> {
        let mut flattened = Elements::new();
        for (_, value) in self.elements {
            match value {
                Value::Array(inner) => {
                    for item in inner.into_values() {
                        flattened.push(item);
                    }
                }
                Value::Maybe(inner) => {
                    if let Some(item) = inner {
                        flattened.push(*item);
                    }
                }
                _ => return Err(StreamError::NotIterable("flat")),
            }
        }
        Ok(Self::of_elements(flattened))
    }

    /// Map each entry to a list with `f`, then concatenate the lists.
    pub fn flat_map<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<Value>,
    {
        self.map(f)?.flat()
    }

    /// Re-key every element with `f(value, key)`; the last value wins on
    /// duplicate keys.
    pub fn remap<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<Value>,
    {
        let mut remapped = Elements::new();
        for (key, value) in self.elements {
            let new_key = Key::from_value(&f(&value, &key)?, "remap")?;
            remapped.insert(new_key, value);
        }
        Ok(Self::of_elements(remapped))
    }

    /// Re-key every element by the value found at `path`.
    pub fn remap_by(self, path: impl Into<Path>) -> Result<Self> {
        let path = path.into();
        self.remap(|value, _| PropertyAccessor.get_value(value, &path))
    }

    /// Produce both the new key and the new value for each element.
    pub fn remap_all<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<(Key, Value)>,
    {
        let mut remapped = Elements::new();
        for (key, value) in self.elements {
            let (new_key, new_value) = f(&value, &key)?;
            remapped.insert(new_key, new_value);
        }
        Ok(Self::of_elements(remapped))
    }

    /// Pass the stream through unchanged when every entry matches, otherwise
    /// fail with [`StreamError::Assertion`] carrying `message`.
    pub fn all_match_or_fail<F>(self, predicate: F, message: &str) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<bool>,
    {
        if self.all_match(predicate)? {
            Ok(self)
        } else {
            Err(StreamError::Assertion(message.to_string()))
        }
    }

    // ------------------------------------------------------------------
    // Terminal operations
    // ------------------------------------------------------------------

    /// Sum of all elements; `Int` unless a float is involved. Empty gives 0.
    pub fn sum(&self) -> Result<Value> {
        sum_of(self.elements.values())
    }

    /// Sum of the values `f` extracts.
    pub fn sum_by<F>(&self, f: F) -> Result<Value>
    where
        F: Fn(&Value) -> Result<Value>,
    {
        let values = self
            .elements
            .values()
            .map(f)
            .collect::<Result<Vec<_>>>()?;
        sum_of(&values)
    }

    /// Hand the whole collection to `collector`.
    pub fn collect<F, R>(&self, collector: F) -> Result<R>
    where
        F: Fn(&Elements) -> Result<R>,
    {
        collector(&self.elements)
    }

    /// Values in order; keys are dropped.
    pub fn to_list(self) -> Vec<Value> {
        self.elements.into_values()
    }

    /// The entries, keys kept.
    pub fn to_map(self) -> Elements {
        self.elements
    }

    /// Assign every entry as a property of `target`.
    pub fn to_object(self, target: Arc<dyn Dynamic>) -> Result<Arc<dyn Dynamic>> {
        for (key, value) in self.elements {
            target.set_property(&key.to_string(), value)?;
        }
        Ok(target)
    }

    /// Visit every entry in order; the stream is returned untouched.
    pub fn for_each<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<()>,
    {
        for (key, value) in self.elements.iter() {
            f(value, key)?;
        }
        Ok(self)
    }

    /// Visit the leaves of nested arrays, each with its own key.
    pub fn for_each_recursive<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<()>,
    {
        walk_leaves(&self.elements, &f)?;
        Ok(self)
    }

    /// Scalar values joined with `separator`. Fails on arrays and objects.
    pub fn join(&self, separator: &str) -> Result<String> {
        let parts = self
            .elements
            .values()
            .map(|v| {
                v.scalar_string()
                    .ok_or_else(|| StreamError::type_mismatch("join", "scalar", v.type_name()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(separator))
    }

    /// True for an empty stream.
    pub fn all_match<F>(&self, predicate: F) -> Result<bool>
    where
        F: Fn(&Value, &Key) -> Result<bool>,
    {
        for (key, value) in self.elements.iter() {
            if !predicate(value, key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// False for an empty stream.
    pub fn any_match<F>(&self, predicate: F) -> Result<bool>
    where
        F: Fn(&Value, &Key) -> Result<bool>,
    {
        for (key, value) in self.elements.iter() {
            if predicate(value, key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True when no entry matches `predicate`.
    pub fn none_match<F>(&self, predicate: F) -> Result<bool>
    where
        F: Fn(&Value, &Key) -> Result<bool>,
    {
        Ok(!self.any_match(predicate)?)
    }

    /// First value matching `predicate`; a matching `Null` counts as missing.
    pub fn first_match<F>(&self, predicate: F) -> Result<Option<Value>>
    where
        F: Fn(&Value, &Key) -> Result<bool>,
    {
        for (key, value) in self.elements.iter() {
            if predicate(value, key)? {
                return Ok(present(Some(value)));
            }
        }
        Ok(None)
    }

    /// Value stored under `key`; a stored `Null` counts as missing.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        present(self.elements.get(&key.into()))
    }

    /// First value, `None` when empty or `Null`.
    pub fn first(&self) -> Option<Value> {
        present(self.elements.first().map(|(_, v)| v))
    }

    /// Last value, `None` when empty or `Null`.
    pub fn last(&self) -> Option<Value> {
        present(self.elements.last().map(|(_, v)| v))
    }

    /// Fold with `f(carry, item)`. `None` when the stream is empty and no
    /// initial value is given, or when the fold ends in `Null`.
    pub fn reduce<F>(&self, f: F, initial: Option<Value>) -> Result<Option<Value>>
    where
        F: Fn(Value, &Value) -> Result<Value>,
    {
        if self.elements.is_empty() && initial.is_none() {
            return Ok(None);
        }
        let mut carry = initial.unwrap_or(Value::Null);
        for value in self.elements.values() {
            carry = f(carry, value)?;
        }
        Ok((!carry.is_null()).then_some(carry))
    }

    /// Greatest element by natural ordering; the first one wins on ties.
    pub fn max(&self) -> Option<Value> {
        let mut best: Option<&Value> = None;
        for value in self.elements.values() {
            if best.is_none_or(|b| compare(value, b) == Ordering::Greater) {
                best = Some(value);
            }
        }
        present(best)
    }

    /// Smallest element by natural ordering; the first one wins on ties.
    pub fn min(&self) -> Option<Value> {
        let mut best: Option<&Value> = None;
        for value in self.elements.values() {
            if best.is_none_or(|b| compare(value, b) == Ordering::Less) {
                best = Some(value);
            }
        }
        present(best)
    }

    /// Last element after a stable sort by `comparator`.
    pub fn max_with<F>(&self, comparator: F) -> Result<Option<Value>>
    where
        F: Fn(&Value, &Value) -> Result<Ordering>,
    {
        let values: Vec<&Value> = self.elements.values().collect();
        let sorted = try_sort_by(values, |a, b| comparator(*a, *b))?;
        Ok(present(sorted.last().copied()))
    }

    /// First element after a stable sort by `comparator`.
    pub fn min_with<F>(&self, comparator: F) -> Result<Option<Value>>
    where
        F: Fn(&Value, &Value) -> Result<Ordering>,
    {
        let values: Vec<&Value> = self.elements.values().collect();
        let sorted = try_sort_by(values, |a, b| comparator(*a, *b))?;
        Ok(present(sorted.first().copied()))
    }

    /// Value with the greatest key extracted by `f`; the last one on ties.
    pub fn max_by<F>(&self, f: F) -> Result<Option<Value>>
    where
        F: Fn(&Value) -> Result<Value>,
    {
        self.max_with(by_value(f, Direction::Asc))
    }

    /// Value with the smallest key extracted by `f`; the first one on ties.
    pub fn min_by<F>(&self, f: F) -> Result<Option<Value>>
    where
        F: Fn(&Value) -> Result<Value>,
    {
        self.min_with(by_value(f, Direction::Asc))
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.elements.len()
    }
}

impl From<Stream> for Value {
    fn from(stream: Stream) -> Self {
        Value::Array(stream.elements)
    }
}

impl IntoIterator for Stream {
    type Item = (Key, Value);
    type IntoIter = std::vec::IntoIter<(Key, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}
