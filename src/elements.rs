//! Ordered key-value collection backing every stream.
//!
//! Insertion order is preserved. Assigning an existing key overwrites the
//! value in place; a new key appends. `push` uses the next integer key, one
//! past the largest integer key inserted so far.

use std::collections::HashMap;

use crate::value::{Key, Value};

/// Insertion-ordered map from [`Key`] to [`Value`] with array-style
/// integer key allocation.
#[derive(Clone, Debug, Default)]
pub struct Elements {
    entries: Vec<(Key, Value)>,
    positions: HashMap<Key, usize>,
    next_index: i64,
}

impl Elements {
    /// Empty collection; the next integer key is `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list keyed `0..n`.
    pub fn list<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let mut elements = Self::new();
        for value in values {
            elements.push(value);
        }
        elements
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value stored under `key`, if any.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.positions.get(key).map(|&pos| &self.entries[pos].1)
    }

    /// Mutable access to the value under `key`, keeping its position.
    pub fn get_mut(&mut self, key: &Key) -> Option<&mut Value> {
        let pos = *self.positions.get(key)?;
        Some(&mut self.entries[pos].1)
    }

    /// Whether `key` is present, even when its value is `Null`.
    pub fn contains_key(&self, key: &Key) -> bool {
        self.positions.contains_key(key)
    }

    /// Insert or overwrite in place. Returns the previous value for the key.
    pub fn insert(&mut self, key: Key, value: Value) -> Option<Value> {
        if let Some(&pos) = self.positions.get(&key) {
            return Some(std::mem::replace(&mut self.entries[pos].1, value));
        }
        if let Key::Int(i) = key
            && i >= self.next_index
        {
            self.next_index = i.saturating_add(1);
        }
        self.positions.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    /// Append under the next integer key.
    pub fn push(&mut self, value: Value) {
        self.insert(Key::Int(self.next_index), value);
    }

    /// Insert at the front. Integer keys are renumbered, string keys kept.
    pub fn prepend(&mut self, value: Value) {
        let mut result = Self::new();
        result.push(value);
        for (key, value) in std::mem::take(&mut self.entries) {
            match key {
                Key::Int(_) => result.push(value),
                Key::Str(_) => {
                    result.insert(key, value);
                }
            }
        }
        *self = result;
    }

    /// Renumber integer keys from zero, keeping string keys.
    pub fn reindexed(self) -> Self {
        let mut result = Self::new();
        for (key, value) in self.entries {
            match key {
                Key::Int(_) => result.push(value),
                Key::Str(_) => {
                    result.insert(key, value);
                }
            }
        }
        result
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Key, &Value)> + '_ {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> + '_ {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Earliest inserted entry.
    pub fn first(&self) -> Option<(&Key, &Value)> {
        self.entries.first().map(|(k, v)| (k, v))
    }

    /// Latest inserted entry.
    pub fn last(&self) -> Option<(&Key, &Value)> {
        self.entries.last().map(|(k, v)| (k, v))
    }

    /// Values in order, dropping the keys.
    pub fn into_values(self) -> Vec<Value> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }

    /// Owned entries in order.
    pub fn into_entries(self) -> Vec<(Key, Value)> {
        self.entries
    }
}

impl PartialEq for Elements {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl FromIterator<(Key, Value)> for Elements {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        let mut elements = Self::new();
        elements.extend(iter);
        elements
    }
}

impl Extend<(Key, Value)> for Elements {
    fn extend<I: IntoIterator<Item = (Key, Value)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl IntoIterator for Elements {
    type Item = (Key, Value);
    type IntoIter = std::vec::IntoIter<(Key, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
