//! Deferred, reusable stream pipelines.
//!
//! A [`Pipeline`] records stream operations without running them. Invoking
//! it shapes the call arguments into a fresh [`Stream`] according to its
//! [`Mode`], then folds the recorded operations over that stream. The same
//! pipeline can be invoked any number of times.
//!
//! At most one terminal operation may be recorded; it closes the pipeline
//! and any further append fails with [`StreamError::IllegalPipelineState`].
//! Terminals whose result may be missing (`first`, `max`, `reduce`, ...)
//! produce an optional and hand back a [`PipelinePuppet`], which records what
//! to do with that optional.
//!
//! ```
//! use streams_rs::{Pipeline, Value};
//!
//! let upper_a = Pipeline::for_iterable()
//!     .map(|v, _| Ok(Value::from(v.as_str().unwrap_or_default().to_uppercase())))
//!     .unwrap()
//!     .filter(|v, _| Ok(v.as_str().is_some_and(|s| s.starts_with('A'))))
//!     .unwrap()
//!     .unique()
//!     .unwrap()
//!     .to_list()
//!     .unwrap();
//!
//! let input = Value::list(["Asia", "Apple", "php", "android", "Android", "tv", "php"]);
//! assert_eq!(
//!     upper_a.apply(input).unwrap(),
//!     Value::list(["ASIA", "APPLE", "ANDROID"])
//! );
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::elements::Elements;
use crate::error::{Result, StreamError};
use crate::func::{
    CollectFn, Comparator, EntryFn, MapFn, ObjectFactory, Predicate, ReduceFn, ValueFn, VisitFn,
    ZipFn,
};
use crate::property::Path;
use crate::puppet::Puppet;
use crate::sort::{Direction, SortFlag};
use crate::stream::Stream;
use crate::trace::PipelineTrace;
use crate::value::{Dynamic, Key, Value};

/// How invocation arguments become the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The first argument is the collection.
    Iterable,
    /// Every argument is one element.
    Varargs,
    /// The first argument is the only element; the rest are ignored.
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Open,
    Closed(&'static str),
}

/// One recorded stream operation with its arguments.
///
/// Intermediate variants map a stream to a stream. Terminal variants turn it
/// into a plain value and close the pipeline; those in the last group yield an
/// optional, which a [`PipelinePuppet`] can navigate further.
#[derive(Clone)]
pub enum Op {
    // Intermediate
    Map(MapFn),
    Filter(Predicate),
    Sort(Comparator),
    SortAsc(SortFlag),
    SortDesc(SortFlag),
    SortBy(ValueFn, Direction),
    Slice { offset: i64, length: Option<i64> },
    Skip(usize),
    Limit(usize),
    Group(MapFn),
    Partition(Predicate),
    Merge(Value),
    MergeRecursive(Value),
    Zip(Value, Option<ZipFn>),
    Unique,
    Reverse,
    Keys,
    KeysOf { search: Value, strict: bool },
    Values,
    Intersect(Value),
    Diff(Value),
    Append(Value),
    Prepend(Value),
    Flat,
    FlatMap(MapFn),
    Remap(MapFn),
    RemapBy(Path),
    RemapAll(EntryFn),
    AllMatchOrFail(Predicate, String),

    // Terminal
    ToList,
    ToMap,
    ToObject(ObjectFactory),
    Sum,
    SumBy(ValueFn),
    Collect(CollectFn),
    ForEach(VisitFn),
    ForEachRecursive(VisitFn),
    Join(String),
    Size,
    AllMatch(Predicate),
    AnyMatch(Predicate),
    NoneMatch(Predicate),

    // Terminal, producing an optional
    Get(Key),
    First,
    Last,
    FirstMatch(Predicate),
    Reduce(ReduceFn, Option<Value>),
    Max(Option<Comparator>),
    Min(Option<Comparator>),
    MaxBy(ValueFn),
    MinBy(ValueFn),
}

/// Result of applying one operation.
enum Flow {
    Stream(Stream),
    Value(Value),
}

impl Flow {
    fn into_value(self) -> Value {
        match self {
            Flow::Stream(stream) => Value::from(stream),
            Flow::Value(value) => value,
        }
    }

    fn shape(&self) -> (&str, Option<usize>) {
        match self {
            Flow::Stream(stream) => ("stream", Some(stream.size())),
            Flow::Value(Value::Array(elements)) => ("array", Some(elements.len())),
            Flow::Value(value) => (value.type_name(), None),
        }
    }
}

impl Op {
    /// Operation name, as used in errors and traces.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Map(_) => "map",
            Op::Filter(_) => "filter",
            Op::Sort(_) => "sort",
            Op::SortAsc(_) => "sort_asc",
            Op::SortDesc(_) => "sort_desc",
            Op::SortBy(..) => "sort_by",
            Op::Slice { .. } => "slice",
            Op::Skip(_) => "skip",
            Op::Limit(_) => "limit",
            Op::Group(_) => "group",
            Op::Partition(_) => "partition",
            Op::Merge(_) => "merge",
            Op::MergeRecursive(_) => "merge_recursive",
            Op::Zip(..) => "zip",
            Op::Unique => "unique",
            Op::Reverse => "reverse",
            Op::Keys | Op::KeysOf { .. } => "keys",
            Op::Values => "values",
            Op::Intersect(_) => "intersect",
            Op::Diff(_) => "diff",
            Op::Append(_) => "append",
            Op::Prepend(_) => "prepend",
            Op::Flat => "flat",
            Op::FlatMap(_) => "flat_map",
            Op::Remap(_) => "remap",
            Op::RemapBy(_) => "remap_by",
            Op::RemapAll(_) => "remap_all",
            Op::AllMatchOrFail(..) => "all_match_or_fail",
            Op::ToList => "to_list",
            Op::ToMap => "to_map",
            Op::ToObject(_) => "to_object",
            Op::Sum => "sum",
            Op::SumBy(_) => "sum_by",
            Op::Collect(_) => "collect",
            Op::ForEach(_) => "for_each",
            Op::ForEachRecursive(_) => "for_each_recursive",
            Op::Join(_) => "join",
            Op::Size => "size",
            Op::AllMatch(_) => "all_match",
            Op::AnyMatch(_) => "any_match",
            Op::NoneMatch(_) => "none_match",
            Op::Get(_) => "get",
            Op::First => "first",
            Op::Last => "last",
            Op::FirstMatch(_) => "first_match",
            Op::Reduce(..) => "reduce",
            Op::Max(_) => "max",
            Op::Min(_) => "min",
            Op::MaxBy(_) => "max_by",
            Op::MinBy(_) => "min_by",
        }
    }

    /// Does this operation end the pipeline?
    pub fn is_terminal(&self) -> bool {
        // Everything from `ToList` down in the enum.
        !matches!(
            self,
            Op::Map(_)
                | Op::Filter(_)
                | Op::Sort(_)
                | Op::SortAsc(_)
                | Op::SortDesc(_)
                | Op::SortBy(..)
                | Op::Slice { .. }
                | Op::Skip(_)
                | Op::Limit(_)
                | Op::Group(_)
                | Op::Partition(_)
                | Op::Merge(_)
                | Op::MergeRecursive(_)
                | Op::Zip(..)
                | Op::Unique
                | Op::Reverse
                | Op::Keys
                | Op::KeysOf { .. }
                | Op::Values
                | Op::Intersect(_)
                | Op::Diff(_)
                | Op::Append(_)
                | Op::Prepend(_)
                | Op::Flat
                | Op::FlatMap(_)
                | Op::Remap(_)
                | Op::RemapBy(_)
                | Op::RemapAll(_)
                | Op::AllMatchOrFail(..)
        )
    }

    fn apply(&self, stream: Stream) -> Result<Flow> {
        let next = match self {
            Op::Map(f) => stream.map(f.as_ref())?,
            Op::Filter(p) => stream.filter(p.as_ref())?,
            Op::Sort(c) => stream.sort(c.as_ref())?,
            Op::SortAsc(flag) => stream.sort_asc(*flag),
            Op::SortDesc(flag) => stream.sort_desc(*flag),
            Op::SortBy(f, direction) => stream.sort_by(f.as_ref(), *direction)?,
            Op::Slice { offset, length } => stream.slice(*offset, *length),
            Op::Skip(n) => stream.skip(*n),
            Op::Limit(n) => stream.limit(*n),
            Op::Group(f) => stream.group(f.as_ref())?,
            Op::Partition(p) => stream.partition(p.as_ref())?,
            Op::Merge(other) => stream.merge(other.clone()),
            Op::MergeRecursive(other) => stream.merge_recursive(other.clone()),
            Op::Zip(other, None) => stream.zip(other.clone()),
            Op::Zip(other, Some(f)) => stream.zip_with(other.clone(), f.as_ref())?,
            Op::Unique => stream.unique(),
            Op::Reverse => stream.reverse(),
            Op::Keys => stream.keys(),
            Op::KeysOf { search, strict } => stream.keys_of(search, *strict),
            Op::Values => stream.values(),
            Op::Intersect(other) => stream.intersect(other.clone()),
            Op::Diff(other) => stream.diff(other.clone()),
            Op::Append(element) => stream.append(element.clone()),
            Op::Prepend(element) => stream.prepend(element.clone()),
            Op::Flat => stream.flat()?,
            Op::FlatMap(f) => stream.flat_map(f.as_ref())?,
            Op::Remap(f) => stream.remap(f.as_ref())?,
            Op::RemapBy(path) => stream.remap_by(path.clone())?,
            Op::RemapAll(f) => stream.remap_all(f.as_ref())?,
            Op::AllMatchOrFail(p, message) => stream.all_match_or_fail(p.as_ref(), message)?,
            terminal => return terminal.finish(stream).map(Flow::Value),
        };
        Ok(Flow::Stream(next))
    }

    fn finish(&self, stream: Stream) -> Result<Value> {
        Ok(match self {
            Op::ToList => Value::list(stream.to_list()),
            Op::ToMap => Value::Array(stream.to_map()),
            Op::ToObject(factory) => Value::Object(stream.to_object(factory())?),
            Op::Sum => stream.sum()?,
            Op::SumBy(f) => stream.sum_by(f.as_ref())?,
            Op::Collect(f) => stream.collect(f.as_ref())?,
            Op::ForEach(f) => Value::from(stream.for_each(f.as_ref())?),
            Op::ForEachRecursive(f) => Value::from(stream.for_each_recursive(f.as_ref())?),
            Op::Join(separator) => Value::Str(stream.join(separator)?),
            Op::Size => Value::from(stream.size()),
            Op::AllMatch(p) => Value::Bool(stream.all_match(p.as_ref())?),
            Op::AnyMatch(p) => Value::Bool(stream.any_match(p.as_ref())?),
            Op::NoneMatch(p) => Value::Bool(stream.none_match(p.as_ref())?),
            Op::Get(key) => Value::from_nullable(stream.get(key.clone())),
            Op::First => Value::from_nullable(stream.first()),
            Op::Last => Value::from_nullable(stream.last()),
            Op::FirstMatch(p) => Value::from_nullable(stream.first_match(p.as_ref())?),
            Op::Reduce(f, initial) => {
                Value::from_nullable(stream.reduce(f.as_ref(), initial.clone())?)
            }
            Op::Max(None) => Value::from_nullable(stream.max()),
            Op::Max(Some(c)) => Value::from_nullable(stream.max_with(c.as_ref())?),
            Op::Min(None) => Value::from_nullable(stream.min()),
            Op::Min(Some(c)) => Value::from_nullable(stream.min_with(c.as_ref())?),
            Op::MaxBy(f) => Value::from_nullable(stream.max_by(f.as_ref())?),
            Op::MinBy(f) => Value::from_nullable(stream.min_by(f.as_ref())?),
            intermediate => {
                return Err(StreamError::type_mismatch(
                    intermediate.name(),
                    "terminal operation",
                    "intermediate operation",
                ));
            }
        })
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self.name())
    }
}

/// A step of the recorded program: a stream operation, or the access chain
/// replayed on the optional a terminal produced.
#[derive(Debug, Clone)]
pub enum Operation {
    Named(Op),
    Puppet(Puppet),
}

impl Operation {
    /// Operation name; `"puppet"` for a replayed access chain.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Named(op) => op.name(),
            Operation::Puppet(_) => "puppet",
        }
    }
}

/// A recorded program of stream operations, run later against any input.
///
/// Builders consume the pipeline and hand it back, so calls chain with `?`.
/// Once a terminal operation is recorded every further builder fails with
/// [`StreamError::IllegalPipelineState`]. A pipeline with no terminal yields
/// the final stream as an array.
///
/// ```
/// use streams_rs::{Pipeline, Value};
///
/// let evens = Pipeline::for_varargs()
///     .filter(|v, _| Ok(v.as_i64().unwrap_or(1) % 2 == 0))
///     .unwrap()
///     .to_list()
///     .unwrap();
/// assert_eq!(evens.invoke([1, 2, 3, 4]).unwrap(), Value::list([2, 4]));
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    mode: Mode,
    operations: Vec<Operation>,
    terminal: Terminal,
}

impl Pipeline {
    /// Empty, open pipeline shaping its arguments according to `mode`.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            operations: Vec::new(),
            terminal: Terminal::Open,
        }
    }

    /// Pipeline whose first argument is the collection to stream.
    pub fn for_iterable() -> Self {
        Self::new(Mode::Iterable)
    }

    /// Pipeline streaming every argument as one element.
    pub fn for_varargs() -> Self {
        Self::new(Mode::Varargs)
    }

    /// Pipeline streaming its first argument as a single element.
    pub fn for_value() -> Self {
        Self::new(Mode::Value)
    }

    /// How invocation arguments are shaped into the input stream.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Recorded operations, in execution order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Name of the recorded terminal operation, if any.
    pub fn terminal(&self) -> Option<&'static str> {
        match self.terminal {
            Terminal::Open => None,
            Terminal::Closed(name) => Some(name),
        }
    }

    /// Record `op`, closing the pipeline if it is terminal.
    pub fn push(mut self, op: Op) -> Result<Self> {
        if let Terminal::Closed(name) = self.terminal {
            debug!(rejected = op.name(), terminal = name, "operation appended after terminal");
            return Err(StreamError::IllegalPipelineState(name));
        }
        if op.is_terminal() {
            self.terminal = Terminal::Closed(op.name());
        }
        self.operations.push(Operation::Named(op));
        Ok(self)
    }

    fn push_optional(self, op: Op) -> Result<PipelinePuppet> {
        Ok(PipelinePuppet {
            pipeline: self.push(op)?,
            puppet: Puppet::record(),
        })
    }

    // ------------------------------------------------------------------
    // Intermediate operations
    // ------------------------------------------------------------------

    /// Record [`Stream::map`]: replace each value with `f(value, key)`.
    pub fn map<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<Value> + Send + Sync + 'static,
    {
        self.push(Op::Map(Arc::new(f)))
    }

    /// Record [`Stream::filter`]: keep entries matching `predicate`.
    pub fn filter<F>(self, predicate: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<bool> + Send + Sync + 'static,
    {
        self.push(Op::Filter(Arc::new(predicate)))
    }

    /// Record [`Stream::sort`] with a user comparator; keys are kept.
    pub fn sort<F>(self, comparator: F) -> Result<Self>
    where
        F: Fn(&Value, &Value) -> Result<Ordering> + Send + Sync + 'static,
    {
        self.push(Op::Sort(Arc::new(comparator)))
    }

    /// Record [`Stream::sort_asc`]: ascending value order under `flag`.
    pub fn sort_asc(self, flag: SortFlag) -> Result<Self> {
        self.push(Op::SortAsc(flag))
    }

    /// Record [`Stream::sort_desc`]: descending value order under `flag`.
    pub fn sort_desc(self, flag: SortFlag) -> Result<Self> {
        self.push(Op::SortDesc(flag))
    }

    /// Record [`Stream::sort_by`]: order by the value `f` extracts.
    pub fn sort_by<F>(self, f: F, direction: Direction) -> Result<Self>
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.push(Op::SortBy(Arc::new(f), direction))
    }

    /// Record [`Stream::slice`]. A negative offset counts from the end.
    pub fn slice(self, offset: i64, length: Option<i64>) -> Result<Self> {
        self.push(Op::Slice { offset, length })
    }

    /// Record [`Stream::skip`]: drop the first `n` entries.
    pub fn skip(self, n: usize) -> Result<Self> {
        self.push(Op::Skip(n))
    }

    /// Record [`Stream::limit`]: keep at most `n` entries.
    pub fn limit(self, n: usize) -> Result<Self> {
        self.push(Op::Limit(n))
    }

    /// Record [`Stream::group`]: bucket values by the key `f` computes.
    pub fn group<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<Value> + Send + Sync + 'static,
    {
        self.push(Op::Group(Arc::new(f)))
    }

    /// Record [`Stream::partition`]: split into `[matching, rest]`.
    pub fn partition<F>(self, predicate: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<bool> + Send + Sync + 'static,
    {
        self.push(Op::Partition(Arc::new(predicate)))
    }

    /// Record [`Stream::merge`] with `other`.
    pub fn merge(self, other: impl Into<Value>) -> Result<Self> {
        self.push(Op::Merge(other.into()))
    }

    /// Record [`Stream::merge_recursive`] with `other`.
    pub fn merge_recursive(self, other: impl Into<Value>) -> Result<Self> {
        self.push(Op::MergeRecursive(other.into()))
    }

    /// Record [`Stream::zip`]: pair each value with the one at the same position in `other`.
    pub fn zip(self, other: impl Into<Value>) -> Result<Self> {
        self.push(Op::Zip(other.into(), None))
    }

    /// Record [`Stream::zip_with`]: combine positional pairs with `f`.
    pub fn zip_with<F>(self, other: impl Into<Value>, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.push(Op::Zip(other.into(), Some(Arc::new(f))))
    }

    /// Record [`Stream::unique`]: drop loosely equal duplicates, first wins.
    pub fn unique(self) -> Result<Self> {
        self.push(Op::Unique)
    }

    /// Record [`Stream::reverse`].
    pub fn reverse(self) -> Result<Self> {
        self.push(Op::Reverse)
    }

    /// Record [`Stream::keys`]: stream the keys as values.
    pub fn keys(self) -> Result<Self> {
        self.push(Op::Keys)
    }

    /// Record [`Stream::keys_of`]: keys whose value equals `search`.
    pub fn keys_of(self, search: impl Into<Value>, strict: bool) -> Result<Self> {
        self.push(Op::KeysOf {
            search: search.into(),
            strict,
        })
    }

    /// Record [`Stream::values`]: renumber keys from zero.
    pub fn values(self) -> Result<Self> {
        self.push(Op::Values)
    }

    /// Record [`Stream::intersect`]: keep values also present in `other`.
    pub fn intersect(self, other: impl Into<Value>) -> Result<Self> {
        self.push(Op::Intersect(other.into()))
    }

    /// Record [`Stream::diff`]: drop values present in `other`.
    pub fn diff(self, other: impl Into<Value>) -> Result<Self> {
        self.push(Op::Diff(other.into()))
    }

    /// Record [`Stream::append`].
    pub fn append(self, element: impl Into<Value>) -> Result<Self> {
        self.push(Op::Append(element.into()))
    }

    /// Record [`Stream::prepend`].
    pub fn prepend(self, element: impl Into<Value>) -> Result<Self> {
        self.push(Op::Prepend(element.into()))
    }

    /// Record [`Stream::flat`]: concatenate nested lists.
    pub fn flat(self) -> Result<Self> {
        self.push(Op::Flat)
    }

    /// Record [`Stream::flat_map`]: map, then flatten one level.
    pub fn flat_map<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<Value> + Send + Sync + 'static,
    {
        self.push(Op::FlatMap(Arc::new(f)))
    }

    /// Record [`Stream::remap`]: replace each key with `f(value, key)`.
    pub fn remap<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<Value> + Send + Sync + 'static,
    {
        self.push(Op::Remap(Arc::new(f)))
    }

    /// Record [`Stream::remap_by`]: key each value by the property at `path`.
    pub fn remap_by(self, path: impl Into<Path>) -> Result<Self> {
        self.push(Op::RemapBy(path.into()))
    }

    /// Record [`Stream::remap_all`]: replace key and value at once.
    pub fn remap_all<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<(Key, Value)> + Send + Sync + 'static,
    {
        self.push(Op::RemapAll(Arc::new(f)))
    }

    /// Record [`Stream::all_match_or_fail`]. The invocation fails with
    /// [`StreamError::Assertion`] carrying `message` when an entry does not match.
    pub fn all_match_or_fail<F>(self, predicate: F, message: impl Into<String>) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<bool> + Send + Sync + 'static,
    {
        self.push(Op::AllMatchOrFail(Arc::new(predicate), message.into()))
    }

    // ------------------------------------------------------------------
    // Terminal operations
    // ------------------------------------------------------------------

    /// Terminal: the values as a list.
    pub fn to_list(self) -> Result<Self> {
        self.push(Op::ToList)
    }

    /// Terminal: the entries as an array, keys kept.
    pub fn to_map(self) -> Result<Self> {
        self.push(Op::ToMap)
    }

    /// Assign the entries as properties of a target built by `factory` on
    /// each invocation.
    pub fn to_object<F>(self, factory: F) -> Result<Self>
    where
        F: Fn() -> Arc<dyn Dynamic> + Send + Sync + 'static,
    {
        self.push(Op::ToObject(Arc::new(factory)))
    }

    /// Terminal: numeric sum of the values.
    pub fn sum(self) -> Result<Self> {
        self.push(Op::Sum)
    }

    /// Terminal: numeric sum of the values `f` extracts.
    pub fn sum_by<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.push(Op::SumBy(Arc::new(f)))
    }

    /// Terminal: hand the whole stream to `collector` and return its result.
    pub fn collect<F>(self, collector: F) -> Result<Self>
    where
        F: Fn(&Elements) -> Result<Value> + Send + Sync + 'static,
    {
        self.push(Op::Collect(Arc::new(collector)))
    }

    /// Terminal: visit every entry, then yield the untouched entries as an array.
    pub fn for_each<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<()> + Send + Sync + 'static,
    {
        self.push(Op::ForEach(Arc::new(f)))
    }

    /// Terminal: visit every leaf entry, descending into nested arrays.
    pub fn for_each_recursive<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<()> + Send + Sync + 'static,
    {
        self.push(Op::ForEachRecursive(Arc::new(f)))
    }

    /// Terminal: string values joined with `separator`.
    pub fn join(self, separator: impl Into<String>) -> Result<Self> {
        self.push(Op::Join(separator.into()))
    }

    /// Terminal: number of entries.
    pub fn size(self) -> Result<Self> {
        self.push(Op::Size)
    }

    /// Terminal: whether every entry matches.
    pub fn all_match<F>(self, predicate: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<bool> + Send + Sync + 'static,
    {
        self.push(Op::AllMatch(Arc::new(predicate)))
    }

    /// Terminal: whether some entry matches.
    pub fn any_match<F>(self, predicate: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<bool> + Send + Sync + 'static,
    {
        self.push(Op::AnyMatch(Arc::new(predicate)))
    }

    /// Terminal: whether no entry matches.
    pub fn none_match<F>(self, predicate: F) -> Result<Self>
    where
        F: Fn(&Value, &Key) -> Result<bool> + Send + Sync + 'static,
    {
        self.push(Op::NoneMatch(Arc::new(predicate)))
    }

    /// Terminal: the optional value at `key`.
    pub fn get(self, key: impl Into<Key>) -> Result<PipelinePuppet> {
        self.push_optional(Op::Get(key.into()))
    }

    /// Terminal: the optional first value.
    pub fn first(self) -> Result<PipelinePuppet> {
        self.push_optional(Op::First)
    }

    /// Terminal: the optional last value.
    pub fn last(self) -> Result<PipelinePuppet> {
        self.push_optional(Op::Last)
    }

    /// Terminal: the optional first value matching `predicate`.
    pub fn first_match<F>(self, predicate: F) -> Result<PipelinePuppet>
    where
        F: Fn(&Value, &Key) -> Result<bool> + Send + Sync + 'static,
    {
        self.push_optional(Op::FirstMatch(Arc::new(predicate)))
    }

    /// Terminal: fold the values with `f`, starting from `initial` or the first value.
    pub fn reduce<F>(self, f: F, initial: Option<Value>) -> Result<PipelinePuppet>
    where
        F: Fn(Value, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.push_optional(Op::Reduce(Arc::new(f), initial))
    }

    /// Terminal: the optional greatest value under loose comparison.
    pub fn max(self) -> Result<PipelinePuppet> {
        self.push_optional(Op::Max(None))
    }

    /// Terminal: the optional greatest value under `comparator`.
    pub fn max_with<F>(self, comparator: F) -> Result<PipelinePuppet>
    where
        F: Fn(&Value, &Value) -> Result<Ordering> + Send + Sync + 'static,
    {
        self.push_optional(Op::Max(Some(Arc::new(comparator))))
    }

    /// Terminal: the optional smallest value under loose comparison.
    pub fn min(self) -> Result<PipelinePuppet> {
        self.push_optional(Op::Min(None))
    }

    /// Terminal: the optional smallest value under `comparator`.
    pub fn min_with<F>(self, comparator: F) -> Result<PipelinePuppet>
    where
        F: Fn(&Value, &Value) -> Result<Ordering> + Send + Sync + 'static,
    {
        self.push_optional(Op::Min(Some(Arc::new(comparator))))
    }

    /// Terminal: the optional value whose extracted key is greatest.
    pub fn max_by<F>(self, f: F) -> Result<PipelinePuppet>
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.push_optional(Op::MaxBy(Arc::new(f)))
    }

    /// Terminal: the optional value whose extracted key is smallest.
    pub fn min_by<F>(self, f: F) -> Result<PipelinePuppet>
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.push_optional(Op::MinBy(Arc::new(f)))
    }

    // ------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------

    /// Build the input stream from the call arguments.
    fn input<I>(&self, args: I) -> Stream
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut args = args.into_iter().map(Into::<Value>::into);
        match self.mode {
            Mode::Iterable => Stream::of(args.next().unwrap_or_default()),
            Mode::Varargs => Stream::of_list(args),
            Mode::Value => Stream::of_list(args.next()),
        }
    }

    /// Run the recorded operations against the shaped arguments.
    pub fn invoke<I>(&self, args: I) -> Result<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.run(self.input(args), None)
    }

    /// Shorthand for invoking with a single argument.
    pub fn apply(&self, input: impl Into<Value>) -> Result<Value> {
        self.invoke([input.into()])
    }

    /// Like [`Pipeline::invoke`], also reporting the value shape after each step.
    pub fn invoke_traced<I>(&self, args: I) -> Result<(Value, PipelineTrace)>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let input = self.input(args);
        let mut steps = PipelineTrace::new(input.size());
        let value = self.run(input, Some(&mut steps))?;
        Ok((value, steps))
    }

    fn run(&self, input: Stream, mut steps: Option<&mut PipelineTrace>) -> Result<Value> {
        debug!(
            mode = ?self.mode,
            operations = self.operations.len(),
            input = input.size(),
            "invoking pipeline"
        );
        let mut flow = Flow::Stream(input);
        for (index, operation) in self.operations.iter().enumerate() {
            flow = match (operation, flow) {
                (Operation::Named(op), Flow::Stream(stream)) => op.apply(stream)?,
                (Operation::Named(op), Flow::Value(value)) => {
                    return Err(StreamError::type_mismatch(op.name(), "stream", value.type_name()));
                }
                (Operation::Puppet(puppet), current) => {
                    Flow::Value(puppet.play(current.into_value())?)
                }
            };
            let (kind, size) = flow.shape();
            trace!(step = index, operation = operation.name(), kind, ?size, "pipeline step");
            if let Some(steps) = steps.as_deref_mut() {
                steps.record(operation.name(), kind, size);
            }
        }
        Ok(flow.into_value())
    }
}

/// A pipeline closed by a terminal producing an optional, plus the access
/// chain to replay on that optional.
///
/// ```
/// use streams_rs::{Pipeline, Value};
///
/// let describe = Pipeline::for_iterable()
///     .max()
///     .unwrap()
///     .call("map", [Value::func(|args| {
///         Ok(Value::from(format!("max: {}", args[0].scalar_string().unwrap_or_default())))
///     })])
///     .call("get_or_else", [Value::from("max not found")]);
///
/// assert_eq!(describe.apply(Value::list([1, 5, 3])).unwrap(), Value::from("max: 5"));
/// assert_eq!(
///     describe.apply(Value::list(Vec::<Value>::new())).unwrap(),
///     Value::from("max not found")
/// );
/// ```
#[derive(Debug, Clone)]
pub struct PipelinePuppet {
    pipeline: Pipeline,
    puppet: Puppet,
}

impl PipelinePuppet {
    /// Record a property read on the optional's result.
    pub fn prop(mut self, name: impl Into<String>) -> Self {
        self.puppet = self.puppet.prop(name);
        self
    }

    /// Record a method call on the optional's result.
    pub fn call(
        mut self,
        method: impl Into<String>,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.puppet = self.puppet.call(method, args);
        self
    }

    /// Record an index read on the optional's result.
    pub fn index(mut self, key: impl Into<Key>) -> Self {
        self.puppet = self.puppet.index(key);
        self
    }

    /// The access chain recorded so far.
    pub fn puppet(&self) -> &Puppet {
        &self.puppet
    }

    /// Run the pipeline, then replay the recorded chain on the optional it produced.
    pub fn invoke<I>(&self, args: I) -> Result<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let optional = self.pipeline.invoke(args)?;
        self.puppet.play(optional)
    }

    /// Shorthand for invoking with a single argument.
    pub fn apply(&self, input: impl Into<Value>) -> Result<Value> {
        self.invoke([input.into()])
    }

    /// Like [`PipelinePuppet::invoke`], also reporting the value shape after
    /// each pipeline step and after the replayed chain, recorded as `"puppet"`.
    pub fn invoke_traced<I>(&self, args: I) -> Result<(Value, PipelineTrace)>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let (optional, mut steps) = self.pipeline.invoke_traced(args)?;
        let flow = Flow::Value(self.puppet.play(optional)?);
        let (kind, size) = flow.shape();
        steps.record("puppet", kind, size);
        Ok((flow.into_value(), steps))
    }

    /// The closed pipeline with the recorded chain as its last step.
    pub fn into_pipeline(self) -> Pipeline {
        let mut pipeline = self.pipeline;
        pipeline.operations.push(Operation::Puppet(self.puppet));
        pipeline
    }
}

impl From<PipelinePuppet> for Pipeline {
    fn from(puppet: PipelinePuppet) -> Self {
        puppet.into_pipeline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property;
    use serde_json::json;
    use std::sync::Mutex;

    fn upper(v: &Value, _: &Key) -> Result<Value> {
        Ok(Value::from(v.as_str().unwrap_or_default().to_uppercase()))
    }

    fn starts_with_a(v: &Value, _: &Key) -> Result<bool> {
        Ok(v.as_str().is_some_and(|s| s.starts_with('A')))
    }

    fn words() -> Value {
        Value::list(["Asia", "Apple", "php", "android", "Android", "tv", "php"])
    }

    #[test]
    fn test_iterable_upper_filter_unique() {
        let pipeline = Pipeline::for_iterable()
            .map(upper)
            .unwrap()
            .filter(starts_with_a)
            .unwrap()
            .unique()
            .unwrap()
            .to_list()
            .unwrap();
        assert_eq!(
            pipeline.invoke([words()]).unwrap(),
            Value::list(["ASIA", "APPLE", "ANDROID"])
        );
    }

    #[test]
    fn test_varargs_mode_uses_every_argument() {
        let pipeline = Pipeline::for_varargs().map(upper).unwrap().to_list().unwrap();
        assert_eq!(
            pipeline.invoke(["a", "b", "C"]).unwrap(),
            Value::list(["A", "B", "C"])
        );
    }

    #[test]
    fn test_value_mode_uses_first_argument_only() {
        let pipeline = Pipeline::for_value().map(upper).unwrap().to_list().unwrap();
        assert_eq!(pipeline.invoke(["a", "b", "C"]).unwrap(), Value::list(["A"]));
        assert_eq!(
            pipeline.invoke(Vec::<Value>::new()).unwrap(),
            Value::list(Vec::<Value>::new())
        );
    }

    #[test]
    fn test_second_terminal_is_rejected() {
        let err = Pipeline::for_iterable()
            .to_list()
            .unwrap()
            .to_map()
            .unwrap_err();
        match err {
            StreamError::IllegalPipelineState(name) => assert_eq!(name, "to_list"),
            other => panic!("Expected IllegalPipelineState, got {other:?}"),
        }
    }

    #[test]
    fn test_intermediate_after_terminal_is_rejected() {
        let err = Pipeline::for_iterable().sum().unwrap().map(upper).unwrap_err();
        assert!(matches!(err, StreamError::IllegalPipelineState("sum")));
    }

    #[test]
    fn test_terminal_state_is_reported() {
        let open = Pipeline::for_iterable().limit(2).unwrap();
        assert_eq!(open.terminal(), None);
        let closed = open.size().unwrap();
        assert_eq!(closed.terminal(), Some("size"));
        assert_eq!(closed.operations().len(), 2);
    }

    #[test]
    fn test_iterable_matches_direct_stream() {
        let input = Value::from(json!({"b": 2, "a": 1, "c": 3}));
        let pipeline = Pipeline::for_iterable()
            .sort_asc(SortFlag::Regular)
            .unwrap()
            .keys()
            .unwrap()
            .to_list()
            .unwrap();
        let direct = Stream::of(input.clone()).sort_asc(SortFlag::Regular).keys().to_list();
        assert_eq!(pipeline.apply(input).unwrap(), Value::list(direct));
    }

    #[test]
    fn test_sort_asc_on_mixed_scalars() {
        let input = Value::list((0..120).map(|i| match i % 5 {
            0 => Value::Null,
            1 => Value::Bool(i % 2 == 0),
            2 => Value::from(format!("s{i}")),
            3 => Value::Int(60 - i),
            _ => Value::from(format!("{i}a")),
        }));
        let sorted = Pipeline::for_iterable()
            .sort_asc(SortFlag::Regular)
            .unwrap()
            .size()
            .unwrap();
        assert_eq!(sorted.apply(input.clone()).unwrap(), Value::Int(120));

        let largest = Pipeline::for_iterable()
            .max_by(|v| Ok(v.clone()))
            .unwrap()
            .call("get_or_null", []);
        assert!(largest.apply(input).is_ok());
    }

    #[test]
    fn test_unterminated_pipeline_returns_array() {
        let pipeline = Pipeline::for_iterable().skip(1).unwrap();
        let result = pipeline.apply(Value::list([1, 2])).unwrap();
        let expected: Elements = [(Key::Int(1), Value::Int(2))].into_iter().collect();
        assert_eq!(result, Value::Array(expected));
    }

    #[test]
    fn test_invocation_is_idempotent() {
        let pipeline = Pipeline::for_iterable()
            .append("tail")
            .unwrap()
            .reverse()
            .unwrap()
            .join(",")
            .unwrap();
        let first = pipeline.apply(Value::list(["a", "b"])).unwrap();
        let second = pipeline.apply(Value::list(["a", "b"])).unwrap();
        assert_eq!(first, Value::from("tail,b,a"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_max_with_optional_methods() {
        let describe = Pipeline::for_iterable()
            .max()
            .unwrap()
            .call(
                "map",
                [Value::func(|args| {
                    Ok(Value::from(format!("max: {}", args[0].scalar_string().unwrap_or_default())))
                })],
            )
            .call("or_else", [Value::some("max not found")])
            .call("get", []);
        assert_eq!(describe.apply(Value::list([1, 5, 3])).unwrap(), Value::from("max: 5"));
        assert_eq!(
            describe.apply(Value::list(Vec::<Value>::new())).unwrap(),
            Value::from("max not found")
        );
    }

    #[test]
    fn test_get_distinguishes_null_and_false() {
        let get = |key: i64| Pipeline::for_iterable().get(key).unwrap();
        let input = Value::list([Value::Null, Value::Bool(false)]);
        assert_eq!(get(0).apply(input.clone()).unwrap(), Value::none());
        assert_eq!(get(1).apply(input.clone()).unwrap(), Value::some(false));
        let defined = get(1).call("is_defined", []);
        assert_eq!(defined.apply(input).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_first_then_property_chain() {
        let name = Pipeline::for_iterable()
            .first()
            .unwrap()
            .call("get", [])
            .index("name");
        let people = Value::from(json!([{"name": "John"}, {"name": "Jolka"}]));
        assert_eq!(name.apply(people).unwrap(), Value::from("John"));
    }

    #[test]
    fn test_get_on_absent_fails() {
        let first = Pipeline::for_iterable().first().unwrap().call("get", []);
        let err = first.apply(Value::Null).unwrap_err();
        assert!(matches!(err, StreamError::NoValue));
    }

    #[test]
    fn test_pipeline_puppet_into_pipeline_stays_closed() {
        let pipeline = Pipeline::for_iterable()
            .last()
            .unwrap()
            .call("get_or_null", [])
            .into_pipeline();
        assert_eq!(pipeline.apply(Value::list([1, 2])).unwrap(), Value::Int(2));
        let err = pipeline.limit(1).unwrap_err();
        assert!(matches!(err, StreamError::IllegalPipelineState("last")));
    }

    #[test]
    fn test_reduce_and_first_match() {
        let total = Pipeline::for_varargs()
            .reduce(
                |carry, item| {
                    Ok(Value::Int(carry.as_i64().unwrap_or(0) + item.as_i64().unwrap_or(0)))
                },
                Some(Value::Int(0)),
            )
            .unwrap()
            .call("get", []);
        assert_eq!(total.invoke([1, 2, 3]).unwrap(), Value::Int(6));

        let big = Pipeline::for_varargs()
            .first_match(|v, _| Ok(v.as_i64().unwrap_or(0) > 1))
            .unwrap();
        assert_eq!(big.invoke([1, 2, 3]).unwrap(), Value::some(2));
    }

    #[test]
    fn test_max_by_property() {
        let oldest = Pipeline::for_iterable()
            .max_by(property::value("age"))
            .unwrap()
            .call("get", [])
            .index("name");
        let people = Value::from(json!([
            {"name": "John", "age": 33},
            {"name": "Jolka", "age": 21},
        ]));
        assert_eq!(oldest.apply(people).unwrap(), Value::from("John"));
    }

    #[test]
    fn test_callback_error_propagates() {
        let pipeline = Pipeline::for_varargs()
            .map(|_, _| Err(StreamError::callback("refused")))
            .unwrap()
            .to_list()
            .unwrap();
        let err = pipeline.invoke([1]).unwrap_err();
        assert!(matches!(err, StreamError::Callback(msg) if msg == "refused"));
    }

    #[derive(Debug, Default)]
    struct Config {
        fields: Mutex<Elements>,
    }

    impl Dynamic for Config {
        fn type_name(&self) -> &str {
            "Config"
        }

        fn set_property(&self, name: &str, value: Value) -> Result<()> {
            if let Ok(mut fields) = self.fields.lock() {
                fields.insert(Key::parse(name), value);
            }
            Ok(())
        }

        fn properties(&self) -> Elements {
            self.fields.lock().map(|f| f.clone()).unwrap_or_default()
        }
    }

    #[test]
    fn test_to_object_builds_fresh_target_per_call() {
        let pipeline = Pipeline::for_iterable()
            .to_object(|| Arc::new(Config::default()) as Arc<dyn Dynamic>)
            .unwrap();
        let first = pipeline.apply(Value::from(json!({"a": 1}))).unwrap();
        let second = pipeline.apply(Value::from(json!({"b": 2}))).unwrap();
        assert_ne!(first, second);
        let props = second.as_object().map(|o| o.properties()).unwrap();
        assert_eq!(Value::Array(props), Value::from(json!({"b": 2})));
    }

    #[test]
    fn test_invoke_traced_lists_every_step() {
        let pipeline = Pipeline::for_iterable()
            .filter(|v, _| Ok(v.as_i64().unwrap_or(0) > 1))
            .unwrap()
            .max()
            .unwrap()
            .call("get", [])
            .into_pipeline();
        let (value, steps) = pipeline.invoke_traced([Value::list([1, 2, 3])]).unwrap();
        assert_eq!(value, Value::Int(3));
        assert_eq!(steps.input_size, 3);
        assert_eq!(steps.operation_names(), vec!["filter", "max", "puppet"]);
        assert_eq!(steps.steps[0].size, Some(2));
        assert_eq!(steps.steps[1].kind, "option");
        assert_eq!(steps.steps[2].kind, "int");
    }

    #[test]
    fn test_pipeline_puppet_invoke_traced_records_replay() {
        let pipeline = Pipeline::for_varargs()
            .sort_desc(SortFlag::Regular)
            .unwrap()
            .first()
            .unwrap()
            .call("get_or_else", [Value::from("none")]);

        let (value, steps) = pipeline.invoke_traced([4, 9, 2]).unwrap();
        assert_eq!(value, Value::Int(9));
        assert_eq!(steps.input_size, 3);
        assert_eq!(steps.operation_names(), vec!["sort_desc", "first", "puppet"]);
        assert_eq!(steps.steps[0].size, Some(3));
        assert_eq!(steps.steps[2].kind, "int");
        assert!(steps.steps[2].size.is_none());

        let (value, steps) = pipeline.invoke_traced(Vec::<Value>::new()).unwrap();
        assert_eq!(value, Value::from("none"));
        assert_eq!(steps.steps[1].kind, "option");
        assert_eq!(steps.steps[2].kind, "string");
    }

    #[test]
    fn test_op_metadata() {
        assert!(Op::ToList.is_terminal());
        assert!(Op::Max(None).is_terminal());
        assert!(!Op::Unique.is_terminal());
        assert_eq!(Op::KeysOf { search: Value::Null, strict: true }.name(), "keys");
        assert_eq!(format!("{:?}", Op::Flat), "Op(flat)");
    }

    #[test]
    fn test_pipeline_is_shareable() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Pipeline>();
        assert_send_sync::<PipelinePuppet>();
        assert_send_sync::<Op>();
    }
}
