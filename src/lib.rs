//! # streams-rs
//!
//! Fluent, chainable processing of ordered key-value collections.
//!
//! ## Overview
//!
//! - **Streams**: a [`Stream`] wraps an ordered key-value collection and
//!   exposes transformation, filtering, aggregation and conversion
//!   operations that chain.
//! - **Pipelines**: a [`Pipeline`] records stream operations once and runs
//!   them later against any input. Exactly one terminal operation closes it.
//! - **Puppets**: a [`Puppet`] records property reads, method calls and index
//!   reads, then replays them on a target, yielding `Null` as soon as the
//!   running value cannot be navigated further.
//!
//! ## Example
//!
//! ```
//! use streams_rs::{Pipeline, Puppet, Value, property};
//! use serde_json::json;
//!
//! let books = Value::from(json!([
//!     {"title": "Dune", "publisher": {"name": "Chilton"}},
//!     {"title": "Untitled", "publisher": null},
//! ]));
//!
//! let publishers = Pipeline::for_iterable()
//!     .map(|book, _| Puppet::record().index("publisher").index("name").play(book.clone()))
//!     .unwrap()
//!     .filter(|name, _| Ok(!name.is_null()))
//!     .unwrap()
//!     .to_list()
//!     .unwrap();
//! assert_eq!(publishers.apply(books.clone()).unwrap(), Value::list(["Chilton"]));
//!
//! let titles = Pipeline::for_iterable()
//!     .sort_by(property::value("title"), streams_rs::Direction::Desc)
//!     .unwrap()
//!     .map(|book, _| property::value("title")(book))
//!     .unwrap()
//!     .join(", ")
//!     .unwrap();
//! assert_eq!(titles.apply(books).unwrap(), Value::from("Untitled, Dune"));
//! ```

pub mod elements;
pub mod error;
pub mod func;
pub mod json;
mod option;
pub mod pipeline;
pub mod property;
pub mod puppet;
pub mod sort;
pub mod stream;
pub mod trace;
pub mod value;

pub use elements::Elements;
pub use error::{Result, StreamError};
pub use func::{
    CollectFn, Comparator, EntryFn, Func, MapFn, ObjectFactory, Predicate, ReduceFn, ValueFn,
    VisitFn, ZipFn,
};
pub use pipeline::{Mode, Op, Operation, Pipeline, PipelinePuppet};
pub use property::{Path, PropertyAccessor};
pub use puppet::{Movement, Puppet};
pub use sort::{Direction, SortFlag};
pub use stream::Stream;
pub use trace::{PipelineTrace, StepTrace};
pub use value::{Dynamic, Key, Value, compare};
