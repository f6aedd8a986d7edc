//! Step-by-step trace of a pipeline invocation.
//!
//! These types capture the shape of the running value after every recorded
//! operation, so a caller can see where a pipeline turned a stream into a
//! scalar or an optional.

use std::fmt;

/// Running value after one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTrace {
    /// Operation name, e.g. `"map"` or `"puppet"`.
    pub operation: &'static str,
    /// `"stream"` while the pipeline is still open, otherwise the value's type name.
    pub kind: String,
    /// Element count for streams and arrays.
    pub size: Option<usize>,
}

/// Complete trace of one invocation. `input` describes the stream built from
/// the call arguments; `steps[i]` is the state after operation `i`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineTrace {
    /// Number of elements in the input stream.
    pub input_size: usize,
    /// One entry per executed operation, in order.
    pub steps: Vec<StepTrace>,
}

impl PipelineTrace {
    /// Empty trace for an input of `input_size` elements.
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size,
            steps: Vec::new(),
        }
    }

    /// Appends the state after `operation`.
    pub fn record(
        &mut self,
        operation: &'static str,
        kind: impl Into<String>,
        size: Option<usize>,
    ) {
        self.steps.push(StepTrace {
            operation,
            kind: kind.into(),
            size,
        });
    }

    /// Names of the executed operations, in order.
    pub fn operation_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.operation).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for PipelineTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "input: {} elements", self.input_size)?;
        for (i, step) in self.steps.iter().enumerate() {
            match step.size {
                Some(size) => writeln!(f, "{i:>3} {:<20} {}[{size}]", step.operation, step.kind)?,
                None => writeln!(f, "{i:>3} {:<20} {}", step.operation, step.kind)?,
            }
        }
        Ok(())
    }
}
