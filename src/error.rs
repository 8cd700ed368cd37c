//! Crate-wide error types.

use std::time::Duration;

use thiserror::Error;

use crate::ids::Fqn;
use crate::task::TaskId;

/// Result type for compile-time operations (composition → graph).
pub type CompileResult<T> = Result<T, CompileError>;

/// Result type for manager-facing operations.
pub type Result<T> = std::result::Result<T, Flow4AiError>;

/// Errors raised while compiling a composition into a graph, or while
/// validating the resulting precedence graph.
///
/// These surface directly from [`crate::manager::Flow4AiManager::add_graph`]
/// and are never placed in the manager's error buffer.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The same leaf job object appears more than once in one composition.
    #[error("duplicate leaf job in composition: {short_name}")]
    DuplicateLeaf {
        /// Short name of the duplicated leaf.
        short_name: String,
    },

    /// A composition expression contained no leaves at all.
    #[error("composition is empty")]
    EmptyComposition,

    /// A combinator produced no entry or exit points (malformed tree).
    #[error("combinator contributes no entry/exit points: {detail}")]
    MalformedCombinator {
        /// Human-readable detail about which node was malformed.
        detail: String,
    },

    /// Two jobs in the same composition share a short name.
    #[error("duplicate short name within graph: {short_name}")]
    DuplicateShortName {
        /// The short name that collided.
        short_name: String,
    },

    /// The precedence graph contains a cycle.
    #[error("cycle detected in job graph: {}", cycle.join(" -> "))]
    Cycle {
        /// Short names forming the offending cycle, in traversal order.
        cycle: Vec<String>,
    },

    /// An edge references a short name that is not a key of the job map.
    #[error("dangling reference to unknown job: {short_name}")]
    UnknownReference {
        /// The short name that could not be resolved.
        short_name: String,
    },
}

/// Errors recorded per-task during execution, or raised synchronously by
/// manager operations that do not go through the per-task error buffer.
#[derive(Debug, Error)]
pub enum Flow4AiError {
    /// `add_graph` rejected the composition; see [`CompileError`].
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// `submit` was called against an FQN that isn't registered.
    #[error("submit against unknown graph: {fqn}")]
    UnknownGraph {
        /// The FQN the caller tried to submit against.
        fqn: Fqn,
    },

    /// `submit` was called with no `fqn` while more than one (or zero)
    /// graphs are registered, so the default could not be inferred.
    #[error("fqn is required: {registered} graph(s) registered")]
    AmbiguousGraph {
        /// Number of graphs currently registered.
        registered: usize,
    },

    /// A job's `expected_inputs` were not all satisfied before its
    /// per-job deadline.
    #[error("job {job_fqn} timed out waiting for inputs after {timeout:?}")]
    InputTimeout {
        /// FQN of the job that timed out.
        job_fqn: Fqn,
        /// The configured wait deadline.
        timeout: Duration,
    },

    /// The user-supplied `run` (or wrapped callable) raised an error.
    #[error("job {job_fqn} run failed: {message}")]
    RunError {
        /// FQN of the failing job.
        job_fqn: Fqn,
        /// Error message from the user code.
        message: String,
    },

    /// A non-tail job returned a value that is not a mapping.
    #[error("job {job_fqn} returned a non-mapping value but is not the graph tail")]
    NonMappingOutput {
        /// FQN of the offending job.
        job_fqn: Fqn,
    },

    /// The task (or the whole manager) was cancelled before completion.
    #[error("task execution was cancelled")]
    Cancelled,

    /// A wrapped callable's signature could not bind the provided
    /// `args`/`kwargs`/task parameters.
    #[error("failed to bind parameters for job {job_fqn}: {message}")]
    ParamBindError {
        /// FQN of the job whose callable could not be invoked.
        job_fqn: Fqn,
        /// Detail about which parameter failed to bind.
        message: String,
    },

    /// Something went wrong that does not fit the taxonomy above
    /// (channel closed unexpectedly, poisoned internal state, etc).
    #[error("internal error: {0}")]
    Internal(String),
}

/// One error record as stored in [`crate::manager::DrainedResults::errors`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorRecord {
    /// The taxonomy kind, as a stable machine-readable tag.
    pub kind: ErrorKind,
    /// FQN of the job that raised the error, if attributable to one job.
    pub job_fqn: Option<Fqn>,
    /// Identifier of the task that failed.
    pub task_id: TaskId,
    /// Human-readable message.
    pub message: String,
    /// The underlying error this record was raised in response to, if any.
    pub cause: Option<Cause>,
}

/// A cloneable, serializable stand-in for a boxed `dyn Error` root cause.
///
/// `ErrorRecord` needs `Clone`/`Serialize` for the result buffer, which a
/// trait object can't give us directly, so the cause is captured as its
/// rendered message and re-exposed through [`std::error::Error::source`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct Cause(String);

impl Cause {
    /// Captures an error's `Display` rendering as a cause.
    pub fn capture(err: &(dyn std::error::Error + 'static)) -> Self {
        Self(err.to_string())
    }
}

impl std::fmt::Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Cause {}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// Stable tag identifying which branch of [`Flow4AiError`] produced an
/// [`ErrorRecord`]. Kept separate from the error type itself so records
/// remain cheaply `Clone`/`Serialize` without dragging the `Error` trait
/// object along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// See [`Flow4AiError::InputTimeout`].
    InputTimeout,
    /// See [`Flow4AiError::RunError`].
    RunError,
    /// See [`Flow4AiError::NonMappingOutput`].
    NonMappingOutput,
    /// See [`Flow4AiError::Cancelled`].
    Cancelled,
    /// See [`Flow4AiError::ParamBindError`].
    ParamBindError,
    /// See [`Flow4AiError::Internal`].
    Internal,
}

impl ErrorRecord {
    /// Builds an error record from a task id and a terminal [`Flow4AiError`].
    ///
    /// `Compile`/`UnknownGraph`/`AmbiguousGraph` never actually reach this
    /// buffer in practice (they surface synchronously from `add_graph`/
    /// `submit` instead) but are mapped to [`ErrorKind::Internal`] rather
    /// than matched exhaustively, so adding a new synchronous-only variant
    /// doesn't require touching this function.
    pub fn from_error(task_id: TaskId, err: &Flow4AiError) -> Self {
        let (kind, job_fqn, message) = match err {
            Flow4AiError::InputTimeout { job_fqn, .. } => {
                (ErrorKind::InputTimeout, Some(job_fqn.clone()), err.to_string())
            }
            Flow4AiError::RunError { job_fqn, .. } => {
                (ErrorKind::RunError, Some(job_fqn.clone()), err.to_string())
            }
            Flow4AiError::NonMappingOutput { job_fqn } => (
                ErrorKind::NonMappingOutput,
                Some(job_fqn.clone()),
                err.to_string(),
            ),
            Flow4AiError::Cancelled => (ErrorKind::Cancelled, None, err.to_string()),
            Flow4AiError::ParamBindError { job_fqn, .. } => (
                ErrorKind::ParamBindError,
                Some(job_fqn.clone()),
                err.to_string(),
            ),
            Flow4AiError::Internal(_) => (ErrorKind::Internal, None, err.to_string()),
            Flow4AiError::Compile(_) | Flow4AiError::UnknownGraph { .. } | Flow4AiError::AmbiguousGraph { .. } => {
                (ErrorKind::Internal, None, err.to_string())
            }
        };

        Self {
            kind,
            job_fqn,
            task_id,
            message,
            cause: std::error::Error::source(err).map(Cause::capture),
        }
    }
}
