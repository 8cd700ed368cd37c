#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod compiler;
pub mod composition;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ids;
pub mod job;
pub mod manager;
pub mod result;
pub mod task;
pub mod validator;

pub mod prelude;

pub use config::{ManagerConfig, ManagerConfigBuilder};
pub use error::{CompileError, ErrorKind, ErrorRecord, Flow4AiError, Result};
pub use manager::{Counts, DrainedResults, Flow4AiManager, OnComplete};
pub use result::{Envelope, RETURN_JOB, SAVED_RESULTS, SavedResults, TASK_PASSTHROUGH_KEY};
pub use task::{Task, TaskId};

/// Tracing target for crate-wide diagnostics not attributable to one
/// of the per-module targets (`flow4ai::engine`, `flow4ai::manager`).
pub const TRACING_TARGET: &str = "flow4ai";
