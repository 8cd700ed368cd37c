//! The per-task result envelope.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::ids::Fqn;
use crate::task::Task;

/// Reserved envelope key holding the FQN of the job that produced the
/// envelope (the graph's tail).
pub const RETURN_JOB: &str = "return_job";

/// Reserved envelope key holding the original submitted task, unchanged.
pub const TASK_PASSTHROUGH_KEY: &str = "task";

/// Reserved envelope key holding the per-task map of saved intermediate
/// results, keyed by short name.
pub const SAVED_RESULTS: &str = "saved_results";

/// Per-task map of intermediate job outputs retained because the
/// producing job opted in via `save_result`.
pub type SavedResults = HashMap<String, Value>;

/// The structured result a user receives for one completed task.
///
/// The tail job's output dict is spread at the top level alongside the
/// three reserved keys ([`RETURN_JOB`], [`TASK_PASSTHROUGH_KEY`],
/// [`SAVED_RESULTS`]). A scalar tail output is wrapped as `{"result": v}`
/// before the envelope is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Builds an envelope from the tail's output dict plus the task's
    /// bookkeeping. `tail_output` must already be wrapped into a mapping
    /// if the tail returned a scalar (see [`crate::job::wrap_non_mapping`]).
    pub fn new(
        tail_output: Map<String, Value>,
        return_job: Fqn,
        passthrough: &Task,
        saved_results: SavedResults,
    ) -> Self {
        let mut fields = tail_output;
        fields.insert(RETURN_JOB.to_string(), Value::String(return_job.to_string()));
        fields.insert(TASK_PASSTHROUGH_KEY.to_string(), passthrough.to_value());
        fields.insert(
            SAVED_RESULTS.to_string(),
            serde_json::to_value(saved_results).unwrap_or_else(|_| Value::Object(Map::new())),
        );

        Self { fields }
    }

    /// Returns the FQN of the job that produced this envelope.
    pub fn return_job(&self) -> Option<&str> {
        self.fields.get(RETURN_JOB).and_then(Value::as_str)
    }

    /// Returns the saved-results map.
    pub fn saved_results(&self) -> SavedResults {
        self.fields
            .get(SAVED_RESULTS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Returns a top-level field by key (either a reserved key or one
    /// spread in from the tail's output).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns the envelope as a raw JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the envelope, returning the raw JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }
}

impl serde::Serialize for Envelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.fields.serialize(serializer)
    }
}

/// Wraps a non-mapping job return value as `{"result": v}`.
///
/// This wrapping only ever happens for the tail job; a
/// non-tail job returning a non-mapping is a [`crate::error::Flow4AiError::NonMappingOutput`].
pub fn wrap_non_mapping(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}
