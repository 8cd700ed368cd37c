//! Task identity and content.

use std::collections::HashMap;
use std::str::FromStr;

use derive_more::{Debug, Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Globally-unique identifier assigned to a [`Task`] when it is submitted.
///
/// Mirrors a `NodeId` newtype: a `Uuid` wrapped for type
/// safety, generated with `Uuid::now_v7()` so identifiers sort roughly
/// by submission time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new random task ID.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a task ID from an existing UUID.
    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[inline]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A mapping from string keys to arbitrary values, flowing unchanged
/// through the entire pipeline (passthrough).
///
/// A [`Task`] is content-addressed by the caller until submission, at
/// which point the manager assigns a [`TaskId`] if one isn't already
/// present (see `submit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Task {
    /// The task's own identifier, if already assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<TaskId>,
    /// Arbitrary task parameters.
    #[serde(flatten)]
    values: HashMap<String, Value>,
}

impl Task {
    /// Creates a new task with no parameters and no assigned ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the task's ID, if one has been assigned.
    pub fn id(&self) -> Option<TaskId> {
        self.id
    }

    /// Assigns a task ID if one is not already set. Returns the ID in
    /// effect after the call (existing or newly assigned).
    pub fn ensure_id(&mut self) -> TaskId {
        *self.id.get_or_insert_with(TaskId::new)
    }

    /// Sets a parameter value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns a parameter value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns an iterator over all parameter key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Returns the number of parameters in this task.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether this task has no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw parameter map.
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Returns this task's content as a bare JSON object, excluding the
    /// auto-assigned task id.
    ///
    /// The id is bookkeeping external to the task's own mapping (a task
    /// is a mapping from string keys to arbitrary values, with an
    /// auto-assigned globally-unique `task_id` kept separately). Used
    /// wherever the task's content must reach a caller
    /// unchanged: the passthrough envelope field and the synthetic head
    /// job's emitted output.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone().into_iter().collect())
    }
}

impl<K, V> FromIterator<(K, V)> for Task
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let values = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { id: None, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ensure_id_is_idempotent() {
        let mut task = Task::new();
        assert!(task.id().is_none());
        let first = task.ensure_id();
        let second = task.ensure_id();
        assert_eq!(first, second);
    }

    #[test]
    fn test_task_from_iter_roundtrips_values() {
        let task = Task::from_iter([("square.x", 5)]);
        assert_eq!(task.get("square.x"), Some(&Value::from(5)));
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
    }
}
