//! Per-(task, graph) execution state.
//!
//! One [`ExecutionContext`] is allocated per task execution and is never
//! shared across concurrent executions of the same graph. All mutation
//! happens through interior mutability so the many per-job concurrency
//! units spawned by the engine (§4.5) can each hold a shared reference.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Flow4AiError, Result};
use crate::ids::Fqn;
use crate::result::SavedResults;
use crate::task::Task;

/// Per-execution state shared by every job unit walking one task through
/// one compiled graph.
///
/// `inputs_by_short_name` and `saved_results` are guarded by plain
/// `std::sync::Mutex`es: critical sections are pure map operations with
/// no `.await` inside the lock, so there is no risk of blocking the
/// executor across a suspension point.
pub struct ExecutionContext {
    task: Task,
    inputs_by_short_name: Mutex<HashMap<String, Value>>,
    saved_results: Mutex<SavedResults>,
    global_context: Value,
    /// Broadcast signal fired every time a job posts its output. Waiters
    /// re-check their own fan-in condition on each wake rather than
    /// relying on a per-job signal, which keeps the gate bookkeeping in
    /// one place.
    fan_in: Notify,
}

impl ExecutionContext {
    /// Creates a fresh execution context for one task.
    pub fn new(task: Task, global_context: Value) -> Self {
        Self {
            task,
            inputs_by_short_name: Mutex::new(HashMap::new()),
            saved_results: Mutex::new(SavedResults::new()),
            global_context,
            fan_in: Notify::new(),
        }
    }

    /// Returns the original submitted task (for passthrough and
    /// parameter extraction).
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Returns the shared, read-only manager context exposed to wrapped
    /// callables under their `j_ctx.global` key.
    pub fn global_context(&self) -> &Value {
        &self.global_context
    }

    /// Posts a completed job's output under its own short name, then
    /// wakes every unit waiting on the fan-in gate.
    pub fn post_output(&self, short_name: &str, output: Value) {
        self.inputs_by_short_name
            .lock()
            .expect("execution context mutex poisoned")
            .insert(short_name.to_string(), output);
        self.fan_in.notify_waiters();
    }

    /// Records a job's full (pre-wrapping) output in the saved-results
    /// map, keyed by short name.
    pub fn save_result(&self, short_name: &str, output: Value) {
        self.saved_results
            .lock()
            .expect("execution context mutex poisoned")
            .insert(short_name.to_string(), output);
    }

    /// Returns a snapshot of the saved-results map as it stands right now.
    pub fn saved_results_snapshot(&self) -> SavedResults {
        self.saved_results
            .lock()
            .expect("execution context mutex poisoned")
            .clone()
    }

    /// Returns whether every short name in `expected` has already posted
    /// an output.
    fn all_present(&self, expected: &[String]) -> bool {
        let inputs = self
            .inputs_by_short_name
            .lock()
            .expect("execution context mutex poisoned");
        expected.iter().all(|name| inputs.contains_key(name))
    }

    /// Builds the `{short_name → output}` map for exactly the short
    /// names in `expected`. Panics-free: callers only invoke this after
    /// [`Self::all_present`] has confirmed every key exists.
    ///
    /// Returned as a `HashMap` rather than a `serde_json::Map` so callers
    /// that need a deterministic key order (e.g. the synthetic tail,
    /// which must gather predecessor outputs in declared order) iterate
    /// `expected` themselves instead of relying on map iteration order.
    fn gather(&self, expected: &[String]) -> HashMap<String, Value> {
        let inputs = self
            .inputs_by_short_name
            .lock()
            .expect("execution context mutex poisoned");
        expected
            .iter()
            .filter_map(|name| inputs.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    /// Returns a snapshot of every output posted so far, regardless of
    /// which job is waiting on which subset. Used by `j_ctx.inputs`.
    pub fn all_inputs_snapshot(&self) -> HashMap<String, Value> {
        self.inputs_by_short_name
            .lock()
            .expect("execution context mutex poisoned")
            .clone()
    }

    /// Waits for every short name in `expected_inputs` to post its
    /// output, honouring `timeout` as a wall-clock deadline from the
    /// moment this call starts waiting.
    ///
    /// An empty `expected_inputs` (the head job) resolves immediately
    /// with an empty map. On timeout, returns
    /// [`Flow4AiError::InputTimeout`].
    pub async fn wait_for_inputs(
        &self,
        expected_inputs: &[String],
        timeout: Duration,
        job_fqn: &Fqn,
    ) -> Result<HashMap<String, Value>> {
        if expected_inputs.is_empty() {
            return Ok(HashMap::new());
        }
        if self.all_present(expected_inputs) {
            return Ok(self.gather(expected_inputs));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Flow4AiError::InputTimeout {
                    job_fqn: job_fqn.clone(),
                    timeout,
                });
            }

            let notified = self.fan_in.notified();
            if self.all_present(expected_inputs) {
                return Ok(self.gather(expected_inputs));
            }

            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Err(Flow4AiError::InputTimeout {
                    job_fqn: job_fqn.clone(),
                    timeout,
                });
            }

            if self.all_present(expected_inputs) {
                return Ok(self.gather(expected_inputs));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_head_job_waits_for_nothing() {
        let ctx = ExecutionContext::new(Task::new(), Value::Null);
        let gathered = ctx
            .wait_for_inputs(&[], Duration::from_millis(10), &Fqn::make("g", "", "head"))
            .await
            .unwrap();
        assert!(gathered.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_inputs_wakes_on_post() {
        let ctx = std::sync::Arc::new(ExecutionContext::new(Task::new(), Value::Null));
        let waiter_ctx = ctx.clone();
        let waiter = tokio::spawn(async move {
            waiter_ctx
                .wait_for_inputs(
                    &["a".to_string()],
                    Duration::from_secs(5),
                    &Fqn::make("g", "", "b"),
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.post_output("a", Value::from(1));

        let gathered = waiter.await.unwrap().unwrap();
        assert_eq!(gathered.get("a"), Some(&Value::from(1)));
    }

    #[tokio::test]
    async fn test_wait_for_inputs_times_out() {
        let ctx = ExecutionContext::new(Task::new(), Value::Null);
        let err = ctx
            .wait_for_inputs(
                &["never".to_string()],
                Duration::from_millis(20),
                &Fqn::make("g", "", "b"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Flow4AiError::InputTimeout { .. }));
    }

    #[test]
    fn test_save_result_and_snapshot() {
        let ctx = ExecutionContext::new(Task::new(), Value::Null);
        ctx.save_result("gen", Value::from(serde_json::json!({"numbers": [1, 2, 3]})));
        let snapshot = ctx.saved_results_snapshot();
        assert_eq!(
            snapshot.get("gen"),
            Some(&serde_json::json!({"numbers": [1, 2, 3]}))
        );
    }
}
