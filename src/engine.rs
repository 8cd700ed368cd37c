//! Per-task execution engine: one concurrent unit per job, fanning out
//! copies of a job's output to every successor and fanning in at each
//! job's input gate.
//!
//! Grounded on `nvisy_runtime::engine::executor::Engine` for the
//! overall shape (a struct holding a `tokio::sync::Semaphore` for
//! bounded concurrency, an `execute`-style entry point, `tracing`
//! instrumentation under a crate-level target constant) but
//! generalized from a single-path streaming pipeline to
//! true fan-out/fan-in: one `tokio::spawn`ed unit per job per task
//! execution, synchronised through [`crate::context::ExecutionContext`]
//! rather than a linear `order: Vec<NodeId>` walk.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::ManagerConfig;
use crate::context::ExecutionContext;
use crate::error::{Flow4AiError, Result};
use crate::graph::{CompiledGraph, JobNode};
use crate::job::Invocation;
use crate::result::{wrap_non_mapping, Envelope};
use crate::task::{Task, TaskId};

const TRACING_TARGET: &str = "flow4ai::engine";

/// Outcome of driving one task through one compiled graph.
pub struct TaskOutcome {
    /// The task's identifier.
    pub task_id: TaskId,
    /// The produced envelope, or the terminal error that aborted the
    /// execution.
    pub result: Result<Envelope>,
}

/// Drives task executions against compiled graphs, honouring
/// `max_concurrent_tasks` via a shared semaphore.
pub struct Engine {
    semaphore: Option<Arc<Semaphore>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("available_slots", &self.available_slots())
            .finish()
    }
}

impl Engine {
    /// Builds an engine sized according to `config`.
    pub fn new(config: &ManagerConfig) -> Self {
        let semaphore = config.max_concurrent_tasks.map(|n| Arc::new(Semaphore::new(n)));
        tracing::info!(
            target: TRACING_TARGET,
            max_concurrent_tasks = ?config.max_concurrent_tasks,
            "execution engine initialized"
        );
        Self { semaphore }
    }

    /// Returns the number of free concurrency slots, or `None` if
    /// unbounded.
    pub fn available_slots(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Acquires one admission slot, blocking (cooperatively) until
    /// `max_concurrent_tasks` allows it. Returns `None` immediately when
    /// the engine is unbounded.
    ///
    /// Callers must acquire this *before* spawning a task's execution
    /// (`submit` itself blocks when the bound is saturated) and hold
    /// the returned permit for the task's whole lifetime.
    pub async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        match &self.semaphore {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        }
    }

    /// Drives one task through `graph` to completion (or to its first
    /// terminal error), honouring cooperative cancellation via `cancel`.
    ///
    /// Admission bounding happens at [`Self::acquire_permit`], called by
    /// the caller before spawning this task's execution; this method
    /// itself does not gate on concurrency.
    pub async fn run_task(
        &self,
        graph: Arc<CompiledGraph>,
        mut task: Task,
        global_context: Value,
        cancel: CancellationToken,
    ) -> TaskOutcome {
        let task_id = task.ensure_id();

        tracing::debug!(
            target: TRACING_TARGET,
            %task_id,
            graph = graph.graph_name(),
            job_count = graph.len(),
            "starting task execution"
        );

        let passthrough = task.clone();
        let ctx = Arc::new(ExecutionContext::new(task, global_context));
        let tail_short = graph.tail_short_name().clone();

        let mut handles = Vec::with_capacity(graph.len());
        for job in graph.jobs() {
            let short = job.short_name().clone();
            let is_tail = short == tail_short;
            let graph = graph.clone();
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            handles.push((
                is_tail,
                tokio::spawn(async move {
                    let job = graph.job(&short).expect("job looked up from its own graph");
                    run_job_unit(job, &ctx, &cancel, is_tail).await
                }),
            ));
        }

        let mut tail_output: Option<Map<String, Value>> = None;
        let mut first_error: Option<Flow4AiError> = None;

        for (is_tail, handle) in handles {
            match handle.await {
                Ok(Ok(output)) => {
                    if is_tail {
                        tail_output = output;
                    }
                }
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        tracing::debug!(
                            target: TRACING_TARGET,
                            %task_id,
                            error = %err,
                            "job failed, cancelling sibling units"
                        );
                        cancel.cancel();
                        first_error = Some(err);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        cancel.cancel();
                        first_error = Some(Flow4AiError::Internal(format!(
                            "job unit panicked: {join_err}"
                        )));
                    }
                }
            }
        }

        let result = match first_error {
            Some(err) => Err(err),
            None => match tail_output {
                Some(tail_map) => {
                    let saved = ctx.saved_results_snapshot();
                    Ok(Envelope::new(tail_map, graph.tail_fqn().clone(), &passthrough, saved))
                }
                None => Err(Flow4AiError::Internal(
                    "tail job produced no output".to_string(),
                )),
            },
        };

        tracing::debug!(
            target: TRACING_TARGET,
            %task_id,
            ok = result.is_ok(),
            "task execution finished"
        );

        TaskOutcome { task_id, result }
    }
}

/// Runs exactly one job's lifecycle for one execution: gate on inputs,
/// invoke its behaviour, post the output to every successor, and
/// (for the tail) return the final output map.
async fn run_job_unit(
    job: &JobNode,
    ctx: &Arc<ExecutionContext>,
    cancel: &CancellationToken,
    is_tail: bool,
) -> Result<Option<Map<String, Value>>> {
    let expected: Vec<String> = job
        .expected_inputs()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();

    let gathered_map = tokio::select! {
        res = ctx.wait_for_inputs(&expected, job.timeout(), job.fq_name()) => res?,
        _ = cancel.cancelled() => return Err(Flow4AiError::Cancelled),
    };

    let gathered: Vec<(String, Value)> = job
        .expected_inputs()
        .iter()
        .map(|name| {
            let value = gathered_map.get(name.as_str()).cloned().unwrap_or(Value::Null);
            (name.as_str().to_string(), value)
        })
        .collect();

    let invocation = Invocation {
        ctx,
        short_name: job.short_name(),
        fq_name: job.fq_name(),
        gathered_inputs: &gathered,
    };

    let raw_output = tokio::select! {
        res = job.behaviour().run(&invocation) => res?,
        _ = cancel.cancelled() => return Err(Flow4AiError::Cancelled),
    };

    let output_map = match raw_output {
        Value::Object(map) => map,
        other if is_tail => wrap_non_mapping(other),
        _ => {
            return Err(Flow4AiError::NonMappingOutput {
                job_fqn: job.fq_name().clone(),
            })
        }
    };

    if job.save_result() {
        ctx.save_result(job.short_name().as_str(), Value::Object(output_map.clone()));
    }

    // All successors read from the same posted slot, keyed by this
    // job's own short name, so one post covers every fan-out branch.
    ctx.post_output(job.short_name().as_str(), Value::Object(output_map.clone()));

    Ok(if is_tail { Some(output_map) } else { None })
}
