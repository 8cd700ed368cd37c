//! The manager / registry: compiles and registers graphs, accepts task
//! submissions, tracks lifecycle counters, and hands back drained
//! results.
//!
//! Grounded on `nvisy-runtime`'s `ConnectionRegistry`/`CredentialsRegistry`
//! (`HashMap` keyed by id, `register`/`get`/`remove`/`len`) for the
//! registry shape, and on `ob-workflow::engine::WorkflowEngine` for the
//! "look up definition, validate, act, persist" method shape — here
//! "persist" means buffering into the result sink rather than a database.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::compiler;
use crate::composition::Composition;
use crate::config::ManagerConfig;
use crate::engine::Engine;
use crate::error::{ErrorRecord, Flow4AiError, Result};
use crate::graph::CompiledGraph;
use crate::ids::{Fqn, unique_variant};
use crate::result::Envelope;
use crate::task::{Task, TaskId};

const TRACING_TARGET: &str = "flow4ai::manager";

/// Callback invoked once per completed task, immediately as its envelope
/// is produced. Exceptions raised inside the callback are the caller's
/// responsibility: the manager does not catch panics.
pub type OnComplete = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Monotonic totals tracked by a manager since its creation. Never
/// decremented by [`Flow4AiManager::pop_results`].
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Counts {
    /// Tasks accepted via `submit`.
    pub submitted: u64,
    /// Tasks whose envelope was produced successfully.
    pub completed: u64,
    /// Tasks that terminated with an error.
    pub errors: u64,
}

/// Result of draining the manager's completion buffer: every completed
/// envelope, keyed by the FQN it was submitted against, plus every error
/// record accumulated since the last drain.
#[derive(Debug, Default)]
pub struct DrainedResults {
    /// Completed envelopes, keyed by the graph FQN the task was
    /// submitted against.
    pub completed: HashMap<Fqn, Vec<Envelope>>,
    /// Error records for tasks that did not complete successfully.
    pub errors: Vec<ErrorRecord>,
}

#[derive(Default)]
struct ResultBuffer {
    completed: HashMap<Fqn, Vec<Envelope>>,
    errors: Vec<ErrorRecord>,
}

/// Monotonic lifecycle counters, shared between the manager and every
/// task it has spawned.
#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    errors: AtomicU64,
}

/// One registered, compiled graph plus the identity of the composition
/// root it was compiled from (for `add_graph`'s idempotence check).
struct RegisteredGraph {
    graph: Arc<CompiledGraph>,
    /// Pointer identity of the `Composition` this graph was compiled
    /// from, used to detect "the exact same composition object" being
    /// re-registered.
    source_identity: usize,
}

/// Compiles and registers job compositions, accepts task submissions,
/// and drives them through the execution engine.
///
/// Owns the job registry, lifecycle counters, and result buffer; these
/// are shared, mutable state serialised through `tokio::sync::Mutex`
/// rather than external locks. Every piece of state touched
/// by a spawned task execution is itself `Arc`-wrapped, so `submit` can
/// hand each task's background future its own cheap clones instead of
/// requiring callers to hold the manager behind an `Arc`.
pub struct Flow4AiManager {
    config: ManagerConfig,
    engine: Arc<Engine>,
    graphs: Mutex<HashMap<Fqn, RegisteredGraph>>,
    buffer: Arc<Mutex<ResultBuffer>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    on_complete: Option<OnComplete>,
    global_context: Value,
}

impl Flow4AiManager {
    /// Creates a manager with default configuration.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Creates a manager with the given configuration.
    pub fn with_config(config: ManagerConfig) -> Self {
        let engine = Arc::new(Engine::new(&config));
        tracing::info!(target: TRACING_TARGET, "manager initialized");
        Self {
            config,
            engine,
            graphs: Mutex::new(HashMap::new()),
            buffer: Arc::new(Mutex::new(ResultBuffer::default())),
            counters: Arc::new(Counters::default()),
            cancel: CancellationToken::new(),
            on_complete: None,
            global_context: Value::Null,
        }
    }

    /// Installs a per-completion callback, invoked immediately when a
    /// task's envelope is produced. Not invoked for cancelled tasks
    /// (see the open-question decisions in the design notes).
    pub fn with_on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    /// Sets the shared, read-only context exposed to wrapped callables
    /// under their `j_ctx.global` key.
    pub fn with_global_context(mut self, global_context: Value) -> Self {
        self.global_context = global_context;
        self
    }

    /// Compiles and registers a composition, returning the head job's
    /// FQN as the graph's handle.
    ///
    /// Re-registering the exact same composition root (identity, not
    /// structural equality) returns the previously assigned FQN instead
    /// of compiling again.
    pub async fn add_graph(
        &self,
        composition: &Arc<Composition>,
        graph_name: &str,
        variant: &str,
    ) -> Result<Fqn> {
        let identity = Arc::as_ptr(composition) as *const () as usize;
        let mut graphs = self.graphs.lock().await;

        if let Some((fqn, _)) = graphs
            .iter()
            .find(|(_, registered)| registered.source_identity == identity)
        {
            return Ok(fqn.clone());
        }

        let job_keys: HashMap<String, ()> =
            graphs.keys().map(|fqn| (fqn.as_str().to_string(), ())).collect();
        let assigned_variant = unique_variant(&job_keys, graph_name, variant);

        let blueprint = compiler::compile(composition)?;
        let compiled = CompiledGraph::from_blueprint(
            blueprint,
            graph_name,
            &assigned_variant,
            self.config.default_job_input_timeout,
        );
        let head_fqn = compiled.head_fqn().clone();

        tracing::info!(
            target: TRACING_TARGET,
            graph = graph_name,
            variant = assigned_variant,
            head = %head_fqn,
            job_count = compiled.len(),
            "graph registered"
        );

        graphs.insert(
            head_fqn.clone(),
            RegisteredGraph {
                graph: Arc::new(compiled),
                source_identity: identity,
            },
        );

        Ok(head_fqn)
    }

    /// Submits a single task against `fqn`, or against the sole
    /// registered graph if `fqn` is `None` and exactly one is
    /// registered. Assigns a task ID if the task doesn't already carry
    /// one, then spawns its execution without waiting for completion.
    pub async fn submit_one(&self, task: Task, fqn: Option<&Fqn>) -> Result<TaskId> {
        let ids = self.submit(vec![task], fqn).await?;
        Ok(ids.into_iter().next().expect("submitted exactly one task"))
    }

    /// Submits one or more tasks against `fqn` (or the sole registered
    /// graph), returning their assigned task IDs in submission order.
    pub async fn submit(&self, tasks: Vec<Task>, fqn: Option<&Fqn>) -> Result<Vec<TaskId>> {
        let graphs = self.graphs.lock().await;
        let resolved_fqn = self.resolve_fqn(&graphs, fqn)?;
        let graph = graphs[&resolved_fqn].graph.clone();
        drop(graphs);

        let mut ids = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            // Blocks (cooperatively) here, before admission, whenever
            // `max_concurrent_tasks` is saturated — `run_task` itself no
            // longer gates on concurrency, so the permit must be held
            // for the task's whole lifetime.
            let permit = self.engine.acquire_permit().await;

            let task_id = task.ensure_id();
            ids.push(task_id);
            self.counters.submitted.fetch_add(1, Ordering::SeqCst);

            let graph = graph.clone();
            let global_context = self.global_context.clone();
            let cancel_token = self.cancel.child_token();
            let engine = self.engine.clone();
            let buffer = self.buffer.clone();
            let counters = self.counters.clone();
            let on_complete = self.on_complete.clone();
            let fqn = resolved_fqn.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let outcome = engine.run_task(graph, task, global_context, cancel_token).await;

                // Buffer the outcome before bumping the counter: callers
                // use `wait_for_completion`'s counter check as a signal
                // that `pop_results` now has something to drain, so the
                // buffer write must be visible first.
                match outcome.result {
                    Ok(envelope) => {
                        // `on_complete` only ever sees produced envelopes, so
                        // cancelled/errored tasks never reach it.
                        if let Some(callback) = &on_complete {
                            callback(&envelope);
                        }
                        buffer.lock().await.completed.entry(fqn).or_default().push(envelope);
                        counters.completed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => {
                        let record = ErrorRecord::from_error(outcome.task_id, &err);
                        buffer.lock().await.errors.push(record);
                        counters.errors.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }

        tracing::debug!(
            target: TRACING_TARGET,
            fqn = %resolved_fqn,
            count = ids.len(),
            "tasks submitted"
        );

        Ok(ids)
    }

    /// Waits until, at observation time, `submitted == completed +
    /// errors`, or `timeout` elapses. Does not drain results and does
    /// not cancel in-flight tasks on timeout (observes counters only,
    /// never drains).
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_quiescent() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn is_quiescent(&self) -> bool {
        let submitted = self.counters.submitted.load(Ordering::SeqCst);
        let completed = self.counters.completed.load(Ordering::SeqCst);
        let errors = self.counters.errors.load(Ordering::SeqCst);
        submitted == completed + errors
    }

    /// Atomically drains the completion buffer, returning every
    /// completed envelope and error record accumulated since the last
    /// drain. Does not touch the monotonic counters.
    pub async fn pop_results(&self) -> DrainedResults {
        let mut buffer = self.buffer.lock().await;
        let completed = std::mem::take(&mut buffer.completed);
        let errors = std::mem::take(&mut buffer.errors);
        DrainedResults { completed, errors }
    }

    /// Returns the monotonic lifecycle counters.
    pub fn get_counts(&self) -> Counts {
        Counts {
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            errors: self.counters.errors.load(Ordering::SeqCst),
        }
    }

    /// Best-effort cancellation of every in-flight execution. Already
    /// completed or already-failed tasks are unaffected; the
    /// `on_complete` callback is never invoked for tasks cancelled this
    /// way.
    pub fn cancel_all(&self) {
        tracing::info!(target: TRACING_TARGET, "cancelling all in-flight executions");
        self.cancel.cancel();
    }

    /// One-shot convenience: registers `composition`, submits `task`,
    /// waits for completion, and collapses the result into `envelope`.
    /// Raises [`Flow4AiError::Internal`] if the wait times out or the
    /// task recorded an error.
    pub async fn execute(
        &self,
        task: Task,
        composition: &Arc<Composition>,
        graph_name: &str,
    ) -> Result<Envelope> {
        let fqn = self.add_graph(composition, graph_name, "").await?;
        let task_id = self.submit_one(task, Some(&fqn)).await?;

        if !self.wait_for_completion(Duration::from_secs(3600)).await {
            return Err(Flow4AiError::Internal(
                "execute: wait_for_completion timed out".to_string(),
            ));
        }

        let mut drained = self.pop_results().await;
        if let Some(record) = drained
            .errors
            .iter()
            .find(|record| record.task_id == task_id)
        {
            return Err(Flow4AiError::Internal(record.message.clone()));
        }

        let envelopes = drained.completed.remove(&fqn).unwrap_or_default();
        envelopes.into_iter().next().ok_or_else(|| {
            Flow4AiError::Internal("execute: no envelope produced for submitted task".to_string())
        })
    }

    fn resolve_fqn(
        &self,
        graphs: &HashMap<Fqn, RegisteredGraph>,
        fqn: Option<&Fqn>,
    ) -> Result<Fqn> {
        match fqn {
            Some(fqn) => {
                if graphs.contains_key(fqn) {
                    Ok(fqn.clone())
                } else {
                    Err(Flow4AiError::UnknownGraph { fqn: fqn.clone() })
                }
            }
            None => {
                if graphs.len() == 1 {
                    Ok(graphs.keys().next().expect("exactly one graph registered").clone())
                } else {
                    Err(Flow4AiError::AmbiguousGraph {
                        registered: graphs.len(),
                    })
                }
            }
        }
    }
}

impl Default for Flow4AiManager {
    fn default() -> Self {
        Self::new()
    }
}
