//! Job nodes: metadata plus a pluggable [`Behaviour`] strategy.
//!
//! A [`JobSpec`] is the leaf-level blueprint a composition carries
//! around before compilation (short name, save/timeout flags, and the
//! behaviour strategy). The compiler turns a tree of these into
//! [`crate::graph::JobNode`]s, which additionally carry the wiring
//! (`successors`/`expected_inputs`) and fully-qualified name assigned
//! at registration time. Neither type stores a back-reference to its
//! neighbours on itself; the compiled adjacency lives entirely in
//! `crate::graph::CompiledGraph`.

pub mod behaviour;
pub mod user;
pub mod wrapped;

use std::sync::Arc;
use std::time::Duration;

pub use behaviour::{Behaviour, Invocation};
pub use user::{UserJobBehaviour, UserRun};
pub use wrapped::{ParamSpec, WrappedCallable, DEFAULT_CTX_PARAM};

use crate::ids::ShortName;

/// Default per-job input-wait deadline (~3000s).
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(3000);

/// Short names reserved for synthetic head/tail nodes inserted by the
/// compiler when a composition exposes more than one entry or exit.
pub const SYNTHETIC_HEAD: &str = "__head__";
pub const SYNTHETIC_TAIL: &str = "__tail__";

/// A leaf job's blueprint: identity, flags, and behaviour, before the
/// compiler assigns it a place in an adjacency.
///
/// `timeout` is `None` unless the job overrides it explicitly; an
/// unset timeout resolves to the owning manager's
/// `default_job_input_timeout` at graph-compile time (see
/// [`crate::graph::CompiledGraph::from_blueprint`]), matching a job's
/// deadline being a per-job override of a manager-wide default.
pub struct JobSpec {
    short_name: ShortName,
    save_result: bool,
    timeout: Option<Duration>,
    behaviour: Arc<dyn Behaviour>,
}

impl JobSpec {
    /// Returns this job's short name.
    pub fn short_name(&self) -> &ShortName {
        &self.short_name
    }

    /// Returns whether this job's output should be captured into
    /// `saved_results`.
    pub fn save_result(&self) -> bool {
        self.save_result
    }

    /// Returns this job's explicit input-wait deadline override, if any.
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the behaviour strategy supplying this job's work.
    pub fn behaviour(&self) -> &Arc<dyn Behaviour> {
        &self.behaviour
    }

    /// Builds a synthetic node (used by the compiler for `__head__`/
    /// `__tail__`); always `save_result = false` with no timeout
    /// override, since synthetic nodes have no user-observable wait.
    pub(crate) fn synthetic(short_name: ShortName, behaviour: Arc<dyn Behaviour>) -> Arc<Self> {
        Arc::new(Self {
            short_name,
            save_result: false,
            timeout: None,
            behaviour,
        })
    }
}

/// Builder for a [`JobSpec`], following the `NodeBuilder`
/// pattern: configure flags, then finish with one of the two job
/// variants.
pub struct JobBuilder {
    short_name: ShortName,
    save_result: bool,
    timeout: Option<Duration>,
}

impl JobBuilder {
    /// Starts building a job with the given short name. Defaults to
    /// `save_result = false` and no explicit timeout override.
    pub fn new(short_name: impl Into<ShortName>) -> Self {
        Self {
            short_name: short_name.into(),
            save_result: false,
            timeout: None,
        }
    }

    /// Sets whether this job's output is captured into `saved_results`.
    pub fn with_save_result(mut self, save_result: bool) -> Self {
        self.save_result = save_result;
        self
    }

    /// Overrides the per-job input-wait deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Finishes the job as a subclass-variant job running `run`.
    pub fn build_user(self, run: Arc<dyn UserRun>) -> Arc<JobSpec> {
        Arc::new(JobSpec {
            short_name: self.short_name,
            save_result: self.save_result,
            timeout: self.timeout,
            behaviour: Arc::new(UserJobBehaviour::new(run)),
        })
    }

    /// Finishes the job as a wrapped-callable-variant job.
    pub fn build_wrapped(self, callable: WrappedCallable) -> Arc<JobSpec> {
        Arc::new(JobSpec {
            short_name: self.short_name,
            save_result: self.save_result,
            timeout: self.timeout,
            behaviour: Arc::new(callable),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_job_builder_defaults() {
        let callable = WrappedCallable::new(ParamSpec::new(["x"]), |bound| async move {
            bound.get("x").cloned().unwrap_or(Value::Null)
        });
        let spec = JobBuilder::new("square").build_wrapped(callable);
        assert_eq!(spec.short_name().as_str(), "square");
        assert!(!spec.save_result());
        assert_eq!(spec.timeout_override(), None);
    }

    #[test]
    fn test_job_builder_overrides() {
        let callable = WrappedCallable::new(ParamSpec::new([] as [&str; 0]), |_| async move {
            Value::Null
        });
        let spec = JobBuilder::new("slow")
            .with_save_result(true)
            .with_timeout(Duration::from_secs(1))
            .build_wrapped(callable);
        assert!(spec.save_result());
        assert_eq!(spec.timeout_override(), Some(Duration::from_secs(1)));
    }
}
