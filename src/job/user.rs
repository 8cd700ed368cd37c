//! The "subclass" job variant: user code implementing `run(task)`
//! directly, with access to the accumulated predecessor inputs.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Flow4AiError, Result};
use crate::job::behaviour::{Behaviour, Invocation};

/// User-supplied work for the subclass job variant.
///
/// Equivalent to overriding `run(task)` on a job base class; here it is
/// a plain trait so no inheritance hierarchy is required.
#[async_trait]
pub trait UserRun: Send + Sync {
    /// Runs this job's logic for one task.
    ///
    /// `inputs` is the dict of `{short_name → output}` for every
    /// predecessor this job declared in `expected_inputs` (empty for a
    /// head job). Implementations return `Err` with a message on
    /// failure; the engine wraps it as [`Flow4AiError::RunError`].
    async fn run(
        &self,
        task: &crate::task::Task,
        inputs: &std::collections::HashMap<String, Value>,
    ) -> std::result::Result<Value, String>;
}

/// Adapts a [`UserRun`] implementation to the [`Behaviour`] interface.
pub struct UserJobBehaviour {
    inner: std::sync::Arc<dyn UserRun>,
}

impl UserJobBehaviour {
    /// Wraps a user-supplied `run` implementation.
    pub fn new(inner: std::sync::Arc<dyn UserRun>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Behaviour for UserJobBehaviour {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<Value> {
        let inputs: std::collections::HashMap<String, Value> = invocation
            .gathered_inputs
            .iter()
            .cloned()
            .collect();

        self.inner
            .run(invocation.ctx.task(), &inputs)
            .await
            .map_err(|message| Flow4AiError::RunError {
                job_fqn: invocation.fq_name.clone(),
                message,
            })
    }
}
