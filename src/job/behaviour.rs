//! The `Behaviour` strategy trait and the synthetic head/tail behaviours
//! inserted by the composition compiler.
//!
//! Rather than a class hierarchy of job subtypes, a [`crate::job::JobNode`]
//! holds plain metadata plus a `Behaviour` trait object supplying the
//! user-facing work. This mirrors a `Transformer` /
//! `NodeKind` split: identity and wiring live on the node, behaviour is a
//! pluggable strategy.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::ids::{Fqn, ShortName};

/// Everything a [`Behaviour`] needs to produce its output for one job,
/// for one task execution.
pub struct Invocation<'a> {
    /// The execution this invocation belongs to.
    pub ctx: &'a ExecutionContext,
    /// This job's short name.
    pub short_name: &'a ShortName,
    /// This job's fully-qualified name.
    pub fq_name: &'a Fqn,
    /// Outputs of this job's direct predecessors, keyed by their short
    /// names, in declaration order of `expected_inputs`.
    pub gathered_inputs: &'a [(String, Value)],
}

/// Strategy object supplying a job's user-facing work.
///
/// Implementations must return a mapping (`serde_json::Value::Object`)
/// or a value the caller knows how to wrap; see
/// [`crate::job::JobNode::run_once`] for the wrapping rules, which differ
/// between the subclass and wrapped-callable variants.
#[async_trait]
pub trait Behaviour: Send + Sync {
    /// Produces this job's output for the task carried by `invocation.ctx`.
    async fn run(&self, invocation: &Invocation<'_>) -> Result<Value>;
}

/// Behaviour of the synthetic `__head__` node inserted when a
/// composition has more than one entry point: it takes no expected
/// inputs and emits the submitted task unchanged.
pub struct SyntheticHead;

#[async_trait]
impl Behaviour for SyntheticHead {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<Value> {
        Ok(invocation.ctx.task().to_value())
    }
}

/// Behaviour of the synthetic `__tail__` node inserted when a
/// composition has more than one exit point: it gathers every
/// predecessor's output into a dict keyed by short name.
pub struct SyntheticTail;

#[async_trait]
impl Behaviour for SyntheticTail {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<Value> {
        let mut map = serde_json::Map::new();
        for (short_name, value) in invocation.gathered_inputs {
            map.insert(short_name.clone(), value.clone());
        }
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    #[tokio::test]
    async fn test_synthetic_head_emits_task_unchanged() {
        let task = Task::from_iter([("a.x", 1)]);
        let ctx = ExecutionContext::new(task, Value::Null);
        let short = ShortName::new("__head__");
        let fqn = Fqn::make("g", "", "__head__");
        let invocation = Invocation {
            ctx: &ctx,
            short_name: &short,
            fq_name: &fqn,
            gathered_inputs: &[],
        };

        let output = SyntheticHead.run(&invocation).await.unwrap();
        assert_eq!(output.get("a.x"), Some(&Value::from(1)));
    }

    #[tokio::test]
    async fn test_synthetic_tail_gathers_by_short_name() {
        let ctx = ExecutionContext::new(Task::new(), Value::Null);
        let short = ShortName::new("__tail__");
        let fqn = Fqn::make("g", "", "__tail__");
        let gathered = vec![
            ("sq".to_string(), Value::from(4)),
            ("dbl".to_string(), Value::from(2)),
        ];
        let invocation = Invocation {
            ctx: &ctx,
            short_name: &short,
            fq_name: &fqn,
            gathered_inputs: &gathered,
        };

        let output = SyntheticTail.run(&invocation).await.unwrap();
        assert_eq!(output.get("sq"), Some(&Value::from(4)));
        assert_eq!(output.get("dbl"), Some(&Value::from(2)));
    }
}
