//! The "wrapped callable" job variant: a plain function whose parameter
//! list is introspected once at construction time (task parameter
//! routing).
//!
//! Rust has no runtime signature introspection, so where the source
//! system inspects a Python function's `inspect.signature`, here the
//! caller declares the parameter list explicitly via [`ParamSpec`] at
//! construction — a one-time cost paid once per job, matching the
//! "introspects its parameter list once at construction" contract.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::{Flow4AiError, Result};
use crate::job::behaviour::{Behaviour, Invocation};
use crate::task::Task;

/// Reserved parameter name: a list spread as positional arguments.
/// Present params take precedence over positional name matching.
pub const ARGS_KEY: &str = "args";

/// Reserved parameter name: a dict merged last as keyword arguments.
pub const KWARGS_KEY: &str = "kwargs";

/// Default name of the injected context parameter.
pub const DEFAULT_CTX_PARAM: &str = "j_ctx";

/// A wrapped callable's declared parameter list, computed once when the
/// job is built.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Declared parameter names, in order, exactly as the callable's
    /// signature lists them (including `args`/`kwargs`/the ctx sentinel
    /// if the callable declares them).
    names: Vec<String>,
    /// The sentinel parameter name that receives the injected context
    /// dict, configurable at construction.
    ctx_param_name: String,
}

impl ParamSpec {
    /// Builds a parameter spec from a declared name list.
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ctx_param_name: DEFAULT_CTX_PARAM.to_string(),
        }
    }

    /// Overrides the sentinel context parameter name (default `j_ctx`).
    pub fn with_ctx_param_name(mut self, name: impl Into<String>) -> Self {
        self.ctx_param_name = name.into();
        self
    }

    fn positional_names(&self) -> Vec<&str> {
        self.names
            .iter()
            .map(String::as_str)
            .filter(|n| *n != ARGS_KEY && *n != KWARGS_KEY && *n != self.ctx_param_name)
            .collect()
    }

    fn declares_ctx(&self) -> bool {
        self.names.iter().any(|n| n == &self.ctx_param_name)
    }
}

/// Extracts the task parameters addressed to `short_name`, accepting
/// both the dotted (`"{short}.{param}"`) and nested
/// (`{"{short}": {"{param}": value}}`) encodings. Nested entries win on
/// key collision so the two forms round-trip to one internal shape.
fn route_task_params(task: &Task, short_name: &str) -> Map<String, Value> {
    let mut routed = Map::new();
    let dotted_prefix = format!("{short_name}.");

    for (key, value) in task.values() {
        if let Some(param) = key.strip_prefix(dotted_prefix.as_str()) {
            routed.insert(param.to_string(), value.clone());
        }
    }

    if let Some(Value::Object(nested)) = task.get(short_name) {
        for (param, value) in nested {
            routed.insert(param.clone(), value.clone());
        }
    }

    routed
}

/// Binds a wrapped callable's declared parameters against task-routed
/// values, `args`/`kwargs`, and — for any parameter left unbound by
/// those — the job's gathered predecessor outputs, consumed in
/// declaration order.
///
/// The predecessor fallback is this implementation's resolution of an
/// open question left unset elsewhere: it is not named by
/// §4.4/§6 directly, but is required for a wrapped job to receive a
/// single upstream job's return value under a parameter name that
/// doesn't match any task-routed key (see `S1` in the testable
/// properties). See `DESIGN.md` for the recorded rationale.
pub fn bind_params(
    spec: &ParamSpec,
    short_name: &str,
    task: &Task,
    gathered_inputs: &[(String, Value)],
    all_inputs_snapshot: &HashMap<String, Value>,
    global_context: &Value,
) -> std::result::Result<Map<String, Value>, String> {
    let mut routed = route_task_params(task, short_name);
    let mut bound = Map::new();

    let args_list = routed.remove(ARGS_KEY).and_then(|v| match v {
        Value::Array(a) => Some(a),
        _ => None,
    });
    let kwargs_map = routed.remove(KWARGS_KEY).and_then(|v| match v {
        Value::Object(m) => Some(m),
        _ => None,
    });

    let positional_names = spec.positional_names();

    if let Some(args) = &args_list {
        for (name, value) in positional_names.iter().zip(args.iter()) {
            bound.insert((*name).to_string(), value.clone());
        }
    }

    for name in &positional_names {
        if bound.contains_key(*name) {
            continue;
        }
        if let Some(v) = routed.get(*name) {
            bound.insert((*name).to_string(), v.clone());
        }
    }

    if let Some(kwargs) = &kwargs_map {
        for (k, v) in kwargs {
            bound.insert(k.clone(), v.clone());
        }
    }

    let task_matched = bound.clone();

    let mut predecessor_values = gathered_inputs.iter();
    for name in &positional_names {
        if bound.contains_key(*name) {
            continue;
        }
        if let Some((_, value)) = predecessor_values.next() {
            let unwrapped = match value {
                Value::Object(m) if m.len() == 1 => m.values().next().cloned().unwrap_or(Value::Null),
                other => other.clone(),
            };
            bound.insert((*name).to_string(), unwrapped);
        }
    }

    if spec.declares_ctx() {
        let ctx_value = serde_json::json!({
            "task": Value::Object(task_matched),
            "inputs": all_inputs_snapshot,
            "global": global_context,
        });
        bound.insert(spec.ctx_param_name.clone(), ctx_value);
    }

    let missing: Vec<&str> = positional_names
        .iter()
        .filter(|n| !bound.contains_key(**n))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(format!("unbound parameter(s): {}", missing.join(", ")));
    }

    Ok(bound)
}

/// A job whose work is a plain function over bound parameters, rather
/// than a `run(task)` override.
pub struct WrappedCallable {
    spec: ParamSpec,
    func: Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Value> + Send + Sync>,
}

impl WrappedCallable {
    /// Wraps `func`, to be invoked with the bound parameter dict
    /// computed by [`bind_params`] against `spec`.
    pub fn new<F, Fut>(spec: ParamSpec, func: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        Self {
            spec,
            func: Arc::new(move |bound| Box::pin(func(bound)) as BoxFuture<'static, Value>),
        }
    }
}

#[async_trait]
impl Behaviour for WrappedCallable {
    async fn run(&self, invocation: &Invocation<'_>) -> Result<Value> {
        let all_inputs = invocation.ctx.all_inputs_snapshot();
        let bound = bind_params(
            &self.spec,
            invocation.short_name.as_str(),
            invocation.ctx.task(),
            invocation.gathered_inputs,
            &all_inputs,
            invocation.ctx.global_context(),
        )
        .map_err(|message| Flow4AiError::ParamBindError {
            job_fqn: invocation.fq_name.clone(),
            message,
        })?;

        let output = (self.func)(bound).await;

        // Unlike the subclass variant, the wrapped-callable variant
        // always wraps a non-mapping return, tail or not.
        Ok(match output {
            Value::Object(_) => output,
            other => {
                let mut wrapped = Map::new();
                wrapped.insert("result".to_string(), other);
                Value::Object(wrapped)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::ids::{Fqn, ShortName};

    #[test]
    fn test_route_task_params_dotted_form() {
        let task = Task::from_iter([("square.x", 5)]);
        let routed = route_task_params(&task, "square");
        assert_eq!(routed.get("x"), Some(&Value::from(5)));
    }

    #[test]
    fn test_route_task_params_nested_form() {
        let task = Task::from_iter([("square", serde_json::json!({"x": 5}))]);
        let routed = route_task_params(&task, "square");
        assert_eq!(routed.get("x"), Some(&Value::from(5)));
    }

    #[test]
    fn test_bind_params_ignores_params_for_unknown_short_name() {
        let task = Task::from_iter([("other.y", 1), ("square.x", 5)]);
        let spec = ParamSpec::new(["x"]);
        let bound = bind_params(&spec, "square", &task, &[], &HashMap::new(), &Value::Null).unwrap();
        assert_eq!(bound.get("x"), Some(&Value::from(5)));
        assert_eq!(bound.len(), 1);
    }

    #[test]
    fn test_bind_params_args_take_precedence() {
        let task = Task::from_iter([
            ("double.x", Value::from(1)),
            ("double.args", Value::from(vec![99])),
        ]);
        let spec = ParamSpec::new(["x"]);
        let bound = bind_params(&spec, "double", &task, &[], &HashMap::new(), &Value::Null).unwrap();
        assert_eq!(bound.get("x"), Some(&Value::from(99)));
    }

    #[test]
    fn test_bind_params_falls_back_to_single_predecessor_value() {
        let task = Task::new();
        let spec = ParamSpec::new(["input_val"]);
        let gathered = vec![("square".to_string(), serde_json::json!({"result": 25}))];
        let bound = bind_params(&spec, "double", &task, &gathered, &HashMap::new(), &Value::Null).unwrap();
        assert_eq!(bound.get("input_val"), Some(&Value::from(25)));
    }

    #[test]
    fn test_bind_params_errors_when_unbound() {
        let task = Task::new();
        let spec = ParamSpec::new(["x"]);
        let err = bind_params(&spec, "square", &task, &[], &HashMap::new(), &Value::Null).unwrap_err();
        assert!(err.contains('x'));
    }

    #[tokio::test]
    async fn test_wrapped_callable_wraps_non_tail_scalar_return() {
        let spec = ParamSpec::new(["x"]);
        let job = WrappedCallable::new(spec, |bound| async move {
            let x = bound.get("x").and_then(Value::as_i64).unwrap_or(0);
            Value::from(x * x)
        });

        let task = Task::from_iter([("square.x", 5)]);
        let ctx = ExecutionContext::new(task, Value::Null);
        let short = ShortName::new("square");
        let fqn = Fqn::make("g", "", "square");
        let invocation = Invocation {
            ctx: &ctx,
            short_name: &short,
            fq_name: &fqn,
            gathered_inputs: &[],
        };

        let output = job.run(&invocation).await.unwrap();
        assert_eq!(output.get("result"), Some(&Value::from(25)));
    }
}
