//! End-to-end scenario tests: exercise the manager's
//! public surface the way a user of the crate would, rather than
//! reaching into any module internals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flow4ai::prelude::*;
use serde_json::{Value, json};

async fn wait_quiescent(manager: &Flow4AiManager) {
    assert!(manager.wait_for_completion(Duration::from_secs(5)).await);
}

/// S1 — Linear pipeline, wrapped callables.
#[tokio::test]
async fn s1_linear_pipeline_wrapped_callables() {
    let composition = Arc::new(sequence([
        wrap_fn("square", ["x"], |bound| async move {
            let x = bound.get("x").and_then(Value::as_i64).unwrap_or(0);
            json!({ "result": x * x })
        }),
        wrap_fn("double", ["input_val"], |bound| async move {
            let v = bound.get("input_val").and_then(Value::as_i64).unwrap_or(0);
            Value::from(v * 2)
        }),
    ]));

    let manager = Flow4AiManager::new();
    let fqn = manager.add_graph(&composition, "demo", "").await.unwrap();

    let task = Task::from_iter([("square.x", 5)]);
    manager.submit_one(task.clone(), Some(&fqn)).await.unwrap();
    wait_quiescent(&manager).await;

    let drained = manager.pop_results().await;
    let envelope = &drained.completed[&fqn][0];

    assert_eq!(envelope.get("result"), Some(&Value::from(50)));
    assert_eq!(envelope.return_job(), Some(fqn.as_str()));
    assert!(envelope.saved_results().is_empty());

    let passthrough = envelope
        .get(flow4ai::TASK_PASSTHROUGH_KEY)
        .cloned()
        .unwrap();
    assert_eq!(passthrough.get("square.x"), Some(&Value::from(5)));
}

/// S2 — Fan-out + fan-in aggregation, with an upstream `save_result`.
#[tokio::test]
async fn s2_fan_out_fan_in_aggregation_with_saved_results() {
    let gen_spec = flow4ai::job::JobBuilder::new("gen")
        .with_save_result(true)
        .build_wrapped(flow4ai::job::WrappedCallable::new(
            flow4ai::job::ParamSpec::new(["start", "count"]),
            |bound| async move {
                let start = bound.get("start").and_then(Value::as_i64).unwrap_or(0);
                let count = bound.get("count").and_then(Value::as_i64).unwrap_or(0);
                let numbers: Vec<Value> = (start..start + count).map(Value::from).collect();
                json!({ "numbers": numbers })
            },
        ));

    let composition = Arc::new(sequence([
        Composition::leaf(gen_spec),
        parallel([
            wrap_fn("sq", ["numbers"], |bound| async move {
                let numbers = bound.get("numbers").and_then(Value::as_array).cloned().unwrap_or_default();
                let squared: Vec<Value> = numbers
                    .iter()
                    .map(|v| Value::from(v.as_i64().unwrap_or(0).pow(2)))
                    .collect();
                json!({ "squared": squared })
            }),
            wrap_fn("dbl", ["numbers"], |bound| async move {
                let numbers = bound.get("numbers").and_then(Value::as_array).cloned().unwrap_or_default();
                let doubled: Vec<Value> = numbers.iter().map(|v| Value::from(v.as_i64().unwrap_or(0) * 2)).collect();
                json!({ "doubled": doubled })
            }),
        ]),
        wrap_fn("agg", ["j_ctx"], |bound| async move {
            let inputs = bound.get("j_ctx").and_then(|c| c.get("inputs")).cloned().unwrap_or(Value::Null);
            let squared = inputs.get("sq").and_then(|v| v.get("squared")).cloned().unwrap_or(Value::Null);
            let doubled = inputs.get("dbl").and_then(|v| v.get("doubled")).cloned().unwrap_or(Value::Null);
            json!({ "squared": squared, "doubled": doubled })
        }),
    ]));

    let manager = Flow4AiManager::new();
    let fqn = manager.add_graph(&composition, "demo", "").await.unwrap();

    let task = Task::from_iter([("gen.start", 1), ("gen.count", 3)]);
    manager.submit_one(task, Some(&fqn)).await.unwrap();
    wait_quiescent(&manager).await;

    let drained = manager.pop_results().await;
    let envelope = &drained.completed[&fqn][0];

    assert_eq!(envelope.get("squared"), Some(&json!([1, 4, 9])));
    assert_eq!(envelope.get("doubled"), Some(&json!([2, 4, 6])));
    assert_eq!(
        envelope.saved_results().get("gen"),
        Some(&json!({ "numbers": [1, 2, 3] }))
    );
}

/// S3 — Multiple heads normalised into a synthetic head.
#[tokio::test]
async fn s3_multiple_heads_normalised_to_synthetic_head() {
    let composition = Arc::new(sequence([
        parallel([
            wrap_fn("a", [] as [&str; 0], |_| async move { json!({ "from": "a" }) }),
            wrap_fn("b", [] as [&str; 0], |_| async move { json!({ "from": "b" }) }),
            wrap_fn("c", [] as [&str; 0], |_| async move { json!({ "from": "c" }) }),
        ]),
        wrap_fn("transformer", ["j_ctx"], |bound| async move {
            let inputs = bound.get("j_ctx").and_then(|c| c.get("inputs")).cloned().unwrap_or(Value::Null);
            json!({ "seen": inputs })
        }),
    ]));

    let manager = Flow4AiManager::new();
    let fqn = manager.add_graph(&composition, "demo", "").await.unwrap();

    assert!(fqn.as_str().contains("__head__"));

    manager.submit_one(Task::new(), Some(&fqn)).await.unwrap();
    wait_quiescent(&manager).await;

    let drained = manager.pop_results().await;
    let envelope = &drained.completed[&fqn][0];
    let seen = envelope.get("seen").unwrap();
    assert_eq!(seen.get("a"), Some(&json!({ "from": "a" })));
    assert_eq!(seen.get("b"), Some(&json!({ "from": "b" })));
    assert_eq!(seen.get("c"), Some(&json!({ "from": "c" })));
}

/// S4 — FQN collision across two distinct compositions registered
/// under the same (graph, variant) pair.
#[tokio::test]
async fn s4_fqn_collision_assigns_suffixed_variant() {
    let x = Arc::new(sequence([wrap_fn("hX", [] as [&str; 0], |_| async move { json!({}) })]));
    let y = Arc::new(sequence([wrap_fn("hY", [] as [&str; 0], |_| async move { json!({}) })]));

    let manager = Flow4AiManager::new();
    let fqn_x = manager.add_graph(&x, "g", "v").await.unwrap();
    let fqn_y = manager.add_graph(&y, "g", "v").await.unwrap();

    assert_eq!(fqn_x.as_str(), "g$$v$$hX$$");
    assert_eq!(fqn_y.as_str(), "g$$v_1$$hY$$");

    manager.submit_one(Task::new(), Some(&fqn_x)).await.unwrap();
    manager.submit_one(Task::new(), Some(&fqn_y)).await.unwrap();
    wait_quiescent(&manager).await;

    let drained = manager.pop_results().await;
    assert_eq!(drained.completed[&fqn_x].len(), 1);
    assert_eq!(drained.completed[&fqn_y].len(), 1);
}

/// S5 — A job's `expected_inputs` are not satisfied before its
/// deadline, surfacing `INPUT_TIMEOUT` and leaving `completed` untouched.
#[tokio::test]
async fn s5_input_timeout_is_recorded_as_an_error() {
    let composition = Arc::new(sequence([
        wrap_fn("a", [] as [&str; 0], |_| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            json!({})
        }),
        wrap_fn("b", [] as [&str; 0], |_| async move { json!({}) }),
    ]));

    let config = ManagerConfig::builder()
        .default_job_input_timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let manager = Flow4AiManager::with_config(config);
    let fqn = manager.add_graph(&composition, "demo", "").await.unwrap();

    manager.submit_one(Task::new(), Some(&fqn)).await.unwrap();
    wait_quiescent(&manager).await;

    let drained = manager.pop_results().await;
    assert!(drained.completed.is_empty());
    assert_eq!(drained.errors.len(), 1);
    assert_eq!(drained.errors[0].kind, flow4ai::ErrorKind::InputTimeout);

    let counts = manager.get_counts();
    assert_eq!(counts.completed, 0);
    assert_eq!(counts.errors, 1);
}

/// S6 — A `RUN_ERROR` in one task never affects another concurrently
/// submitted task against the same graph.
#[tokio::test]
async fn s6_run_error_is_isolated_to_its_own_task() {
    struct ConditionalFail;

    #[async_trait::async_trait]
    impl flow4ai::job::UserRun for ConditionalFail {
        async fn run(
            &self,
            task: &Task,
            _inputs: &HashMap<String, Value>,
        ) -> std::result::Result<Value, String> {
            match task.get("should_fail").and_then(Value::as_bool) {
                Some(true) => Err("intentional failure".to_string()),
                _ => Ok(json!({ "ok": true })),
            }
        }
    }

    let composition = Arc::new(sequence([
        wrap_fn("a", [] as [&str; 0], |_| async move { json!({}) }),
        wrap_user("b", Arc::new(ConditionalFail)),
    ]));

    let manager = Flow4AiManager::new();
    let fqn = manager.add_graph(&composition, "demo", "").await.unwrap();

    let t1 = Task::from_iter([("should_fail", true)]);
    let t2 = Task::from_iter([("should_fail", false)]);
    manager.submit_one(t1, Some(&fqn)).await.unwrap();
    manager.submit_one(t2, Some(&fqn)).await.unwrap();
    wait_quiescent(&manager).await;

    let drained = manager.pop_results().await;
    assert_eq!(drained.completed[&fqn].len(), 1);
    assert_eq!(drained.completed[&fqn][0].get("ok"), Some(&Value::from(true)));
    assert_eq!(drained.errors.len(), 1);
    assert_eq!(drained.errors[0].kind, flow4ai::ErrorKind::RunError);

    let counts = manager.get_counts();
    assert_eq!(counts.submitted, 2);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.errors, 1);
}
