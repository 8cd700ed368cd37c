//! The combinator tree users build before compilation: `Leaf`, `Serial`,
//! and `Parallel` nodes, plus the `sequence`/`parallel`/`wrap_fn`
//! surface functions.
//!
//! This tree is the input to [`crate::compiler::compile`]; it carries
//! no wiring of its own; successor/predecessor edges only exist once
//! the compiler has walked it.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ids::ShortName;
use crate::job::{JobBuilder, JobSpec, ParamSpec, UserRun, WrappedCallable};

/// A node in the composition tree.
pub enum Composition {
    /// A single job leaf.
    Leaf(Arc<JobSpec>),
    /// Execute children in order, piping each output into the next.
    Serial(Vec<Composition>),
    /// Execute children concurrently against the same upstream input.
    Parallel(Vec<Composition>),
}

impl Composition {
    /// Wraps a pre-built job leaf (escape hatch for callers holding a
    /// [`JobSpec`] built via [`JobBuilder`] directly).
    pub fn leaf(spec: Arc<JobSpec>) -> Self {
        Composition::Leaf(spec)
    }
}

/// Serial composition: `a -> b -> ...`. Every exit of one child wires
/// to every entry of the next.
pub fn sequence(children: impl IntoIterator<Item = Composition>) -> Composition {
    Composition::Serial(children.into_iter().collect())
}

/// Parallel composition: `a | b | ...`. All children receive the same
/// upstream input; no edges are added between siblings.
pub fn parallel(children: impl IntoIterator<Item = Composition>) -> Composition {
    Composition::Parallel(children.into_iter().collect())
}

/// Wraps a plain async function as a leaf composition.
///
/// `params` declares the callable's parameter names in order — the
/// Rust equivalent of introspecting a Python function's signature once
/// at construction (a one-time cost; here it's explicit
/// because Rust has no runtime reflection over closure parameter
/// names). `j_ctx`/`args`/`kwargs` are recognised automatically if
/// present in `params`.
pub fn wrap_fn<F, Fut>(
    short_name: impl Into<ShortName>,
    params: impl IntoIterator<Item = impl Into<String>>,
    func: F,
) -> Composition
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Value> + Send + 'static,
{
    let callable = WrappedCallable::new(ParamSpec::new(params), func);
    let spec = JobBuilder::new(short_name).build_wrapped(callable);
    Composition::Leaf(spec)
}

/// Wraps a user-supplied `run(task)` implementation as a leaf
/// composition (the "subclass" variant).
pub fn wrap_user(short_name: impl Into<ShortName>, run: Arc<dyn UserRun>) -> Composition {
    let spec = JobBuilder::new(short_name).build_user(run);
    Composition::Leaf(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wrap_fn_builds_a_leaf() {
        let comp = wrap_fn("square", ["x"], |bound| async move {
            let x = bound.get("x").and_then(Value::as_i64).unwrap_or(0);
            Value::from(x * x)
        });
        assert!(matches!(comp, Composition::Leaf(_)));
    }

    #[test]
    fn test_sequence_and_parallel_build_trees() {
        let a = wrap_fn("a", [] as [&str; 0], |_| async move { Value::Null });
        let b = wrap_fn("b", [] as [&str; 0], |_| async move { Value::Null });
        let comp = sequence([a, b]);
        match comp {
            Composition::Serial(children) => assert_eq!(children.len(), 2),
            _ => panic!("expected Serial"),
        }

        let c = wrap_fn("c", [] as [&str; 0], |_| async move { Value::Null });
        let d = wrap_fn("d", [] as [&str; 0], |_| async move { Value::Null });
        let comp = parallel([c, d]);
        match comp {
            Composition::Parallel(children) => assert_eq!(children.len(), 2),
            _ => panic!("expected Parallel"),
        }
    }
}
