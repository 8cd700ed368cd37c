//! Composition-to-graph compiler: walks a [`Composition`] tree into a
//! validated precedence graph, then normalises multiple entries/exits
//! into synthetic `__head__`/`__tail__` nodes.
//!
//! Grounded on `WorkflowCompiler::compile`'s shape: a staged
//! `validate -> build -> check` pipeline, generalized here to walk a
//! `Leaf`/`Serial`/`Parallel` tree instead of a pre-built node/edge
//! list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::composition::Composition;
use crate::error::{CompileError, CompileResult};
use crate::ids::ShortName;
use crate::job::behaviour::{SyntheticHead, SyntheticTail};
use crate::job::{JobSpec, SYNTHETIC_HEAD, SYNTHETIC_TAIL};
use crate::validator;

/// The compiler's output: a validated, head/tail-normalised graph
/// blueprint, ready for [`crate::graph::CompiledGraph::from_blueprint`]
/// to assign fully-qualified names.
pub struct GraphBlueprint {
    /// Every job leaf in the graph (including any synthetic head/tail),
    /// keyed by short name.
    pub jobs_by_short_name: HashMap<ShortName, Arc<JobSpec>>,
    /// `{short_name -> [successor short_names]}`.
    pub successors: HashMap<ShortName, Vec<ShortName>>,
    /// The graph's unique head short name (post-normalisation).
    pub head: ShortName,
    /// The graph's unique tail short name (post-normalisation).
    pub tail: ShortName,
}

#[derive(Default)]
struct Walker {
    jobs: HashMap<ShortName, Arc<JobSpec>>,
    successors: HashMap<ShortName, Vec<ShortName>>,
    seen_ptrs: HashSet<usize>,
}

impl Walker {
    fn leaf_identity(leaf: &Arc<JobSpec>) -> usize {
        Arc::as_ptr(leaf) as *const () as usize
    }

    fn add_leaf(&mut self, leaf: &Arc<JobSpec>) -> CompileResult<ShortName> {
        if !self.seen_ptrs.insert(Self::leaf_identity(leaf)) {
            return Err(CompileError::DuplicateLeaf {
                short_name: leaf.short_name().as_str().to_string(),
            });
        }

        let short = leaf.short_name().clone();
        if let Some(existing) = self.jobs.get(&short) {
            if !Arc::ptr_eq(existing, leaf) {
                return Err(CompileError::DuplicateShortName {
                    short_name: short.as_str().to_string(),
                });
            }
        }

        self.jobs.insert(short.clone(), leaf.clone());
        self.successors.entry(short.clone()).or_default();
        Ok(short)
    }

    fn walk(&mut self, node: &Composition) -> CompileResult<(Vec<ShortName>, Vec<ShortName>)> {
        match node {
            Composition::Leaf(leaf) => {
                let short = self.add_leaf(leaf)?;
                Ok((vec![short.clone()], vec![short]))
            }
            Composition::Serial(children) => {
                if children.is_empty() {
                    return Err(CompileError::MalformedCombinator {
                        detail: "serial composition with no children".to_string(),
                    });
                }

                let mut overall_entries: Option<Vec<ShortName>> = None;
                let mut prev_exits: Vec<ShortName> = Vec::new();

                for (i, child) in children.iter().enumerate() {
                    let (entries, exits) = self.walk(child)?;
                    if i == 0 {
                        overall_entries = Some(entries);
                    } else {
                        for from in &prev_exits {
                            for to in &entries {
                                self.successors.entry(from.clone()).or_default().push(to.clone());
                            }
                        }
                    }
                    prev_exits = exits;
                }

                Ok((overall_entries.expect("non-empty serial has a first child"), prev_exits))
            }
            Composition::Parallel(children) => {
                if children.is_empty() {
                    return Err(CompileError::MalformedCombinator {
                        detail: "parallel composition with no children".to_string(),
                    });
                }

                let mut entries = Vec::new();
                let mut exits = Vec::new();
                for child in children {
                    let (e, x) = self.walk(child)?;
                    entries.extend(e);
                    exits.extend(x);
                }
                Ok((entries, exits))
            }
        }
    }
}

fn dedup(names: Vec<ShortName>) -> Vec<ShortName> {
    let mut seen = HashSet::new();
    names.into_iter().filter(|n| seen.insert(n.clone())).collect()
}

/// Compiles a composition tree into a validated, head/tail-normalised
/// [`GraphBlueprint`].
pub fn compile(composition: &Composition) -> CompileResult<GraphBlueprint> {
    let mut walker = Walker::default();
    let (entries, exits) = walker.walk(composition)?;

    if walker.jobs.is_empty() {
        return Err(CompileError::EmptyComposition);
    }

    // Validate before normalisation: the synthetic nodes we might add
    // below only ever add edges from a fresh node to existing ones (or
    // vice versa), so they cannot introduce a cycle or a dangling
    // reference that wasn't already present.
    validator::validate(&walker.successors)?;

    let entries = dedup(entries);
    let exits = dedup(exits);

    let mut jobs = walker.jobs;
    let mut successors = walker.successors;

    let head = if entries.len() > 1 {
        insert_synthetic_head(&mut jobs, &mut successors, entries)?
    } else {
        entries
            .into_iter()
            .next()
            .expect("non-empty composition has at least one entry")
    };

    let tail = if exits.len() > 1 {
        insert_synthetic_tail(&mut jobs, &mut successors, exits)?
    } else {
        exits
            .into_iter()
            .next()
            .expect("non-empty composition has at least one exit")
    };

    Ok(GraphBlueprint {
        jobs_by_short_name: jobs,
        successors,
        head,
        tail,
    })
}

fn insert_synthetic_head(
    jobs: &mut HashMap<ShortName, Arc<JobSpec>>,
    successors: &mut HashMap<ShortName, Vec<ShortName>>,
    entries: Vec<ShortName>,
) -> CompileResult<ShortName> {
    let head_name = ShortName::new(SYNTHETIC_HEAD);
    if jobs.contains_key(&head_name) {
        return Err(CompileError::DuplicateShortName {
            short_name: SYNTHETIC_HEAD.to_string(),
        });
    }

    jobs.insert(head_name.clone(), JobSpec::synthetic(head_name.clone(), Arc::new(SyntheticHead)));
    successors.insert(head_name.clone(), entries);
    Ok(head_name)
}

fn insert_synthetic_tail(
    jobs: &mut HashMap<ShortName, Arc<JobSpec>>,
    successors: &mut HashMap<ShortName, Vec<ShortName>>,
    exits: Vec<ShortName>,
) -> CompileResult<ShortName> {
    let tail_name = ShortName::new(SYNTHETIC_TAIL);
    if jobs.contains_key(&tail_name) {
        return Err(CompileError::DuplicateShortName {
            short_name: SYNTHETIC_TAIL.to_string(),
        });
    }

    jobs.insert(tail_name.clone(), JobSpec::synthetic(tail_name.clone(), Arc::new(SyntheticTail)));
    for exit in exits {
        successors.entry(exit).or_default().push(tail_name.clone());
    }
    successors.entry(tail_name.clone()).or_default();
    Ok(tail_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{parallel, sequence, wrap_fn};
    use serde_json::Value;

    fn leaf(name: &str) -> Composition {
        wrap_fn(name, [] as [&str; 0], |_| async move { Value::Null })
    }

    #[test]
    fn test_compile_linear_pipeline() {
        let comp = sequence([leaf("square"), leaf("double")]);
        let blueprint = compile(&comp).unwrap();
        assert_eq!(blueprint.head, ShortName::new("square"));
        assert_eq!(blueprint.tail, ShortName::new("double"));
        assert_eq!(
            blueprint.successors.get(&ShortName::new("square")).unwrap(),
            &vec![ShortName::new("double")]
        );
    }

    #[test]
    fn test_compile_fan_out_fan_in_inserts_synthetic_tail() {
        let comp = sequence([leaf("gen"), parallel([leaf("sq"), leaf("dbl")]), leaf("agg")]);
        let blueprint = compile(&comp).unwrap();
        assert_eq!(blueprint.head, ShortName::new("gen"));
        assert_eq!(blueprint.tail, ShortName::new("agg"));
        assert!(!blueprint.jobs_by_short_name.contains_key(&ShortName::new(SYNTHETIC_TAIL)));
    }

    #[test]
    fn test_compile_multiple_heads_inserts_synthetic_head() {
        let comp = sequence([parallel([leaf("a"), leaf("b"), leaf("c")]), leaf("transformer")]);
        let blueprint = compile(&comp).unwrap();
        assert_eq!(blueprint.head, ShortName::new(SYNTHETIC_HEAD));
        assert_eq!(blueprint.tail, ShortName::new("transformer"));
        let head_successors = blueprint.successors.get(&blueprint.head).unwrap();
        assert_eq!(head_successors.len(), 3);
    }

    #[test]
    fn test_compile_rejects_duplicate_leaf() {
        let a = leaf("a");
        let dup = match &a {
            Composition::Leaf(spec) => Composition::Leaf(spec.clone()),
            _ => unreachable!(),
        };
        let comp = sequence([a, dup]);
        let err = compile(&comp).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateLeaf { .. }));
    }

    #[test]
    fn test_compile_rejects_duplicate_short_name_different_leaves() {
        let comp = parallel([leaf("a"), leaf("a")]);
        let err = compile(&comp).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateShortName { .. }));
    }

    #[test]
    fn test_compile_rejects_empty_composition() {
        let comp = Composition::Serial(Vec::new());
        let err = compile(&comp).unwrap_err();
        assert!(matches!(err, CompileError::MalformedCombinator { .. }));
    }
}
