//! The compiled, immutable graph: [`JobNode`]s wired into a
//! `petgraph::graph::DiGraph`, each carrying its fully-qualified name.
//!
//! Produced once by [`CompiledGraph::from_blueprint`] at registration
//! time and never mutated afterward — successors/expected-inputs are
//! baked into the graph rather than stored back on the user-provided
//! leaves. Grounded on `nvisy-runtime/src/graph/compiled/graph.rs`,
//! which stores its compiled graph as `DiGraph<CompiledNode, EdgeData>`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::ids::{Fqn, ShortName};
use crate::job::{Behaviour, JobSpec};

/// One compiled job: its leaf blueprint, fully-qualified name, and its
/// place in the adjacency.
pub struct JobNode {
    spec: Arc<JobSpec>,
    fq_name: Fqn,
    successors: Vec<ShortName>,
    expected_inputs: Vec<ShortName>,
    timeout: Duration,
}

impl JobNode {
    /// Returns this job's short name.
    pub fn short_name(&self) -> &ShortName {
        self.spec.short_name()
    }

    /// Returns this job's fully-qualified name.
    pub fn fq_name(&self) -> &Fqn {
        &self.fq_name
    }

    /// Returns the short names of this job's direct successors.
    pub fn successors(&self) -> &[ShortName] {
        &self.successors
    }

    /// Returns the short names this job must gather inputs from before
    /// running. Empty means this job is the graph's head.
    pub fn expected_inputs(&self) -> &[ShortName] {
        &self.expected_inputs
    }

    /// Returns whether this job's output is captured into
    /// `saved_results`.
    pub fn save_result(&self) -> bool {
        self.spec.save_result()
    }

    /// Returns this job's per-execution input-wait deadline (the job's
    /// own override, or the manager's default at the time the graph
    /// was compiled).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the behaviour strategy supplying this job's work.
    pub fn behaviour(&self) -> &Arc<dyn Behaviour> {
        self.spec.behaviour()
    }
}

/// A compiled, validated collection of jobs with exactly one head and
/// one tail, identified by the head's fully-qualified name. Immutable
/// after construction.
///
/// The adjacency itself lives in `dag`, a `petgraph::graph::DiGraph`
/// keyed by `index_by_short`; `jobs` holds each job's metadata plus a
/// `successors`/`expected_inputs` cache materialised once from `dag` at
/// construction (so hot-path lookups during execution don't need to
/// walk the graph), not a second independent adjacency.
pub struct CompiledGraph {
    graph_name: String,
    variant: String,
    head: ShortName,
    tail: ShortName,
    jobs: HashMap<ShortName, JobNode>,
    dag: DiGraph<ShortName, ()>,
    index_by_short: HashMap<ShortName, NodeIndex>,
}

impl CompiledGraph {
    /// Assigns fully-qualified names to every job in a
    /// [`crate::compiler::GraphBlueprint`], builds the compiled
    /// `DiGraph`, and derives each job's `successors`/`expected_inputs`
    /// from its outgoing/incoming edges.
    pub fn from_blueprint(
        blueprint: crate::compiler::GraphBlueprint,
        graph_name: &str,
        variant: &str,
        default_timeout: Duration,
    ) -> Self {
        let crate::compiler::GraphBlueprint {
            jobs_by_short_name,
            successors,
            head,
            tail,
        } = blueprint;

        let mut dag: DiGraph<ShortName, ()> = DiGraph::with_capacity(jobs_by_short_name.len(), successors.len());
        let mut index_by_short: HashMap<ShortName, NodeIndex> = HashMap::with_capacity(jobs_by_short_name.len());
        for short in jobs_by_short_name.keys() {
            let idx = dag.add_node(short.clone());
            index_by_short.insert(short.clone(), idx);
        }
        for (from, tos) in &successors {
            let from_idx = index_by_short[from];
            for to in tos {
                let to_idx = index_by_short[to];
                dag.add_edge(from_idx, to_idx, ());
            }
        }

        let jobs = jobs_by_short_name
            .into_iter()
            .map(|(short, spec)| {
                let fq_name = Fqn::make(graph_name, variant, short.as_str());
                let timeout = spec.timeout_override().unwrap_or(default_timeout);
                let idx = index_by_short[&short];

                // `neighbors_directed` walks petgraph's per-node edge
                // list, which prepends on insertion, so reverse it to
                // recover the declaration order the compiler wired
                // edges in (synthetic-tail gathering and the wrapped-
                // callable predecessor fallback both rely on it).
                let node_successors: Vec<ShortName> = dag
                    .neighbors_directed(idx, Direction::Outgoing)
                    .map(|n| dag[n].clone())
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                let node_expected_inputs: Vec<ShortName> = dag
                    .neighbors_directed(idx, Direction::Incoming)
                    .map(|n| dag[n].clone())
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();

                let node = JobNode {
                    spec,
                    fq_name,
                    successors: node_successors,
                    expected_inputs: node_expected_inputs,
                    timeout,
                };
                (short, node)
            })
            .collect();

        Self {
            graph_name: graph_name.to_string(),
            variant: variant.to_string(),
            head,
            tail,
            jobs,
            dag,
            index_by_short,
        }
    }

    /// Returns the compiled adjacency as a `petgraph` digraph of short
    /// names, for callers that want to run their own graph algorithms
    /// (reachability, topological sort, ...) over a compiled graph.
    pub fn dag(&self) -> &DiGraph<ShortName, ()> {
        &self.dag
    }

    /// Returns a job's node index in [`Self::dag`], if present.
    pub fn node_index(&self, short_name: &ShortName) -> Option<NodeIndex> {
        self.index_by_short.get(short_name).copied()
    }

    /// Returns the graph's declared name.
    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    /// Returns the graph's assigned variant (post collision-suffixing).
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Returns the head job's short name.
    pub fn head_short_name(&self) -> &ShortName {
        &self.head
    }

    /// Returns the tail job's short name.
    pub fn tail_short_name(&self) -> &ShortName {
        &self.tail
    }

    /// Returns the head job's fully-qualified name — the graph's handle.
    pub fn head_fqn(&self) -> &Fqn {
        self.jobs[&self.head].fq_name()
    }

    /// Returns the tail job's fully-qualified name.
    pub fn tail_fqn(&self) -> &Fqn {
        self.jobs[&self.tail].fq_name()
    }

    /// Looks up a job by short name.
    pub fn job(&self, short_name: &ShortName) -> Option<&JobNode> {
        self.jobs.get(short_name)
    }

    /// Returns every job in this graph (unordered).
    pub fn jobs(&self) -> impl Iterator<Item = &JobNode> {
        self.jobs.values()
    }

    /// Returns the number of jobs in this graph (including any
    /// synthetic head/tail).
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns whether this graph has no jobs (never true for a
    /// successfully compiled graph).
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
