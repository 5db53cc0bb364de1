//! `StepGraph`: a declarative DAG of named steps.

use crate::cancellation::CancellationToken;
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

/// Inputs handed to a step function: the cloned results of its declared
/// upstream steps, keyed by name, plus the build-wide cancellation token.
pub struct StepInputs<V> {
    upstream: HashMap<String, V>,
    cancellation: CancellationToken,
}

impl<V> StepInputs<V> {
    /// The result of an upstream step, if it was declared as a dependency.
    #[must_use]
    pub fn get(&self, step: &str) -> Option<&V> {
        self.upstream.get(step)
    }

    /// All upstream results, keyed by step name.
    #[must_use]
    pub fn all(&self) -> &HashMap<String, V> {
        &self.upstream
    }

    /// The shared cancellation token for this build.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Shape of a step's output, recorded for documentation purposes; the graph
/// and runner treat every step uniformly (a function from upstream results
/// to a single future value). `FanOut` and `Barrier` steps are ordinary
/// steps whose value type `V` happens to be a collection or a join of other
/// steps' values — the distinction is in how the caller models `V`, not in
/// runner behavior.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepShape {
    /// Yields one value.
    Scalar,
    /// Yields a list of sub-values that downstream steps can address
    /// individually.
    FanOut,
    /// Awaits a list of upstream futures to finalize a pipeline.
    Barrier,
}

type StepFn<V> = Arc<dyn Fn(StepInputs<V>) -> BoxFuture<'static, Result<V>> + Send + Sync>;

struct StepNode<V> {
    name: String,
    shape: StepShape,
    dependencies: Vec<String>,
    run: StepFn<V>,
}

/// A declarative graph of named steps with dependency edges. Steps are
/// type-parameterized over a single result type `V`; pipelines with
/// heterogeneous step outputs typically use an enum for `V`.
pub struct StepGraph<V> {
    graph: DiGraph<StepNode<V>, ()>,
    index_by_name: HashMap<String, NodeIndex>,
}

impl<V> Default for StepGraph<V> {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
            index_by_name: HashMap::new(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> StepGraph<V> {
    /// Build an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a step. `dependencies` are the names of steps that must
    /// complete, and whose results are visible via [`StepInputs::get`],
    /// before `run` is invoked. Returns [`Error::DuplicateStep`] if `name`
    /// was already used.
    pub fn add_step<F>(
        &mut self,
        name: impl Into<String>,
        shape: StepShape,
        dependencies: &[&str],
        run: F,
    ) -> Result<()>
    where
        F: Fn(StepInputs<V>) -> BoxFuture<'static, Result<V>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.index_by_name.contains_key(&name) {
            return Err(Error::DuplicateStep(name));
        }
        let node = StepNode {
            name: name.clone(),
            shape,
            dependencies: dependencies.iter().map(|s| (*s).to_string()).collect(),
            run: Arc::new(run),
        };
        let idx = self.graph.add_node(node);
        self.index_by_name.insert(name, idx);
        Ok(())
    }

    /// Wire dependency edges and check the graph is acyclic. Must be called
    /// once after every step has been added and before the graph is handed
    /// to a [`crate::Runner`].
    pub fn finalize(&mut self) -> Result<()> {
        let edges: Vec<(NodeIndex, NodeIndex)> = self
            .graph
            .node_indices()
            .flat_map(|idx| {
                let deps = self.graph[idx].dependencies.clone();
                let name = self.graph[idx].name.clone();
                deps.into_iter().map(move |dep| (dep, name.clone()))
            })
            .map(|(dep, name)| {
                let dep_idx = self
                    .index_by_name
                    .get(&dep)
                    .copied()
                    .ok_or_else(|| Error::UnknownDependency {
                        step: name.clone(),
                        dependency: dep,
                    });
                dep_idx.map(|dep_idx| (dep_idx, self.index_by_name[&name]))
            })
            .collect::<Result<Vec<_>>>()?;

        for (from, to) in edges {
            self.graph.add_edge(from, to, ());
        }

        toposort(&self.graph, None).map_err(|cycle| {
            Error::Cycle(self.graph[cycle.node_id()].name.clone())
        })?;
        Ok(())
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub(crate) fn indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    pub(crate) fn name(&self, idx: NodeIndex) -> &str {
        &self.graph[idx].name
    }

    pub(crate) fn shape(&self, idx: NodeIndex) -> StepShape {
        self.graph[idx].shape
    }

    pub(crate) fn dependencies(&self, idx: NodeIndex) -> &[String] {
        &self.graph[idx].dependencies
    }

    pub(crate) fn run_fn(&self, idx: NodeIndex) -> StepFn<V> {
        Arc::clone(&self.graph[idx].run)
    }

    pub(crate) fn index_of(&self, name: &str) -> NodeIndex {
        self.index_by_name[name]
    }

    pub(crate) fn dependents(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Outgoing)
            .collect()
    }
}

pub(crate) fn make_inputs<V: Clone>(
    upstream: HashMap<String, V>,
    cancellation: CancellationToken,
) -> StepInputs<V> {
    StepInputs {
        upstream,
        cancellation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_detects_unknown_dependency() {
        let mut graph: StepGraph<u32> = StepGraph::new();
        graph
            .add_step("a", StepShape::Scalar, &["missing"], |_| {
                Box::pin(async { Ok(0) })
            })
            .unwrap();
        assert!(matches!(
            graph.finalize(),
            Err(Error::UnknownDependency { .. })
        ));
    }

    #[test]
    fn finalize_detects_cycle() {
        let mut graph: StepGraph<u32> = StepGraph::new();
        graph
            .add_step("a", StepShape::Scalar, &["b"], |_| Box::pin(async { Ok(0) }))
            .unwrap();
        graph
            .add_step("b", StepShape::Scalar, &["a"], |_| Box::pin(async { Ok(0) }))
            .unwrap();
        assert!(matches!(graph.finalize(), Err(Error::Cycle(_))));
    }

    #[test]
    fn duplicate_step_name_rejected() {
        let mut graph: StepGraph<u32> = StepGraph::new();
        graph
            .add_step("a", StepShape::Scalar, &[], |_| Box::pin(async { Ok(0) }))
            .unwrap();
        assert!(matches!(
            graph.add_step("a", StepShape::Scalar, &[], |_| Box::pin(async { Ok(0) })),
            Err(Error::DuplicateStep(_))
        ));
    }

    #[test]
    fn acyclic_graph_finalizes_cleanly() {
        let mut graph: StepGraph<u32> = StepGraph::new();
        graph
            .add_step("a", StepShape::Scalar, &[], |_| Box::pin(async { Ok(1) }))
            .unwrap();
        graph
            .add_step("b", StepShape::Scalar, &["a"], |_| Box::pin(async { Ok(2) }))
            .unwrap();
        assert!(graph.finalize().is_ok());
    }
}
