//! Bounded-concurrency execution of a [`StepGraph`].

use crate::cancellation::CancellationToken;
use crate::error::{Error, Result};
use crate::graph::{make_inputs, StepGraph};
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, VecDeque};
use tokio::task::JoinSet;

/// Runs a [`StepGraph`] on a bounded worker pool, submitting each step as
/// soon as its declared dependencies have completed rather than waiting for
/// an entire dependency "level" to finish — this lets, for example, base
/// layer pulls and application layer builds interleave freely as long as
/// neither is waiting on the other.
pub struct Runner {
    max_parallel: usize,
}

impl Runner {
    /// Build a runner with the given worker pool size. `0` is treated as
    /// unbounded.
    #[must_use]
    pub fn new(max_parallel: usize) -> Self {
        Self { max_parallel }
    }

    /// Execute every step in `graph`, returning the named results. On the
    /// first step failure, no new steps are submitted and the error is
    /// returned once in-flight steps have drained; the step's name is
    /// attached per the orchestrator's "wrap with failing step's name"
    /// policy.
    pub async fn run<V>(
        &self,
        graph: &StepGraph<V>,
        cancellation: CancellationToken,
    ) -> Result<HashMap<String, V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let total = graph.node_count();
        let mut indegree: HashMap<NodeIndex, usize> = HashMap::new();
        for idx in graph.indices() {
            indegree.insert(idx, graph.dependencies(idx).len());
        }

        let mut ready: VecDeque<NodeIndex> = indegree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&idx, _)| idx)
            .collect();

        let mut results: HashMap<String, V> = HashMap::new();
        let mut join_set: JoinSet<(NodeIndex, Result<V>)> = JoinSet::new();
        let mut first_error: Option<Error> = None;

        while results.len() < total {
            if first_error.is_none() {
                while !ready.is_empty()
                    && (self.max_parallel == 0 || join_set.len() < self.max_parallel)
                {
                    let idx = ready.pop_front().expect("checked non-empty above");
                    let name = graph.name(idx).to_string();
                    tracing::debug!(step = %name, shape = ?graph.shape(idx), "submitting step");

                    let upstream: HashMap<String, V> = graph
                        .dependencies(idx)
                        .iter()
                        .map(|dep| (dep.clone(), results[dep].clone()))
                        .collect();
                    let inputs = make_inputs(upstream, cancellation.clone());
                    let run_fn = graph.run_fn(idx);

                    join_set.spawn(async move {
                        let result = run_fn(inputs).await;
                        (idx, result)
                    });
                }
            }

            if join_set.is_empty() {
                // Nothing in flight and nothing ready: either we are done,
                // or every remaining step depends on a step that failed and
                // was never queued.
                break;
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (idx, outcome) = joined.expect("step task panicked");
            let name = graph.name(idx).to_string();

            match outcome {
                Ok(value) => {
                    results.insert(name, value);
                    if first_error.is_none() {
                        for dependent in graph.dependents(idx) {
                            let deg = indegree.get_mut(&dependent).expect("known node");
                            *deg -= 1;
                            if *deg == 0 {
                                ready.push_back(dependent);
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(step = %name, error = %e, "step failed, cancelling remaining steps");
                    cancellation.cancel();
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    ready.clear();
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StepShape;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_independent_steps_and_collects_results() {
        let mut graph: StepGraph<u32> = StepGraph::new();
        graph
            .add_step("a", StepShape::Scalar, &[], |_| Box::pin(async { Ok(1) }))
            .unwrap();
        graph
            .add_step("b", StepShape::Scalar, &[], |_| Box::pin(async { Ok(2) }))
            .unwrap();
        graph.finalize().unwrap();

        let results = Runner::new(4)
            .run(&graph, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results["a"], 1);
        assert_eq!(results["b"], 2);
    }

    #[tokio::test]
    async fn downstream_step_sees_upstream_result() {
        let mut graph: StepGraph<u32> = StepGraph::new();
        graph
            .add_step("a", StepShape::Scalar, &[], |_| Box::pin(async { Ok(10) }))
            .unwrap();
        graph
            .add_step("b", StepShape::Scalar, &["a"], |inputs| {
                let upstream = *inputs.get("a").unwrap();
                Box::pin(async move { Ok(upstream + 1) })
            })
            .unwrap();
        graph.finalize().unwrap();

        let results = Runner::new(4)
            .run(&graph, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results["b"], 11);
    }

    #[tokio::test]
    async fn failure_cancels_downstream_and_surfaces_step_name() {
        let mut graph: StepGraph<u32> = StepGraph::new();
        let downstream_ran = Arc::new(AtomicUsize::new(0));
        let downstream_ran_clone = Arc::clone(&downstream_ran);

        graph
            .add_step("a", StepShape::Scalar, &[], |_| {
                Box::pin(async {
                    Err(Error::step_failed(
                        "a",
                        std::io::Error::other("boom"),
                    ))
                })
            })
            .unwrap();
        graph
            .add_step("b", StepShape::Scalar, &["a"], move |_| {
                downstream_ran_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(0) })
            })
            .unwrap();
        graph.finalize().unwrap();

        let err = Runner::new(4)
            .run(&graph, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StepFailed { ref step, .. } if step == "a"));
        assert_eq!(downstream_ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn respects_bounded_concurrency() {
        let mut graph: StepGraph<u32> = StepGraph::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        for i in 0..6 {
            let in_flight = Arc::clone(&in_flight);
            let max_observed = Arc::clone(&max_observed);
            graph
                .add_step(format!("s{i}"), StepShape::Scalar, &[], move |_| {
                    let in_flight = Arc::clone(&in_flight);
                    let max_observed = Arc::clone(&max_observed);
                    Box::pin(async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_observed.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(0)
                    })
                })
                .unwrap();
        }
        graph.finalize().unwrap();

        Runner::new(2)
            .run(&graph, CancellationToken::new())
            .await
            .unwrap();
        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }
}
