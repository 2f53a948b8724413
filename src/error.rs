/// Errors surfaced by graph construction and evaluation.
///
/// Both variants are programmer errors: the engine performs no recovery,
/// and a failed traversal leaves the graph in whatever state the walk had
/// reached. Panics raised by user code inside `evaluate` or
/// `complete_evaluation` propagate out of the traversal untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A value was posted for a topic type that no detector in this graph
    /// subscribes to or publishes, so the registry has no slot for it.
    #[error("no topic registered for `{topic}`")]
    TopicNotFound {
        /// Full type name of the missing topic state.
        topic: &'static str,
    },

    /// The dependency graph contains a cycle that is not broken by a
    /// deferred (lagged) edge. Detected on the first evaluation after the
    /// graph changed shape.
    #[error("dependency cycle among graph nodes: {nodes:?}")]
    CyclicGraph {
        /// Names of the nodes left unordered by the topological sort.
        nodes: Vec<String>,
    },
}
