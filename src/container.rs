use crate::error::GraphError;
use crate::graph::Graph;
use crate::topic::TopicState;

/// Facade owning a [`Graph`] together with its detectors.
///
/// Implementors hold the graph and the detector handles as fields and
/// wire everything up in their constructor; external input then flows
/// through [`process_data`], which runs one traversal and hands control
/// to [`process_output`] so the outside world can drain output topics
/// while their publications are still observable.
///
/// ```rust
/// use ripple::prelude::*;
///
/// #[derive(Clone, Default)]
/// struct Request {
///     id: u32,
/// }
/// impl TopicState for Request {}
///
/// #[derive(Clone, Default)]
/// struct Response {
///     id: u32,
/// }
/// impl TopicState for Response {}
///
/// struct Responder {
///     out: Publisher<Response>,
/// }
///
/// impl Detector for Responder {}
///
/// impl Subscriber<Request> for Responder {
///     fn evaluate(&mut self, request: &Request) {
///         self.out.publish(Response { id: request.id });
///     }
/// }
///
/// struct Service {
///     graph: Graph,
///     responses: Topic<Response>,
///     delivered: Vec<u32>,
/// }
///
/// impl Service {
///     fn new() -> Self {
///         let mut graph = Graph::new();
///         let _responder = DetectorBuilder::<Responder>::new()
///             .subscribe::<Request>()
///             .build(&mut graph, |ports| Responder {
///                 out: ports.publisher(),
///             });
///         let responses = graph.resolve_topic::<Response>();
///         Self {
///             graph,
///             responses,
///             delivered: Vec::new(),
///         }
///     }
/// }
///
/// impl ProcessorContainer for Service {
///     fn graph_mut(&mut self) -> &mut Graph {
///         &mut self.graph
///     }
///
///     fn process_output(&mut self) {
///         if self.responses.has_new_value() {
///             if let Some(response) = self.responses.new_value() {
///                 self.delivered.push(response.id);
///             }
///         }
///     }
/// }
///
/// let mut service = Service::new();
/// service.process_data(Request { id: 7 }).unwrap();
/// assert_eq!(service.delivered, vec![7]);
/// ```
///
/// [`process_data`]: ProcessorContainer::process_data
/// [`process_output`]: ProcessorContainer::process_output
pub trait ProcessorContainer {
    /// The graph this container owns.
    fn graph_mut(&mut self) -> &mut Graph;

    /// Hook invoked after every traversal, with output topics still
    /// reporting their new values.
    fn process_output(&mut self) {}

    /// Posts one external input, runs one traversal, and invokes
    /// [`process_output`](ProcessorContainer::process_output).
    fn process_data<T: TopicState>(&mut self, value: T) -> Result<(), GraphError> {
        let graph = self.graph_mut();
        graph.post_new_topic_state(value)?;
        graph.evaluate_graph()?;
        self.process_output();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Detector, DetectorBuilder, Subscriber};
    use crate::publisher::Publisher;
    use crate::topic::Topic;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Deposit(i64);
    impl TopicState for Deposit {}

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Balance(i64);
    impl TopicState for Balance {}

    struct Accumulator {
        total: i64,
        out: Publisher<Balance>,
    }

    impl Detector for Accumulator {
        fn complete_evaluation(&mut self) {
            self.out.publish(Balance(self.total));
        }
    }

    impl Subscriber<Deposit> for Accumulator {
        fn evaluate(&mut self, value: &Deposit) {
            self.total += value.0;
        }
    }

    struct Ledger {
        graph: Graph,
        balances: Topic<Balance>,
        observed: Vec<i64>,
    }

    impl Ledger {
        fn new() -> Self {
            let mut graph = Graph::new();
            let _accumulator = DetectorBuilder::<Accumulator>::new()
                .subscribe::<Deposit>()
                .build(&mut graph, |ports| Accumulator {
                    total: 0,
                    out: ports.publisher(),
                });
            let balances = graph.resolve_topic::<Balance>();
            Self {
                graph,
                balances,
                observed: Vec::new(),
            }
        }
    }

    impl ProcessorContainer for Ledger {
        fn graph_mut(&mut self) -> &mut Graph {
            &mut self.graph
        }

        fn process_output(&mut self) {
            if let Some(balance) = self.balances.new_value() {
                self.observed.push(balance.0);
            }
        }
    }

    #[test]
    fn test_process_data_drives_one_traversal_each() {
        let mut ledger = Ledger::new();
        ledger.process_data(Deposit(25)).unwrap();
        ledger.process_data(Deposit(50)).unwrap();
        ledger.process_data(Deposit(50)).unwrap();

        assert_eq!(ledger.observed, vec![25, 75, 125]);
        assert_eq!(ledger.graph.traversals(), 3);
    }

    #[test]
    fn test_process_output_sees_unconsolidated_values() {
        let mut ledger = Ledger::new();
        ledger.process_data(Deposit(10)).unwrap();

        // Still observable after process_data returns; consolidated once
        // the next traversal begins.
        assert!(ledger.balances.has_new_value());
        ledger.process_data(Deposit(1)).unwrap();
        assert_eq!(ledger.balances.current(), Balance(10));
    }

    #[test]
    fn test_post_of_unknown_topic_reports_error() {
        #[derive(Clone, Default)]
        struct Foreign;
        impl TopicState for Foreign {}

        let mut ledger = Ledger::new();
        assert!(matches!(
            ledger.process_data(Foreign),
            Err(GraphError::TopicNotFound { .. })
        ));
    }
}
