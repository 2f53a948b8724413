use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use ahash::AHashMap;
use derive_builder::Builder;
use petgraph::prelude::{EdgeRef, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::Direction;
use tracing::{debug, trace};

use crate::detector::Subscriber;
use crate::dispatcher::{DispatchSeq, SubscriptionDispatcher};
use crate::error::GraphError;
use crate::publisher::{
    FuturePublisher, Publisher, Seed, SharedSeedQueue, TimeoutPublisher, TimeoutState,
};
use crate::registry::TopicRegistry;
use crate::topic::{Topic, TopicId, TopicState};
use crate::EdgeKind;

type CompleteFn = Box<dyn FnMut()>;

/// Initial capacity knobs for a graph.
#[derive(Builder, Debug, Clone)]
pub struct GraphConfig {
    /// Expected number of distinct topic types.
    #[builder(default = 32)]
    pub expected_topics: usize,

    /// Expected number of detectors.
    #[builder(default = 32)]
    pub expected_detectors: usize,

    /// Initial capacity of the seed (input) queue.
    #[builder(default = 64)]
    pub seed_queue_capacity: usize,
}

pub(crate) struct DetectorSlot {
    name: String,
    dispatchers: DispatchSeq,
    complete: Option<CompleteFn>,
    visits: u64,
}

pub(crate) enum GraphNode {
    Topic(TopicId),
    Detector(DetectorSlot),
}

impl GraphNode {
    fn display_name(&self) -> String {
        match self {
            GraphNode::Topic(id) => id.to_string(),
            GraphNode::Detector(slot) => slot.name.clone(),
        }
    }
}

/// Analyzer-facing description of one detector.
#[derive(Debug, Clone)]
pub struct DetectorInfo {
    /// Diagnostic name (type name unless overridden at build time).
    pub name: String,
    /// Subscribed topics, in declaration (delivery) order.
    pub inputs: Vec<TopicId>,
    /// Published topics, in declaration order.
    pub outputs: Vec<PublishedTopic>,
    /// Traversals in which this detector was visited.
    pub visits: u64,
}

/// One output edge of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedTopic {
    pub id: TopicId,
    /// True for next-traversal edges (lag feedback, future and timeout
    /// publication). Renderers draw these as back-edges.
    pub deferred: bool,
}

/// The detector graph: topics, detectors, and the traversal engine.
///
/// The graph owns every topic (through its registry), the bipartite
/// dependency DAG over topic and detector vertices, and the seed queue
/// through which external inputs and deferred publications enter. One
/// call to [`evaluate_graph`] runs one traversal:
///
/// 1. the previous traversal's publications are consolidated (last value
///    per topic becomes `current`),
/// 2. all pending seeds are applied to their topics,
/// 3. detectors are visited in a deterministic topological order; a
///    detector whose subscribed topics received no value is skipped, any
///    other has each new value delivered in subscription-declaration ×
///    publish order and is then completed exactly once.
///
/// The order is computed on first evaluation after the graph changes
/// shape: deferred edges are ignored (they carry values across
/// traversals, not within one) and ties are broken by registration
/// order. A cycle that survives the deferred-edge exclusion fails with
/// [`GraphError::CyclicGraph`].
///
/// [`evaluate_graph`]: Graph::evaluate_graph
pub struct Graph {
    dag: StableGraph<GraphNode, EdgeKind>,
    registry: TopicRegistry,
    seeds: SharedSeedQueue,
    timeouts: Rc<RefCell<TimeoutState>>,
    order: Option<Vec<NodeIndex>>,
    traversals: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::with_config(
            GraphConfigBuilder::default()
                .build()
                .expect("expected default builder"),
        )
    }

    pub fn with_config(config: GraphConfig) -> Self {
        let seeds: SharedSeedQueue = Rc::new(RefCell::new(VecDeque::with_capacity(
            config.seed_queue_capacity,
        )));
        Self {
            dag: StableGraph::with_capacity(
                config.expected_topics + config.expected_detectors,
                config.expected_topics * 2,
            ),
            registry: TopicRegistry::with_capacity(config.expected_topics),
            timeouts: Rc::new(RefCell::new(TimeoutState::new(Rc::clone(&seeds)))),
            seeds,
            order: None,
            traversals: 0,
        }
    }

    /// Returns the topic for `T`, creating it on first resolution.
    pub fn resolve_topic<T: TopicState>(&mut self) -> Topic<T> {
        let Self { dag, registry, .. } = self;
        registry.resolve::<T>(|id| dag.add_node(GraphNode::Topic(id)))
    }

    /// Enqueues an external input for the next traversal. This is the
    /// funnel [`ProcessorContainer::process_data`] posts through.
    ///
    /// Fails with [`GraphError::TopicNotFound`] when no detector of this
    /// graph ever resolved `T`'s topic.
    ///
    /// [`ProcessorContainer::process_data`]: crate::container::ProcessorContainer::process_data
    pub fn post_new_topic_state<T: TopicState>(&mut self, value: T) -> Result<(), GraphError> {
        let topic = self.registry.get::<T>().ok_or(GraphError::TopicNotFound {
            topic: std::any::type_name::<T>(),
        })?;
        self.seeds
            .borrow_mut()
            .push_back(Box::new(move || topic.publish(value)));
        Ok(())
    }

    /// Runs one traversal. See the type-level docs for the exact phases.
    pub fn evaluate_graph(&mut self) -> Result<(), GraphError> {
        self.ensure_order()?;
        let order = self.order.clone().expect("evaluation order just computed");

        self.traversals = self.traversals.wrapping_add(1);
        self.registry.consolidate_all();

        let pending: Vec<Seed> = self.seeds.borrow_mut().drain(..).collect();
        trace!(
            traversal = self.traversals,
            seeds = pending.len(),
            "evaluating graph"
        );
        for seed in pending {
            seed();
        }

        for node in order {
            let GraphNode::Detector(slot) = &mut self.dag[node] else {
                continue;
            };
            if !slot.dispatchers.iter().any(|d| d.has_new_value()) {
                continue;
            }

            trace!(detector = slot.name.as_str(), "visiting detector");
            for dispatcher in &mut slot.dispatchers {
                if dispatcher.has_new_value() {
                    dispatcher.dispatch();
                }
            }
            if let Some(complete) = slot.complete.as_mut() {
                complete();
            }
            slot.visits += 1;
        }

        Ok(())
    }

    /// Moves every scheduled timeout publication whose deadline is at or
    /// before `now` onto the seed queue. Hosts call this between
    /// traversals; fired values arrive with the next
    /// [`evaluate_graph`](Graph::evaluate_graph).
    pub fn fire_overdue(&mut self, now: Instant) -> usize {
        let fired = self.timeouts.borrow_mut().fire_overdue(now);
        if fired > 0 {
            debug!(fired, "timeout publications moved to seed queue");
        }
        fired
    }

    /// Deadline of the earliest scheduled timeout publication, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeouts.borrow().next_deadline()
    }

    /// True iff seeds are waiting for the next traversal.
    pub fn has_pending_input(&self) -> bool {
        !self.seeds.borrow().is_empty()
    }

    /// Number of traversals run so far.
    pub fn traversals(&self) -> u64 {
        self.traversals
    }

    /// Iterates the detectors in registration order, with their input and
    /// output topic identities. This is the surface a graph analyzer
    /// renders from; deferred outputs are the back-edges.
    pub fn detectors(&self) -> impl Iterator<Item = DetectorInfo> + '_ {
        self.dag.node_indices().filter_map(move |node| {
            let GraphNode::Detector(slot) = &self.dag[node] else {
                return None;
            };
            let inputs = slot.dispatchers.iter().map(|d| d.topic_id()).collect();
            let mut outputs: Vec<PublishedTopic> = self
                .dag
                .edges_directed(node, Direction::Outgoing)
                .filter_map(|edge| {
                    let GraphNode::Topic(id) = &self.dag[edge.target()] else {
                        return None;
                    };
                    Some(PublishedTopic {
                        id: *id,
                        deferred: edge.weight().is_deferred(),
                    })
                })
                .collect();
            // Edge iteration yields most-recent first; report declaration
            // order.
            outputs.reverse();
            Some(DetectorInfo {
                name: slot.name.clone(),
                inputs,
                outputs,
                visits: slot.visits,
            })
        })
    }

    /// Iterates every registered topic in registration order.
    pub fn topics(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.registry.iter().map(|topic| topic.id())
    }

    pub(crate) fn insert_detector(&mut self, name: String) -> NodeIndex {
        self.order = None;
        self.dag.add_node(GraphNode::Detector(DetectorSlot {
            name,
            dispatchers: DispatchSeq::new(),
            complete: None,
            visits: 0,
        }))
    }

    pub(crate) fn attach_completion(&mut self, node: NodeIndex, complete: CompleteFn) {
        let GraphNode::Detector(slot) = &mut self.dag[node] else {
            unreachable!("completion attached to a topic vertex");
        };
        slot.complete = Some(complete);
    }

    pub(crate) fn wire_subscription<T: TopicState, D: Subscriber<T>>(
        &mut self,
        node: NodeIndex,
        subscriber: Rc<RefCell<D>>,
    ) {
        let topic = self.resolve_topic::<T>();
        self.dag
            .add_edge(topic.node(), node, EdgeKind::Subscription);
        let GraphNode::Detector(slot) = &mut self.dag[node] else {
            unreachable!("subscription wired to a topic vertex");
        };
        slot.dispatchers
            .push(Box::new(SubscriptionDispatcher::new(topic, subscriber)));
        self.order = None;
    }

    pub(crate) fn wire_publisher<T: TopicState>(&mut self, node: NodeIndex) -> Publisher<T> {
        let topic = self.resolve_topic::<T>();
        self.dag.add_edge(node, topic.node(), EdgeKind::Publication);
        self.order = None;
        Publisher::new(topic)
    }

    pub(crate) fn wire_future_publisher<T: TopicState>(
        &mut self,
        node: NodeIndex,
    ) -> FuturePublisher<T> {
        let topic = self.resolve_topic::<T>();
        self.dag.add_edge(node, topic.node(), EdgeKind::Deferred);
        self.order = None;
        FuturePublisher::new(topic, Rc::clone(&self.seeds))
    }

    pub(crate) fn wire_timeout_publisher<T: TopicState>(
        &mut self,
        node: NodeIndex,
    ) -> TimeoutPublisher<T> {
        let topic = self.resolve_topic::<T>();
        self.dag.add_edge(node, topic.node(), EdgeKind::Deferred);
        self.order = None;
        TimeoutPublisher::new(topic, Rc::clone(&self.timeouts))
    }

    /// Kahn's algorithm over the bipartite DAG, ignoring deferred edges.
    /// The ready set is a min-heap on `NodeIndex`, so siblings order by
    /// registration. The cached order holds detector vertices only.
    fn ensure_order(&mut self) -> Result<(), GraphError> {
        if self.order.is_some() {
            return Ok(());
        }

        let mut indegree: AHashMap<NodeIndex, usize> = AHashMap::new();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = BinaryHeap::new();
        for node in self.dag.node_indices() {
            let degree = self
                .dag
                .edges_directed(node, Direction::Incoming)
                .filter(|edge| !edge.weight().is_deferred())
                .count();
            if degree == 0 {
                ready.push(Reverse(node));
            } else {
                indegree.insert(node, degree);
            }
        }

        let mut order = Vec::with_capacity(self.dag.node_count());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for edge in self.dag.edges_directed(node, Direction::Outgoing) {
                if edge.weight().is_deferred() {
                    continue;
                }
                let target = edge.target();
                let degree = indegree
                    .get_mut(&target)
                    .expect("edge target missing from indegree map");
                *degree -= 1;
                if *degree == 0 {
                    indegree.remove(&target);
                    ready.push(Reverse(target));
                }
            }
        }

        if order.len() != self.dag.node_count() {
            let nodes = self
                .dag
                .node_indices()
                .filter(|node| indegree.contains_key(node))
                .map(|node| self.dag[node].display_name())
                .collect();
            return Err(GraphError::CyclicGraph { nodes });
        }

        self.order = Some(
            order
                .into_iter()
                .filter(|&node| matches!(self.dag[node], GraphNode::Detector(_)))
                .collect(),
        );
        Ok(())
    }
}
