//! Topic-typed detector graph with deterministic topological evaluation.
//!
//! `ripple` hosts user-written *detectors* that subscribe to strongly
//! typed *topics*, compute, and publish to other topics. One external
//! input drives exactly one *traversal*: a single pass over the detectors
//! in a deterministic topological order, visiting only those whose inputs
//! received values, each at most once. The model targets embedded and
//! reactive applications where the same inputs must always produce the
//! same execution order.
//!
//! # Computation Model
//! - **Topics**: one typed slot per value type and graph, holding the
//!   consolidated `current` value and the ordered publications of the
//!   traversal in flight ([`Topic`]).
//! - **Detectors**: nodes declaring one [`Subscriber`] capability per
//!   input type and holding [`Publisher`] handles for their outputs
//!   ([`Detector`], [`DetectorBuilder`]).
//! - **Traversal**: [`Graph::evaluate_graph`] consolidates the previous
//!   traversal, applies pending seeds, and walks the detectors; values
//!   always flow strictly downstream within a traversal.
//! - **Feedback**: [`Lag`] republishes a topic one traversal later as
//!   [`Lagged`], so cyclic logical dependencies never become live cycles.
//! - **Deferred publication**: [`FuturePublisher`] targets the next
//!   traversal directly; [`TimeoutPublisher`] targets it once a deadline
//!   passes and the host calls [`Graph::fire_overdue`].
//!
//! # Design Principles
//! - **Single-threaded, synchronous, cooperative**: a traversal runs to
//!   completion on the calling thread with no suspension points; long
//!   work belongs outside the engine.
//! - **Type-indexed topics**: the value type is the channel identity, so
//!   wiring mistakes surface at compile time and dispatch is direct.
//! - **No global state**: a [`Graph`] and its detectors form one isolated
//!   instance; any number may coexist in a process.
//!
//! # Usage
//! ```rust
//! use ripple::prelude::*;
//!
//! #[derive(Clone, Default)]
//! struct Celsius(f32);
//! impl TopicState for Celsius {}
//!
//! #[derive(Clone, Default)]
//! struct Overheated(bool);
//! impl TopicState for Overheated {}
//!
//! struct Threshold {
//!     latest: f32,
//!     out: Publisher<Overheated>,
//! }
//!
//! impl Detector for Threshold {
//!     fn complete_evaluation(&mut self) {
//!         self.out.publish(Overheated(self.latest > 90.0));
//!     }
//! }
//!
//! impl Subscriber<Celsius> for Threshold {
//!     fn evaluate(&mut self, reading: &Celsius) {
//!         self.latest = reading.0;
//!     }
//! }
//!
//! let mut graph = Graph::new();
//! let _threshold = DetectorBuilder::<Threshold>::new()
//!     .subscribe::<Celsius>()
//!     .build(&mut graph, |ports| Threshold {
//!         latest: 0.0,
//!         out: ports.publisher(),
//!     });
//!
//! graph.post_new_topic_state(Celsius(95.0)).unwrap();
//! graph.evaluate_graph().unwrap();
//!
//! let alarms = graph.resolve_topic::<Overheated>();
//! assert_eq!(alarms.new_value().map(|a| a.0), Some(true));
//! ```
//!
//! Applications usually wrap the graph in a [`ProcessorContainer`] that
//! owns the detectors and drains output topics in its `process_output`
//! hook.

use enum_as_inner::EnumAsInner;

pub mod container;
pub mod detector;
mod dispatcher;
pub mod error;
pub mod graph;
pub mod lag;
pub mod publisher;
mod registry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod topic;

/// Classifies an edge of the dependency graph.
///
/// Subscription and publication edges constrain the evaluation order;
/// deferred edges carry values across traversals and are ignored by the
/// topological sort. They are the back-edges a graph renderer draws
/// differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumAsInner)]
pub enum EdgeKind {
    /// Topic → detector: the detector evaluates the topic's new values.
    Subscription,

    /// Detector → topic: values published during the detector's visit,
    /// visible downstream within the same traversal.
    Publication,

    /// Detector → topic: values that surface at a later traversal (lag
    /// feedback, future and timeout publication).
    Deferred,
}

pub mod prelude {
    pub use crate::container::ProcessorContainer;
    pub use crate::detector::{
        Detector, DetectorBuilder, DetectorHandle, DetectorPorts, Subscriber,
    };
    pub use crate::error::GraphError;
    pub use crate::graph::{DetectorInfo, Graph, GraphConfig, GraphConfigBuilder, PublishedTopic};
    pub use crate::lag::{Lag, Lagged};
    pub use crate::publisher::{FuturePublisher, Publisher, TimeoutPublisher, TimeoutToken};
    pub use crate::topic::{Topic, TopicId, TopicState};
    pub use crate::EdgeKind;

    #[cfg(any(test, feature = "testing"))]
    pub use crate::testing::{tap_topic, TopicTap};
}

pub use prelude::*;
