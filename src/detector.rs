use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::graph::Graph;
use crate::publisher::{FuturePublisher, Publisher, TimeoutPublisher};
use crate::topic::{short_type_name, TopicState};

/// A node of the computation graph.
///
/// A detector subscribes to input topics and publishes to output topics.
/// During a traversal in which at least one of its inputs received a
/// value, the engine delivers every new value of every subscribed topic
/// through the matching [`Subscriber`] implementation and then calls
/// [`complete_evaluation`] exactly once. Detectors that saw no input are
/// skipped entirely.
///
/// Publishing handles ([`Publisher`], [`FuturePublisher`],
/// [`TimeoutPublisher`]) are minted once, while the detector is built, and
/// stored as fields; they are the only way a detector writes to the graph.
///
/// ```rust
/// use ripple::prelude::*;
///
/// #[derive(Clone, Default)]
/// struct CoinInserted {
///     cents: i64,
/// }
/// impl TopicState for CoinInserted {}
///
/// #[derive(Clone, Default)]
/// struct Balance {
///     cents: i64,
/// }
/// impl TopicState for Balance {}
///
/// struct BalanceTracker {
///     total: i64,
///     out: Publisher<Balance>,
/// }
///
/// impl BalanceTracker {
///     fn new(graph: &mut Graph) -> DetectorHandle<Self> {
///         DetectorBuilder::new()
///             .subscribe::<CoinInserted>()
///             .build(graph, |ports| Self {
///                 total: 0,
///                 out: ports.publisher(),
///             })
///     }
/// }
///
/// impl Detector for BalanceTracker {
///     fn complete_evaluation(&mut self) {
///         self.out.publish(Balance { cents: self.total });
///     }
/// }
///
/// impl Subscriber<CoinInserted> for BalanceTracker {
///     fn evaluate(&mut self, coin: &CoinInserted) {
///         self.total += coin.cents;
///     }
/// }
/// ```
///
/// [`complete_evaluation`]: Detector::complete_evaluation
pub trait Detector: 'static {
    /// Called once per visit, after every per-topic delivery of the
    /// traversal. Derived outputs are usually published from here.
    fn complete_evaluation(&mut self) {}
}

/// The evaluation capability for one subscribed topic type.
///
/// Implement `Subscriber<T>` once per topic the detector subscribes to;
/// [`DetectorBuilder::subscribe`] requires the matching implementation at
/// compile time, so a missing capability never reaches runtime.
pub trait Subscriber<T: TopicState>: Detector {
    /// Receives one published value. Called once per value, in publish
    /// order, for every value of `T`'s topic in the current traversal.
    fn evaluate(&mut self, value: &T);
}

/// Shared handle to a built detector.
///
/// The graph keeps the detector alive through its subscription wiring;
/// the handle exists so the enclosing container can inspect or mutate
/// detector state between traversals.
pub struct DetectorHandle<D: Detector> {
    inner: Rc<RefCell<D>>,
}

impl<D: Detector> Clone for DetectorHandle<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<D: Detector> DetectorHandle<D> {
    /// Immutable access to the detector state.
    ///
    /// # Panics
    /// Panics if called while the engine is mid-delivery to this
    /// detector, which cannot happen from code running between
    /// traversals.
    pub fn borrow(&self) -> Ref<'_, D> {
        self.inner.borrow()
    }

    /// Mutable access to the detector state.
    pub fn borrow_mut(&self) -> RefMut<'_, D> {
        self.inner.borrow_mut()
    }
}

type WireFn<D> = Box<dyn FnOnce(&mut Graph, petgraph::prelude::NodeIndex, &Rc<RefCell<D>>)>;

/// Fluent construction of a detector: declare subscriptions, then build
/// the state with access to publishing ports.
///
/// Subscription declaration order is the delivery order within a visit.
pub struct DetectorBuilder<D: Detector> {
    name: String,
    subscriptions: Vec<WireFn<D>>,
}

impl<D: Detector> Default for DetectorBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Detector> DetectorBuilder<D> {
    pub fn new() -> Self {
        Self {
            name: short_type_name(std::any::type_name::<D>()),
            subscriptions: Vec::new(),
        }
    }

    /// Overrides the diagnostic name (defaults to the detector's type
    /// name).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Subscribes the detector to `T`'s topic. Requires the
    /// `Subscriber<T>` capability.
    pub fn subscribe<T: TopicState>(mut self) -> Self
    where
        D: Subscriber<T>,
    {
        self.subscriptions.push(Box::new(|graph, node, handle| {
            graph.wire_subscription::<T, D>(node, Rc::clone(handle));
        }));
        self
    }

    /// Inserts the detector into the graph. `init` constructs the state
    /// and mints its publishing handles through [`DetectorPorts`].
    pub fn build(
        self,
        graph: &mut Graph,
        init: impl FnOnce(&mut DetectorPorts<'_>) -> D,
    ) -> DetectorHandle<D> {
        let node = graph.insert_detector(self.name);
        let detector = init(&mut DetectorPorts {
            graph: &mut *graph,
            node,
        });
        let inner = Rc::new(RefCell::new(detector));

        let completer = Rc::clone(&inner);
        graph.attach_completion(
            node,
            Box::new(move || completer.borrow_mut().complete_evaluation()),
        );

        for wire in self.subscriptions {
            wire(graph, node, &inner);
        }

        DetectorHandle { inner }
    }
}

/// Publishing access granted to a detector while it is being built.
///
/// Every handle minted here records the corresponding edge in the graph:
/// same-traversal publication for [`publisher`], deferred (next-traversal)
/// edges for [`future_publisher`] and [`timeout_publisher`]. Deferred
/// edges do not constrain the evaluation order, which is how feedback
/// loops stay acyclic.
///
/// [`publisher`]: DetectorPorts::publisher
/// [`future_publisher`]: DetectorPorts::future_publisher
/// [`timeout_publisher`]: DetectorPorts::timeout_publisher
pub struct DetectorPorts<'g> {
    graph: &'g mut Graph,
    node: petgraph::prelude::NodeIndex,
}

impl DetectorPorts<'_> {
    /// Write access to `T`'s topic within the current traversal.
    pub fn publisher<T: TopicState>(&mut self) -> Publisher<T> {
        self.graph.wire_publisher(self.node)
    }

    /// Write access that lands at the start of the next traversal.
    pub fn future_publisher<T: TopicState>(&mut self) -> FuturePublisher<T> {
        self.graph.wire_future_publisher(self.node)
    }

    /// Deadline-scheduled write access, fired by the host between
    /// traversals.
    pub fn timeout_publisher<T: TopicState>(&mut self) -> TimeoutPublisher<T> {
        self.graph.wire_timeout_publisher(self.node)
    }
}
