use std::cell::RefCell;
use std::rc::Rc;

use crate::detector::Subscriber;
use crate::topic::{Topic, TopicId, TopicState};

// Inline subscription-list bound for `lite` builds. Platforms raise it
// with the additive `lite-subscriptions-*` features; the largest enabled
// wins.
#[cfg(all(feature = "lite", feature = "lite-subscriptions-16"))]
pub(crate) const INLINE_SUBSCRIPTIONS: usize = 16;
#[cfg(all(
    feature = "lite",
    feature = "lite-subscriptions-8",
    not(feature = "lite-subscriptions-16")
))]
pub(crate) const INLINE_SUBSCRIPTIONS: usize = 8;
#[cfg(all(
    feature = "lite",
    not(any(
        feature = "lite-subscriptions-8",
        feature = "lite-subscriptions-16"
    ))
))]
pub(crate) const INLINE_SUBSCRIPTIONS: usize = 4;

#[cfg(feature = "lite")]
pub(crate) type DispatchSeq = smallvec::SmallVec<[Box<dyn Dispatch>; INLINE_SUBSCRIPTIONS]>;
#[cfg(not(feature = "lite"))]
pub(crate) type DispatchSeq = Vec<Box<dyn Dispatch>>;

/// Type-erased face of one subscription: delivers one topic's new values
/// to one subscriber. The walker holds these per detector, in the order
/// the detector declared its subscriptions.
pub(crate) trait Dispatch {
    fn topic_id(&self) -> TopicId;
    fn has_new_value(&self) -> bool;
    fn dispatch(&mut self);
}

/// Pairs a typed topic handle with a shared subscriber handle.
pub(crate) struct SubscriptionDispatcher<T: TopicState, D: Subscriber<T>> {
    topic: Topic<T>,
    subscriber: Rc<RefCell<D>>,
}

impl<T: TopicState, D: Subscriber<T>> SubscriptionDispatcher<T, D> {
    pub(crate) fn new(topic: Topic<T>, subscriber: Rc<RefCell<D>>) -> Self {
        Self { topic, subscriber }
    }
}

impl<T: TopicState, D: Subscriber<T>> Dispatch for SubscriptionDispatcher<T, D> {
    fn topic_id(&self) -> TopicId {
        self.topic.id()
    }

    fn has_new_value(&self) -> bool {
        self.topic.has_new_value()
    }

    fn dispatch(&mut self) {
        // Snapshot first: evaluate() may publish to other topics, and the
        // delivery set for this visit is frozen regardless.
        let values = self.topic.new_values();
        let mut subscriber = self.subscriber.borrow_mut();
        for value in &values {
            subscriber.evaluate(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detector;
    use petgraph::prelude::NodeIndex;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Tick(u32);
    impl TopicState for Tick {}

    struct Collector {
        seen: Vec<Tick>,
    }

    impl Detector for Collector {}

    impl Subscriber<Tick> for Collector {
        fn evaluate(&mut self, value: &Tick) {
            self.seen.push(value.clone());
        }
    }

    #[test]
    fn test_dispatch_delivers_in_publish_order() {
        let topic = Topic::<Tick>::new(NodeIndex::new(0));
        let collector = Rc::new(RefCell::new(Collector { seen: Vec::new() }));
        let mut dispatcher =
            SubscriptionDispatcher::new(topic.clone(), Rc::clone(&collector));

        topic.publish(Tick(1));
        topic.publish(Tick(2));
        topic.publish(Tick(3));

        assert!(dispatcher.has_new_value());
        dispatcher.dispatch();
        assert_eq!(
            collector.borrow().seen,
            vec![Tick(1), Tick(2), Tick(3)]
        );
    }

    #[test]
    fn test_clean_topic_reports_no_new_value() {
        let topic = Topic::<Tick>::new(NodeIndex::new(0));
        let collector = Rc::new(RefCell::new(Collector { seen: Vec::new() }));
        let mut dispatcher =
            SubscriptionDispatcher::new(topic.clone(), Rc::clone(&collector));

        assert!(!dispatcher.has_new_value());
        dispatcher.dispatch();
        assert!(collector.borrow().seen.is_empty());

        topic.publish(Tick(9));
        topic.consolidate();
        assert!(!dispatcher.has_new_value());
    }

    #[test]
    fn test_dispatch_reports_topic_identity() {
        let topic = Topic::<Tick>::new(NodeIndex::new(0));
        let collector = Rc::new(RefCell::new(Collector { seen: Vec::new() }));
        let dispatcher = SubscriptionDispatcher::new(topic.clone(), collector);
        assert_eq!(dispatcher.topic_id(), topic.id());
    }
}
