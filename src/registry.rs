use std::any::{Any, TypeId};

use ahash::AHashMap;
use petgraph::prelude::NodeIndex;

use crate::topic::{Topic, TopicId, TopicState};

/// Type-erased view of one registered topic, re-typed on lookup.
pub(crate) trait AnyTopic {
    fn id(&self) -> TopicId;
    fn consolidate(&self);
    fn as_any(&self) -> &dyn Any;
}

impl<T: TopicState> AnyTopic for Topic<T> {
    fn id(&self) -> TopicId {
        Topic::id(self)
    }

    fn consolidate(&self) {
        Topic::consolidate(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Maps topic type identity to the one `Topic<T>` instance of the graph.
///
/// Storage is an insertion-ordered vector of type-erased slots plus a
/// `TypeId` index into it, so consolidation and diagnostics iterate in
/// registration order.
pub(crate) struct TopicRegistry {
    by_type: AHashMap<TypeId, usize>,
    slots: Vec<Box<dyn AnyTopic>>,
}

impl TopicRegistry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            by_type: AHashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Returns the topic for `T`, creating it on first resolution.
    /// `insert_node` allocates the graph vertex backing a new topic.
    pub(crate) fn resolve<T: TopicState>(
        &mut self,
        insert_node: impl FnOnce(TopicId) -> NodeIndex,
    ) -> Topic<T> {
        if let Some(topic) = self.get::<T>() {
            return topic;
        }

        let id = TopicId::of::<T>();
        let topic = Topic::<T>::new(insert_node(id));
        self.by_type.insert(TypeId::of::<T>(), self.slots.len());
        self.slots.push(Box::new(topic.clone()));
        topic
    }

    /// Non-creating lookup, used by the external input funnel.
    pub(crate) fn get<T: TopicState>(&self) -> Option<Topic<T>> {
        let slot = *self.by_type.get(&TypeId::of::<T>())?;
        let topic = self.slots[slot]
            .as_any()
            .downcast_ref::<Topic<T>>()
            .expect("registry slot re-typed to the wrong topic");
        Some(topic.clone())
    }

    pub(crate) fn consolidate_all(&self) {
        for slot in &self.slots {
            slot.consolidate();
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &dyn AnyTopic> {
        self.slots.iter().map(Box::as_ref)
    }

    #[allow(dead_code)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
