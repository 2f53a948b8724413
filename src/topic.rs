use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use petgraph::prelude::NodeIndex;

// Inline value-buffer bound for `lite` builds. Platforms raise it with
// the additive `lite-values-*` features; the largest enabled wins.
#[cfg(all(feature = "lite", feature = "lite-values-32"))]
pub(crate) const INLINE_VALUES: usize = 32;
#[cfg(all(
    feature = "lite",
    feature = "lite-values-16",
    not(feature = "lite-values-32")
))]
pub(crate) const INLINE_VALUES: usize = 16;
#[cfg(all(
    feature = "lite",
    not(any(feature = "lite-values-16", feature = "lite-values-32"))
))]
pub(crate) const INLINE_VALUES: usize = 8;

#[cfg(feature = "lite")]
pub(crate) type ValueSeq<T> = smallvec::SmallVec<[T; INLINE_VALUES]>;
#[cfg(not(feature = "lite"))]
pub(crate) type ValueSeq<T> = Vec<T>;

/// Marker for a value type carried through the graph.
///
/// Each `TopicState` type identifies exactly one topic per [`Graph`]: the
/// type *is* the channel. Implementors must be cheap to clone and have a
/// meaningful empty state (`Default`), which is what subscribers observe
/// before the first publication.
///
/// A `TopicState` may carry a large shared payload behind an `Rc`/`Arc`;
/// once published, the payload is treated as immutable by every
/// subscriber, and an update is expressed by publishing a new shared
/// reference.
///
/// ```rust
/// use ripple::prelude::*;
///
/// #[derive(Clone, Default)]
/// struct CoinInserted {
///     cents: u32,
/// }
///
/// impl TopicState for CoinInserted {}
/// ```
///
/// [`Graph`]: crate::graph::Graph
pub trait TopicState: Clone + Default + 'static {}

/// Stable identity of a topic: its Rust type plus the type name for
/// diagnostics. `Display` renders the short, path-stripped form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicId {
    type_id: TypeId,
    name: &'static str,
}

impl TopicId {
    pub(crate) fn of<T: TopicState>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The full type path of the topic state.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&short_type_name(self.name))
    }
}

/// Strips module paths from a type name, keeping generic structure:
/// `crate::lag::Lagged<app::Sale>` becomes `Lagged<Sale>`.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut start = 0;
    for (idx, ch) in full.char_indices() {
        match ch {
            ':' => start = idx + 1,
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                out.push_str(&full[start..idx]);
                out.push(ch);
                start = idx + 1;
            }
            _ => {}
        }
    }
    out.push_str(&full[start..]);
    out
}

pub(crate) struct TopicCore<T: TopicState> {
    current: T,
    new_values: ValueSeq<T>,
}

impl<T: TopicState> TopicCore<T> {
    fn new() -> Self {
        Self {
            current: T::default(),
            new_values: ValueSeq::new(),
        }
    }
}

/// A typed handle to one topic of the graph.
///
/// The handle is a cheap clone over shared topic storage, so detectors,
/// publishers, and the enclosing container can all hold one. A topic keeps
/// the last consolidated value (`current`) plus the ordered sequence of
/// values published during the traversal in flight. The sequence only
/// grows within a traversal; at the start of the next traversal the last
/// element is promoted to `current` and the sequence is cleared, which is
/// why output topics still report [`has_new_value`] when the container's
/// output hook runs.
///
/// [`has_new_value`]: Topic::has_new_value
pub struct Topic<T: TopicState> {
    core: Rc<RefCell<TopicCore<T>>>,
    node: NodeIndex,
}

impl<T: TopicState> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            node: self.node,
        }
    }
}

impl<T: TopicState> Topic<T> {
    pub(crate) fn new(node: NodeIndex) -> Self {
        Self {
            core: Rc::new(RefCell::new(TopicCore::new())),
            node,
        }
    }

    /// Identity of this topic.
    pub fn id(&self) -> TopicId {
        TopicId::of::<T>()
    }

    pub(crate) fn node(&self) -> NodeIndex {
        self.node
    }

    /// True iff at least one value was published in the traversal that
    /// just ran (or is running).
    pub fn has_new_value(&self) -> bool {
        !self.core.borrow().new_values.is_empty()
    }

    /// The most recently published value of the current traversal, if any.
    pub fn new_value(&self) -> Option<T> {
        self.core.borrow().new_values.last().cloned()
    }

    /// The last consolidated value. Before any publication this is the
    /// default state of `T`.
    pub fn current(&self) -> T {
        self.core.borrow().current.clone()
    }

    /// Every value published this traversal, in publish order; if none,
    /// the single consolidated value.
    pub fn current_values(&self) -> Vec<T> {
        let core = self.core.borrow();
        if core.new_values.is_empty() {
            vec![core.current.clone()]
        } else {
            core.new_values.iter().cloned().collect()
        }
    }

    /// Snapshot of the unconsolidated values, in publish order.
    pub(crate) fn new_values(&self) -> Vec<T> {
        self.core.borrow().new_values.iter().cloned().collect()
    }

    pub(crate) fn publish(&self, value: T) {
        self.core.borrow_mut().new_values.push(value);
    }

    /// Promotes the last published value to `current` and clears the
    /// sequence.
    pub(crate) fn consolidate(&self) {
        let mut core = self.core.borrow_mut();
        if let Some(last) = core.new_values.pop() {
            core.current = last;
        }
        core.new_values.clear();
    }

    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Reading(i32);
    impl TopicState for Reading {}

    #[test]
    fn test_new_topic_is_clean() {
        let topic = Topic::<Reading>::new(NodeIndex::new(0));
        assert!(!topic.has_new_value());
        assert_eq!(topic.new_value(), None);
        assert_eq!(topic.current(), Reading(0));
    }

    #[test]
    fn test_publish_preserves_order_and_duplicates() {
        let topic = Topic::<Reading>::new(NodeIndex::new(0));
        topic.publish(Reading(1));
        topic.publish(Reading(2));
        topic.publish(Reading(2));

        assert!(topic.has_new_value());
        assert_eq!(topic.new_value(), Some(Reading(2)));
        assert_eq!(
            topic.new_values(),
            vec![Reading(1), Reading(2), Reading(2)]
        );
    }

    #[test]
    fn test_current_values_falls_back_to_current() {
        let topic = Topic::<Reading>::new(NodeIndex::new(0));
        assert_eq!(topic.current_values(), vec![Reading(0)]);

        topic.publish(Reading(7));
        topic.publish(Reading(8));
        assert_eq!(topic.current_values(), vec![Reading(7), Reading(8)]);

        topic.consolidate();
        assert_eq!(topic.current_values(), vec![Reading(8)]);
    }

    #[test]
    fn test_consolidate_promotes_last_value() {
        let topic = Topic::<Reading>::new(NodeIndex::new(0));
        topic.publish(Reading(10));
        topic.publish(Reading(20));
        topic.consolidate();

        assert!(!topic.has_new_value());
        assert_eq!(topic.current(), Reading(20));

        // Consolidating a clean topic keeps the current value.
        topic.consolidate();
        assert_eq!(topic.current(), Reading(20));
    }

    #[test]
    fn test_clones_share_storage() {
        let topic = Topic::<Reading>::new(NodeIndex::new(3));
        let other = topic.clone();
        topic.publish(Reading(5));

        assert!(other.has_new_value());
        assert!(topic.ptr_eq(&other));
        assert_eq!(other.node(), NodeIndex::new(3));
    }

    #[test]
    fn test_shared_payload_is_not_deep_copied() {
        #[derive(Clone, Default)]
        struct Table {
            lut: Rc<Vec<u32>>,
        }
        impl TopicState for Table {}

        let topic = Topic::<Table>::new(NodeIndex::new(0));
        let lut = Rc::new(vec![5, 10, 25]);
        topic.publish(Table {
            lut: Rc::clone(&lut),
        });

        let observed = topic.new_value().unwrap();
        assert!(Rc::ptr_eq(&observed.lut, &lut));
    }

    #[test]
    fn test_short_type_name_strips_paths() {
        assert_eq!(short_type_name("alloc::vec::Vec<u8>"), "Vec<u8>");
        assert_eq!(
            short_type_name("ripple::lag::Lagged<app::state::Sale>"),
            "Lagged<Sale>"
        );
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
