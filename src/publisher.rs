use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use crate::topic::{Topic, TopicState};

/// A deferred publication: applied when the next traversal drains its
/// seeds.
pub(crate) type Seed = Box<dyn FnOnce()>;

/// The graph input queue, shared between the graph and every deferred
/// publishing handle it hands out.
pub(crate) type SharedSeedQueue = Rc<RefCell<VecDeque<Seed>>>;

/// Same-traversal write access to one topic.
///
/// Values land in the topic immediately and are visible to every detector
/// strictly downstream of the publisher within the same traversal.
pub struct Publisher<T: TopicState> {
    topic: Topic<T>,
}

impl<T: TopicState> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
        }
    }
}

impl<T: TopicState> Publisher<T> {
    pub(crate) fn new(topic: Topic<T>) -> Self {
        Self { topic }
    }

    /// Appends `value` to the topic's publications for this traversal.
    /// Multiple publishes are preserved in order; nothing is deduplicated.
    pub fn publish(&self, value: T) {
        self.topic.publish(value);
    }
}

/// Next-traversal write access to one topic.
///
/// `publish` enqueues the value on the graph input queue; it becomes
/// visible when the next traversal starts, alongside that traversal's
/// external input. This keeps the single-pass topological invariant while
/// letting a detector feed topics that are not downstream of it.
pub struct FuturePublisher<T: TopicState> {
    topic: Topic<T>,
    queue: SharedSeedQueue,
}

impl<T: TopicState> Clone for FuturePublisher<T> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            queue: Rc::clone(&self.queue),
        }
    }
}

impl<T: TopicState> FuturePublisher<T> {
    pub(crate) fn new(topic: Topic<T>, queue: SharedSeedQueue) -> Self {
        Self { topic, queue }
    }

    /// Schedules `value` for the start of the next traversal.
    pub fn publish(&self, value: T) {
        let topic = self.topic.clone();
        self.queue
            .borrow_mut()
            .push_back(Box::new(move || topic.publish(value)));
    }
}

/// Cancellation token for one scheduled timeout publication.
///
/// Tokens order by deadline first, then by scheduling sequence, so
/// entries scheduled for the same instant fire in scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeoutToken {
    when: Instant,
    id: u64,
}

impl TimeoutToken {
    /// The deadline this token was scheduled for.
    pub fn deadline(&self) -> Instant {
        self.when
    }
}

/// Deadline-ordered queue of pending timeout publications, owned by the
/// graph and shared with every [`TimeoutPublisher`] handle.
pub(crate) struct TimeoutState {
    pending: BTreeMap<TimeoutToken, Seed>,
    sequence: u64,
    queue: SharedSeedQueue,
}

impl TimeoutState {
    pub(crate) fn new(queue: SharedSeedQueue) -> Self {
        Self {
            pending: BTreeMap::new(),
            sequence: 0,
            queue,
        }
    }

    fn schedule(&mut self, when: Instant, seed: Seed) -> TimeoutToken {
        let token = TimeoutToken {
            when,
            id: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);
        self.pending.insert(token, seed);
        token
    }

    fn cancel(&mut self, token: TimeoutToken) {
        self.pending.remove(&token);
    }

    /// Moves every entry with `when <= now` onto the graph input queue,
    /// earliest deadline first. Returns the number of entries fired.
    pub(crate) fn fire_overdue(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(entry) = self.pending.first_entry() {
            if entry.key().when > now {
                break;
            }
            let (_, seed) = entry.remove_entry();
            self.queue.borrow_mut().push_back(seed);
            fired += 1;
        }
        fired
    }

    /// Deadline of the earliest pending entry, if any. Hosts use this to
    /// size their sleep between traversals.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.first_key_value().map(|(token, _)| token.when)
    }
}

/// Deadline-scheduled write access to one topic.
///
/// Scheduled values sit in the graph's timeout queue until the host calls
/// [`Graph::fire_overdue`]; fired values become seeds of the next
/// traversal and can no longer be withdrawn. Cancellation by token is
/// effective only before firing.
///
/// [`Graph::fire_overdue`]: crate::graph::Graph::fire_overdue
pub struct TimeoutPublisher<T: TopicState> {
    topic: Topic<T>,
    state: Rc<RefCell<TimeoutState>>,
}

impl<T: TopicState> Clone for TimeoutPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: TopicState> TimeoutPublisher<T> {
    pub(crate) fn new(topic: Topic<T>, state: Rc<RefCell<TimeoutState>>) -> Self {
        Self { topic, state }
    }

    /// Schedules `value` for publication once `when` has passed.
    pub fn publish_at(&self, value: T, when: Instant) -> TimeoutToken {
        let topic = self.topic.clone();
        self.state
            .borrow_mut()
            .schedule(when, Box::new(move || topic.publish(value)))
    }

    /// Drops a scheduled publication. A no-op if the entry already fired.
    pub fn cancel(&self, token: TimeoutToken) {
        self.state.borrow_mut().cancel(token);
    }
}
