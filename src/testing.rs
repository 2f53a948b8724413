//! Test-support taps for observing topic traffic.
//!
//! A tap is a prefab detector that records every value published to one
//! topic, plus the number of traversals in which it was visited, saving
//! tests a hand-rolled collector detector. Downstream crates get it
//! behind the `testing` feature.

use std::cell::RefCell;
use std::rc::Rc;

use crate::detector::{Detector, DetectorBuilder, Subscriber};
use crate::graph::Graph;
use crate::topic::TopicState;

struct TapState<T: TopicState> {
    values: Vec<T>,
    completions: u64,
}

/// Observer handle returned by [`tap_topic`]; read it between traversals.
pub struct TopicTap<T: TopicState> {
    state: Rc<RefCell<TapState<T>>>,
}

impl<T: TopicState> Clone for TopicTap<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: TopicState> TopicTap<T> {
    /// Every value observed so far, in delivery order.
    pub fn values(&self) -> Vec<T> {
        self.state.borrow().values.clone()
    }

    /// The most recent observed value.
    pub fn last(&self) -> Option<T> {
        self.state.borrow().values.last().cloned()
    }

    /// Number of traversals in which the tap was visited.
    pub fn completions(&self) -> u64 {
        self.state.borrow().completions
    }

    /// Drains and returns the recorded values.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut self.state.borrow_mut().values)
    }
}

/// The detector behind a [`TopicTap`].
pub struct TapDetector<T: TopicState> {
    state: Rc<RefCell<TapState<T>>>,
}

impl<T: TopicState> Detector for TapDetector<T> {
    fn complete_evaluation(&mut self) {
        self.state.borrow_mut().completions += 1;
    }
}

impl<T: TopicState> Subscriber<T> for TapDetector<T> {
    fn evaluate(&mut self, value: &T) {
        self.state.borrow_mut().values.push(value.clone());
    }
}

/// Attaches a recording tap to `T`'s topic.
pub fn tap_topic<T: TopicState>(graph: &mut Graph) -> TopicTap<T> {
    let state = Rc::new(RefCell::new(TapState {
        values: Vec::new(),
        completions: 0,
    }));
    let detector_state = Rc::clone(&state);
    DetectorBuilder::<TapDetector<T>>::new()
        .subscribe::<T>()
        .build(graph, move |_| TapDetector {
            state: detector_state,
        });
    TopicTap { state }
}
