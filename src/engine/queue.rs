//! FIFO with a single in-flight marker, for operations that must not overlap.

use std::collections::VecDeque;

/// Admission state for serialized operations.
///
/// `admit` and `complete` are the only mutators; the engine calls them under
/// its own mutex, so "is anything running?" and "who runs next?" are always
/// decided together.
#[derive(Debug)]
pub(crate) struct SerialQueue<T> {
    in_flight: bool,
    waiting: VecDeque<T>,
}

impl<T> SerialQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: false,
            waiting: VecDeque::new(),
        }
    }

    /// Returns the item back if it may run now (marking it in flight), or
    /// parks it at the tail and returns `None`.
    pub(crate) fn admit(&mut self, item: T) -> Option<T> {
        if self.in_flight {
            self.waiting.push_back(item);
            None
        } else {
            self.in_flight = true;
            Some(item)
        }
    }

    /// Called when the in-flight item finished. Hands over the head of the
    /// queue, which is then in flight, or clears the marker when empty.
    pub(crate) fn complete(&mut self) -> Option<T> {
        let next = self.waiting.pop_front();
        self.in_flight = next.is_some();
        next
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiting.len()
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Removes every parked item, leaving the in-flight marker untouched.
    pub(crate) fn drain_waiting(&mut self) -> Vec<T> {
        self.waiting.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_queue_admits_immediately() {
        let mut queue = SerialQueue::new();
        assert_eq!(queue.admit(1), Some(1));
        assert!(queue.is_in_flight());
        assert_eq!(queue.waiting(), 0);
    }

    #[test]
    fn busy_queue_parks_in_order() {
        let mut queue = SerialQueue::new();
        assert_eq!(queue.admit("a"), Some("a"));
        assert_eq!(queue.admit("b"), None);
        assert_eq!(queue.admit("c"), None);
        assert_eq!(queue.waiting(), 2);

        assert_eq!(queue.complete(), Some("b"));
        assert!(queue.is_in_flight());
        assert_eq!(queue.complete(), Some("c"));
        assert_eq!(queue.complete(), None);
        assert!(!queue.is_in_flight());
    }

    #[test]
    fn admit_after_drain_runs_immediately() {
        let mut queue = SerialQueue::new();
        queue.admit(1);
        queue.admit(2);
        assert_eq!(queue.complete(), Some(2));
        assert_eq!(queue.complete(), None);
        assert_eq!(queue.admit(3), Some(3));
    }

    #[test]
    fn parked_while_running_never_skips_ahead() {
        // Even when the running item is about to finish, a new arrival waits
        // behind the ones already parked.
        let mut queue = SerialQueue::new();
        queue.admit(1);
        queue.admit(2);
        queue.admit(3);
        assert_eq!(queue.complete(), Some(2));
        assert_eq!(queue.admit(4), None);
        assert_eq!(queue.complete(), Some(3));
        assert_eq!(queue.complete(), Some(4));
    }

    #[test]
    fn drain_waiting_keeps_marker() {
        let mut queue = SerialQueue::new();
        queue.admit(1);
        queue.admit(2);
        assert_eq!(queue.drain_waiting(), vec![2]);
        assert!(queue.is_in_flight());
        assert_eq!(queue.complete(), None);
    }
}
