//! Virtual Clock and Timer Queue
//!
//! Delays in the game (pair reveal, level advance, countdown ticks) are plain
//! data in a [`Scheduler`]. Nothing fires on its own: the owner advances the
//! clock and pops whatever has come due, which keeps every timeline testable
//! without a runtime.

use std::collections::BTreeSet;

/// Milliseconds on the virtual clock.
pub type Millis = u64;

/// Handle returned by [`Scheduler::schedule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

/// A timer that has come due.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DueTimer<K> {
    /// Virtual time the timer was due at.
    pub at: Millis,
    /// What the timer was scheduled for.
    pub kind: K,
}

/// Ordered timer queue over a virtual clock.
///
/// Timers are ordered by due time, then by `K`'s ordering, then by the order
/// they were scheduled in. The `K` ordering is therefore the priority used to
/// break ties between timers due at the same instant.
#[derive(Clone, Debug)]
pub struct Scheduler<K: Ord + Copy> {
    now: Millis,
    queue: BTreeSet<(Millis, K, u64)>,
    next_seq: u64,
}

impl<K: Ord + Copy> Default for Scheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Copy> Scheduler<K> {
    /// Create an empty scheduler at time zero.
    pub fn new() -> Self {
        Self {
            now: 0,
            queue: BTreeSet::new(),
            next_seq: 0,
        }
    }

    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> Millis {
        self.now
    }

    /// Schedule `kind` to fire `delay` milliseconds from now.
    pub fn schedule(&mut self, kind: K, delay: Millis) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((self.now.saturating_add(delay), kind, seq));
        TimerHandle(seq)
    }

    /// Cancel a single timer. Returns false if it already fired.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let found = self.queue.iter().find(|(_, _, seq)| *seq == handle.0).copied();
        match found {
            Some(entry) => self.queue.remove(&entry),
            None => false,
        }
    }

    /// Cancel every pending timer of the given kind.
    pub fn cancel_kind(&mut self, kind: K) -> usize {
        let before = self.queue.len();
        self.queue.retain(|(_, k, _)| *k != kind);
        before - self.queue.len()
    }

    /// Whether a timer of the given kind is pending.
    pub fn is_scheduled(&self, kind: K) -> bool {
        self.queue.iter().any(|(_, k, _)| *k == kind)
    }

    /// Due time of the earliest pending timer.
    pub fn next_due(&self) -> Option<Millis> {
        self.queue.first().map(|(at, _, _)| *at)
    }

    /// Pop the earliest timer due at or before `until`.
    ///
    /// The clock moves to the popped timer's due time, so anything it
    /// schedules is relative to when it fired, not to `until`.
    pub fn pop_due(&mut self, until: Millis) -> Option<DueTimer<K>> {
        let (at, kind, seq) = *self.queue.first()?;
        if at > until {
            return None;
        }
        self.queue.remove(&(at, kind, seq));
        self.now = self.now.max(at);
        Some(DueTimer { at, kind })
    }

    /// Move the clock forward. The clock never runs backwards.
    pub fn advance_clock(&mut self, to: Millis) {
        self.now = self.now.max(to);
    }

    /// Drop every pending timer.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Number of pending timers.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
