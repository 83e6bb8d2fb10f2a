// SPDX-License-Identifier: Apache-2.0

//! Coalescing of change notifications into processing passes.
//!
//! Paths accumulate in a pending set. The first enqueue after an idle period
//! arms a deadline; when it passes, the whole set is handed out as one pass.
//! While a pass is in flight, new paths are buffered and the next deadline
//! is only armed once the pass finishes, so passes never overlap.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct DebounceState {
    window: Duration,
    pending: BTreeSet<PathBuf>,
    deadline: Option<Instant>,
    in_flight: bool,
}

impl DebounceState {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeSet::new(),
            deadline: None,
            in_flight: false,
        }
    }

    /// Add a path to the pending set, arming the timer if it is idle.
    pub fn enqueue(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path);
        if self.deadline.is_none() && !self.in_flight {
            self.deadline = Some(now + self.window);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// If the deadline has passed, drain the pending set and mark a pass as
    /// in flight. The caller must call [`finish_pass`] afterwards.
    ///
    /// [`finish_pass`]: DebounceState::finish_pass
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        match self.deadline {
            Some(deadline) if deadline <= now && !self.in_flight => {
                self.deadline = None;
                self.in_flight = true;
                Some(std::mem::take(&mut self.pending).into_iter().collect())
            }
            _ => None,
        }
    }

    /// End the in-flight pass; anything buffered during it starts a new cycle.
    pub fn finish_pass(&mut self, now: Instant) {
        self.in_flight = false;
        if !self.pending.is_empty() && self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
    }

    /// Drop the timer and everything pending
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.deadline = None;
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    fn path(name: &str) -> PathBuf {
        PathBuf::from(format!("/s/logs/{}", name))
    }

    #[test]
    fn test_first_enqueue_arms_deadline() {
        let mut state = DebounceState::new(WINDOW);
        let t0 = Instant::now();
        assert_eq!(state.deadline(), None);

        state.enqueue(path("a.log"), t0);
        assert_eq!(state.deadline(), Some(t0 + WINDOW));

        // Later enqueues do not push the deadline out
        state.enqueue(path("b.log"), t0 + Duration::from_millis(300));
        assert_eq!(state.deadline(), Some(t0 + WINDOW));
    }

    #[test]
    fn test_coalesces_duplicates() {
        let mut state = DebounceState::new(WINDOW);
        let t0 = Instant::now();
        for _ in 0..10 {
            state.enqueue(path("a.log"), t0);
        }
        state.enqueue(path("b.log"), t0);

        assert!(state.take_due(t0 + Duration::from_millis(499)).is_none());
        let batch = state.take_due(t0 + WINDOW).unwrap();
        assert_eq!(batch, vec![path("a.log"), path("b.log")]);
        assert!(state.is_in_flight());
        assert_eq!(state.pending_len(), 0);
    }

    #[test]
    fn test_arrivals_during_pass_are_buffered() {
        let mut state = DebounceState::new(WINDOW);
        let t0 = Instant::now();
        state.enqueue(path("a.log"), t0);
        let _ = state.take_due(t0 + WINDOW).unwrap();

        // Arrives mid-pass: buffered without arming a timer
        state.enqueue(path("c.log"), t0 + Duration::from_millis(600));
        assert_eq!(state.deadline(), None);
        assert!(state.take_due(t0 + Duration::from_secs(5)).is_none());

        let done = t0 + Duration::from_millis(700);
        state.finish_pass(done);
        assert_eq!(state.deadline(), Some(done + WINDOW));

        let batch = state.take_due(done + WINDOW).unwrap();
        assert_eq!(batch, vec![path("c.log")]);
    }

    #[test]
    fn test_finish_with_nothing_pending_stays_idle() {
        let mut state = DebounceState::new(WINDOW);
        let t0 = Instant::now();
        state.enqueue(path("a.log"), t0);
        let _ = state.take_due(t0 + WINDOW);

        state.finish_pass(t0 + WINDOW);
        assert_eq!(state.deadline(), None);
        assert!(!state.is_in_flight());
    }

    #[test]
    fn test_cancel_clears_everything() {
        let mut state = DebounceState::new(WINDOW);
        let t0 = Instant::now();
        state.enqueue(path("a.log"), t0);

        state.cancel();
        assert_eq!(state.deadline(), None);
        assert_eq!(state.pending_len(), 0);
        assert!(state.take_due(t0 + WINDOW).is_none());
    }
}
