//! Deadline scheduler with cancellable tokens and owner tags.
//!
//! Time only moves when [`Scheduler::advance`] is called, so the scheduler
//! runs inside the map tick and needs no clock of its own. Every timer is
//! tagged with an owner so all timers belonging to a session or a unit can
//! be cancelled at once when that owner goes away.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::types::{ObjectGuid, SessionId};

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

/// Who a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerOwner {
    /// Survives every session and unit, e.g. boss respawns.
    World,
    /// Cancelled when the session disconnects.
    Session(SessionId),
    /// Cancelled when the unit dies, despawns or its encounter ends.
    Unit(ObjectGuid),
}

#[derive(Debug)]
struct Timer<A> {
    owner: TimerOwner,
    action: A,
}

#[derive(Debug)]
pub struct Scheduler<A> {
    now: Duration,
    next_id: u64,
    /// Keyed by deadline then token, giving deadline order with scheduling
    /// order as the tie-break.
    timers: BTreeMap<(Duration, TimerToken), Timer<A>>,
    deadlines: HashMap<TimerToken, Duration>,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 1,
            timers: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule(&mut self, delay: Duration, owner: TimerOwner, action: A) -> TimerToken {
        let token = TimerToken(self.next_id);
        self.next_id += 1;
        let deadline = self.now + delay;
        self.timers.insert((deadline, token), Timer { owner, action });
        self.deadlines.insert(token, deadline);
        token
    }

    /// Cancels `token`. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        match self.deadlines.remove(&token) {
            Some(deadline) => self.timers.remove(&(deadline, token)).is_some(),
            None => false,
        }
    }

    /// Cancels every timer tagged with `owner` and returns how many there were.
    pub fn cancel_owned_by(&mut self, owner: TimerOwner) -> usize {
        let doomed: Vec<(Duration, TimerToken)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.owner == owner)
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            self.timers.remove(key);
            self.deadlines.remove(&key.1);
        }
        doomed.len()
    }

    pub fn remaining(&self, token: TimerToken) -> Option<Duration> {
        self.deadlines
            .get(&token)
            .map(|deadline| deadline.saturating_sub(self.now))
    }

    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.deadlines.contains_key(&token)
    }

    /// Advances time by `diff` and returns the actions that came due, in
    /// deadline order.
    pub fn advance(&mut self, diff: Duration) -> Vec<A> {
        self.now += diff;
        let mut due = Vec::new();
        while let Some(entry) = self.timers.first_entry() {
            if entry.key().0 > self.now {
                break;
            }
            let ((_, token), timer) = entry.remove_entry();
            self.deadlines.remove(&token);
            due.push(timer.action);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_then_schedule_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_millis(300), TimerOwner::World, "late");
        scheduler.schedule(Duration::from_millis(100), TimerOwner::World, "a");
        scheduler.schedule(Duration::from_millis(100), TimerOwner::World, "b");

        assert!(scheduler.advance(Duration::from_millis(99)).is_empty());
        assert_eq!(scheduler.advance(Duration::from_millis(1)), vec!["a", "b"]);
        assert_eq!(scheduler.advance(Duration::from_secs(1)), vec!["late"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn cancel_is_noop_after_fire() {
        let mut scheduler = Scheduler::new();
        let token = scheduler.schedule(Duration::from_millis(10), TimerOwner::World, 1);
        assert_eq!(scheduler.remaining(token), Some(Duration::from_millis(10)));
        scheduler.advance(Duration::from_millis(4));
        assert_eq!(scheduler.remaining(token), Some(Duration::from_millis(6)));

        assert_eq!(scheduler.advance(Duration::from_millis(6)), vec![1]);
        assert!(!scheduler.cancel(token));
        assert_eq!(scheduler.remaining(token), None);
    }

    #[test]
    fn session_timers_cancel_without_touching_world_timers() {
        let mut scheduler = Scheduler::new();
        let session = TimerOwner::Session(SessionId(4));
        scheduler.schedule(Duration::from_secs(60), session, "duel expiry");
        let respawn = scheduler.schedule(Duration::from_secs(30), TimerOwner::World, "respawn");
        scheduler.schedule(Duration::from_secs(5), TimerOwner::Session(SessionId(5)), "other");

        assert_eq!(scheduler.cancel_owned_by(session), 1);
        assert!(scheduler.is_pending(respawn));
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.advance(Duration::from_secs(120)), vec!["other", "respawn"]);
    }
}
