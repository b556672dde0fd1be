//! Timer table.
//!
//! Active timers live in an unordered map keyed by their loop-assigned id.
//! Ids come from a plain counter and are never reused, so a stale id held
//! by a callback can at worst miss (a no-op), never hit a different timer.
//! Both the nearest-deadline query and the due scan are linear; the active
//! set is expected to stay small in a reactor.

use crate::reactor::EventLoop;
use std::collections::HashMap;

/// Loop-assigned timer identifier, strictly increasing, never reused.
pub type TimerId = u64;

/// Whether a timer re-arms itself after firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Reschedules after each fire: `when = fire_time + interval`.
    Recurring,
    /// Removed by the loop immediately after its callback returns.
    OneShot,
}

/// Callback invoked when a timer comes due.
pub type TimeProc = Box<dyn FnMut(&mut EventLoop, TimerId)>;

pub(crate) struct TimeEvent {
    kind: TimerKind,
    interval_ms: i64,
    /// Absolute deadline in wall-clock milliseconds.
    when: i64,
    /// Taken out for the duration of the callback so the loop can be
    /// borrowed mutably while it runs.
    callback: Option<TimeProc>,
}

pub(crate) struct TimerTable {
    active: HashMap<TimerId, TimeEvent>,
    next_id: TimerId,
}

impl TimerTable {
    pub(crate) fn new() -> Self {
        Self {
            active: HashMap::new(),
            next_id: 1,
        }
    }

    /// Insert a new timer due at `now + interval_ms` and return its id.
    pub(crate) fn insert(
        &mut self,
        kind: TimerKind,
        interval_ms: i64,
        callback: TimeProc,
        now: i64,
    ) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(
            id,
            TimeEvent {
                kind,
                interval_ms,
                when: now + interval_ms,
                callback: Some(callback),
            },
        );
        id
    }

    /// Remove a timer. Unknown ids are a no-op.
    pub(crate) fn remove(&mut self, id: TimerId) -> bool {
        self.active.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }

    /// Nearest absolute deadline, capped at `now + ceiling_ms` so the loop
    /// wakes at least that often even with no timers registered.
    pub(crate) fn nearest_deadline(&self, now: i64, ceiling_ms: i64) -> i64 {
        let mut nearest = now + ceiling_ms;
        for te in self.active.values() {
            if te.when < nearest {
                nearest = te.when;
            }
        }
        nearest
    }

    /// Ids of all timers strictly past their deadline. Map order, not
    /// deadline order.
    pub(crate) fn due(&self, now: i64) -> Vec<TimerId> {
        self.active
            .iter()
            .filter(|(_, te)| te.when < now)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Take the callback out of a timer about to fire. Returns `None` when
    /// the timer was unregistered since the due scan.
    pub(crate) fn begin_fire(&mut self, id: TimerId) -> Option<TimeProc> {
        self.active.get_mut(&id).and_then(|te| te.callback.take())
    }

    /// Settle a timer after its callback returned: a recurring timer gets
    /// its callback back and a fresh deadline relative to `now`; a one-shot
    /// is dropped. If the callback unregistered its own timer, there is
    /// nothing left to settle.
    pub(crate) fn finish_fire(&mut self, id: TimerId, callback: TimeProc, now: i64) {
        let recurring = match self.active.get_mut(&id) {
            Some(te) if te.kind == TimerKind::Recurring => {
                te.when = now + te.interval_ms;
                te.callback = Some(callback);
                true
            }
            Some(_) => false,
            None => return,
        };
        if !recurring {
            self.active.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TimeProc {
        Box::new(|_loop, _id| {})
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut table = TimerTable::new();
        let a = table.insert(TimerKind::OneShot, 10, noop(), 0);
        let b = table.insert(TimerKind::Recurring, 10, noop(), 0);
        table.remove(a);
        let c = table.insert(TimerKind::OneShot, 10, noop(), 0);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut table = TimerTable::new();
        table.insert(TimerKind::OneShot, 10, noop(), 0);
        assert!(!table.remove(999));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_nearest_deadline_ceiling() {
        let table = TimerTable::new();
        // No timers: the ceiling is the deadline.
        assert_eq!(table.nearest_deadline(5000, 1000), 6000);
    }

    #[test]
    fn test_nearest_deadline_picks_minimum() {
        let mut table = TimerTable::new();
        table.insert(TimerKind::OneShot, 700, noop(), 5000);
        table.insert(TimerKind::OneShot, 300, noop(), 5000);
        assert_eq!(table.nearest_deadline(5000, 1000), 5300);
    }

    #[test]
    fn test_due_is_strictly_past_deadline() {
        let mut table = TimerTable::new();
        let id = table.insert(TimerKind::OneShot, 100, noop(), 0);
        assert!(table.due(100).is_empty()); // when == now: not yet due
        assert_eq!(table.due(101), vec![id]);
    }

    #[test]
    fn test_finish_fire_reschedules_from_fire_time() {
        let mut table = TimerTable::new();
        let id = table.insert(TimerKind::Recurring, 50, noop(), 0);

        let callback = table.begin_fire(id).unwrap();
        table.finish_fire(id, callback, 80); // fired late, at t=80
        assert_eq!(table.len(), 1);
        // Next deadline is relative to the fire time, not registration time.
        assert_eq!(table.due(131), vec![id]);
        assert!(table.due(130).is_empty());
    }

    #[test]
    fn test_finish_fire_drops_oneshot() {
        let mut table = TimerTable::new();
        let id = table.insert(TimerKind::OneShot, 10, noop(), 0);

        let callback = table.begin_fire(id).unwrap();
        table.finish_fire(id, callback, 20);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_self_unregister_during_fire_sticks() {
        let mut table = TimerTable::new();
        let id = table.insert(TimerKind::Recurring, 10, noop(), 0);

        let callback = table.begin_fire(id).unwrap();
        table.remove(id); // what a callback deleting itself does
        table.finish_fire(id, callback, 20);
        assert_eq!(table.len(), 0);
    }
}
