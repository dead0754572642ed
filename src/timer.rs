use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, to_delta};

/// A one-shot, cancelable timer over an injected clock.
///
/// Nothing fires on its own: the owner polls [`Timer::take_due`] from its event
/// loop. Scheduling while armed replaces the pending deadline and task.
pub struct Timer<T> {
    clock: Arc<dyn Clock>,
    pending: Option<(DateTime<Utc>, T)>,
}

impl<T> Timer<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Timer {
            clock,
            pending: None,
        }
    }

    pub fn schedule(&mut self, delay: Duration, task: T) {
        let deadline = self.clock.now() + to_delta(delay);
        self.pending = Some((deadline, task));
    }

    /// Disarm; returns the task that will now never run.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, task)| task)
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    /// Hand out the task if its deadline has passed, disarming the timer.
    pub fn take_due(&mut self) -> Option<T> {
        let now = self.clock.now();
        match &self.pending {
            Some((deadline, _)) if *deadline <= now => self.cancel(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn fires_once_after_deadline() {
        let clock = ManualClock::default();
        let mut timer = Timer::new(Arc::new(clock.clone()));
        timer.schedule(Duration::from_millis(500), "push");

        clock.advance(Duration::from_millis(499));
        assert_eq!(timer.take_due(), None);

        clock.advance(Duration::from_millis(1));
        assert_eq!(timer.take_due(), Some("push"));
        assert_eq!(timer.take_due(), None);
        assert!(!timer.is_armed());
    }

    #[test]
    fn rescheduling_pushes_the_deadline_out() {
        let clock = ManualClock::default();
        let mut timer = Timer::new(Arc::new(clock.clone()));
        timer.schedule(Duration::from_millis(500), 1);
        clock.advance(Duration::from_millis(400));
        timer.schedule(Duration::from_millis(500), 2);
        clock.advance(Duration::from_millis(400));
        assert_eq!(timer.take_due(), None);
        clock.advance(Duration::from_millis(100));
        assert_eq!(timer.take_due(), Some(2));
    }

    #[test]
    fn cancel_disarms() {
        let clock = ManualClock::default();
        let mut timer = Timer::new(Arc::new(clock.clone()));
        timer.schedule(Duration::from_secs(1), ());
        assert_eq!(timer.cancel(), Some(()));
        clock.advance(Duration::from_secs(2));
        assert_eq!(timer.take_due(), None);
    }
}
