//! Client-side sync timing: the debounced push and the validation poll.
//!
//! The scheduler never talks to the network itself. It hands out tickets when
//! a timer is due and is told how each ticket ended. Every ticket carries the
//! session id it was issued for, so completions that arrive after the session
//! has moved on (reset, re-bootstrap) are recognised and dropped.

use log::{debug, warn};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::SessionError;
use crate::timer::Timer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushTicket {
    pub session_id: String,
    /// Local write generation the pushed snapshot reflects.
    pub generation: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidateTicket {
    pub session_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncAction {
    Push(PushTicket),
    Validate(ValidateTicket),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Applied,
    /// Newer local writes exist; the next debounced push will carry them.
    Superseded,
    /// Issued for a session that is no longer active.
    Stale,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Stale,
    /// The session is gone. Polling has stopped and the id was dropped; the
    /// caller must bootstrap a replacement.
    Invalidated { session_id: String },
}

pub struct SyncScheduler {
    config: SyncConfig,
    debounce: Timer<()>,
    poll: Timer<()>,
    active: Option<String>,
    generation: u64,
    acked_generation: u64,
}

impl SyncScheduler {
    pub fn new(clock: Arc<dyn Clock>, config: SyncConfig) -> Self {
        SyncScheduler {
            config,
            debounce: Timer::new(clock.clone()),
            poll: Timer::new(clock),
            active: None,
            generation: 0,
            acked_generation: 0,
        }
    }

    /// Start tracking `session_id` and arm the validation poll.
    pub fn activate(&mut self, session_id: String) {
        debug!("Sync active for session {}", session_id);
        self.active = Some(session_id);
        self.poll.schedule(self.config.poll_interval, ());
    }

    /// Stop both timers and forget the session.
    pub fn deactivate(&mut self) {
        self.active = None;
        self.debounce.cancel();
        self.poll.cancel();
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Record a local write and restart the quiet period.
    pub fn note_local_write(&mut self) {
        self.generation += 1;
        self.debounce.schedule(self.config.push_delay, ());
    }

    /// Drop a pending push without sending it.
    pub fn cancel_push(&mut self) {
        self.debounce.cancel();
    }

    pub fn has_pending_push(&self) -> bool {
        self.debounce.is_armed()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Local writes not yet acknowledged by the server.
    pub fn is_dirty(&self) -> bool {
        self.generation > self.acked_generation
    }

    /// Bypass the quiet period (e.g. before the page unloads).
    pub fn push_now(&mut self) -> Option<PushTicket> {
        self.debounce.cancel();
        self.push_ticket()
    }

    fn push_ticket(&self) -> Option<PushTicket> {
        self.active.as_ref().map(|session_id| PushTicket {
            session_id: session_id.clone(),
            generation: self.generation,
        })
    }

    /// Collect the work whose timers have expired.
    pub fn due(&mut self) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        if self.debounce.take_due().is_some() {
            match self.push_ticket() {
                Some(ticket) => actions.push(SyncAction::Push(ticket)),
                None => debug!("Debounced push fired with no active session; dropped"),
            }
        }
        if self.poll.take_due().is_some() {
            if let Some(session_id) = &self.active {
                actions.push(SyncAction::Validate(ValidateTicket {
                    session_id: session_id.clone(),
                }));
            }
        }
        actions
    }

    /// The earliest instant at which [`SyncScheduler::due`] has something.
    pub fn next_deadline(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match (self.debounce.deadline(), self.poll.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn complete_push(
        &mut self,
        ticket: &PushTicket,
        result: Result<(), SessionError>,
    ) -> PushOutcome {
        if self.active.as_deref() != Some(ticket.session_id.as_str()) {
            debug!(
                "Ignoring push completion for inactive session {}",
                ticket.session_id
            );
            return PushOutcome::Stale;
        }
        match result {
            Ok(()) => {
                self.acked_generation = self.acked_generation.max(ticket.generation);
                if ticket.generation < self.generation {
                    PushOutcome::Superseded
                } else {
                    PushOutcome::Applied
                }
            }
            Err(e) => {
                warn!("Push for session {} failed: {}", ticket.session_id, e);
                PushOutcome::Failed
            }
        }
    }

    /// Handle the result of a validation fetch.
    ///
    /// Only the first failure for the active session invalidates it; anything
    /// that arrives for a session no longer active is stale.
    pub fn complete_validation(
        &mut self,
        ticket: &ValidateTicket,
        result: Result<(), SessionError>,
    ) -> ValidationOutcome {
        if self.active.as_deref() != Some(ticket.session_id.as_str()) {
            return ValidationOutcome::Stale;
        }
        match result {
            Ok(()) => {
                self.poll.schedule(self.config.poll_interval, ());
                ValidationOutcome::Valid
            }
            Err(e) => {
                warn!("Session {} failed validation: {}", ticket.session_id, e);
                self.deactivate();
                ValidationOutcome::Invalidated {
                    session_id: ticket.session_id.clone(),
                }
            }
        }
    }
}
