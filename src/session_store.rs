//! The server-of-record: session operations over an injected repository, plus
//! the inactivity sweep.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock, to_delta};
use crate::config::MIN_SWEEP_INTERVAL;
use crate::error::SessionError;
use crate::ids::SessionId;
use crate::repository::{InMemorySessionRepository, SessionRepository};
use crate::state::{SessionRecord, StatePatch, UPLOADED_FILES, UploadInfo};

const CREATE_ATTEMPTS: usize = 3;

pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>, clock: Arc<dyn Clock>) -> Self {
        SessionStore { repo, clock }
    }

    /// An in-memory store on the wall clock.
    pub fn in_memory() -> Self {
        SessionStore::new(
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        SessionStore::new(Arc::new(InMemorySessionRepository::new()), clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Allocate a new session with default state.
    pub fn create(&self) -> Result<SessionRecord, SessionError> {
        for _ in 0..CREATE_ATTEMPTS {
            let record = SessionRecord::new(SessionId::generate(), self.clock.now());
            if self.repo.insert_new(record.clone()) {
                info!("Created session {}", record.session_id);
                return Ok(record);
            }
            debug!("Session id collision, regenerating");
        }
        Err(SessionError::Internal(
            "could not allocate a unique session id".to_string(),
        ))
    }

    pub fn get(&self, raw_id: &str) -> Result<SessionRecord, SessionError> {
        let id = SessionId::parse(raw_id)?;
        let now = self.clock.now();
        self.repo
            .update(&id, &mut |record: &mut SessionRecord| record.touch(now))
            .ok_or(SessionError::NotFound)
    }

    /// Apply an already validated patch.
    pub fn update_state(
        &self,
        raw_id: &str,
        patch: &StatePatch,
    ) -> Result<SessionRecord, SessionError> {
        let id = SessionId::parse(raw_id)?;
        patch.validate()?;
        let now = self.clock.now();
        self.repo
            .update(&id, &mut |record: &mut SessionRecord| record.apply(patch, now))
            .ok_or(SessionError::NotFound)
    }

    /// Validate a raw request body, then apply it. An invalid body never
    /// reaches the record.
    pub fn update_state_json(
        &self,
        raw_id: &str,
        body: &Value,
    ) -> Result<SessionRecord, SessionError> {
        SessionId::parse(raw_id)?;
        let patch = StatePatch::from_json(body)?;
        self.update_state(raw_id, &patch)
    }

    pub fn reset(&self, raw_id: &str) -> Result<SessionRecord, SessionError> {
        let id = SessionId::parse(raw_id)?;
        let now = self.clock.now();
        let record = self
            .repo
            .update(&id, &mut |record: &mut SessionRecord| record.reset(now))
            .ok_or(SessionError::NotFound)?;
        info!("Reset session {}", id);
        Ok(record)
    }

    /// Append upload metadata to the session's `uploadedFiles` sequence.
    pub fn record_upload(
        &self,
        raw_id: &str,
        upload: &UploadInfo,
    ) -> Result<SessionRecord, SessionError> {
        let id = SessionId::parse(raw_id)?;
        let entry = serde_json::to_value(upload).unwrap_or_else(|_| json!({}));
        let now = self.clock.now();
        self.repo
            .update(&id, &mut |record: &mut SessionRecord| {
                record.workspace_data.push(UPLOADED_FILES, entry.clone());
                record.touch(now);
            })
            .ok_or(SessionError::NotFound)
    }

    /// Remove every session idle for longer than `max_age` as of `now`.
    pub fn sweep_expired(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = to_delta(max_age);
        let removed = self.repo.retain(&|record: &SessionRecord| record.idle_for(now) <= max_age);
        if removed > 0 {
            info!(
                "Swept {} expired session(s), {} remain",
                removed,
                self.repo.len()
            );
        }
        removed
    }

    pub fn active_sessions(&self) -> usize {
        self.repo.len()
    }
}

/// Run [`SessionStore::sweep_expired`] every `every`, independent of traffic.
/// Periods shorter than [`MIN_SWEEP_INTERVAL`] are raised to it.
pub fn spawn_sweeper(store: Arc<SessionStore>, every: Duration, max_age: Duration) -> JoinHandle<()> {
    let every = if every < MIN_SWEEP_INTERVAL {
        warn!(
            "Sweep interval {:?} too short, using {:?}",
            every, MIN_SWEEP_INTERVAL
        );
        MIN_SWEEP_INTERVAL
    } else {
        every
    };
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let now = store.now();
            store.sweep_expired(now, max_age);
        }
    })
}
