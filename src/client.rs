//! The client-side sync engine.
//!
//! One logical thread: every method takes `&mut self` and the embedding event
//! loop calls [`SyncClient::tick`] whenever a timer may be due (see
//! [`SyncClient::next_wakeup`]). Edits land in the local store synchronously;
//! the network only ever sees them through the debounced push.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::api::{Offline, SessionApi};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{SessionError, SyncError};
use crate::lifecycle::{Bootstrap, LifecycleState, SessionLifecycle};
use crate::local_store::{LocalStateStore, StorageBackend};
use crate::prompt::{ConfirmPrompt, LogNotifier, NeverConfirm, NoticeLevel, Notifier};
use crate::scheduler::{PushOutcome, PushTicket, SyncAction, SyncScheduler, ValidationOutcome};
use crate::state::{LocalState, UI_STATE_FIELDS, check_ui_field};

/// What a call to [`SyncClient::tick`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub pushes: Vec<PushOutcome>,
    pub validations: usize,
    /// Set when an invalidated session was replaced; holds the new id.
    pub rebootstrapped: Option<String>,
}

pub struct SyncClient<A: SessionApi, B: StorageBackend> {
    api: A,
    local: LocalStateStore<B>,
    scheduler: SyncScheduler,
    lifecycle: SessionLifecycle,
    notifier: Box<dyn Notifier>,
    confirm: Box<dyn ConfirmPrompt>,
}

impl<A: SessionApi, B: StorageBackend> SyncClient<A, B> {
    pub fn new(api: A, backend: B, clock: Arc<dyn Clock>, config: SyncConfig) -> Self {
        SyncClient {
            api,
            local: LocalStateStore::open(backend),
            scheduler: SyncScheduler::new(clock, config),
            lifecycle: SessionLifecycle::new(),
            notifier: Box::new(LogNotifier),
            confirm: Box::new(NeverConfirm),
        }
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_confirm(mut self, confirm: impl ConfirmPrompt + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Bootstrap a session. Failure here is the one error the user must see.
    pub async fn start(&mut self) -> Result<String, SyncError> {
        let outcome = match self.lifecycle.bootstrap(&self.api, &mut self.local).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.notifier.notify(
                    NoticeLevel::Error,
                    &format!("Could not start a session: {}", e),
                );
                return Err(e.into());
            }
        };

        let session_id = outcome.session_id();
        match &outcome {
            Bootstrap::Resumed(_) => self
                .notifier
                .notify(NoticeLevel::Success, "Restored your previous session"),
            Bootstrap::Created(_) => self
                .notifier
                .notify(NoticeLevel::Info, "Started a new session"),
            Bootstrap::Local { .. } => {}
        }
        if !self.lifecycle.is_local_only() {
            self.scheduler.activate(session_id.clone());
        }
        Ok(session_id)
    }

    pub fn read(&self) -> &LocalState {
        self.local.read()
    }

    pub fn lifecycle_state(&self) -> &LifecycleState {
        self.lifecycle.state()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.lifecycle.session_id()
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    /// Apply a UI edit.
    ///
    /// The merged state is readable immediately. A `uiState` field whose value
    /// the server would refuse is dropped with an error notice, and the rest of
    /// the edit still applies. A storage failure is logged and never reaches
    /// the edit path; the push is scheduled either way.
    pub fn edit(&mut self, mut partial: Map<String, Value>) -> &LocalState {
        let invalid: Vec<(String, SessionError)> = partial
            .iter()
            .filter(|(key, _)| UI_STATE_FIELDS.contains(&key.as_str()))
            .filter_map(|(key, value)| check_ui_field(key, value).err().map(|e| (key.clone(), e)))
            .collect();
        for (key, e) in invalid {
            partial.remove(&key);
            warn!("Rejected local edit: {}", e);
            self.notifier
                .notify(NoticeLevel::Error, &format!("Ignored invalid value for {}", key));
        }
        if partial.is_empty() {
            return self.local.read();
        }

        if let Err(e) = self.local.write(&partial) {
            warn!("Local state not persisted: {}", e);
        }
        if !self.lifecycle.is_local_only() {
            self.scheduler.note_local_write();
        }
        self.local.read()
    }

    /// Single-field convenience over [`SyncClient::edit`].
    pub fn set(&mut self, key: &str, value: Value) -> &LocalState {
        let mut partial = Map::new();
        partial.insert(key.to_string(), value);
        self.edit(partial)
    }

    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_deadline()
    }

    /// Run whatever timers are due.
    ///
    /// Push and poll failures are absorbed here. The only error returned is a
    /// failed re-bootstrap after the session was found to be gone.
    pub async fn tick(&mut self) -> Result<TickReport, SyncError> {
        let mut report = TickReport::default();

        for action in self.scheduler.due() {
            match action {
                SyncAction::Push(ticket) => {
                    let outcome = self.run_push(&ticket).await;
                    report.pushes.push(outcome);
                }
                SyncAction::Validate(ticket) => {
                    report.validations += 1;
                    let result = self.api.get(&ticket.session_id).await.map(|_| ());
                    if let ValidationOutcome::Invalidated { session_id } =
                        self.scheduler.complete_validation(&ticket, result)
                    {
                        let replacement = self.rebootstrap(&session_id).await?;
                        report.rebootstrapped = Some(replacement);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Push immediately instead of waiting for the quiet period.
    pub async fn flush(&mut self) -> Option<PushOutcome> {
        let ticket = self.scheduler.push_now()?;
        Some(self.run_push(&ticket).await)
    }

    async fn run_push(&mut self, ticket: &PushTicket) -> PushOutcome {
        // Whatever is current now is what goes out, not the state at the time
        // the push was scheduled.
        let patch = self.local.read().to_patch();
        let result = self
            .api
            .update_state(&ticket.session_id, &patch)
            .await
            .map(|_| ());
        let outcome = self.scheduler.complete_push(ticket, result);
        debug!(
            "Push of generation {} for {}: {:?}",
            ticket.generation, ticket.session_id, outcome
        );
        outcome
    }

    async fn rebootstrap(&mut self, lost: &str) -> Result<String, SyncError> {
        self.notifier.notify(
            NoticeLevel::Warning,
            "Your session expired; starting a new one",
        );
        debug!("Replacing lost session {}", lost);
        self.lifecycle.invalidate(&mut self.local);
        self.start().await
    }

    /// Clear the workspace, after confirmation.
    ///
    /// A pending push is dropped first: it would carry the state being thrown
    /// away. If the server no longer knows the session, a fresh one is
    /// bootstrapped instead; it starts out in default state.
    pub async fn reset(&mut self) -> Result<&LocalState, SyncError> {
        let pending = self.scheduler.has_pending_push();
        self.scheduler.cancel_push();
        match self
            .lifecycle
            .reset(&self.api, &mut self.local, self.confirm.as_ref())
            .await
        {
            Ok(_) => {
                if let Some(session_id) = self.lifecycle.session_id().map(str::to_string) {
                    if !self.lifecycle.is_local_only() {
                        self.scheduler.activate(session_id);
                    }
                }
                self.notifier
                    .notify(NoticeLevel::Success, "Workspace reset");
                Ok(self.local.read())
            }
            Err(SyncError::Session(SessionError::NotFound)) => {
                let lost = self.lifecycle.session_id().unwrap_or_default().to_string();
                self.scheduler.deactivate();
                self.rebootstrap(&lost).await?;
                Ok(self.local.read())
            }
            Err(e) => {
                if pending {
                    self.scheduler.note_local_write();
                }
                if let SyncError::Session(err) = &e {
                    self.notifier
                        .notify(NoticeLevel::Error, &format!("Reset failed: {}", err));
                }
                Err(e)
            }
        }
    }

    /// Render the current workspace as an XLSX workbook.
    #[cfg(feature = "web")]
    pub fn export_xlsx(&self) -> Result<Vec<u8>, SyncError> {
        Ok(crate::downloader::to_xlsx(&self.local.read().workspace_data())?)
    }

    /// Render one workspace sequence as CSV.
    #[cfg(feature = "web")]
    pub fn export_csv(&self, sequence: &str) -> Result<String, SyncError> {
        Ok(crate::downloader::to_csv(
            &self.local.read().workspace_data(),
            sequence,
        )?)
    }
}

impl<B: StorageBackend> SyncClient<Offline, B> {
    /// A client with no server: state lives only in `backend`.
    pub fn local_only(backend: B, clock: Arc<dyn Clock>) -> Self {
        let mut client = SyncClient::new(Offline, backend, clock, SyncConfig::default());
        client.lifecycle = SessionLifecycle::local_only();
        client
    }
}
