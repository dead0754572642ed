//! Session bootstrap and reset.
//!
//! ```text
//! Uninitialized ─┬─ remembered id ─> Resuming ─┬─ ok ────────────> Active
//!                │                             └─ error ─┐
//!                └─ no id ──────────────────────────────> Creating ─┬─ ok ─> Active
//!                                                                   └─ error ─> Failed
//! ```
//!
//! Pure-local mode skips all of that and starts in `LocalOnly`.

use log::{info, warn};

use crate::api::SessionApi;
use crate::error::{SessionError, SyncError};
use crate::ids::SessionId;
use crate::local_store::{LocalStateStore, StorageBackend};
use crate::prompt::ConfirmPrompt;
use crate::state::{LocalState, SessionRecord};

pub const RESET_PROMPT: &str = "Reset the workspace? All tabs will be cleared and this cannot be undone.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Resuming,
    Creating,
    Active { session_id: String },
    LocalOnly { session_id: String },
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Bootstrap {
    Resumed(SessionRecord),
    Created(SessionRecord),
    Local { session_id: String },
}

impl Bootstrap {
    pub fn session_id(&self) -> String {
        match self {
            Bootstrap::Resumed(record) | Bootstrap::Created(record) => {
                record.session_id.to_string()
            }
            Bootstrap::Local { session_id } => session_id.clone(),
        }
    }
}

#[derive(Debug)]
pub struct SessionLifecycle {
    state: LifecycleState,
    local_only: bool,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        SessionLifecycle::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        SessionLifecycle {
            state: LifecycleState::Uninitialized,
            local_only: false,
        }
    }

    /// A controller that never talks to a server.
    pub fn local_only() -> Self {
        SessionLifecycle {
            state: LifecycleState::Uninitialized,
            local_only: true,
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.state {
            LifecycleState::Active { session_id } | LifecycleState::LocalOnly { session_id } => {
                Some(session_id)
            }
            _ => None,
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    /// Resume the remembered session or create a new one.
    ///
    /// On success the adopted state has been written to `local`. A creation
    /// failure is terminal: the controller moves to `Failed` and the error is
    /// returned for the UI to show.
    pub async fn bootstrap<A, B>(
        &mut self,
        api: &A,
        local: &mut LocalStateStore<B>,
    ) -> Result<Bootstrap, SessionError>
    where
        A: SessionApi + ?Sized,
        B: StorageBackend,
    {
        if self.local_only {
            return Ok(self.bootstrap_local(local));
        }

        if let Some(remembered) = local.read().session_id().map(str::to_string) {
            self.state = LifecycleState::Resuming;
            match api.get(&remembered).await {
                Ok(record) => {
                    info!("Resumed session {}", remembered);
                    adopt(local, LocalState::from_record(&record));
                    self.state = LifecycleState::Active {
                        session_id: remembered,
                    };
                    return Ok(Bootstrap::Resumed(record));
                }
                Err(e) => {
                    info!("Could not resume session {}: {}", remembered, e);
                    forget_session_id(local);
                }
            }
        }

        self.state = LifecycleState::Creating;
        match api.create().await {
            Ok(record) => {
                let session_id = record.session_id.to_string();
                adopt(local, LocalState::from_record(&record));
                self.state = LifecycleState::Active {
                    session_id: session_id.clone(),
                };
                Ok(Bootstrap::Created(record))
            }
            Err(e) => {
                warn!("Session creation failed: {}", e);
                self.state = LifecycleState::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    fn bootstrap_local<B: StorageBackend>(&mut self, local: &mut LocalStateStore<B>) -> Bootstrap {
        let session_id = match local.read().session_id() {
            Some(id) => id.to_string(),
            None => {
                let id = SessionId::generate().to_string();
                let mut state = local.read().clone();
                state.set_session_id(Some(id.clone()));
                adopt(local, state);
                id
            }
        };
        self.state = LifecycleState::LocalOnly {
            session_id: session_id.clone(),
        };
        Bootstrap::Local { session_id }
    }

    /// The session was found to be gone: drop back to `Uninitialized` and
    /// forget the remembered id so the next bootstrap creates a fresh one.
    pub fn invalidate<B: StorageBackend>(&mut self, local: &mut LocalStateStore<B>) {
        self.state = LifecycleState::Uninitialized;
        forget_session_id(local);
    }

    /// Irreversibly clear the workspace after the user confirms.
    ///
    /// Either the whole state is replaced by the server's defaults or nothing
    /// changes: a declined prompt or a failed remote reset leaves local state
    /// exactly as it was.
    pub async fn reset<A, B>(
        &mut self,
        api: &A,
        local: &mut LocalStateStore<B>,
        confirm: &dyn ConfirmPrompt,
    ) -> Result<LocalState, SyncError>
    where
        A: SessionApi + ?Sized,
        B: StorageBackend,
    {
        let session_id = match &self.state {
            LifecycleState::Active { session_id } | LifecycleState::LocalOnly { session_id } => {
                session_id.clone()
            }
            _ => return Err(SyncError::NotActive),
        };

        if !confirm.confirm(RESET_PROMPT) {
            return Err(SyncError::ResetDeclined);
        }

        if self.local_only {
            let fresh = SessionId::generate().to_string();
            let state = LocalState::with_session_id(fresh.clone());
            adopt(local, state.clone());
            info!("Reset local workspace {} -> {}", session_id, fresh);
            self.state = LifecycleState::LocalOnly { session_id: fresh };
            return Ok(state);
        }

        let record = api.reset(&session_id).await?;
        let state = LocalState::from_record(&record);
        adopt(local, state.clone());
        Ok(state)
    }
}

/// Replace local state wholesale. The in-memory copy is authoritative even if
/// persisting fails.
fn adopt<B: StorageBackend>(local: &mut LocalStateStore<B>, state: LocalState) {
    if let Err(e) = local.replace(state) {
        warn!("Could not persist adopted state: {}", e);
    }
}

fn forget_session_id<B: StorageBackend>(local: &mut LocalStateStore<B>) {
    let mut state = local.read().clone();
    state.set_session_id(None);
    adopt(local, state);
}
