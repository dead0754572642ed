use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SessionError;
use crate::session_store::SessionStore;
use crate::state::{SessionRecord, StatePatch};

/// The client's view of the server-of-record.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create(&self) -> Result<SessionRecord, SessionError>;

    async fn get(&self, session_id: &str) -> Result<SessionRecord, SessionError>;

    async fn update_state(
        &self,
        session_id: &str,
        patch: &StatePatch,
    ) -> Result<SessionRecord, SessionError>;

    async fn reset(&self, session_id: &str) -> Result<SessionRecord, SessionError>;
}

/// Calls a [`SessionStore`] living in the same process.
#[derive(Clone)]
pub struct InProcessApi {
    store: Arc<SessionStore>,
}

impl InProcessApi {
    pub fn new(store: Arc<SessionStore>) -> Self {
        InProcessApi { store }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }
}

#[async_trait]
impl SessionApi for InProcessApi {
    async fn create(&self) -> Result<SessionRecord, SessionError> {
        self.store.create()
    }

    async fn get(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        self.store.get(session_id)
    }

    async fn update_state(
        &self,
        session_id: &str,
        patch: &StatePatch,
    ) -> Result<SessionRecord, SessionError> {
        self.store.update_state(session_id, patch)
    }

    async fn reset(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        self.store.reset(session_id)
    }
}

/// Stand-in for pure-local mode, where there is no server at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct Offline;

#[async_trait]
impl SessionApi for Offline {
    async fn create(&self) -> Result<SessionRecord, SessionError> {
        Err(offline())
    }

    async fn get(&self, _session_id: &str) -> Result<SessionRecord, SessionError> {
        Err(offline())
    }

    async fn update_state(
        &self,
        _session_id: &str,
        _patch: &StatePatch,
    ) -> Result<SessionRecord, SessionError> {
        Err(offline())
    }

    async fn reset(&self, _session_id: &str) -> Result<SessionRecord, SessionError> {
        Err(offline())
    }
}

fn offline() -> SessionError {
    SessionError::Transient("no session server configured".to_string())
}
