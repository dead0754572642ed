use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use crate::ids::SessionId;
use crate::state::SessionRecord;

/// Key-value storage for session records, injected into [`crate::session_store::SessionStore`].
///
/// Implementations must make `update` atomic for the one record it touches and
/// must never let `retain` observe a record halfway through an `update`.
pub trait SessionRepository: Send + Sync {
    /// Insert a brand-new record. Returns `false` if the id is already taken.
    fn insert_new(&self, record: SessionRecord) -> bool;

    /// Run `apply` against the stored record and return a snapshot of the
    /// result, or `None` if no record has that id.
    fn update(
        &self,
        id: &SessionId,
        apply: &mut dyn FnMut(&mut SessionRecord),
    ) -> Option<SessionRecord>;

    /// Drop every record for which `keep` is false. Returns how many went.
    fn retain(&self, keep: &dyn Fn(&SessionRecord) -> bool) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local repository.
///
/// Per-record mutations hold the map read lock plus the record's own mutex, so
/// different records proceed in parallel. `retain` takes the map write lock and
/// therefore only runs between mutations.
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<SessionId, Mutex<SessionRecord>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn insert_new(&self, record: SessionRecord) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&record.session_id) {
            return false;
        }
        sessions.insert(record.session_id, Mutex::new(record));
        true
    }

    fn update(
        &self,
        id: &SessionId,
        apply: &mut dyn FnMut(&mut SessionRecord),
    ) -> Option<SessionRecord> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let entry = sessions.get(id)?;
        let mut record = entry.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut record);
        Some(record.clone())
    }

    fn retain(&self, keep: &dyn Fn(&SessionRecord) -> bool) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, entry| {
            let record = entry.get_mut().unwrap_or_else(PoisonError::into_inner);
            keep(record)
        });
        before - sessions.len()
    }

    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
