#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use sheet_sync::{
    InProcessApi, ManualClock, NoticeLevel, Notifier, SessionApi, SessionError, SessionRecord,
    SessionStore, StatePatch,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A store on a manual clock, plus the clock to drive it.
pub fn manual_store() -> (ManualClock, Arc<SessionStore>) {
    let clock = ManualClock::default();
    let store = Arc::new(SessionStore::with_clock(Arc::new(clock.clone())));
    (clock, store)
}

/// Build a partial state from a JSON object literal.
pub fn partial(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

/// In-process API that records what it was asked and can be told to fail.
#[derive(Clone)]
pub struct RecordingApi {
    inner: InProcessApi,
    pushes: Arc<Mutex<Vec<(String, StatePatch)>>>,
    creates: Arc<AtomicUsize>,
    gets: Arc<AtomicUsize>,
    fail_pushes: Arc<AtomicBool>,
    fail_creates: Arc<AtomicBool>,
    fail_gets: Arc<AtomicBool>,
    fail_resets: Arc<AtomicBool>,
}

impl RecordingApi {
    pub fn new(store: Arc<SessionStore>) -> Self {
        RecordingApi {
            inner: InProcessApi::new(store),
            pushes: Arc::new(Mutex::new(Vec::new())),
            creates: Arc::new(AtomicUsize::new(0)),
            gets: Arc::new(AtomicUsize::new(0)),
            fail_pushes: Arc::new(AtomicBool::new(false)),
            fail_creates: Arc::new(AtomicBool::new(false)),
            fail_gets: Arc::new(AtomicBool::new(false)),
            fail_resets: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pushes(&self) -> Vec<(String, StatePatch)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_resets(&self, fail: bool) {
        self.fail_resets.store(fail, Ordering::SeqCst);
    }
}

fn network_down() -> SessionError {
    SessionError::Transient("connection refused".to_string())
}

#[async_trait]
impl SessionApi for RecordingApi {
    async fn create(&self) -> Result<SessionRecord, SessionError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(network_down());
        }
        self.inner.create().await
    }

    async fn get(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(network_down());
        }
        self.inner.get(session_id).await
    }

    async fn update_state(
        &self,
        session_id: &str,
        patch: &StatePatch,
    ) -> Result<SessionRecord, SessionError> {
        self.pushes
            .lock()
            .unwrap()
            .push((session_id.to_string(), patch.clone()));
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(network_down());
        }
        self.inner.update_state(session_id, patch).await
    }

    async fn reset(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        if self.fail_resets.load(Ordering::SeqCst) {
            return Err(network_down());
        }
        self.inner.reset(session_id).await
    }
}

/// Collects notices instead of showing them.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<(NoticeLevel, String)>>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}
