/*!
# Sheet Sync

State synchronization core for a browser-based grid/query editor, built in Rust.

## Overview

Every edit made in the editor (active tab, toggles, query text, grid rows,
table rows, query history, uploaded files) must survive reloads and, when a
server is available, be shared with an authoritative session store over HTTP.
This crate keeps a client cache and the server-of-record consistent while the
user types, the network lags and sessions expire in the background.

## Architecture

### Client Layer
- **Local State Store** - The full state object under one fixed key, merged
  and persisted synchronously on every write
- **Sync Scheduler** - Debounces pushes so a burst of edits becomes one call,
  and re-validates the session on a fixed interval
- **Session Lifecycle** - Resume-or-create bootstrap, re-bootstrap after
  expiry, confirmed reset, pure-local mode
- **Sync Client** - The single-threaded engine gluing the above together

### Server Layer
- **Technologies**: Rust, axum, tokio
- **Core Components**:
  - Session Repository - Injected key-value storage for session records
  - Session Store - Create / get / partial update / reset over the repository
  - Sweeper - Evicts sessions idle longer than the max age
  - Upload handling - CSV/XLS/XLSX files attached to a session

## Merge Rules

- `uiState` is merged key-by-key; absent keys are left alone
- `workspaceData` is merged by sequence name; a present sequence is replaced wholesale
- nothing is merged deeper than one level

## REST API Endpoints

- `POST /api/session/init` - Create a session
- `GET /api/session/{id}` - Fetch a session
- `PUT /api/session/{id}/state` - Apply `{uiState?, workspaceData?}`
- `DELETE /api/session/{id}/reset` - Reset a session to defaults
- `POST /api/session/{id}/upload` - Attach a CSV/XLS/XLSX file (field `file`)
- `GET /api/health` - Count of active sessions

## Modules

- **state**: Session record, ui/workspace state, patches and merges
- **ids**: Session id generation and format validation
- **local_store**: Durable client cache and its storage backends
- **repository**: Session repository trait and in-memory implementation
- **session_store**: Server-of-record operations and the sweeper
- **timer** / **clock**: Cancelable timers over an injectable clock
- **scheduler**: Debounced push and validation poll
- **lifecycle**: Session bootstrap and reset
- **client**: The sync engine
- **api**: Client-side view of the session store
- **prompt**: Confirmation prompt and notification collaborators
- **app**: Routing and handlers (feature `web`)
- **http_client**: HTTP implementation of the session API (feature `web`)
- **downloader**: Workbook export (feature `web`)
*/

pub mod api;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod local_store;
pub mod prompt;
pub mod repository;
pub mod scheduler;
pub mod session_store;
pub mod state;
pub mod timer;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod downloader;
#[cfg(feature = "web")]
pub mod http_client;
#[cfg(feature = "web")]
pub mod upload;

/// Re-export the types most callers need
pub use api::{InProcessApi, Offline, SessionApi};
pub use client::{SyncClient, TickReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ServerConfig, SyncConfig};
pub use error::{ExportError, SessionError, StorageError, SyncError};
pub use ids::SessionId;
pub use lifecycle::{Bootstrap, LifecycleState, SessionLifecycle};
pub use local_store::{FileBackend, LocalStateStore, MemoryBackend, StorageBackend};
pub use prompt::{AlwaysConfirm, ConfirmPrompt, LogNotifier, NeverConfirm, NoticeLevel, Notifier};
pub use repository::{InMemorySessionRepository, SessionRepository};
pub use scheduler::{PushOutcome, SyncAction, SyncScheduler, ValidationOutcome};
pub use session_store::{SessionStore, spawn_sweeper};
pub use state::{ActiveTab, LocalState, SessionRecord, StatePatch, UiState, UploadInfo, WorkspaceData};
