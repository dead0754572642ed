//! Error types shared by the local store, the session store and the sync client.

/// Failures of the server-of-record operations.
///
/// `InvalidInput` is a bad request; `NotFound` covers both never-created and
/// expired sessions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("session not found")]
    NotFound,

    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SessionError::InvalidInput(message.into())
    }
}

/// Failures of the durable local medium.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage rejected the write: {0}")]
    Rejected(String),
}

/// Workbook rendering failures.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("workspace has no sequence named {0}")]
    UnknownSequence(String),

    #[cfg(feature = "web")]
    #[error("workbook error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),
}

/// Errors surfaced by the client-side sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("reset was not confirmed")]
    ResetDeclined,

    #[error("no active session")]
    NotActive,
}
