use chrono::{DateTime, Utc};
use log::{info, warn};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::SessionError;
use crate::ids::SessionId;
use crate::state::{SessionRecord, UploadInfo};

pub const UPLOAD_FIELD: &str = "file";

pub const ALLOWED_MIME_TYPES: [&str; 3] = [
    "text/csv",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

pub fn check_mime_type(mime: Option<&str>) -> Result<String, SessionError> {
    let mime = mime.ok_or_else(|| SessionError::invalid("upload has no content type"))?;
    // Ignore parameters such as "; charset=utf-8".
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if ALLOWED_MIME_TYPES.contains(&essence.as_str()) {
        Ok(essence)
    } else {
        Err(SessionError::invalid(format!(
            "unsupported file type {:?}; only CSV, XLS and XLSX are accepted",
            mime
        )))
    }
}

/// Keep letters, digits, dots, dashes and underscores; everything else
/// (including path separators) becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn session_upload_dir(root: &Path, session_id: &SessionId) -> PathBuf {
    root.join(session_id.to_string())
}

/// Write the uploaded bytes under `<root>/<session id>/` and describe them.
pub async fn store_upload(
    root: &Path,
    session_id: &SessionId,
    original_name: &str,
    mime_type: String,
    bytes: &[u8],
    now: DateTime<Utc>,
) -> Result<UploadInfo, SessionError> {
    let id = Uuid::new_v4().to_string();
    let stored_name = format!("{}-{}", id, sanitize_file_name(original_name));
    let dir = session_upload_dir(root, session_id);

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| SessionError::Internal(format!("could not create upload dir: {}", e)))?;
    tokio::fs::write(dir.join(&stored_name), bytes)
        .await
        .map_err(|e| SessionError::Internal(format!("could not store upload: {}", e)))?;

    info!(
        "Stored upload {} ({} bytes) for session {}",
        stored_name,
        bytes.len(),
        session_id
    );

    Ok(UploadInfo {
        id,
        original_name: original_name.to_string(),
        stored_name,
        size: bytes.len(),
        mime_type,
        uploaded_at: now,
    })
}

/// Store the upload, then hand its metadata to `record`. When recording
/// fails the stored file is removed again so nothing on disk goes unreferenced.
pub async fn attach_upload<F>(
    root: &Path,
    session_id: &SessionId,
    original_name: &str,
    mime_type: String,
    bytes: &[u8],
    now: DateTime<Utc>,
    record: F,
) -> Result<UploadInfo, SessionError>
where
    F: FnOnce(&UploadInfo) -> Result<SessionRecord, SessionError>,
{
    let info = store_upload(root, session_id, original_name, mime_type, bytes, now).await?;
    if let Err(e) = record(&info) {
        let path = session_upload_dir(root, session_id).join(&info.stored_name);
        if let Err(remove_err) = tokio::fs::remove_file(&path).await {
            warn!("Could not remove orphaned upload {}: {}", path.display(), remove_err);
        }
        return Err(e);
    }
    Ok(info)
}
