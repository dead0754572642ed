use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::api::SessionApi;
use crate::config::MAX_UPLOAD_BYTES;
use crate::error::SessionError;
use crate::ids::SessionId;
use crate::state::{SessionRecord, StatePatch, UploadInfo};

/// Every response from the session API is wrapped in this envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[allow(dead_code)]
    success: bool,
    session: Option<SessionRecord>,
    upload_info: Option<UploadInfo>,
    active_sessions: Option<usize>,
    error: Option<String>,
}

/// [`SessionApi`] over HTTP.
#[derive(Clone)]
pub struct HttpSessionApi {
    client: Client,
    base_url: String,
}

impl HttpSessionApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Internal(format!("could not build HTTP client: {}", e)))?;
        Ok(HttpSessionApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn session_url(&self, session_id: &str, suffix: &str) -> Result<String, SessionError> {
        // Refuse locally what the server would refuse anyway.
        let id = SessionId::parse(session_id)?;
        Ok(format!("{}/api/session/{}{}", self.base_url, id, suffix))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Envelope, SessionError> {
        let response = request
            .send()
            .await
            .map_err(|e| SessionError::Transient(e.to_string()))?;
        let status = response.status();
        let envelope: Option<Envelope> = response.json().await.ok();
        let message = envelope
            .as_ref()
            .and_then(|e| e.error.clone())
            .unwrap_or_else(|| status.to_string());

        match status {
            s if s.is_success() => {
                envelope.ok_or_else(|| SessionError::Transient("malformed response body".to_string()))
            }
            StatusCode::BAD_REQUEST => Err(SessionError::InvalidInput(message)),
            StatusCode::NOT_FOUND => Err(SessionError::NotFound),
            StatusCode::PAYLOAD_TOO_LARGE => Err(SessionError::PayloadTooLarge {
                limit: MAX_UPLOAD_BYTES,
            }),
            s if s.is_server_error() => Err(SessionError::Transient(message)),
            _ => Err(SessionError::Internal(message)),
        }
    }

    async fn send_for_session(&self, request: RequestBuilder) -> Result<SessionRecord, SessionError> {
        self.send(request)
            .await?
            .session
            .ok_or_else(|| SessionError::Transient("response carried no session".to_string()))
    }

    /// Upload a CSV/XLS/XLSX file to the session.
    pub async fn upload(
        &self,
        session_id: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadInfo, SessionError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| SessionError::invalid(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let url = self.session_url(session_id, "/upload")?;
        self.send(self.client.post(url).multipart(form))
            .await?
            .upload_info
            .ok_or_else(|| SessionError::Transient("response carried no upload info".to_string()))
    }

    pub async fn health(&self) -> Result<usize, SessionError> {
        let url = format!("{}/api/health", self.base_url);
        Ok(self
            .send(self.client.get(url))
            .await?
            .active_sessions
            .unwrap_or(0))
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn create(&self) -> Result<SessionRecord, SessionError> {
        let url = format!("{}/api/session/init", self.base_url);
        self.send_for_session(self.client.post(url)).await
    }

    async fn get(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        let url = self.session_url(session_id, "")?;
        self.send_for_session(self.client.get(url)).await
    }

    async fn update_state(
        &self,
        session_id: &str,
        patch: &StatePatch,
    ) -> Result<SessionRecord, SessionError> {
        let url = self.session_url(session_id, "/state")?;
        self.send_for_session(self.client.put(url).json(patch)).await
    }

    async fn reset(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        let url = self.session_url(session_id, "/reset")?;
        self.send_for_session(self.client.delete(url)).await
    }
}
