use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use log::{info, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::ids::SessionId;
use crate::session_store::{SessionStore, spawn_sweeper};
use crate::upload::{self, UPLOAD_FIELD};

// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub struct AppState {
    pub store: Arc<SessionStore>,
    pub config: ServerConfig,
}

/// A [`SessionError`] on its way out as an HTTP response.
pub struct ApiError(pub SessionError);

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SessionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SessionError::NotFound => StatusCode::NOT_FOUND,
            SessionError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            SessionError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = Json(json!({
            "success": false,
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/api/session/init", post(init_session))
        .route("/api/session/:id", get(get_session))
        .route("/api/session/:id/state", put(update_state))
        .route("/api/session/:id/reset", delete(reset_session))
        .route(
            "/api/session/:id/upload",
            post(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serve the session API and run the inactivity sweeper until the process exits.
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SessionStore::in_memory());
    let sweeper = spawn_sweeper(store.clone(), config.sweep_interval, config.max_age);

    let addr = config.addr;
    let app_state = Arc::new(AppState { store, config });
    let app = router(app_state);

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    sweeper.abort();
    Ok(())
}

async fn init_session(State(state): State<Arc<AppState>>) -> ApiResult {
    let session = state.store.create()?;
    let body = Json(json!({
        "success": true,
        "sessionId": session.session_id,
        "session": session,
    }));
    Ok((StatusCode::CREATED, body).into_response())
}

async fn get_session(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let session = state.store.get(&id)?;
    Ok(Json(json!({ "success": true, "session": session })).into_response())
}

async fn update_state(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult {
    // Id first, so a bad id is reported as such even with a bad body.
    SessionId::parse(&id)?;
    let body: Value = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| SessionError::invalid(format!("body is not valid JSON: {}", e)))?
    };
    let session = state.store.update_state_json(&id, &body)?;
    Ok(Json(json!({ "success": true, "session": session })).into_response())
}

async fn reset_session(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let session = state.store.reset(&id)?;
    Ok(Json(json!({ "success": true, "session": session })).into_response())
}

async fn upload_file(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult {
    let session_id = SessionId::parse(&id)?;
    state.store.get(&id)?;

    let limit = state.config.max_upload_bytes;
    let too_large = SessionError::PayloadTooLarge { limit };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(too_large.into()),
            Err(e) => return Err(SessionError::invalid(e.body_text()).into()),
        };

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let mime_type = upload::check_mime_type(field.content_type())?;
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(too_large.into()),
            Err(e) => return Err(SessionError::invalid(e.body_text()).into()),
        };
        if bytes.len() > limit {
            return Err(too_large.into());
        }
        if bytes.is_empty() {
            return Err(SessionError::invalid("uploaded file is empty").into());
        }

        // The session may be swept while the file is written.
        let upload_info = upload::attach_upload(
            &state.config.upload_dir,
            &session_id,
            &original_name,
            mime_type,
            &bytes,
            state.store.now(),
            |info| state.store.record_upload(&id, info),
        )
        .await?;

        return Ok(Json(json!({ "success": true, "uploadInfo": upload_info })).into_response());
    }

    Err(SessionError::invalid(format!("no file in field {:?}", UPLOAD_FIELD)).into())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "activeSessions": state.store.active_sessions(),
    }))
}
