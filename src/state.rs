//! Session data model and the shallow-merge rules that apply to it.
//!
//! `uiState` merges key-by-key: a field present in a patch replaces the stored
//! field, absent fields are left alone. `workspaceData` merges by sequence name:
//! a sequence present in a patch replaces the stored sequence wholesale.
//! Nothing is merged deeper than that.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::SessionError;
use crate::ids::SessionId;

/// Key under which the local cache remembers its session id.
pub const SESSION_ID_KEY: &str = "sessionId";

/// Top-level keys owned by `uiState`, in camelCase as they appear on the wire.
pub const UI_STATE_FIELDS: [&str; 7] = [
    "activeTab",
    "showHeaders",
    "wrapText",
    "autoSave",
    "queryText",
    "tableName",
    "exportFileName",
];

/// Sequences every fresh workspace starts with.
pub const DEFAULT_SEQUENCES: [&str; 4] = ["gridData", "tableData", "queryHistory", "uploadedFiles"];

pub const UPLOADED_FILES: &str = "uploadedFiles";

/// Sequence names that would shadow a `uiState` field or the session id once
/// the client flattens both halves into one object.
pub fn is_reserved_sequence_name(name: &str) -> bool {
    name == SESSION_ID_KEY || UI_STATE_FIELDS.contains(&name)
}

/// Check a single top-level `uiState` value against the schema.
pub fn check_ui_field(key: &str, value: &Value) -> Result<(), SessionError> {
    let mut single = Map::new();
    single.insert(key.to_string(), value.clone());
    serde_json::from_value::<UiStatePatch>(Value::Object(single))
        .map(|_| ())
        .map_err(|e| SessionError::invalid(format!("{}: {}", key, e)))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTab {
    #[default]
    Grid,
    Query,
    Table,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub active_tab: ActiveTab,
    pub show_headers: bool,
    pub wrap_text: bool,
    pub auto_save: bool,
    pub query_text: String,
    pub table_name: String,
    pub export_file_name: String,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            active_tab: ActiveTab::Grid,
            show_headers: true,
            wrap_text: false,
            auto_save: true,
            query_text: String::new(),
            table_name: String::new(),
            export_file_name: "workbook.xlsx".to_string(),
        }
    }
}

/// A partial `uiState`. Unknown keys and mistyped values fail to deserialize,
/// which is how patches outside the known schema get rejected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UiStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_tab: Option<ActiveTab>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_headers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_save: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_file_name: Option<String>,
}

impl UiState {
    pub fn merged(&self, patch: &UiStatePatch) -> UiState {
        UiState {
            active_tab: patch.active_tab.unwrap_or(self.active_tab),
            show_headers: patch.show_headers.unwrap_or(self.show_headers),
            wrap_text: patch.wrap_text.unwrap_or(self.wrap_text),
            auto_save: patch.auto_save.unwrap_or(self.auto_save),
            query_text: patch
                .query_text
                .clone()
                .unwrap_or_else(|| self.query_text.clone()),
            table_name: patch
                .table_name
                .clone()
                .unwrap_or_else(|| self.table_name.clone()),
            export_file_name: patch
                .export_file_name
                .clone()
                .unwrap_or_else(|| self.export_file_name.clone()),
        }
    }
}

/// Named ordered sequences (grid rows, table rows, query history, uploads).
/// Elements are opaque to the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceData(pub BTreeMap<String, Vec<Value>>);

pub type WorkspacePatch = BTreeMap<String, Vec<Value>>;

impl Default for WorkspaceData {
    fn default() -> Self {
        WorkspaceData(
            DEFAULT_SEQUENCES
                .iter()
                .map(|name| (name.to_string(), Vec::new()))
                .collect(),
        )
    }
}

impl WorkspaceData {
    pub fn merged(&self, patch: &WorkspacePatch) -> WorkspaceData {
        let mut merged = self.0.clone();
        for (name, rows) in patch {
            merged.insert(name.clone(), rows.clone());
        }
        WorkspaceData(merged)
    }

    pub fn sequence(&self, name: &str) -> Option<&[Value]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn push(&mut self, name: &str, item: Value) {
        self.0.entry(name.to_string()).or_default().push(item);
    }
}

/// Body of a state update: either half may be absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_state: Option<UiStatePatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_data: Option<WorkspacePatch>,
}

impl StatePatch {
    /// Validate a raw JSON body against the known schema.
    pub fn from_json(body: &Value) -> Result<StatePatch, SessionError> {
        if !body.is_object() {
            return Err(SessionError::invalid("state update must be a JSON object"));
        }
        let patch: StatePatch = serde_json::from_value(body.clone())
            .map_err(|e| SessionError::invalid(e.to_string()))?;
        patch.validate()?;
        Ok(patch)
    }

    /// Checks that serde cannot express: workspace sequences may not reuse a
    /// reserved name.
    pub fn validate(&self) -> Result<(), SessionError> {
        if let Some(workspace) = &self.workspace_data {
            if let Some(name) = workspace.keys().find(|name| is_reserved_sequence_name(name)) {
                return Err(SessionError::invalid(format!(
                    "workspace sequence name {:?} is reserved",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.ui_state.is_none() && self.workspace_data.is_none()
    }
}

/// The server-of-record entry for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub ui_state: UiState,
    pub workspace_data: WorkspaceData,
}

impl SessionRecord {
    pub fn new(session_id: SessionId, now: DateTime<Utc>) -> Self {
        SessionRecord {
            session_id,
            created_at: now,
            last_activity: now,
            ui_state: UiState::default(),
            workspace_data: WorkspaceData::default(),
        }
    }

    /// Bump `last_activity`. It always moves strictly forward, even when the
    /// clock has not.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = if now > self.last_activity {
            now
        } else {
            self.last_activity + chrono::Duration::milliseconds(1)
        };
    }

    pub fn apply(&mut self, patch: &StatePatch, now: DateTime<Utc>) {
        if let Some(ui) = &patch.ui_state {
            self.ui_state = self.ui_state.merged(ui);
        }
        if let Some(workspace) = &patch.workspace_data {
            self.workspace_data = self.workspace_data.merged(workspace);
        }
        self.touch(now);
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.ui_state = UiState::default();
        self.workspace_data = WorkspaceData::default();
        self.touch(now);
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_activity)
    }
}

/// Metadata kept for an uploaded workbook; appended to `uploadedFiles`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub size: usize,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// The client-side cache: `uiState` and `workspaceData` flattened into one
/// object, plus the remembered `sessionId`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalState(Map<String, Value>);

impl Default for LocalState {
    fn default() -> Self {
        LocalState::from_parts(None, &UiState::default(), &WorkspaceData::default())
    }
}

impl LocalState {
    fn from_parts(session_id: Option<String>, ui: &UiState, workspace: &WorkspaceData) -> Self {
        let mut map = match serde_json::to_value(ui) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for (name, rows) in &workspace.0 {
            if is_reserved_sequence_name(name) {
                continue;
            }
            map.insert(name.clone(), Value::Array(rows.clone()));
        }
        if let Some(id) = session_id {
            map.insert(SESSION_ID_KEY.to_string(), Value::String(id));
        }
        LocalState(map)
    }

    pub fn from_record(record: &SessionRecord) -> Self {
        LocalState::from_parts(
            Some(record.session_id.to_string()),
            &record.ui_state,
            &record.workspace_data,
        )
    }

    /// Default state keyed by the given id.
    pub fn with_session_id(id: String) -> Self {
        LocalState::from_parts(Some(id), &UiState::default(), &WorkspaceData::default())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        LocalState(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.0.get(SESSION_ID_KEY).and_then(Value::as_str)
    }

    pub fn set_session_id(&mut self, id: Option<String>) {
        match id {
            Some(id) => {
                self.0.insert(SESSION_ID_KEY.to_string(), Value::String(id));
            }
            None => {
                self.0.remove(SESSION_ID_KEY);
            }
        }
    }

    /// One-level merge: every top-level key of `partial` replaces the
    /// corresponding value wholesale.
    pub fn merged(&self, partial: &Map<String, Value>) -> LocalState {
        let mut merged = self.0.clone();
        for (key, value) in partial {
            merged.insert(key.clone(), value.clone());
        }
        LocalState(merged)
    }

    /// Split the flat cache back into the two halves the server expects.
    ///
    /// Ui keys go through the same schema check the server applies, one field
    /// at a time; a field that fails is left out so the rest still goes out.
    /// Any other array-valued key is sent as a workspace sequence. Non-array
    /// strays are left out.
    pub fn to_patch(&self) -> StatePatch {
        let mut ui = Map::new();
        let mut workspace = WorkspacePatch::new();
        for (key, value) in &self.0 {
            if key == SESSION_ID_KEY {
                continue;
            }
            if UI_STATE_FIELDS.contains(&key.as_str()) {
                match check_ui_field(key, value) {
                    Ok(()) => {
                        ui.insert(key.clone(), value.clone());
                    }
                    Err(e) => warn!("Leaving {} out of the push: {}", key, e),
                }
            } else if let Value::Array(rows) = value {
                workspace.insert(key.clone(), rows.clone());
            }
        }
        let ui_state: UiStatePatch = serde_json::from_value(Value::Object(ui)).unwrap_or_default();
        StatePatch {
            ui_state: Some(ui_state),
            workspace_data: Some(workspace),
        }
    }

    /// The workspace half of the cache, for export.
    pub fn workspace_data(&self) -> WorkspaceData {
        let sequences = self
            .0
            .iter()
            .filter(|(key, _)| {
                key.as_str() != SESSION_ID_KEY && !UI_STATE_FIELDS.contains(&key.as_str())
            })
            .filter_map(|(key, value)| match value {
                Value::Array(rows) => Some((key.clone(), rows.clone())),
                _ => None,
            })
            .collect();
        WorkspaceData(sequences)
    }

    /// The ui half of the cache; unparseable fields fall back to defaults.
    pub fn ui_state(&self) -> UiState {
        let base = UiState::default();
        match self.to_patch().ui_state {
            Some(patch) => base.merged(&patch),
            None => base,
        }
    }
}
