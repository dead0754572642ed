mod common;

use common::manual_store;
use serde_json::json;
use sheet_sync::{
    ActiveTab, Clock, ManualClock, SessionError, SessionStore, StatePatch, UiState, WorkspaceData,
    spawn_sweeper,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[test]
fn test_create_gives_unique_default_sessions() {
    let store = SessionStore::in_memory();
    let mut ids = HashSet::new();
    for _ in 0..200 {
        let record = store.create().unwrap();
        assert!(record.last_activity >= record.created_at);
        assert_eq!(record.ui_state, UiState::default());
        assert_eq!(record.workspace_data, WorkspaceData::default());
        assert!(ids.insert(record.session_id.to_string()));
    }
    assert_eq!(store.active_sessions(), 200);
    println!("✓ 200 sessions created, all ids distinct");
}

#[test]
fn test_malformed_id_is_invalid_not_missing() {
    let store = SessionStore::in_memory();
    for bad in ["", "abc", "123e4567-e89b-12d3-a456-426614174000", "../etc/passwd"] {
        assert!(
            matches!(store.get(bad), Err(SessionError::InvalidInput(_))),
            "{:?} should be rejected as malformed",
            bad
        );
        assert!(matches!(store.reset(bad), Err(SessionError::InvalidInput(_))));
    }

    let unknown = uuid::Uuid::new_v4().to_string();
    assert_eq!(store.get(&unknown), Err(SessionError::NotFound));
    assert_eq!(store.reset(&unknown), Err(SessionError::NotFound));
}

#[test]
fn test_get_touches_the_session() {
    let (clock, store) = manual_store();
    let record = store.create().unwrap();
    clock.advance(Duration::from_secs(5));

    let fetched = store.get(&record.session_id.to_string()).unwrap();
    assert!(fetched.last_activity > record.last_activity);
    assert_eq!(fetched.created_at, record.created_at);
}

#[test]
fn test_update_merges_shallowly() {
    let store = SessionStore::in_memory();
    let id = store.create().unwrap().session_id.to_string();

    store
        .update_state_json(
            &id,
            &json!({
                "uiState": { "queryText": "let Source = Csv.Document(...)" },
                "workspaceData": { "gridData": [["a", "b"]], "queryHistory": ["q1"] }
            }),
        )
        .unwrap();
    let record = store
        .update_state_json(
            &id,
            &json!({
                "uiState": { "activeTab": "query" },
                "workspaceData": { "gridData": [["c"]] }
            }),
        )
        .unwrap();

    assert_eq!(record.ui_state.active_tab, ActiveTab::Query);
    assert_eq!(record.ui_state.query_text, "let Source = Csv.Document(...)");
    assert!(record.ui_state.show_headers);
    assert_eq!(record.workspace_data.sequence("gridData").unwrap(), &[json!(["c"])]);
    assert_eq!(record.workspace_data.sequence("queryHistory").unwrap(), &[json!("q1")]);
    assert_eq!(record.workspace_data.sequence("tableData").unwrap().len(), 0);
}

#[test]
fn test_empty_update_only_touches() {
    let (clock, store) = manual_store();
    let created = store.create().unwrap();
    let id = created.session_id.to_string();

    let record = store.update_state(&id, &StatePatch::default()).unwrap();
    assert_eq!(record.ui_state, created.ui_state);
    assert_eq!(record.workspace_data, created.workspace_data);
    // Clock did not move, activity still did.
    assert!(record.last_activity > created.last_activity);

    clock.advance(Duration::from_secs(1));
    let record = store.update_state_json(&id, &json!({})).unwrap();
    assert_eq!(record.last_activity, clock.now());
}

#[test]
fn test_invalid_update_leaves_record_untouched() {
    let (clock, store) = manual_store();
    let id = store.create().unwrap().session_id.to_string();
    store
        .update_state_json(&id, &json!({ "uiState": { "activeTab": "table" } }))
        .unwrap();
    let before = store.get(&id).unwrap();
    clock.advance(Duration::from_secs(1));

    let rejected = [
        json!({ "uiState": { "activeTab": "bogus" } }),
        json!({ "uiState": { "showHeaders": "yes" } }),
        json!({ "uiState": { "fontSize": 14 } }),
        json!({ "workspaceData": { "gridData": "not a list" } }),
        json!({ "somethingElse": true }),
        json!("just a string"),
    ];
    for body in &rejected {
        assert!(
            matches!(store.update_state_json(&id, body), Err(SessionError::InvalidInput(_))),
            "{} should be rejected",
            body
        );
    }

    // Compare against a read taken with the same clock reading: only the
    // touch from this get may differ.
    let after = store.get(&id).unwrap();
    assert_eq!(after.ui_state, before.ui_state);
    assert_eq!(after.workspace_data, before.workspace_data);
    assert_eq!(after.ui_state.active_tab, ActiveTab::Table);
    println!("✓ {} invalid bodies rejected, record unchanged", rejected.len());
}

#[test]
fn test_reserved_sequence_names_are_rejected() {
    let (clock, store) = manual_store();
    let id = store.create().unwrap().session_id.to_string();
    let before = store.get(&id).unwrap();
    clock.advance(Duration::from_secs(1));

    for body in [
        json!({ "workspaceData": { "activeTab": [] } }),
        json!({ "workspaceData": { "exportFileName": ["x.xlsx"] } }),
        json!({ "workspaceData": { "sessionId": ["someone-else"] } }),
        json!({ "uiState": { "wrapText": true }, "workspaceData": { "queryText": [] } }),
    ] {
        assert!(
            matches!(store.update_state_json(&id, &body), Err(SessionError::InvalidInput(_))),
            "{} should be rejected",
            body
        );
    }

    // Typed patches go through the same check.
    let mut typed = StatePatch::default();
    typed
        .workspace_data
        .get_or_insert_with(Default::default)
        .insert("showHeaders".to_string(), vec![]);
    assert!(matches!(
        store.update_state(&id, &typed),
        Err(SessionError::InvalidInput(_))
    ));

    let after = store.get(&id).unwrap();
    assert_eq!(after.ui_state, before.ui_state);
    assert_eq!(after.workspace_data, before.workspace_data);
    println!("✓ sequences named after ui fields or sessionId are refused");
}

#[test]
fn test_update_unknown_session_is_not_found() {
    let store = SessionStore::in_memory();
    let unknown = uuid::Uuid::new_v4().to_string();
    assert_eq!(
        store.update_state_json(&unknown, &json!({ "uiState": { "wrapText": true } })),
        Err(SessionError::NotFound)
    );
    assert_eq!(store.active_sessions(), 0);
}

#[test]
fn test_reset_keeps_identity_and_clears_state() {
    let (_clock, store) = manual_store();
    let created = store.create().unwrap();
    let id = created.session_id.to_string();
    let before = store
        .update_state_json(
            &id,
            &json!({
                "uiState": { "activeTab": "query", "wrapText": true },
                "workspaceData": { "tableData": [{ "a": 1 }], "custom": [1] }
            }),
        )
        .unwrap();

    let reset = store.reset(&id).unwrap();
    assert_eq!(reset.session_id, created.session_id);
    assert_eq!(reset.created_at, created.created_at);
    assert_eq!(reset.ui_state, UiState::default());
    assert_eq!(reset.workspace_data, WorkspaceData::default());
    assert!(reset.last_activity > before.last_activity);
}

#[test]
fn test_sweep_removes_only_idle_sessions() {
    let (clock, store) = manual_store();
    let old = store.create().unwrap().session_id.to_string();
    clock.advance(Duration::from_secs(20 * 60 * 60));
    let fresh = store.create().unwrap().session_id.to_string();
    clock.advance(Duration::from_secs(5 * 60 * 60));

    let removed = store.sweep_expired(clock.now(), DAY);
    assert_eq!(removed, 1);
    assert_eq!(store.get(&old), Err(SessionError::NotFound));
    assert!(store.get(&fresh).is_ok());
}

#[test]
fn test_sweep_at_exact_max_age_keeps_session() {
    let (clock, store) = manual_store();
    let id = store.create().unwrap().session_id.to_string();
    clock.advance(DAY);

    assert_eq!(store.sweep_expired(clock.now(), DAY), 0);
    clock.advance(Duration::from_millis(1));
    assert_eq!(store.sweep_expired(clock.now(), DAY), 1);
    assert_eq!(store.get(&id), Err(SessionError::NotFound));
}

#[test]
fn test_activity_postpones_eviction() {
    let (clock, store) = manual_store();
    let id = store.create().unwrap().session_id.to_string();
    for _ in 0..3 {
        clock.advance(Duration::from_secs(20 * 60 * 60));
        store
            .update_state_json(&id, &json!({ "uiState": { "autoSave": false } }))
            .unwrap();
        assert_eq!(store.sweep_expired(clock.now(), DAY), 0);
    }
    assert!(store.get(&id).is_ok());
}

#[test]
fn test_record_upload_appends_metadata() {
    let store = SessionStore::in_memory();
    let id = store.create().unwrap().session_id.to_string();
    let upload = sheet_sync::UploadInfo {
        id: "u1".to_string(),
        original_name: "sales.csv".to_string(),
        stored_name: "u1-sales.csv".to_string(),
        size: 12,
        mime_type: "text/csv".to_string(),
        uploaded_at: chrono::Utc::now(),
    };

    store.record_upload(&id, &upload).unwrap();
    let record = store.record_upload(&id, &upload).unwrap();
    let files = record.workspace_data.sequence("uploadedFiles").unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["originalName"], json!("sales.csv"));
    assert_eq!(files[0]["mimeType"], json!("text/csv"));
}

#[test]
fn test_concurrent_updates_on_distinct_sessions() {
    let store = Arc::new(SessionStore::in_memory());
    let ids: Vec<String> = (0..8)
        .map(|_| store.create().unwrap().session_id.to_string())
        .collect();

    std::thread::scope(|scope| {
        for (n, id) in ids.iter().enumerate() {
            let store = store.clone();
            scope.spawn(move || {
                for i in 0..100 {
                    let body = json!({
                        "uiState": { "queryText": format!("{}-{}", n, i) },
                        "workspaceData": { "gridData": [[n, i]] }
                    });
                    store.update_state_json(id, &body).unwrap();
                }
            });
        }
        // Sweeping with a generous max age must not disturb anything.
        let store = store.clone();
        scope.spawn(move || {
            for _ in 0..50 {
                store.sweep_expired(chrono::Utc::now(), DAY);
            }
        });
    });

    for (n, id) in ids.iter().enumerate() {
        let record = store.get(id).unwrap();
        assert_eq!(record.ui_state.query_text, format!("{}-99", n));
        assert_eq!(record.workspace_data.sequence("gridData").unwrap(), &[json!([n, 99])]);
    }
    println!("✓ 8 writers x 100 updates, each session saw only its own writes");
}

#[test]
fn test_concurrent_updates_on_one_session_are_atomic() {
    let store = Arc::new(SessionStore::in_memory());
    let id = store.create().unwrap().session_id.to_string();

    std::thread::scope(|scope| {
        for n in 0..4 {
            let store = store.clone();
            let id = id.clone();
            scope.spawn(move || {
                for i in 0..50 {
                    // Both halves carry the same marker; a torn update would
                    // leave them disagreeing.
                    let marker = format!("{}-{}", n, i);
                    let body = json!({
                        "uiState": { "tableName": marker },
                        "workspaceData": { "tableData": [marker] }
                    });
                    store.update_state_json(&id, &body).unwrap();
                }
            });
        }
    });

    let record = store.get(&id).unwrap();
    assert_eq!(
        record.workspace_data.sequence("tableData").unwrap(),
        &[json!(record.ui_state.table_name)]
    );
}

#[tokio::test]
async fn test_background_sweeper_evicts_idle_sessions() {
    let clock = ManualClock::default();
    let store = Arc::new(SessionStore::with_clock(Arc::new(clock.clone())));
    let id = store.create().unwrap().session_id.to_string();

    let sweeper = spawn_sweeper(store.clone(), Duration::from_millis(10), DAY);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.get(&id).is_ok(), "fresh session must survive sweeps");

    clock.advance(DAY + Duration::from_secs(1));
    let mut evicted = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if store.active_sessions() == 0 {
            evicted = true;
            break;
        }
    }
    sweeper.abort();

    assert!(evicted, "sweeper never evicted the idle session");
    assert_eq!(store.get(&id), Err(SessionError::NotFound));
}

#[tokio::test]
async fn test_zero_sweep_interval_does_not_kill_the_sweeper() {
    let clock = ManualClock::default();
    let store = Arc::new(SessionStore::with_clock(Arc::new(clock.clone())));
    store.create().unwrap();

    let sweeper = spawn_sweeper(store.clone(), Duration::ZERO, DAY);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!sweeper.is_finished(), "sweeper task died on a zero period");

    clock.advance(DAY + Duration::from_secs(1));
    let mut evicted = false;
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if store.active_sessions() == 0 {
            evicted = true;
            break;
        }
    }
    sweeper.abort();
    assert!(evicted, "clamped sweeper never ran");
}
