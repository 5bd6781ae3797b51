use serde_json::{json, Map, Value};
use skillgate::config::{
    ModeId, SessionId, Settings, ToolName, WorkflowDefinition, WorkflowLibrary,
};
use skillgate::orchestration::progress::ProgressSnapshot;
use skillgate::orchestration::tool_protocol::{ResolvedCall, ToolRequest, ToolResponse};
use skillgate::orchestration::{Session, SessionStore};
use skillgate::shared::logging::engine_log_path;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

const SETTINGS: &str = r#"
modes:
  research:
    tools: [search, summarize]
tools:
  search:
    outputs: [hits]
  summarize:
    inputs:
      source: hits
"#;

const DIGEST: &str = r#"
name: digest
version: 2
required_tools: [search, summarize]
tasks:
  - ordinal: 1
    description: search the archive
    checklist: [search]
  - ordinal: 2
    description: summarize the hits
    checklist: [summarize]
"#;

fn settings() -> Arc<Settings> {
    Arc::new(serde_yaml::from_str(SETTINGS).expect("settings"))
}

fn library() -> WorkflowLibrary {
    let mut library = WorkflowLibrary::default();
    let definition: WorkflowDefinition = serde_yaml::from_str(DIGEST).expect("workflow");
    library.insert(definition).expect("insert");
    library
}

fn session_id(raw: &str) -> SessionId {
    SessionId::parse(raw).expect("session id")
}

fn handler(call: &ResolvedCall) -> ToolResponse {
    let mut outputs = Map::new();
    if call.tool.as_str() == "search" {
        outputs.insert("hits".to_string(), json!([{"id": 7, "score": 0.91}]));
    }
    ToolResponse::ok(outputs)
}

fn started_session(library: &WorkflowLibrary, log_root: &std::path::Path) -> Session {
    let mut session = Session::new("sess-store-1", settings()).with_log_root(log_root);
    session
        .select_mode(&ModeId::parse("research").expect("mode"))
        .expect("mode");
    let definition = library
        .latest(&skillgate::config::WorkflowName::parse("digest").expect("name"))
        .expect("definition");
    session.start_workflow(definition).expect("start");
    session
        .invoke(
            ToolRequest::new(ToolName::parse("search").expect("tool")),
            &mut handler,
        )
        .expect("search");
    session.progress("found one hit").expect("progress");
    session
}

#[test]
fn session_store_module_round_trips_snapshots() {
    let temp = tempdir().expect("tempdir");
    let store = SessionStore::new(temp.path());
    let library = library();
    let session = started_session(&library, temp.path());

    let path = store.save(&session).expect("save");
    assert_eq!(path, temp.path().join("sessions/sess-store-1.json"));

    let loaded = store.load(&session_id("sess-store-1")).expect("load");
    assert_eq!(loaded, session.snapshot());

    let mut restored = Session::restore(loaded, &library, settings()).expect("restore");
    assert_eq!(restored.queue().active_ordinal(), Some(1));
    assert_eq!(
        restored.registers().get("hits").expect("hits").value,
        json!([{"id": 7, "score": 0.91}])
    );

    restored.complete(None, None).expect("complete task 1 after restore");
    restored
        .invoke(
            ToolRequest::new(ToolName::parse("summarize").expect("tool")),
            &mut handler,
        )
        .expect("summarize reads restored register");
    let report = restored.complete(None, None).expect("complete task 2");
    assert!(report.workflow_completed);
}

#[test]
fn session_store_module_rejects_tampered_registers() {
    let temp = tempdir().expect("tempdir");
    let store = SessionStore::new(temp.path());
    let library = library();
    let session = started_session(&library, temp.path());
    let path = store.save(&session).expect("save");

    let mut raw: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    raw["registers"]["registers"]["hits"]["value"] = json!([{"id": 8, "score": 0.91}]);
    fs::write(&path, serde_json::to_vec_pretty(&raw).expect("encode")).expect("write");

    let tampered = store.load(&session_id("sess-store-1")).expect("load");
    let err = Session::restore(tampered, &library, settings()).expect_err("digest mismatch");
    assert_eq!(err.kind(), "snapshot_integrity");
}

#[test]
fn session_store_module_requires_known_workflow_on_restore() {
    let temp = tempdir().expect("tempdir");
    let library = library();
    let session = started_session(&library, temp.path());

    let err = Session::restore(session.snapshot(), &WorkflowLibrary::default(), settings())
        .expect_err("library is missing digest@2");
    assert_eq!(err.kind(), "unknown_workflow");
    assert!(err.to_string().contains("digest@2"));
}

#[test]
fn session_store_module_lists_and_finds_latest() {
    let temp = tempdir().expect("tempdir");
    let store = SessionStore::new(temp.path());

    let mut older = Session::new("sess-old", settings()).snapshot();
    older.updated_at = 10;
    let mut newer = Session::new("sess-new", settings()).snapshot();
    newer.updated_at = 20;
    store.save_snapshot(&newer).expect("save newer");
    store.save_snapshot(&older).expect("save older");
    fs::write(store.sessions_dir().join("notes.txt"), "ignored").expect("write stray file");

    let listed = store
        .list()
        .expect("list")
        .into_iter()
        .map(|snapshot| snapshot.session_id)
        .collect::<Vec<_>>();
    assert_eq!(listed, vec!["sess-old", "sess-new"]);
    assert_eq!(
        store
            .latest_session()
            .expect("latest")
            .map(|snapshot| snapshot.session_id),
        Some("sess-new".to_string())
    );

    let allocated = store.allocate_session_id(1_700_000_000).expect("allocate");
    assert!(allocated.as_str().starts_with("sess-"));
    assert!(!store.session_path(&allocated).exists());
}

#[test]
fn session_store_module_writes_engine_log_lines() {
    let temp = tempdir().expect("tempdir");
    let library = library();
    let mut session = started_session(&library, temp.path());
    let _ = session.complete(None, Some(2));

    let log = fs::read_to_string(engine_log_path(temp.path())).expect("engine log");
    let events = log
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("json line"))
        .collect::<Vec<_>>();
    let names = events
        .iter()
        .filter_map(|event| event["event"].as_str())
        .collect::<Vec<_>>();
    assert!(names.contains(&"mode.selected"));
    assert!(names.contains(&"workflow.bound"));
    assert!(names.contains(&"tool.invoked"));
    assert!(names.contains(&"task.progress"));
    let rejection = events
        .iter()
        .find(|event| event["event"] == "task.completion_rejected")
        .expect("rejection logged");
    assert_eq!(rejection["error_kind"], "task_not_active");
    assert_eq!(rejection["session_id"], "sess-store-1");

    let progress = ProgressSnapshot::from_session(&session);
    assert_eq!(progress.current_task, Some(1));
    assert_eq!(progress.register_count, 1);
}
