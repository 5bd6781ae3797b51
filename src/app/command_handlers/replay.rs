use crate::app::command_support::{
    load_library, load_settings, map_config_err, map_orchestrator_err, session_store, state_root,
    to_pretty_json,
};
use crate::config::{SessionId, Settings, ToolName, WorkflowDefinition, WorkflowLibrary};
use crate::orchestration::directive::{ControlDirective, DirectiveOutcome};
use crate::orchestration::progress::ProgressSnapshot;
use crate::orchestration::recorded_handler::RecordedToolHandler;
use crate::orchestration::session::Session;
use crate::orchestration::tool_protocol::ToolResponse;
use crate::shared::time::now_secs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A scripted conversation: directives in order, plus canned responses per tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Extra workflow files, relative to the script's directory.
    #[serde(default)]
    pub workflows: Vec<PathBuf>,
    #[serde(default)]
    pub responses: BTreeMap<ToolName, Vec<ToolResponse>>,
    pub directives: Vec<ControlDirective>,
}

impl ReplayScript {
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        serde_yaml::from_str(&raw).map_err(|e| format!("failed to parse {}: {e}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFailure {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStep {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DirectiveOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplayFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub session_id: String,
    pub steps: Vec<ReplayStep>,
    pub progress: ProgressSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<String>,
}

pub fn cmd_replay(args: &[String]) -> Result<String, String> {
    let (path, save) = match args {
        [path] => (path, false),
        [path, flag] if flag == "--save" => (path, true),
        _ => return Err("usage: replay <script.yaml> [--save]".to_string()),
    };
    let script_path = Path::new(path);
    let script = ReplayScript::from_path(script_path)?;
    let settings = load_settings()?;
    let mut library = load_library(&settings)?;
    let base_dir = script_path.parent().unwrap_or_else(|| Path::new("."));
    extend_library(&mut library, &script.workflows, base_dir, &settings)?;

    let root = state_root(&settings)?;
    let store = session_store(&settings)?;
    let session_id = match script.session_id.clone() {
        Some(id) => id,
        None => store
            .allocate_session_id(now_secs())
            .map_err(map_orchestrator_err)?,
    };
    let (mut report, session) =
        run_replay(script, session_id, Arc::new(settings), &library, Some(root.as_path()));
    if save {
        let saved = store.save(&session).map_err(map_orchestrator_err)?;
        report.saved_to = Some(saved.display().to_string());
    }
    to_pretty_json(&report)
}

/// Runs every directive, recording failures instead of stopping: engine errors
/// are answers to the caller, not aborts.
pub fn run_replay(
    script: ReplayScript,
    session_id: SessionId,
    settings: Arc<Settings>,
    library: &WorkflowLibrary,
    log_root: Option<&Path>,
) -> (ReplayReport, Session) {
    let mut session = Session::new(session_id.as_str(), settings);
    if let Some(root) = log_root {
        session = session.with_log_root(root);
    }
    let mut handler = RecordedToolHandler::from_responses(script.responses);

    let mut steps = Vec::with_capacity(script.directives.len());
    for (index, directive) in script.directives.into_iter().enumerate() {
        let step = match session.apply(directive, library, &mut handler) {
            Ok(outcome) => ReplayStep {
                index,
                outcome: Some(outcome),
                error: None,
            },
            Err(err) => ReplayStep {
                index,
                outcome: None,
                error: Some(ReplayFailure {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                }),
            },
        };
        steps.push(step);
    }

    let report = ReplayReport {
        session_id: session.session_id().to_string(),
        steps,
        progress: ProgressSnapshot::from_session(&session),
        saved_to: None,
    };
    (report, session)
}

pub fn extend_library(
    library: &mut WorkflowLibrary,
    paths: &[PathBuf],
    base_dir: &Path,
    settings: &Settings,
) -> Result<(), String> {
    for path in paths {
        let resolved = if path.is_absolute() {
            path.clone()
        } else {
            base_dir.join(path)
        };
        let definition = WorkflowDefinition::from_path(&resolved).map_err(map_config_err)?;
        definition
            .validate_against(settings)
            .map_err(map_config_err)?;
        library.insert(definition).map_err(map_config_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_records_errors_and_keeps_going() {
        let settings: Settings = serde_yaml::from_str(
            "modes:\n  research:\n    tools: [search]\ntools:\n  search:\n    outputs: [hits]\n",
        )
        .expect("settings");
        let mut library = WorkflowLibrary::default();
        let definition: WorkflowDefinition = serde_yaml::from_str(
            "name: lookup\nversion: 1\nrequired_tools: [search]\ntasks:\n  - ordinal: 1\n    description: search\n",
        )
        .expect("workflow");
        library.insert(definition).expect("insert");

        let script: ReplayScript = serde_yaml::from_str(
            r#"
responses:
  search:
    - status: ok
      outputs: {hits: 3}
directives:
  - directive: invoke
    tool: search
  - directive: select_mode
    mode: research
  - directive: start_workflow
    workflow: lookup
  - directive: invoke
    tool: search
  - directive: complete
"#,
        )
        .expect("script");

        let (report, session) = run_replay(
            script,
            SessionId::parse("sess-replay").expect("id"),
            Arc::new(settings),
            &library,
            None,
        );

        assert_eq!(report.steps.len(), 5);
        assert_eq!(
            report.steps[0].error.as_ref().map(|e| e.kind.as_str()),
            Some("mode_not_selected")
        );
        assert!(report.steps[1..].iter().all(|step| step.error.is_none()));
        assert_eq!(report.progress.queue_state.to_string(), "completed");
        assert_eq!(session.invocations().len(), 1);
    }

    #[test]
    fn replay_scripts_reject_path_like_session_ids() {
        let err = serde_yaml::from_str::<ReplayScript>(
            "session_id: ../../outside\ndirectives: []\n",
        )
        .expect_err("invalid id");
        assert!(err.to_string().contains("session id"));
    }
}
