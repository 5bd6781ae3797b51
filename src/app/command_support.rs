use crate::config::{
    load_global_settings, load_workflow_library, ConfigError, Settings, WorkflowLibrary,
};
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::session_store::SessionStore;
use std::path::PathBuf;

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn map_orchestrator_err(err: OrchestratorError) -> String {
    format!("{} ({})", err, err.kind())
}

pub fn load_settings() -> Result<Settings, String> {
    load_global_settings().map_err(map_config_err)
}

pub fn load_library(settings: &Settings) -> Result<WorkflowLibrary, String> {
    load_workflow_library(settings).map_err(map_config_err)
}

pub fn state_root(settings: &Settings) -> Result<PathBuf, String> {
    settings.resolve_state_root().map_err(map_config_err)
}

pub fn session_store(settings: &Settings) -> Result<SessionStore, String> {
    Ok(SessionStore::new(state_root(settings)?))
}

pub fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to encode output: {e}"))
}
