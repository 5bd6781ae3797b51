use super::{default_global_config_path, ConfigError, Settings, WorkflowLibrary};

pub fn load_global_settings() -> Result<Settings, ConfigError> {
    let path = default_global_config_path()?;
    let settings = Settings::from_path(&path)?;
    settings.validate()?;
    Ok(settings)
}

/// Loads `workflows_dir` when configured; an unset directory yields an empty library.
pub fn load_workflow_library(settings: &Settings) -> Result<WorkflowLibrary, ConfigError> {
    match settings.workflows_dir.as_ref() {
        Some(dir) => WorkflowLibrary::load_dir(dir, settings),
        None => Ok(WorkflowLibrary::default()),
    }
}
