use super::{default_state_root_path, ConfigError, ModeId, RegisterName, ToolName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODE_SELECTION_TOOL: &str = "select_mode";

fn default_mode_selection_tool() -> ToolName {
    ToolName::from_static(DEFAULT_MODE_SELECTION_TOOL)
}

/// What happens to a workflow after the caller acknowledges a reverted or
/// timed-out pending operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    RestartWorkflow,
    RetryTask,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RestartWorkflow => "restart_workflow",
            Self::RetryTask => "retry_task",
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationRole {
    /// Opens a pending operation on the active task.
    Submit,
    /// Reports the state of the active task's pending operation.
    Poll,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModeConfig {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tools: BTreeSet<ToolName>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolSpec {
    #[serde(default)]
    pub description: Option<String>,
    /// Registers that must be set before the tool may run.
    #[serde(default)]
    pub requires: Vec<RegisterName>,
    /// Arguments always filled from a register; callers may not pass literals for them.
    #[serde(default)]
    pub inputs: BTreeMap<String, RegisterName>,
    #[serde(default)]
    pub outputs: Vec<RegisterName>,
    #[serde(default)]
    pub amount_args: Vec<String>,
    #[serde(default)]
    pub operation: Option<OperationRole>,
}

impl ToolSpec {
    /// Every register the tool reads, in declaration order without duplicates.
    pub fn consumed_registers(&self) -> Vec<RegisterName> {
        let mut seen = BTreeSet::new();
        self.requires
            .iter()
            .chain(self.inputs.values())
            .filter(|name| seen.insert((*name).clone()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub state_root: Option<PathBuf>,
    #[serde(default = "default_mode_selection_tool")]
    pub mode_selection_tool: ToolName,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub workflows_dir: Option<PathBuf>,
    pub modes: BTreeMap<ModeId, ModeConfig>,
    #[serde(default)]
    pub tools: BTreeMap<ToolName, ToolSpec>,
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(root) = self.state_root.as_ref() {
            if !root.is_absolute() {
                return Err(ConfigError::Settings(
                    "`state_root` must be an absolute path".to_string(),
                ));
            }
        }
        if let Some(dir) = self.workflows_dir.as_ref() {
            if !dir.is_absolute() {
                return Err(ConfigError::Settings(
                    "`workflows_dir` must be an absolute path".to_string(),
                ));
            }
        }
        if self.modes.is_empty() {
            return Err(ConfigError::Settings(
                "at least one mode must be configured".to_string(),
            ));
        }

        for (mode_id, mode) in &self.modes {
            if mode.tools.contains(&self.mode_selection_tool) {
                return Err(ConfigError::Settings(format!(
                    "mode `{mode_id}` lists the mode selection tool `{}`; it is always allowed",
                    self.mode_selection_tool
                )));
            }
        }

        if self.tools.contains_key(&self.mode_selection_tool) {
            return Err(ConfigError::Settings(format!(
                "mode selection tool `{}` cannot carry a tool declaration",
                self.mode_selection_tool
            )));
        }

        for (tool, spec) in &self.tools {
            for arg in &spec.amount_args {
                if spec.inputs.contains_key(arg) {
                    return Err(ConfigError::Settings(format!(
                        "tool `{tool}` argument `{arg}` cannot be both an amount and a register input"
                    )));
                }
            }
            let mut outputs = BTreeSet::new();
            for output in &spec.outputs {
                if !outputs.insert(output) {
                    return Err(ConfigError::Settings(format!(
                        "tool `{tool}` declares output `{output}` more than once"
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn resolve_state_root(&self) -> Result<PathBuf, ConfigError> {
        match self.state_root.as_ref() {
            Some(root) => Ok(root.clone()),
            None => default_state_root_path(),
        }
    }

    /// Declared [`ToolSpec`] for `tool`; undeclared tools get an empty
    /// declaration with no registers, outputs or operation role.
    pub fn tool_spec(&self, tool: &ToolName) -> ToolSpec {
        self.tools.get(tool).cloned().unwrap_or_default()
    }
}
