use super::{ConfigError, Settings, ToolName, WorkflowName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Name and version pair used to reference a shared definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub name: WorkflowName,
    pub version: u32,
}

impl std::fmt::Display for WorkflowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub ordinal: u32,
    pub description: String,
    /// Tools that must each record a successful call before the task can complete.
    #[serde(default)]
    pub checklist: Vec<ToolName>,
}

impl TaskDraft {
    pub fn new(ordinal: u32, description: impl Into<String>) -> Self {
        Self {
            ordinal,
            description: description.into(),
            checklist: Vec::new(),
        }
    }

    pub fn with_checklist<I>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = ToolName>,
    {
        self.checklist = tools.into_iter().collect();
        self
    }
}

/// A skill: the tools it may reach and the ordered task script it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: WorkflowName,
    pub version: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub required_tools: BTreeSet<ToolName>,
    pub tasks: Vec<TaskDraft>,
}

impl WorkflowDefinition {
    /// Reads YAML (JSON is accepted as a YAML subset).
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

    pub fn reference(&self) -> WorkflowRef {
        WorkflowRef {
            name: self.name.clone(),
            version: self.version,
        }
    }

    pub fn declares_tool(&self, tool: &ToolName) -> bool {
        self.required_tools.contains(tool)
    }

    /// Structural checks that need nothing but the definition itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tasks.is_empty() {
            return Err(self.invalid("workflow must declare at least one task"));
        }
        for (idx, task) in self.tasks.iter().enumerate() {
            let expected = idx as u32 + 1;
            if task.ordinal != expected {
                return Err(self.invalid(format!(
                    "task ordinals must run 1..={} in order; found {} at position {expected}",
                    self.tasks.len(),
                    task.ordinal
                )));
            }
            if task.description.trim().is_empty() {
                return Err(self.invalid(format!("task {} has an empty description", task.ordinal)));
            }
            for tool in &task.checklist {
                if !self.required_tools.contains(tool) {
                    return Err(self.invalid(format!(
                        "task {} checklist names `{tool}` which is not in required_tools",
                        task.ordinal
                    )));
                }
            }
        }
        Ok(())
    }

    /// Checks that the workflow can be authorized by at least one configured mode.
    pub fn validate_against(&self, settings: &Settings) -> Result<(), ConfigError> {
        self.validate()?;
        if self.required_tools.contains(&settings.mode_selection_tool) {
            return Err(self.invalid(format!(
                "required_tools may not include the mode selection tool `{}`",
                settings.mode_selection_tool
            )));
        }
        let reachable = settings
            .modes
            .values()
            .any(|mode| self.required_tools.is_subset(&mode.tools));
        if !reachable {
            return Err(self.invalid("no configured mode allows every required tool"));
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::Workflow {
            workflow: self.reference().to_string(),
            reason: reason.into(),
        }
    }
}
