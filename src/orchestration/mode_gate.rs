use crate::config::{ModeId, Settings, ToolName, WorkflowDefinition};
use crate::orchestration::error::OrchestratorError;
use std::collections::{BTreeMap, BTreeSet};

/// Capability gate: each mode maps to an explicit tool allow-list. The mode
/// selection tool is reachable regardless of mode.
#[derive(Debug, Clone)]
pub struct ModeGate {
    modes: BTreeMap<ModeId, BTreeSet<ToolName>>,
    selection_tool: ToolName,
    selected: Option<ModeId>,
}

impl ModeGate {
    pub fn new(modes: BTreeMap<ModeId, BTreeSet<ToolName>>, selection_tool: ToolName) -> Self {
        Self {
            modes,
            selection_tool,
            selected: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings
                .modes
                .iter()
                .map(|(mode, config)| (mode.clone(), config.tools.clone()))
                .collect(),
            settings.mode_selection_tool.clone(),
        )
    }

    pub fn selection_tool(&self) -> &ToolName {
        &self.selection_tool
    }

    pub fn is_selection_tool(&self, tool: &ToolName) -> bool {
        &self.selection_tool == tool
    }

    pub fn selected_mode(&self) -> Option<&ModeId> {
        self.selected.as_ref()
    }

    pub fn knows_mode(&self, mode: &ModeId) -> bool {
        self.modes.contains_key(mode)
    }

    /// Unknown modes are rejected without touching the current selection.
    pub fn select_mode(&mut self, mode: &ModeId) -> Result<(), OrchestratorError> {
        if !self.knows_mode(mode) {
            return Err(OrchestratorError::UnknownMode {
                mode: mode.to_string(),
            });
        }
        self.selected = Some(mode.clone());
        Ok(())
    }

    pub fn is_tool_allowed(&self, tool: &ToolName) -> bool {
        if self.is_selection_tool(tool) {
            return true;
        }
        self.selected
            .as_ref()
            .and_then(|mode| self.modes.get(mode))
            .map(|tools| tools.contains(tool))
            .unwrap_or(false)
    }

    pub fn check_tool(&self, tool: &ToolName) -> Result<(), OrchestratorError> {
        if self.is_selection_tool(tool) {
            return Ok(());
        }
        let mode = self.require_mode(tool.as_str())?;
        if self.is_tool_allowed(tool) {
            Ok(())
        } else {
            Err(OrchestratorError::ToolNotAllowed {
                tool: tool.to_string(),
                mode: mode.to_string(),
            })
        }
    }

    /// A workflow is authorized only when every tool it declares is reachable
    /// in the selected mode.
    pub fn authorize_workflow(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<(), OrchestratorError> {
        for tool in &definition.required_tools {
            self.check_tool(tool)?;
        }
        if definition.required_tools.is_empty() {
            self.require_mode(self.selection_tool.as_str())?;
        }
        Ok(())
    }

    pub fn allowed_tools(&self) -> Vec<ToolName> {
        let mut tools = vec![self.selection_tool.clone()];
        if let Some(allowed) = self.selected.as_ref().and_then(|mode| self.modes.get(mode)) {
            tools.extend(allowed.iter().cloned());
        }
        tools
    }

    pub(crate) fn restore_selection(&mut self, mode: Option<ModeId>) -> Result<(), OrchestratorError> {
        match mode {
            Some(mode) => self.select_mode(&mode),
            None => {
                self.selected = None;
                Ok(())
            }
        }
    }

    /// `subject` names the tool or control call that needs a mode.
    pub(crate) fn require_mode(&self, subject: &str) -> Result<&ModeId, OrchestratorError> {
        self.selected
            .as_ref()
            .ok_or_else(|| OrchestratorError::ModeNotSelected {
                tool: subject.to_string(),
                selection_tool: self.selection_tool.to_string(),
            })
    }
}
