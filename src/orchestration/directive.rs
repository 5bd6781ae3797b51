use crate::config::{ModeId, WorkflowLibrary, WorkflowName, WorkflowRef};
use crate::orchestration::completion::{AcknowledgeOutcome, CompletionReport};
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::session::Session;
use crate::orchestration::task_queue::TaskSpec;
use crate::orchestration::tool_dispatch::InvocationReceipt;
use crate::orchestration::tool_protocol::{ToolHandler, ToolRequest};
use serde::{Deserialize, Serialize};

/// Control messages a caller sends to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum ControlDirective {
    SelectMode {
        mode: ModeId,
    },
    StartWorkflow {
        workflow: WorkflowName,
        #[serde(default)]
        version: Option<u32>,
    },
    DefineTasks {
        tasks: Vec<String>,
    },
    Invoke(ToolRequest),
    Progress {
        message: String,
    },
    Complete {
        #[serde(default)]
        summary: Option<String>,
        #[serde(default)]
        ordinal: Option<u32>,
    },
    AcknowledgeFailure,
    SkipTask {
        ordinal: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DirectiveOutcome {
    ModeSelected { mode: ModeId },
    TasksDefined { active: TaskSpec },
    Invoked(InvocationReceipt),
    ProgressRecorded { ordinal: u32 },
    Completed(CompletionReport),
    Acknowledged(AcknowledgeOutcome),
    Skipped { ordinal: u32 },
}

impl Session {
    /// Applies one directive. `StartWorkflow` resolves the definition from
    /// `library`, taking the latest version when none is given.
    pub fn apply<H>(
        &mut self,
        directive: ControlDirective,
        library: &WorkflowLibrary,
        handler: &mut H,
    ) -> Result<DirectiveOutcome, OrchestratorError>
    where
        H: ToolHandler + ?Sized,
    {
        match directive {
            ControlDirective::SelectMode { mode } => {
                self.select_mode(&mode)?;
                Ok(DirectiveOutcome::ModeSelected { mode })
            }
            ControlDirective::StartWorkflow { workflow, version } => {
                let definition = match version {
                    Some(version) => library.get(&WorkflowRef {
                        name: workflow.clone(),
                        version,
                    }),
                    None => library.latest(&workflow),
                }
                .ok_or_else(|| OrchestratorError::UnknownWorkflow {
                    workflow: match version {
                        Some(version) => format!("{workflow}@{version}"),
                        None => workflow.to_string(),
                    },
                })?;
                let active = self.start_workflow(definition)?;
                Ok(DirectiveOutcome::TasksDefined { active })
            }
            ControlDirective::DefineTasks { tasks } => {
                let active = self.define_tasks(tasks)?;
                Ok(DirectiveOutcome::TasksDefined { active })
            }
            ControlDirective::Invoke(request) => {
                self.invoke(request, handler).map(DirectiveOutcome::Invoked)
            }
            ControlDirective::Progress { message } => {
                let ordinal = self.progress(&message)?;
                Ok(DirectiveOutcome::ProgressRecorded { ordinal })
            }
            ControlDirective::Complete { summary, ordinal } => self
                .complete(summary.as_deref(), ordinal)
                .map(DirectiveOutcome::Completed),
            ControlDirective::AcknowledgeFailure => {
                self.acknowledge_failure().map(DirectiveOutcome::Acknowledged)
            }
            ControlDirective::SkipTask { ordinal } => {
                self.skip_task(ordinal)?;
                Ok(DirectiveOutcome::Skipped { ordinal })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_parse_from_tagged_yaml() {
        let directives: Vec<ControlDirective> = serde_yaml::from_str(
            r#"
- directive: select_mode
  mode: wallet
- directive: start_workflow
  workflow: pay
- directive: invoke
  tool: send
  arguments:
    to: {"$register": recipient}
    amount: 5k
- directive: complete
  ordinal: 2
- directive: acknowledge_failure
"#,
        )
        .expect("directives");

        assert_eq!(directives.len(), 5);
        assert!(matches!(
            &directives[1],
            ControlDirective::StartWorkflow { version: None, .. }
        ));
        let ControlDirective::Invoke(request) = &directives[2] else {
            panic!("expected invoke");
        };
        assert_eq!(request.tool.as_str(), "send");
        assert_eq!(request.arguments.len(), 2);
        assert_eq!(
            directives[3],
            ControlDirective::Complete {
                summary: None,
                ordinal: Some(2)
            }
        );
        assert_eq!(directives[4], ControlDirective::AcknowledgeFailure);
    }
}
