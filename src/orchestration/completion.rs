use crate::config::FailurePolicy;
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::pending_operation::PendingOperation;
use crate::orchestration::register_store::RegisterStore;
use crate::orchestration::task_queue::{TaskQueue, TaskSpec};
use crate::orchestration::tool_dispatch::TaskLedger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub completed_ordinal: u32,
    pub message: String,
    #[serde(default)]
    pub next_task: Option<TaskSpec>,
    pub workflow_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeOutcome {
    pub ordinal: u32,
    pub policy: FailurePolicy,
    pub message: String,
    pub workflow_ended: bool,
}

/// Attaches a user-visible message to the active task. Status never changes.
pub(crate) fn record_progress(
    queue: &mut TaskQueue,
    message: &str,
) -> Result<u32, OrchestratorError> {
    let task = queue.current_task_mut()?;
    task.progress.push(message.to_string());
    Ok(task.ordinal)
}

/// The only path that moves the cursor forward. Every gate is checked before
/// the queue is touched.
pub(crate) fn complete_task(
    queue: &mut TaskQueue,
    operations: &BTreeMap<u32, PendingOperation>,
    ledgers: &BTreeMap<u32, TaskLedger>,
    summary: Option<&str>,
    requested: Option<u32>,
) -> Result<CompletionReport, OrchestratorError> {
    let active = queue.current_task().ok_or(OrchestratorError::NoActiveTask)?;
    let ordinal = active.ordinal;
    if let Some(requested) = requested {
        if requested != ordinal {
            return Err(OrchestratorError::TaskNotActive {
                requested,
                active: Some(ordinal),
            });
        }
    }

    let operation_note = operations
        .get(&ordinal)
        .map(PendingOperation::completion_gate)
        .transpose()?;

    let ledger = ledgers.get(&ordinal).cloned().unwrap_or_default();
    if ledger.successful_calls == 0 {
        return Err(OrchestratorError::PrematureCompletion {
            ordinal,
            reason: "no successful tool call was recorded for this task".to_string(),
        });
    }
    let missing = ledger.missing_from(&active.checklist);
    if !missing.is_empty() {
        let names = missing
            .iter()
            .map(|tool| tool.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(OrchestratorError::PrematureCompletion {
            ordinal,
            reason: format!("checklist tools without a successful call: {names}"),
        });
    }

    if let Some(summary) = summary {
        queue.current_task_mut()?.summary = Some(summary.to_string());
    }
    let next_task = queue.advance()?.cloned();
    let workflow_completed = next_task.is_none();

    let mut message = format!("task {ordinal} completed");
    if let Some(note) = operation_note {
        message.push_str("; ");
        message.push_str(&note);
    }
    if workflow_completed {
        message.push_str("; workflow completed");
    }

    Ok(CompletionReport {
        completed_ordinal: ordinal,
        message,
        next_task,
        workflow_completed,
    })
}

/// Resolves a reverted or timed-out operation on the active task according to
/// the configured policy.
pub(crate) fn acknowledge_failure(
    policy: FailurePolicy,
    queue: &mut TaskQueue,
    registers: &mut RegisterStore,
    operations: &mut BTreeMap<u32, PendingOperation>,
    ledgers: &mut BTreeMap<u32, TaskLedger>,
) -> Result<AcknowledgeOutcome, OrchestratorError> {
    let ordinal = queue.active_ordinal().ok_or(OrchestratorError::NoActiveTask)?;
    let failure = operations
        .get(&ordinal)
        .and_then(PendingOperation::failure_message)
        .ok_or(OrchestratorError::NothingToAcknowledge { ordinal })?;

    match policy {
        FailurePolicy::RestartWorkflow => {
            queue.abort(failure.clone())?;
            registers.clear();
            Ok(AcknowledgeOutcome {
                ordinal,
                policy,
                message: format!("{failure}; workflow ended, start it again to retry"),
                workflow_ended: true,
            })
        }
        FailurePolicy::RetryTask => {
            operations.remove(&ordinal);
            ledgers.remove(&ordinal);
            Ok(AcknowledgeOutcome {
                ordinal,
                policy,
                message: format!("{failure}; task {ordinal} can be attempted again"),
                workflow_ended: false,
            })
        }
    }
}
