use crate::orchestration::pending_operation::OperationState;
use crate::orchestration::session::{reachable_tools, Session};
use crate::orchestration::task_queue::{QueueState, TaskStatus};
use serde::{Deserialize, Serialize};

/// Compact view of a session for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub session_id: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub workflow: Option<String>,
    pub queue_state: QueueState,
    #[serde(default)]
    pub current_task: Option<u32>,
    #[serde(default)]
    pub current_description: Option<String>,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    #[serde(default)]
    pub pending_operation: Option<OperationState>,
    pub register_count: usize,
    pub invocation_count: usize,
    #[serde(default)]
    pub reachable_tools: Vec<String>,
    pub updated_at: i64,
    pub next_expected_action: String,
}

impl ProgressSnapshot {
    pub fn from_session(session: &Session) -> Self {
        let queue = session.queue();
        let current = queue.current_task();
        let pending_operation = current
            .and_then(|task| session.pending_operation(task.ordinal))
            .map(|operation| operation.state);
        Self {
            session_id: session.session_id().to_string(),
            mode: session.selected_mode().map(|mode| mode.to_string()),
            workflow: session
                .workflow()
                .map(|workflow| workflow.reference().to_string()),
            queue_state: queue.state(),
            current_task: current.map(|task| task.ordinal),
            current_description: current.map(|task| task.description.clone()),
            completed_tasks: queue
                .tasks()
                .iter()
                .filter(|task| task.status == TaskStatus::Completed)
                .count(),
            total_tasks: queue.tasks().len(),
            pending_operation,
            register_count: session.registers().len(),
            invocation_count: session.invocations().len(),
            reachable_tools: reachable_tools(session)
                .into_iter()
                .map(|tool| tool.to_string())
                .collect(),
            updated_at: session.updated_at(),
            next_expected_action: next_expected_action(session, pending_operation),
        }
    }
}

fn next_expected_action(session: &Session, pending: Option<OperationState>) -> String {
    if session.selected_mode().is_none() {
        return format!("call `{}`", session.gate().selection_tool());
    }
    match session.queue().state() {
        QueueState::Empty | QueueState::Completed | QueueState::Aborted => {
            if session.workflow().is_some() {
                "define tasks".to_string()
            } else {
                "start a workflow".to_string()
            }
        }
        QueueState::Defined => "activate first task".to_string(),
        QueueState::Executing => match pending {
            Some(OperationState::Submitted) => "poll pending operation".to_string(),
            Some(state) if state.is_failure() => "acknowledge failed operation".to_string(),
            _ => "invoke tools or signal completion".to_string(),
        },
    }
}
