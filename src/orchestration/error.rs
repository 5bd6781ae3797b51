use crate::config::ConfigError;
use crate::orchestration::pending_operation::OperationState;
use crate::orchestration::task_queue::QueueState;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no mode selected; call `{selection_tool}` before invoking `{tool}`")]
    ModeNotSelected { tool: String, selection_tool: String },
    #[error("unknown mode `{mode}`")]
    UnknownMode { mode: String },
    #[error("tool `{tool}` is not allowed in mode `{mode}`")]
    ToolNotAllowed { tool: String, mode: String },
    #[error("tool `{tool}` is not declared by the active workflow")]
    ToolNotDeclared { tool: String },
    #[error("register `{name}` is not set")]
    RegisterNotSet { name: String },
    #[error("missing registers: {}", names.join(", "))]
    MissingRegisters { names: Vec<String> },
    #[error("argument `{arg}` of `{tool}` must be bound to register `{register}`, not a literal")]
    LiteralRegisterArgument {
        tool: String,
        arg: String,
        register: String,
    },
    #[error("invalid amount `{raw}`: {reason}")]
    InvalidAmountFormat { raw: String, reason: String },
    #[error("no workflow is bound; start or bind a workflow before defining tasks")]
    NoWorkflowBound,
    #[error("a workflow is already active ({state})")]
    WorkflowAlreadyActive { state: QueueState },
    #[error("task list must contain at least one task")]
    EmptyTaskList,
    #[error("no task is active")]
    NoActiveTask,
    #[error("task {requested} is not active (active task: {})", active.map(|v| v.to_string()).unwrap_or_else(|| "none".to_string()))]
    TaskNotActive { requested: u32, active: Option<u32> },
    #[error("task {ordinal} cannot be skipped: {reason}")]
    InvalidTaskSkip { ordinal: u32, reason: String },
    #[error("task {ordinal} cannot complete yet: {reason}")]
    PrematureCompletion { ordinal: u32, reason: String },
    #[error("task queue transition `{from}` -> `{to}` is invalid")]
    InvalidQueueTransition { from: QueueState, to: QueueState },
    #[error("tool `{tool}` failed ({kind}): {detail}")]
    ExternalToolFailure {
        tool: String,
        kind: String,
        detail: String,
    },
    #[error("operation submitted by `{tool}` was reverted: {detail}")]
    OperationReverted { tool: String, detail: String },
    #[error("operation submitted by `{tool}` timed out: {detail}")]
    OperationTimedOut { tool: String, detail: String },
    #[error("tool `{tool}` polls a pending operation but task {ordinal} has none")]
    NoPendingOperation { tool: String, ordinal: u32 },
    #[error("pending operation transition `{from}` -> `{to}` is invalid")]
    InvalidOperationTransition {
        from: OperationState,
        to: OperationState,
    },
    #[error("task {ordinal} has no failed operation to acknowledge")]
    NothingToAcknowledge { ordinal: u32 },
    #[error("workflow `{workflow}` is not in the library")]
    UnknownWorkflow { workflow: String },
    #[error("session snapshot integrity check failed: {0}")]
    SnapshotIntegrity(String),
    #[error("session `{session_id}` not found")]
    UnknownSession { session_id: String },
    #[error("invalid session id `{session_id}`: {reason}")]
    InvalidSessionId { session_id: String, reason: String },
    #[error("failed to allocate session id: {0}")]
    SessionIdAllocation(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl OrchestratorError {
    /// Stable identifier written to logs and invocation records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModeNotSelected { .. } => "mode_not_selected",
            Self::UnknownMode { .. } => "unknown_mode",
            Self::ToolNotAllowed { .. } => "tool_not_allowed",
            Self::ToolNotDeclared { .. } => "tool_not_declared",
            Self::RegisterNotSet { .. } => "register_not_set",
            Self::MissingRegisters { .. } => "missing_registers",
            Self::LiteralRegisterArgument { .. } => "literal_register_argument",
            Self::InvalidAmountFormat { .. } => "invalid_amount_format",
            Self::NoWorkflowBound => "no_workflow_bound",
            Self::WorkflowAlreadyActive { .. } => "workflow_already_active",
            Self::EmptyTaskList => "empty_task_list",
            Self::NoActiveTask => "no_active_task",
            Self::TaskNotActive { .. } => "task_not_active",
            Self::InvalidTaskSkip { .. } => "invalid_task_skip",
            Self::PrematureCompletion { .. } => "premature_completion",
            Self::InvalidQueueTransition { .. } => "invalid_queue_transition",
            Self::ExternalToolFailure { .. } => "external_tool_failure",
            Self::OperationReverted { .. } => "reverted",
            Self::OperationTimedOut { .. } => "timed_out",
            Self::NoPendingOperation { .. } => "no_pending_operation",
            Self::InvalidOperationTransition { .. } => "invalid_operation_transition",
            Self::NothingToAcknowledge { .. } => "nothing_to_acknowledge",
            Self::UnknownWorkflow { .. } => "unknown_workflow",
            Self::SnapshotIntegrity(_) => "snapshot_integrity",
            Self::UnknownSession { .. } => "unknown_session",
            Self::InvalidSessionId { .. } => "invalid_session_id",
            Self::SessionIdAllocation(_) => "session_id_allocation",
            Self::Config(_) => "config",
            Self::Io { .. } => "io",
            Self::Json { .. } => "json",
        }
    }

    /// Rejections of caller mistakes, raised before any state mutation or
    /// external call.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            Self::ExternalToolFailure { .. }
                | Self::OperationReverted { .. }
                | Self::OperationTimedOut { .. }
                | Self::SessionIdAllocation(_)
                | Self::Config(_)
                | Self::Io { .. }
                | Self::Json { .. }
        )
    }
}

impl From<ConfigError> for OrchestratorError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_registers_message_lists_every_name() {
        let err = OrchestratorError::MissingRegisters {
            names: vec!["recipient_address".to_string(), "transfer_amount".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "missing registers: recipient_address, transfer_amount"
        );
        assert_eq!(err.kind(), "missing_registers");
        assert!(err.is_structural());
    }

    #[test]
    fn task_not_active_renders_missing_cursor() {
        let err = OrchestratorError::TaskNotActive {
            requested: 3,
            active: None,
        };
        assert_eq!(err.to_string(), "task 3 is not active (active task: none)");
    }

    #[test]
    fn external_failures_are_not_structural() {
        let err = OrchestratorError::ExternalToolFailure {
            tool: "transfer".to_string(),
            kind: "insufficient_funds".to_string(),
            detail: "balance 3 < 5".to_string(),
        };
        assert!(!err.is_structural());
        assert!(err.to_string().contains("balance 3 < 5"));
    }
}
