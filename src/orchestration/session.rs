use crate::config::{
    ModeId, Settings, TaskDraft, ToolName, WorkflowDefinition, WorkflowLibrary, WorkflowRef,
};
use crate::orchestration::completion::{self, AcknowledgeOutcome, CompletionReport};
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::mode_gate::ModeGate;
use crate::orchestration::pending_operation::PendingOperation;
use crate::orchestration::register_store::RegisterStore;
use crate::orchestration::task_queue::{QueueState, TaskQueue, TaskSpec};
use crate::orchestration::tool_dispatch::{
    self, DispatchView, InvocationReceipt, TaskLedger, ToolInvocation,
};
use crate::orchestration::tool_protocol::{
    ArgumentValue, ToolErrorBody, ToolHandler, ToolRequest,
};
use crate::shared::logging::{append_engine_log, LogLevel};
use crate::shared::time::now_secs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Argument carrying the target mode when the selection tool is invoked
/// through the dispatcher.
pub const MODE_ARGUMENT: &str = "mode";

/// Persisted form of a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub selected_mode: Option<ModeId>,
    #[serde(default)]
    pub workflow: Option<WorkflowRef>,
    pub queue: TaskQueue,
    pub registers: RegisterStore,
    #[serde(default)]
    pub pending_operations: BTreeMap<u32, PendingOperation>,
    #[serde(default)]
    pub ledgers: BTreeMap<u32, TaskLedger>,
    #[serde(default)]
    pub invocations: Vec<ToolInvocation>,
    pub invocation_sequence: u64,
}

/// One conversation's orchestration state. Every mutation goes through
/// `&mut self`, so calls are serialized per session.
#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    settings: Arc<Settings>,
    gate: ModeGate,
    workflow: Option<Arc<WorkflowDefinition>>,
    registers: RegisterStore,
    queue: TaskQueue,
    operations: BTreeMap<u32, PendingOperation>,
    ledgers: BTreeMap<u32, TaskLedger>,
    invocations: Vec<ToolInvocation>,
    invocation_sequence: u64,
    created_at: i64,
    updated_at: i64,
    log_root: Option<PathBuf>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, settings: Arc<Settings>) -> Self {
        let now = now_secs();
        Self {
            session_id: session_id.into(),
            gate: ModeGate::from_settings(&settings),
            settings,
            workflow: None,
            registers: RegisterStore::new(),
            queue: TaskQueue::new(),
            operations: BTreeMap::new(),
            ledgers: BTreeMap::new(),
            invocations: Vec::new(),
            invocation_sequence: 0,
            created_at: now,
            updated_at: now,
            log_root: None,
        }
    }

    /// Engine events are appended to `<state_root>/logs/engine.log`.
    pub fn with_log_root(mut self, state_root: impl Into<PathBuf>) -> Self {
        self.log_root = Some(state_root.into());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gate(&self) -> &ModeGate {
        &self.gate
    }

    pub fn selected_mode(&self) -> Option<&ModeId> {
        self.gate.selected_mode()
    }

    pub fn workflow(&self) -> Option<&Arc<WorkflowDefinition>> {
        self.workflow.as_ref()
    }

    pub fn registers(&self) -> &RegisterStore {
        &self.registers
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn current_task(&self) -> Option<&TaskSpec> {
        self.queue.current_task()
    }

    pub fn pending_operation(&self, ordinal: u32) -> Option<&PendingOperation> {
        self.operations.get(&ordinal)
    }

    pub fn ledger(&self, ordinal: u32) -> Option<&TaskLedger> {
        self.ledgers.get(&ordinal)
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        &self.invocations
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn log_root(&self) -> Option<&Path> {
        self.log_root.as_deref()
    }

    /// Selecting a mode always drops the bound workflow and its registers, even
    /// when the same mode is selected again.
    pub fn select_mode(&mut self, mode: &ModeId) -> Result<(), OrchestratorError> {
        if let Err(err) = self.gate.select_mode(mode) {
            self.log_rejection("mode.rejected", mode.as_str(), &err);
            return Err(err);
        }
        self.reset_workflow_scope();
        self.queue.reset();
        self.touch();
        self.log(
            LogLevel::Info,
            "mode.selected",
            &format!("mode `{mode}` selected"),
            Some(json!({ "mode": mode.as_str() })),
        );
        Ok(())
    }

    /// Binds `definition` without defining tasks; use [`Session::define_tasks`]
    /// or [`Session::start_workflow`] to populate the queue.
    pub fn bind_workflow(
        &mut self,
        definition: Arc<WorkflowDefinition>,
    ) -> Result<(), OrchestratorError> {
        let reference = definition.reference();
        let checked = self
            .gate
            .authorize_workflow(&definition)
            .and_then(|()| self.ensure_queue_idle());
        if let Err(err) = checked {
            self.log_rejection("workflow.rejected", &reference.to_string(), &err);
            return Err(err);
        }
        if self.queue.state().is_terminal() {
            self.queue.reset();
        }
        self.reset_workflow_scope();
        self.workflow = Some(definition);
        self.touch();
        self.log(
            LogLevel::Info,
            "workflow.bound",
            &format!("workflow `{reference}` bound"),
            Some(json!({ "workflow": reference.to_string() })),
        );
        Ok(())
    }

    /// Binds `definition` and defines its task script in one step.
    pub fn start_workflow(
        &mut self,
        definition: Arc<WorkflowDefinition>,
    ) -> Result<TaskSpec, OrchestratorError> {
        self.bind_workflow(definition.clone())?;
        self.define_drafts(definition.tasks.clone())
    }

    /// Task list declared by the caller. Ordinals follow list order.
    pub fn define_tasks<I>(&mut self, descriptions: I) -> Result<TaskSpec, OrchestratorError>
    where
        I: IntoIterator<Item = String>,
    {
        let drafts = descriptions
            .into_iter()
            .enumerate()
            .map(|(idx, description)| TaskDraft::new(idx as u32 + 1, description))
            .collect::<Vec<_>>();
        self.define_drafts(drafts)
    }

    pub fn invoke<H>(
        &mut self,
        request: ToolRequest,
        handler: &mut H,
    ) -> Result<InvocationReceipt, OrchestratorError>
    where
        H: ToolHandler + ?Sized,
    {
        if self.gate.is_selection_tool(&request.tool) {
            return self.invoke_selection(request);
        }

        let prepared = {
            let view = DispatchView {
                settings: &self.settings,
                gate: &self.gate,
                workflow: self.workflow.as_deref(),
                registers: &self.registers,
                queue: &self.queue,
                operations: &self.operations,
            };
            tool_dispatch::prepare_call(&view, &request)
        };
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                self.log_rejection("tool.rejected", request.tool.as_str(), &err);
                return Err(err);
            }
        };

        let response = handler.call(&prepared.call);
        let settled = tool_dispatch::settle_response(
            &prepared,
            &response,
            &mut self.registers,
            &mut self.operations,
            &mut self.ledgers,
        );
        let sequence = self.next_sequence();
        let mut invocation = ToolInvocation {
            sequence,
            task_ordinal: Some(prepared.task_ordinal),
            tool: request.tool.clone(),
            arguments: request.arguments,
            result: None,
            error: None,
            register_writes: Vec::new(),
            operation: None,
            invoked_at: now_secs(),
        };

        match settled {
            Ok(settled) => {
                invocation.result = Some(response.outputs.clone());
                invocation.register_writes = settled.register_writes.clone();
                invocation.operation = settled.operation;
                self.invocations.push(invocation);
                self.touch();
                self.log(
                    LogLevel::Info,
                    "tool.invoked",
                    &format!("`{}` succeeded on task {}", request.tool, prepared.task_ordinal),
                    Some(json!({
                        "tool": request.tool.as_str(),
                        "task": prepared.task_ordinal,
                        "sequence": sequence,
                        "register_writes": settled.register_writes,
                        "operation": settled.operation.map(|state| state.to_string()),
                    })),
                );
                Ok(InvocationReceipt {
                    sequence,
                    tool: request.tool,
                    outputs: response.outputs,
                    register_writes: settled.register_writes,
                    operation: settled.operation,
                    message: settled.message,
                })
            }
            Err(err) => {
                invocation.error = Some(match &err {
                    OrchestratorError::ExternalToolFailure { kind, detail, .. } => ToolErrorBody {
                        kind: kind.clone(),
                        detail: detail.clone(),
                    },
                    other => ToolErrorBody {
                        kind: other.kind().to_string(),
                        detail: other.to_string(),
                    },
                });
                self.invocations.push(invocation);
                self.touch();
                self.log(
                    LogLevel::Warn,
                    "tool.failed",
                    &err.to_string(),
                    Some(json!({
                        "tool": request.tool.as_str(),
                        "task": prepared.task_ordinal,
                        "sequence": sequence,
                        "error_kind": err.kind(),
                    })),
                );
                Err(err)
            }
        }
    }

    pub fn progress(&mut self, message: &str) -> Result<u32, OrchestratorError> {
        match completion::record_progress(&mut self.queue, message) {
            Ok(ordinal) => {
                self.touch();
                self.log(
                    LogLevel::Info,
                    "task.progress",
                    message,
                    Some(json!({ "task": ordinal })),
                );
                Ok(ordinal)
            }
            Err(err) => {
                self.log_rejection("task.progress_rejected", message, &err);
                Err(err)
            }
        }
    }

    pub fn complete(
        &mut self,
        summary: Option<&str>,
        ordinal: Option<u32>,
    ) -> Result<CompletionReport, OrchestratorError> {
        let report = match completion::complete_task(
            &mut self.queue,
            &self.operations,
            &self.ledgers,
            summary,
            ordinal,
        ) {
            Ok(report) => report,
            Err(err) => {
                let target = ordinal
                    .or_else(|| self.queue.active_ordinal())
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "none".to_string());
                self.log_rejection("task.completion_rejected", &target, &err);
                return Err(err);
            }
        };

        self.touch();
        self.log(
            LogLevel::Info,
            "task.completed",
            &report.message,
            Some(json!({
                "task": report.completed_ordinal,
                "next_task": report.next_task.as_ref().map(|task| task.ordinal),
            })),
        );
        if report.workflow_completed {
            self.finish_workflow("workflow.completed", "workflow completed");
        }
        Ok(report)
    }

    pub fn acknowledge_failure(&mut self) -> Result<AcknowledgeOutcome, OrchestratorError> {
        let outcome = match completion::acknowledge_failure(
            self.settings.failure_policy,
            &mut self.queue,
            &mut self.registers,
            &mut self.operations,
            &mut self.ledgers,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.log_rejection("operation.acknowledge_rejected", "acknowledge", &err);
                return Err(err);
            }
        };

        self.touch();
        self.log(
            LogLevel::Warn,
            "operation.acknowledged",
            &outcome.message,
            Some(json!({
                "task": outcome.ordinal,
                "policy": outcome.policy.as_str(),
            })),
        );
        if outcome.workflow_ended {
            self.finish_workflow("workflow.aborted", "workflow aborted after failed operation");
        }
        Ok(outcome)
    }

    pub fn skip_task(&mut self, ordinal: u32) -> Result<(), OrchestratorError> {
        if let Err(err) = self.queue.skip(ordinal) {
            self.log_rejection("task.skip_rejected", &ordinal.to_string(), &err);
            return Err(err);
        }
        self.touch();
        self.log(
            LogLevel::Info,
            "task.skipped",
            &format!("task {ordinal} skipped"),
            Some(json!({ "task": ordinal })),
        );
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            selected_mode: self.gate.selected_mode().cloned(),
            workflow: self.workflow.as_ref().map(|workflow| workflow.reference()),
            queue: self.queue.clone(),
            registers: self.registers.clone(),
            pending_operations: self.operations.clone(),
            ledgers: self.ledgers.clone(),
            invocations: self.invocations.clone(),
            invocation_sequence: self.invocation_sequence,
        }
    }

    /// Rebuilds a session, re-checking register digests, queue invariants and
    /// the workflow reference against `library`.
    pub fn restore(
        snapshot: SessionSnapshot,
        library: &WorkflowLibrary,
        settings: Arc<Settings>,
    ) -> Result<Self, OrchestratorError> {
        let mut gate = ModeGate::from_settings(&settings);
        gate.restore_selection(snapshot.selected_mode.clone())?;

        let workflow = match snapshot.workflow.as_ref() {
            Some(reference) => {
                let definition =
                    library
                        .get(reference)
                        .ok_or_else(|| OrchestratorError::UnknownWorkflow {
                            workflow: reference.to_string(),
                        })?;
                gate.authorize_workflow(&definition)?;
                Some(definition)
            }
            None => None,
        };

        snapshot.registers.verify()?;
        snapshot
            .queue
            .check_invariants()
            .map_err(OrchestratorError::SnapshotIntegrity)?;
        check_history(&snapshot)?;

        Ok(Self {
            session_id: snapshot.session_id,
            settings,
            gate,
            workflow,
            registers: snapshot.registers,
            queue: snapshot.queue,
            operations: snapshot.pending_operations,
            ledgers: snapshot.ledgers,
            invocations: snapshot.invocations,
            invocation_sequence: snapshot.invocation_sequence,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            log_root: None,
        })
    }

    fn invoke_selection(
        &mut self,
        request: ToolRequest,
    ) -> Result<InvocationReceipt, OrchestratorError> {
        let mode = match request.arguments.get(MODE_ARGUMENT) {
            Some(ArgumentValue::Literal(Value::String(raw))) => {
                ModeId::parse(raw).map_err(|_| OrchestratorError::UnknownMode { mode: raw.clone() })
            }
            _ => Err(OrchestratorError::UnknownMode {
                mode: format!("<missing `{MODE_ARGUMENT}` argument>"),
            }),
        };
        let mode = match mode {
            Ok(mode) => mode,
            Err(err) => {
                self.log_rejection("mode.rejected", request.tool.as_str(), &err);
                return Err(err);
            }
        };
        self.select_mode(&mode)?;

        let mut outputs = Map::new();
        outputs.insert(
            MODE_ARGUMENT.to_string(),
            Value::String(mode.as_str().to_string()),
        );
        let sequence = self.next_sequence();
        self.invocations.push(ToolInvocation {
            sequence,
            task_ordinal: None,
            tool: request.tool.clone(),
            arguments: request.arguments,
            result: Some(outputs.clone()),
            error: None,
            register_writes: Vec::new(),
            operation: None,
            invoked_at: now_secs(),
        });
        Ok(InvocationReceipt {
            sequence,
            tool: request.tool,
            outputs,
            register_writes: Vec::new(),
            operation: None,
            message: Some(format!("mode `{mode}` selected")),
        })
    }

    fn define_drafts(&mut self, drafts: Vec<TaskDraft>) -> Result<TaskSpec, OrchestratorError> {
        let checked = self
            .gate
            .require_mode("define_tasks")
            .map(|_| ())
            .and_then(|()| {
                if self.workflow.is_some() {
                    Ok(())
                } else {
                    Err(OrchestratorError::NoWorkflowBound)
                }
            })
            .and_then(|()| self.ensure_queue_idle());
        if let Err(err) = checked {
            self.log_rejection("tasks.rejected", "define_tasks", &err);
            return Err(err);
        }
        if drafts.is_empty() {
            let err = OrchestratorError::EmptyTaskList;
            self.log_rejection("tasks.rejected", "define_tasks", &err);
            return Err(err);
        }
        if self.queue.state().is_terminal() {
            self.queue.reset();
        }
        let first = self.queue.define_tasks(drafts)?.clone();
        self.touch();
        self.log(
            LogLevel::Info,
            "tasks.defined",
            &format!("{} task(s) defined", self.queue.tasks().len()),
            Some(json!({ "tasks": self.queue.tasks().len(), "active": first.ordinal })),
        );
        Ok(first)
    }

    /// Idle means nothing is defined or the previous run reached a terminal state.
    fn ensure_queue_idle(&self) -> Result<(), OrchestratorError> {
        let state = self.queue.state();
        if state == QueueState::Empty || state.is_terminal() {
            Ok(())
        } else {
            Err(OrchestratorError::WorkflowAlreadyActive { state })
        }
    }

    fn finish_workflow(&mut self, event: &str, message: &str) {
        let workflow = self
            .workflow
            .as_ref()
            .map(|workflow| workflow.reference().to_string());
        self.reset_workflow_scope();
        self.log(
            LogLevel::Info,
            event,
            message,
            Some(json!({ "workflow": workflow, "queue": self.queue.state().to_string() })),
        );
    }

    fn reset_workflow_scope(&mut self) {
        self.workflow = None;
        self.registers.clear();
        self.operations.clear();
        self.ledgers.clear();
    }

    fn next_sequence(&mut self) -> u64 {
        self.invocation_sequence = self.invocation_sequence.saturating_add(1);
        self.invocation_sequence
    }

    fn touch(&mut self) {
        self.updated_at = now_secs().max(self.updated_at);
    }

    fn log(&self, level: LogLevel, event: &str, message: &str, fields: Option<Value>) {
        if let Some(root) = self.log_root.as_deref() {
            append_engine_log(root, level, event, &self.session_id, message, fields);
        }
    }

    fn log_rejection(&self, event: &str, subject: &str, err: &OrchestratorError) {
        self.log(
            LogLevel::Warn,
            event,
            &err.to_string(),
            Some(json!({ "subject": subject, "error_kind": err.kind() })),
        );
    }
}

fn check_history(snapshot: &SessionSnapshot) -> Result<(), OrchestratorError> {
    let mut previous = 0;
    for invocation in &snapshot.invocations {
        if invocation.sequence <= previous || invocation.sequence > snapshot.invocation_sequence {
            return Err(OrchestratorError::SnapshotIntegrity(format!(
                "invocation sequence {} is out of order",
                invocation.sequence
            )));
        }
        previous = invocation.sequence;
    }
    for (ordinal, operation) in &snapshot.pending_operations {
        if operation.task_ordinal != *ordinal {
            return Err(OrchestratorError::SnapshotIntegrity(format!(
                "pending operation stored under task {ordinal} belongs to task {}",
                operation.task_ordinal
            )));
        }
    }
    Ok(())
}

/// Tools the session would accept right now, selection tool first.
pub fn reachable_tools(session: &Session) -> Vec<ToolName> {
    let mut tools = session.gate.allowed_tools();
    if let Some(workflow) = session.workflow.as_ref() {
        tools.retain(|tool| session.gate.is_selection_tool(tool) || workflow.declares_tool(tool));
    }
    tools
}
