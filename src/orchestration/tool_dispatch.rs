use crate::config::{OperationRole, RegisterName, Settings, ToolName, ToolSpec, WorkflowDefinition};
use crate::orchestration::amount::normalize_amount_value;
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::mode_gate::ModeGate;
use crate::orchestration::pending_operation::{OperationState, PendingOperation};
use crate::orchestration::register_store::RegisterStore;
use crate::orchestration::task_queue::TaskQueue;
use crate::orchestration::tool_protocol::{
    ArgumentValue, ResolvedCall, ToolErrorBody, ToolRequest, ToolResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable audit record of one dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub sequence: u64,
    #[serde(default)]
    pub task_ordinal: Option<u32>,
    pub tool: ToolName,
    pub arguments: BTreeMap<String, ArgumentValue>,
    #[serde(default)]
    pub result: Option<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<ToolErrorBody>,
    #[serde(default)]
    pub register_writes: Vec<RegisterName>,
    #[serde(default)]
    pub operation: Option<OperationState>,
    pub invoked_at: i64,
}

impl ToolInvocation {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Successful calls recorded against one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLedger {
    pub successful_calls: u32,
    pub successful_tools: BTreeSet<ToolName>,
}

impl TaskLedger {
    /// Checklist tools without a recorded success, in checklist order.
    pub fn missing_from<'a>(&self, checklist: &'a [ToolName]) -> Vec<&'a ToolName> {
        checklist
            .iter()
            .filter(|tool| !self.successful_tools.contains(*tool))
            .collect()
    }
}

/// What the caller gets back from a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationReceipt {
    pub sequence: u64,
    pub tool: ToolName,
    pub outputs: Map<String, Value>,
    pub register_writes: Vec<RegisterName>,
    pub operation: Option<OperationState>,
    pub message: Option<String>,
}

pub(crate) struct DispatchView<'a> {
    pub settings: &'a Settings,
    pub gate: &'a ModeGate,
    pub workflow: Option<&'a WorkflowDefinition>,
    pub registers: &'a RegisterStore,
    pub queue: &'a TaskQueue,
    pub operations: &'a BTreeMap<u32, PendingOperation>,
}

/// A call that passed every structural check and is ready for the handler.
#[derive(Debug, Clone)]
pub(crate) struct PreparedCall {
    pub call: ResolvedCall,
    pub spec: ToolSpec,
    pub task_ordinal: u32,
}

/// Runs every structural check in order. Nothing is mutated here, so a rejected
/// call leaves the session exactly as it was.
pub(crate) fn prepare_call(
    view: &DispatchView<'_>,
    request: &ToolRequest,
) -> Result<PreparedCall, OrchestratorError> {
    let tool = &request.tool;
    view.gate.check_tool(tool)?;

    let declared = view
        .workflow
        .map(|workflow| workflow.declares_tool(tool))
        .unwrap_or(false);
    if !declared {
        return Err(OrchestratorError::ToolNotDeclared {
            tool: tool.to_string(),
        });
    }

    let task_ordinal = view
        .queue
        .active_ordinal()
        .ok_or(OrchestratorError::NoActiveTask)?;
    let spec = view.settings.tool_spec(tool);

    for (arg, register) in &spec.inputs {
        match request.arguments.get(arg) {
            None => {}
            Some(ArgumentValue::Register(name)) if name == register => {}
            Some(_) => {
                return Err(OrchestratorError::LiteralRegisterArgument {
                    tool: tool.to_string(),
                    arg: arg.clone(),
                    register: register.to_string(),
                })
            }
        }
    }

    let referenced = request
        .arguments
        .values()
        .filter_map(|value| match value {
            ArgumentValue::Register(name) => Some(name.clone()),
            ArgumentValue::Literal(_) => None,
        })
        .collect::<Vec<_>>();
    let consumed = spec.consumed_registers();
    view.registers.require_all(
        consumed
            .iter()
            .chain(referenced.iter())
            .map(RegisterName::as_str),
    )?;

    check_operation_precondition(view, tool, &spec, task_ordinal)?;

    let mut arguments = Map::new();
    for (arg, value) in &request.arguments {
        let resolved = match value {
            ArgumentValue::Register(name) => view.registers.get(name.as_str())?.value.clone(),
            ArgumentValue::Literal(literal) => {
                if spec.amount_args.iter().any(|amount_arg| amount_arg == arg) {
                    normalize_amount_value(literal)?
                } else {
                    literal.clone()
                }
            }
        };
        arguments.insert(arg.clone(), resolved);
    }
    for (arg, register) in &spec.inputs {
        if !arguments.contains_key(arg) {
            arguments.insert(
                arg.clone(),
                view.registers.get(register.as_str())?.value.clone(),
            );
        }
    }

    Ok(PreparedCall {
        call: ResolvedCall {
            tool: tool.clone(),
            arguments,
        },
        spec,
        task_ordinal,
    })
}

fn check_operation_precondition(
    view: &DispatchView<'_>,
    tool: &ToolName,
    spec: &ToolSpec,
    task_ordinal: u32,
) -> Result<(), OrchestratorError> {
    let existing = view.operations.get(&task_ordinal);
    match spec.operation {
        None => Ok(()),
        Some(OperationRole::Poll) => match existing {
            Some(_) => Ok(()),
            None => Err(OrchestratorError::NoPendingOperation {
                tool: tool.to_string(),
                ordinal: task_ordinal,
            }),
        },
        Some(OperationRole::Submit) => match existing {
            Some(operation)
                if operation.state == OperationState::Submitted
                    || operation.state.is_failure() =>
            {
                Err(OrchestratorError::InvalidOperationTransition {
                    from: operation.state,
                    to: OperationState::Submitted,
                })
            }
            _ => Ok(()),
        },
    }
}

/// Result of applying a handler response.
pub(crate) struct Settled {
    pub register_writes: Vec<RegisterName>,
    pub operation: Option<OperationState>,
    pub message: Option<String>,
}

/// Applies a successful response: validates the operation report first, then
/// writes declared outputs and credits the task ledger.
pub(crate) fn settle_response(
    prepared: &PreparedCall,
    response: &ToolResponse,
    registers: &mut RegisterStore,
    operations: &mut BTreeMap<u32, PendingOperation>,
    ledgers: &mut BTreeMap<u32, TaskLedger>,
) -> Result<Settled, OrchestratorError> {
    let tool = &prepared.call.tool;
    if !response.is_ok() {
        let error = response.error.clone().unwrap_or_else(|| ToolErrorBody {
            kind: "unspecified".to_string(),
            detail: "tool reported an error without details".to_string(),
        });
        return Err(OrchestratorError::ExternalToolFailure {
            tool: tool.to_string(),
            kind: error.kind,
            detail: error.detail,
        });
    }

    let next_operation = match prepared.spec.operation {
        None => None,
        Some(OperationRole::Submit) => {
            let mut operation = PendingOperation::submit(prepared.task_ordinal, tool.clone());
            if let Some(report) = response.operation.as_ref() {
                operation.apply(report, tool)?;
            }
            Some(operation)
        }
        Some(OperationRole::Poll) => {
            let mut operation = operations
                .get(&prepared.task_ordinal)
                .cloned()
                .ok_or_else(|| OrchestratorError::NoPendingOperation {
                    tool: tool.to_string(),
                    ordinal: prepared.task_ordinal,
                })?;
            if let Some(report) = response.operation.as_ref() {
                operation.apply(report, tool)?;
            }
            Some(operation)
        }
    };

    let mut register_writes = Vec::new();
    for output in &prepared.spec.outputs {
        if let Some(value) = response.outputs.get(output.as_str()) {
            registers.put(output.clone(), value.clone(), tool.clone());
            register_writes.push(output.clone());
        }
    }

    let ledger = ledgers.entry(prepared.task_ordinal).or_default();
    ledger.successful_calls = ledger.successful_calls.saturating_add(1);
    ledger.successful_tools.insert(tool.clone());

    let (operation_state, message) = match next_operation {
        Some(operation) => {
            let state = operation.state;
            let message = operation.failure_message().or_else(|| {
                (state != OperationState::Submitted)
                    .then(|| operation.completion_gate().ok())
                    .flatten()
            });
            operations.insert(prepared.task_ordinal, operation);
            (Some(state), message)
        }
        None => (None, None),
    };

    Ok(Settled {
        register_writes,
        operation: operation_state,
        message,
    })
}
