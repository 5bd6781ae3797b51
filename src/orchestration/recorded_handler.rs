use crate::config::ToolName;
use crate::orchestration::tool_protocol::{ResolvedCall, ToolHandler, ToolResponse};
use std::collections::{BTreeMap, VecDeque};

/// Replays canned responses per tool in FIFO order and keeps every call it
/// received. Backs `skillgate replay` and end-to-end tests.
#[derive(Debug, Clone, Default)]
pub struct RecordedToolHandler {
    responses: BTreeMap<ToolName, VecDeque<ToolResponse>>,
    calls: Vec<ResolvedCall>,
}

impl RecordedToolHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_responses(responses: BTreeMap<ToolName, Vec<ToolResponse>>) -> Self {
        Self {
            responses: responses
                .into_iter()
                .map(|(tool, queue)| (tool, queue.into_iter().collect()))
                .collect(),
            calls: Vec::new(),
        }
    }

    pub fn push(&mut self, tool: ToolName, response: ToolResponse) {
        self.responses.entry(tool).or_default().push_back(response);
    }

    pub fn calls(&self) -> &[ResolvedCall] {
        &self.calls
    }
}

impl ToolHandler for RecordedToolHandler {
    fn call(&mut self, call: &ResolvedCall) -> ToolResponse {
        self.calls.push(call.clone());
        self.responses
            .get_mut(&call.tool)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                ToolResponse::error(
                    "no_recorded_response",
                    format!("no recorded response left for `{}`", call.tool),
                )
            })
    }
}
