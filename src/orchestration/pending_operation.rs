use crate::config::ToolName;
use crate::orchestration::error::OrchestratorError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Submitted,
    Confirmed,
    Reverted,
    TimedOut,
    ConfirmedWithMismatch,
}

impl OperationState {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (OperationState::Submitted, OperationState::Confirmed)
                | (OperationState::Submitted, OperationState::Reverted)
                | (OperationState::Submitted, OperationState::TimedOut)
                | (OperationState::Submitted, OperationState::ConfirmedWithMismatch)
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(self, OperationState::Reverted | OperationState::TimedOut)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::Submitted => write!(f, "submitted"),
            OperationState::Confirmed => write!(f, "confirmed"),
            OperationState::Reverted => write!(f, "reverted"),
            OperationState::TimedOut => write!(f, "timed_out"),
            OperationState::ConfirmedWithMismatch => write!(f, "confirmed_with_mismatch"),
        }
    }
}

/// Operation state as reported by a tool response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReport {
    pub state: OperationState,
    #[serde(default)]
    pub detail: Option<String>,
}

/// An external action whose outcome is learned by polling, attached to the task
/// that submitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub task_ordinal: u32,
    pub submitted_by: ToolName,
    pub state: OperationState,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub last_reported_by: Option<ToolName>,
}

impl PendingOperation {
    pub fn submit(task_ordinal: u32, submitted_by: ToolName) -> Self {
        Self {
            task_ordinal,
            submitted_by,
            state: OperationState::Submitted,
            detail: None,
            last_reported_by: None,
        }
    }

    /// Validates `report` against the current state without mutating.
    pub fn check_report(&self, report: &OperationReport) -> Result<(), OrchestratorError> {
        if report.state == OperationState::Submitted && self.state == OperationState::Submitted {
            return Ok(());
        }
        if !self.state.can_transition_to(report.state) {
            return Err(OrchestratorError::InvalidOperationTransition {
                from: self.state,
                to: report.state,
            });
        }
        Ok(())
    }

    /// A `submitted` report on a submitted operation only refreshes the detail.
    pub fn apply(
        &mut self,
        report: &OperationReport,
        reporter: &ToolName,
    ) -> Result<(), OrchestratorError> {
        self.check_report(report)?;
        self.state = report.state;
        if report.detail.is_some() {
            self.detail = report.detail.clone();
        }
        self.last_reported_by = Some(reporter.clone());
        Ok(())
    }

    /// Gate applied by the completion signal. Returns the user-facing note for a
    /// successful outcome.
    pub fn completion_gate(&self) -> Result<String, OrchestratorError> {
        let detail = self.detail.clone().unwrap_or_default();
        match self.state {
            OperationState::Submitted => Err(OrchestratorError::PrematureCompletion {
                ordinal: self.task_ordinal,
                reason: format!(
                    "operation submitted by `{}` is still pending",
                    self.submitted_by
                ),
            }),
            OperationState::Reverted => Err(OrchestratorError::OperationReverted {
                tool: self.submitted_by.to_string(),
                detail,
            }),
            OperationState::TimedOut => Err(OrchestratorError::OperationTimedOut {
                tool: self.submitted_by.to_string(),
                detail,
            }),
            OperationState::Confirmed => Ok("operation confirmed".to_string()),
            OperationState::ConfirmedWithMismatch => {
                if detail.is_empty() {
                    Ok("operation confirmed, but the result did not match what was submitted"
                        .to_string())
                } else {
                    Ok(format!(
                        "operation confirmed, but the result did not match what was submitted: {detail}"
                    ))
                }
            }
        }
    }

    /// Message surfaced to the end user for a terminal failure.
    pub fn failure_message(&self) -> Option<String> {
        let detail = self
            .detail
            .as_deref()
            .map(|d| format!(": {d}"))
            .unwrap_or_default();
        match self.state {
            OperationState::Reverted => Some(format!(
                "operation submitted by `{}` failed: reverted{detail}",
                self.submitted_by
            )),
            OperationState::TimedOut => Some(format!(
                "operation submitted by `{}` failed: not confirmed before timeout{detail}",
                self.submitted_by
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation() -> PendingOperation {
        PendingOperation::submit(4, ToolName::parse("broadcast").expect("tool"))
    }

    fn report(state: OperationState, detail: Option<&str>) -> OperationReport {
        OperationReport {
            state,
            detail: detail.map(str::to_string),
        }
    }

    fn poller() -> ToolName {
        ToolName::parse("poll_confirmation").expect("tool")
    }

    #[test]
    fn submitted_blocks_completion_as_premature() {
        let op = operation();
        let err = op.completion_gate().expect_err("pending");
        assert_eq!(err.kind(), "premature_completion");
    }

    #[test]
    fn success_outcomes_carry_distinct_messages() {
        let mut confirmed = operation();
        confirmed
            .apply(&report(OperationState::Confirmed, None), &poller())
            .expect("confirm");
        let mut mismatch = operation();
        mismatch
            .apply(
                &report(OperationState::ConfirmedWithMismatch, Some("received 4.9 of 5")),
                &poller(),
            )
            .expect("mismatch");

        let confirmed_msg = confirmed.completion_gate().expect("ok");
        let mismatch_msg = mismatch.completion_gate().expect("ok");
        assert_ne!(confirmed_msg, mismatch_msg);
        assert!(mismatch_msg.contains("received 4.9 of 5"));
    }

    #[test]
    fn failure_outcomes_block_completion() {
        let mut reverted = operation();
        reverted
            .apply(&report(OperationState::Reverted, Some("out of gas")), &poller())
            .expect("revert");
        assert_eq!(reverted.completion_gate().expect_err("reverted").kind(), "reverted");
        assert!(reverted
            .failure_message()
            .expect("message")
            .contains("out of gas"));

        let mut timed_out = operation();
        timed_out
            .apply(&report(OperationState::TimedOut, None), &poller())
            .expect("timeout");
        assert_eq!(timed_out.completion_gate().expect_err("timeout").kind(), "timed_out");
    }

    #[test]
    fn terminal_states_do_not_transition_again() {
        let mut op = operation();
        op.apply(&report(OperationState::Submitted, Some("in mempool")), &poller())
            .expect("still pending");
        assert_eq!(op.detail.as_deref(), Some("in mempool"));
        op.apply(&report(OperationState::Reverted, None), &poller())
            .expect("revert");

        let err = op
            .apply(&report(OperationState::Confirmed, None), &poller())
            .expect_err("terminal");
        assert_eq!(err.kind(), "invalid_operation_transition");
        assert_eq!(op.state, OperationState::Reverted);
    }
}
