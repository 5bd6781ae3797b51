use crate::config::{TaskDraft, ToolName};
use crate::orchestration::error::OrchestratorError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Empty,
    Defined,
    Executing,
    Completed,
    Aborted,
}

impl QueueState {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (QueueState::Empty, QueueState::Defined)
                | (QueueState::Defined, QueueState::Executing)
                | (QueueState::Executing, QueueState::Completed)
                | (QueueState::Executing, QueueState::Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueueState::Completed | QueueState::Aborted)
    }
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueState::Empty => write!(f, "empty"),
            QueueState::Defined => write!(f, "defined"),
            QueueState::Executing => write!(f, "executing"),
            QueueState::Completed => write!(f, "completed"),
            QueueState::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Skipped,
}

impl TaskStatus {
    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub ordinal: u32,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub checklist: Vec<ToolName>,
    #[serde(default)]
    pub progress: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Ordered steps with a single active cursor. `advance` is the only way the
/// cursor moves forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueue {
    state: QueueState,
    tasks: Vec<TaskSpec>,
    #[serde(default)]
    abort_reason: Option<String>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self {
            state: QueueState::Empty,
            tasks: Vec::new(),
            abort_reason: None,
        }
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// Ordinals are assigned by position, starting at 1.
    pub fn define_tasks<I>(&mut self, drafts: I) -> Result<&TaskSpec, OrchestratorError>
    where
        I: IntoIterator<Item = TaskDraft>,
    {
        if self.state != QueueState::Empty {
            return Err(OrchestratorError::WorkflowAlreadyActive { state: self.state });
        }
        let tasks = drafts
            .into_iter()
            .enumerate()
            .map(|(idx, draft)| TaskSpec {
                ordinal: idx as u32 + 1,
                description: draft.description,
                status: TaskStatus::Pending,
                checklist: draft.checklist,
                progress: Vec::new(),
                summary: None,
            })
            .collect::<Vec<_>>();
        if tasks.is_empty() {
            return Err(OrchestratorError::EmptyTaskList);
        }

        self.transition(QueueState::Defined)?;
        self.tasks = tasks;
        self.abort_reason = None;
        self.tasks[0].status = TaskStatus::Active;
        self.transition(QueueState::Executing)?;
        Ok(&self.tasks[0])
    }

    pub fn current_task(&self) -> Option<&TaskSpec> {
        self.tasks
            .iter()
            .find(|task| task.status == TaskStatus::Active)
    }

    pub fn active_ordinal(&self) -> Option<u32> {
        self.current_task().map(|task| task.ordinal)
    }

    pub(crate) fn current_task_mut(&mut self) -> Result<&mut TaskSpec, OrchestratorError> {
        self.tasks
            .iter_mut()
            .find(|task| task.status == TaskStatus::Active)
            .ok_or(OrchestratorError::NoActiveTask)
    }

    /// Completes the active task and activates the next pending one, or moves the
    /// queue to `Completed` when none remain.
    pub(crate) fn advance(&mut self) -> Result<Option<&TaskSpec>, OrchestratorError> {
        let index = self.active_index().ok_or(OrchestratorError::NoActiveTask)?;
        let next = self.tasks[index + 1..]
            .iter()
            .position(|task| task.status == TaskStatus::Pending)
            .map(|offset| index + 1 + offset);
        if next.is_none() {
            self.transition(QueueState::Completed)?;
        }
        self.tasks[index].status = TaskStatus::Completed;
        match next {
            Some(next) => {
                self.tasks[next].status = TaskStatus::Active;
                Ok(Some(&self.tasks[next]))
            }
            None => Ok(None),
        }
    }

    /// Marks a pending task after the cursor as skipped; the active task itself
    /// can only leave through `advance`.
    pub fn skip(&mut self, ordinal: u32) -> Result<(), OrchestratorError> {
        let active = self.active_ordinal().ok_or(OrchestratorError::NoActiveTask)?;
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.ordinal == ordinal)
            .ok_or_else(|| OrchestratorError::InvalidTaskSkip {
                ordinal,
                reason: "no such task".to_string(),
            })?;
        if ordinal <= active {
            return Err(OrchestratorError::InvalidTaskSkip {
                ordinal,
                reason: format!("only tasks after the active task {active} can be skipped"),
            });
        }
        if task.status != TaskStatus::Pending {
            return Err(OrchestratorError::InvalidTaskSkip {
                ordinal,
                reason: "task is not pending".to_string(),
            });
        }
        task.status = TaskStatus::Skipped;
        Ok(())
    }

    /// Ends the workflow without advancing; the active task returns to pending.
    pub(crate) fn abort(&mut self, reason: impl Into<String>) -> Result<(), OrchestratorError> {
        self.transition(QueueState::Aborted)?;
        for task in &mut self.tasks {
            if task.status == TaskStatus::Active {
                task.status = TaskStatus::Pending;
            }
        }
        self.abort_reason = Some(reason.into());
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// At most one active task, done tasks form a prefix ending at the cursor,
    /// and the state agrees with the cursor.
    pub fn check_invariants(&self) -> Result<(), String> {
        let active = self
            .tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Active)
            .count();
        if active > 1 {
            return Err(format!("{active} tasks are active"));
        }
        for (idx, task) in self.tasks.iter().enumerate() {
            if task.ordinal != idx as u32 + 1 {
                return Err(format!("task at position {} has ordinal {}", idx + 1, task.ordinal));
            }
        }
        if let Some(index) = self.active_index() {
            if let Some(task) = self.tasks[..index].iter().find(|task| !task.status.is_done()) {
                return Err(format!(
                    "task {} precedes the active task but is not done",
                    task.ordinal
                ));
            }
            if let Some(task) = self.tasks[index + 1..]
                .iter()
                .find(|task| task.status == TaskStatus::Completed)
            {
                return Err(format!(
                    "task {} follows the active task but is completed",
                    task.ordinal
                ));
            }
        }
        let expects_active = self.state == QueueState::Executing;
        if expects_active != (active == 1) {
            return Err(format!(
                "queue state `{}` disagrees with {active} active task(s)",
                self.state
            ));
        }
        if self.state == QueueState::Empty && !self.tasks.is_empty() {
            return Err("empty queue holds tasks".to_string());
        }
        Ok(())
    }

    fn active_index(&self) -> Option<usize> {
        self.tasks
            .iter()
            .position(|task| task.status == TaskStatus::Active)
    }

    fn transition(&mut self, next: QueueState) -> Result<(), OrchestratorError> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestratorError::InvalidQueueTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}
