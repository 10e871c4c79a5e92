//! Agent execution data model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution identifier.
pub type ExecutionId = String;

/// Coarse-grained lifecycle state of an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Not set. In a status update this means "leave the phase alone".
    #[default]
    Unspecified,
    /// Execution is queued but the workflow has not picked it up yet.
    Pending,
    /// Agent is working.
    Running,
    /// Execution completed successfully.
    Completed,
    /// Execution failed.
    Failed,
    /// Execution was cancelled.
    Cancelled,
}

impl ExecutionPhase {
    /// Whether no further state changes are expected after this phase.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Human,
    Ai,
    Tool,
    System,
}

/// One entry of the conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl AgentMessage {
    /// Create a message without a timestamp.
    #[must_use]
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// Tool call status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// A tool invocation made by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Work delegated to a sub-agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubExecution {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phase: ExecutionPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Todo item status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// An entry of the agent's plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
}

/// Resource metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub id: ExecutionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    /// Creation timestamp (Unix epoch seconds).
    #[serde(default)]
    pub created_at: i64,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: i64,
}

/// What the caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSpec {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub message: String,
}

/// Observed state. Also used as the partial payload of a status update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    #[serde(default)]
    pub phase: ExecutionPhase,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub sub_executions: Vec<SubExecution>,
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl ExecutionStatus {
    /// Merge a partial status into this one.
    ///
    /// Repeated fields are replaced wholesale when the update carries a
    /// non-empty list, never appended per element. The phase is overwritten
    /// unless the update leaves it `Unspecified`. Optional strings are
    /// overwritten when present and non-empty.
    pub fn merge_from(&mut self, update: &Self) {
        if !update.messages.is_empty() {
            self.messages.clone_from(&update.messages);
        }
        if !update.tool_calls.is_empty() {
            self.tool_calls.clone_from(&update.tool_calls);
        }
        if !update.sub_executions.is_empty() {
            self.sub_executions.clone_from(&update.sub_executions);
        }
        if !update.todos.is_empty() {
            self.todos.clone_from(&update.todos);
        }
        if update.phase != ExecutionPhase::Unspecified {
            self.phase = update.phase;
        }
        merge_non_empty(&mut self.error, update.error.as_ref());
        merge_non_empty(&mut self.started_at, update.started_at.as_ref());
        merge_non_empty(&mut self.completed_at, update.completed_at.as_ref());
    }
}

fn merge_non_empty(target: &mut Option<String>, incoming: Option<&String>) {
    if let Some(value) = incoming.filter(|v| !v.is_empty()) {
        *target = Some(value.clone());
    }
}

/// A long-running unit of agent work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    #[serde(default)]
    pub metadata: ResourceMetadata,
    #[serde(default)]
    pub spec: ExecutionSpec,
    #[serde(default)]
    pub status: ExecutionStatus,
}

impl Execution {
    /// Execution id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> ExecutionPhase {
        self.status.phase
    }
}
