//! Persisted data model: tasks, agents, checkpoints, and event log entries.
//!
//! These types are disposable in-memory views of rows owned by the
//! [`StateStore`](crate::store::StateStore). Mutable fields (statuses,
//! retry counts, token totals) must be re-fetched from the store before
//! being trusted; the store is the only durable truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
///
/// Transitions are driven exclusively by the coordinator:
///
/// Pending -> InProgress -> InReview -> Completed
/// with retry loops back to Pending/InProgress, and Blocked as the
/// terminal failure state once the retry budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be scheduled.
    Pending,
    /// A worker is producing a result.
    InProgress,
    /// A reviewer is judging the worker's result.
    InReview,
    /// Retry budget exhausted; needs human resolution.
    Blocked,
    /// Accepted by review.
    Completed,
}

impl TaskStatus {
    /// Whether this status is terminal for the task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Blocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::InReview => "in_review",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "in_review" => Some(TaskStatus::InReview),
            "blocked" => Some(TaskStatus::Blocked),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of work with a dependency set and a lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Monotonically increasing identity assigned by the store.
    pub id: i64,
    pub name: String,
    /// Component tag used for grouping in plans and status output.
    pub component: String,
    pub description: String,
    pub status: TaskStatus,
    /// Non-owning reference to the agent currently (or last) assigned.
    pub assigned_agent: Option<String>,
    pub retries: u32,
    /// Ids of tasks that must be Completed before this one is eligible.
    /// Must only reference previously created tasks.
    pub dependencies: Vec<i64>,
    pub created_at: DateTime<Utc>,
    /// Stamped only on transition to Completed.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Role of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Worker,
    Reviewer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Worker => "worker",
            AgentRole::Reviewer => "reviewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "worker" => Some(AgentRole::Worker),
            "reviewer" => Some(AgentRole::Reviewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Orchestration-visible status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    AwaitingReview,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::AwaitingReview => "awaiting_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(AgentStatus::Idle),
            "busy" => Some(AgentStatus::Busy),
            "awaiting_review" => Some(AgentStatus::AwaitingReview),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered worker or reviewer agent.
///
/// Registered once at startup; status is the only orchestration-visible
/// mutable field. The transcript blob is owned by the capability behind
/// the agent and is round-tripped opaquely by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub current_task: Option<i64>,
    /// Cumulative resource usage, accumulated atomically by the store.
    pub tokens_used: i64,
    /// Opaque interaction log owned by the Worker/Reviewer capability.
    pub transcript: serde_json::Value,
}

/// Immutable snapshot of aggregate progress, appended for recovery/audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    pub completed_tasks: u32,
    pub total_tokens: i64,
    pub summary: String,
}

/// Append-only event log entry. Used for diagnosis, never for control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<String>,
    pub action: String,
    pub detail: String,
}

/// Catalog input tuple for creating a task at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub component: String,
    pub description: String,
    /// 1-based ids of earlier catalog entries this task depends on.
    #[serde(default)]
    pub deps: Vec<i64>,
}
