//! Circuit breaker: bounds retries and resource spend, detects stuck
//! states, and decides when the system should halt or escalate.
//!
//! The health check runs before every scheduling decision. Conditions are
//! evaluated in a fixed priority order (budget first, then the blocked
//! threshold, then completion) and the first match wins.

use serde_json::json;

use crate::config::Config;
use crate::store::StateStore;
use crate::task::TaskStatus;
use crate::{olog, Result};

/// Overall system health, as decided by the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemHealth {
    /// Keep scheduling.
    Running,
    /// Cumulative token usage reached the configured budget.
    BudgetExceeded,
    /// Too many blocked tasks, or all tasks terminal with some blocked.
    NeedsHuman,
    /// Every task completed.
    Completed,
}

impl std::fmt::Display for SystemHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemHealth::Running => write!(f, "running"),
            SystemHealth::BudgetExceeded => write!(f, "budget_exceeded"),
            SystemHealth::NeedsHuman => write!(f, "needs_human"),
            SystemHealth::Completed => write!(f, "completed"),
        }
    }
}

/// A health verdict with the triggering reason and structured counters.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub health: SystemHealth,
    pub reason: String,
    pub details: serde_json::Value,
}

/// Retry bounding and halt policy over the persisted state.
///
/// Limits come from an injected [`Config`], never from ambient process
/// state, so thresholds are independently testable.
pub struct CircuitBreaker<'a> {
    store: &'a StateStore,
    config: Config,
}

impl<'a> CircuitBreaker<'a> {
    pub fn new(store: &'a StateStore, config: Config) -> Self {
        Self { store, config }
    }

    /// Evaluate all halt conditions and return the current verdict.
    ///
    /// Budget and blocked-threshold verdicts write a checkpoint before
    /// reporting, so a later resume starts from a recorded snapshot.
    pub fn check(&self) -> Result<HealthReport> {
        let total_tokens = self.store.total_tokens()?;
        if total_tokens >= self.config.max_token_budget {
            self.store.append_checkpoint("Budget exceeded - stopping")?;
            return Ok(HealthReport {
                health: SystemHealth::BudgetExceeded,
                reason: format!(
                    "Token budget exceeded: {} / {}",
                    total_tokens, self.config.max_token_budget
                ),
                details: json!({
                    "tokens_used": total_tokens,
                    "budget": self.config.max_token_budget,
                }),
            });
        }

        let blocked = self.store.blocked_count()?;
        if blocked >= self.config.max_blocked_tasks {
            self.store
                .append_checkpoint(&format!("{blocked} tasks blocked - needs human review"))?;
            return Ok(HealthReport {
                health: SystemHealth::NeedsHuman,
                reason: format!("Too many blocked tasks: {blocked}"),
                details: json!({
                    "blocked_tasks": blocked,
                    "threshold": self.config.max_blocked_tasks,
                }),
            });
        }

        let tasks = self.store.list_tasks()?;
        if !tasks.is_empty() {
            let completed = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count();
            let blocked = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Blocked)
                .count();
            let total = tasks.len();

            if completed + blocked == total {
                if blocked == 0 {
                    return Ok(HealthReport {
                        health: SystemHealth::Completed,
                        reason: "All tasks completed".to_string(),
                        details: json!({ "completed": completed, "total": total }),
                    });
                }
                return Ok(HealthReport {
                    health: SystemHealth::NeedsHuman,
                    reason: format!("All tasks processed but {blocked} are blocked"),
                    details: json!({
                        "completed": completed,
                        "blocked": blocked,
                        "total": total,
                    }),
                });
            }
        }

        Ok(HealthReport {
            health: SystemHealth::Running,
            reason: "System operating normally".to_string(),
            details: json!({
                "tokens_used": total_tokens,
                "blocked_tasks": blocked,
            }),
        })
    }

    /// Record one task failure and decide retry vs. block.
    ///
    /// Increments the persisted retry counter every call, so callers must
    /// invoke this exactly once per failure. Returns `true` while the new
    /// count is below the configured retry ceiling.
    pub fn handle_task_failure(&self, task_id: i64) -> Result<bool> {
        let retries = self.store.increment_retries(task_id)?;
        let task = self.store.get_task(task_id)?;

        if retries >= self.config.max_task_retries {
            self.store.append_log(
                "task_blocked",
                &format!("Task '{}' blocked after {} retries", task.name, retries),
                task.assigned_agent.as_deref(),
            )?;
            olog!("Task '{}' exhausted retries ({retries})", task.name);
            return Ok(false);
        }

        self.store.append_log(
            "task_retry",
            &format!(
                "Task '{}' retry {}/{}",
                task.name, retries, self.config.max_task_retries
            ),
            task.assigned_agent.as_deref(),
        )?;
        Ok(true)
    }

    /// Whether the periodic checkpoint cadence fires at this completed
    /// count. Independent of the checkpoints `check()` itself writes.
    pub fn should_checkpoint(&self, completed: u32) -> bool {
        completed > 0 && completed % self.config.checkpoint_interval == 0
    }
}
