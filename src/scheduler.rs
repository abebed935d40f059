//! Dependency-aware task selection.
//!
//! The scheduler is stateless: it operates on snapshots fetched from the
//! store each pass and recomputes dependency satisfaction every call.
//! There is no cached ready-count to fall out of sync; a task gated on an
//! unfinished dependency is simply considered again on the next pass.

use std::collections::HashMap;

use crate::task::{Agent, AgentRole, AgentStatus, Task, TaskStatus};

/// Selects the next eligible task and an idle worker to run it.
#[derive(Debug, Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Self {
        Self
    }

    /// The first Pending task, in creation order, whose every dependency is
    /// Completed in the given snapshot. Returns `None` when nothing is
    /// eligible; the caller distinguishes "tasks still in flight" from
    /// "nothing left" by inspecting the same snapshot.
    ///
    /// Cycles are not detected here; the catalog loader guarantees a DAG
    /// before any task is created.
    pub fn next_pending_task<'a>(&self, tasks: &'a [Task]) -> Option<&'a Task> {
        let by_id: HashMap<i64, TaskStatus> = tasks.iter().map(|t| (t.id, t.status)).collect();
        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .find(|t| {
                t.dependencies
                    .iter()
                    .all(|dep| by_id.get(dep) == Some(&TaskStatus::Completed))
            })
    }

    /// The first Idle worker in registration order.
    ///
    /// Advisory only: the coordinator runs a single task at a time and may
    /// fall back to reusing a worker when none reports idle.
    pub fn idle_worker<'a>(&self, agents: &'a [Agent]) -> Option<&'a Agent> {
        agents
            .iter()
            .find(|a| a.role == AgentRole::Worker && a.status == AgentStatus::Idle)
    }
}
