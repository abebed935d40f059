//! The coordinator drives the work/review cycle.
//!
//! One control loop, one task in flight at a time. Each pass asks the
//! circuit breaker for system health, asks the scheduler for the next
//! eligible task, drives the Worker and Reviewer capabilities, and folds
//! the outcome back into the store. Capability failures are never fatal to
//! the loop; they become retry/block decisions for the single task. Only
//! store I/O errors and policy halts stop the run.

use std::time::Duration;

use crate::capability::{Reviewer, Verdict, Worker};
use crate::config::Config;
use crate::health::{CircuitBreaker, HealthReport, SystemHealth};
use crate::scheduler::Scheduler;
use crate::store::StateStore;
use crate::task::{AgentRole, AgentStatus, Task, TaskStatus};
use crate::{olog, olog_debug, olog_warn, Error, Result};

/// How long to wait before re-polling when nothing is eligible but tasks
/// are still in flight.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Drives tasks through the lifecycle state machine until the circuit
/// breaker reports a terminal condition.
pub struct Coordinator<'a> {
    store: &'a StateStore,
    config: Config,
    scheduler: Scheduler,
    breaker: CircuitBreaker<'a>,
    worker: Box<dyn Worker>,
    reviewer: Box<dyn Reviewer>,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        store: &'a StateStore,
        config: Config,
        worker: Box<dyn Worker>,
        reviewer: Box<dyn Reviewer>,
    ) -> Self {
        let breaker = CircuitBreaker::new(store, config.clone());
        Self {
            store,
            config,
            scheduler: Scheduler::new(),
            breaker,
            worker,
            reviewer,
        }
    }

    /// Register the configured worker agents and one reviewer agent.
    ///
    /// Registration is an idempotent reset, so this runs on every startup,
    /// fresh or resumed.
    pub fn setup_agents(&self) -> Result<()> {
        for i in 1..=self.config.num_workers {
            self.store
                .register_agent(&format!("worker-{i}"), AgentRole::Worker)?;
        }
        self.store
            .register_agent("reviewer-1", AgentRole::Reviewer)?;
        olog!(
            "Registered {} worker agents and 1 reviewer agent",
            self.config.num_workers
        );
        Ok(())
    }

    /// Reset tasks left in flight by a crashed or interrupted run.
    ///
    /// With a single task in flight at a time, anything still InProgress
    /// or InReview at startup was abandoned mid-cycle; it goes back to
    /// Pending and will be rescheduled.
    pub fn recover_in_flight(&self) -> Result<()> {
        for task in self.store.list_tasks()? {
            if matches!(task.status, TaskStatus::InProgress | TaskStatus::InReview) {
                olog_warn!(
                    "Task '{}' was left {} by a previous run, resetting to pending",
                    task.name,
                    task.status
                );
                self.store
                    .update_task_status(task.id, TaskStatus::Pending, None)?;
                self.store.append_log(
                    "task_recovered",
                    &format!("Task '{}' reset to pending after interrupted run", task.name),
                    task.assigned_agent.as_deref(),
                )?;
            }
        }
        Ok(())
    }

    /// The dependency-respecting order tasks would run in, without
    /// executing anything.
    pub fn plan(&self) -> Result<Vec<Task>> {
        let mut tasks = self.store.list_tasks()?;
        let mut planned: Vec<Task> = Vec::with_capacity(tasks.len());
        // Repeatedly take the scheduler's pick against a simulated
        // completion set, so the preview matches real scheduling.
        loop {
            let Some(next) = self.scheduler.next_pending_task(&tasks) else {
                break;
            };
            let id = next.id;
            planned.push(next.clone());
            for task in &mut tasks {
                if task.id == id {
                    task.status = TaskStatus::Completed;
                }
            }
        }
        Ok(planned)
    }

    /// Run the orchestration loop to a halt condition.
    ///
    /// Returns the final health report; the caller maps it to an exit
    /// code. Store errors propagate immediately.
    pub async fn run(&self) -> Result<HealthReport> {
        self.store
            .append_log("orchestrator_started", "run loop entered", None)?;

        loop {
            let report = self.breaker.check()?;
            if report.health != SystemHealth::Running {
                self.store
                    .append_log("orchestrator_stopped", &report.reason, None)?;
                olog!("Halting: {} ({})", report.reason, report.health);
                return Ok(report);
            }

            let tasks = self.store.list_tasks()?;
            let next = self.scheduler.next_pending_task(&tasks).cloned();
            let Some(task) = next else {
                let in_flight = tasks
                    .iter()
                    .any(|t| matches!(t.status, TaskStatus::InProgress | TaskStatus::InReview));
                if in_flight {
                    olog_debug!("No eligible task, waiting for in-flight work");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
                // An empty store has nothing to do; halt cleanly rather
                // than escalating.
                if tasks.is_empty() {
                    let report = HealthReport {
                        health: SystemHealth::Completed,
                        reason: "No tasks to run".to_string(),
                        details: serde_json::json!({ "total": 0 }),
                    };
                    self.store
                        .append_log("orchestrator_stopped", &report.reason, None)?;
                    return Ok(report);
                }
                // Pending tasks remain but none can ever become eligible:
                // their dependency chains contain a blocked task.
                let stranded = tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Pending)
                    .count();
                let report = HealthReport {
                    health: SystemHealth::NeedsHuman,
                    reason: format!(
                        "No runnable tasks remain: {stranded} pending tasks are gated on blocked dependencies"
                    ),
                    details: serde_json::json!({
                        "stranded_pending": stranded,
                        "blocked": self.store.blocked_count()?,
                    }),
                };
                self.store
                    .append_log("orchestrator_stopped", &report.reason, None)?;
                return Ok(report);
            };

            self.process_task(&task).await?;

            let completed = self.store.completed_count()?;
            if self.breaker.should_checkpoint(completed) {
                self.store
                    .append_checkpoint(&format!("Checkpoint at {completed} completed tasks"))?;
                olog_debug!("Checkpoint created at {completed} completed tasks");
            }
        }
    }

    /// Drive a single task through work and review.
    async fn process_task(&self, task: &Task) -> Result<()> {
        let worker_id = self.pick_worker()?;
        let reviewer_id = self.pick_reviewer()?;

        olog!("Task {} '{}' assigned to {worker_id}", task.id, task.name);
        self.store
            .update_task_status(task.id, TaskStatus::InProgress, Some(&worker_id))?;
        self.store
            .set_agent_status(&worker_id, AgentStatus::Busy, Some(task.id))?;
        self.store.append_log(
            "task_started",
            &format!("Task '{}' assigned to {worker_id}", task.name),
            Some(&worker_id),
        )?;

        let outcome = self.worker.work(task, None).await?;
        self.store.add_agent_tokens(&worker_id, outcome.tokens_used)?;
        self.record_transcript(&worker_id, task.id, "work", &outcome.message)?;

        if !outcome.success {
            olog_warn!("Worker failed on task '{}': {}", task.name, outcome.message);
            self.store.append_log(
                "task_error",
                &format!("Task '{}' error: {}", task.name, outcome.message),
                Some(&worker_id),
            )?;
            return self.handle_worker_failure(task, &worker_id);
        }

        self.store
            .update_task_status(task.id, TaskStatus::InReview, Some(&worker_id))?;
        self.store
            .set_agent_status(&worker_id, AgentStatus::AwaitingReview, Some(task.id))?;

        let review = self.reviewer.review(task, &outcome.message).await?;
        self.store
            .add_agent_tokens(&reviewer_id, review.tokens_used)?;
        self.record_transcript(&reviewer_id, task.id, "review", &review.reason)?;

        match review.verdict {
            Verdict::Accept => self.complete_task(task, &worker_id, "approved"),
            Verdict::Reject => {
                self.fix_cycle(task, &worker_id, &reviewer_id, review.reason)
                    .await
            }
            Verdict::Unclear => {
                // An unclear verdict carries no actionable feedback; treat
                // it as a rejection with a generic reason.
                olog_warn!("Unclear review verdict on task '{}'", task.name);
                self.fix_cycle(task, &worker_id, &reviewer_id, "Review incomplete".to_string())
                    .await
            }
        }
    }

    /// Bounded retry loop after a rejection.
    ///
    /// Each pass consumes one retry from the persisted counter, so total
    /// worker invocations per task never exceed the retry ceiling. This is
    /// deliberately a loop keyed on the stored count, not recursion.
    async fn fix_cycle(
        &self,
        task: &Task,
        worker_id: &str,
        reviewer_id: &str,
        reason: String,
    ) -> Result<()> {
        let mut feedback = reason;
        loop {
            if !self.breaker.handle_task_failure(task.id)? {
                return self.block_task(task, worker_id);
            }

            let retries = self.store.get_task(task.id)?.retries;
            olog!(
                "Task '{}' rejected, retry {retries}/{}",
                task.name,
                self.config.max_task_retries
            );

            let outcome = self.worker.work(task, Some(&feedback)).await?;
            self.store.add_agent_tokens(worker_id, outcome.tokens_used)?;
            self.record_transcript(worker_id, task.id, "work", &outcome.message)?;
            if !outcome.success {
                // The fix attempt itself failed; consume another retry.
                self.store.append_log(
                    "task_error",
                    &format!("Task '{}' fix attempt failed: {}", task.name, outcome.message),
                    Some(worker_id),
                )?;
                continue;
            }

            let review = self.reviewer.review(task, &outcome.message).await?;
            self.store
                .add_agent_tokens(reviewer_id, review.tokens_used)?;
            self.record_transcript(reviewer_id, task.id, "review", &review.reason)?;

            match review.verdict {
                Verdict::Accept => {
                    return self.complete_task(task, worker_id, "approved after retry")
                }
                Verdict::Reject => feedback = review.reason,
                Verdict::Unclear => feedback = "Review incomplete".to_string(),
            }
        }
    }

    /// Worker could not produce a result at all: consume a retry and
    /// either put the task back in the queue or block it.
    fn handle_worker_failure(&self, task: &Task, worker_id: &str) -> Result<()> {
        if self.breaker.handle_task_failure(task.id)? {
            self.store
                .update_task_status(task.id, TaskStatus::Pending, None)?;
            self.store
                .set_agent_status(worker_id, AgentStatus::Idle, None)?;
            Ok(())
        } else {
            self.block_task(task, worker_id)
        }
    }

    fn complete_task(&self, task: &Task, worker_id: &str, note: &str) -> Result<()> {
        olog!("Task '{}' completed ({note})", task.name);
        self.store
            .update_task_status(task.id, TaskStatus::Completed, Some(worker_id))?;
        self.store
            .set_agent_status(worker_id, AgentStatus::Idle, None)?;
        self.store.append_log(
            "task_completed",
            &format!("Task '{}' {note}", task.name),
            Some(worker_id),
        )?;
        Ok(())
    }

    /// Append one entry to an agent's persisted interaction transcript.
    fn record_transcript(&self, agent_id: &str, task_id: i64, kind: &str, text: &str) -> Result<()> {
        let mut transcript = self.store.load_transcript(agent_id)?;
        if let Some(entries) = transcript.as_array_mut() {
            entries.push(serde_json::json!({
                "task": task_id,
                "kind": kind,
                "text": text,
            }));
        }
        self.store.save_transcript(agent_id, &transcript)
    }

    fn block_task(&self, task: &Task, worker_id: &str) -> Result<()> {
        olog_warn!("Task '{}' blocked", task.name);
        self.store
            .update_task_status(task.id, TaskStatus::Blocked, Some(worker_id))?;
        self.store
            .set_agent_status(worker_id, AgentStatus::Idle, None)?;
        Ok(())
    }

    /// First idle worker, falling back to the first registered worker.
    /// Concurrency limiting is advisory with one task in flight.
    fn pick_worker(&self) -> Result<String> {
        let agents = self.store.list_agents()?;
        if let Some(agent) = self.scheduler.idle_worker(&agents) {
            return Ok(agent.id.clone());
        }
        agents
            .iter()
            .find(|a| a.role == AgentRole::Worker)
            .map(|a| a.id.clone())
            .ok_or_else(|| Error::Validation("no worker agents registered".to_string()))
    }

    fn pick_reviewer(&self) -> Result<String> {
        self.store
            .list_agents()?
            .iter()
            .find(|a| a.role == AgentRole::Reviewer)
            .map(|a| a.id.clone())
            .ok_or_else(|| Error::Validation("no reviewer agents registered".to_string()))
    }

    /// Final summary counters for halt reporting.
    pub fn summary(&self) -> Result<RunSummary> {
        let tasks = self.store.list_tasks()?;
        Ok(RunSummary {
            total: tasks.len() as u32,
            completed: self.store.completed_count()?,
            blocked: self.store.blocked_count()?,
            pending: self.store.count_by_status(TaskStatus::Pending)?,
            total_tokens: self.store.total_tokens()?,
        })
    }
}

/// Aggregate counters printed when a run halts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: u32,
    pub completed: u32,
    pub blocked: u32,
    pub pending: u32,
    pub total_tokens: i64,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tasks completed: {}/{}", self.completed, self.total)?;
        writeln!(f, "Tasks blocked:   {}", self.blocked)?;
        writeln!(f, "Tasks pending:   {}", self.pending)?;
        write!(f, "Total tokens:    {}", self.total_tokens)
    }
}
