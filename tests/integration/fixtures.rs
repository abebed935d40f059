//! Test fixtures for integration tests.
//!
//! Provides scripted Worker/Reviewer capabilities with call counters, and
//! helpers for building catalogs and configs against a temporary store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use overseer::capability::{ReviewOutcome, Reviewer, Verdict, WorkOutcome, Worker};
use overseer::catalog::Catalog;
use overseer::config::Config;
use overseer::task::{Task, TaskSpec};
use overseer::Result;

/// Tokens charged per scripted worker invocation.
pub const WORK_TOKENS: i64 = 100;
/// Tokens charged per scripted review invocation.
pub const REVIEW_TOKENS: i64 = 10;

/// A worker that replays a scripted sequence of outcomes, then keeps
/// succeeding. Counts invocations.
pub struct ScriptedWorker {
    script: Mutex<VecDeque<WorkOutcome>>,
    pub calls: Arc<AtomicUsize>,
    /// Task ids in invocation order, for asserting scheduling decisions.
    pub seen: Arc<Mutex<Vec<i64>>>,
}

impl ScriptedWorker {
    pub fn always_succeeds() -> Self {
        Self::with_script(vec![])
    }

    pub fn with_script(outcomes: Vec<WorkOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn work(&self, task: &Task, feedback: Option<&str>) -> Result<WorkOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(task.id);
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return Ok(outcome);
        }
        let message = match feedback {
            Some(feedback) => format!("reworked '{}' after: {feedback}", task.name),
            None => format!("completed '{}'", task.name),
        };
        Ok(WorkOutcome {
            success: true,
            message,
            tokens_used: WORK_TOKENS,
        })
    }
}

/// A reviewer that replays a scripted sequence of verdicts, then keeps
/// accepting. Counts invocations.
pub struct ScriptedReviewer {
    script: Mutex<VecDeque<ReviewOutcome>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedReviewer {
    pub fn always_accepts() -> Self {
        Self::with_script(vec![])
    }

    pub fn always_rejects() -> Self {
        // More rejections than any bounded fix cycle can consume.
        Self::with_script(vec![reject("not good enough"); 64])
    }

    pub fn with_script(outcomes: Vec<ReviewOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn review(&self, _task: &Task, _completion: &str) -> Result<ReviewOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return Ok(outcome);
        }
        Ok(ReviewOutcome {
            verdict: Verdict::Accept,
            reason: "approved".to_string(),
            tokens_used: REVIEW_TOKENS,
        })
    }
}

pub fn work_failure(message: &str) -> WorkOutcome {
    WorkOutcome {
        success: false,
        message: message.to_string(),
        tokens_used: WORK_TOKENS,
    }
}

pub fn reject(reason: &str) -> ReviewOutcome {
    ReviewOutcome {
        verdict: Verdict::Reject,
        reason: reason.to_string(),
        tokens_used: REVIEW_TOKENS,
    }
}

pub fn unclear() -> ReviewOutcome {
    ReviewOutcome {
        verdict: Verdict::Unclear,
        reason: String::new(),
        tokens_used: REVIEW_TOKENS,
    }
}

/// A small browser-build-flavored catalog: one root, two parallel
/// branches, and a join task.
pub fn diamond_catalog() -> Catalog {
    Catalog::from_specs(vec![
        spec("project setup", "core", &[]),
        spec("url bar", "ui", &[1]),
        spec("http client", "networking", &[1]),
        spec("integration", "integration", &[2, 3]),
    ])
    .expect("diamond catalog is a valid DAG")
}

pub fn spec(name: &str, component: &str, deps: &[i64]) -> TaskSpec {
    TaskSpec {
        name: name.to_string(),
        component: component.to_string(),
        description: format!("{name} description"),
        deps: deps.to_vec(),
    }
}

/// Config with limits small enough to exercise halt paths quickly.
pub fn test_config() -> Config {
    Config {
        max_token_budget: 1_000_000,
        max_task_retries: 3,
        max_blocked_tasks: 3,
        checkpoint_interval: 2,
        num_workers: 2,
        ..Config::default()
    }
}
