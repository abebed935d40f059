//! Worker and Reviewer capabilities.
//!
//! The orchestrator core never talks to a model or a sandbox directly. It
//! drives two pluggable capabilities: a `Worker` that turns a task
//! description into a completion result, and a `Reviewer` that judges a
//! completion result. The command-backed implementations here spawn a
//! configured external binary per invocation, pass the prompt on argv, and
//! parse a JSON object from stdout. Anything the core needs to know about
//! an invocation is captured in the outcome types; everything else stays
//! opaque.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::task::Task;
use crate::{olog_debug, olog_warn, Error, Result};

/// Result of one worker invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkOutcome {
    /// Whether the worker produced a usable result.
    pub success: bool,
    /// Completion message on success, error description on failure.
    pub message: String,
    /// Tokens (or equivalent compute units) consumed by the invocation.
    pub tokens_used: i64,
}

/// Review verdict as a closed set of variants rather than string dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
    /// The reviewer signaled neither accept nor reject. Callers treat this
    /// the same as a rejection.
    Unclear,
}

/// Result of one reviewer invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub verdict: Verdict,
    pub reason: String,
    pub tokens_used: i64,
}

/// Performs a unit of work given a task description.
///
/// Implementations must be safe to call repeatedly on the same task with
/// different feedback. A capability-level failure (the worker could not
/// produce a result at all) is reported as `success: false`, not as an
/// `Err` - only store/infrastructure faults are errors.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn work(&self, task: &Task, feedback: Option<&str>) -> Result<WorkOutcome>;
}

/// Judges a completion result for a task.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, task: &Task, completion: &str) -> Result<ReviewOutcome>;
}

/// JSON payload expected on a capability command's stdout.
#[derive(Debug, Deserialize)]
struct RawCapabilityOutput {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    tokens_used: Option<i64>,
}

/// Shared process driver for the command-backed capabilities.
///
/// Spawns the binary with the prompt as the final argument and waits for
/// completion under a wall-clock timeout. A timeout, spawn failure, or
/// non-zero exit is a capability failure surfaced to the caller as data,
/// never a crash of the orchestration loop.
#[derive(Debug, Clone)]
struct CommandRunner {
    binary: PathBuf,
    timeout: Duration,
}

enum Invocation {
    /// Parsed JSON from stdout.
    Output(RawCapabilityOutput),
    /// The command could not produce usable output.
    Failed(String),
}

impl CommandRunner {
    /// Resolve the binary on PATH. Missing binary is a fail-fast
    /// configuration error, caught before the loop starts.
    fn new(command: &str, timeout: Duration) -> Result<Self> {
        let binary =
            which::which(command).map_err(|_| Error::BinaryNotFound(command.to_string()))?;
        Ok(Self { binary, timeout })
    }

    async fn invoke(&self, args: &[&str], prompt: &str) -> Result<Invocation> {
        let result = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .args(args)
                .arg(prompt)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                olog_warn!("capability spawn failed: {err}");
                return Ok(Invocation::Failed(format!("failed to spawn: {err}")));
            }
            Err(_) => {
                olog_warn!(
                    "capability {} timed out after {:?}",
                    self.binary.display(),
                    self.timeout
                );
                return Ok(Invocation::Failed(format!(
                    "timed out after {:?}",
                    self.timeout
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        olog_debug!("capability exit={:?}", output.status.code());

        if let Ok(raw) = serde_json::from_str::<RawCapabilityOutput>(stdout.trim()) {
            return Ok(Invocation::Output(raw));
        }

        let detail = if stderr.trim().is_empty() {
            format!(
                "exit code {} with unparseable output",
                output.status.code().unwrap_or(-1)
            )
        } else {
            stderr.trim().to_string()
        };
        Ok(Invocation::Failed(detail))
    }
}

/// Worker capability backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandWorker {
    runner: CommandRunner,
}

impl CommandWorker {
    pub fn new(command: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            runner: CommandRunner::new(command, timeout)?,
        })
    }
}

#[async_trait]
impl Worker for CommandWorker {
    async fn work(&self, task: &Task, feedback: Option<&str>) -> Result<WorkOutcome> {
        let prompt = match feedback {
            Some(feedback) => format!(
                "Task: {}\n\n{}\n\nYour previous attempt was rejected. \
                 Address this feedback:\n{}",
                task.name, task.description, feedback
            ),
            None => format!("Task: {}\n\n{}", task.name, task.description),
        };

        match self.runner.invoke(&["work"], &prompt).await? {
            Invocation::Output(raw) => Ok(WorkOutcome {
                success: raw.success.unwrap_or(false),
                message: raw.message.unwrap_or_default(),
                tokens_used: raw.tokens_used.unwrap_or(0),
            }),
            Invocation::Failed(detail) => Ok(WorkOutcome {
                success: false,
                message: detail,
                tokens_used: 0,
            }),
        }
    }
}

/// Reviewer capability backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandReviewer {
    runner: CommandRunner,
}

impl CommandReviewer {
    pub fn new(command: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            runner: CommandRunner::new(command, timeout)?,
        })
    }
}

#[async_trait]
impl Reviewer for CommandReviewer {
    async fn review(&self, task: &Task, completion: &str) -> Result<ReviewOutcome> {
        let prompt = format!(
            "Task: {}\n\n{}\n\nCompletion report:\n{}\n\n\
             Respond with a JSON object containing \"verdict\" \
             (\"accept\" or \"reject\"), \"reason\", and \"tokens_used\".",
            task.name, task.description, completion
        );

        match self.runner.invoke(&["review"], &prompt).await? {
            Invocation::Output(raw) => {
                let verdict = match raw.verdict.as_deref() {
                    Some("accept") | Some("approve") => Verdict::Accept,
                    Some("reject") => Verdict::Reject,
                    _ => Verdict::Unclear,
                };
                Ok(ReviewOutcome {
                    verdict,
                    reason: raw.reason.or(raw.message).unwrap_or_default(),
                    tokens_used: raw.tokens_used.unwrap_or(0),
                })
            }
            // A reviewer that cannot produce a verdict is folded into
            // Unclear, which callers treat as a rejection.
            Invocation::Failed(detail) => Ok(ReviewOutcome {
                verdict: Verdict::Unclear,
                reason: detail,
                tokens_used: 0,
            }),
        }
    }
}
