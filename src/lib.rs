pub mod capability;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod log;
pub mod scheduler;
pub mod store;
pub mod task;

pub use capability::{ReviewOutcome, Reviewer, Verdict, WorkOutcome, Worker};
pub use config::Config;
pub use coordinator::{Coordinator, RunSummary};
pub use error::{Error, Result};
pub use health::{CircuitBreaker, HealthReport, SystemHealth};
pub use store::StateStore;
pub use task::{Agent, AgentRole, AgentStatus, Task, TaskStatus};
