//! SQLite-backed persistent state: the single source of truth.
//!
//! The store owns all persisted entities (tasks, agents, checkpoints, and
//! the append-only event log). Every mutation commits before the call
//! returns; rusqlite runs in autocommit mode so there are no batched or
//! deferred writes. Any I/O error is surfaced to the caller as
//! [`Error::Store`](crate::Error) and is fatal to the operation; the
//! store never silently drops a write.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::task::{Agent, AgentRole, AgentStatus, Checkpoint, LogEntry, Task, TaskStatus};
use crate::{olog_debug, Error, Result};

/// Durable, crash-recoverable store for orchestrator state.
///
/// A single connection behind a mutex: the reference design runs one
/// control loop, and SQLite serializes writers anyway. Status transitions
/// go through single UPDATE statements, so they are applied atomically
/// rather than read-modify-write.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (or create) the store at the given path and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        olog_debug!("StateStore::open path={}", path.display());
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                component TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                assigned_agent TEXT,
                retries INTEGER NOT NULL DEFAULT 0,
                dependencies TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'idle',
                current_task INTEGER,
                tokens_used INTEGER NOT NULL DEFAULT 0,
                transcript TEXT NOT NULL DEFAULT '[]',
                registered_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                completed_tasks INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                summary TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                agent_id TEXT,
                action TEXT NOT NULL,
                detail TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // Task operations

    /// Create a task and return its monotonically increasing id.
    pub fn create_task(
        &self,
        name: &str,
        component: &str,
        description: &str,
        dependencies: &[i64],
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO tasks (name, component, description, dependencies, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                component,
                description,
                serde_json::to_string(dependencies)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_task(&self, id: i64) -> Result<Task> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![id], row_to_task)
            .optional()?
            .ok_or(Error::TaskNotFound(id))
    }

    /// All tasks in creation order.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM tasks ORDER BY id")?;
        let rows = stmt.query_map([], row_to_task)?;
        rows.map(|r| r.map_err(Error::from)).collect()
    }

    /// Update a task's status and assigned agent. The completion timestamp
    /// is stamped only on transition to Completed and left untouched
    /// otherwise.
    pub fn update_task_status(
        &self,
        id: i64,
        status: TaskStatus,
        assigned_agent: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        let changed = if status == TaskStatus::Completed {
            conn.execute(
                "UPDATE tasks SET status = ?1, assigned_agent = ?2, completed_at = ?3
                 WHERE id = ?4",
                params![status.as_str(), assigned_agent, Utc::now().to_rfc3339(), id],
            )?
        } else {
            conn.execute(
                "UPDATE tasks SET status = ?1, assigned_agent = ?2 WHERE id = ?3",
                params![status.as_str(), assigned_agent, id],
            )?
        };
        if changed == 0 {
            return Err(Error::TaskNotFound(id));
        }
        Ok(())
    }

    /// Atomically increment a task's retry counter and return the new count.
    pub fn increment_retries(&self, id: i64) -> Result<u32> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE tasks SET retries = retries + 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(Error::TaskNotFound(id));
        }
        let retries: u32 =
            conn.query_row("SELECT retries FROM tasks WHERE id = ?1", params![id], |r| {
                r.get(0)
            })?;
        Ok(retries)
    }

    pub fn count_by_status(&self, status: TaskStatus) -> Result<u32> {
        let conn = self.lock();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn completed_count(&self) -> Result<u32> {
        self.count_by_status(TaskStatus::Completed)
    }

    pub fn blocked_count(&self) -> Result<u32> {
        self.count_by_status(TaskStatus::Blocked)
    }

    // Agent operations

    /// Register an agent. Idempotent upsert: re-registering an existing
    /// agent resets it to Idle with zero usage and an empty transcript.
    pub fn register_agent(&self, id: &str, role: AgentRole) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO agents
                 (id, role, status, current_task, tokens_used, transcript, registered_at)
             VALUES (?1, ?2, 'idle', NULL, 0, '[]', ?3)",
            params![id, role.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_agent(&self, id: &str) -> Result<Agent> {
        let conn = self.lock();
        conn.query_row(
            "SELECT * FROM agents WHERE id = ?1",
            params![id],
            row_to_agent,
        )
        .optional()?
        .ok_or_else(|| Error::AgentNotFound(id.to_string()))
    }

    /// All agents in registration order.
    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM agents ORDER BY registered_at, id")?;
        let rows = stmt.query_map([], row_to_agent)?;
        rows.map(|r| r.map_err(Error::from)).collect()
    }

    pub fn set_agent_status(
        &self,
        id: &str,
        status: AgentStatus,
        current_task: Option<i64>,
    ) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE agents SET status = ?1, current_task = ?2 WHERE id = ?3",
            params![status.as_str(), current_task, id],
        )?;
        if changed == 0 {
            return Err(Error::AgentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Atomically accumulate token usage for an agent.
    pub fn add_agent_tokens(&self, id: &str, tokens: i64) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE agents SET tokens_used = tokens_used + ?1 WHERE id = ?2",
            params![tokens, id],
        )?;
        if changed == 0 {
            return Err(Error::AgentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Sum of token usage across all agents. Zero when no agents exist.
    pub fn total_tokens(&self) -> Result<i64> {
        let conn = self.lock();
        let total: Option<i64> =
            conn.query_row("SELECT SUM(tokens_used) FROM agents", [], |r| r.get(0))?;
        Ok(total.unwrap_or(0))
    }

    /// Persist the opaque interaction transcript for an agent.
    pub fn save_transcript(&self, id: &str, transcript: &serde_json::Value) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE agents SET transcript = ?1 WHERE id = ?2",
            params![serde_json::to_string(transcript)?, id],
        )?;
        if changed == 0 {
            return Err(Error::AgentNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn load_transcript(&self, id: &str) -> Result<serde_json::Value> {
        let conn = self.lock();
        let raw: String = conn
            .query_row(
                "SELECT transcript FROM agents WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::AgentNotFound(id.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    // Checkpoint operations

    /// Append an immutable checkpoint snapshotting the current completed
    /// count and token total.
    pub fn append_checkpoint(&self, summary: &str) -> Result<()> {
        let completed = self.completed_count()?;
        let total_tokens = self.total_tokens()?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO checkpoints (timestamp, completed_tasks, total_tokens, summary)
             VALUES (?1, ?2, ?3, ?4)",
            params![Utc::now().to_rfc3339(), completed, total_tokens, summary],
        )?;
        Ok(())
    }

    pub fn latest_checkpoint(&self) -> Result<Option<Checkpoint>> {
        let conn = self.lock();
        let cp = conn
            .query_row(
                "SELECT timestamp, completed_tasks, total_tokens, summary
                 FROM checkpoints ORDER BY id DESC LIMIT 1",
                [],
                |r| {
                    Ok(Checkpoint {
                        timestamp: parse_timestamp(r.get::<_, String>(0)?)?,
                        completed_tasks: r.get(1)?,
                        total_tokens: r.get(2)?,
                        summary: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(cp)
    }

    // Event log

    /// Append to the durable event log.
    pub fn append_log(&self, action: &str, detail: &str, agent_id: Option<&str>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO logs (timestamp, agent_id, action, detail) VALUES (?1, ?2, ?3, ?4)",
            params![Utc::now().to_rfc3339(), agent_id, action, detail],
        )?;
        Ok(())
    }

    /// The most recent `limit` log entries, newest first.
    pub fn recent_logs(&self, limit: u32) -> Result<Vec<LogEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, agent_id, action, detail
             FROM logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |r| {
            Ok(LogEntry {
                timestamp: parse_timestamp(r.get::<_, String>(0)?)?,
                agent_id: r.get(1)?,
                action: r.get(2)?,
                detail: r.get(3)?,
            })
        })?;
        rows.map(|r| r.map_err(Error::from)).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means a panic mid-statement; continuing with the
        // same connection is still sound for SQLite, so recover the guard.
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status_raw: String = row.get("status")?;
    let deps_raw: String = row.get("dependencies")?;
    Ok(Task {
        id: row.get("id")?,
        name: row.get("name")?,
        component: row.get("component")?,
        description: row.get("description")?,
        status: TaskStatus::parse(&status_raw).ok_or_else(|| invalid_column("status"))?,
        assigned_agent: row.get("assigned_agent")?,
        retries: row.get("retries")?,
        dependencies: serde_json::from_str(&deps_raw)
            .map_err(|_| invalid_column("dependencies"))?,
        created_at: parse_timestamp(row.get::<_, String>("created_at")?)?,
        completed_at: row
            .get::<_, Option<String>>("completed_at")?
            .map(parse_timestamp)
            .transpose()?,
    })
}

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let role_raw: String = row.get("role")?;
    let status_raw: String = row.get("status")?;
    let transcript_raw: String = row.get("transcript")?;
    Ok(Agent {
        id: row.get("id")?,
        role: AgentRole::parse(&role_raw).ok_or_else(|| invalid_column("role"))?,
        status: AgentStatus::parse(&status_raw).ok_or_else(|| invalid_column("status"))?,
        current_task: row.get("current_task")?,
        tokens_used: row.get("tokens_used")?,
        transcript: serde_json::from_str(&transcript_raw)
            .map_err(|_| invalid_column("transcript"))?,
    })
}

fn parse_timestamp(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid_column("timestamp"))
}

fn invalid_column(name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnName(name.to_string())
}
