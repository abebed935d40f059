use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use overseer::capability::{CommandReviewer, CommandWorker};
use overseer::catalog::Catalog;
use overseer::config::Config;
use overseer::coordinator::Coordinator;
use overseer::health::SystemHealth;
use overseer::store::StateStore;
use overseer::{olog, Result};

/// Exit code for a run that completed every task.
const EXIT_OK: u8 = 0;
/// Exit code for store/configuration errors.
const EXIT_ERROR: u8 = 1;
/// Exit code for a budget-exceeded halt.
const EXIT_BUDGET: u8 = 2;
/// Exit code for a human-escalation halt.
const EXIT_NEEDS_HUMAN: u8 = 3;

/// Overseer - dependency-aware orchestrator for worker/reviewer agents
#[derive(Parser, Debug)]
#[command(name = "overseer")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    OVERSEER_DEBUG=1     Enable debug logging (alternative to --debug)")]
struct Cli {
    /// Enable debug logging (writes to <data-dir>/overseer.log)
    #[arg(short = 'd', long, global = true)]
    debug: bool,

    /// Data directory holding state.db, overseer.toml, and logs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the orchestration loop until completion or a halt condition
    Run {
        /// Continue from committed state instead of loading the catalog
        #[arg(long)]
        resume: bool,

        /// Print the eligible task order without executing
        #[arg(long)]
        dry_run: bool,

        /// Override the configured token budget
        #[arg(long)]
        budget: Option<i64>,

        /// Task catalog file (required unless resuming)
        #[arg(long, default_value = "catalog.toml")]
        catalog: PathBuf,
    },

    /// Print the dependency-respecting task order
    Plan {
        /// Task catalog file, used when the store is empty
        #[arg(long, default_value = "catalog.toml")]
        catalog: PathBuf,
    },

    /// Show task, agent, and checkpoint state from the store
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let data_dir = match cli
        .data_dir
        .clone()
        .map(Ok)
        .unwrap_or_else(Config::default_data_dir)
    {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(EXIT_ERROR);
        }
    };
    overseer::log::init_with_debug(&data_dir, cli.debug);

    let result = match cli.command {
        Command::Run {
            resume,
            dry_run,
            budget,
            catalog,
        } => run(&data_dir, resume, dry_run, budget, &catalog),
        Command::Plan { catalog } => plan(&data_dir, &catalog),
        Command::Status => status(&data_dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run(
    data_dir: &std::path::Path,
    resume: bool,
    dry_run: bool,
    budget: Option<i64>,
    catalog_path: &std::path::Path,
) -> Result<u8> {
    let mut config = Config::load(data_dir)?;
    if let Some(budget) = budget {
        config.max_token_budget = budget;
    }

    let store = StateStore::open(&Config::db_path(data_dir))?;
    if !resume {
        let catalog = Catalog::load(catalog_path)?;
        catalog.initialize(&store)?;
    }

    // Capability commands are resolved before the loop starts; a missing
    // binary fails fast as a configuration error.
    let worker = CommandWorker::new(&config.worker_command, config.task_timeout())?;
    let reviewer = CommandReviewer::new(&config.reviewer_command, config.task_timeout())?;

    let coordinator = Coordinator::new(&store, config.clone(), Box::new(worker), Box::new(reviewer));
    coordinator.setup_agents()?;
    if resume {
        coordinator.recover_in_flight()?;
    }

    if dry_run {
        print_plan(&coordinator)?;
        return Ok(EXIT_OK);
    }

    println!("{:=<60}", "");
    println!("OVERSEER");
    println!("Token budget:    {}", config.max_token_budget);
    println!("Worker agents:   {}", config.num_workers);
    println!("Max retries:     {}", config.max_task_retries);
    println!("{:=<60}", "");
    olog!("Run starting, resume={resume}");

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        tokio::select! {
            report = coordinator.run() => report,
            _ = tokio::signal::ctrl_c() => {
                olog!("Interrupted, writing checkpoint");
                store.append_checkpoint("User interrupt")?;
                Err(overseer::Error::Validation(
                    "interrupted; checkpoint saved, run with --resume to continue".to_string(),
                ))
            }
        }
    })?;

    println!("{:=<60}", "");
    println!("Halt: {} - {}", report.health, report.reason);
    println!("{}", coordinator.summary()?);
    println!("{:=<60}", "");

    Ok(match report.health {
        SystemHealth::Completed => EXIT_OK,
        SystemHealth::BudgetExceeded => EXIT_BUDGET,
        SystemHealth::NeedsHuman => EXIT_NEEDS_HUMAN,
        // run() only returns on a non-Running verdict.
        SystemHealth::Running => EXIT_ERROR,
    })
}

fn plan(data_dir: &std::path::Path, catalog_path: &std::path::Path) -> Result<u8> {
    let store = StateStore::open(&Config::db_path(data_dir))?;
    if store.list_tasks()?.is_empty() {
        let catalog = Catalog::load(catalog_path)?;
        catalog.initialize(&store)?;
    }

    let config = Config::load(data_dir)?;
    let coordinator = Coordinator::new(
        &store,
        config,
        Box::new(NullWorker),
        Box::new(NullReviewer),
    );
    print_plan(&coordinator)?;
    Ok(EXIT_OK)
}

fn print_plan(coordinator: &Coordinator<'_>) -> Result<()> {
    println!("TASK PLAN (dry run):");
    println!("{:-<40}", "");
    let plan = coordinator.plan()?;
    for task in &plan {
        let deps = if task.dependencies.is_empty() {
            String::new()
        } else {
            format!(" (depends on: {:?})", task.dependencies)
        };
        println!("{}. [{}] {}{}", task.id, task.component, task.name, deps);
    }
    println!("{:-<40}", "");
    println!("Total runnable tasks: {}", plan.len());
    Ok(())
}

fn status(data_dir: &std::path::Path) -> Result<u8> {
    let store = StateStore::open(&Config::db_path(data_dir))?;

    println!("TASKS:");
    for task in store.list_tasks()? {
        let agent = task.assigned_agent.as_deref().unwrap_or("-");
        println!(
            "  {:>3}. [{:<12}] {:<30} {:<12} retries={} agent={}",
            task.id, task.component, task.name, task.status, task.retries, agent
        );
    }

    println!("\nAGENTS:");
    for agent in store.list_agents()? {
        let task = agent
            .current_task
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} {:<9} {:<16} tokens={} task={}",
            agent.id, agent.role, agent.status, agent.tokens_used, task
        );
    }

    if let Some(cp) = store.latest_checkpoint()? {
        println!(
            "\nLATEST CHECKPOINT: {} completed, {} tokens, at {} ({})",
            cp.completed_tasks, cp.total_tokens, cp.timestamp, cp.summary
        );
    }

    println!("\nRECENT EVENTS:");
    for entry in store.recent_logs(10)? {
        let agent = entry.agent_id.as_deref().unwrap_or("-");
        println!(
            "  {} {:<18} [{}] {}",
            entry.timestamp, entry.action, agent, entry.detail
        );
    }

    Ok(EXIT_OK)
}

/// Placeholder capabilities for commands that never execute tasks.
struct NullWorker;

#[async_trait::async_trait]
impl overseer::Worker for NullWorker {
    async fn work(
        &self,
        _task: &overseer::Task,
        _feedback: Option<&str>,
    ) -> Result<overseer::WorkOutcome> {
        Ok(overseer::WorkOutcome {
            success: false,
            message: "null worker".to_string(),
            tokens_used: 0,
        })
    }
}

struct NullReviewer;

#[async_trait::async_trait]
impl overseer::Reviewer for NullReviewer {
    async fn review(
        &self,
        _task: &overseer::Task,
        _completion: &str,
    ) -> Result<overseer::ReviewOutcome> {
        Ok(overseer::ReviewOutcome {
            verdict: overseer::Verdict::Unclear,
            reason: "null reviewer".to_string(),
            tokens_used: 0,
        })
    }
}
