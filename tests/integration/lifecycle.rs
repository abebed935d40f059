//! Full work/review lifecycle runs and halt conditions.

use overseer::config::Config;
use overseer::coordinator::Coordinator;
use overseer::health::SystemHealth;
use overseer::store::StateStore;
use overseer::task::{AgentStatus, TaskStatus};

use crate::fixtures::{
    diamond_catalog, spec, test_config, unclear, work_failure, ScriptedReviewer, ScriptedWorker,
    REVIEW_TOKENS, WORK_TOKENS,
};

#[tokio::test]
async fn test_happy_path_completes_every_task() {
    let store = StateStore::open_in_memory().unwrap();
    diamond_catalog().initialize(&store).unwrap();

    let worker = ScriptedWorker::always_succeeds();
    let worker_calls = worker.calls.clone();
    let reviewer = ScriptedReviewer::always_accepts();
    let reviewer_calls = reviewer.calls.clone();

    let coordinator =
        Coordinator::new(&store, test_config(), Box::new(worker), Box::new(reviewer));
    coordinator.setup_agents().unwrap();

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.health, SystemHealth::Completed);
    assert_eq!(store.completed_count().unwrap(), 4);
    assert_eq!(worker_calls.load(std::sync::atomic::Ordering::SeqCst), 4);
    assert_eq!(reviewer_calls.load(std::sync::atomic::Ordering::SeqCst), 4);

    // Token accounting: every invocation accrued to its agent.
    assert_eq!(
        store.total_tokens().unwrap(),
        4 * WORK_TOKENS + 4 * REVIEW_TOKENS
    );

    // All agents parked idle afterward.
    for agent in store.list_agents().unwrap() {
        assert_eq!(agent.status, AgentStatus::Idle);
    }
}

#[tokio::test]
async fn test_persistent_rejection_blocks_task_and_frees_agent() {
    let store = StateStore::open_in_memory().unwrap();
    store.create_task("doomed", "core", "d", &[]).unwrap();

    let config = test_config();
    let max_retries = config.max_task_retries;

    let worker = ScriptedWorker::always_succeeds();
    let worker_calls = worker.calls.clone();
    let coordinator = Coordinator::new(
        &store,
        config,
        Box::new(worker),
        Box::new(ScriptedReviewer::always_rejects()),
    );
    coordinator.setup_agents().unwrap();

    let report = coordinator.run().await.unwrap();
    // Single task, terminal and blocked: escalation.
    assert_eq!(report.health, SystemHealth::NeedsHuman);

    let task = store.get_task(1).unwrap();
    assert_eq!(task.status, TaskStatus::Blocked);
    assert_eq!(task.retries, max_retries);

    // Initial attempt plus one fix per granted retry; the retry ceiling
    // bounds total worker invocations.
    assert_eq!(
        worker_calls.load(std::sync::atomic::Ordering::SeqCst) as u32,
        max_retries
    );

    let agent = store.get_agent("worker-1").unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);
}

#[tokio::test]
async fn test_worker_capability_failure_is_retried_then_recovers() {
    let store = StateStore::open_in_memory().unwrap();
    store.create_task("flaky", "core", "d", &[]).unwrap();

    let worker = ScriptedWorker::with_script(vec![work_failure("model unavailable")]);
    let coordinator = Coordinator::new(
        &store,
        test_config(),
        Box::new(worker),
        Box::new(ScriptedReviewer::always_accepts()),
    );
    coordinator.setup_agents().unwrap();

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.health, SystemHealth::Completed);

    let task = store.get_task(1).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retries, 1);

    // The failure left a durable event trail.
    let logs = store.recent_logs(50).unwrap();
    assert!(logs.iter().any(|l| l.action == "task_error"));
    assert!(logs.iter().any(|l| l.action == "task_retry"));
}

#[tokio::test]
async fn test_unclear_verdict_treated_as_rejection() {
    let store = StateStore::open_in_memory().unwrap();
    store.create_task("vague", "core", "d", &[]).unwrap();

    let reviewer = ScriptedReviewer::with_script(vec![unclear()]);
    let coordinator = Coordinator::new(
        &store,
        test_config(),
        Box::new(ScriptedWorker::always_succeeds()),
        Box::new(reviewer),
    );
    coordinator.setup_agents().unwrap();

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.health, SystemHealth::Completed);

    // The unclear verdict consumed a retry before the accept landed.
    assert_eq!(store.get_task(1).unwrap().retries, 1);
}

#[tokio::test]
async fn test_budget_exhaustion_halts_with_checkpoint() {
    let store = StateStore::open_in_memory().unwrap();
    diamond_catalog().initialize(&store).unwrap();

    // Two completed tasks land at 220 tokens, over the 150 budget.
    let config = Config {
        max_token_budget: 150,
        ..test_config()
    };

    let coordinator = Coordinator::new(
        &store,
        config,
        Box::new(ScriptedWorker::always_succeeds()),
        Box::new(ScriptedReviewer::always_accepts()),
    );
    coordinator.setup_agents().unwrap();

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.health, SystemHealth::BudgetExceeded);
    assert_eq!(report.details["budget"], 150);

    // The halt checkpointed current progress for a later resume.
    let cp = store.latest_checkpoint().unwrap().unwrap();
    assert_eq!(cp.completed_tasks, store.completed_count().unwrap());
    assert!(cp.total_tokens >= 150);

    // Untouched tasks are still pending, not lost.
    assert!(store.count_by_status(TaskStatus::Pending).unwrap() > 0);
}

#[tokio::test]
async fn test_blocked_threshold_escalates_to_human() {
    let store = StateStore::open_in_memory().unwrap();
    for name in ["a", "b", "c", "d"] {
        store.create_task(name, "core", "d", &[]).unwrap();
    }

    let config = Config {
        max_blocked_tasks: 2,
        ..test_config()
    };

    let coordinator = Coordinator::new(
        &store,
        config,
        Box::new(ScriptedWorker::always_succeeds()),
        Box::new(ScriptedReviewer::always_rejects()),
    );
    coordinator.setup_agents().unwrap();

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.health, SystemHealth::NeedsHuman);
    assert_eq!(store.blocked_count().unwrap(), 2);
    // Remaining tasks were never attempted past the threshold.
    assert_eq!(store.count_by_status(TaskStatus::Pending).unwrap(), 2);
}

#[tokio::test]
async fn test_empty_store_run_halts_cleanly() {
    // Resuming against a store with no tasks is a no-op run, not an
    // escalation.
    let store = StateStore::open_in_memory().unwrap();
    let coordinator = Coordinator::new(
        &store,
        test_config(),
        Box::new(ScriptedWorker::always_succeeds()),
        Box::new(ScriptedReviewer::always_accepts()),
    );
    coordinator.setup_agents().unwrap();

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.health, SystemHealth::Completed);
    assert_eq!(report.reason, "No tasks to run");
}

#[tokio::test]
async fn test_stranded_pending_tasks_escalate() {
    let store = StateStore::open_in_memory().unwrap();
    overseer::catalog::Catalog::from_specs(vec![
        spec("root", "core", &[]),
        spec("dependent", "core", &[1]),
    ])
    .unwrap()
    .initialize(&store)
    .unwrap();

    // Worker never produces a result, so the root task blocks and its
    // dependent can never become eligible.
    let failures: Vec<_> = (0..16).map(|_| work_failure("no result")).collect();
    let config = Config {
        max_blocked_tasks: 5,
        ..test_config()
    };
    let coordinator = Coordinator::new(
        &store,
        config,
        Box::new(ScriptedWorker::with_script(failures)),
        Box::new(ScriptedReviewer::always_accepts()),
    );
    coordinator.setup_agents().unwrap();

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.health, SystemHealth::NeedsHuman);
    assert_eq!(report.details["stranded_pending"], 1);
    assert_eq!(store.get_task(1).unwrap().status, TaskStatus::Blocked);
    assert_eq!(store.get_task(2).unwrap().status, TaskStatus::Pending);
}
