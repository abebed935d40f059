//! Dependency ordering across multi-task catalogs.

use overseer::coordinator::Coordinator;
use overseer::health::SystemHealth;
use overseer::store::StateStore;
use overseer::task::TaskStatus;

use crate::fixtures::{diamond_catalog, spec, test_config, ScriptedReviewer, ScriptedWorker};

#[tokio::test]
async fn test_diamond_catalog_runs_in_dependency_order() {
    let store = StateStore::open_in_memory().unwrap();
    diamond_catalog().initialize(&store).unwrap();

    let worker = ScriptedWorker::always_succeeds();
    let seen = worker.seen.clone();
    let coordinator = Coordinator::new(
        &store,
        test_config(),
        Box::new(worker),
        Box::new(ScriptedReviewer::always_accepts()),
    );
    coordinator.setup_agents().unwrap();

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.health, SystemHealth::Completed);

    let order = seen.lock().unwrap().clone();
    assert_eq!(order.len(), 4);
    let pos = |id: i64| order.iter().position(|&x| x == id).unwrap();
    // Root first, join last, branches in between in either order.
    assert_eq!(pos(1), 0);
    assert_eq!(pos(4), 3);
    assert!(pos(2) < pos(4) && pos(3) < pos(4));
}

#[tokio::test]
async fn test_dependency_never_started_before_completion() {
    // Chain of three: each worker invocation must see its dependency
    // already completed in the store.
    let store = StateStore::open_in_memory().unwrap();
    overseer::catalog::Catalog::from_specs(vec![
        spec("first", "core", &[]),
        spec("second", "core", &[1]),
        spec("third", "core", &[2]),
    ])
    .unwrap()
    .initialize(&store)
    .unwrap();

    let worker = ScriptedWorker::always_succeeds();
    let seen = worker.seen.clone();
    let coordinator = Coordinator::new(
        &store,
        test_config(),
        Box::new(worker),
        Box::new(ScriptedReviewer::always_accepts()),
    );
    coordinator.setup_agents().unwrap();

    coordinator.run().await.unwrap();
    assert_eq!(seen.lock().unwrap().clone(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_independent_tasks_run_in_creation_order() {
    let store = StateStore::open_in_memory().unwrap();
    for name in ["x", "y", "z"] {
        store.create_task(name, "core", "d", &[]).unwrap();
    }

    let worker = ScriptedWorker::always_succeeds();
    let seen = worker.seen.clone();
    let coordinator = Coordinator::new(
        &store,
        test_config(),
        Box::new(worker),
        Box::new(ScriptedReviewer::always_accepts()),
    );
    coordinator.setup_agents().unwrap();

    coordinator.run().await.unwrap();
    assert_eq!(seen.lock().unwrap().clone(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_plan_matches_executed_order_for_chain() {
    let store = StateStore::open_in_memory().unwrap();
    diamond_catalog().initialize(&store).unwrap();

    let coordinator = Coordinator::new(
        &store,
        test_config(),
        Box::new(ScriptedWorker::always_succeeds()),
        Box::new(ScriptedReviewer::always_accepts()),
    );

    let plan = coordinator.plan().unwrap();
    let planned: Vec<i64> = plan.iter().map(|t| t.id).collect();
    assert_eq!(planned, vec![1, 2, 3, 4]);

    // Planning is a pure preview; statuses are untouched.
    assert_eq!(
        store.count_by_status(TaskStatus::Pending).unwrap(),
        4
    );
}
