// tests/batch_lifecycle.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use taskloom::orchestrator::Orchestrator;
use taskloom::state::TaskLifecycle;
use taskloom::task::FnOutcome;
use taskloom_test_utils::builders::TaskBuilder;
use taskloom_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn echo_batch_completes_with_captured_output() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.run_batch(vec![
        TaskBuilder::new("hello").cmd("echo hello world").build(),
        TaskBuilder::new("bye").cmd("echo bye").build(),
    ])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert!(orch.is_batch_complete());
    let snaps = orch.snapshot();
    assert_eq!(snaps.len(), 2);

    let hello = snaps.iter().find(|s| s.id == "hello").expect("hello snap");
    assert_eq!(hello.state, TaskLifecycle::Success);
    assert!(hello.output.contains("hello world"));
}

#[tokio::test]
async fn exit_literals_short_circuit_without_spawning() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.run_batch(vec![
        TaskBuilder::new("ok").cmd("exit 0").build(),
        TaskBuilder::new("bad").cmd("exit 1").build(),
    ])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(orch.state_of("ok"), Some(TaskLifecycle::Success));
    assert_eq!(orch.state_of("bad"), Some(TaskLifecycle::Failed));

    // No process ran, so nothing was captured.
    let snaps = orch.snapshot();
    for snap in &snaps {
        assert!(snap.output.is_empty(), "{} captured output", snap.id);
    }
}

#[tokio::test]
async fn empty_task_is_vacuous_success_and_fires_on_success() {
    init_tracing();

    let fired = Arc::new(AtomicBool::new(false));
    let fired_in_cb = fired.clone();

    let orch = Orchestrator::new();
    orch.run_batch(vec![TaskBuilder::new("empty")
        .on_success_fn(move |result| {
            assert!(result.success);
            fired_in_cb.store(true, Ordering::SeqCst);
            Ok(())
        })
        .build()])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(orch.state_of("empty"), Some(TaskLifecycle::Success));
    assert!(fired.load(Ordering::SeqCst), "on_success did not fire");
}

#[tokio::test]
async fn function_outcomes_map_to_terminal_states() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.run_batch(vec![
        TaskBuilder::new("pass").function(|| FnOutcome::Pass).build(),
        TaskBuilder::new("fail").function(|| FnOutcome::Fail).build(),
        TaskBuilder::new("report")
            .function(|| FnOutcome::Report {
                ok: false,
                message: "checks broke".to_string(),
            })
            .build(),
    ])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(orch.state_of("pass"), Some(TaskLifecycle::Success));
    assert_eq!(orch.state_of("fail"), Some(TaskLifecycle::Failed));
    assert_eq!(orch.state_of("report"), Some(TaskLifecycle::Failed));

    let snaps = orch.snapshot();
    let report = snaps.iter().find(|s| s.id == "report").expect("report snap");
    assert!(report.output.contains("checks broke"));
}

#[tokio::test]
async fn timestamps_are_stamped_on_terminal_tasks() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.run_batch(vec![TaskBuilder::new("t").cmd("echo hi").build()])
        .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    let snaps = orch.snapshot();
    let snap = &snaps[0];
    let start = snap.start_time.expect("start_time");
    let end = snap.end_time.expect("end_time");
    assert!(end >= start);
    assert!(snap.elapsed().is_some());
}

#[tokio::test]
async fn definition_without_id_is_rejected_but_batch_runs() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.run_batch(vec![
        TaskBuilder::new("").cmd("echo nope").build(),
        TaskBuilder::new("good").cmd("echo fine").build(),
    ])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    let snaps = orch.snapshot();
    assert_eq!(snaps.len(), 1, "nameless task must not create state");
    assert_eq!(orch.state_of("good"), Some(TaskLifecycle::Success));
}
