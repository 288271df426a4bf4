// tests/callbacks.rs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskloom::orchestrator::Orchestrator;
use taskloom::state::TaskLifecycle;
use taskloom::task::{CallbackAction, FnOutcome};
use taskloom_test_utils::builders::TaskBuilder;
use taskloom_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn on_fail_materializes_template_as_callback_child() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.register_template(TaskBuilder::new("fix").cmd("echo fixed").build());
    orch.run_batch(vec![TaskBuilder::new("broken")
        .cmd("exit 1")
        .on_fail_task("fix")
        .build()])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(orch.state_of("broken"), Some(TaskLifecycle::Failed));
    assert_eq!(orch.state_of("fix"), Some(TaskLifecycle::Success));

    let snaps = orch.snapshot();
    let fix = snaps.iter().find(|s| s.id == "fix").expect("fix snap");
    assert!(fix.is_callback);
    assert_eq!(fix.parent_task.as_deref(), Some("broken"));
    assert!(fix.output.contains("fixed"));
}

#[tokio::test]
async fn shared_callback_target_launches_exactly_once() {
    init_tracing();

    let runs = Arc::new(AtomicUsize::new(0));
    let counted = runs.clone();

    let orch = Orchestrator::new();
    orch.register_template(TaskBuilder::new("fix").function(move || {
        counted.fetch_add(1, Ordering::SeqCst);
        FnOutcome::Pass
    }).build());
    orch.run_batch(vec![
        TaskBuilder::new("broken-1").cmd("exit 1").on_fail_task("fix").build(),
        TaskBuilder::new("broken-2").cmd("exit 1").on_fail_task("fix").build(),
    ])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(runs.load(Ordering::SeqCst), 1, "callback target ran more than once");

    let snaps = orch.snapshot();
    let fixes: Vec<_> = snaps.iter().filter(|s| s.id == "fix").collect();
    assert_eq!(fixes.len(), 1, "exactly one record for the shared target");
    let fix = fixes[0];
    assert!(fix.is_callback);
    let parent = fix.parent_task.as_deref().expect("parent recorded");
    assert!(
        parent == "broken-1" || parent == "broken-2",
        "parent must be whichever trigger reached it first, got {parent}"
    );
}

#[tokio::test]
async fn chain_lineage_shifts_only_on_task_elements() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.register_template(TaskBuilder::new("x").cmd("echo x").build());
    orch.register_template(TaskBuilder::new("y").cmd("echo y").build());
    orch.run_batch(vec![TaskBuilder::new("boom")
        .cmd("exit 1")
        .on_fail(CallbackAction::func(|_result| Ok(())))
        .on_fail_task("x")
        .on_fail_task("y")
        .build()])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    let snaps = orch.snapshot();
    let x = snaps.iter().find(|s| s.id == "x").expect("x snap");
    let y = snaps.iter().find(|s| s.id == "y").expect("y snap");

    // The leading function callback does not break the visual chain: x is
    // still a child of the trigger, while y re-roots under x.
    assert_eq!(x.parent_task.as_deref(), Some("boom"));
    assert_eq!(y.parent_task.as_deref(), Some("x"));
}

#[tokio::test]
async fn unresolvable_callback_target_is_a_warning_not_an_error() {
    init_tracing();

    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();

    let orch = Orchestrator::new();
    orch.run_batch(vec![TaskBuilder::new("broken")
        .cmd("exit 1")
        .on_fail_task("ghost")
        .on_fail_fn(move |_result| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .build()])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert!(orch.state_of("ghost").is_none(), "no state for unknown target");
    assert!(fired.load(Ordering::SeqCst), "later chain elements still run");
}

#[tokio::test]
async fn failing_callback_function_does_not_abort_the_batch() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.run_batch(vec![
        TaskBuilder::new("noisy")
            .cmd("exit 0")
            .on_success_fn(|_result| anyhow::bail!("callback blew up"))
            .build(),
        TaskBuilder::new("other").cmd("echo fine").build(),
    ])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(orch.state_of("noisy"), Some(TaskLifecycle::Success));
    assert_eq!(orch.state_of("other"), Some(TaskLifecycle::Success));
}

#[tokio::test]
async fn callback_referencing_batch_task_does_not_rerun_it() {
    init_tracing();

    let runs = Arc::new(AtomicUsize::new(0));
    let counted = runs.clone();

    // "target" is part of the batch and completes on its own; the callback
    // referencing it afterwards must not re-trigger it.
    let orch = Orchestrator::new();
    orch.run_batch(vec![
        TaskBuilder::new("target")
            .function(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                FnOutcome::Pass
            })
            .build(),
        TaskBuilder::new("late")
            .cmd("exit 0")
            .depends_on("target")
            .on_success_task("target")
            .build(),
    ])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(runs.load(Ordering::SeqCst), 1, "terminal task was re-triggered");
    assert_eq!(orch.state_of("target"), Some(TaskLifecycle::Success));
}

#[tokio::test]
async fn callback_cannot_preempt_a_waiting_dependent() {
    init_tracing();

    // "guarded" waits on a slow dependency; a fast task's callback
    // references it before that dependency resolves. The callback must not
    // launch it early.
    let orch = Orchestrator::new();
    orch.run_batch(vec![
        TaskBuilder::new("slow").cmd("sleep 0.4").build(),
        TaskBuilder::new("guarded")
            .cmd("echo guarded ran")
            .depends_on("slow")
            .build(),
        TaskBuilder::new("quick")
            .cmd("exit 0")
            .on_success_task("guarded")
            .build(),
    ])
    .expect("run_batch");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(orch.state_of("quick"), Some(TaskLifecycle::Success));
    assert_eq!(orch.state_of("slow"), Some(TaskLifecycle::Running));
    assert_eq!(
        orch.state_of("guarded"),
        Some(TaskLifecycle::Waiting),
        "callback launched a task whose dependency is still running"
    );

    with_timeout(orch.wait_idle()).await.expect("batch idle");
    assert_eq!(orch.state_of("slow"), Some(TaskLifecycle::Success));
    assert_eq!(orch.state_of("guarded"), Some(TaskLifecycle::Success));
}
