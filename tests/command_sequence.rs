// tests/command_sequence.rs

use std::sync::{Arc, Mutex};

use taskloom::exec::executor::COMMAND_SEPARATOR;
use taskloom::orchestrator::Orchestrator;
use taskloom::state::TaskLifecycle;
use taskloom_test_utils::builders::TaskBuilder;
use taskloom_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn sequence_stops_at_first_nonzero_exit() {
    init_tracing();

    let exit_code = Arc::new(Mutex::new(None));
    let seen = exit_code.clone();

    let orch = Orchestrator::new();
    orch.run_batch(vec![TaskBuilder::new("seq")
        .cmds(&["echo one", "false", "echo two"])
        .on_fail_fn(move |result| {
            *seen.lock().expect("exit_code mutex") = result.exit_code;
            Ok(())
        })
        .build()])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(orch.state_of("seq"), Some(TaskLifecycle::Failed));

    let snaps = orch.snapshot();
    let seq = &snaps[0];
    assert!(seq.output.contains("one"));
    assert!(!seq.output.contains("two"), "third command must never run");

    // The failed command's result becomes the task result.
    assert_eq!(*exit_code.lock().expect("exit_code mutex"), Some(1));
}

#[tokio::test]
async fn sequence_success_runs_all_commands_with_separator() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.run_batch(vec![TaskBuilder::new("seq")
        .cmds(&["echo alpha", "echo beta"])
        .build()])
    .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(orch.state_of("seq"), Some(TaskLifecycle::Success));

    let snaps = orch.snapshot();
    let output = &snaps[0].output;
    assert!(output.contains("alpha"));
    assert!(output.contains("beta"));
    assert!(output.contains(COMMAND_SEPARATOR));

    let alpha = output.find("alpha").expect("alpha in output");
    let sep = output.find(COMMAND_SEPARATOR).expect("separator in output");
    let beta = output.find("beta").expect("beta in output");
    assert!(alpha < sep && sep < beta, "separator sits between commands");
}

#[tokio::test]
async fn empty_sequence_is_vacuous_success() {
    init_tracing();

    let orch = Orchestrator::new();
    orch.run_batch(vec![TaskBuilder::new("noop").cmds(&[]).build()])
        .expect("run_batch");

    with_timeout(orch.wait_idle()).await.expect("batch idle");

    assert_eq!(orch.state_of("noop"), Some(TaskLifecycle::Success));
}
