// tests/registry_invariants.rs

//! Direct tests of the task registry's transition guards.

use taskloom::state::{TaskLifecycle, TaskRegistry};
use taskloom_test_utils::builders::TaskBuilder;

#[test]
fn aborted_is_sticky() {
    let mut registry = TaskRegistry::new();
    registry.initialize(&TaskBuilder::new("t").cmd("echo hi").build());
    registry.claim_for_launch("t");
    registry.set_running("t");

    registry.set_aborted("t", "[task aborted by user]");
    assert_eq!(registry.state_of("t"), Some(TaskLifecycle::Aborted));

    // A racing completion must not resurrect the task.
    assert!(!registry.safe_set_state("t", TaskLifecycle::Success));
    assert!(!registry.safe_set_state("t", TaskLifecycle::Failed));
    assert_eq!(registry.state_of("t"), Some(TaskLifecycle::Aborted));

    // Output may still be appended after the abort.
    registry.append_output("t", "late line\n");
    let record = registry.record("t").expect("record");
    assert!(record.output.contains("aborted by user"));
    assert!(record.output.contains("late line"));
}

#[test]
fn reinitialize_preserves_lineage_and_terminal_state() {
    let mut registry = TaskRegistry::new();
    let def = TaskBuilder::new("cb").cmd("echo hi").build();

    registry.initialize(&def);
    registry.mark_callback("cb", "parent");
    registry.claim_for_launch("cb");
    registry.set_running("cb");
    assert!(registry.safe_set_state("cb", TaskLifecycle::Success));

    // A second reference to the same id re-initializes; the terminal state
    // and lineage must survive.
    registry.initialize(&def);
    let record = registry.record("cb").expect("record");
    assert_eq!(record.state, TaskLifecycle::Success);
    assert!(record.is_callback);
    assert_eq!(record.parent_task.as_deref(), Some("parent"));
}

#[test]
fn mark_callback_first_parent_wins() {
    let mut registry = TaskRegistry::new();
    registry.initialize(&TaskBuilder::new("cb").build());

    registry.mark_callback("cb", "first");
    registry.mark_callback("cb", "second");

    let record = registry.record("cb").expect("record");
    assert_eq!(record.parent_task.as_deref(), Some("first"));
}

#[test]
fn launch_claim_is_granted_once() {
    let mut registry = TaskRegistry::new();
    registry.initialize(&TaskBuilder::new("t").build());

    assert!(registry.claim_for_launch("t"));
    assert!(!registry.claim_for_launch("t"), "second claim must fail");
}

#[test]
fn waiting_records_cannot_be_claimed_directly() {
    let mut registry = TaskRegistry::new();
    registry.initialize(&TaskBuilder::new("dep").build());
    registry.initialize(&TaskBuilder::new("gated").depends_on("dep").build());
    registry.set_waiting("gated");

    // Only take_ready_waiting may launch a Waiting task, and only once its
    // dependencies are satisfied.
    assert!(!registry.claim_for_launch("gated"));
    assert_eq!(registry.state_of("gated"), Some(TaskLifecycle::Waiting));
    assert!(registry.take_ready_waiting().is_empty());
}

#[test]
fn reinitialize_does_not_regress_a_waiting_record() {
    let mut registry = TaskRegistry::new();
    registry.initialize(&TaskBuilder::new("dep").build());
    let def = TaskBuilder::new("gated").depends_on("dep").build();
    registry.initialize(&def);
    registry.set_waiting("gated");

    // A callback referencing a waiting batch task re-initializes it; the
    // record must stay Waiting and unclaimable, or the callback path would
    // launch it past its unmet dependencies.
    registry.initialize(&def);
    assert_eq!(registry.state_of("gated"), Some(TaskLifecycle::Waiting));
    assert!(!registry.claim_for_launch("gated"));
}

#[test]
fn dependencies_satisfied_by_success_and_skipped_only() {
    let mut registry = TaskRegistry::new();
    registry.initialize(&TaskBuilder::new("ok").build());
    registry.initialize(&TaskBuilder::new("skipped").build());
    registry.initialize(&TaskBuilder::new("bad").build());
    registry.initialize(
        &TaskBuilder::new("ready")
            .depends_on("ok")
            .depends_on("skipped")
            .build(),
    );
    registry.initialize(&TaskBuilder::new("blocked").depends_on("bad").build());
    registry.set_waiting("ready");
    registry.set_waiting("blocked");

    registry.claim_for_launch("ok");
    registry.set_running("ok");
    assert!(registry.safe_set_state("ok", TaskLifecycle::Success));
    registry.set_skipped("skipped");
    registry.claim_for_launch("bad");
    registry.set_running("bad");
    assert!(registry.safe_set_state("bad", TaskLifecycle::Failed));

    let ready = registry.take_ready_waiting();
    assert_eq!(ready, vec!["ready".to_string()]);

    // "blocked" is permanently stuck once nothing else is in flight.
    registry.set_running("ready");
    assert!(registry.safe_set_state("ready", TaskLifecycle::Success));
    assert_eq!(registry.stalled_waiting(), vec!["blocked".to_string()]);
    assert_eq!(registry.state_of("blocked"), Some(TaskLifecycle::Waiting));
}

#[test]
fn all_terminal_counts_every_live_state() {
    let mut registry = TaskRegistry::new();
    assert!(registry.all_terminal(), "empty registry is terminal");

    registry.initialize(&TaskBuilder::new("a").build());
    assert!(!registry.all_terminal());

    registry.set_waiting("a");
    assert!(!registry.all_terminal());

    registry.claim_for_launch("a");
    registry.set_running("a");
    assert!(!registry.all_terminal());

    assert!(registry.safe_set_state("a", TaskLifecycle::Failed));
    assert!(registry.all_terminal());
}

#[test]
fn skipped_is_terminal_but_not_a_failure() {
    let mut registry = TaskRegistry::new();
    registry.initialize(&TaskBuilder::new("gated").build());
    registry.set_skipped("gated");

    assert_eq!(registry.state_of("gated"), Some(TaskLifecycle::Skipped));
    assert!(registry.all_terminal());
    assert!(TaskLifecycle::Skipped.satisfies_dependency());
    assert!(!TaskLifecycle::Skipped.blocks_dependency());
}
