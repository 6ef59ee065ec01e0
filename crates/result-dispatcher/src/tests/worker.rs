//! The periodic worker on a real tokio clock.

use super::harness::{new_dispatcher, server_config, TestHarness};
use crate::dispatcher::Dispatcher;
use std::time::Duration;
use tokio::time::timeout;

const PERIOD: Duration = Duration::from_millis(10);
const WAIT: Duration = Duration::from_secs(5);

fn dispatcher_for(harness: &TestHarness) -> Dispatcher {
    new_dispatcher(
        harness.queue.clone(),
        harness.factory.clone(),
        harness.layout.clone(),
        harness.audit.clone(),
        harness.suspension.clone(),
    )
}

#[tokio::test]
async fn worker_delivers_enqueued_builds() {
    let harness = TestHarness::new();
    let handle = dispatcher_for(&harness).with_server(server_config()).start(PERIOD);

    assert!(handle.enqueue("tdtJob", 1));
    timeout(WAIT, handle.wait_for_cycles(2)).await.unwrap();

    assert!(handle.queue().is_empty());
    assert!(handle.completed_cycles() >= 2);
    harness.verify_audit(&crate::BuildReference::new("tdtJob", 1), false, &[true]);

    assert!(handle.stop().await.is_some());
}

#[tokio::test]
async fn enqueue_many_ignores_duplicates() {
    let harness = TestHarness::new();
    harness.suspension.set_suspended(true);
    let handle = dispatcher_for(&harness).with_server(server_config()).start(PERIOD);

    assert_eq!(
        handle.enqueue_many([("tdtJob", 1), ("tdtJob", 1), ("otherJob", 2)]),
        2
    );
    assert!(!handle.enqueue("tdtJob", 1));
    assert_eq!(handle.queue().len(), 2);

    handle.stop().await;
}

#[tokio::test]
async fn stopped_dispatcher_restarts_on_the_same_queue() {
    let harness = TestHarness::new();
    harness.suspension.set_suspended(true);
    let handle = dispatcher_for(&harness).with_server(server_config()).start(PERIOD);

    handle.enqueue("tdtJob", 1);
    timeout(WAIT, handle.wait_for_cycles(2)).await.unwrap();
    let dispatcher = handle.stop().await.unwrap();

    assert_eq!(harness.queue.len(), 1);
    assert_eq!(harness.client.call_count(), 0);

    harness.suspension.set_suspended(false);
    let handle = dispatcher.start(PERIOD);
    timeout(WAIT, handle.wait_for_cycles(2)).await.unwrap();

    assert!(harness.queue.is_empty());
    harness.verify_audit(&crate::BuildReference::new("tdtJob", 1), false, &[true]);
    handle.stop().await;
}

#[tokio::test]
async fn server_can_be_configured_while_running() {
    let harness = TestHarness::new();
    let handle = dispatcher_for(&harness).start(PERIOD);

    handle.enqueue("tdtJob", 1);
    timeout(WAIT, handle.wait_for_cycles(2)).await.unwrap();
    assert_eq!(handle.queue().len(), 1);
    assert_eq!(harness.client.call_count(), 0);

    handle.set_server_config(server_config()).await;
    timeout(WAIT, handle.wait_for_cycles(2)).await.unwrap();
    assert!(handle.queue().is_empty());

    handle.clear_server_config().await;
    handle.enqueue("tdtJob", 2);
    timeout(WAIT, handle.wait_for_cycles(2)).await.unwrap();
    assert_eq!(handle.queue().len(), 1);

    handle.stop().await;
}

#[tokio::test]
async fn dropping_the_handle_stops_the_worker() {
    let harness = TestHarness::new();
    let handle = dispatcher_for(&harness).with_server(server_config()).start(PERIOD);
    let mut cycles = handle.subscribe_cycles();
    timeout(WAIT, handle.wait_for_cycles(1)).await.unwrap();

    drop(handle);

    // The sender closes once the worker exits.
    timeout(WAIT, async {
        while cycles.changed().await.is_ok() {}
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn stop_during_slow_cycle_runs_no_further_cycle() {
    let harness = TestHarness::new();
    let build = harness.execute_build("tdtJob", 1);
    let file = harness.result_file(&build);
    harness.client.set_post_delay(Duration::from_millis(200));
    harness
        .client
        .queue_post(Err(crate::RemoteError::Request("boom".to_string())));
    let handle = dispatcher_for(&harness).with_server(server_config()).start(PERIOD);

    timeout(WAIT, async {
        while harness.client.post_count(&file) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    // The upload outlasts many periods, so a tick is due when it ends.
    handle.stop().await.unwrap();

    assert_eq!(harness.client.validate_count(), 1);
    assert_eq!(harness.client.post_count(&file), 1);
    assert_eq!(harness.queue.failure_count(&build), 1);
}

#[tokio::test]
async fn enqueue_refuses_ambiguous_project_names() {
    let harness = TestHarness::new();
    harness.suspension.set_suspended(true);
    let handle = dispatcher_for(&harness).with_server(server_config()).start(PERIOD);

    assert!(handle.enqueue("tdtJob", 1));
    assert!(!handle.enqueue("other/../tdtJob", 1));
    assert_eq!(handle.enqueue_many([("a//b", 2), ("a/b", 2)]), 1);
    assert_eq!(handle.queue().len(), 2);

    handle.stop().await;
}
