//! Delivery carries on when audit records cannot be written.

use super::harness::{new_dispatcher, server_config, FailingAuditLog, TestHarness};
use crate::dispatcher::{CycleOutcome, Disposition};
use crate::remote::RemoteError;
use std::sync::Arc;

fn with_failing_audit(harness: &mut TestHarness) -> Arc<FailingAuditLog> {
    let audit = Arc::new(FailingAuditLog::default());
    harness.dispatcher = new_dispatcher(
        harness.queue.clone(),
        harness.factory.clone(),
        harness.layout.clone(),
        audit.clone(),
        harness.suspension.clone(),
    )
    .with_server(server_config());
    audit
}

fn dispositions(outcome: CycleOutcome) -> Vec<Disposition> {
    let CycleOutcome::Processed(items) = outcome else {
        panic!("expected processed cycle, got {:?}", outcome);
    };
    items.into_iter().map(|item| item.disposition).collect()
}

#[tokio::test]
async fn delivered_build_is_removed_without_audit() {
    let mut harness = TestHarness::new();
    let audit = with_failing_audit(&mut harness);
    let build = harness.execute_build("tdtJob", 1);

    let outcome = harness.cycle().await;

    assert_eq!(dispositions(outcome), vec![Disposition::Delivered { id: 1 }]);
    assert_eq!(audit.attempts(), 1);
    assert!(harness.queue.is_empty());
    assert!(!harness.audit_file_exists(&build));
}

#[tokio::test]
async fn failures_still_count_towards_discard() {
    let mut harness = TestHarness::new();
    let audit = with_failing_audit(&mut harness);
    harness
        .client
        .queue_post(Err(RemoteError::Request("boom".to_string())));
    harness
        .client
        .queue_post(Err(RemoteError::Request("boom".to_string())));
    let build = harness.execute_build("tdtJob", 1);

    let first = harness.cycle().await;
    assert_eq!(dispositions(first), vec![Disposition::Failed { attempts: 1 }]);
    assert_eq!(harness.queue.failure_count(&build), 1);

    let second = harness.cycle().await;
    assert_eq!(dispositions(second), vec![Disposition::Discarded { attempts: 2 }]);
    assert!(harness.queue.is_empty());
    assert_eq!(harness.queue.discards(), 1);
    assert_eq!(audit.attempts(), 2);
}

#[tokio::test]
async fn busy_build_is_kept_without_audit() {
    let mut harness = TestHarness::new();
    with_failing_audit(&mut harness);
    harness
        .client
        .queue_post(Err(RemoteError::TemporarilyUnavailable("busy".to_string())));
    let build = harness.execute_build("tdtJob", 1);
    let other = harness.execute_build("otherJob", 1);

    let outcome = harness.cycle().await;

    assert_eq!(
        dispositions(outcome),
        vec![
            Disposition::TemporarilyUnavailable,
            Disposition::Delivered { id: 1 },
        ]
    );
    assert!(harness.queue.contains(&build));
    assert!(!harness.queue.contains(&other));
    assert_eq!(harness.queue.failure_count(&build), 0);
}
