//! The delivery cycle.
//!
//! One call to [`Dispatcher::run_cycle`] is one tick of the worker:
//!
//! 1. Skip entirely when suspended or inside a quiet period.
//! 2. Snapshot the pending queue; stop if it is empty.
//! 3. Validate the server configuration once for the batch. Any
//!    connectivity failure defers the whole batch.
//! 4. For each pending build, in order: check relevance, upload, audit, and
//!    remove, keep or discard the build according to the outcome.

use crate::audit::{AuditLog, AuditRecord};
use crate::build::{BuildReference, ResultFileResolver};
use crate::queue::PendingQueue;
use crate::remote::{ConnectivityError, RemoteClient, RemoteClientFactory, RemoteError};
use crate::retry::{RetryModel, SkipReason, SuspensionSignal};
use chrono::{DateTime, Utc};
use dispatcher_config_and_utils::{
    Config, ServerConfig, DEFAULT_DISCARD_THRESHOLD, DEFAULT_QUIET_PERIOD_BASE_SECS,
    DEFAULT_QUIET_PERIOD_MAX_SECS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Value of the upload's retry hint. Interpreted by the server only.
pub const POST_RETRY_HINT: bool = false;

/// Retry and discard policy.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Generic failures after which a build is discarded.
    pub discard_threshold: u32,
    /// Quiet period after the first connectivity failure.
    pub quiet_period_base: Duration,
    /// Cap for escalated quiet periods.
    pub quiet_period_max: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            discard_threshold: DEFAULT_DISCARD_THRESHOLD,
            quiet_period_base: Duration::from_secs(DEFAULT_QUIET_PERIOD_BASE_SECS),
            quiet_period_max: Duration::from_secs(DEFAULT_QUIET_PERIOD_MAX_SECS),
        }
    }
}

impl DispatchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            discard_threshold: config.discard_threshold.max(1),
            quiet_period_base: config.quiet_period_base(),
            quiet_period_max: config.quiet_period_max(),
        }
    }
}

/// External collaborators of the dispatcher.
pub struct Collaborators {
    pub client_factory: Arc<dyn RemoteClientFactory>,
    pub result_files: Arc<dyn ResultFileResolver>,
    pub audit_log: Arc<dyn AuditLog>,
    pub suspension: Arc<dyn SuspensionSignal>,
    /// Stable identifier of this host, sent with relevance checks.
    pub server_identity: String,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was attempted.
    Skipped(SkipReason),
    /// The queue was empty.
    Idle,
    /// Validation failed; every pending build was left untouched.
    Deferred(ConnectivityError),
    /// Each snapshotted build was handled, in queue order.
    Processed(Vec<ItemOutcome>),
}

/// What happened to one build during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub reference: BuildReference,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Uploaded and removed from the queue.
    Delivered { id: i64 },
    /// Not wanted by the server; removed without an upload.
    NotRelevant,
    /// The relevance check itself failed; left pending untouched.
    RelevanceUnknown,
    /// Server busy; left pending without counting a failure.
    TemporarilyUnavailable,
    /// Upload failed; left pending for another attempt.
    Failed { attempts: u32 },
    /// Upload failed for the last allowed time; removed and counted.
    Discarded { attempts: u32 },
}

/// Periodic delivery driver. Owns the retry state; shares the queue with the
/// producer.
pub struct Dispatcher {
    queue: Arc<PendingQueue>,
    retry: RetryModel,
    policy: DispatchPolicy,
    client_factory: Arc<dyn RemoteClientFactory>,
    result_files: Arc<dyn ResultFileResolver>,
    audit_log: Arc<dyn AuditLog>,
    server_identity: String,
    server: Arc<RwLock<Option<ServerConfig>>>,
}

impl Dispatcher {
    /// Create a dispatcher over `queue`. No server is configured yet.
    pub fn new(
        queue: Arc<PendingQueue>,
        collaborators: Collaborators,
        policy: DispatchPolicy,
    ) -> Self {
        let retry = RetryModel::new(
            collaborators.suspension,
            policy.quiet_period_base,
            policy.quiet_period_max,
        );
        Self {
            queue,
            retry,
            policy,
            client_factory: collaborators.client_factory,
            result_files: collaborators.result_files,
            audit_log: collaborators.audit_log,
            server_identity: collaborators.server_identity,
            server: Arc::new(RwLock::new(None)),
        }
    }

    /// Start with a server already configured.
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = Arc::new(RwLock::new(Some(server)));
        self
    }

    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    pub fn retry_model(&self) -> &RetryModel {
        &self.retry
    }

    pub(crate) fn server_slot(&self) -> Arc<RwLock<Option<ServerConfig>>> {
        self.server.clone()
    }

    pub async fn set_server_config(&self, server: ServerConfig) {
        *self.server.write().await = Some(server);
    }

    pub async fn clear_server_config(&self) {
        *self.server.write().await = None;
    }

    /// Run one delivery cycle at `now`.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        if let Some(reason) = self.retry.skip_reason(now) {
            debug!(reason = ?reason, "Skipping dispatch cycle");
            return CycleOutcome::Skipped(reason);
        }

        let pending = self.queue.drain_snapshot();
        if pending.is_empty() {
            return CycleOutcome::Idle;
        }

        let server = self.server.read().await.clone();
        let Some(server) = server else {
            debug!(pending = pending.len(), "No server configured, skipping cycle");
            return CycleOutcome::Skipped(SkipReason::NotConfigured);
        };

        let client = self.client_factory.obtain(&server);
        if let Err(err) = client.validate_configuration().await {
            self.retry.on_connectivity_failure(now, &err);
            return CycleOutcome::Deferred(err);
        }
        self.retry.on_connectivity_success();

        debug!(pending = pending.len(), location = %server.location, "Dispatching results");

        let mut outcomes = Vec::with_capacity(pending.len());
        for reference in pending {
            let disposition = self
                .dispatch_one(client.as_ref(), &server, &reference, now)
                .await;
            outcomes.push(ItemOutcome {
                reference,
                disposition,
            });
        }

        CycleOutcome::Processed(outcomes)
    }

    async fn dispatch_one(
        &self,
        client: &dyn RemoteClient,
        server: &ServerConfig,
        reference: &BuildReference,
        now: DateTime<Utc>,
    ) -> Disposition {
        match client
            .is_result_relevant(&self.server_identity, reference.root_project())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(build = %reference, "Results not relevant, dropping");
                self.queue.remove(reference);
                return Disposition::NotRelevant;
            }
            Err(err) => {
                warn!(build = %reference, error = %err, "Relevance check failed, keeping build");
                return Disposition::RelevanceUnknown;
            }
        }

        let result_file = self.result_files.result_file(reference);
        match client.post_result(&result_file, POST_RETRY_HINT).await {
            Ok(id) => {
                self.audit(reference, AuditRecord::pushed(server, id, now));
                self.queue.remove(reference);
                info!(build = %reference, id, "Results delivered");
                Disposition::Delivered { id }
            }
            Err(RemoteError::TemporarilyUnavailable(message)) => {
                self.audit(reference, AuditRecord::temporarily_unavailable(server, now));
                warn!(build = %reference, message = %message, "Server busy, will retry");
                Disposition::TemporarilyUnavailable
            }
            Err(RemoteError::Request(message)) => {
                self.audit(reference, AuditRecord::failed(server, now));
                let attempts = self.queue.record_failure(reference);
                if attempts >= self.policy.discard_threshold {
                    self.queue.discard(reference);
                    error!(
                        build = %reference,
                        attempts,
                        message = %message,
                        "Delivery failed too many times, discarding build"
                    );
                    Disposition::Discarded { attempts }
                } else {
                    warn!(build = %reference, attempts, message = %message, "Delivery failed, will retry");
                    Disposition::Failed { attempts }
                }
            }
        }
    }

    fn audit(&self, reference: &BuildReference, record: AuditRecord) {
        if let Err(err) = self.audit_log.append(reference, &record) {
            error!(build = %reference, error = %err, "Failed to write audit record");
        }
    }
}
