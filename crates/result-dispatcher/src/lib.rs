//! Result dispatcher: reliable delivery of build test results to an
//! analytics server.
//!
//! Builds finish at arbitrary times and are enqueued by the host. A single
//! periodic worker drains the queue, validates the server configuration once
//! per cycle, uploads each relevant result and records every upload attempt
//! in a per-build audit file.
//!
//! # Failure classes
//!
//! 1. **Connectivity** (authentication, session, shared space): the whole
//!    batch is deferred behind a quiet period. No item is touched and no
//!    audit record is written.
//! 2. **Temporarily unavailable**: audited, kept in the queue and retried
//!    every cycle without limit.
//! 3. **Generic request failure**: audited and retried until the discard
//!    threshold is reached, then dropped and counted.
//!
//! # Architecture
//!
//! ```text
//! host ──enqueue──▶ PendingQueue ◀──snapshot/remove── Dispatcher ──▶ RemoteClient
//!                                                        │  ▲
//!                                           AuditLog ◀───┘  └── RetryModel ◀── SuspensionSignal
//! ```

pub mod audit;
pub mod build;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod worker;

#[cfg(test)]
mod tests;

pub use audit::{AuditLog, AuditRecord, FileAuditLog};
pub use build::{BuildLayout, BuildReference, ResultFileResolver, AUDIT_FILE_NAME, RESULT_FILE_NAME};
pub use dispatcher::{
    Collaborators, CycleOutcome, DispatchPolicy, Dispatcher, Disposition, ItemOutcome,
    POST_RETRY_HINT,
};
pub use error::{DispatchError, DispatchResult};
pub use queue::PendingQueue;
pub use remote::{ConnectivityError, RemoteClient, RemoteClientFactory, RemoteError};
pub use retry::{RetryModel, SkipReason, SuspensionFlag, SuspensionSignal};
pub use worker::DispatcherHandle;

pub use dispatcher_config_and_utils::ServerConfig;
