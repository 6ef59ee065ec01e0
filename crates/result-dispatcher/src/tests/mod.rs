//! Scenario tests for the result dispatcher.
//!
//! - `harness.rs`      - Mock remote client, mock factory and a dispatcher over a temp dir
//! - `delivery.rs`     - Happy-path delivery, ordering and relevance filtering
//! - `audit_failure.rs` - Delivery when audit writes fail
//! - `connectivity.rs` - Batch deferral and the quiet period
//! - `failures.rs`     - Generic failures, retry and discard
//! - `unavailable.rs`  - "Server busy" failures retried indefinitely
//! - `suspension.rs`   - Global suspension switch
//! - `worker.rs`       - The periodic worker and its handle

mod audit_failure;
mod worker;
