//! Behavioral tests for the delivery engine and connection pool.
//!
//! - `harness.rs`     - Mock store and transport, log capture, engine helpers
//! - `delivery.rs`    - Single sends: round trip, key independence, no duplicates
//! - `retry.rs`       - Per-key retry budget, delay and cancellation
//! - `bulk.rs`        - Batches over one connection, connection loss mid-batch
//! - `lifecycle.rs`   - Startup and shutdown, misuse reporting
//! - `pool.rs`        - Release contract, idle limits, eviction
//! - `concurrency.rs` - Concurrent senders, shutdown during an in-flight send

mod bulk;
mod retry;
