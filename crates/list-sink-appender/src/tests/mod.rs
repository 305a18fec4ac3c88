//! Appender and tracing layer tests.
//!
//! - `harness.rs`  - In-memory transport, event log, appender helpers
//! - `appender.rs` - Framing, refusal of internal targets, misuse, batches
//! - `layer.rs`    - Events shipped through a subscriber, re-entry guard
