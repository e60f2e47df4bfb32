//! Clientbench workspace-level test utilities.
//!
//! This crate exists solely to host workspace-level tests: the BDD scenarios
//! in `tests/cucumber.rs` and the end-to-end suite in `tests/integration/`.
//!
//! The actual clientbench functionality is in the workspace member crates:
//! - `clientbench-types`: Receipt, report and config schemas
//! - `clientbench-domain`: Workload generation and aggregation, no I/O
//! - `clientbench-adapters`: HTTP client adapters, resource and host probes
//! - `clientbench-app`: Harness and use cases
//! - `clientbench` (clientbench-cli): CLI interface
