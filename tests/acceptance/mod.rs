//! Integration tests for cstate-disabler acceptance testing.
//!
//! These tests run against the real `/dev/cpu_dma_latency` and are
//! ignored by default; run them with `cargo test -- --ignored` as root.

mod common;
mod device_test;
