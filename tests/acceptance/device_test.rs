//! Real-device acceptance tests.
//!
//! # Requirements
//!
//! - Root privileges
//! - `/dev/cpu_dma_latency` present
//!
//! # Acceptance Criteria
//!
//! - While held, the kernel's effective target reads back as 0 µs
//! - After release, the target is no longer pinned by this process
//! - Without privileges, acquire fails with EACCES or EPERM

use super::common::{check_qos_prerequisites, is_root, system_capabilities};
use cstate_common::error::QosError;
use cstate_runtime::latency::LatencyGuard;
use cstate_runtime::probe::read_current_latency;
use cstate_runtime::shared::SharedLatencyGuard;

#[test]
#[ignore = "Requires root and /dev/cpu_dma_latency"]
fn test_system_target_is_zero_while_held() {
    if let Err(e) = check_qos_prerequisites() {
        eprintln!("Skipping test: {}", e);
        return;
    }

    let before = system_capabilities().current_latency_us;
    println!("Effective latency before acquire: {before:?} µs");

    let mut guard = LatencyGuard::system();
    guard.acquire().expect("acquire on real device");

    let held = read_current_latency(guard.device());
    println!("Effective latency while held: {held:?} µs");
    assert_eq!(held, Some(0));

    guard.release();
    let after = read_current_latency(guard.device());
    println!("Effective latency after release: {after:?} µs");

    // Another process may hold its own constraint, so only compare when
    // the system was unconstrained to begin with.
    if before.is_some_and(|v| v > 0) {
        assert_eq!(after, before);
    }
}

#[test]
#[ignore = "Requires root and /dev/cpu_dma_latency"]
fn test_real_device_cycle_is_restartable() {
    if let Err(e) = check_qos_prerequisites() {
        eprintln!("Skipping test: {}", e);
        return;
    }

    let mut guard = LatencyGuard::system();
    for _ in 0..3 {
        guard.acquire().expect("acquire on real device");
        guard.acquire().expect("idempotent acquire");
        assert!(guard.is_held());
        guard.release();
        guard.release();
        assert!(!guard.is_held());
    }
    assert_eq!(guard.acquisitions(), 3);
}

#[test]
#[ignore = "Requires root and /dev/cpu_dma_latency"]
fn test_shared_holds_on_real_device() {
    if let Err(e) = check_qos_prerequisites() {
        eprintln!("Skipping test: {}", e);
        return;
    }

    let shared = SharedLatencyGuard::new(LatencyGuard::system());
    let first = shared.hold().expect("first hold");
    let second = shared.hold().expect("second hold");

    drop(first);
    assert_eq!(read_current_latency(std::path::Path::new("/dev/cpu_dma_latency")), Some(0));

    drop(second);
    assert!(!shared.is_held());
}

#[test]
#[ignore = "Requires a non-root user and /dev/cpu_dma_latency"]
fn test_unprivileged_acquire_fails_with_errno() {
    if is_root() {
        eprintln!("Skipping test: running as root");
        return;
    }
    if !system_capabilities().device_present {
        eprintln!("Skipping test: device not present");
        return;
    }

    let mut guard = LatencyGuard::system();
    let err = guard.acquire().unwrap_err();
    assert!(matches!(err, QosError::DeviceUnavailable { .. }));
    let errno = err.errno().expect("OS error");
    assert!(errno == libc::EACCES || errno == libc::EPERM, "errno={errno}");
    assert_eq!(err.exit_code(), errno);
    assert!(!guard.is_held());
}
