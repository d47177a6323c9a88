//! Common utilities for acceptance tests.
//!
//! Provides helpers for checking PM QOS prerequisites.

use cstate_common::config::DEFAULT_DEVICE;
use cstate_runtime::probe::{check_qos_capabilities, QosCapabilities};
use std::path::Path;

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Probe the real system device.
pub fn system_capabilities() -> QosCapabilities {
    check_qos_capabilities(Path::new(DEFAULT_DEVICE))
}

/// Check all prerequisites for tests that hold the real constraint.
pub fn check_qos_prerequisites() -> Result<(), String> {
    let caps = system_capabilities();

    if !caps.device_present {
        return Err(format!("{DEFAULT_DEVICE} not present - kernel lacks PM QOS"));
    }
    if !caps.device_accessible {
        return Err(format!(
            "{DEFAULT_DEVICE} not writable - run as root (is_root={})",
            caps.is_root
        ));
    }
    if caps.current_latency_us.is_none() {
        eprintln!("WARNING: current latency target not readable");
    }
    Ok(())
}
