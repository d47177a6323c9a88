//! Capability probe for the PM QOS device.
//!
//! Reports whether a latency constraint can be taken without taking one.

use nix::unistd::{access, geteuid, AccessFlags};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Information about PM QOS capabilities of the system.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QosCapabilities {
    /// Device that was probed.
    pub device: PathBuf,
    /// Whether running as root.
    pub is_root: bool,
    /// Whether the device node exists.
    pub device_present: bool,
    /// Whether the device is readable and writable by this process.
    pub device_accessible: bool,
    /// Effective system-wide latency target in microseconds, if readable.
    pub current_latency_us: Option<i32>,
    /// Whether running on a PREEMPT_RT kernel.
    pub preempt_rt: bool,
}

impl QosCapabilities {
    /// Check if an acquire is likely to succeed.
    #[must_use]
    pub fn can_acquire(&self) -> bool {
        self.device_present && self.device_accessible
    }
}

/// Probe `device` and the running kernel.
///
/// Never fails; anything that cannot be determined reads as `false`/`None`.
pub fn check_qos_capabilities(device: &Path) -> QosCapabilities {
    let device_present = device.exists();
    let device_accessible =
        device_present && access(device, AccessFlags::R_OK | AccessFlags::W_OK).is_ok();

    let caps = QosCapabilities {
        device: device.to_path_buf(),
        is_root: geteuid().is_root(),
        device_present,
        device_accessible,
        current_latency_us: if device_accessible {
            read_current_latency(device)
        } else {
            None
        },
        preempt_rt: fs::read_to_string("/proc/version")
            .map(|v| v.contains("PREEMPT_RT") || v.contains("PREEMPT RT"))
            .unwrap_or(false),
    };

    debug!(?caps, "PM QOS capabilities probed");
    caps
}

/// Read the aggregated latency target the kernel is currently enforcing.
///
/// Returns `None` if the device cannot be read or yields fewer than four
/// bytes.
pub fn read_current_latency(device: &Path) -> Option<i32> {
    let mut buf = [0u8; 4];
    let mut file = File::open(device).ok()?;
    file.read_exact(&mut buf).ok()?;
    Some(i32::from_ne_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_missing_device() {
        let dir = TempDir::new().unwrap();
        let caps = check_qos_capabilities(&dir.path().join("cpu_dma_latency"));
        assert!(!caps.device_present);
        assert!(!caps.device_accessible);
        assert!(caps.current_latency_us.is_none());
        assert!(!caps.can_acquire());
    }

    #[test]
    fn test_accessible_device() {
        let mut dev = NamedTempFile::new().unwrap();
        dev.write_all(&2_000_000_000i32.to_ne_bytes()).unwrap();
        dev.flush().unwrap();

        let caps = check_qos_capabilities(dev.path());
        assert!(caps.device_present);
        assert!(caps.device_accessible);
        assert!(caps.can_acquire());
        assert_eq!(caps.current_latency_us, Some(2_000_000_000));
    }

    #[test]
    fn test_short_read_is_none() {
        let mut dev = NamedTempFile::new().unwrap();
        dev.write_all(&[1, 2]).unwrap();
        dev.flush().unwrap();

        assert!(read_current_latency(dev.path()).is_none());
    }

    #[test]
    fn test_serializes_to_json() {
        let dev = NamedTempFile::new().unwrap();
        let caps = check_qos_capabilities(dev.path());
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["device_present"], true);
        assert!(json["current_latency_us"].is_null());
    }
}
