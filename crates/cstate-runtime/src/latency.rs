//! PM QOS latency guard.
//!
//! Holding `/dev/cpu_dma_latency` open with a target of 0 µs keeps the
//! kernel's cpuidle governor out of every C-state whose exit latency
//! exceeds the target. The kernel drops the request as soon as the file
//! descriptor is closed, so the handle's lifetime is the constraint's
//! lifetime.
//!
//! The guard never terminates the process: open and write failures come
//! back as [`QosError`] and the caller chooses the policy.

use cstate_common::config::{GuardConfig, DEFAULT_DEVICE};
use cstate_common::error::{QosError, QosResult};
use cstate_common::state::GuardState;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Owner of a single latency constraint handle.
///
/// At most one handle is open per guard. Dropping the guard releases it.
#[derive(Debug)]
pub struct LatencyGuard {
    /// Latency-control device path.
    device: PathBuf,
    /// Value written after open, in microseconds.
    target_latency_us: i32,
    /// Open handle while the constraint is held.
    handle: Option<File>,
    /// Lifecycle state.
    state: GuardState,
    /// Number of successful acquisitions (re-acquires after release count).
    acquisitions: u64,
    /// When the current handle was opened.
    acquired_at: Option<Instant>,
}

impl LatencyGuard {
    /// Create a guard for `device` that will request `target_latency_us`.
    ///
    /// Nothing is opened until [`acquire`](Self::acquire).
    ///
    /// # Errors
    ///
    /// Returns [`QosError::InvalidTarget`] if the target is negative.
    pub fn new(device: impl Into<PathBuf>, target_latency_us: i32) -> QosResult<Self> {
        if target_latency_us < 0 {
            return Err(QosError::InvalidTarget(target_latency_us));
        }
        Ok(Self {
            device: device.into(),
            target_latency_us,
            handle: None,
            state: GuardState::Unacquired,
            acquisitions: 0,
            acquired_at: None,
        })
    }

    /// Guard for the system device with the strictest (zero) target.
    #[must_use]
    pub fn system() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            target_latency_us: 0,
            handle: None,
            state: GuardState::Unacquired,
            acquisitions: 0,
            acquired_at: None,
        }
    }

    /// Build a guard from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error of `config`.
    pub fn from_config(config: &GuardConfig) -> QosResult<Self> {
        config.validate()?;
        Self::new(config.device.clone(), config.target_latency_us)
    }

    /// Open the device and write the latency target.
    ///
    /// A no-op if the constraint is already held.
    ///
    /// # Errors
    ///
    /// - [`QosError::DeviceUnavailable`] if the device cannot be opened
    ///   read/write. Nothing is written in that case.
    /// - [`QosError::WriteFailed`] if the target cannot be written; the
    ///   handle is closed again before returning.
    pub fn acquire(&mut self) -> QosResult<()> {
        if self.handle.is_some() {
            debug!(device = %self.device.display(), "Latency constraint already held");
            return Ok(());
        }

        debug!(
            device = %self.device.display(),
            target_us = self.target_latency_us,
            "Opening PM QOS device"
        );

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device)
            .map_err(|source| QosError::DeviceUnavailable {
                path: self.device.clone(),
                source,
            })?;

        // The kernel reads exactly one s32 in native byte order.
        file.write_all(&self.target_latency_us.to_ne_bytes())
            .map_err(|source| QosError::WriteFailed {
                path: self.device.clone(),
                source,
            })?;

        self.state.transition_to(GuardState::Acquired)?;
        self.handle = Some(file);
        self.acquired_at = Some(Instant::now());
        self.acquisitions += 1;

        info!(
            device = %self.device.display(),
            target_us = self.target_latency_us,
            "Latency constraint acquired"
        );
        Ok(())
    }

    /// Close the handle and let normal power management resume.
    ///
    /// A no-op if nothing is held. Close errors are ignored.
    pub fn release(&mut self) {
        let Some(file) = self.handle.take() else {
            return;
        };
        drop(file);

        let held = self.acquired_at.take().map(|t| t.elapsed());
        self.state = GuardState::Released;

        info!(
            device = %self.device.display(),
            held_for = %humantime::format_duration(round_to_millis(held.unwrap_or_default())),
            "Latency constraint released"
        );
    }

    /// Whether a handle is currently open.
    #[inline]
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.handle.is_some()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Number of times the constraint has been acquired.
    #[must_use]
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    /// How long the current constraint has been held.
    #[must_use]
    pub fn held_for(&self) -> Option<Duration> {
        self.acquired_at.map(|t| t.elapsed())
    }

    /// Device path this guard writes to.
    #[must_use]
    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Requested latency in microseconds.
    #[must_use]
    pub fn target_latency_us(&self) -> i32 {
        self.target_latency_us
    }
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn round_to_millis(d: Duration) -> Duration {
    Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
