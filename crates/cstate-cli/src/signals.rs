//! Signal handling so the latency constraint is released on termination.
//!
//! SIGTERM, SIGINT and SIGHUP would otherwise kill the process without
//! running destructors. They are turned into a release request that the
//! wait loop polls, so the guard is dropped on the normal path.

use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Signal types that release the constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM - Graceful termination request.
    Terminate,
    /// SIGINT - Interrupt (Ctrl+C).
    Interrupt,
    /// SIGHUP - Controlling terminal went away.
    Hangup,
}

impl SignalKind {
    fn from_raw(signum: c_int) -> Option<Self> {
        match signum {
            libc::SIGTERM => Some(Self::Terminate),
            libc::SIGINT => Some(Self::Interrupt),
            libc::SIGHUP => Some(Self::Hangup),
            _ => None,
        }
    }

    fn code(self) -> u32 {
        match self {
            Self::Terminate => 1,
            Self::Interrupt => 2,
            Self::Hangup => 3,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Terminate),
            2 => Some(Self::Interrupt),
            3 => Some(Self::Hangup),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Interrupt => write!(f, "SIGINT"),
            SignalKind::Hangup => write!(f, "SIGHUP"),
        }
    }
}

/// Shared state between the signal poller and the wait loop.
#[derive(Debug, Default)]
pub struct SignalState {
    /// Set once a release has been requested.
    release_requested: AtomicBool,
    /// Count of signals received (for diagnostics).
    signal_count: AtomicU32,
    /// Code of the most recent signal (0 = none).
    last_signal: AtomicU32,
}

impl SignalState {
    /// Create a new signal state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a release has been requested.
    #[inline]
    pub fn release_requested(&self) -> bool {
        self.release_requested.load(Ordering::Acquire)
    }

    /// Request release (can be called from any thread).
    pub fn request_release(&self) {
        self.release_requested.store(true, Ordering::Release);
    }

    /// Record a signal and request release.
    fn record_signal(&self, kind: SignalKind) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        self.last_signal.store(kind.code(), Ordering::Relaxed);
        self.request_release();
    }

    /// Get the total number of signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }

    /// The most recent signal, if any arrived.
    pub fn last_signal(&self) -> Option<SignalKind> {
        SignalKind::from_code(self.last_signal.load(Ordering::Relaxed))
    }
}

/// Signal number stored by the handler, consumed by the poll thread.
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_signal(signum: c_int) {
    PENDING_SIGNAL.store(signum, Ordering::Relaxed);
}

/// Handle for signal management.
#[derive(Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a new signal handler and register SIGTERM, SIGINT and SIGHUP.
    pub fn new() -> std::io::Result<Self> {
        let handler = Self {
            state: Arc::new(SignalState::new()),
        };
        handler.register_unix_handlers()?;
        Ok(handler)
    }

    /// Register Unix signal handlers.
    ///
    /// The handler itself only stores the signal number; a poll thread
    /// moves it into the shared state outside signal context.
    fn register_unix_handlers(&self) -> std::io::Result<()> {
        let state = Arc::clone(&self.state);
        std::thread::Builder::new()
            .name("signal-poll".into())
            .spawn(move || loop {
                let signum = PENDING_SIGNAL.swap(0, Ordering::Relaxed);
                if let Some(kind) = SignalKind::from_raw(signum) {
                    info!(signal = %kind, "Signal received, releasing latency constraint");
                    state.record_signal(kind);
                }
                if state.release_requested() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            })?;

        for signum in [libc::SIGTERM, libc::SIGINT, libc::SIGHUP] {
            // SAFETY: `on_signal` only performs an atomic store, which is
            // async-signal-safe.
            let previous = unsafe { libc::signal(signum, on_signal as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                return Err(std::io::Error::last_os_error());
            }
        }

        debug!("Unix signal handlers registered");
        Ok(())
    }

    /// Check if a release has been requested.
    #[inline]
    pub fn release_requested(&self) -> bool {
        self.state.release_requested()
    }

    /// Manually request release.
    #[cfg(test)]
    pub fn request_release(&self) {
        debug!("Manual release requested");
        self.state.request_release();
    }

    /// Get the signal state for inspection.
    pub fn state(&self) -> &SignalState {
        &self.state
    }
}
