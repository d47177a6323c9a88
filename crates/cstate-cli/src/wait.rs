//! Blocking wait between acquire and release.

use crate::signals::{SignalHandler, SignalKind};
use cstate_common::config::{GuardConfig, WaitMode};
use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// A line was read from stdin.
    Input,
    /// Stdin reached end-of-file (or failed).
    InputClosed,
    /// A termination signal arrived.
    Signal(Option<SignalKind>),
    /// `hold_for` elapsed.
    Timeout,
    /// Wait mode `none`.
    Immediate,
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::InputClosed => write!(f, "stdin closed"),
            Self::Signal(Some(kind)) => write!(f, "{kind}"),
            Self::Signal(None) => write!(f, "release requested"),
            Self::Timeout => write!(f, "hold time elapsed"),
            Self::Immediate => write!(f, "immediate"),
        }
    }
}

/// Print the configured prompt and block until the constraint should go.
pub fn hold(config: &GuardConfig, signals: &SignalHandler) -> ReleaseReason {
    if config.wait == WaitMode::None {
        return ReleaseReason::Immediate;
    }

    if let Some(prompt) = config.prompt_text() {
        let mut stdout = io::stdout().lock();
        // Nothing useful to do if the terminal is gone; keep holding.
        let _ = writeln!(stdout, "{prompt}");
        let _ = stdout.flush();
    }

    let input = (config.wait == WaitMode::Enter)
        .then(|| spawn_line_reader(io::BufReader::new(io::stdin())));
    wait_for_release(input.as_ref(), signals, config.hold_for)
}

/// Read one line on a background thread and report how reading ended.
pub fn spawn_line_reader<R>(mut reader: R) -> Receiver<ReleaseReason>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let reason = match reader.read_line(&mut line) {
            Ok(0) => ReleaseReason::InputClosed,
            Ok(_) => ReleaseReason::Input,
            Err(e) => {
                warn!(error = %e, "Failed to read from stdin");
                ReleaseReason::InputClosed
            }
        };
        let _ = tx.send(reason);
    });
    rx
}

/// Block until input arrives, a signal is received, or `timeout` elapses.
///
/// With no input channel and no timeout this waits for a signal only. A
/// timeout too large to represent as an instant is treated as no timeout.
pub fn wait_for_release(
    input: Option<&Receiver<ReleaseReason>>,
    signals: &SignalHandler,
    timeout: Option<Duration>,
) -> ReleaseReason {
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    let mut input = input;

    loop {
        if signals.release_requested() {
            return ReleaseReason::Signal(signals.state().last_signal());
        }

        let wait = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    debug!("Hold time elapsed");
                    return ReleaseReason::Timeout;
                }
                POLL_INTERVAL.min(deadline - now)
            }
            None => POLL_INTERVAL,
        };

        match input {
            Some(rx) => match rx.recv_timeout(wait) {
                Ok(reason) => return reason,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Reader thread died without reporting; stop listening.
                    input = None;
                }
            },
            None => std::thread::sleep(wait),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_line_reader_reports_input() {
        let rx = spawn_line_reader(Cursor::new(b"\n".to_vec()));
        assert_eq!(rx.recv().unwrap(), ReleaseReason::Input);
    }

    #[test]
    fn test_line_reader_reports_eof() {
        let rx = spawn_line_reader(Cursor::new(Vec::new()));
        assert_eq!(rx.recv().unwrap(), ReleaseReason::InputClosed);
    }

    #[test]
    fn test_wait_returns_on_input() {
        let signals = SignalHandler::new().unwrap();
        let rx = spawn_line_reader(Cursor::new(b"go\n".to_vec()));
        let reason = wait_for_release(Some(&rx), &signals, None);
        assert_eq!(reason, ReleaseReason::Input);
    }

    #[test]
    fn test_wait_times_out() {
        let signals = SignalHandler::new().unwrap();
        let start = Instant::now();
        let reason = wait_for_release(None, &signals, Some(Duration::from_millis(120)));
        assert_eq!(reason, ReleaseReason::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn test_wait_returns_on_release_request() {
        let signals = SignalHandler::new().unwrap();
        signals.request_release();
        let reason = wait_for_release(None, &signals, Some(Duration::from_secs(10)));
        assert!(matches!(reason, ReleaseReason::Signal(_)));
    }

    #[test]
    fn test_unrepresentable_timeout_waits_without_deadline() {
        let signals = SignalHandler::new().unwrap();
        signals.request_release();
        let reason = wait_for_release(None, &signals, Some(Duration::MAX));
        assert!(matches!(reason, ReleaseReason::Signal(_)));
    }

    #[test]
    fn test_unrepresentable_timeout_still_takes_input() {
        let signals = SignalHandler::new().unwrap();
        let rx = spawn_line_reader(Cursor::new(b"\n".to_vec()));
        let reason = wait_for_release(Some(&rx), &signals, Some(Duration::MAX));
        assert_eq!(reason, ReleaseReason::Input);
    }

    #[test]
    fn test_none_mode_is_immediate() {
        let signals = SignalHandler::new().unwrap();
        let config = GuardConfig {
            wait: WaitMode::None,
            ..Default::default()
        };
        assert_eq!(hold(&config, &signals), ReleaseReason::Immediate);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(ReleaseReason::Timeout.to_string(), "hold time elapsed");
        assert_eq!(
            ReleaseReason::Signal(Some(SignalKind::Terminate)).to_string(),
            "SIGTERM"
        );
    }
}
