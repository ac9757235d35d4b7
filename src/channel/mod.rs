//! Duplex byte-stream channels.
//!
//! The line reader/writer never touches sockets directly. It talks to a
//! `Channel`, which provides:
//! - a read bounded by a `Wait` window
//! - a write that never waits for the peer
//! - enough error detail to tell "would block" from a hard failure
//!
//! Two implementations ship with the crate:
//! - `TcpChannel`: a connected TCP stream, readiness checked with `poll(2)`
//! - `ScriptedChannel`: an in-memory peer replaying canned read results

mod scripted;
mod tcp;

pub use scripted::{ScriptedChannel, ScriptedRead};
pub use tcp::TcpChannel;

use std::io;
use std::time::{Duration, Instant};

/// How long a read may wait for the channel to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Make a single immediate attempt.
    NoWait,
    /// Wait up to this long.
    For(Duration),
    /// Wait until data, closure or an error arrives.
    Forever,
}

impl Wait {
    /// Millisecond form used by callers that think in timeouts: 0 means
    /// "don't wait".
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Wait::NoWait
        } else {
            Wait::For(Duration::from_millis(ms))
        }
    }

    /// Timeout in milliseconds for `poll(2)`: 0 for immediate, -1 for forever.
    pub(crate) fn as_poll_timeout(self) -> libc::c_int {
        match self {
            Wait::NoWait => 0,
            Wait::For(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            Wait::Forever => -1,
        }
    }
}

/// A single overall deadline for one logical operation.
///
/// Computed once when the operation starts so that retries inside the
/// operation share the caller's budget instead of restarting it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
    Immediate,
    At(Instant),
    Never,
}

impl Deadline {
    pub(crate) fn start(wait: Wait) -> Self {
        match wait {
            Wait::NoWait => Deadline::Immediate,
            Wait::For(d) => Instant::now()
                .checked_add(d)
                .map_or(Deadline::Never, Deadline::At),
            Wait::Forever => Deadline::Never,
        }
    }

    /// The wait window left for the next channel read.
    pub(crate) fn remaining(&self) -> Wait {
        match *self {
            Deadline::Immediate => Wait::NoWait,
            Deadline::At(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Wait::NoWait
                } else {
                    Wait::For(left)
                }
            }
            Deadline::Never => Wait::Forever,
        }
    }

    pub(crate) fn expired(&self) -> bool {
        match *self {
            Deadline::Immediate => true,
            Deadline::At(at) => Instant::now() >= at,
            Deadline::Never => false,
        }
    }
}

/// A duplex byte stream the line protocol runs over.
///
/// Implementations must be usable from two threads at once: one reading,
/// one writing.
pub trait Channel: Send + Sync {
    /// Read into `buf`, waiting at most `wait` for readability.
    ///
    /// `Ok(0)` means the peer closed the connection. A wait window that
    /// elapses without data is reported as `ErrorKind::TimedOut`; a
    /// non-blocking read with nothing pending as `ErrorKind::WouldBlock`.
    fn read(&self, buf: &mut [u8], wait: Wait) -> io::Result<usize>;

    /// Write from `buf` without waiting. Returns `Ok(0)` when the channel is
    /// not immediately writable.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Whether the underlying stream is in non-blocking mode.
    fn is_nonblocking(&self) -> bool;

    /// Printable peer identity for log messages.
    fn peer(&self) -> &str;

    /// Shut both directions down. Later reads observe closure.
    fn shutdown(&self) -> io::Result<()>;
}

/// Classified result of one channel transfer.
#[derive(Debug)]
pub enum Transfer {
    /// Strictly positive byte count.
    Data(usize),
    /// Zero-byte read: the peer closed the connection.
    Closed,
    /// Nothing available right now. Not an error.
    WouldBlock,
    /// Zero-byte write: the peer is backed up. Not an error.
    Backpressure,
    /// A genuine I/O failure.
    Hard(io::Error),
}

impl Transfer {
    /// Classify a read result.
    pub fn from_read(result: io::Result<usize>, nonblocking: bool) -> Self {
        match result {
            Ok(0) => Transfer::Closed,
            Ok(n) => Transfer::Data(n),
            Err(e) if is_transient(&e, nonblocking) => Transfer::WouldBlock,
            Err(e) => Transfer::Hard(e),
        }
    }

    /// Classify a write result.
    pub fn from_write(result: io::Result<usize>, nonblocking: bool) -> Self {
        match result {
            Ok(0) => Transfer::Backpressure,
            Ok(n) => Transfer::Data(n),
            Err(e) if is_transient(&e, nonblocking) => Transfer::Backpressure,
            Err(e) => Transfer::Hard(e),
        }
    }
}

/// Would-block only counts as transient in non-blocking mode; an expired
/// wait window always does.
fn is_transient(e: &io::Error, nonblocking: bool) -> bool {
    match e.kind() {
        io::ErrorKind::TimedOut => true,
        io::ErrorKind::WouldBlock => nonblocking,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_from_millis() {
        assert_eq!(Wait::from_millis(0), Wait::NoWait);
        assert_eq!(Wait::from_millis(250), Wait::For(Duration::from_millis(250)));
    }

    #[test]
    fn test_poll_timeout() {
        assert_eq!(Wait::NoWait.as_poll_timeout(), 0);
        assert_eq!(Wait::Forever.as_poll_timeout(), -1);
        assert_eq!(Wait::For(Duration::from_millis(1500)).as_poll_timeout(), 1500);
    }

    #[test]
    fn test_deadline() {
        assert!(Deadline::start(Wait::NoWait).expired());
        assert_eq!(Deadline::start(Wait::NoWait).remaining(), Wait::NoWait);
        assert!(!Deadline::start(Wait::Forever).expired());
        assert_eq!(Deadline::start(Wait::Forever).remaining(), Wait::Forever);

        let d = Deadline::start(Wait::For(Duration::from_secs(60)));
        assert!(!d.expired());
        assert!(matches!(d.remaining(), Wait::For(left) if left <= Duration::from_secs(60)));

        let d = Deadline::start(Wait::For(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(d.expired());
        assert_eq!(d.remaining(), Wait::NoWait);
    }

    #[test]
    fn test_classify_read() {
        assert!(matches!(Transfer::from_read(Ok(0), true), Transfer::Closed));
        assert!(matches!(Transfer::from_read(Ok(3), true), Transfer::Data(3)));

        let would_block = || Err(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(matches!(
            Transfer::from_read(would_block(), true),
            Transfer::WouldBlock
        ));
        // Blocking sockets never legitimately report would-block.
        assert!(matches!(
            Transfer::from_read(would_block(), false),
            Transfer::Hard(_)
        ));

        let timed_out = || Err(io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(
            Transfer::from_read(timed_out(), false),
            Transfer::WouldBlock
        ));

        let reset = Err(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(Transfer::from_read(reset, true), Transfer::Hard(_)));

        let interrupted = || Err(io::Error::from(io::ErrorKind::Interrupted));
        assert!(matches!(
            Transfer::from_read(interrupted(), false),
            Transfer::Hard(_)
        ));
        assert!(matches!(
            Transfer::from_read(interrupted(), true),
            Transfer::Hard(_)
        ));
    }

    #[test]
    fn test_classify_write() {
        assert!(matches!(
            Transfer::from_write(Ok(0), false),
            Transfer::Backpressure
        ));
        assert!(matches!(Transfer::from_write(Ok(7), false), Transfer::Data(7)));
        assert!(matches!(
            Transfer::from_write(Err(io::Error::from(io::ErrorKind::WouldBlock)), true),
            Transfer::Backpressure
        ));
        assert!(matches!(
            Transfer::from_write(Err(io::Error::from(io::ErrorKind::BrokenPipe)), true),
            Transfer::Hard(_)
        ));
    }
}
