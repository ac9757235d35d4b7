//! Line writer.

use super::LineSocket;
use crate::channel::Channel;
use std::fmt::{self, Write as _};
use std::io;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

/// Size of the per-call scratch buffer for one outbound line.
pub const MAX_WRITE_LEN: usize = 10_000;

/// Longest message sent; anything past this is truncated. Leaves room for
/// the two terminator bytes plus one spare byte.
pub const MAX_LINE_LEN: usize = MAX_WRITE_LEN - 3;

/// Format a line and send it on a `LineSocket`.
///
/// ```ignore
/// write_line!(sock, "{} users online", count)?;
/// ```
#[macro_export]
macro_rules! write_line {
    ($sock:expr, $($arg:tt)*) => {
        $sock.write_line(::std::format_args!($($arg)*))
    };
}

/// `fmt::Write` sink that silently drops whatever exceeds `limit` bytes.
struct Truncating {
    buf: Vec<u8>,
    limit: usize,
}

impl Truncating {
    fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(256) + 2),
            limit,
        }
    }
}

impl fmt::Write for Truncating {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit - self.buf.len();
        let take = s.len().min(room);
        self.buf.extend_from_slice(&s.as_bytes()[..take]);
        Ok(())
    }
}

impl<C: Channel> LineSocket<C> {
    /// Send one formatted line followed by the connection's terminator.
    ///
    /// Never waits for the peer: if the channel is not writable right now
    /// the result is `Ok(0)`. Returns the raw byte count written, which may
    /// be short of the full line.
    ///
    /// # Errors
    ///
    /// Returns the channel's error on a hard send failure.
    pub fn write_line(&self, args: fmt::Arguments<'_>) -> io::Result<usize> {
        let mut line = Truncating::with_limit(MAX_LINE_LEN);
        let _ = line.write_fmt(args);
        let text_len = line.buf.len();
        let mut buf = line.buf;
        buf.extend_from_slice(self.line_ending.as_bytes());

        let _guard = self.lock_write();
        let result = self.raw_write(&buf);

        let text = String::from_utf8_lossy(&buf[..text_len]);
        match &result {
            Ok(0) => warn!(peer = %self.peer(), line = %text, "Problem sending (backed up)"),
            Ok(n) if self.log_writes.load(Ordering::Relaxed) => {
                info!(peer = %self.peer(), bytes = n, line = %text, "Sent line")
            }
            Ok(_) => {}
            Err(e) => warn!(
                peer = %self.peer(),
                code = ?e.raw_os_error(),
                error = %e,
                line = %text,
                "Problem sending"
            ),
        }
        result
    }
}
