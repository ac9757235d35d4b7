//! Line-oriented text protocol over a `Channel`.
//!
//! `LineSocket` layers four pieces on top of a raw duplex byte stream:
//! - the reader (`read_line`), which accumulates a line across repeated
//!   non-blocking calls
//! - the echo policy, which writes received bytes back to interactive peers
//! - the writer (`write_line`), which sends one terminated line at a time
//! - the partial-buffer inspector (`clear_partial`, `compare_partial`)
//!
//! Reads and writes are guarded by two independent mutexes, so one thread can
//! block in `read_line` while another calls `write_line` on the same socket.
//!
//! ## Wire format
//!
//! ```text
//! <payload><CR><LF>     default
//! <payload><LF><CR>     LineEnding::LfCr, for legacy peers
//! ```
//!
//! Inbound, either CR or LF alone ends a line; the other half of the pair
//! shows up as a bare terminator at the start of the next line and is
//! skipped.

mod buffer;
mod echo;
mod reader;
mod stats;
mod writer;

pub use buffer::DEFAULT_LINE_CAPACITY;
pub use reader::LineRead;
pub use stats::{FaultState, TransferStats};
pub use writer::{MAX_LINE_LEN, MAX_WRITE_LEN};

use crate::channel::{Channel, Transfer, Wait};
use buffer::LineBuffer;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use stats::{Counters, FaultFlag};
use std::cmp::Ordering as CmpOrdering;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Order of the two terminator bytes on outbound lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// CR then LF.
    #[default]
    #[value(name = "crlf")]
    CrLf,
    /// LF then CR.
    #[value(name = "lfcr")]
    LfCr,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8; 2] {
        match self {
            LineEnding::CrLf => b"\r\n",
            LineEnding::LfCr => b"\n\r",
        }
    }
}

/// Per-connection behaviour of a `LineSocket`.
#[derive(Debug, Clone)]
pub struct LineOptions {
    /// Inbound line capacity in bytes.
    pub capacity: usize,
    /// Terminator order for outbound lines.
    pub line_ending: LineEnding,
    /// Always echo received bytes.
    pub echo: bool,
    /// Echo received bytes unless the peer sent escape bytes.
    pub auto_echo: bool,
    /// Drop CR bytes instead of treating them as terminators.
    pub ignore_return: bool,
    /// Latch `bad_read`/`bad_write` on hard I/O errors.
    pub error_tracking: bool,
    /// Log every line sent.
    pub log_writes: bool,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LINE_CAPACITY,
            line_ending: LineEnding::CrLf,
            echo: false,
            auto_echo: true,
            ignore_return: false,
            error_tracking: false,
            log_writes: false,
        }
    }
}

/// State owned by the read side. Only touched under the read mutex.
#[derive(Debug)]
pub(crate) struct ReadState {
    buf: LineBuffer,
    /// A high-bit byte arrived at the start of a line.
    got_escape_chars: bool,
    /// A terminator was consumed and its echo is still pending.
    got_complete_line: bool,
    /// At least one echo happened since the last reset.
    have_echoed: bool,
    echo: bool,
    auto_echo: bool,
    ignore_return: bool,
    last_line_read: DateTime<Utc>,
}

impl ReadState {
    fn new(options: &LineOptions) -> Self {
        Self {
            buf: LineBuffer::new(options.capacity),
            got_escape_chars: false,
            got_complete_line: false,
            have_echoed: false,
            echo: options.echo,
            auto_echo: options.auto_echo,
            ignore_return: options.ignore_return,
            last_line_read: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.last_line_read = Utc::now();
    }
}

/// A line-oriented text connection over a channel.
#[derive(Debug)]
pub struct LineSocket<C: Channel> {
    channel: C,
    read_state: Mutex<ReadState>,
    /// Serializes line writers against each other.
    write_lock: Mutex<()>,
    line_ending: LineEnding,
    log_writes: AtomicBool,
    error_tracking: AtomicBool,
    counters: Counters,
    bad_read: FaultFlag,
    bad_write: FaultFlag,
}

impl<C: Channel> LineSocket<C> {
    /// Wrap `channel` with default options.
    pub fn new(channel: C) -> Self {
        Self::with_options(channel, LineOptions::default())
    }

    pub fn with_options(channel: C, options: LineOptions) -> Self {
        Self {
            read_state: Mutex::new(ReadState::new(&options)),
            write_lock: Mutex::new(()),
            line_ending: options.line_ending,
            log_writes: AtomicBool::new(options.log_writes),
            error_tracking: AtomicBool::new(options.error_tracking),
            counters: Counters::default(),
            bad_read: FaultFlag::new(),
            bad_write: FaultFlag::new(),
            channel,
        }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn peer(&self) -> &str {
        self.channel.peer()
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Inbound line capacity.
    pub fn capacity(&self) -> usize {
        self.lock_read().buf.capacity()
    }

    /// Discard the unterminated line. Idempotent.
    pub fn clear_partial(&self) {
        let mut state = self.lock_read();
        state.buf.clear();
        state.got_escape_chars = false;
        state.got_complete_line = false;
        state.have_echoed = false;
    }

    /// Compare `prefix` against the start of the unterminated line, the way
    /// `strncmp(prefix, partial, prefix.len())` would.
    pub fn compare_partial(&self, prefix: &[u8]) -> CmpOrdering {
        self.lock_read().buf.compare_prefix(prefix)
    }

    /// Copy of the unterminated line.
    pub fn partial(&self) -> Bytes {
        Bytes::copy_from_slice(self.lock_read().buf.contents())
    }

    /// Whether the current peer has sent escape bytes at a line start.
    pub fn got_escape_chars(&self) -> bool {
        self.lock_read().got_escape_chars
    }

    /// When a read last made progress.
    pub fn last_line_read(&self) -> DateTime<Utc> {
        self.lock_read().last_line_read
    }

    pub fn set_echo(&self, echo: bool) {
        self.lock_read().echo = echo;
    }

    pub fn set_auto_echo(&self, auto_echo: bool) {
        self.lock_read().auto_echo = auto_echo;
    }

    pub fn set_ignore_return(&self, ignore_return: bool) {
        self.lock_read().ignore_return = ignore_return;
    }

    pub fn set_log_writes(&self, log_writes: bool) {
        self.log_writes.store(log_writes, Ordering::Relaxed);
    }

    pub fn set_error_tracking(&self, error_tracking: bool) {
        self.error_tracking.store(error_tracking, Ordering::Relaxed);
    }

    pub fn bad_read(&self) -> FaultState {
        self.bad_read.get()
    }

    pub fn bad_write(&self) -> FaultState {
        self.bad_write.get()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.counters.snapshot().bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.counters.snapshot().bytes_received
    }

    pub fn send_count(&self) -> u64 {
        self.counters.snapshot().send_count
    }

    pub fn recv_count(&self) -> u64 {
        self.counters.snapshot().recv_count
    }

    /// All four counters at once.
    pub fn stats(&self) -> TransferStats {
        self.counters.snapshot()
    }

    /// Zero the transfer counters. Fault flags are not affected.
    pub fn reset_tracking(&self) {
        self.counters.reset();
    }

    /// Shut the channel down. Reads in flight or later observe closure.
    pub fn shutdown(&self) -> io::Result<()> {
        debug!(peer = %self.peer(), "Shutting down line socket");
        self.channel.shutdown()
    }

    fn lock_read(&self) -> MutexGuard<'_, ReadState> {
        self.read_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_write(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// One counted, classified channel read.
    fn raw_read(&self, buf: &mut [u8], wait: Wait) -> Transfer {
        let transfer = Transfer::from_read(
            self.channel.read(buf, wait),
            self.channel.is_nonblocking(),
        );
        if let Transfer::Data(n) = &transfer {
            self.counters.record_recv(*n);
        }
        if self.error_tracking.load(Ordering::Relaxed) {
            match &transfer {
                Transfer::Hard(_) => self.bad_read.mark_faulted(),
                _ => self.bad_read.mark_clean(),
            }
        }
        transfer
    }

    /// One counted channel write. Not being writable right now is `Ok(0)`.
    fn raw_write(&self, buf: &[u8]) -> io::Result<usize> {
        let transfer = Transfer::from_write(
            self.channel.write(buf),
            self.channel.is_nonblocking(),
        );
        let tracking = self.error_tracking.load(Ordering::Relaxed);
        match transfer {
            Transfer::Data(n) => {
                self.counters.record_send(n);
                if tracking {
                    self.bad_write.mark_clean();
                }
                Ok(n)
            }
            Transfer::Hard(e) => {
                if tracking {
                    self.bad_write.mark_faulted();
                }
                Err(e)
            }
            _ => {
                if tracking {
                    self.bad_write.mark_clean();
                }
                Ok(0)
            }
        }
    }
}
