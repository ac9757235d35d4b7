//! In-memory channel replaying a script of read results.
//!
//! Used to drive the line reader against a fake peer: every queued entry is
//! handed out by successive `read` calls, and everything written is captured
//! for inspection.

use super::{Channel, Wait};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One scripted read result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRead {
    /// Bytes delivered to the reader (split across reads if the caller's
    /// buffer is smaller).
    Data(Vec<u8>),
    /// A non-blocking read with nothing pending.
    WouldBlock,
    /// A wait window that elapsed without data.
    TimedOut,
    /// The peer closes the connection. Every later read returns `Ok(0)`.
    Close,
    /// A hard failure of the given kind.
    Error(io::ErrorKind),
}

/// Scripted in-memory peer.
#[derive(Debug)]
pub struct ScriptedChannel {
    script: Mutex<VecDeque<ScriptedRead>>,
    written: Mutex<Vec<u8>>,
    write_failure: Mutex<Option<io::ErrorKind>>,
    backed_up: AtomicBool,
    closed: AtomicBool,
    nonblocking: bool,
    peer: String,
}

impl ScriptedChannel {
    /// Create an empty script. Once the script runs dry, reads report
    /// would-block (non-blocking mode) or an expired wait window.
    pub fn new(nonblocking: bool) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            write_failure: Mutex::new(None),
            backed_up: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            nonblocking,
            peer: "scripted".to_string(),
        }
    }

    /// Queue a read result.
    pub fn push(&self, read: ScriptedRead) -> &Self {
        lock(&self.script).push_back(read);
        self
    }

    /// Queue bytes as a single chunk.
    pub fn feed(&self, bytes: &[u8]) -> &Self {
        self.push(ScriptedRead::Data(bytes.to_vec()))
    }

    /// Number of script entries not yet consumed.
    pub fn pending(&self) -> usize {
        lock(&self.script).len()
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.written).clone()
    }

    /// Everything written so far, clearing the capture.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.written))
    }

    /// Make writes report a backed-up peer (zero bytes written).
    pub fn set_backed_up(&self, backed_up: bool) {
        self.backed_up.store(backed_up, Ordering::Relaxed);
    }

    /// Make writes fail with `kind`, or succeed again with `None`.
    pub fn fail_writes(&self, kind: Option<io::ErrorKind>) {
        *lock(&self.write_failure) = kind;
    }
}

impl Channel for ScriptedChannel {
    fn read(&self, buf: &mut [u8], _wait: Wait) -> io::Result<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(0);
        }
        let mut script = lock(&self.script);
        match script.pop_front() {
            Some(ScriptedRead::Data(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    script.push_front(ScriptedRead::Data(chunk.split_off(n)));
                }
                Ok(n)
            }
            Some(ScriptedRead::WouldBlock) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Some(ScriptedRead::TimedOut) => Err(io::Error::from(io::ErrorKind::TimedOut)),
            Some(ScriptedRead::Close) => {
                self.closed.store(true, Ordering::Relaxed);
                Ok(0)
            }
            Some(ScriptedRead::Error(kind)) => Err(io::Error::from(kind)),
            None if self.nonblocking => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            None => Err(io::Error::from(io::ErrorKind::TimedOut)),
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = *lock(&self.write_failure) {
            return Err(io::Error::from(kind));
        }
        if self.backed_up.load(Ordering::Relaxed) {
            return Ok(0);
        }
        lock(&self.written).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    fn peer(&self) -> &str {
        &self.peer
    }

    fn shutdown(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
