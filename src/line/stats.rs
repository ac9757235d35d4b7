//! Transfer counters and sticky fault flags.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Monotonic transfer counters.
///
/// Updated only on strictly positive transfers, under whichever mutex owns
/// the transfer. Reads are lock-free and only approximately consistent with
/// concurrent updates.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    send_count: AtomicU64,
    recv_count: AtomicU64,
}

impl Counters {
    pub(crate) fn record_send(&self, n: usize) {
        if n > 0 {
            self.send_count.fetch_add(1, Ordering::Relaxed);
            self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_recv(&self, n: usize) {
        if n > 0 {
            self.recv_count.fetch_add(1, Ordering::Relaxed);
            self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn reset(&self) {
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.send_count.store(0, Ordering::Relaxed);
        self.recv_count.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TransferStats {
        TransferStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            send_count: self.send_count.load(Ordering::Relaxed),
            recv_count: self.recv_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the transfer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_count: u64,
    pub recv_count: u64,
}

/// State of a sticky fault flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultState {
    /// No tracked transfer has happened yet.
    Unset,
    /// Tracked transfers happened and none failed hard.
    Clean,
    /// A hard I/O error was seen. Stays until the channel is replaced.
    Faulted,
}

impl FaultState {
    pub fn is_faulted(self) -> bool {
        self == FaultState::Faulted
    }
}

const UNSET: u8 = 0;
const CLEAN: u8 = 1;
const FAULTED: u8 = 2;

/// Atomic latch over `FaultState`.
#[derive(Debug)]
pub(crate) struct FaultFlag(AtomicU8);

impl FaultFlag {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(UNSET))
    }

    /// A tracked transfer went through without a hard error.
    pub(crate) fn mark_clean(&self) {
        let _ = self
            .0
            .compare_exchange(UNSET, CLEAN, Ordering::Relaxed, Ordering::Relaxed);
    }

    pub(crate) fn mark_faulted(&self) {
        self.0.store(FAULTED, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> FaultState {
        match self.0.load(Ordering::Relaxed) {
            UNSET => FaultState::Unset,
            CLEAN => FaultState::Clean,
            _ => FaultState::Faulted,
        }
    }
}
