//! linewire: line-oriented text protocol over duplex byte streams.
//!
//! The core is `LineSocket`, which turns a raw `Channel` into a
//! line-at-a-time conversation:
//! - lines accumulate across repeated non-blocking reads
//! - CR and LF are both accepted as terminators, bare ones are skipped
//! - a leading run of escape bytes is stripped from each line
//! - input can be echoed back for interactive terminal peers
//! - writers send whole terminated lines, independently of readers
//!
//! The `server` module wraps this in a small interactive TCP line server.

pub mod channel;
pub mod config;
pub mod line;
pub mod server;

pub use channel::{Channel, ScriptedChannel, ScriptedRead, TcpChannel, Transfer, Wait};
pub use line::{FaultState, LineEnding, LineOptions, LineRead, LineSocket, TransferStats};
