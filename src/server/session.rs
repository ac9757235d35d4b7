//! One interactive session: read a line, run the command, answer.

use super::commands::{self, Command, HELP};
use super::registry::{self, SharedRegistry};
use crate::channel::{Channel, Wait};
use crate::line::{LineRead, LineSocket};
use crate::write_line;
use chrono::Utc;
use std::io;
use tracing::{debug, info};

/// Sent once when a session starts.
pub const GREETING: &str = "linewire ready, type help for commands";

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    Closed,
    IoError,
    Overflowed,
    Idle,
    SendFailed,
}

/// A connected peer being served.
pub struct Session<C: Channel> {
    id: usize,
    sock: LineSocket<C>,
    registry: SharedRegistry,
    read_wait: Wait,
    idle_limit: Option<chrono::Duration>,
}

impl<C: Channel> Session<C> {
    pub fn new(
        id: usize,
        sock: LineSocket<C>,
        registry: SharedRegistry,
        read_wait: Wait,
        idle_timeout_secs: u64,
    ) -> Self {
        let idle_limit = match idle_timeout_secs {
            0 => None,
            secs => chrono::Duration::try_seconds(secs.min(i64::MAX as u64) as i64),
        };
        Self {
            id,
            sock,
            registry,
            read_wait,
            idle_limit,
        }
    }

    pub fn socket(&self) -> &LineSocket<C> {
        &self.sock
    }

    /// Serve commands until the peer quits, goes away or fails.
    pub fn serve(&self) -> SessionEnd {
        if write_line!(self.sock, "{GREETING}").is_err() {
            return SessionEnd::SendFailed;
        }

        loop {
            match self.sock.read_line(self.read_wait) {
                LineRead::Complete(line) => {
                    let command = commands::parse(&line);
                    debug!(session = self.id, ?command, "Processing command");
                    match self.execute(command) {
                        Ok(true) => {}
                        Ok(false) => return SessionEnd::Quit,
                        Err(_) => return SessionEnd::SendFailed,
                    }
                }
                LineRead::Partial(_) => {
                    if self.idle_expired() {
                        info!(session = self.id, peer = %self.sock.peer(), "Session idle, closing");
                        let _ = write_line!(self.sock, "idle timeout");
                        return SessionEnd::Idle;
                    }
                }
                LineRead::Closed => return SessionEnd::Closed,
                LineRead::IoError(_) => return SessionEnd::IoError,
                LineRead::Overflowed => return SessionEnd::Overflowed,
            }
        }
    }

    fn idle_expired(&self) -> bool {
        match self.idle_limit {
            Some(limit) => Utc::now() - self.sock.last_line_read() >= limit,
            None => false,
        }
    }

    /// Run one command. `Ok(false)` ends the session.
    fn execute(&self, command: Command) -> io::Result<bool> {
        match command {
            Command::Echo(text) => {
                write_line!(self.sock, "{text}")?;
            }
            Command::Ping => {
                write_line!(self.sock, "pong")?;
            }
            Command::Stats => {
                let stats = self.sock.stats();
                write_line!(
                    self.sock,
                    "sent {} bytes in {} writes, received {} bytes in {} reads, read {:?}, write {:?}",
                    stats.bytes_sent,
                    stats.send_count,
                    stats.bytes_received,
                    stats.recv_count,
                    self.sock.bad_read(),
                    self.sock.bad_write()
                )?;
            }
            Command::Who => {
                let peers: Vec<String> = {
                    let registry = registry::lock(&self.registry);
                    registry
                        .iter()
                        .map(|(id, s)| format!("#{id} {}", s.peer))
                        .collect()
                };
                write_line!(self.sock, "{} session(s): {}", peers.len(), peers.join(", "))?;
            }
            Command::Help => {
                for line in HELP {
                    write_line!(self.sock, "{line}")?;
                }
            }
            Command::Quit => {
                write_line!(self.sock, "bye")?;
                return Ok(false);
            }
            Command::Empty => {}
            Command::Unknown(text) => {
                write_line!(self.sock, "unknown command: {text}")?;
            }
        }
        Ok(true)
    }
}
