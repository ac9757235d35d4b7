//! Interactive line server.
//!
//! Accepts TCP connections on the calling thread and serves each one from
//! its own named worker thread:
//! - the peer is greeted, then every complete line is parsed as a command
//! - replies go out through the same `LineSocket`
//! - a closed, failed or overflowing connection ends the session
//!
//! Sessions are tracked in a slab-backed registry capped at
//! `max_sessions`; peers arriving beyond the cap are told so and dropped.

pub mod commands;
pub mod registry;
pub mod session;

use crate::channel::{TcpChannel, Wait};
use crate::config::Config;
use crate::line::LineSocket;
use crate::write_line;
use chrono::Utc;
use registry::{SessionInfo, SessionRegistry, SharedRegistry};
use session::Session;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, error, info, warn};

/// Bound listener plus the state shared with session threads.
pub struct Server {
    config: Config,
    listener: TcpListener,
    registry: SharedRegistry,
}

impl Server {
    /// Bind the configured address.
    pub fn bind(config: Config) -> io::Result<Self> {
        let addr: SocketAddr = config
            .listen
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let listener = create_listener(addr)?;
        let registry = Arc::new(Mutex::new(SessionRegistry::new(config.max_sessions)));

        info!(
            addr = %listener.local_addr()?,
            max_sessions = config.max_sessions,
            read_timeout_ms = config.read_timeout_ms,
            "Server listening"
        );

        Ok(Self {
            config,
            listener,
            registry,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever.
    pub fn run(&self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    if let Err(e) = self.start_session(stream, peer_addr) {
                        warn!(peer = %peer_addr, error = %e, "Failed to start session");
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    fn start_session(&self, stream: TcpStream, peer_addr: SocketAddr) -> io::Result<()> {
        let channel = TcpChannel::new(stream, self.config.nonblocking)?;
        let sock = LineSocket::with_options(channel, self.config.line.clone());

        let id = registry::lock(&self.registry).insert(SessionInfo {
            peer: sock.peer().to_string(),
            connected_at: Utc::now(),
        });
        let Some(id) = id else {
            warn!(peer = %peer_addr, "Session limit reached");
            let _ = write_line!(sock, "too many sessions, try again later");
            return sock.shutdown();
        };

        debug!(session = id, peer = %peer_addr, "Accepted connection");

        let shared = Arc::clone(&self.registry);
        let read_wait = Wait::from_millis(self.config.read_timeout_ms);
        let idle_timeout_secs = self.config.idle_timeout_secs;

        let spawned = thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || {
                let session = Session::new(id, sock, Arc::clone(&shared), read_wait, idle_timeout_secs);
                let end = session.serve();
                let _ = session.socket().shutdown();
                let entry = registry::lock(&shared).remove(id);
                info!(
                    session = id,
                    peer = %session.socket().peer(),
                    ?end,
                    stats = ?session.socket().stats(),
                    connected_secs = entry.map(|s| (Utc::now() - s.connected_at).num_seconds()),
                    "Session ended"
                );
            });

        if let Err(e) = spawned {
            registry::lock(&self.registry).remove(id);
            return Err(e);
        }
        Ok(())
    }
}

/// Create a TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;

    Ok(socket.into())
}
