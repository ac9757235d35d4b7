//! TCP stream channel.
//!
//! Readiness is checked with `poll(2)` before every transfer so that a read
//! never outlives its wait window and a write never waits for the peer, even
//! when the socket itself is in blocking mode.

use super::{Channel, Wait};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;
use tracing::debug;

/// A connected TCP stream.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    peer: String,
    nonblocking: bool,
}

impl TcpChannel {
    /// Wrap an accepted or connected stream.
    pub fn new(stream: TcpStream, nonblocking: bool) -> io::Result<Self> {
        stream.set_nonblocking(nonblocking)?;
        stream.set_nodelay(true)?;
        let peer = match stream.peer_addr() {
            Ok(addr) => addr.ip().to_string(),
            Err(_) => "unknown".to_string(),
        };
        Ok(Self {
            stream,
            peer,
            nonblocking,
        })
    }

    /// Connect to `addr`, giving up after `timeout`.
    pub fn connect(addr: SocketAddr, timeout: Duration, nonblocking: bool) -> io::Result<Self> {
        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;
        socket.connect_timeout(&addr.into(), timeout)?;
        debug!(peer = %addr, nonblocking, "Connected");
        Self::new(socket.into(), nonblocking)
    }

    /// Local address of the stream.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Whether the socket is ready for `events` within `wait`.
    fn wait_ready(&self, events: libc::c_short, wait: Wait) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.as_raw_fd(),
            events,
            revents: 0,
        };
        // SAFETY: `pfd` is a valid, exclusively borrowed pollfd and nfds is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, wait.as_poll_timeout()) };
        if rc < 0 {
            let e = io::Error::last_os_error();
            // A signal cut the wait short; report not ready.
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(e);
        }
        Ok(rc > 0)
    }
}

impl AsRawFd for TcpChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl Channel for TcpChannel {
    fn read(&self, buf: &mut [u8], wait: Wait) -> io::Result<usize> {
        if !self.wait_ready(libc::POLLIN, wait)? {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }
        (&self.stream).read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if !self.wait_ready(libc::POLLOUT, Wait::NoWait)? {
            return Ok(0);
        }
        (&self.stream).write(buf)
    }

    fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    fn peer(&self) -> &str {
        &self.peer
    }

    fn shutdown(&self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}
