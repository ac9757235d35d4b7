//! Incremental line reader.

use super::buffer::is_escape;
use super::{LineSocket, ReadState};
use crate::channel::{Channel, Deadline, Transfer, Wait};
use bytes::Bytes;
use std::io;
use std::sync::MutexGuard;
use tracing::{debug, trace, warn};

/// Notice sent to a peer whose line did not fit the buffer.
const OVERFLOW_NOTICE: &str = "String too long";

/// Outcome of one `read_line` call.
#[derive(Debug)]
pub enum LineRead {
    /// A terminated line, terminator and leading escape bytes removed.
    Complete(Bytes),
    /// No terminator yet. Carries what has accumulated so far (possibly
    /// nothing); the accumulation continues on the next call.
    Partial(Bytes),
    /// The peer closed the connection. The unterminated remainder stays
    /// available through `partial()`.
    Closed,
    /// Hard I/O failure. The connection should be torn down.
    IoError(io::Error),
    /// The line exceeded the buffer capacity and was discarded.
    Overflowed,
}

impl LineRead {
    /// Whether the caller must stop using the connection.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LineRead::Closed | LineRead::IoError(_) | LineRead::Overflowed
        )
    }
}

impl<C: Channel> LineSocket<C> {
    /// Read until a line is complete, the wait budget runs out, or the
    /// connection fails.
    ///
    /// The channel is read one byte at a time so nothing past the terminator
    /// is ever consumed. CR and LF each end a line; a terminator arriving
    /// before any payload is skipped rather than reported as an empty line,
    /// and the retry shares the budget of this call.
    pub fn read_line(&self, wait: Wait) -> LineRead {
        let deadline = Deadline::start(wait);
        let mut state = self.lock_read();
        let mut bare_terminators = 0usize;
        let mut progressed = false;

        loop {
            if state.buf.is_full() {
                return self.overflow(state);
            }

            let mut byte = [0u8; 1];
            match self.raw_read(&mut byte, deadline.remaining()) {
                Transfer::Data(_) => progressed = true,
                Transfer::Closed => {
                    debug!(peer = %self.peer(), partial = state.buf.contents().len(), "Connection closed by peer");
                    return LineRead::Closed;
                }
                Transfer::WouldBlock | Transfer::Backpressure => {
                    self.echo_tail(&mut state);
                    if progressed {
                        state.touch();
                    }
                    return LineRead::Partial(Bytes::copy_from_slice(state.buf.contents()));
                }
                Transfer::Hard(e) => {
                    warn!(
                        peer = %self.peer(),
                        code = ?e.raw_os_error(),
                        error = %e,
                        "Error reading line from network"
                    );
                    return LineRead::IoError(e);
                }
            }

            let byte = byte[0];
            if state.buf.is_empty() && is_escape(byte) {
                state.got_escape_chars = true;
            }
            if state.ignore_return && byte == b'\r' {
                continue;
            }

            if byte == b'\n' || byte == b'\r' {
                if state.buf.is_empty() {
                    state.touch();
                    bare_terminators += 1;
                    if deadline.expired() && bare_terminators > state.buf.capacity() {
                        debug!(peer = %self.peer(), bare_terminators, "Gave up skipping bare terminators");
                        return LineRead::Partial(Bytes::new());
                    }
                    continue;
                }

                state.got_complete_line = true;
                let (line, stripped) = state.buf.take_line();
                if stripped {
                    state.got_escape_chars = true;
                }
                self.echo_tail(&mut state);
                state.touch();
                trace!(peer = %self.peer(), len = line.len(), "Read line");
                return LineRead::Complete(line);
            }

            state.buf.push(byte);
            self.echo_tail(&mut state);
        }
    }

    /// Discard an over-long line and tell the peer, best effort.
    fn overflow(&self, mut state: MutexGuard<'_, ReadState>) -> LineRead {
        warn!(
            peer = %self.peer(),
            capacity = state.buf.capacity(),
            "Cannot fit line into buffer"
        );
        state.buf.clear();
        drop(state);
        let _ = self.write_line(format_args!("{OVERFLOW_NOTICE}"));
        LineRead::Overflowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ScriptedChannel, ScriptedRead};
    use crate::line::{LineEnding, LineOptions};
    use proptest::prelude::*;
    use std::cmp::Ordering;
    use std::time::Duration;

    fn quiet(nonblocking: bool) -> LineSocket<ScriptedChannel> {
        let sock = LineSocket::new(ScriptedChannel::new(nonblocking));
        sock.set_auto_echo(false);
        sock
    }

    fn complete(read: LineRead) -> Vec<u8> {
        match read {
            LineRead::Complete(line) => line.to_vec(),
            other => panic!("expected complete line, got {other:?}"),
        }
    }

    /// Drain every complete line currently available.
    fn drain(sock: &LineSocket<ScriptedChannel>) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        loop {
            match sock.read_line(Wait::NoWait) {
                LineRead::Complete(line) => lines.push(line.to_vec()),
                LineRead::Partial(_) if sock.channel().pending() > 0 => {}
                LineRead::Partial(_) => return lines,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[test]
    fn test_complete_line() {
        let sock = quiet(true);
        sock.channel().feed(b"hello\r\n");
        assert_eq!(complete(sock.read_line(Wait::NoWait)), b"hello");
    }

    #[test]
    fn test_partial_across_calls() {
        let sock = quiet(true);
        sock.channel().feed(b"hel");
        match sock.read_line(Wait::NoWait) {
            LineRead::Partial(p) => assert_eq!(&p[..], b"hel"),
            other => panic!("unexpected: {other:?}"),
        }

        sock.channel().feed(b"lo\n");
        assert_eq!(complete(sock.read_line(Wait::NoWait)), b"hello");
    }

    #[test]
    fn test_no_data_nonblocking_is_empty_partial() {
        let sock = quiet(true);
        match sock.read_line(Wait::from_millis(0)) {
            LineRead::Partial(p) => assert!(p.is_empty()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_wait_window_expiry_is_partial() {
        let sock = quiet(false);
        sock.channel().feed(b"ab").push(ScriptedRead::TimedOut);
        match sock.read_line(Wait::For(Duration::from_millis(10))) {
            LineRead::Partial(p) => assert_eq!(&p[..], b"ab"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_blocking_would_block_is_hard() {
        let sock = quiet(false);
        sock.channel().push(ScriptedRead::WouldBlock);
        assert!(matches!(sock.read_line(Wait::NoWait), LineRead::IoError(_)));
    }

    #[test]
    fn test_immediate_close() {
        let sock = quiet(true);
        sock.channel().push(ScriptedRead::Close);
        assert!(matches!(sock.read_line(Wait::NoWait), LineRead::Closed));
        assert_eq!(sock.compare_partial(b""), Ordering::Equal);
    }

    #[test]
    fn test_close_keeps_partial() {
        let sock = quiet(true);
        sock.channel().feed(b"unfinished").push(ScriptedRead::Close);
        let read = sock.read_line(Wait::NoWait);
        assert!(read.is_terminal());
        assert!(matches!(read, LineRead::Closed));
        assert_eq!(&sock.partial()[..], b"unfinished");
        assert_eq!(sock.compare_partial(b"unfin"), Ordering::Equal);
    }

    #[test]
    fn test_hard_error() {
        let sock = quiet(true);
        sock.channel()
            .push(ScriptedRead::Error(io::ErrorKind::ConnectionReset));
        match sock.read_line(Wait::NoWait) {
            LineRead::IoError(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_bare_terminator_is_skipped() {
        let sock = quiet(true);
        sock.channel().feed(b"\r\n");
        match sock.read_line(Wait::NoWait) {
            LineRead::Partial(p) => assert!(p.is_empty()),
            other => panic!("unexpected: {other:?}"),
        }

        sock.channel().feed(b"\n\r\r\nnext\r\n");
        assert_eq!(complete(sock.read_line(Wait::NoWait)), b"next");
    }

    #[test]
    fn test_bare_terminator_flood_is_bounded() {
        let sock = LineSocket::with_options(
            ScriptedChannel::new(true),
            LineOptions {
                capacity: 8,
                auto_echo: false,
                ..LineOptions::default()
            },
        );
        sock.channel().feed(&[b'\n'; 100]);
        match sock.read_line(Wait::NoWait) {
            LineRead::Partial(p) => assert!(p.is_empty()),
            other => panic!("unexpected: {other:?}"),
        }
        // Only capacity + 1 terminators were swallowed by that call.
        assert_eq!(sock.recv_count(), 9);
    }

    #[test]
    fn test_last_line_read_tracks_progress() {
        let sock = quiet(false);
        let start = sock.last_line_read();

        std::thread::sleep(Duration::from_millis(5));
        sock.channel().push(ScriptedRead::TimedOut);
        let _ = sock.read_line(Wait::For(Duration::from_millis(10)));
        assert_eq!(sock.last_line_read(), start);

        sock.channel().feed(b"\r\n").push(ScriptedRead::TimedOut);
        match sock.read_line(Wait::For(Duration::from_secs(5))) {
            LineRead::Partial(p) => assert!(p.is_empty()),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(sock.last_line_read() > start);
    }

    #[test]
    fn test_capacity_boundary() {
        let sock = LineSocket::with_options(
            ScriptedChannel::new(true),
            LineOptions {
                capacity: 16,
                auto_echo: false,
                ..LineOptions::default()
            },
        );
        sock.channel().feed(&[b'x'; 15]).feed(b"\r\n");
        assert_eq!(complete(sock.read_line(Wait::NoWait)), vec![b'x'; 15]);
    }

    #[test]
    fn test_overflow_once() {
        let sock = LineSocket::with_options(
            ScriptedChannel::new(true),
            LineOptions {
                capacity: 16,
                auto_echo: false,
                ..LineOptions::default()
            },
        );
        sock.channel().feed(&[b'x'; 16]);
        assert!(matches!(sock.read_line(Wait::NoWait), LineRead::Overflowed));
        assert_eq!(sock.channel().take_written(), b"String too long\r\n");
        assert!(sock.partial().is_empty());

        match sock.read_line(Wait::NoWait) {
            LineRead::Partial(p) => assert!(p.is_empty()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_overflow_notice_failure_is_ignored() {
        let sock = LineSocket::with_options(
            ScriptedChannel::new(true),
            LineOptions {
                capacity: 4,
                auto_echo: false,
                line_ending: LineEnding::LfCr,
                ..LineOptions::default()
            },
        );
        sock.channel().fail_writes(Some(io::ErrorKind::BrokenPipe));
        sock.channel().feed(b"abcdef");
        assert!(matches!(sock.read_line(Wait::NoWait), LineRead::Overflowed));
    }

    #[test]
    fn test_escape_prefix_stripped() {
        let sock = LineSocket::new(ScriptedChannel::new(true));
        sock.channel().feed(&[0x80, 0x81, b'O', b'K', b'\r', b'\n']);
        assert_eq!(complete(sock.read_line(Wait::NoWait)), b"OK");
        assert!(sock.got_escape_chars());
        assert!(sock.channel().written().is_empty());
    }

    #[test]
    fn test_escape_only_line() {
        let sock = quiet(true);
        sock.channel().feed(&[0xff, 0xfd, b'\r']);
        assert_eq!(complete(sock.read_line(Wait::NoWait)), b"");
    }

    #[test]
    fn test_ignore_return() {
        let sock = quiet(true);
        sock.set_ignore_return(true);
        sock.channel().feed(b"a\rb\r\n");
        assert_eq!(complete(sock.read_line(Wait::NoWait)), b"ab");
    }

    #[test]
    fn test_payload_bytes_unmodified() {
        let mut input = vec![b'.'];
        input.extend((1u8..=255).filter(|&b| b != b'\r' && b != b'\n'));
        input.extend_from_slice(b"\r\n");

        let sock = quiet(true);
        sock.channel().feed(&input);
        assert_eq!(complete(sock.read_line(Wait::NoWait)), &input[..input.len() - 2]);
    }

    #[test]
    fn test_fragmented_lines() {
        let sock = quiet(true);
        for chunk in [&b"fi"[..], b"rst\r", b"\nsec", b"ond\n", b"\rthird\r\n"] {
            sock.channel().feed(chunk);
        }
        assert_eq!(
            drain(&sock),
            vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
        );
    }

    proptest! {
        #[test]
        fn prop_chunking_invariance(
            lines in prop::collection::vec(
                prop::collection::vec(
                    (0u8..0x80).prop_filter("no terminators", |b| *b != b'\r' && *b != b'\n'),
                    1..40,
                ),
                1..12,
            ),
            cuts in prop::collection::vec(1usize..16, 0..64),
        ) {
            let mut stream = Vec::new();
            for line in &lines {
                stream.extend_from_slice(line);
                stream.extend_from_slice(b"\r\n");
            }

            let sock = quiet(true);
            let mut rest = &stream[..];
            for cut in cuts {
                if rest.is_empty() {
                    break;
                }
                let n = cut.min(rest.len());
                sock.channel().feed(&rest[..n]);
                sock.channel().push(ScriptedRead::WouldBlock);
                rest = &rest[n..];
            }
            if !rest.is_empty() {
                sock.channel().feed(rest);
            }

            prop_assert_eq!(drain(&sock), lines);
        }
    }
}
