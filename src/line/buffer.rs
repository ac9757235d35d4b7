//! Fixed-capacity buffer for the line currently being received.

use bytes::Bytes;
use std::cmp::Ordering;

/// Default inbound line capacity in bytes.
pub const DEFAULT_LINE_CAPACITY: usize = 512;

/// Accumulates the bytes of one unterminated line.
///
/// `pos` is how much has been accumulated; `echoed` is how much of that has
/// already been written back to the peer. `echoed <= pos <= capacity`.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    data: Box<[u8]>,
    pos: usize,
    echoed: usize,
}

impl LineBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            echoed: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Append one byte. The caller checks `is_full` first.
    pub(crate) fn push(&mut self, byte: u8) {
        debug_assert!(!self.is_full(), "line buffer overflow");
        self.data[self.pos] = byte;
        self.pos += 1;
    }

    /// Bytes accumulated so far.
    pub(crate) fn contents(&self) -> &[u8] {
        &self.data[..self.pos]
    }

    /// Bytes accumulated but not yet echoed.
    pub(crate) fn unechoed(&self) -> &[u8] {
        &self.data[self.echoed..self.pos]
    }

    pub(crate) fn mark_echoed(&mut self) {
        self.echoed = self.pos;
    }

    /// Consume the accumulated line, minus any leading run of escape bytes.
    ///
    /// Returns the payload and whether an escape run was stripped. The buffer
    /// is empty afterwards.
    pub(crate) fn take_line(&mut self) -> (Bytes, bool) {
        let line = self.contents();
        let escapes = line.iter().take_while(|&&b| is_escape(b)).count();
        let payload = Bytes::copy_from_slice(&line[escapes..]);
        self.clear();
        (payload, escapes > 0)
    }

    pub(crate) fn clear(&mut self) {
        self.pos = 0;
        self.echoed = 0;
    }

    /// `strncmp`-style comparison of `prefix` against the first
    /// `prefix.len()` accumulated bytes.
    pub(crate) fn compare_prefix(&self, prefix: &[u8]) -> Ordering {
        let content = self.contents();
        let head = &content[..content.len().min(prefix.len())];
        prefix.cmp(head)
    }
}

/// Escape bytes have the high bit set.
pub(crate) fn is_escape(byte: u8) -> bool {
    byte & 0x80 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut buf = LineBuffer::new(3);
        assert!(buf.is_empty());
        buf.push(b'a');
        buf.push(b'b');
        assert!(!buf.is_full());
        buf.push(b'c');
        assert!(buf.is_full());
        assert_eq!(buf.contents(), b"abc");
    }

    #[test]
    fn test_echo_mark() {
        let mut buf = LineBuffer::new(8);
        buf.push(b'h');
        buf.push(b'i');
        assert_eq!(buf.unechoed(), b"hi");
        buf.mark_echoed();
        assert!(buf.unechoed().is_empty());
        buf.push(b'!');
        assert_eq!(buf.unechoed(), b"!");
    }

    #[test]
    fn test_take_line_strips_escape_run() {
        let mut buf = LineBuffer::new(8);
        for &b in &[0xff, 0xfb, b'O', b'K'] {
            buf.push(b);
        }
        let (line, stripped) = buf.take_line();
        assert_eq!(&line[..], b"OK");
        assert!(stripped);
        assert!(buf.is_empty());
        assert!(buf.unechoed().is_empty());
    }

    #[test]
    fn test_take_line_keeps_inner_high_bytes() {
        let mut buf = LineBuffer::new(8);
        for &b in &[b'a', 0xe9, b'b'] {
            buf.push(b);
        }
        let (line, stripped) = buf.take_line();
        assert_eq!(&line[..], &[b'a', 0xe9, b'b']);
        assert!(!stripped);
    }

    #[test]
    fn test_compare_prefix() {
        let mut buf = LineBuffer::new(8);
        assert_eq!(buf.compare_prefix(b""), Ordering::Equal);
        assert_eq!(buf.compare_prefix(b"a"), Ordering::Greater);

        for &b in b"help" {
            buf.push(b);
        }
        assert_eq!(buf.compare_prefix(b""), Ordering::Equal);
        assert_eq!(buf.compare_prefix(b"he"), Ordering::Equal);
        assert_eq!(buf.compare_prefix(b"help"), Ordering::Equal);
        assert_eq!(buf.compare_prefix(b"helpme"), Ordering::Greater);
        assert_eq!(buf.compare_prefix(b"ha"), Ordering::Less);
        assert_eq!(buf.compare_prefix(b"hz"), Ordering::Greater);
    }
}
