//! Incremental echo back to interactive peers.

use super::{LineSocket, ReadState};
use crate::channel::Channel;
use tracing::debug;

impl<C: Channel> LineSocket<C> {
    /// Write back whatever arrived since the last echo.
    ///
    /// Runs under the read mutex after every byte the reader accumulates.
    /// The terminator of a finished line is echoed separately, and only if
    /// something was echoed before it.
    ///
    /// Echo does not take the write lock, so echoed bytes may interleave
    /// with a concurrent `write_line`.
    pub(crate) fn echo_tail(&self, state: &mut ReadState) {
        // A finished line is answered now or never.
        let just_completed = std::mem::take(&mut state.got_complete_line);
        if !state.echo && !state.auto_echo {
            return;
        }

        if state.have_echoed && just_completed {
            if let Err(e) = self.raw_write(self.line_ending.as_bytes()) {
                debug!(peer = %self.peer(), error = %e, "Failed to echo line terminator");
            }
        }

        if state.buf.unechoed().is_empty() {
            return;
        }

        // Peers that lead with escape bytes echo locally.
        if state.auto_echo && state.got_escape_chars {
            return;
        }

        state.have_echoed = true;
        if let Err(e) = self.raw_write(state.buf.unechoed()) {
            debug!(peer = %self.peer(), error = %e, "Failed to echo input");
        }
        state.buf.mark_echoed();
    }
}
