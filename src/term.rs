//! Restores the controlling terminal when the relay exits
//!
//! The relay needs stdin in raw mode (keys go to the shell unprocessed) and
//! stdin/stdout non-blocking. Both settings live on the open file
//! description shared with the parent shell, so they are put back on drop.

use std::io::IsTerminal;
use std::os::fd::BorrowedFd;

use nix::fcntl::OFlag;
use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};

use crate::error::{Error, Result};
use crate::fd::{self, set_status_flags, status_flags};

/// RAII guard for raw, non-blocking terminal mode
#[derive(Debug)]
pub struct TerminalGuard<'fd> {
    input: BorrowedFd<'fd>,
    output: BorrowedFd<'fd>,
    input_flags: OFlag,
    output_flags: OFlag,
    termios: Option<Termios>,
}

impl<'fd> TerminalGuard<'fd> {
    /// Switch `input` to raw mode if it is a terminal, and make both
    /// descriptors non-blocking
    pub fn new(input: BorrowedFd<'fd>, output: BorrowedFd<'fd>) -> Result<Self> {
        let input_flags = status_flags(input)?;
        let output_flags = status_flags(output)?;

        let termios = if input.is_terminal() {
            let original = termios::tcgetattr(input).map_err(Error::io("tcgetattr"))?;
            termios::tcsetattr(input, SetArg::TCSANOW, &raw_mode(&original))
                .map_err(Error::io("tcsetattr"))?;
            Some(original)
        } else {
            None
        };

        let guard = Self {
            input,
            output,
            input_flags,
            output_flags,
            termios,
        };
        fd::set_nonblocking(input)?;
        fd::set_nonblocking(output)?;
        Ok(guard)
    }
}

fn raw_mode(original: &Termios) -> Termios {
    let mut raw = original.clone();

    // Disable canonical mode and echo
    raw.local_flags.remove(LocalFlags::ICANON);
    raw.local_flags.remove(LocalFlags::ECHO);
    raw.local_flags.remove(LocalFlags::ISIG);
    raw.local_flags.remove(LocalFlags::IEXTEN);

    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    raw
}

impl Drop for TerminalGuard<'_> {
    fn drop(&mut self) {
        if let Some(original) = &self.termios {
            if let Err(e) = termios::tcsetattr(self.input, SetArg::TCSANOW, original) {
                tracing::warn!("failed to restore terminal mode: {}", e);
            }
        }
        // Same file description on a tty: restore output first so input wins
        for (fd, flags) in [(self.output, self.output_flags), (self.input, self.input_flags)] {
            if let Err(e) = set_status_flags(fd, flags) {
                tracing::warn!("failed to restore file status flags: {}", e);
            }
        }
    }
}
