//! Error types for the relay

use std::io;
use std::os::fd::RawFd;

use nix::poll::PollFlags;

use crate::channel::Direction;

/// Relay error type
///
/// Nothing in the relay recovers from these locally: every variant unwinds
/// to the binary, which reports it and exits.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unexpected failure of a system call (anything other than would-block)
    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    /// `fill` was called on a buffer with no remaining capacity
    #[error("buffer full, cannot read more data (capacity {capacity})")]
    BufferFull { capacity: usize },

    /// Indexed access outside of the buffer
    #[error("buffer out of bounds, index: {index} capacity: {capacity}")]
    Bounds { index: usize, capacity: usize },

    /// Poll reported readiness but the I/O call moved nothing
    #[error("fd {fd} reported {direction} readiness but moved no bytes")]
    Stall { fd: RawFd, direction: Direction },

    /// Poll reported a flag other than readable/writable (hangup, error, invalid)
    #[error("unexpected poll events {revents:?} on fd {fd}")]
    Channel { fd: RawFd, revents: PollFlags },

    /// Creating the PTY or the child process failed
    #[error("failed to spawn shell: {op}: {source}")]
    Spawn {
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    /// Writing the io log failed
    #[error("io log error: {0}")]
    Log(#[from] io::Error),

    /// A check of the built-in self-test did not hold
    #[error("self-test failed: {0}")]
    SelfTest(String),
}

impl Error {
    /// Build a closure mapping a nix error to [`Error::Io`] for `op`
    pub(crate) fn io(op: &'static str) -> impl FnOnce(nix::Error) -> Self {
        move |source| Error::Io { op, source }
    }

    /// Build a closure mapping a nix error to [`Error::Spawn`] for `op`
    pub(crate) fn spawn(op: &'static str) -> impl FnOnce(nix::Error) -> Self {
        move |source| Error::Spawn { op, source }
    }
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, Error>;
