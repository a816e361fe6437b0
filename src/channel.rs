//! Readiness channels
//!
//! A [`Channel`] pairs one descriptor with up to two buffers of the event
//! loop: an *inbound* buffer it fills from the descriptor when readable, and
//! an *outbound* buffer it drains to the descriptor when writable. A PTY
//! master is a single channel with both slots attached.
//!
//! Channels only record which readiness they want. What happens after bytes
//! move is decided by a [`Flow`], which toggles interest through a
//! [`Context`].

use std::fmt;
use std::os::fd::{AsRawFd, BorrowedFd};

use nix::poll::PollFlags;

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};

/// Index of a buffer owned by an event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) usize);

/// Index of a channel in an event loop, which is also its dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) usize);

/// Direction of readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Readable,
    Writable,
}

impl Direction {
    fn flag(self) -> PollFlags {
        match self {
            Direction::Readable => PollFlags::POLLIN,
            Direction::Writable => PollFlags::POLLOUT,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Readable => f.write_str("readable"),
            Direction::Writable => f.write_str("writable"),
        }
    }
}

/// Reacts to I/O progress on a channel
///
/// Called at most once per direction per channel and loop iteration, right
/// after the buffer moved at least one byte.
pub trait Flow {
    /// `channel` read bytes into its inbound buffer
    fn on_filled(&mut self, channel: ChannelId, cx: &mut Context<'_, '_>) -> Result<()>;

    /// `channel` wrote bytes from its outbound buffer
    fn on_drained(&mut self, channel: ChannelId, cx: &mut Context<'_, '_>) -> Result<()>;
}

/// Mutable view of the channels and buffers handed to a [`Flow`]
#[derive(Debug)]
pub struct Context<'a, 'fd> {
    pub(crate) channels: &'a mut [Channel<'fd>],
    pub(crate) buffers: &'a mut [ByteBuffer],
}

impl<'fd> Context<'_, 'fd> {
    pub fn channel(&self, id: ChannelId) -> &Channel<'fd> {
        &self.channels[id.0]
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut Channel<'fd> {
        &mut self.channels[id.0]
    }

    pub fn buffer(&self, id: BufferId) -> &ByteBuffer {
        &self.buffers[id.0]
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> &mut ByteBuffer {
        &mut self.buffers[id.0]
    }
}

/// One polled descriptor and the buffers it moves bytes through
#[derive(Debug)]
pub struct Channel<'fd> {
    name: &'static str,
    fd: BorrowedFd<'fd>,
    inbound: Option<BufferId>,
    outbound: Option<BufferId>,
    wanted: PollFlags,
}

impl<'fd> Channel<'fd> {
    /// Create a channel with no buffers and no interest
    pub fn new(name: &'static str, fd: BorrowedFd<'fd>) -> Self {
        Self {
            name,
            fd,
            inbound: None,
            outbound: None,
            wanted: PollFlags::empty(),
        }
    }

    /// Attach the buffer filled when the descriptor is readable
    pub fn with_inbound(mut self, buffer: BufferId) -> Self {
        self.inbound = Some(buffer);
        self
    }

    /// Attach the buffer drained when the descriptor is writable
    pub fn with_outbound(mut self, buffer: BufferId) -> Self {
        self.outbound = Some(buffer);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn fd(&self) -> &BorrowedFd<'fd> {
        &self.fd
    }

    pub fn want_readable(&mut self, on: bool) {
        self.wanted.set(PollFlags::POLLIN, on);
    }

    pub fn want_writable(&mut self, on: bool) {
        self.wanted.set(PollFlags::POLLOUT, on);
    }

    pub fn wants(&self, direction: Direction) -> bool {
        self.wanted.contains(direction.flag())
    }

    fn slot(&self, direction: Direction) -> Option<BufferId> {
        match direction {
            Direction::Readable => self.inbound,
            Direction::Writable => self.outbound,
        }
    }

    /// Poll events to request this iteration
    ///
    /// A direction is requested only if it is wanted and its buffer can make
    /// progress, so a full or empty buffer never makes `poll` spin.
    pub fn prepare(&self, buffers: &[ByteBuffer]) -> PollFlags {
        let mut events = PollFlags::empty();
        for direction in [Direction::Readable, Direction::Writable] {
            let ready = self
                .slot(direction)
                .is_some_and(|id| buffers[id.0].remaining() > 0);
            if ready && self.wants(direction) {
                events |= direction.flag();
            }
        }
        events
    }

    /// Move bytes in `direction` if `revents` allows it
    ///
    /// Returns whether a transfer happened. A transfer that moves nothing is
    /// an [`Error::Stall`].
    fn transfer(
        &self,
        direction: Direction,
        revents: PollFlags,
        buffers: &mut [ByteBuffer],
    ) -> Result<bool> {
        let Some(id) = self.slot(direction) else {
            return Ok(false);
        };
        if !revents.contains(direction.flag()) || !self.wants(direction) {
            return Ok(false);
        }
        let buffer = &mut buffers[id.0];
        let before = buffer.remaining();
        if before == 0 {
            return Ok(false);
        }

        match direction {
            Direction::Readable => {
                buffer.fill(self.fd)?;
            },
            Direction::Writable => {
                buffer.drain(self.fd)?;
            },
        }

        if buffer.remaining() == before {
            return Err(Error::Stall {
                fd: self.fd.as_raw_fd(),
                direction,
            });
        }
        tracing::trace!(
            channel = self.name,
            %direction,
            bytes = before - buffer.remaining(),
            "transfer"
        );
        Ok(true)
    }
}

/// Handle the poll result of channel `id`
///
/// Any flag besides readable/writable (hangup, error, invalid descriptor) is
/// fatal. Then at most one fill and one drain are attempted, each followed by
/// the matching [`Flow`] callback.
pub fn dispatch<F: Flow + ?Sized>(
    id: ChannelId,
    revents: PollFlags,
    cx: &mut Context<'_, '_>,
    flow: &mut F,
) -> Result<()> {
    let unexpected = revents - (PollFlags::POLLIN | PollFlags::POLLOUT);
    if !unexpected.is_empty() {
        return Err(Error::Channel {
            fd: cx.channels[id.0].fd.as_raw_fd(),
            revents,
        });
    }

    if cx.channels[id.0].transfer(Direction::Readable, revents, cx.buffers)? {
        flow.on_filled(id, cx)?;
    }
    if cx.channels[id.0].transfer(Direction::Writable, revents, cx.buffers)? {
        flow.on_drained(id, cx)?;
    }
    Ok(())
}
