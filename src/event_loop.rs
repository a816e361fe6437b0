//! Readiness-driven event loop
//!
//! Each iteration asks every channel which events it wants, blocks in
//! `poll(2)` with no timeout, then dispatches the results in registration
//! order. There is no re-poll within an iteration: changes a flow makes
//! while handling one channel only take effect on the next `poll`.

use std::convert::Infallible;

use nix::poll::{poll, PollFd, PollFlags};

use crate::buffer::ByteBuffer;
use crate::channel::{self, BufferId, Channel, ChannelId, Context, Flow};
use crate::error::{Error, Result};

/// Blocks forever in poll(2)
const NO_TIMEOUT: libc::c_int = -1;

/// Owns the channels and buffers of a session
#[derive(Debug, Default)]
pub struct EventLoop<'fd> {
    channels: Vec<Channel<'fd>>,
    buffers: Vec<ByteBuffer>,
}

impl<'fd> EventLoop<'fd> {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            buffers: Vec::new(),
        }
    }

    /// Hand a buffer to the loop, returning the id channels refer to it by
    pub fn add_buffer(&mut self, buffer: ByteBuffer) -> BufferId {
        self.buffers.push(buffer);
        BufferId(self.buffers.len() - 1)
    }

    /// Register a channel; channels are dispatched in the order added
    pub fn add_channel(&mut self, channel: Channel<'fd>) -> ChannelId {
        self.channels.push(channel);
        ChannelId(self.channels.len() - 1)
    }

    pub fn channel(&self, id: ChannelId) -> &Channel<'fd> {
        &self.channels[id.0]
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut Channel<'fd> {
        &mut self.channels[id.0]
    }

    pub fn buffer(&self, id: BufferId) -> &ByteBuffer {
        &self.buffers[id.0]
    }

    /// Run until a poll or dispatch error
    ///
    /// # Errors
    /// Any error ends the loop; there is no isolation between channels.
    pub fn run<F: Flow + ?Sized>(&mut self, flow: &mut F) -> Result<Infallible> {
        loop {
            self.turn(flow)?;
        }
    }

    /// One iteration: prepare, wait, dispatch
    pub fn turn<F: Flow + ?Sized>(&mut self, flow: &mut F) -> Result<()> {
        let results = self.wait()?;
        let mut cx = Context {
            channels: &mut self.channels,
            buffers: &mut self.buffers,
        };
        for (index, revents) in results.into_iter().enumerate() {
            channel::dispatch(ChannelId(index), revents, &mut cx, flow)?;
        }
        Ok(())
    }

    /// Build fresh poll entries (so no stale results survive) and block
    fn wait(&self) -> Result<Vec<PollFlags>> {
        let mut fds: Vec<PollFd<'_>> = self
            .channels
            .iter()
            .map(|c| PollFd::new(c.fd(), c.prepare(&self.buffers)))
            .collect();

        let ready = poll(&mut fds, NO_TIMEOUT).map_err(Error::io("poll"))?;
        tracing::trace!(ready, "poll returned");

        Ok(fds
            .iter()
            .map(|fd| fd.revents().unwrap_or(PollFlags::empty()))
            .collect())
    }
}
