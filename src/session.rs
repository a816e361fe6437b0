//! Session wiring
//!
//! Three channels, registered in this order: the input (stdin), the output
//! (stdout) and the PTY master. Two pipes carry bytes through them:
//!
//! ```text
//! input  --[to pty]-->  pty master  --[from pty]-->  output
//! ```
//!
//! Each pipe owns one buffer and alternates between two states. While
//! `Filling`, only its source is read; once bytes arrive the buffer is
//! flipped and the pipe is `Draining`, when only its sink is written. The
//! source is not read again until the sink has taken every byte, so a slow
//! consumer stalls its producer and at most one buffer is in flight per
//! direction.

use std::convert::Infallible;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use tracing::{debug, info};

use crate::buffer::{ByteBuffer, DEFAULT_CAPACITY};
use crate::channel::{BufferId, Channel, ChannelId, Context, Flow};
use crate::config::Config;
use crate::error::Result;
use crate::event_loop::EventLoop;
use crate::iolog::IoLog;
use crate::pty::{self, Pty, ShellCommand};
use crate::term::TerminalGuard;

/// The two directions of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Input to the PTY
    ToPty,
    /// PTY to output
    FromPty,
}

impl Stream {
    /// Header used in the io log
    pub fn label(self) -> &'static str {
        match self {
            Stream::ToPty => "TO",
            Stream::FromPty => "FROM",
        }
    }
}

/// State of one pipe's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    /// Waiting for the source to produce bytes
    Filling,
    /// Waiting for the sink to take every byte
    Draining,
}

#[derive(Debug)]
struct Pipe {
    stream: Stream,
    source: ChannelId,
    sink: ChannelId,
    buffer: BufferId,
    state: PipeState,
}

/// Flow control for both pipes of a session
#[derive(Debug)]
pub struct SessionFlow {
    pipes: [Pipe; 2],
    log: IoLog,
}

impl SessionFlow {
    pub fn state(&self, stream: Stream) -> PipeState {
        self.pipe(stream).state
    }

    fn pipe(&self, stream: Stream) -> &Pipe {
        match stream {
            Stream::ToPty => &self.pipes[0],
            Stream::FromPty => &self.pipes[1],
        }
    }
}

impl Flow for SessionFlow {
    fn on_filled(&mut self, channel: ChannelId, cx: &mut Context<'_, '_>) -> Result<()> {
        for pipe in &mut self.pipes {
            if pipe.source != channel || pipe.state != PipeState::Filling {
                continue;
            }
            let buffer = cx.buffer_mut(pipe.buffer);
            buffer.flip();
            debug!(stream = ?pipe.stream, bytes = buffer.remaining(), "draining");
            self.log.record(pipe.stream.label(), buffer.pending())?;

            pipe.state = PipeState::Draining;
            cx.channel_mut(pipe.source).want_readable(false);
            cx.channel_mut(pipe.sink).want_writable(true);
        }
        Ok(())
    }

    fn on_drained(&mut self, channel: ChannelId, cx: &mut Context<'_, '_>) -> Result<()> {
        for pipe in &mut self.pipes {
            if pipe.sink != channel || pipe.state != PipeState::Draining {
                continue;
            }
            // A partial write keeps draining from where it stopped
            if cx.buffer(pipe.buffer).remaining() > 0 {
                continue;
            }
            cx.buffer_mut(pipe.buffer).clear();
            debug!(stream = ?pipe.stream, "filling");

            pipe.state = PipeState::Filling;
            cx.channel_mut(pipe.source).want_readable(true);
            cx.channel_mut(pipe.sink).want_writable(false);
        }
        Ok(())
    }
}

/// An event loop wired to relay between two endpoints and a PTY master
#[derive(Debug)]
pub struct Session<'fd> {
    event_loop: EventLoop<'fd>,
    flow: SessionFlow,
}

impl<'fd> Session<'fd> {
    /// Wire `input` and `output` to `pty`; all three must be non-blocking
    pub fn new(
        input: BorrowedFd<'fd>,
        output: BorrowedFd<'fd>,
        pty: BorrowedFd<'fd>,
        log: IoLog,
    ) -> Self {
        Self::with_capacity(input, output, pty, log, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(
        input: BorrowedFd<'fd>,
        output: BorrowedFd<'fd>,
        pty: BorrowedFd<'fd>,
        log: IoLog,
        capacity: usize,
    ) -> Self {
        let mut event_loop = EventLoop::new();
        let to_pty = event_loop.add_buffer(ByteBuffer::new(capacity));
        let from_pty = event_loop.add_buffer(ByteBuffer::new(capacity));

        let input = event_loop.add_channel(Channel::new("input", input).with_inbound(to_pty));
        let output = event_loop.add_channel(Channel::new("output", output).with_outbound(from_pty));
        let pty = event_loop.add_channel(
            Channel::new("pty", pty)
                .with_inbound(from_pty)
                .with_outbound(to_pty),
        );
        event_loop.channel_mut(input).want_readable(true);
        event_loop.channel_mut(pty).want_readable(true);

        let flow = SessionFlow {
            pipes: [
                Pipe {
                    stream: Stream::ToPty,
                    source: input,
                    sink: pty,
                    buffer: to_pty,
                    state: PipeState::Filling,
                },
                Pipe {
                    stream: Stream::FromPty,
                    source: pty,
                    sink: output,
                    buffer: from_pty,
                    state: PipeState::Filling,
                },
            ],
            log,
        };
        Self { event_loop, flow }
    }

    /// Relay until an error ends the session
    pub fn run(&mut self) -> Result<Infallible> {
        self.event_loop.run(&mut self.flow)
    }

    /// Relay for a single loop iteration
    pub fn turn(&mut self) -> Result<()> {
        self.event_loop.turn(&mut self.flow)
    }

    pub fn state(&self, stream: Stream) -> PipeState {
        self.flow.state(stream)
    }
}

/// Spawn the shell and relay the process's stdin/stdout to it
///
/// Only returns on error. Closure of the PTY (the shell exiting) also ends
/// the session with an error.
pub fn run(config: &Config) -> Result<Infallible> {
    let command = ShellCommand::interactive_bash(&config.term)?;
    let pty = Pty::spawn(&command)?;
    pty::set_window_size(pty.master(), config.window)?;
    pty.master_fd().set_nonblocking()?;

    let log = match &config.log_ios {
        Some(path) => IoLog::create(path)?,
        None => IoLog::disabled(),
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let _guard = TerminalGuard::new(stdin.as_fd(), stdout.as_fd())?;

    info!(
        term = %config.term,
        rows = config.window.rows,
        cols = config.window.cols,
        "relaying"
    );
    let mut session = Session::new(stdin.as_fd(), stdout.as_fd(), pty.master(), log);
    session.run()
}
