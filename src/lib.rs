//! Ptyrelay Library
//!
//! Relays a terminal's stdin/stdout to a shell running on a fresh
//! pseudoterminal, without blocking and without interpreting the bytes.
//!
//! - `buffer`: fixed-capacity fill/drain buffer
//! - `fd`: owned descriptors and non-blocking mode
//! - `channel`: a polled descriptor with its inbound/outbound buffers
//! - `event_loop`: the poll(2) loop dispatching channels
//! - `session`: stdin → PTY → stdout wiring and flow control
//! - `pty`: PTY spawning and window size
//! - `iolog`, `config`, `term`, `selftest`: around the core

pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod fd;
pub mod iolog;
pub mod pty;
pub mod selftest;
pub mod session;
pub mod term;

pub use buffer::ByteBuffer;
pub use config::{Action, Cli, Config};
pub use error::{Error, Result};
pub use session::{run, Session};
