//! PTY creation and window size
//!
//! Spawns a child process on the slave side of a fresh pseudoterminal and
//! hands back the master descriptor.
//!
//! Reference: https://www.man7.org/linux/man-pages/man3/posix_openpt.3.html

use std::convert::Infallible;
use std::ffi::{CStr, CString};
use std::os::fd::{AsRawFd, BorrowedFd, IntoRawFd};

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::libc::{self, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::pty::{grantpt, posix_openpt, ptsname, unlockpt};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{close, dup2, execve, fork, setsid, ForkResult, Pid};

use crate::error::{Error, Result};
use crate::fd::ManagedFd;

/// Exit status of a child that could not exec
const EXEC_FAILED: libc::c_int = 127;

/// Window size in characters and pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Number of rows (characters)
    pub rows: u16,
    /// Number of columns (characters)
    pub cols: u16,
    /// Width in pixels (optional, can be 0)
    pub pixel_width: u16,
    /// Height in pixels (optional, can be 0)
    pub pixel_height: u16,
}

impl WindowSize {
    /// Create a new window size
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }

    /// Convert to libc winsize structure
    pub fn to_winsize(&self) -> libc::winsize {
        libc::winsize {
            ws_row: self.rows,
            ws_col: self.cols,
            ws_xpixel: self.pixel_width,
            ws_ypixel: self.pixel_height,
        }
    }
}

impl From<libc::winsize> for WindowSize {
    fn from(ws: libc::winsize) -> Self {
        Self {
            rows: ws.ws_row,
            cols: ws.ws_col,
            pixel_width: ws.ws_xpixel,
            pixel_height: ws.ws_ypixel,
        }
    }
}

/// Program, argv and environment for the child, converted before forking
#[derive(Debug, Clone)]
pub struct ShellCommand {
    program: CString,
    args: Vec<CString>,
    env: Vec<CString>,
}

impl ShellCommand {
    /// Run `program` with itself as argv[0] and an empty environment
    pub fn new(program: &str) -> Result<Self> {
        let program = c_string(program)?;
        Ok(Self {
            args: vec![program.clone()],
            program,
            env: Vec::new(),
        })
    }

    /// An interactive bash with only `TERM` set
    pub fn interactive_bash(term: &str) -> Result<Self> {
        Self::new("/bin/bash")?.arg("-i")?.env("TERM", term)
    }

    pub fn arg(mut self, arg: &str) -> Result<Self> {
        self.args.push(c_string(arg)?);
        Ok(self)
    }

    pub fn env(mut self, key: &str, value: &str) -> Result<Self> {
        self.env.push(c_string(&format!("{}={}", key, value))?);
        Ok(self)
    }

    pub fn program(&self) -> &CStr {
        &self.program
    }
}

fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::Spawn {
        op: "interior nul byte in command",
        source: Errno::EINVAL,
    })
}

/// A PTY master with a child process on its slave side
#[derive(Debug)]
pub struct Pty {
    master: ManagedFd,
    child: Pid,
}

impl Pty {
    /// Fork `command` onto the slave side of a new PTY
    ///
    /// # Errors
    /// [`Error::Spawn`] if the PTY cannot be set up or the fork fails. A child
    /// that cannot exec exits with status 127.
    pub fn spawn(command: &ShellCommand) -> Result<Self> {
        let master =
            posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(Error::spawn("posix_openpt"))?;
        grantpt(&master).map_err(Error::spawn("grantpt"))?;
        unlockpt(&master).map_err(Error::spawn("unlockpt"))?;

        // SAFETY: ptsname is not thread-safe, but the result is copied out
        // before anything else can call it again
        let slave = unsafe { ptsname(&master) }.map_err(Error::spawn("ptsname"))?;
        let slave = CString::new(slave).map_err(|_| Error::Spawn {
            op: "ptsname",
            source: Errno::EINVAL,
        })?;

        // SAFETY: the child only makes raw system calls before exec or _exit
        match unsafe { fork() }.map_err(Error::spawn("fork"))? {
            ForkResult::Child => {
                drop(master);
                let _ = exec_on_slave(&slave, command);
                // SAFETY: leave without running the parent's destructors
                unsafe { libc::_exit(EXEC_FAILED) }
            },
            ForkResult::Parent { child } => {
                // SAFETY: into_raw_fd gives up the PtyMaster's ownership
                let master = unsafe { ManagedFd::acquire(master.into_raw_fd()) };
                tracing::info!(pid = child.as_raw(), program = ?command.program(), "spawned child");
                Ok(Pty { master, child })
            },
        }
    }

    pub fn master(&self) -> BorrowedFd<'_> {
        self.master.borrow()
    }

    pub fn master_fd(&self) -> &ManagedFd {
        &self.master
    }

    pub fn child_pid(&self) -> Pid {
        self.child
    }

    pub fn resize(&self, size: WindowSize) -> Result<()> {
        set_window_size(self.master(), size)
    }

    pub fn window_size(&self) -> Result<WindowSize> {
        window_size(self.master())
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        // Try to reap the child process
        let _ = waitpid(self.child, Some(WaitPidFlag::WNOHANG));
    }
}

/// Runs in the forked child; only returns on failure
fn exec_on_slave(slave: &CStr, command: &ShellCommand) -> nix::Result<Infallible> {
    setsid()?;

    // Opening the slave after setsid makes it the controlling terminal
    let slave_fd = open(slave, OFlag::O_RDWR, Mode::empty())?;

    // SAFETY: TIOCSCTTY is a valid ioctl on a terminal descriptor. It fails
    // harmlessly when the terminal is already controlling.
    unsafe {
        libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0);
    }

    dup2(slave_fd, STDIN_FILENO)?;
    dup2(slave_fd, STDOUT_FILENO)?;
    dup2(slave_fd, STDERR_FILENO)?;
    if slave_fd > STDERR_FILENO {
        close(slave_fd)?;
    }

    execve(&command.program, &command.args, &command.env)
}

/// Apply a window size to a PTY (`TIOCSWINSZ`)
pub fn set_window_size(fd: BorrowedFd<'_>, size: WindowSize) -> Result<()> {
    let ws = size.to_winsize();

    // SAFETY: TIOCSWINSZ reads a winsize that outlives the call
    let result = unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
    if result == -1 {
        return Err(Error::io("ioctl(TIOCSWINSZ)")(Errno::last()));
    }
    tracing::debug!(rows = size.rows, cols = size.cols, "window size set");
    Ok(())
}

/// Query the window size of a PTY (`TIOCGWINSZ`)
pub fn window_size(fd: BorrowedFd<'_>) -> Result<WindowSize> {
    let mut ws = WindowSize::new(0, 0).to_winsize();

    // SAFETY: TIOCGWINSZ writes into a winsize we own
    let result = unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCGWINSZ, &mut ws) };
    if result == -1 {
        return Err(Error::io("ioctl(TIOCGWINSZ)")(Errno::last()));
    }
    Ok(WindowSize::from(ws))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, Instant};

    use nix::poll::{poll, PollFd, PollFlags};

    use crate::buffer::ByteBuffer;

    /// Read from the master until `needle` shows up or the deadline passes
    fn read_until(pty: &Pty, needle: &str, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        let mut output = Vec::new();
        let mut buffer = ByteBuffer::new(1024);
        while Instant::now() < deadline {
            let master = pty.master();
            let mut fds = [PollFd::new(&master, PollFlags::POLLIN)];
            if poll(&mut fds, 50).unwrap() == 0 {
                continue;
            }
            buffer.clear();
            match buffer.fill(pty.master()) {
                Ok(n) if n > 0 => {
                    buffer.flip();
                    output.extend_from_slice(buffer.pending());
                },
                // EIO once the child is gone
                _ => break,
            }
            if String::from_utf8_lossy(&output).contains(needle) {
                break;
            }
        }
        String::from_utf8_lossy(&output).into_owned()
    }

    #[test]
    fn test_window_size_new() {
        let size = WindowSize::new(120, 40);
        assert_eq!(size.cols, 120);
        assert_eq!(size.rows, 40);
        assert_eq!(size.pixel_width, 0);
        assert_eq!(size.pixel_height, 0);
    }

    #[test]
    fn test_to_winsize() {
        let ws = WindowSize::new(80, 24).to_winsize();
        assert_eq!(ws.ws_col, 80);
        assert_eq!(ws.ws_row, 24);
    }

    #[test]
    fn test_interactive_bash_command() {
        let cmd = ShellCommand::interactive_bash("xterm").unwrap();
        assert_eq!(cmd.program().to_str().unwrap(), "/bin/bash");
        assert_eq!(cmd.args.len(), 2);
        assert_eq!(cmd.args[1].to_str().unwrap(), "-i");
        assert_eq!(cmd.env, vec![CString::new("TERM=xterm").unwrap()]);
    }

    #[test]
    fn test_command_rejects_nul() {
        assert!(matches!(
            ShellCommand::new("/bin/sh").unwrap().arg("a\0b"),
            Err(Error::Spawn { .. })
        ));
    }

    #[test]
    fn test_window_size_after_spawn() {
        let pty = Pty::spawn(&ShellCommand::new("/bin/cat").unwrap()).unwrap();
        pty.resize(WindowSize::new(120, 40)).unwrap();

        let size = pty.window_size().unwrap();
        assert_eq!(size.rows, 40);
        assert_eq!(size.cols, 120);
    }

    #[test]
    fn test_child_sees_environment() {
        let cmd = ShellCommand::new("/bin/sh")
            .unwrap()
            .arg("-c")
            .unwrap()
            .arg("echo term=$TERM")
            .unwrap()
            .env("TERM", "vt100")
            .unwrap();
        let pty = Pty::spawn(&cmd).unwrap();
        pty.master_fd().set_nonblocking().unwrap();

        let output = read_until(&pty, "term=vt100", Duration::from_secs(5));
        assert!(output.contains("term=vt100"), "Unexpected output: {}", output);
    }

    #[test]
    fn test_missing_program_exits_child() {
        let pty = Pty::spawn(&ShellCommand::new("/nonexistent/program").unwrap()).unwrap();
        let status = waitpid(pty.child_pid(), None).unwrap();
        assert_eq!(
            status,
            nix::sys::wait::WaitStatus::Exited(pty.child_pid(), EXEC_FAILED)
        );
    }

    #[test]
    fn test_window_size_on_non_tty_fails() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(matches!(
            window_size(a.as_fd()),
            Err(Error::Io { .. })
        ));
    }
}
