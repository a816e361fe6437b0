//! Owned file descriptors
//!
//! [`ManagedFd`] is the single owner of an OS descriptor. It is closed when
//! the owner is dropped and nowhere else.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};

use crate::error::{Error, Result};

/// An owned descriptor, closed exactly once on drop
#[derive(Debug)]
pub struct ManagedFd {
    fd: OwnedFd,
}

impl ManagedFd {
    /// Take ownership of an already-open descriptor
    ///
    /// # Safety
    /// `raw` must be open and must not be owned or closed by anything else.
    pub unsafe fn acquire(raw: RawFd) -> Self {
        Self {
            fd: OwnedFd::from_raw_fd(raw),
        }
    }

    /// Put the descriptor in non-blocking mode
    pub fn set_nonblocking(&self) -> Result<()> {
        set_nonblocking(self.fd.as_fd())
    }

    /// Borrow the descriptor for the lifetime of `self`
    pub fn borrow(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl From<OwnedFd> for ManagedFd {
    fn from(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

impl AsFd for ManagedFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for ManagedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Set `O_NONBLOCK` on a descriptor we do not own (stdin, stdout)
pub fn set_nonblocking(fd: BorrowedFd<'_>) -> Result<()> {
    let flags = status_flags(fd)?;
    set_status_flags(fd, flags | OFlag::O_NONBLOCK)
}

/// Read the file status flags (`F_GETFL`)
pub fn status_flags(fd: BorrowedFd<'_>) -> Result<OFlag> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).map_err(Error::io("fcntl(F_GETFL)"))?;
    Ok(OFlag::from_bits_truncate(flags))
}

/// Replace the file status flags (`F_SETFL`)
pub fn set_status_flags(fd: BorrowedFd<'_>, flags: OFlag) -> Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags)).map_err(Error::io("fcntl(F_SETFL)"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::fd::IntoRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_set_nonblocking() {
        let (a, _b) = UnixStream::pair().unwrap();
        let fd = ManagedFd::from(OwnedFd::from(a));
        assert!(!status_flags(fd.borrow()).unwrap().contains(OFlag::O_NONBLOCK));

        fd.set_nonblocking().unwrap();
        assert!(status_flags(fd.borrow()).unwrap().contains(OFlag::O_NONBLOCK));
    }

    #[test]
    fn test_closed_on_drop() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let raw = a.into_raw_fd();
        let fd = unsafe { ManagedFd::acquire(raw) };
        assert_eq!(fd.as_raw_fd(), raw);
        drop(fd);

        // The peer only sees EOF once the last copy of the other end is closed
        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf).unwrap(), 0);
    }
}
