//! Fixed-capacity I/O buffer
//!
//! A [`ByteBuffer`] alternates between two phases without ever allocating
//! after construction:
//!
//! - *filling*: `fill` appends bytes read from a descriptor at the cursor,
//!   until the cursor reaches the limit (the capacity).
//! - *draining*: after `flip`, the limit marks the end of the data that was
//!   read and `drain` writes from the cursor toward it.
//!
//! `clear` goes back to filling. `0 <= cursor <= limit <= capacity` holds at
//! all times.

use std::os::fd::{AsFd, AsRawFd};

use nix::errno::Errno;
use nix::unistd;

use crate::error::{Error, Result};

/// Capacity used for each direction of a session
pub const DEFAULT_CAPACITY: usize = 1024;

/// A byte window with a cursor and a limit
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    bytes: Box<[u8]>,
    cursor: usize,
    limit: usize,
}

impl ByteBuffer {
    /// Create an empty buffer in the filling phase
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity].into_boxed_slice(),
            cursor: 0,
            limit: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Space left to fill, or bytes left to drain, depending on the phase
    pub fn remaining(&self) -> usize {
        self.limit - self.cursor
    }

    /// Bytes between the cursor and the limit
    pub fn pending(&self) -> &[u8] {
        &self.bytes[self.cursor..self.limit]
    }

    /// Switch from filling to draining: what was read becomes what is written
    pub fn flip(&mut self) -> &mut Self {
        self.limit = self.cursor;
        self.cursor = 0;
        self
    }

    /// Switch back to filling with the whole capacity available
    pub fn clear(&mut self) -> &mut Self {
        self.cursor = 0;
        self.limit = self.capacity();
        self
    }

    /// Read once from `fd` into the free space
    ///
    /// Returns the number of bytes read. Would-block is reported as 0.
    ///
    /// # Errors
    /// [`Error::BufferFull`] if there is no free space (no syscall is made),
    /// [`Error::Io`] if `read(2)` fails.
    pub fn fill<F: AsFd>(&mut self, fd: F) -> Result<usize> {
        if self.remaining() == 0 {
            return Err(Error::BufferFull {
                capacity: self.capacity(),
            });
        }
        let window = &mut self.bytes[self.cursor..self.limit];
        let n = match unistd::read(fd.as_fd().as_raw_fd(), window) {
            Ok(n) => n,
            // EAGAIN and EWOULDBLOCK are the same value on Linux
            Err(Errno::EAGAIN) => 0,
            Err(e) => return Err(Error::io("read")(e)),
        };
        self.cursor += n;
        Ok(n)
    }

    /// Write once from the pending bytes to `fd`
    ///
    /// Returns `false` without touching `fd` when nothing is pending, and
    /// otherwise whether any byte was written.
    ///
    /// # Errors
    /// [`Error::Io`] if `write(2)` fails for a reason other than would-block.
    pub fn drain<F: AsFd>(&mut self, fd: F) -> Result<bool> {
        if self.remaining() == 0 {
            return Ok(false);
        }
        let n = match unistd::write(fd.as_fd().as_raw_fd(), self.pending()) {
            Ok(n) => n,
            Err(Errno::EAGAIN) => 0,
            Err(e) => return Err(Error::io("write")(e)),
        };
        self.cursor += n;
        Ok(n > 0)
    }

    /// Byte at `index`, for inspection
    ///
    /// # Errors
    /// [`Error::Bounds`] if `index` is not below the capacity.
    pub fn get(&self, index: usize) -> Result<u8> {
        self.bytes.get(index).copied().ok_or(Error::Bounds {
            index,
            capacity: self.capacity(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    use proptest::prelude::*;

    fn source(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> File {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        File::open(path).unwrap()
    }

    fn assert_bytes(buffer: &ByteBuffer, expected: &[u8]) {
        for (i, b) in expected.iter().enumerate() {
            assert_eq!(buffer.get(i).unwrap(), *b, "byte {}", i);
        }
    }

    #[test]
    fn test_new_buffer_is_filling() {
        let buffer = ByteBuffer::new(DEFAULT_CAPACITY);
        assert_eq!(buffer.cursor(), 0);
        assert_eq!(buffer.limit(), 1024);
        assert_eq!(buffer.remaining(), 1024);
    }

    #[test]
    fn test_fill_clear_refill() {
        let dir = tempfile::tempdir().unwrap();
        let digits = source(&dir, "digits", b"0123456");
        let letters = source(&dir, "letters", b"ABC");
        let mut buffer = ByteBuffer::new(5);

        assert_eq!(buffer.fill(&digits).unwrap(), 5);
        assert_eq!(buffer.cursor(), 5);
        assert_eq!(buffer.remaining(), 0);
        assert_bytes(&buffer, b"01234");

        assert!(matches!(
            buffer.fill(&digits),
            Err(Error::BufferFull { capacity: 5 })
        ));

        buffer.clear();
        assert_eq!(buffer.fill(&digits).unwrap(), 2);
        assert_eq!(buffer.cursor(), 2);
        assert_eq!(buffer.remaining(), 3);
        assert_bytes(&buffer, b"56");

        assert_eq!(buffer.fill(&letters).unwrap(), 3);
        assert_eq!(buffer.cursor(), 5);
        assert_eq!(buffer.remaining(), 0);
        assert_bytes(&buffer, b"56ABC");
    }

    #[test]
    fn test_fill_full_buffer_makes_no_syscall() {
        let dir = tempfile::tempdir().unwrap();
        // Reading from a write-only file would fail with EBADF
        let sink = File::create(dir.path().join("sink")).unwrap();
        let mut buffer = ByteBuffer::new(0);
        assert!(matches!(buffer.fill(&sink), Err(Error::BufferFull { .. })));
    }

    #[test]
    fn test_fill_would_block_is_zero() {
        let (a, _b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut buffer = ByteBuffer::new(16);
        assert_eq!(buffer.fill(&a).unwrap(), 0);
        assert_eq!(buffer.cursor(), 0);
    }

    #[test]
    fn test_fill_error_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let sink = File::create(dir.path().join("sink")).unwrap();
        let mut buffer = ByteBuffer::new(4);
        assert!(matches!(
            buffer.fill(&sink),
            Err(Error::Io { op: "read", .. })
        ));
    }

    #[test]
    fn test_drain_nothing_pending_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        // Writing to a read-only file would fail with EBADF
        let readonly = source(&dir, "ro", b"");
        let mut buffer = ByteBuffer::new(8);
        buffer.flip();
        assert_eq!(buffer.remaining(), 0);
        assert!(!buffer.drain(&readonly).unwrap());
    }

    #[test]
    fn test_flip_then_drain() {
        let (a, mut b) = UnixStream::pair().unwrap();
        b.write_all(b"hello").unwrap();
        let mut buffer = ByteBuffer::new(16);
        assert_eq!(buffer.fill(&a).unwrap(), 5);

        buffer.flip();
        assert_eq!(buffer.limit(), 5);
        assert_eq!(buffer.pending(), b"hello");

        assert!(buffer.drain(&a).unwrap());
        assert_eq!(buffer.remaining(), 0);

        let mut out = [0u8; 5];
        b.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn test_drain_error_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let readonly = source(&dir, "ro", b"xyz");
        let mut buffer = ByteBuffer::new(8);
        buffer.fill(&readonly).unwrap();
        buffer.flip();
        assert!(matches!(
            buffer.drain(&readonly),
            Err(Error::Io { op: "write", .. })
        ));
    }

    #[test]
    fn test_get_out_of_bounds() {
        let buffer = ByteBuffer::new(5);
        assert!(buffer.get(4).is_ok());
        assert!(matches!(
            buffer.get(5),
            Err(Error::Bounds {
                index: 5,
                capacity: 5
            })
        ));
    }

    proptest! {
        #[test]
        fn fill_advances_by_available(capacity in 1usize..256, len in 0usize..256) {
            let len = len.min(capacity);
            let dir = tempfile::tempdir().unwrap();
            let content: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let file = source(&dir, "src", &content);

            let mut buffer = ByteBuffer::new(capacity);
            let n = buffer.fill(&file).unwrap();
            prop_assert_eq!(n, len);
            prop_assert_eq!(buffer.cursor(), len);
            prop_assert_eq!(buffer.remaining(), capacity - len);
        }

        #[test]
        fn flip_then_clear_is_fresh(capacity in 0usize..256, len in 0usize..256) {
            let len = len.min(capacity);
            let dir = tempfile::tempdir().unwrap();
            let file = source(&dir, "src", &vec![b'x'; len]);

            let mut buffer = ByteBuffer::new(capacity);
            if capacity > 0 {
                buffer.fill(&file).unwrap();
            }
            buffer.flip();
            prop_assert!(buffer.cursor() <= buffer.limit());
            buffer.clear();
            prop_assert_eq!(buffer.cursor(), 0);
            prop_assert_eq!(buffer.limit(), capacity);
        }
    }
}
