//! Built-in self-test (`--ut`)
//!
//! Exercises buffer filling against real files so a deployed binary can
//! check itself without the test harness.

use std::fs::{self, File};
use std::path::Path;

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};

/// Run every check, stopping at the first failure
pub fn run() -> Result<()> {
    buffer_fill()?;
    Ok(())
}

fn check(ok: bool, what: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::SelfTest(what.to_string()))
    }
}

fn check_bytes(buffer: &ByteBuffer, expected: &[u8]) -> Result<()> {
    for (i, b) in expected.iter().enumerate() {
        check(buffer.get(i)? == *b, &format!("bad byte [{}]", i))?;
    }
    Ok(())
}

fn fixture(dir: &Path, name: &str, content: &[u8]) -> Result<File> {
    let path = dir.join(name);
    fs::write(&path, content).map_err(|e| Error::SelfTest(format!("write {}: {}", name, e)))?;
    File::open(&path).map_err(|e| Error::SelfTest(format!("open {}: {}", name, e)))
}

/// Fill, overflow, clear and refill a 5 byte buffer from two files
fn buffer_fill() -> Result<()> {
    tracing::info!("running buffer_fill ...");
    let dir = tempfile::tempdir().map_err(|e| Error::SelfTest(format!("temp dir: {}", e)))?;
    let digits = fixture(dir.path(), "digits", b"0123456")?;
    let letters = fixture(dir.path(), "letters", b"ABC")?;

    let mut buffer = ByteBuffer::new(5);
    buffer.fill(&digits)?;
    check(buffer.cursor() == 5, "bad cursor after first fill")?;
    check(buffer.remaining() == 0, "bad remaining after first fill")?;
    check_bytes(&buffer, b"01234")?;

    check(
        matches!(buffer.fill(&digits), Err(Error::BufferFull { .. })),
        "filling a full buffer must fail",
    )?;

    buffer.clear();
    buffer.fill(&digits)?;
    check(buffer.cursor() == 2, "bad cursor after refill")?;
    check(buffer.remaining() == 3, "bad remaining after refill")?;
    check_bytes(&buffer, b"56")?;

    buffer.fill(&letters)?;
    check(buffer.cursor() == 5, "bad cursor after second source")?;
    check(buffer.remaining() == 0, "bad remaining after second source")?;
    check_bytes(&buffer, b"56ABC")?;

    tracing::info!("running buffer_fill DONE");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_test_passes() {
        run().unwrap();
    }

    #[test]
    fn test_check_reports_failure() {
        let err = check(false, "bad cursor").unwrap_err();
        assert_eq!(err.to_string(), "self-test failed: bad cursor");
    }
}
