//! Pass-through log of relayed bytes
//!
//! Each record is a header line (`TO:` for bytes going to the shell, `FROM:`
//! for bytes coming back) followed by the raw bytes and a newline.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// Optional sink for relayed bytes; disabled means every record is a no-op
#[derive(Default)]
pub struct IoLog {
    sink: Option<Box<dyn Write>>,
}

impl IoLog {
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Log to a file, truncating it
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        tracing::info!(path = %path.display(), "logging relayed bytes");
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer<W: Write + 'static>(writer: W) -> Self {
        Self {
            sink: Some(Box::new(writer)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Append one record and flush it
    pub fn record(&mut self, label: &str, bytes: &[u8]) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        writeln!(sink, "{}:", label)?;
        sink.write_all(bytes)?;
        sink.write_all(b"\n")?;
        sink.flush()?;
        Ok(())
    }
}

impl fmt::Debug for IoLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoLog")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
