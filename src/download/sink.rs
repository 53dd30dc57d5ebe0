//! Positional output sinks.

use std::fs::File;
use std::io;

/// A destination that accepts writes at absolute offsets.
///
/// Segments write concurrently at disjoint offsets, so implementations must
/// not depend on a shared cursor.
pub trait OutputSink: Send + Sync {
    /// Writes all of `buf` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error.
    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// Current size of the sink.
    ///
    /// # Errors
    ///
    /// Returns the error from querying the sink's metadata.
    fn size(&self) -> io::Result<u64>;

    /// Resizes the sink to exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error.
    fn set_size(&self, len: u64) -> io::Result<()>;
}

impl OutputSink for File {
    #[cfg(unix)]
    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        FileExt::write_all_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn write_at(&self, offset: u64, mut buf: &[u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut offset = offset;
        while !buf.is_empty() {
            match self.seek_write(buf, offset) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_size(&self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}
