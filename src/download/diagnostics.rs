//! Human-readable retry notices for the caller's diagnostics sink.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

/// Shared handle to the caller-supplied diagnostics writer.
#[derive(Clone)]
pub(crate) struct Diagnostics {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Diagnostics {
    pub(crate) fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    /// Writes one line. A broken diagnostics sink never fails the transfer.
    pub(crate) fn line(&self, args: fmt::Arguments<'_>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = out.write_fmt(args).and_then(|()| out.write_all(b"\n")) {
            debug!(error = %error, "diagnostics sink rejected write");
        }
        if let Err(error) = out.flush() {
            debug!(error = %error, "diagnostics sink rejected flush");
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}
