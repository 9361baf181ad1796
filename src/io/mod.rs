//! Bounded input reading and all-or-nothing output writing.
//!
//! Inputs are size-checked before they are mapped, so an oversized file is
//! rejected without being read. Outputs are staged in a temporary file next
//! to the destination and renamed into place once fully written.

pub mod error;

use crate::io::error::{IoError, Result};
use bytes::Bytes;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Defines the resource limits for I/O operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IOLimits {
    /// The absolute maximum input file size that will be read.
    pub max_file_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_file_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Read a whole input file, refusing anything larger than `limits.max_file_size`.
pub fn read_input<P: AsRef<Path>>(path: P, limits: &IOLimits) -> Result<Bytes> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();

    debug!(
        path = %path.display(),
        size = file_size,
        limits.max_file_size = limits.max_file_size,
        "Opening input image"
    );

    if file_size > limits.max_file_size {
        warn!(
            path = %path.display(),
            size = file_size,
            limit = limits.max_file_size,
            "Input is too large"
        );
        return Err(IoError::FileTooLarge {
            limit: limits.max_file_size,
            found: file_size,
        });
    }

    // memmap cannot map empty files.
    if file_size == 0 {
        return Ok(Bytes::new());
    }

    // Safety: read-only map of a regular file; the contents are copied out
    // before the map is dropped.
    let map = unsafe { Mmap::map(&file)? };
    Ok(Bytes::copy_from_slice(&map))
}

/// Write `path` atomically: `write` fills a temporary file in the same
/// directory, which replaces `path` only if every write succeeds.
pub fn write_atomic<P, F>(path: P, write: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let staged = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(staged.as_file());
        write(&mut out)?;
        out.flush()?;
    }
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| IoError::StdIo(e.error))?;

    debug!(path = %path.display(), "Wrote output");
    Ok(())
}
