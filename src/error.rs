//! Error types for PE flattening.
//!
//! Every failure aborts the whole conversion; `FlattenError::kind` groups the
//! variants into format, range, overlap, I/O and configuration failures.

use crate::formats::pe::PeError;
use crate::io::error::IoError;
use std::fmt;
use thiserror::Error;

/// Broad category of a conversion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Format,
    Range,
    Overlap,
    Io,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Format => "FormatError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Overlap => "OverlapError",
            ErrorKind::Io => "IoError",
            ErrorKind::Config => "ConfigError",
        };
        f.write_str(s)
    }
}

/// Main error type for flattening operations.
#[derive(Debug, Error)]
pub enum FlattenError {
    /// Malformed or unsupported PE input
    #[error("Invalid PE image: {0}")]
    Format(#[from] PeError),

    /// Section RVA plus image base does not fit in 64 bits
    #[error("Section {section:?} address overflows: rva {rva:#x} size {size:#x} image base {image_base:#x}")]
    AddressOverflow {
        section: String,
        rva: u32,
        size: u64,
        image_base: u64,
    },

    /// Section covers no memory after rounding its virtual size
    #[error("Section {section:?} is empty: {start:#x}..{end:#x}")]
    EmptySection { section: String, start: u64, end: u64 },

    /// Raw file data does not fit the rounded virtual size
    #[error("Section {section:?} raw data ({raw_size:#x} bytes) exceeds rounded virtual size {virtual_size:#x}")]
    RawDataTooLarge {
        section: String,
        raw_size: u32,
        virtual_size: u64,
    },

    /// Section lies (partly) outside the loadable window
    #[error("Section {section:?} at {start:#x}..{end:#x} is outside the load window {min:#x}..{max:#x}")]
    OutsideWindow {
        section: String,
        start: u64,
        end: u64,
        min: u64,
        max: u64,
    },

    /// image_base + entry RVA does not fit in 64 bits
    #[error("Entry point overflows: image base {image_base:#x} + rva {rva:#x}")]
    EntryOverflow { image_base: u64, rva: u32 },

    /// Section starts below data already laid out
    #[error("Section {section:?} at {start:#x} overlaps layout already emitted up to {cursor:#x}")]
    Overlap {
        section: String,
        start: u64,
        cursor: u64,
    },

    /// Section raw data runs past its own virtual end
    #[error("Section {section:?} raw data runs to {cursor:#x}, past its end {end:#x}")]
    Overrun {
        section: String,
        cursor: u64,
        end: u64,
    },

    /// Reading the input or writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Unusable configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FlattenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format(_) => ErrorKind::Format,
            Self::AddressOverflow { .. }
            | Self::EmptySection { .. }
            | Self::RawDataTooLarge { .. }
            | Self::OutsideWindow { .. }
            | Self::EntryOverflow { .. } => ErrorKind::Range,
            Self::Overlap { .. } | Self::Overrun { .. } => ErrorKind::Overlap,
            Self::Io(_) => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<std::io::Error> for FlattenError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::StdIo(err))
    }
}

/// Result type alias for flattening operations
pub type Result<T> = std::result::Result<T, FlattenError>;
