//! Flatten fixed-address 64-bit PE images into raw memory images.
//!
//! The output of a conversion is the image's virtual address space from its
//! image base up to the end of the last section that carries file data,
//! followed by the absolute entry point as a little-endian `u64`. It is meant
//! for loaders that have no PE support of their own.

pub mod config;
pub mod error;
pub mod flatten;
pub mod formats;
pub mod io;
pub mod logging;
pub mod report;

pub use config::FlattenConfig;
pub use error::{ErrorKind, FlattenError, Result};
pub use flatten::{flatten, flatten_file, flatten_path, FlatImage, PlacedSection};
pub use report::FlattenReport;
