//! Configuration for PE flattening.
//!
//! Describes the address window the target environment can load into, the
//! section alignment images must use, and input size limits. Loadable from
//! JSON; every field falls back to its default.

use crate::error::{FlattenError, Result};
use crate::io::IOLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lowest address the boot environment can load into.
pub const DEFAULT_MIN_ADDR: u64 = 0xC000;
/// One past the highest loadable address: 0x24000 of payload after the 0x7C00 boot sector.
pub const DEFAULT_MAX_ADDR: u64 = 0x24000 + 0x7C00;
/// Section alignment images are expected to use (4 KiB pages).
pub const DEFAULT_SECTION_ALIGNMENT: u32 = 0x1000;

/// Master configuration for a flattening pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    /// Inclusive lower bound of the load window.
    pub min_addr: u64,
    /// Exclusive upper bound of the load window.
    pub max_addr: u64,
    /// Required `SectionAlignment`; virtual sizes are rounded up to it.
    pub section_alignment: u32,
    /// Input file limits.
    pub io: IOLimits,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            min_addr: DEFAULT_MIN_ADDR,
            max_addr: DEFAULT_MAX_ADDR,
            section_alignment: DEFAULT_SECTION_ALIGNMENT,
            io: IOLimits::default(),
        }
    }
}

impl FlattenConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FlattenError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
            .map_err(|e| FlattenError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reject windows and alignments no image could satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.min_addr >= self.max_addr {
            return Err(FlattenError::Config(format!(
                "load window {:#x}..{:#x} is empty",
                self.min_addr, self.max_addr
            )));
        }
        if !self.section_alignment.is_power_of_two() {
            return Err(FlattenError::Config(format!(
                "section alignment {:#x} is not a power of two",
                self.section_alignment
            )));
        }
        Ok(())
    }

    /// True when `start..end` may be loaded.
    ///
    /// Both ends are checked separately: the start must be inside
    /// `[min_addr, max_addr)` and the end inside `(min_addr, max_addr]`.
    pub fn window_contains(&self, start: u64, end: u64) -> bool {
        start >= self.min_addr
            && start < self.max_addr
            && end > self.min_addr
            && end <= self.max_addr
    }
}
