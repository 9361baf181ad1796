//! Machine-readable summary of a flattening pass.

use crate::flatten::{FlatImage, PlacedSection};
use serde::Serialize;
use std::path::Path;

/// Layout summary of one conversion, serialized as JSON by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct FlattenReport {
    pub input: String,
    pub output: Option<String>,
    pub image_base: u64,
    pub entry_rva: u32,
    pub entry_point: u64,
    /// Image length without the entry trailer
    pub image_size: usize,
    /// Bytes written, trailer included
    pub output_size: usize,
    pub sections: Vec<PlacedSection>,
}

impl FlattenReport {
    pub fn new(input: &Path, output: Option<&Path>, image: &FlatImage) -> Self {
        Self {
            input: input.display().to_string(),
            output: output.map(|p| p.display().to_string()),
            image_base: image.image_base(),
            entry_rva: image.entry_rva(),
            entry_point: image.entry_point(),
            image_size: image.image().len(),
            output_size: image.output_len(),
            sections: image.layout().to_vec(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
