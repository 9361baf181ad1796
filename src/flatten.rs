//! Flattening of validated PE sections into one contiguous memory image.
//!
//! The image is addressed from the PE image base: byte `i` of the image is
//! the contents of virtual address `image_base + i`. Gaps between sections
//! and the tail of each section past its raw data are zero-filled. The
//! serialized form is the image followed by the absolute entry point as a
//! little-endian `u64`.

use crate::config::FlattenConfig;
use crate::error::{FlattenError, Result};
use crate::formats::pe::{LoadableSection, PeParser};
use crate::io;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Size of the entry point trailer appended after the image
pub const ENTRY_TRAILER_SIZE: usize = 8;

/// Where a section ended up in the flat image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedSection {
    pub name: String,
    /// Absolute virtual start address
    pub start: u64,
    /// Absolute virtual end address (exclusive, rounded to section alignment)
    pub end: u64,
    /// Bytes copied from the file
    pub raw_size: usize,
    /// Zero bytes emitted between the previous section and this one
    pub leading_zeros: u64,
    /// Zero bytes emitted after the raw data to reach `end`
    pub trailing_zeros: u64,
}

impl PlacedSection {
    /// Offset of this section within the flat image
    pub fn image_offset(&self, image_base: u64) -> u64 {
        self.start - image_base
    }
}

/// A flattened memory image plus its entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatImage {
    image_base: u64,
    entry_rva: u32,
    entry_point: u64,
    bytes: Vec<u8>,
    layout: Vec<PlacedSection>,
}

impl FlatImage {
    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn entry_rva(&self) -> u32 {
        self.entry_rva
    }

    /// Absolute entry point address
    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    /// Image bytes without the trailer
    pub fn image(&self) -> &[u8] {
        &self.bytes
    }

    /// Sections in the order they were laid out
    pub fn layout(&self) -> &[PlacedSection] {
        &self.layout
    }

    /// Length of the serialized artifact, trailer included
    pub fn output_len(&self) -> usize {
        self.bytes.len() + ENTRY_TRAILER_SIZE
    }

    /// Serialize image and trailer into `w`
    pub fn write_to<W: std::io::Write + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.bytes)?;
        w.write_all(&self.entry_point.to_le_bytes())
    }

    /// Serialized artifact as one buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.output_len());
        out.extend_from_slice(&self.bytes);
        out.extend_from_slice(&self.entry_point.to_le_bytes());
        out
    }
}

fn zero_fill(buf: &mut Vec<u8>, count: u64) {
    buf.resize(buf.len() + count as usize, 0);
}

/// Lay `sections` out from `image_base`.
///
/// Sections are sorted by start address (stable, so equal starts keep their
/// input order) and must not overlap. The result covers exactly
/// `image_base..last_end`.
pub fn flatten_sections(
    image_base: u64,
    mut sections: Vec<LoadableSection<'_>>,
) -> Result<(Vec<u8>, Vec<PlacedSection>)> {
    sections.sort_by_key(|s| s.start);

    let total = sections
        .last()
        .map_or(0, |s| s.end.saturating_sub(image_base));
    let mut flattened = Vec::with_capacity(total as usize);
    let mut layout = Vec::with_capacity(sections.len());
    let mut fva = image_base;

    for section in sections {
        if fva > section.start {
            return Err(FlattenError::Overlap {
                section: section.name,
                start: section.start,
                cursor: fva,
            });
        }

        let leading_zeros = section.start - fva;
        zero_fill(&mut flattened, leading_zeros);
        fva = section.start;

        flattened.extend_from_slice(section.data);
        fva += section.data.len() as u64;

        if fva > section.end {
            return Err(FlattenError::Overrun {
                section: section.name,
                cursor: fva,
                end: section.end,
            });
        }

        let trailing_zeros = section.end - fva;
        zero_fill(&mut flattened, trailing_zeros);
        fva = section.end;

        debug!(
            section = %section.name,
            start = format_args!("{:#x}", section.start),
            end = format_args!("{:#x}", section.end),
            leading_zeros,
            trailing_zeros,
            "Placed section"
        );

        layout.push(PlacedSection {
            name: section.name,
            start: section.start,
            end: section.end,
            raw_size: section.data.len(),
            leading_zeros,
            trailing_zeros,
        });
    }

    Ok((flattened, layout))
}

/// Parse, validate and flatten an in-memory PE image.
pub fn flatten(data: &[u8], config: &FlattenConfig) -> Result<FlatImage> {
    config.validate()?;

    let pe = PeParser::new(data, config.section_alignment)?;
    let image_base = pe.image_base();
    let entry_rva = pe.entry_point();
    let entry_point = pe.entry_address().ok_or(FlattenError::EntryOverflow {
        image_base,
        rva: entry_rva,
    })?;

    let sections = pe.loadable_sections(config)?;
    let (bytes, layout) = flatten_sections(image_base, sections)?;

    if !layout
        .iter()
        .any(|s| (s.start..s.end).contains(&entry_point))
    {
        warn!(
            entry_point = format_args!("{:#x}", entry_point),
            "Entry point is not inside any loaded section"
        );
    }

    info!(
        image_base = format_args!("{:#x}", image_base),
        entry_point = format_args!("{:#x}", entry_point),
        sections = layout.len(),
        image_size = bytes.len(),
        "Flattened PE image"
    );

    Ok(FlatImage {
        image_base,
        entry_rva,
        entry_point,
        bytes,
        layout,
    })
}

/// Flatten the PE at `input` and write the artifact to `output`.
///
/// Nothing is written unless the whole conversion succeeds.
pub fn flatten_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &FlattenConfig,
) -> Result<FlatImage> {
    let image = flatten_path(input, config)?;
    io::write_atomic(output, |w| image.write_to(w))?;
    Ok(image)
}

/// Read and flatten the PE at `input` without writing anything.
pub fn flatten_path<P: AsRef<Path>>(input: P, config: &FlattenConfig) -> Result<FlatImage> {
    config.validate()?;
    let data = io::read_input(input, &config.io)?;
    flatten(&data, config)
}
