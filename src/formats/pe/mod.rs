//! PE32+ parser for fixed-address images

pub mod headers;
pub mod sections;
pub mod types;
pub mod utils;

use crate::config::FlattenConfig;
use crate::error::Result as FlattenResult;
use headers::*;
use sections::*;
pub use types::*;

pub use sections::LoadableSection;

/// Main PE parser
pub struct PeParser<'data> {
    data: &'data [u8],
    dos_header: DosHeader,
    header: PeHeader,
    sections: Vec<SectionHeader>,
}

impl<'data> PeParser<'data> {
    /// Parse headers and the section table, requiring `section_alignment`.
    pub fn new(data: &'data [u8], section_alignment: u32) -> Result<Self> {
        let dos_header = parse_dos_header(data)?;
        let pe_offset = dos_header.e_lfanew as usize;

        let header = parse_pe_header(data, pe_offset, section_alignment)?;

        let section_offset = pe_offset
            .saturating_add(OPTIONAL_HEADER_OFFSET)
            .saturating_add(header.size_of_optional_header as usize);
        let sections = parse_section_headers(data, section_offset, header.number_of_sections)?;

        Ok(Self {
            data,
            dos_header,
            header,
            sections,
        })
    }

    /// Get DOS header
    pub fn dos_header(&self) -> &DosHeader {
        &self.dos_header
    }

    /// Get the PE header
    pub fn header(&self) -> &PeHeader {
        &self.header
    }

    /// Get machine type
    pub fn machine(&self) -> Machine {
        self.header.machine
    }

    /// Get entry point RVA
    pub fn entry_point(&self) -> u32 {
        self.header.address_of_entry_point
    }

    /// Get image base
    pub fn image_base(&self) -> u64 {
        self.header.image_base
    }

    /// Absolute entry point address, if it fits in 64 bits
    pub fn entry_address(&self) -> Option<u64> {
        self.image_base().checked_add(self.entry_point() as u64)
    }

    /// Section headers in file order
    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    /// Validate all sections against `config` and return the ones with raw data
    pub fn loadable_sections(&self, config: &FlattenConfig) -> FlattenResult<Vec<LoadableSection<'data>>> {
        collect_loadable_sections(self.data, &self.sections, self.image_base(), config)
    }
}
