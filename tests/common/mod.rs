//! Shared helpers for integration tests: a builder for small synthetic
//! PE32+ images and temp-file utilities.

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

pub const PE_OFFSET: usize = 0x40;
pub const OPTIONAL_HEADER_SIZE: u16 = 0xF0;
pub const FILE_ALIGNMENT: usize = 0x200;

/// One section table entry plus the raw bytes backing it.
#[derive(Debug, Clone)]
pub struct TestSection {
    pub name: &'static str,
    pub rva: u32,
    pub virtual_size: u32,
    pub raw: Vec<u8>,
    /// Overrides `SizeOfRawData` (defaults to `raw.len()`).
    pub raw_size: Option<u32>,
    /// Overrides `PointerToRawData` (defaults to where `raw` was placed).
    pub raw_ptr: Option<u32>,
}

/// Builder for minimal 64-bit PE images.
#[derive(Debug, Clone)]
pub struct PeBuilder {
    image_base: u64,
    entry_rva: u32,
    machine: u16,
    section_alignment: u32,
    sections: Vec<TestSection>,
}

impl PeBuilder {
    pub fn new(image_base: u64) -> Self {
        Self {
            image_base,
            entry_rva: 0x1000,
            machine: 0x8664,
            section_alignment: 0x1000,
            sections: Vec::new(),
        }
    }

    pub fn entry(mut self, rva: u32) -> Self {
        self.entry_rva = rva;
        self
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn section_alignment(mut self, alignment: u32) -> Self {
        self.section_alignment = alignment;
        self
    }

    /// Section whose raw data is `raw`.
    pub fn section(mut self, name: &'static str, rva: u32, virtual_size: u32, raw: &[u8]) -> Self {
        self.sections.push(TestSection {
            name,
            rva,
            virtual_size,
            raw: raw.to_vec(),
            raw_size: None,
            raw_ptr: None,
        });
        self
    }

    /// Section with no file data, like `.bss`.
    pub fn bss(self, name: &'static str, rva: u32, virtual_size: u32) -> Self {
        self.section(name, rva, virtual_size, &[])
    }

    pub fn raw_section(mut self, section: TestSection) -> Self {
        self.sections.push(section);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let table_offset = PE_OFFSET + 0x18 + OPTIONAL_HEADER_SIZE as usize;
        let headers_end = table_offset + self.sections.len() * 40;
        let mut data = vec![0u8; align(headers_end, FILE_ALIGNMENT)];

        // DOS header
        data[0..2].copy_from_slice(b"MZ");
        data[0x3C..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());

        // PE signature and COFF header
        let pe = PE_OFFSET;
        data[pe..pe + 4].copy_from_slice(b"PE\0\0");
        put(&mut data, pe + 4, &self.machine.to_le_bytes());
        put(&mut data, pe + 6, &(self.sections.len() as u16).to_le_bytes());
        put(&mut data, pe + 20, &OPTIONAL_HEADER_SIZE.to_le_bytes());
        put(&mut data, pe + 22, &0x0022u16.to_le_bytes());

        // Optional header
        put(&mut data, pe + 24, &0x20Bu16.to_le_bytes());
        put(&mut data, pe + 40, &self.entry_rva.to_le_bytes());
        put(&mut data, pe + 48, &self.image_base.to_le_bytes());
        put(&mut data, pe + 56, &self.section_alignment.to_le_bytes());
        put(&mut data, pe + 60, &(FILE_ALIGNMENT as u32).to_le_bytes());
        put(&mut data, pe + 132, &16u32.to_le_bytes());

        for (i, section) in self.sections.iter().enumerate() {
            let placed_at = data.len();
            if !section.raw.is_empty() {
                data.extend_from_slice(&section.raw);
                data.resize(align(data.len(), FILE_ALIGNMENT), 0);
            }

            let entry = table_offset + i * 40;
            let mut name = [0u8; 8];
            let n = section.name.len().min(8);
            name[..n].copy_from_slice(&section.name.as_bytes()[..n]);
            put(&mut data, entry, &name);
            put(&mut data, entry + 8, &section.virtual_size.to_le_bytes());
            put(&mut data, entry + 12, &section.rva.to_le_bytes());
            let raw_size = section.raw_size.unwrap_or(section.raw.len() as u32);
            put(&mut data, entry + 16, &raw_size.to_le_bytes());
            let raw_ptr = match section.raw_ptr {
                Some(ptr) => ptr,
                None if section.raw.is_empty() => 0,
                None => placed_at as u32,
            };
            put(&mut data, entry + 20, &raw_ptr.to_le_bytes());
            put(&mut data, entry + 36, &0x6000_0020u32.to_le_bytes());
        }

        data
    }
}

fn put(data: &mut [u8], offset: usize, bytes: &[u8]) {
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn align(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Creates a temporary file with the given content.
pub fn create_temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content).unwrap();
    temp_file
}

/// Split a flattened artifact into image bytes and decoded entry point.
pub fn split_trailer(output: &[u8]) -> (&[u8], u64) {
    assert!(output.len() >= 8, "output shorter than the entry trailer");
    let (image, trailer) = output.split_at(output.len() - 8);
    (image, u64::from_le_bytes(trailer.try_into().unwrap()))
}
