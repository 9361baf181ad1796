//! Core PE data types and structures

use std::fmt;

// PE constants
pub const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32PLUS_MAGIC: u16 = 0x20B;
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;

/// Offset of `e_lfanew` inside the DOS header
pub const E_LFANEW_OFFSET: usize = 0x3C;
/// Signature + COFF header + PE32+ optional header, without data directories
pub const PE_HEADER_SIZE: usize = 136;
/// Signature + COFF header; the optional header starts here
pub const OPTIONAL_HEADER_OFFSET: usize = 0x18;
pub const SECTION_HEADER_SIZE: usize = 40;

// Section characteristics
pub const IMAGE_SCN_CNT_CODE: u32 = 0x00000020;
pub const IMAGE_SCN_MEM_EXECUTE: u32 = 0x20000000;
pub const IMAGE_SCN_MEM_READ: u32 = 0x40000000;
pub const IMAGE_SCN_MEM_WRITE: u32 = 0x80000000;

/// PE parsing error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeError {
    InvalidDosSignature,
    InvalidPeSignature,
    UnsupportedMachine(Machine),
    UnexpectedSectionAlignment { expected: u32, found: u32 },
    TruncatedHeader { expected: usize, actual: usize },
    TruncatedSectionData {
        section: String,
        offset: u32,
        size: u32,
        file_len: usize,
    },
}

impl fmt::Display for PeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDosSignature => write!(f, "No MZ header present"),
            Self::InvalidPeSignature => write!(f, "No PE magic present"),
            Self::UnsupportedMachine(m) => {
                write!(f, "PE file is not 64-bit x86 (machine 0x{:04x})", m.raw())
            }
            Self::UnexpectedSectionAlignment { expected, found } => write!(
                f,
                "Expected 0x{:x} aligned sections, got 0x{:x}",
                expected, found
            ),
            Self::TruncatedHeader { expected, actual } => {
                write!(
                    f,
                    "Truncated header: expected {} bytes, got {}",
                    expected, actual
                )
            }
            Self::TruncatedSectionData {
                section,
                offset,
                size,
                file_len,
            } => write!(
                f,
                "Section {:?} raw data 0x{:x}+0x{:x} extends past end of file (0x{:x} bytes)",
                section, offset, size, file_len
            ),
        }
    }
}

impl std::error::Error for PeError {}

pub type Result<T> = std::result::Result<T, PeError>;

/// Machine types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    Unknown,
    I386,   // 0x014c
    X86_64, // 0x8664
    Arm64,  // 0xaa64
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014c => Self::I386,
            IMAGE_FILE_MACHINE_AMD64 => Self::X86_64,
            0xaa64 => Self::Arm64,
            0 => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

impl Machine {
    pub fn raw(&self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::I386 => 0x014c,
            Self::X86_64 => IMAGE_FILE_MACHINE_AMD64,
            Self::Arm64 => 0xaa64,
            Self::Other(v) => *v,
        }
    }
}

/// Fixed 136-byte header at `e_lfanew`: PE signature, COFF file header and
/// the PE32+ optional header up to (not including) the data directories.
#[derive(Debug, Clone)]
pub struct PeHeader {
    pub signature: [u8; 4],

    // COFF file header
    pub machine: Machine,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,

    // Optional header
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

/// Section header (40 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_line_numbers: u32,
    pub number_of_relocations: u16,
    pub number_of_line_numbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    /// Get section name as string
    pub fn name(&self) -> String {
        crate::formats::pe::utils::section_name_to_string(&self.name)
    }

    pub fn is_executable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_EXECUTE != 0
    }

    pub fn is_writable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_WRITE != 0
    }

    /// Virtual size rounded up to `alignment`, computed without overflow.
    pub fn rounded_virtual_size(&self, alignment: u32) -> u64 {
        crate::formats::pe::utils::align_up(self.virtual_size as u64, alignment as u64)
    }
}
