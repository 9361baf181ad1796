//! PE header parsing

use crate::formats::pe::types::*;
use crate::formats::pe::utils::{FieldCursor, ReadExt};
use tracing::{debug, warn};

/// The two DOS header fields a flat loader cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosHeader {
    pub e_magic: u16,
    pub e_lfanew: u32,
}

/// Parse DOS header from data
pub fn parse_dos_header(data: &[u8]) -> Result<DosHeader> {
    let e_magic = data.read_u16_le_at(0).unwrap_or(0);
    if e_magic != DOS_SIGNATURE {
        return Err(PeError::InvalidDosSignature);
    }

    let e_lfanew = data
        .read_u32_le_at(E_LFANEW_OFFSET)
        .ok_or(PeError::TruncatedHeader {
            expected: E_LFANEW_OFFSET + 4,
            actual: data.len(),
        })?;

    Ok(DosHeader { e_magic, e_lfanew })
}

/// Parse the fixed 136-byte PE header at `offset` and check the invariants
/// a flat image depends on: PE signature, AMD64 machine and the expected
/// section alignment.
pub fn parse_pe_header(data: &[u8], offset: usize, section_alignment: u32) -> Result<PeHeader> {
    let span = data
        .read_slice_at(offset, PE_HEADER_SIZE)
        .ok_or(PeError::TruncatedHeader {
            expected: offset.saturating_add(PE_HEADER_SIZE),
            actual: data.len(),
        })?;

    let mut cur = FieldCursor::new(span);
    let header = PeHeader {
        signature: cur.bytes(),
        machine: Machine::from(cur.u16()),
        number_of_sections: cur.u16(),
        time_date_stamp: cur.u32(),
        pointer_to_symbol_table: cur.u32(),
        number_of_symbols: cur.u32(),
        size_of_optional_header: cur.u16(),
        characteristics: cur.u16(),
        magic: cur.u16(),
        major_linker_version: cur.u8(),
        minor_linker_version: cur.u8(),
        size_of_code: cur.u32(),
        size_of_initialized_data: cur.u32(),
        size_of_uninitialized_data: cur.u32(),
        address_of_entry_point: cur.u32(),
        base_of_code: cur.u32(),
        image_base: cur.u64(),
        section_alignment: cur.u32(),
        file_alignment: cur.u32(),
        major_operating_system_version: cur.u16(),
        minor_operating_system_version: cur.u16(),
        major_image_version: cur.u16(),
        minor_image_version: cur.u16(),
        major_subsystem_version: cur.u16(),
        minor_subsystem_version: cur.u16(),
        win32_version_value: cur.u32(),
        size_of_image: cur.u32(),
        size_of_headers: cur.u32(),
        checksum: cur.u32(),
        subsystem: cur.u16(),
        dll_characteristics: cur.u16(),
        size_of_stack_reserve: cur.u64(),
        size_of_stack_commit: cur.u64(),
        size_of_heap_reserve: cur.u64(),
        size_of_heap_commit: cur.u64(),
        loader_flags: cur.u32(),
        number_of_rva_and_sizes: cur.u32(),
    };
    debug_assert_eq!(cur.position(), PE_HEADER_SIZE);

    if header.signature != PE_SIGNATURE {
        return Err(PeError::InvalidPeSignature);
    }
    if header.machine != Machine::X86_64 {
        return Err(PeError::UnsupportedMachine(header.machine));
    }
    if header.section_alignment != section_alignment {
        return Err(PeError::UnexpectedSectionAlignment {
            expected: section_alignment,
            found: header.section_alignment,
        });
    }
    if header.magic != PE32PLUS_MAGIC {
        warn!(
            magic = format_args!("{:#x}", header.magic),
            "Optional header magic is not PE32+"
        );
    }

    debug!(
        sections = header.number_of_sections,
        optional_header_size = header.size_of_optional_header,
        image_base = format_args!("{:#x}", header.image_base),
        entry_rva = format_args!("{:#x}", header.address_of_entry_point),
        "Parsed PE header"
    );

    Ok(header)
}
