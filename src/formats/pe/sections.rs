//! Section table parsing and load-window validation

use crate::config::FlattenConfig;
use crate::error::{FlattenError, Result as FlattenResult};
use crate::formats::pe::types::*;
use crate::formats::pe::utils::{FieldCursor, ReadExt};
use tracing::debug;

/// A section that contributes bytes to the flat image, with its absolute
/// virtual range and the raw file contents backing its start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadableSection<'data> {
    pub name: String,
    pub start: u64,
    pub end: u64,
    pub data: &'data [u8],
}

impl LoadableSection<'_> {
    /// Number of bytes this section spans in the flat image
    pub fn virtual_len(&self) -> u64 {
        self.end - self.start
    }
}

/// Parse section headers from data
pub fn parse_section_headers(data: &[u8], offset: usize, count: u16) -> Result<Vec<SectionHeader>> {
    let mut sections = Vec::with_capacity(count as usize);

    for i in 0..count as usize {
        let section_offset = offset.saturating_add(i * SECTION_HEADER_SIZE);
        let entry = data
            .read_slice_at(section_offset, SECTION_HEADER_SIZE)
            .ok_or(PeError::TruncatedHeader {
                expected: section_offset.saturating_add(SECTION_HEADER_SIZE),
                actual: data.len(),
            })?;

        let mut cur = FieldCursor::new(entry);
        sections.push(SectionHeader {
            name: cur.bytes(),
            virtual_size: cur.u32(),
            virtual_address: cur.u32(),
            size_of_raw_data: cur.u32(),
            pointer_to_raw_data: cur.u32(),
            pointer_to_relocations: cur.u32(),
            pointer_to_line_numbers: cur.u32(),
            number_of_relocations: cur.u16(),
            number_of_line_numbers: cur.u16(),
            characteristics: cur.u32(),
        });
    }

    Ok(sections)
}

/// Compute the absolute range of `header` and check it against `config`.
///
/// Returns `Ok(None)` for a valid section that has no raw data. The window
/// is enforced on every section, including those that end up dropped.
pub fn validate_section<'data>(
    data: &'data [u8],
    header: &SectionHeader,
    image_base: u64,
    config: &FlattenConfig,
) -> FlattenResult<Option<LoadableSection<'data>>> {
    let name = header.name();
    let rounded = header.rounded_virtual_size(config.section_alignment);

    let overflow = || FlattenError::AddressOverflow {
        section: name.clone(),
        rva: header.virtual_address,
        size: rounded,
        image_base,
    };
    let start = image_base
        .checked_add(header.virtual_address as u64)
        .ok_or_else(overflow)?;
    let end = start.checked_add(rounded).ok_or_else(overflow)?;

    if end <= start {
        return Err(FlattenError::EmptySection {
            section: name,
            start,
            end,
        });
    }
    if header.size_of_raw_data as u64 > rounded {
        return Err(FlattenError::RawDataTooLarge {
            section: name,
            raw_size: header.size_of_raw_data,
            virtual_size: rounded,
        });
    }
    if !config.window_contains(start, end) {
        return Err(FlattenError::OutsideWindow {
            section: name,
            start,
            end,
            min: config.min_addr,
            max: config.max_addr,
        });
    }

    if header.size_of_raw_data == 0 {
        debug!(
            section = %name,
            start = format_args!("{:#x}", start),
            end = format_args!("{:#x}", end),
            "Dropping section without raw data"
        );
        return Ok(None);
    }

    let raw = data
        .read_slice_at(
            header.pointer_to_raw_data as usize,
            header.size_of_raw_data as usize,
        )
        .ok_or_else(|| PeError::TruncatedSectionData {
            section: name.clone(),
            offset: header.pointer_to_raw_data,
            size: header.size_of_raw_data,
            file_len: data.len(),
        })?;

    debug!(
        section = %name,
        start = format_args!("{:#x}", start),
        end = format_args!("{:#x}", end),
        raw_size = raw.len(),
        "Keeping section"
    );

    Ok(Some(LoadableSection {
        name,
        start,
        end,
        data: raw,
    }))
}

/// Validate every header and keep the sections that carry raw data, in
/// section table order.
pub fn collect_loadable_sections<'data>(
    data: &'data [u8],
    headers: &[SectionHeader],
    image_base: u64,
    config: &FlattenConfig,
) -> FlattenResult<Vec<LoadableSection<'data>>> {
    let mut loadable = Vec::with_capacity(headers.len());
    for header in headers {
        if let Some(section) = validate_section(data, header, image_base, config)? {
            loadable.push(section);
        }
    }
    Ok(loadable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn create_test_section(name: &str, va: u32, vsize: u32, raw: u32, rsize: u32) -> SectionHeader {
        let mut name_bytes = [0u8; 8];
        let bytes = name.as_bytes();
        let len = bytes.len().min(8);
        name_bytes[..len].copy_from_slice(&bytes[..len]);

        SectionHeader {
            name: name_bytes,
            virtual_address: va,
            virtual_size: vsize,
            pointer_to_raw_data: raw,
            size_of_raw_data: rsize,
            pointer_to_relocations: 0,
            pointer_to_line_numbers: 0,
            number_of_relocations: 0,
            number_of_line_numbers: 0,
            characteristics: IMAGE_SCN_MEM_READ,
        }
    }

    fn file_with(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    #[test]
    fn test_parse_section_headers() {
        let mut data = vec![0u8; 16];
        let mut entry = [0u8; SECTION_HEADER_SIZE];
        entry[..5].copy_from_slice(b".text");
        entry[8..12].copy_from_slice(&0x10u32.to_le_bytes());
        entry[12..16].copy_from_slice(&0x1000u32.to_le_bytes());
        entry[16..20].copy_from_slice(&0x200u32.to_le_bytes());
        entry[20..24].copy_from_slice(&0x400u32.to_le_bytes());
        entry[32..34].copy_from_slice(&2u16.to_le_bytes());
        entry[36..40].copy_from_slice(&(IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE).to_le_bytes());
        data.extend_from_slice(&entry);
        entry[..8].copy_from_slice(b".data\0\0\0");
        data.extend_from_slice(&entry);

        let headers = parse_section_headers(&data, 16, 2).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].name(), ".text");
        assert_eq!(headers[0].virtual_size, 0x10);
        assert_eq!(headers[0].virtual_address, 0x1000);
        assert_eq!(headers[0].size_of_raw_data, 0x200);
        assert_eq!(headers[0].pointer_to_raw_data, 0x400);
        assert_eq!(headers[0].number_of_relocations, 2);
        assert!(headers[0].is_executable());
        assert!(!headers[0].is_writable());
        assert_eq!(headers[1].name(), ".data");
    }

    #[test]
    fn test_parse_section_headers_truncated() {
        let data = vec![0u8; SECTION_HEADER_SIZE + 10];
        assert!(matches!(
            parse_section_headers(&data, 0, 2),
            Err(PeError::TruncatedHeader { expected: 80, actual: 50 })
        ));
        assert!(parse_section_headers(&data, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_validate_keeps_section() {
        let data = file_with(0x400);
        let config = FlattenConfig::default();
        let header = create_test_section(".text", 0x1000, 0x10, 0x200, 0x10);

        let section = validate_section(&data, &header, 0x10000, &config)
            .unwrap()
            .unwrap();
        assert_eq!(section.start, 0x11000);
        assert_eq!(section.end, 0x12000);
        assert_eq!(section.virtual_len(), 0x1000);
        assert_eq!(section.data, &data[0x200..0x210]);
    }

    #[test]
    fn test_validate_drops_bss() {
        let data = file_with(0x400);
        let config = FlattenConfig::default();
        let header = create_test_section(".bss", 0x2000, 0x800, 0, 0);
        assert!(validate_section(&data, &header, 0x10000, &config)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_validate_empty_section() {
        let data = file_with(0x400);
        let config = FlattenConfig::default();
        let header = create_test_section(".empty", 0x1000, 0, 0, 0);
        let err = validate_section(&data, &header, 0x10000, &config).unwrap_err();
        assert!(matches!(err, FlattenError::EmptySection { .. }));
        assert_eq!(err.kind(), ErrorKind::Range);
    }

    #[test]
    fn test_validate_raw_data_too_large() {
        let data = file_with(0x3000);
        let config = FlattenConfig::default();
        let header = create_test_section(".text", 0x1000, 0x10, 0x200, 0x1001);
        let err = validate_section(&data, &header, 0x10000, &config).unwrap_err();
        assert!(matches!(
            err,
            FlattenError::RawDataTooLarge {
                raw_size: 0x1001,
                virtual_size: 0x1000,
                ..
            }
        ));
    }

    #[test]
    fn test_validate_window_bounds() {
        let data = file_with(0x400);
        let config = FlattenConfig::default();

        // Starts below the window
        let header = create_test_section(".low", 0x0, 0x1000, 0x200, 0x10);
        let err = validate_section(&data, &header, 0xb000, &config).unwrap_err();
        assert!(matches!(err, FlattenError::OutsideWindow { .. }));

        // Ends exactly at the top of the window
        let header = create_test_section(".top", 0x1a000, 0xc00, 0x200, 0x10);
        let wide = FlattenConfig {
            max_addr: 0x2c000,
            ..FlattenConfig::default()
        };
        assert!(validate_section(&data, &header, 0x11000, &wide)
            .unwrap()
            .is_some());

        // Rounded end crosses the top of the window
        let header = create_test_section(".high", 0x1a000, 0x10, 0x200, 0x10);
        let err = validate_section(&data, &header, 0x11000, &config).unwrap_err();
        assert!(matches!(
            err,
            FlattenError::OutsideWindow {
                start: 0x2b000,
                end: 0x2c000,
                ..
            }
        ));
    }

    #[test]
    fn test_validate_checks_window_for_dropped_sections() {
        let data = file_with(0x400);
        let config = FlattenConfig::default();
        let header = create_test_section(".bss", 0x40000, 0x1000, 0, 0);
        let err = validate_section(&data, &header, 0x10000, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
    }

    #[test]
    fn test_validate_address_overflow() {
        let data = file_with(0x400);
        let config = FlattenConfig {
            max_addr: u64::MAX,
            ..FlattenConfig::default()
        };
        let header = create_test_section(".text", 0x1000, 0x10, 0x200, 0x10);
        let err = validate_section(&data, &header, u64::MAX - 0x800, &config).unwrap_err();
        assert!(matches!(err, FlattenError::AddressOverflow { .. }));
    }

    #[test]
    fn test_validate_truncated_raw_data() {
        let data = file_with(0x300);
        let config = FlattenConfig::default();
        let header = create_test_section(".text", 0x1000, 0x200, 0x200, 0x200);
        let err = validate_section(&data, &header, 0x10000, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(matches!(
            err,
            FlattenError::Format(PeError::TruncatedSectionData { .. })
        ));
    }

    #[test]
    fn test_collect_preserves_table_order() {
        let data = file_with(0x800);
        let config = FlattenConfig::default();
        let headers = vec![
            create_test_section(".data", 0x3000, 0x100, 0x400, 0x100),
            create_test_section(".bss", 0x4000, 0x100, 0, 0),
            create_test_section(".text", 0x1000, 0x100, 0x200, 0x100),
        ];

        let loadable = collect_loadable_sections(&data, &headers, 0x10000, &config).unwrap();
        let names: Vec<_> = loadable.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![".data", ".text"]);
    }
}
