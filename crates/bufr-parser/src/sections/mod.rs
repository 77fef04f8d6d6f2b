//! BUFR section parsing.
//!
//! A message is laid out as:
//! - Section 0: indicator ("BUFR", total length, edition)
//! - Section 1: identification (originating centre, data category, reference time)
//! - Section 2: optional local data, skipped
//! - Section 3: data description (subset count, flags, descriptor list)
//! - Section 4: data (the bit stream)
//! - Section 5: end marker ("7777")

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{BufrError, BufrResult};
use crate::tables::Fxy;

/// Data category used by NCEP for embedded table messages.
pub const TABLE_DATA_CATEGORY: u8 = 11;

/// Section 0: Indicator Section (8 bytes)
#[derive(Debug, Clone, Copy)]
pub struct Indicator {
    pub message_length: usize,
    pub edition: u8,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub master_table: u8,
    pub center: u16,
    pub sub_center: u16,
    pub update_sequence: u8,
    pub has_optional_section: bool,
    pub data_category: u8,
    pub data_subcategory: u8,
    pub master_table_version: u8,
    pub local_table_version: u8,
    pub reference_time: Option<DateTime<Utc>>,
}

/// Section 3: Data Description Section
#[derive(Debug, Clone)]
pub struct DataDescription {
    pub subset_count: usize,
    pub observed: bool,
    pub compressed: bool,
    pub descriptors: Vec<Fxy>,
}

/// One complete BUFR message with its sections located.
#[derive(Debug, Clone)]
pub struct Message {
    pub indicator: Indicator,
    pub identification: Identification,
    pub description: DataDescription,
    /// Section 4 payload, after the 4-octet header.
    pub data: Bytes,
}

impl Message {
    /// Parse a buffer holding exactly one message.
    pub fn parse(data: Bytes) -> BufrResult<Self> {
        let indicator = parse_indicator(&data)?;
        if data.len() < indicator.message_length {
            return Err(BufrError::section(
                0,
                format!(
                    "message declares {} bytes but only {} are available",
                    indicator.message_length,
                    data.len()
                ),
            ));
        }

        let mut offset = 8;
        let identification = parse_identification(&data, offset, indicator.edition)?;
        offset += section_length(&data, offset, 1)?;

        if identification.has_optional_section {
            offset += section_length(&data, offset, 2)?;
        }

        let description = parse_data_description(&data, offset)?;
        offset += section_length(&data, offset, 3)?;

        let data_length = section_length(&data, offset, 4)?;
        if data_length < 4 {
            return Err(BufrError::section(4, "section shorter than its header"));
        }
        let payload = data.slice(offset + 4..offset + data_length);
        offset += data_length;

        parse_end(&data, offset)?;

        Ok(Self {
            indicator,
            identification,
            description,
            data: payload,
        })
    }

    pub fn edition(&self) -> u8 {
        self.indicator.edition
    }

    pub fn subset_count(&self) -> usize {
        self.description.subset_count
    }

    pub fn is_compressed(&self) -> bool {
        self.description.compressed
    }

    /// NCEP files interleave table messages with data messages.
    pub fn is_table_message(&self) -> bool {
        self.identification.data_category == TABLE_DATA_CATEGORY
    }
}

// ===== Parsing Functions =====

fn read_u24(data: &[u8], offset: usize) -> usize {
    ((data[offset] as usize) << 16) | ((data[offset + 1] as usize) << 8) | data[offset + 2] as usize
}

fn require(data: &[u8], offset: usize, len: usize, section: u8) -> BufrResult<()> {
    if offset + len > data.len() {
        return Err(BufrError::section(section, "Not enough data"));
    }
    Ok(())
}

/// Length of the section starting at `offset`, checked against the buffer.
fn section_length(data: &[u8], offset: usize, section: u8) -> BufrResult<usize> {
    require(data, offset, 3, section)?;
    let len = read_u24(data, offset);
    if len < 3 {
        return Err(BufrError::section(section, format!("invalid length {}", len)));
    }
    require(data, offset, len, section)?;
    Ok(len)
}

/// Parse Section 0 (Indicator) from the start of a message
pub fn parse_indicator(data: &[u8]) -> BufrResult<Indicator> {
    if data.len() < 8 {
        return Err(BufrError::section(0, "Not enough data for indicator section"));
    }
    if &data[0..4] != b"BUFR" {
        return Err(BufrError::section(0, "Invalid BUFR magic bytes"));
    }

    let message_length = read_u24(data, 4);
    let edition = data[7];
    if !(2..=4).contains(&edition) {
        return Err(BufrError::UnsupportedEdition(edition));
    }

    Ok(Indicator {
        message_length,
        edition,
    })
}

/// Parse Section 1 (Identification), whose layout depends on the edition
pub fn parse_identification(data: &[u8], offset: usize, edition: u8) -> BufrResult<Identification> {
    let len = section_length(data, offset, 1)?;
    let s = &data[offset..offset + len];

    if edition >= 4 {
        if len < 22 {
            return Err(BufrError::section(1, format!("edition 4 section is {} bytes", len)));
        }
        let year = u16::from_be_bytes([s[15], s[16]]) as i32;
        Ok(Identification {
            master_table: s[3],
            center: u16::from_be_bytes([s[4], s[5]]),
            sub_center: u16::from_be_bytes([s[6], s[7]]),
            update_sequence: s[8],
            has_optional_section: s[9] & 0x80 != 0,
            data_category: s[10],
            data_subcategory: s[12],
            master_table_version: s[13],
            local_table_version: s[14],
            reference_time: reference_time(year, s[17], s[18], s[19], s[20], s[21]),
        })
    } else {
        if len < 17 {
            return Err(BufrError::section(1, format!("edition 3 section is {} bytes", len)));
        }
        let year_of_century = s[12] as i32;
        let year = if year_of_century > 50 {
            1900 + year_of_century
        } else {
            2000 + year_of_century
        };
        Ok(Identification {
            master_table: s[3],
            center: s[5] as u16,
            sub_center: s[4] as u16,
            update_sequence: s[6],
            has_optional_section: s[7] & 0x80 != 0,
            data_category: s[8],
            data_subcategory: s[9],
            master_table_version: s[10],
            local_table_version: s[11],
            reference_time: reference_time(year, s[13], s[14], s[15], s[16], 0),
        })
    }
}

fn reference_time(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
        .map(|dt| dt.and_utc())
}

/// Parse Section 3 (Data Description)
pub fn parse_data_description(data: &[u8], offset: usize) -> BufrResult<DataDescription> {
    let len = section_length(data, offset, 3)?;
    if len < 7 {
        return Err(BufrError::section(3, format!("section is {} bytes", len)));
    }
    let s = &data[offset..offset + len];

    let subset_count = u16::from_be_bytes([s[4], s[5]]) as usize;
    let flags = s[6];
    // Odd-length sections carry one padding octet.
    let descriptors = s[7..]
        .chunks_exact(2)
        .map(|pair| Fxy::from_u16(u16::from_be_bytes([pair[0], pair[1]])))
        .collect::<Vec<_>>();

    if descriptors.is_empty() {
        return Err(BufrError::section(3, "no descriptors"));
    }

    Ok(DataDescription {
        subset_count,
        observed: flags & 0x80 != 0,
        compressed: flags & 0x40 != 0,
        descriptors,
    })
}

/// Check Section 5 (End) at `offset`
pub fn parse_end(data: &[u8], offset: usize) -> BufrResult<()> {
    require(data, offset, 4, 5)?;
    if &data[offset..offset + 4] != b"7777" {
        return Err(BufrError::section(5, "missing 7777 end marker"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_indicator() {
        let data = [b'B', b'U', b'F', b'R', 0x00, 0x01, 0x00, 0x04];
        let indicator = parse_indicator(&data).unwrap();
        assert_eq!(indicator.message_length, 256);
        assert_eq!(indicator.edition, 4);
    }

    #[test]
    fn test_invalid_magic() {
        let data = [b'G', b'R', b'I', b'B', 0x00, 0x01, 0x00, 0x04];
        assert!(matches!(
            parse_indicator(&data),
            Err(BufrError::InvalidSection { section: 0, .. })
        ));
    }

    #[test]
    fn test_unsupported_edition() {
        let data = [b'B', b'U', b'F', b'R', 0x00, 0x01, 0x00, 0x05];
        assert!(matches!(
            parse_indicator(&data),
            Err(BufrError::UnsupportedEdition(5))
        ));
    }

    #[test]
    fn test_data_description_padding() {
        // length 10: header (7) + one descriptor (2) + one pad octet
        let data = [0, 0, 10, 0, 0, 3, 0xC0, 0xFD, 0x01, 0x00];
        let desc = parse_data_description(&data, 0).unwrap();
        assert_eq!(desc.subset_count, 3);
        assert!(desc.observed);
        assert!(desc.compressed);
        assert_eq!(desc.descriptors, vec![Fxy::new(3, 61, 1)]);
    }

    #[test]
    fn test_edition3_identification() {
        let mut s = vec![0u8; 18];
        s[2] = 18;
        s[5] = 7; // centre
        s[8] = 21; // data category
        s[12] = 20; // year of century
        s[13] = 10;
        s[14] = 26;
        s[15] = 21;
        let id = parse_identification(&s, 0, 3).unwrap();
        assert_eq!(id.center, 7);
        assert_eq!(id.data_category, 21);
        assert_eq!(
            id.reference_time.unwrap().to_rfc3339(),
            "2020-10-26T21:00:00+00:00"
        );
    }
}
