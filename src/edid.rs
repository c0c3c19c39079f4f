//! Display identification (EDID) parsing.
//!
//! Platform independent: enumerators hand raw descriptor bytes to
//! [`DisplayIdentity::parse`] together with an opaque OS handle.

use crate::types::Rect;

/// Base block length. Anything shorter is not an identification record.
pub const EDID_BLOCK_LEN: usize = 128;

const HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

// Byte offsets within the base block
const MANUFACTURER: usize = 8;
const PRODUCT_CODE: usize = 10;
const SERIAL_NUMBER: usize = 12;
const WEEK: usize = 16;
const YEAR: usize = 17;
const DESCRIPTORS: usize = 54;
const DESCRIPTOR_LEN: usize = 18;
const DESCRIPTORS_END: usize = 126;

const TAG_MONITOR_NAME: u8 = 0xFC;
const NAME_MAX_LEN: usize = 13;

/// One display identification record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayIdentity {
    /// OS identifier the record was read from (device instance id, output name).
    pub source_handle: String,
    /// Monitor name descriptor, empty if absent.
    pub friendly_name: String,
    /// Packed PNP manufacturer id, big-endian as stored.
    pub manufacturer_id: u16,
    pub product_code: u16,
    pub serial_number: u32,
    pub manufacture_week: u8,
    pub manufacture_year: u16,
    /// Active pixels of the first detailed timing, 0 when absent.
    pub preferred_width: u32,
    pub preferred_height: u32,
    /// Desktop placement, set once geometry resolution succeeds.
    pub desktop: Option<Rect>,
}

impl DisplayIdentity {
    /// Parse a base block. Returns `None` if `bytes` is shorter than 128.
    pub fn parse(source_handle: impl Into<String>, bytes: &[u8]) -> Option<Self> {
        if bytes.len() < EDID_BLOCK_LEN {
            return None;
        }
        let source_handle = source_handle.into();
        if bytes[..HEADER.len()] != HEADER {
            log::debug!("EDID from '{}' has a non-standard header", source_handle);
        }

        let (preferred_width, preferred_height) = preferred_timing(bytes).unwrap_or((0, 0));
        Some(Self {
            source_handle,
            friendly_name: monitor_name(bytes).unwrap_or_default(),
            manufacturer_id: u16::from_be_bytes([bytes[MANUFACTURER], bytes[MANUFACTURER + 1]]),
            product_code: u16::from_le_bytes([bytes[PRODUCT_CODE], bytes[PRODUCT_CODE + 1]]),
            serial_number: u32::from_le_bytes([
                bytes[SERIAL_NUMBER],
                bytes[SERIAL_NUMBER + 1],
                bytes[SERIAL_NUMBER + 2],
                bytes[SERIAL_NUMBER + 3],
            ]),
            manufacture_week: bytes[WEEK],
            manufacture_year: 1990 + bytes[YEAR] as u16,
            preferred_width,
            preferred_height,
            desktop: None,
        })
    }

    /// Three-letter PNP code, e.g. `"TCL"`. Out-of-range letters read as `?`.
    pub fn manufacturer_code(&self) -> String {
        let id = self.manufacturer_id;
        [(id >> 10) & 0x1F, (id >> 5) & 0x1F, id & 0x1F]
            .iter()
            .map(|&c| match c {
                1..=26 => (b'A' + c as u8 - 1) as char,
                _ => '?',
            })
            .collect()
    }

    pub fn has_preferred_mode(&self) -> bool {
        self.preferred_width != 0 && self.preferred_height != 0
    }

    pub fn matches(&self, product_code: u16, serial_number: Option<u32>) -> bool {
        self.product_code == product_code
            && serial_number.map_or(true, |serial| self.serial_number == serial)
    }
}

/// Horizontal and vertical active pixels of the first detailed timing.
fn preferred_timing(bytes: &[u8]) -> Option<(u32, u32)> {
    let dt = &bytes[DESCRIPTORS..DESCRIPTORS + DESCRIPTOR_LEN];
    // A zero pixel clock marks a display descriptor, not a timing.
    if dt[0] == 0 && dt[1] == 0 {
        return None;
    }
    let h = dt[2] as u32 | ((dt[4] as u32 & 0xF0) << 4);
    let v = dt[5] as u32 | ((dt[7] as u32 & 0xF0) << 4);
    Some((h, v))
}

fn monitor_name(bytes: &[u8]) -> Option<String> {
    let mut offset = DESCRIPTORS;
    while offset + DESCRIPTOR_LEN <= DESCRIPTORS_END {
        let block = &bytes[offset..offset + DESCRIPTOR_LEN];
        offset += DESCRIPTOR_LEN;
        if block[..4] != [0x00, 0x00, 0x00, TAG_MONITOR_NAME] {
            continue;
        }
        let text: String = block[5..]
            .iter()
            .take(NAME_MAX_LEN)
            .take_while(|&&b| b != 0 && b != b'\n' && b != b'\r')
            .map(|&b| b as char)
            .collect();
        return Some(text.trim_end_matches(' ').to_string());
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Base block for a 3840x1080 side-by-side panel named "RayNeo Air".
    pub(crate) fn sample_edid(product: u16, serial: u32) -> Vec<u8> {
        let mut e = vec![0u8; EDID_BLOCK_LEN];
        e[..8].copy_from_slice(&HEADER);
        // "TCL": T=20 C=3 L=12 -> 0b0_10100_00011_01100
        e[8] = 0x50;
        e[9] = 0x6C;
        e[10..12].copy_from_slice(&product.to_le_bytes());
        e[12..16].copy_from_slice(&serial.to_le_bytes());
        e[16] = 12;
        e[17] = 34;

        // Detailed timing: pixel clock non-zero, 3840 x 1080
        let dt = &mut e[54..72];
        dt[0] = 0x01;
        dt[1] = 0x1D;
        dt[2] = (3840 & 0xFF) as u8;
        dt[4] = ((3840 >> 8) << 4) as u8;
        dt[5] = (1080 & 0xFF) as u8;
        dt[7] = ((1080 >> 8) << 4) as u8;

        // Monitor name descriptor in the second slot
        let name = &mut e[72..90];
        name[3] = TAG_MONITOR_NAME;
        let text = b"RayNeo Air\n  ";
        name[5..5 + text.len()].copy_from_slice(text);
        e
    }

    #[test]
    fn test_parse_fields() {
        let id = DisplayIdentity::parse("DISPLAY\\TCL03D4\\7&1", &sample_edid(980, 17)).unwrap();
        assert_eq!(id.product_code, 980);
        assert_eq!(id.serial_number, 17);
        assert_eq!(id.manufacturer_code(), "TCL");
        assert_eq!(id.manufacture_week, 12);
        assert_eq!(id.manufacture_year, 2024);
        assert_eq!((id.preferred_width, id.preferred_height), (3840, 1080));
        assert_eq!(id.friendly_name, "RayNeo Air");
        assert!(id.desktop.is_none());
        assert!(id.matches(980, Some(17)));
        assert!(id.matches(980, None));
        assert!(!id.matches(980, Some(18)));
        assert!(!id.matches(981, None));
    }

    #[test]
    fn test_short_block_is_rejected() {
        assert!(DisplayIdentity::parse("x", &[0u8; 127]).is_none());
    }

    #[test]
    fn test_descriptor_in_first_slot_means_no_preferred_mode() {
        let mut e = sample_edid(1, 1);
        e[54..72].fill(0);
        e[57] = TAG_MONITOR_NAME;
        e[59..64].copy_from_slice(b"First");
        let id = DisplayIdentity::parse("x", &e).unwrap();
        assert!(!id.has_preferred_mode());
        assert_eq!(id.friendly_name, "First");
    }

    #[test]
    fn test_name_is_capped_and_trimmed() {
        let mut e = sample_edid(1, 1);
        e[77..90].copy_from_slice(b"ABCDEFGHIJKLM");
        let id = DisplayIdentity::parse("x", &e).unwrap();
        assert_eq!(id.friendly_name, "ABCDEFGHIJKLM");

        e[77..90].copy_from_slice(b"Short        ");
        let id = DisplayIdentity::parse("x", &e).unwrap();
        assert_eq!(id.friendly_name, "Short");

        e[77..90].copy_from_slice(b"Nul\0\0\0\0\0\0\0\0\0\0");
        let id = DisplayIdentity::parse("x", &e).unwrap();
        assert_eq!(id.friendly_name, "Nul");
    }
}
