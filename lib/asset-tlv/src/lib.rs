// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vendor asset-EEPROM decoding.
//!
//! PSU and fan-tray asset EEPROMs carry a flat `[tag][len][payload]`
//! stream starting at offset zero, much simpler than the IPMI FRU
//! format: no areas, no offsets, and no checksum enforcement (a checksum
//! tag exists in the stream; it is captured into the record but never
//! validated). An unrecognized tag is the natural end of data, not an
//! error.

#![cfg_attr(not(test), no_std)]

/// Length of the raw asset image pulled from the EEPROM.
pub const ASSET_IMAGE_LEN: usize = 128;

/// String field capacity, NUL included. Overlong payloads truncate.
pub const ASSET_STR_MAX: usize = 32;

mod tag {
    pub const PART_NUMBER: u8 = 0x01;
    pub const SERIAL_NUMBER: u8 = 0x02;
    pub const MFG_DATE: u8 = 0x03;
    pub const CLEI: u8 = 0x04;
    pub const HW_DIRECTIVES: u8 = 0x05;
    pub const HW_TYPE: u8 = 0x06;
    pub const CHECKSUM: u8 = 0x07;
}

/// Decoded asset record. String fields are NUL-terminated within their
/// fixed arrays; scalars default to zero when their tag never appears.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub part_number: [u8; ASSET_STR_MAX],
    pub serial_number: [u8; ASSET_STR_MAX],
    pub mfg_date: [u8; ASSET_STR_MAX],
    pub clei: [u8; ASSET_STR_MAX],
    /// Hardware directives word, byte-order-reversed off the wire.
    pub hw_directives: u32,
    pub hw_type: u8,
    /// Captured from the stream; never validated.
    pub checksum: u16,
    /// How many recognized records the walk consumed, for diagnostics.
    pub fields_decoded: u8,
}

fn copy_str(dest: &mut [u8; ASSET_STR_MAX], payload: &[u8]) {
    let n = payload.len().min(ASSET_STR_MAX - 1);
    dest[..n].copy_from_slice(&payload[..n]);
    // Leave the tail zeroed; the field reads as a C string of length n.
    dest[n..].fill(0);
}

/// Returns the field as a byte slice, cut at the first NUL.
pub fn str_bytes(field: &[u8; ASSET_STR_MAX]) -> &[u8] {
    let n = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..n]
}

impl AssetInfo {
    /// Walks the record stream in `raw`.
    ///
    /// The walk ends at the first unrecognized tag, at a record whose
    /// declared payload runs past the buffer, or at the buffer end.
    /// Decoding never fails; missing fields stay at their defaults.
    pub fn decode(raw: &[u8]) -> Self {
        let mut out = AssetInfo::default();
        let mut cursor = 0;

        loop {
            let Some(&t) = raw.get(cursor) else { break };
            let Some(&len) = raw.get(cursor + 1) else { break };
            let len = len as usize;
            let Some(payload) = raw.get(cursor + 2..cursor + 2 + len) else {
                break;
            };

            match t {
                tag::PART_NUMBER => copy_str(&mut out.part_number, payload),
                tag::SERIAL_NUMBER => {
                    copy_str(&mut out.serial_number, payload)
                }
                tag::MFG_DATE => copy_str(&mut out.mfg_date, payload),
                tag::CLEI => copy_str(&mut out.clei, payload),
                tag::HW_DIRECTIVES => {
                    // Stored most-significant-byte last; reverse into a
                    // host-order word. Short payloads fill from the top.
                    let mut word = 0u32;
                    for &b in payload.iter().take(4) {
                        word = (word >> 8) | ((b as u32) << 24);
                    }
                    out.hw_directives = word;
                }
                tag::HW_TYPE => {
                    if let Some(&b) = payload.first() {
                        out.hw_type = b;
                    }
                }
                tag::CHECKSUM => {
                    let lo = payload.first().copied().unwrap_or(0);
                    let hi = payload.get(1).copied().unwrap_or(0);
                    out.checksum = u16::from_le_bytes([lo, hi]);
                }
                _ => break,
            }

            out.fields_decoded += 1;
            cursor += 2 + len;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut v = vec![tag, payload.len() as u8];
        v.extend_from_slice(payload);
        v
    }

    fn sample() -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&rec(tag::PART_NUMBER, b"3HE12345AB"));
        raw.extend_from_slice(&rec(tag::SERIAL_NUMBER, b"NS1812F0042"));
        raw.extend_from_slice(&rec(tag::MFG_DATE, b"2018-03-21"));
        raw.extend_from_slice(&rec(tag::CLEI, b"IPUPAJZBAA"));
        raw.extend_from_slice(&rec(
            tag::HW_DIRECTIVES,
            &[0x78, 0x56, 0x34, 0x12],
        ));
        raw.extend_from_slice(&rec(tag::HW_TYPE, &[0x42]));
        raw.extend_from_slice(&rec(tag::CHECKSUM, &[0xaa, 0x55]));
        raw
    }

    #[test]
    fn decodes_all_fields() {
        let info = AssetInfo::decode(&sample());
        assert_eq!(str_bytes(&info.part_number), b"3HE12345AB");
        assert_eq!(str_bytes(&info.serial_number), b"NS1812F0042");
        assert_eq!(str_bytes(&info.mfg_date), b"2018-03-21");
        assert_eq!(str_bytes(&info.clei), b"IPUPAJZBAA");
        assert_eq!(info.hw_directives, 0x12345678);
        assert_eq!(info.hw_type, 0x42);
        assert_eq!(info.checksum, 0x55aa);
        assert_eq!(info.fields_decoded, 7);
    }

    #[test]
    fn unknown_tag_ends_walk() {
        let mut raw = rec(tag::PART_NUMBER, b"PN1");
        raw.extend_from_slice(&rec(0xee, &[1, 2, 3]));
        raw.extend_from_slice(&rec(tag::SERIAL_NUMBER, b"SN1"));

        let info = AssetInfo::decode(&raw);
        assert_eq!(str_bytes(&info.part_number), b"PN1");
        // The serial record sits past the unknown tag and is never seen.
        assert_eq!(str_bytes(&info.serial_number), b"");
        assert_eq!(info.fields_decoded, 1);
    }

    #[test]
    fn padded_image_ends_walk() {
        // Real images are 0x00- or 0xff-padded past the last record;
        // either padding byte reads as an unrecognized tag.
        let mut raw = rec(tag::HW_TYPE, &[7]);
        raw.resize(ASSET_IMAGE_LEN, 0xff);
        let info = AssetInfo::decode(&raw);
        assert_eq!(info.hw_type, 7);
        assert_eq!(info.fields_decoded, 1);
    }

    #[test]
    fn truncated_record_ends_walk() {
        // Declared length runs past the buffer.
        let raw = [tag::PART_NUMBER, 10, b'A', b'B'];
        let info = AssetInfo::decode(&raw);
        assert_eq!(str_bytes(&info.part_number), b"");
        assert_eq!(info.fields_decoded, 0);
    }

    #[test]
    fn empty_buffer_is_default() {
        assert_eq!(AssetInfo::decode(&[]), AssetInfo::default());
    }

    #[test]
    fn overlong_string_truncates() {
        let long = [b'x'; 60];
        let raw = rec(tag::CLEI, &long);
        let info = AssetInfo::decode(&raw);
        assert_eq!(str_bytes(&info.clei).len(), ASSET_STR_MAX - 1);
    }

    #[test]
    fn short_directives_payload() {
        // Two bytes land in the top half of the word.
        let raw = rec(tag::HW_DIRECTIVES, &[0xcd, 0xab]);
        let info = AssetInfo::decode(&raw);
        assert_eq!(info.hw_directives, 0xabcd_0000);
    }
}
