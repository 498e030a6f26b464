// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IPMI FRU identity decoding.
//!
//! A FRU ID EEPROM begins with a fixed 8-byte common header whose offsets
//! locate the info areas; the product info area is a sequence of TLV
//! fields, each with a one-byte `[type:2][length:6]` header, ending at a
//! 0xC1 marker. Four payload encodings exist: raw binary (rendered as
//! hex), BCD-plus, six-bit packed ASCII, and eight-bit ASCII.
//!
//! Decoding is deliberately permissive: a checksum mismatch is reported
//! but does not stop the walk, short buffers truncate rather than fault,
//! and a zero-length field is an absent field, not an error. Deployed
//! hardware is frequently slightly malformed, and partial identity
//! beats none.

#![cfg_attr(not(test), no_std)]

use zerocopy::FromBytes;
use zerocopy_derive::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
};

/// Maximum decoded length of a single field, in bytes. Longer output is
/// silently truncated; this cap is part of the decode contract.
pub const FIELD_MAX: usize = 255;

/// Length of the raw FRU image our ID EEPROMs carry.
pub const FRU_IMAGE_LEN: usize = 176;

/// The nibble-to-character table for BCD-plus fields.
const BCD_PLUS: &[u8; 16] = b"0123456789 -.:,_";

/// End-of-area sentinel: a field header of 0xC1 terminates the walk.
const END_MARKER: u8 = 0xc1;

/// The fixed 8-byte FRU common header. Area offsets are in units of 8
/// bytes; an offset of zero means the area is not present.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    Unaligned,
    Immutable,
    KnownLayout,
)]
#[repr(C, packed)]
pub struct FruHeader {
    pub format_version: u8,
    pub internal_offset: u8,
    pub chassis_offset: u8,
    pub board_offset: u8,
    pub product_offset: u8,
    pub multirecord_offset: u8,
    pub pad: u8,
    pub checksum: u8,
}

/// Computes the checksum byte for `bytes`: the two's complement of their
/// sum, so that appending it makes the whole area sum to zero.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)).wrapping_neg()
}

/// True if `bytes` (checksum byte included) sum to zero modulo 256.
pub fn checksum_ok(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)) == 0
}

/// A decoded field: a fixed-capacity byte string.
#[derive(Copy, Clone)]
pub struct FruField {
    buf: [u8; FIELD_MAX],
    len: usize,
}

impl FruField {
    pub const fn empty() -> Self {
        Self { buf: [0; FIELD_MAX], len: 0 }
    }

    /// Appends a byte, silently dropping it if the field is full.
    fn push(&mut self, byte: u8) {
        if self.len < FIELD_MAX {
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for FruField {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for FruField {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for FruField {}

impl PartialEq<[u8]> for FruField {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for FruField {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl core::fmt::Debug for FruField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "FruField({s:?})"),
            None => write!(f, "FruField({:x?})", self.as_bytes()),
        }
    }
}

/// The four FRU field payload encodings, from the top two header bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FieldType {
    Binary,
    BcdPlus,
    SixBitAscii,
    EightBitAscii,
}

impl FieldType {
    fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0b00 => FieldType::Binary,
            0b01 => FieldType::BcdPlus,
            0b10 => FieldType::SixBitAscii,
            _ => FieldType::EightBitAscii,
        }
    }
}

/// Outcome of decoding one TLV field.
#[derive(Debug, PartialEq, Eq)]
pub enum FieldResult {
    /// A field with payload.
    Field(FruField),
    /// Stored length of zero: the field slot exists but holds nothing.
    Absent,
    /// The 0xC1 end-of-area marker.
    EndOfArea,
    /// The cursor is at or past the end of the supplied buffer.
    EndOfBuffer,
}

impl FruField {
    /// Decodes the field at `*cursor` in `area`, advancing the cursor
    /// past it.
    ///
    /// The cursor never reads beyond `area`; a payload that the declared
    /// length claims but the buffer does not hold is truncated to what is
    /// present. Six-bit ASCII output includes the trailing pad characters
    /// produced by group rounding; trimming them is the consumer's call.
    pub fn decode(area: &[u8], cursor: &mut usize) -> FieldResult {
        let Some(&header) = area.get(*cursor) else {
            return FieldResult::EndOfBuffer;
        };
        if header == END_MARKER {
            *cursor += 1;
            return FieldResult::EndOfArea;
        }

        let ftype = FieldType::from_code(header >> 6);
        let len = (header & 0x3f) as usize;
        *cursor += 1;

        if len == 0 {
            return FieldResult::Absent;
        }

        let avail = area.len().saturating_sub(*cursor).min(len);
        let payload = &area[*cursor..*cursor + avail];
        *cursor += len;

        let mut out = FruField::empty();
        match ftype {
            FieldType::Binary => {
                const HEX: &[u8; 16] = b"0123456789abcdef";
                for &b in payload {
                    out.push(HEX[(b >> 4) as usize]);
                    out.push(HEX[(b & 0xf) as usize]);
                }
            }
            FieldType::BcdPlus => {
                for &b in payload {
                    out.push(BCD_PLUS[(b >> 4) as usize]);
                    out.push(BCD_PLUS[(b & 0xf) as usize]);
                }
            }
            FieldType::SixBitAscii => {
                // Three packed bytes unpack to four six-bit symbols, each
                // biased by 0x20. A partial final group reads as if
                // zero-padded, so output length is always a multiple of 4.
                for group in payload.chunks(3) {
                    let b0 = group[0];
                    let b1 = group.get(1).copied().unwrap_or(0);
                    let b2 = group.get(2).copied().unwrap_or(0);
                    out.push(0x20 + (b0 & 0x3f));
                    out.push(0x20 + (((b1 & 0x0f) << 2) | (b0 >> 6)));
                    out.push(0x20 + (((b2 & 0x03) << 4) | (b1 >> 4)));
                    out.push(0x20 + (b2 >> 2));
                }
            }
            FieldType::EightBitAscii => {
                for &b in payload {
                    out.push(b);
                }
            }
        }

        FieldResult::Field(out)
    }
}

/// How aggressively to decode: `Quiet` skips checksum validation and
/// retains only the identity fields; `Verbose` validates checksums and
/// retains everything, for diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodePolicy {
    Quiet,
    Verbose,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FruError {
    /// The image cannot hold the 8-byte common header.
    ImageTooShort,
    /// The header declares no product info area.
    NoProductArea,
    /// The product area offset points outside the image.
    AreaOutOfRange,
    /// The declared product area is too short to walk.
    AreaTooShort,
}

/// A fully decoded product info area.
///
/// Fields are walked in their fixed order regardless of policy (each one
/// must be consumed to find the next), but only the part number, product
/// version, and serial number are retained in `Quiet` mode.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub format_version: u8,
    pub language: u8,
    pub manufacturer: Option<FruField>,
    pub product_name: Option<FruField>,
    pub part_number: Option<FruField>,
    pub product_version: Option<FruField>,
    pub serial_number: Option<FruField>,
    pub asset_tag: Option<FruField>,
    pub fru_file_id: Option<FruField>,
    pub extra: [Option<FruField>; 3],
    /// False only when a `Verbose` decode found a checksum mismatch.
    pub checksum_ok: bool,
}

impl ProductInfo {
    pub fn decode(
        image: &[u8],
        area_offset: usize,
        policy: DecodePolicy,
    ) -> Result<Self, FruError> {
        if area_offset >= image.len() {
            return Err(FruError::AreaOutOfRange);
        }

        let rest = &image[area_offset..];
        if rest.len() < 3 {
            return Err(FruError::AreaTooShort);
        }

        let format_version = rest[0];
        // Area length is stored in units of 8 bytes; cap at what the
        // image actually holds.
        let declared = rest[1] as usize * 8;
        if declared < 3 {
            return Err(FruError::AreaTooShort);
        }
        let area = &rest[..declared.min(rest.len())];

        let checksum_ok = match policy {
            DecodePolicy::Verbose => checksum_ok(area),
            DecodePolicy::Quiet => true,
        };

        let language = area[2];

        // Walk the fixed field order: manufacturer, product name, part
        // number, product version, serial number, asset tag, FRU file
        // ID, then up to three extra fields.
        let mut slots: [Option<FruField>; 10] = Default::default();
        let mut cursor = 3;
        for slot in slots.iter_mut() {
            match FruField::decode(area, &mut cursor) {
                FieldResult::Field(f) => *slot = Some(f),
                FieldResult::Absent => {}
                FieldResult::EndOfArea | FieldResult::EndOfBuffer => break,
            }
        }

        let verbose = policy == DecodePolicy::Verbose;
        let keep = |f: Option<FruField>| if verbose { f } else { None };

        let [mfr, name, part, version, serial, asset, file_id, e0, e1, e2] =
            slots;

        Ok(ProductInfo {
            format_version,
            language,
            manufacturer: keep(mfr),
            product_name: keep(name),
            part_number: part,
            product_version: version,
            serial_number: serial,
            asset_tag: keep(asset),
            fru_file_id: keep(file_id),
            extra: [keep(e0), keep(e1), keep(e2)],
            checksum_ok,
        })
    }
}

/// The identity record consumers actually want.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FruIdentity {
    pub part_number: FruField,
    pub product_version: FruField,
    pub serial_number: FruField,
    /// False only when a `Verbose` decode found a mismatched header or
    /// area checksum. The decode still completed.
    pub checksum_ok: bool,
}

/// Decodes a raw FRU image down to part number, product version, and
/// serial number, without checksum validation.
pub fn decode_fru(image: &[u8]) -> Result<FruIdentity, FruError> {
    decode_fru_with(image, DecodePolicy::Quiet)
}

pub fn decode_fru_with(
    image: &[u8],
    policy: DecodePolicy,
) -> Result<FruIdentity, FruError> {
    let Some(header_bytes) = image.get(..core::mem::size_of::<FruHeader>())
    else {
        return Err(FruError::ImageTooShort);
    };
    // Infallible at this length, but read_from_bytes is the seam zerocopy
    // gives us.
    let header = FruHeader::read_from_bytes(header_bytes)
        .map_err(|_| FruError::ImageTooShort)?;

    let header_ok = match policy {
        DecodePolicy::Verbose => checksum_ok(header_bytes),
        DecodePolicy::Quiet => true,
    };

    if header.product_offset == 0 {
        return Err(FruError::NoProductArea);
    }
    let area_offset = header.product_offset as usize * 8;

    let info = ProductInfo::decode(image, area_offset, policy)?;

    Ok(FruIdentity {
        part_number: info.part_number.unwrap_or_default(),
        product_version: info.product_version.unwrap_or_default(),
        serial_number: info.serial_number.unwrap_or_default(),
        checksum_ok: header_ok && info.checksum_ok,
    })
}
