// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PMBus data-format codecs.
//!
//! Telemetry registers carry LINEAR11 values; VOUT carries ULINEAR16,
//! whose exponent comes from the separate VOUT_MODE register. Decoding
//! here is integer fixed-point: a raw register and a unit multiplier
//! (1000 for milli-units, 1_000_000 for microwatts) produce an `i64`,
//! with division truncating toward zero. No float path exists.

#![cfg_attr(not(test), no_std)]

/// The subset of PMBus command codes used by this workspace's drivers.
#[allow(dead_code)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum CommandCode {
    Page = 0x00,
    ClearFaults = 0x03,
    VOutMode = 0x20,
    StatusByte = 0x78,
    StatusWord = 0x79,
    ReadVIn = 0x88,
    ReadIIn = 0x89,
    ReadVOut = 0x8b,
    ReadIOut = 0x8c,
    ReadTemperature1 = 0x8d,
    ReadTemperature2 = 0x8e,
    ReadTemperature3 = 0x8f,
    ReadFanSpeed1 = 0x90,
    ReadFanSpeed2 = 0x91,
    ReadPOut = 0x96,
    ReadPIn = 0x97,
    ManufacturerId = 0x99,
    ManufacturerModel = 0x9a,
    ManufacturerRevision = 0x9b,
    ManufacturerDate = 0x9d,
    ManufacturerSerial = 0x9e,
}

// A LINEAR11 register (PMBus spec section 7.3) packs a 5-bit
// two's-complement exponent N into bits 15:11 and an 11-bit
// two's-complement mantissa Y into bits 10:0; the represented value is
// Y * 2^N. The extraction below leans on arithmetic right shift for
// both sign extensions.
const LINEAR11_MANTISSA_BITS: u16 = 11;
const LINEAR11_EXPONENT_BITS: u16 = 5;

/// A datum in the LINEAR11 data format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Linear11(pub u16);

impl Linear11 {
    /// Sign-extended 5-bit exponent.
    pub fn exponent(&self) -> i16 {
        (self.0 as i16) >> LINEAR11_MANTISSA_BITS
    }

    /// Sign-extended 11-bit mantissa.
    pub fn mantissa(&self) -> i16 {
        ((self.0 << LINEAR11_EXPONENT_BITS) as i16) >> LINEAR11_EXPONENT_BITS
    }

    /// Decodes to `mantissa * 2^exponent * multiplier`, as an integer.
    ///
    /// For negative exponents the division truncates toward zero, so the
    /// multiplier is applied first to preserve sub-unit resolution.
    pub fn decode(&self, multiplier: i32) -> i64 {
        let n = self.exponent();
        let scaled = self.mantissa() as i64 * multiplier as i64;

        if n >= 0 {
            scaled << n
        } else {
            scaled / (1i64 << -n)
        }
    }
}

/// The 5-bit two's-complement exponent held in VOUT_MODE when the device
/// reports voltage in ULINEAR16.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ULinear16Exponent(pub i8);

/// Decoded VOUT_MODE register. Only the ULINEAR16 mode carries data that
/// the telemetry drivers consume; the others are decoded for diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VOutMode {
    ULinear16(ULinear16Exponent),
    Vid(u8),
    Direct,
    HalfPrecision,
}

impl From<u8> for VOutMode {
    fn from(mode: u8) -> Self {
        // Bits 6:5 select the data format; bits 4:0 are its parameter.
        let param = mode & 0x1f;
        match (mode >> 5) & 0b11 {
            0b00 => {
                // The parameter is a 5-bit two's-complement exponent.
                let exp = ((param as i8) << 3) >> 3;
                VOutMode::ULinear16(ULinear16Exponent(exp))
            }
            0b01 => VOutMode::Vid(param),
            0b10 => VOutMode::Direct,
            _ => VOutMode::HalfPrecision,
        }
    }
}

/// A datum in the ULINEAR16 format. ULINEAR16 is used only for voltage;
/// the mantissa is the full unsigned 16-bit register and the exponent
/// comes from VOUT_MODE.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ULinear16(pub u16, pub ULinear16Exponent);

impl ULinear16 {
    /// Decodes to `raw * 2^exponent * multiplier`, truncating toward zero
    /// on negative exponents.
    pub fn decode(&self, multiplier: i32) -> i64 {
        let exp = self.1 .0 as i32;
        let scaled = self.0 as i64 * multiplier as i64;

        if exp >= 0 {
            scaled << exp
        } else {
            scaled / (1i64 << -exp)
        }
    }
}
