// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Table-driven PMBus PSU telemetry driver.
//!
//! One driver type serves every PSU generation: a [`PsuProfile`] names
//! the telemetry channels (command code, encoding, unit) along with the
//! cache window, retry policy, and VOUT settling delay, so a new PSU is
//! a new profile, not a new driver.
//!
//! Raw register words are fetched in one pass into a snapshot stamped
//! with the bus clock; queries inside the cache window decode from the
//! snapshot without touching the bus, and any write invalidates it.
//! A channel whose reads exhaust their retries reports as zero rather
//! than failing the whole refresh: partial telemetry beats none.

#![cfg_attr(not(test), no_std)]

use drv_pmbus::{
    CommandCode, Linear11, ULinear16, ULinear16Exponent, VOutMode,
};
use tracebuf::TraceBuf;
use units::Millivolts;

pub const MAX_CHANNELS: usize = 12;

const TRACE_DEPTH: usize = 16;

/// Largest PMBus block payload the identity reads expect.
pub const IDENT_BLOCK_LEN: usize = 32;

/// The transport underneath the driver. Production code implements this
/// over the real SMBus controller; tests implement it over an in-memory
/// register map. The timing hooks live here too, since only the
/// transport knows what a millisecond is.
pub trait PmbusBus {
    type Error: Copy + PartialEq + core::fmt::Debug;

    fn read_byte(&mut self, cmd: u8) -> Result<u8, Self::Error>;
    fn read_word(&mut self, cmd: u8) -> Result<u16, Self::Error>;
    fn read_block(
        &mut self,
        cmd: u8,
        dest: &mut [u8],
    ) -> Result<usize, Self::Error>;
    fn write_byte(&mut self, cmd: u8, value: u8) -> Result<(), Self::Error>;
    fn send_byte(&mut self, cmd: u8) -> Result<(), Self::Error>;

    fn now_ms(&self) -> u64;
    fn sleep_ms(&mut self, ms: u64);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    /// Exponent and mantissa both live in the raw word.
    Linear11,
    /// Unsigned 16-bit mantissa; exponent comes from VOUT_MODE.
    VOutULinear16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Unit {
    Millivolts,
    Milliamperes,
    Millicelsius,
    Rpm,
    Microwatts,
}

impl Unit {
    /// Fixed-point multiplier applied during decode: milli-units for
    /// most quantities, microwatts for power. Fan speed is whole RPM.
    pub fn multiplier(&self) -> i32 {
        match self {
            Unit::Microwatts => 1_000_000,
            Unit::Rpm => 1,
            _ => 1000,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelDef {
    pub code: CommandCode,
    pub kind: ChannelKind,
    pub unit: Unit,
}

/// Everything that distinguishes one PSU generation from another.
pub struct PsuProfile {
    pub name: &'static str,
    /// Expected MFR_MODEL contents, for `validate`.
    pub expected_model: &'static [u8],
    pub channels: &'static [ChannelDef],
    /// Snapshot validity window.
    pub cache_ms: u64,
    /// Additional attempts after a failed bus transaction.
    pub retries: u8,
    pub retry_backoff_ms: u64,
    /// Delay between sampling VOUT_MODE and reading VOUT.
    pub vout_settle_ms: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trace<E> {
    BadRead { cmd: u8, err: E },
    BadWrite { cmd: u8, err: E },
    RetryExhausted { cmd: u8 },
    UnexpectedVOutMode(VOutMode),
    Refreshed,
    Invalidated,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error<E> {
    BadRead { cmd: u8, err: E },
    /// The profile declares more channels than the snapshot holds.
    TooManyChannels,
}

/// A decoded telemetry value and the unit it is expressed in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Reading {
    pub unit: Unit,
    pub value: i64,
}

/// A block-read identity string (MFR_ID and friends).
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct IdentString {
    buf: [u8; IDENT_BLOCK_LEN],
    len: u8,
}

impl IdentString {
    pub const fn empty() -> Self {
        Self { buf: [0; IDENT_BLOCK_LEN], len: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for IdentString {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::fmt::Debug for IdentString {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(s) => write!(f, "{s:?}"),
            Err(_) => write!(f, "{:x?}", self.as_bytes()),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PsuIdentity {
    pub mfr_id: IdentString,
    pub mfr_model: IdentString,
    pub mfr_revision: IdentString,
    pub mfr_serial: IdentString,
    pub mfr_date: IdentString,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

pub struct Psu<B: PmbusBus> {
    bus: B,
    profile: &'static PsuProfile,
    /// Raw register snapshot, one word per profile channel.
    raw: [u16; MAX_CHANNELS],
    /// VOUT_MODE as sampled during the last refresh.
    vout_mode: Option<VOutMode>,
    /// Bus clock at the last refresh; `None` means the snapshot is
    /// invalid and the next query refreshes.
    stamp: Option<u64>,
    trace: TraceBuf<Trace<B::Error>, TRACE_DEPTH>,
}

impl<B: PmbusBus> Psu<B> {
    pub fn new(bus: B, profile: &'static PsuProfile) -> Result<Self, Error<B::Error>> {
        if profile.channels.len() > MAX_CHANNELS {
            return Err(Error::TooManyChannels);
        }
        Ok(Self {
            bus,
            profile,
            raw: [0; MAX_CHANNELS],
            vout_mode: None,
            stamp: None,
            trace: TraceBuf::new(),
        })
    }

    pub fn profile(&self) -> &'static PsuProfile {
        self.profile
    }

    pub fn trace(&self) -> &TraceBuf<Trace<B::Error>, TRACE_DEPTH> {
        &self.trace
    }

    /// Runs one bus transaction with the profile's retry policy. On
    /// exhaustion, records a trace entry and returns `None`; the caller
    /// degrades rather than propagating.
    fn retried<T>(
        &mut self,
        access: Access,
        cmd: CommandCode,
        mut op: impl FnMut(&mut B, u8) -> Result<T, B::Error>,
    ) -> Option<T> {
        let cmd = cmd as u8;
        let mut attempt = 0;
        loop {
            match op(&mut self.bus, cmd) {
                Ok(v) => return Some(v),
                Err(err) => {
                    self.trace.record(match access {
                        Access::Read => Trace::BadRead { cmd, err },
                        Access::Write => Trace::BadWrite { cmd, err },
                    });
                    if attempt == self.profile.retries {
                        self.trace.record(Trace::RetryExhausted { cmd });
                        return None;
                    }
                    attempt += 1;
                    let backoff = self.profile.retry_backoff_ms;
                    self.bus.sleep_ms(backoff);
                }
            }
        }
    }

    /// Re-reads every channel into the snapshot. Failed channels are
    /// left at zero; the refresh itself never fails.
    pub fn refresh(&mut self) {
        for i in 0..self.profile.channels.len() {
            let ch = self.profile.channels[i];
            let raw = match ch.kind {
                ChannelKind::VOutULinear16 => {
                    // VOUT_MODE governs the interpretation of VOUT, so
                    // it is sampled first, with the device's settling
                    // time between the two reads.
                    if let Some(mode) = self.retried(
                        Access::Read,
                        CommandCode::VOutMode,
                        |b, c| b.read_byte(c),
                    ) {
                        self.vout_mode = Some(VOutMode::from(mode));
                    }
                    let settle = self.profile.vout_settle_ms;
                    self.bus.sleep_ms(settle);
                    self.retried(Access::Read, ch.code, |b, c| {
                        b.read_word(c)
                    })
                }
                ChannelKind::Linear11 => self
                    .retried(Access::Read, ch.code, |b, c| b.read_word(c)),
            };
            self.raw[i] = raw.unwrap_or(0);
        }
        self.stamp = Some(self.bus.now_ms());
        self.trace.record(Trace::Refreshed);
    }

    fn refresh_if_stale(&mut self) {
        match self.stamp {
            Some(at)
                if self.bus.now_ms().saturating_sub(at)
                    <= self.profile.cache_ms => {}
            _ => self.refresh(),
        }
    }

    /// Decodes the channel with the given command code, refreshing the
    /// snapshot first if it has gone stale. `None` if the profile has no
    /// such channel.
    pub fn reading(&mut self, code: CommandCode) -> Option<Reading> {
        let idx =
            self.profile.channels.iter().position(|c| c.code == code)?;
        self.refresh_if_stale();

        let ch = self.profile.channels[idx];
        let raw = self.raw[idx];
        let mult = ch.unit.multiplier();

        let value = match ch.kind {
            ChannelKind::Linear11 => Linear11(raw).decode(mult),
            ChannelKind::VOutULinear16 => {
                let exp = match self.vout_mode {
                    Some(VOutMode::ULinear16(exp)) => exp,
                    Some(other) => {
                        self.trace.record(Trace::UnexpectedVOutMode(other));
                        ULinear16Exponent(0)
                    }
                    None => ULinear16Exponent(0),
                };
                ULinear16(raw, exp).decode(mult)
            }
        };

        Some(Reading { unit: ch.unit, value })
    }

    pub fn vin(&mut self) -> Option<Millivolts> {
        self.reading(CommandCode::ReadVIn).map(|r| Millivolts(r.value))
    }

    pub fn vout(&mut self) -> Option<Millivolts> {
        self.reading(CommandCode::ReadVOut).map(|r| Millivolts(r.value))
    }

    pub fn iin(&mut self) -> Option<units::Milliamperes> {
        self.reading(CommandCode::ReadIIn)
            .map(|r| units::Milliamperes(r.value))
    }

    pub fn iout(&mut self) -> Option<units::Milliamperes> {
        self.reading(CommandCode::ReadIOut)
            .map(|r| units::Milliamperes(r.value))
    }

    pub fn pin(&mut self) -> Option<units::Microwatts> {
        self.reading(CommandCode::ReadPIn)
            .map(|r| units::Microwatts(r.value))
    }

    pub fn pout(&mut self) -> Option<units::Microwatts> {
        self.reading(CommandCode::ReadPOut)
            .map(|r| units::Microwatts(r.value))
    }

    pub fn temperature(&mut self, index: u8) -> Option<units::Millicelsius> {
        let code = match index {
            0 => CommandCode::ReadTemperature1,
            1 => CommandCode::ReadTemperature2,
            2 => CommandCode::ReadTemperature3,
            _ => return None,
        };
        self.reading(code).map(|r| units::Millicelsius(r.value))
    }

    pub fn fan_speed(&mut self, index: u8) -> Option<units::Rpm> {
        let code = match index {
            0 => CommandCode::ReadFanSpeed1,
            1 => CommandCode::ReadFanSpeed2,
            _ => return None,
        };
        self.reading(code).map(|r| units::Rpm(r.value))
    }

    /// Sends CLEAR_FAULTS. The snapshot is invalidated whether or not
    /// the write went through: device state may have changed.
    pub fn clear_faults(&mut self) {
        self.retried(Access::Write, CommandCode::ClearFaults, |b, c| {
            b.send_byte(c)
        });
        self.invalidate();
    }

    /// Selects a PMBus page, invalidating the snapshot.
    pub fn set_page(&mut self, page: u8) {
        self.retried(Access::Write, CommandCode::Page, |b, c| {
            b.write_byte(c, page)
        });
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.stamp = None;
        self.trace.record(Trace::Invalidated);
    }

    /// Compares MFR_MODEL against the profile's expected bytes.
    pub fn validate(&mut self) -> Result<bool, Error<B::Error>> {
        let cmd = CommandCode::ManufacturerModel as u8;
        let mut buf = [0u8; IDENT_BLOCK_LEN];
        let len = self
            .bus
            .read_block(cmd, &mut buf)
            .map_err(|err| Error::BadRead { cmd, err })?;
        let len = len.min(buf.len());
        Ok(&buf[..len] == self.profile.expected_model)
    }

    /// Reads the MFR identity block registers. Individual read failures
    /// leave that field empty.
    pub fn identity(&mut self) -> PsuIdentity {
        PsuIdentity {
            mfr_id: self.read_ident(CommandCode::ManufacturerId),
            mfr_model: self.read_ident(CommandCode::ManufacturerModel),
            mfr_revision: self.read_ident(CommandCode::ManufacturerRevision),
            mfr_serial: self.read_ident(CommandCode::ManufacturerSerial),
            mfr_date: self.read_ident(CommandCode::ManufacturerDate),
        }
    }

    fn read_ident(&mut self, cmd: CommandCode) -> IdentString {
        let mut buf = [0u8; IDENT_BLOCK_LEN];
        let len = self
            .retried(Access::Read, cmd, |b, c| b.read_block(c, &mut buf))
            .unwrap_or(0)
            .min(IDENT_BLOCK_LEN);
        IdentString { buf, len: len as u8 }
    }
}

/// The shipped PSU generations. Channel sets and timing differ; the
/// driver does not.
pub mod profiles {
    use super::*;
    use drv_pmbus::CommandCode as Cmd;

    const fn ch(code: Cmd, kind: ChannelKind, unit: Unit) -> ChannelDef {
        ChannelDef { code, kind, unit }
    }

    pub static GEN1: PsuProfile = PsuProfile {
        name: "psu-gen1",
        expected_model: b"NPS-ACDC-2000",
        channels: &[
            ch(Cmd::ReadVIn, ChannelKind::Linear11, Unit::Millivolts),
            ch(Cmd::ReadIIn, ChannelKind::Linear11, Unit::Milliamperes),
            ch(Cmd::ReadVOut, ChannelKind::VOutULinear16, Unit::Millivolts),
            ch(Cmd::ReadIOut, ChannelKind::Linear11, Unit::Milliamperes),
            ch(Cmd::ReadTemperature1, ChannelKind::Linear11, Unit::Millicelsius),
            ch(Cmd::ReadTemperature2, ChannelKind::Linear11, Unit::Millicelsius),
            ch(Cmd::ReadFanSpeed1, ChannelKind::Linear11, Unit::Rpm),
            ch(Cmd::ReadPIn, ChannelKind::Linear11, Unit::Microwatts),
            ch(Cmd::ReadPOut, ChannelKind::Linear11, Unit::Microwatts),
        ],
        cache_ms: 1000,
        retries: 2,
        retry_backoff_ms: 10,
        vout_settle_ms: 2,
    };

    pub static GEN2: PsuProfile = PsuProfile {
        name: "psu-gen2",
        expected_model: b"NPS-ACDC-3000",
        channels: &[
            ch(Cmd::ReadVIn, ChannelKind::Linear11, Unit::Millivolts),
            ch(Cmd::ReadIIn, ChannelKind::Linear11, Unit::Milliamperes),
            ch(Cmd::ReadVOut, ChannelKind::VOutULinear16, Unit::Millivolts),
            ch(Cmd::ReadIOut, ChannelKind::Linear11, Unit::Milliamperes),
            ch(Cmd::ReadTemperature1, ChannelKind::Linear11, Unit::Millicelsius),
            ch(Cmd::ReadTemperature2, ChannelKind::Linear11, Unit::Millicelsius),
            ch(Cmd::ReadTemperature3, ChannelKind::Linear11, Unit::Millicelsius),
            ch(Cmd::ReadFanSpeed1, ChannelKind::Linear11, Unit::Rpm),
            ch(Cmd::ReadFanSpeed2, ChannelKind::Linear11, Unit::Rpm),
            ch(Cmd::ReadPIn, ChannelKind::Linear11, Unit::Microwatts),
            ch(Cmd::ReadPOut, ChannelKind::Linear11, Unit::Microwatts),
        ],
        cache_ms: 250,
        retries: 3,
        retry_backoff_ms: 5,
        vout_settle_ms: 1,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        ReadByte(u8),
        ReadWord(u8),
        ReadBlock(u8),
        WriteByte(u8),
        SendByte(u8),
        Sleep(u64),
    }

    #[derive(Default)]
    struct FakeBus {
        bytes: HashMap<u8, u8>,
        words: HashMap<u8, u16>,
        blocks: HashMap<u8, Vec<u8>>,
        /// Remaining forced failures per command code.
        fail: HashMap<u8, u32>,
        log: Vec<Op>,
        clock: u64,
    }

    const EIO: u8 = 5;
    const ENODEV: u8 = 19;

    impl FakeBus {
        fn check_fail(&mut self, cmd: u8) -> Result<(), u8> {
            match self.fail.get_mut(&cmd) {
                Some(0) | None => Ok(()),
                Some(n) => {
                    *n -= 1;
                    Err(EIO)
                }
            }
        }

        fn word_reads(&self, cmd: u8) -> usize {
            self.log.iter().filter(|op| **op == Op::ReadWord(cmd)).count()
        }
    }

    impl PmbusBus for FakeBus {
        type Error = u8;

        fn read_byte(&mut self, cmd: u8) -> Result<u8, u8> {
            self.log.push(Op::ReadByte(cmd));
            self.check_fail(cmd)?;
            self.bytes.get(&cmd).copied().ok_or(ENODEV)
        }

        fn read_word(&mut self, cmd: u8) -> Result<u16, u8> {
            self.log.push(Op::ReadWord(cmd));
            self.check_fail(cmd)?;
            self.words.get(&cmd).copied().ok_or(ENODEV)
        }

        fn read_block(&mut self, cmd: u8, dest: &mut [u8]) -> Result<usize, u8> {
            self.log.push(Op::ReadBlock(cmd));
            self.check_fail(cmd)?;
            let data = self.blocks.get(&cmd).ok_or(ENODEV)?;
            let n = data.len().min(dest.len());
            dest[..n].copy_from_slice(&data[..n]);
            Ok(n)
        }

        fn write_byte(&mut self, cmd: u8, _value: u8) -> Result<(), u8> {
            self.log.push(Op::WriteByte(cmd));
            self.check_fail(cmd)
        }

        fn send_byte(&mut self, cmd: u8) -> Result<(), u8> {
            self.log.push(Op::SendByte(cmd));
            self.check_fail(cmd)
        }

        fn now_ms(&self) -> u64 {
            self.clock
        }

        fn sleep_ms(&mut self, ms: u64) {
            self.log.push(Op::Sleep(ms));
            self.clock += ms;
        }
    }

    fn linear11(exponent: i16, mantissa: i16) -> u16 {
        // Out-of-range values would alias after masking; reject them so
        // a bad vector fails loudly instead of decoding to nonsense.
        assert!((-16..=15).contains(&exponent));
        assert!((-1024..=1023).contains(&mantissa));
        (((exponent & 0x1f) as u16) << 11) | ((mantissa & 0x7ff) as u16)
    }

    fn populated_bus() -> FakeBus {
        let mut bus = FakeBus::default();
        // 230.0 V in: Y=460, N=-1.
        bus.words.insert(0x88, linear11(-1, 460));
        // 6.5 A in: Y=832, N=-7.
        bus.words.insert(0x89, linear11(-7, 832));
        // VOUT_MODE: ULINEAR16, exponent -9; VOUT 12.0 V: 6144.
        bus.bytes.insert(0x20, 0b000_10111);
        bus.words.insert(0x8b, 6144);
        bus.words.insert(0x8c, linear11(0, 55));
        // 41.5 C: Y=83, N=-1.
        bus.words.insert(0x8d, linear11(-1, 83));
        bus.words.insert(0x8e, linear11(-1, 91));
        // 8608 RPM: Y=269, N=5.
        bus.words.insert(0x90, linear11(5, 269));
        // 1495 W in, 1380 W out.
        bus.words.insert(0x97, linear11(0, 1495));
        bus.words.insert(0x96, linear11(0, 1380));
        bus.blocks.insert(0x9a, b"NPS-ACDC-2000".to_vec());
        bus
    }

    fn psu(bus: FakeBus) -> Psu<FakeBus> {
        Psu::new(bus, &profiles::GEN1).unwrap()
    }

    #[test]
    fn decodes_populated_registers() {
        let mut psu = psu(populated_bus());
        assert_eq!(psu.vin(), Some(Millivolts(230_000)));
        assert_eq!(psu.iin(), Some(units::Milliamperes(6_500)));
        assert_eq!(psu.vout(), Some(Millivolts(12_000)));
        assert_eq!(psu.iout(), Some(units::Milliamperes(55_000)));
        assert_eq!(psu.temperature(0), Some(units::Millicelsius(41_500)));
        assert_eq!(psu.fan_speed(0), Some(units::Rpm(8_608)));
        assert_eq!(psu.pin(), Some(units::Microwatts(1_495_000_000)));
        assert_eq!(psu.pout(), Some(units::Microwatts(1_380_000_000)));
    }

    #[test]
    fn unknown_channel_is_none() {
        let mut psu = psu(populated_bus());
        // GEN1 has no third temperature or second fan.
        assert_eq!(psu.temperature(2), None);
        assert_eq!(psu.fan_speed(1), None);
        assert_eq!(psu.temperature(9), None);
    }

    #[test]
    fn snapshot_reused_inside_window() {
        let mut psu = psu(populated_bus());
        psu.vin();
        psu.vin();
        psu.vout();
        // One refresh: a single VIN fetch despite three queries.
        assert_eq!(psu.bus.word_reads(0x88), 1);
    }

    #[test]
    fn snapshot_refetched_after_window() {
        let mut psu = psu(populated_bus());
        psu.vin();
        psu.bus.clock += profiles::GEN1.cache_ms + 1;
        psu.vin();
        assert_eq!(psu.bus.word_reads(0x88), 2);
    }

    #[test]
    fn write_invalidates_snapshot() {
        let mut psu = psu(populated_bus());
        psu.vin();
        psu.clear_faults();
        psu.vin();
        assert_eq!(psu.bus.word_reads(0x88), 2);
        assert!(psu.bus.log.contains(&Op::SendByte(0x03)));
    }

    #[test]
    fn vout_mode_sampled_before_vout_with_settle() {
        let mut psu = psu(populated_bus());
        psu.refresh();
        let mode_at = psu
            .bus
            .log
            .iter()
            .position(|op| *op == Op::ReadByte(0x20))
            .unwrap();
        let vout_at = psu
            .bus
            .log
            .iter()
            .position(|op| *op == Op::ReadWord(0x8b))
            .unwrap();
        assert!(mode_at < vout_at);
        assert_eq!(
            psu.bus.log[mode_at + 1],
            Op::Sleep(profiles::GEN1.vout_settle_ms)
        );
    }

    #[test]
    fn transient_failure_retries_and_recovers() {
        let mut bus = populated_bus();
        bus.fail.insert(0x88, 1);
        let mut psu = psu(bus);
        assert_eq!(psu.vin(), Some(Millivolts(230_000)));
        // First attempt failed, backoff slept, second succeeded.
        assert_eq!(psu.bus.word_reads(0x88), 2);
        assert!(psu
            .bus
            .log
            .contains(&Op::Sleep(profiles::GEN1.retry_backoff_ms)));
        assert!(psu
            .trace()
            .entries()
            .any(|e| e.event == Trace::BadRead { cmd: 0x88, err: EIO }));
    }

    #[test]
    fn exhausted_retries_zero_the_channel() {
        let mut bus = populated_bus();
        bus.fail.insert(0x88, 100);
        let mut psu = psu(bus);
        assert_eq!(psu.vin(), Some(Millivolts(0)));
        // Other channels are unaffected by the failing one.
        assert_eq!(psu.vout(), Some(Millivolts(12_000)));
        // Initial attempt plus the profile's retries.
        assert_eq!(
            psu.bus.word_reads(0x88),
            1 + profiles::GEN1.retries as usize
        );
        assert!(psu
            .trace()
            .entries()
            .any(|e| e.event == Trace::RetryExhausted { cmd: 0x88 }));
    }

    #[test]
    fn validate_compares_model() {
        let mut psu = psu(populated_bus());
        assert_eq!(psu.validate(), Ok(true));

        let mut bus = populated_bus();
        bus.blocks.insert(0x9a, b"SOMETHING-ELSE".to_vec());
        let mut mismatched = self::psu(bus);
        assert_eq!(mismatched.validate(), Ok(false));
    }

    #[test]
    fn validate_propagates_bus_error() {
        let mut bus = populated_bus();
        bus.fail.insert(0x9a, 1);
        let mut psu = psu(bus);
        assert_eq!(
            psu.validate(),
            Err(Error::BadRead { cmd: 0x9a, err: EIO })
        );
    }

    #[test]
    fn identity_degrades_per_field() {
        let mut bus = populated_bus();
        bus.blocks.insert(0x99, b"NOKIA".to_vec());
        bus.blocks.insert(0x9e, b"NS1812F0042".to_vec());
        // MFR_REVISION and MFR_DATE are absent; those fields come back
        // empty while the rest decode.
        let mut psu = psu(bus);
        let id = psu.identity();
        assert_eq!(id.mfr_id.as_bytes(), b"NOKIA");
        assert_eq!(id.mfr_model.as_bytes(), b"NPS-ACDC-2000");
        assert_eq!(id.mfr_serial.as_bytes(), b"NS1812F0042");
        assert!(id.mfr_revision.is_empty());
        assert!(id.mfr_date.is_empty());
    }

    #[test]
    fn oversized_profile_rejected() {
        static TOO_BIG: PsuProfile = PsuProfile {
            name: "too-big",
            expected_model: b"",
            channels: &[ChannelDef {
                code: CommandCode::ReadVIn,
                kind: ChannelKind::Linear11,
                unit: Unit::Millivolts,
            }; MAX_CHANNELS + 1],
            cache_ms: 0,
            retries: 0,
            retry_backoff_ms: 0,
            vout_settle_ms: 0,
        };
        assert!(matches!(
            Psu::new(FakeBus::default(), &TOO_BIG),
            Err(Error::TooManyChannels)
        ));
    }
}
