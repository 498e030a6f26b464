// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device layer for the chassis ID EEPROMs.
//!
//! Two flavors exist: the IPMI FRU EEPROM (176-byte image, decoded by
//! `fru-id`) on line cards and chassis, and the flat vendor asset EEPROM
//! (128-byte image, decoded by `asset-tlv`) on PSUs and fan trays. Both
//! are pulled through the [`EepromRead`] seam in bounded chunks with a
//! fixed retry/backoff loop, decoded once, and cached for the life of
//! the device struct; identity does not change under us, so only an
//! explicit [`refresh`](FruEeprom::refresh) re-reads the part.
//!
//! Acquisition failure degrades to an empty record with a trace entry
//! rather than an error: a chassis with an unreadable ID EEPROM still
//! has to come up.

#![cfg_attr(not(test), no_std)]

use asset_tlv::{AssetInfo, ASSET_IMAGE_LEN};
use fru_id::{DecodePolicy, FruIdentity, FruError, FRU_IMAGE_LEN};
use tracebuf::TraceBuf;

/// EEPROMs are read in pages of this size; the devices NAK longer
/// transfers.
const CHUNK: usize = 16;

const TRACE_DEPTH: usize = 8;

/// The raw device underneath: something that can report its size and
/// fill a buffer from an offset. Tests implement it over arrays.
pub trait EepromRead {
    type Error: Copy + PartialEq + core::fmt::Debug;

    /// Device capacity in bytes.
    fn extent(&self) -> usize;
    fn read_at(
        &mut self,
        offset: usize,
        dest: &mut [u8],
    ) -> Result<(), Self::Error>;
    fn sleep_ms(&mut self, ms: u64);
}

/// Fixed retry policy for bus transactions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after a failure.
    pub retries: u8,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub const DEFAULT: Self = Self { retries: 2, backoff_ms: 5 };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trace<E> {
    ReadFailed { offset: u16, err: E },
    RetryExhausted { offset: u16 },
    DecodeFailed(FruError),
    Decoded,
    Refreshed,
}

/// An IPMI FRU ID EEPROM with a cached decoded identity.
pub struct FruEeprom<E: EepromRead> {
    dev: E,
    policy: DecodePolicy,
    retry: RetryPolicy,
    cached: Option<FruIdentity>,
    trace: TraceBuf<Trace<E::Error>, TRACE_DEPTH>,
}

impl<E: EepromRead> FruEeprom<E> {
    pub fn new(dev: E, policy: DecodePolicy, retry: RetryPolicy) -> Self {
        Self { dev, policy, retry, cached: None, trace: TraceBuf::new() }
    }

    /// Decoded identity, reading and decoding the part on first use.
    ///
    /// An unreadable or undecodable EEPROM yields the empty identity;
    /// the trace ring says why.
    pub fn identity(&mut self) -> FruIdentity {
        if let Some(id) = &self.cached {
            return id.clone();
        }

        let mut image = [0u8; FRU_IMAGE_LEN];
        let id = if read_image(
            &mut self.dev,
            &self.retry,
            &mut self.trace,
            &mut image,
        ) {
            match fru_id::decode_fru_with(&image, self.policy) {
                Ok(id) => {
                    self.trace.record(Trace::Decoded);
                    id
                }
                Err(e) => {
                    self.trace.record(Trace::DecodeFailed(e));
                    FruIdentity::default()
                }
            }
        } else {
            FruIdentity::default()
        };

        self.cached = Some(id.clone());
        id
    }

    /// Drops the cached identity; the next `identity()` re-reads the
    /// device.
    pub fn refresh(&mut self) {
        self.cached = None;
        self.trace.record(Trace::Refreshed);
    }

    pub fn trace(&self) -> &TraceBuf<Trace<E::Error>, TRACE_DEPTH> {
        &self.trace
    }
}

/// A PSU/fan-tray asset EEPROM with a cached decoded record.
pub struct AssetEeprom<E: EepromRead> {
    dev: E,
    retry: RetryPolicy,
    cached: Option<AssetInfo>,
    trace: TraceBuf<Trace<E::Error>, TRACE_DEPTH>,
}

impl<E: EepromRead> AssetEeprom<E> {
    pub fn new(dev: E, retry: RetryPolicy) -> Self {
        Self { dev, retry, cached: None, trace: TraceBuf::new() }
    }

    pub fn info(&mut self) -> AssetInfo {
        if let Some(info) = &self.cached {
            return info.clone();
        }

        let mut image = [0u8; ASSET_IMAGE_LEN];
        let info = if read_image(
            &mut self.dev,
            &self.retry,
            &mut self.trace,
            &mut image,
        ) {
            let info = AssetInfo::decode(&image);
            self.trace.record(Trace::Decoded);
            info
        } else {
            AssetInfo::default()
        };

        self.cached = Some(info.clone());
        info
    }

    pub fn refresh(&mut self) {
        self.cached = None;
        self.trace.record(Trace::Refreshed);
    }

    pub fn trace(&self) -> &TraceBuf<Trace<E::Error>, TRACE_DEPTH> {
        &self.trace
    }
}

/// Fills `image` from the device in `CHUNK`-sized reads, retrying each
/// chunk per the policy. Returns false (image contents unspecified) if
/// any chunk exhausts its retries; partial identity data is worse than
/// none here, since a half-read TLV stream can decode to wrong values.
fn read_image<E: EepromRead>(
    dev: &mut E,
    retry: &RetryPolicy,
    trace: &mut TraceBuf<Trace<E::Error>, TRACE_DEPTH>,
    image: &mut [u8],
) -> bool {
    let len = image.len().min(dev.extent());
    let mut offset = 0;
    while offset < len {
        let end = (offset + CHUNK).min(len);
        if !read_chunk(dev, retry, trace, offset, &mut image[offset..end]) {
            return false;
        }
        offset = end;
    }
    true
}

fn read_chunk<E: EepromRead>(
    dev: &mut E,
    retry: &RetryPolicy,
    trace: &mut TraceBuf<Trace<E::Error>, TRACE_DEPTH>,
    offset: usize,
    dest: &mut [u8],
) -> bool {
    let mut attempt = 0;
    loop {
        match dev.read_at(offset, dest) {
            Ok(()) => return true,
            Err(err) => {
                trace.record(Trace::ReadFailed {
                    offset: offset as u16,
                    err,
                });
                if attempt == retry.retries {
                    trace.record(Trace::RetryExhausted {
                        offset: offset as u16,
                    });
                    return false;
                }
                attempt += 1;
                dev.sleep_ms(retry.backoff_ms);
            }
        }
    }
}
