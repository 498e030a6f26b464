// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A fixed-capacity trace ring owned by a device struct.
//!
//! Each driver in this workspace keeps one of these in its device context
//! and records a `Trace` enum entry at interesting moments (bus errors,
//! retry exhaustion, cache refreshes). The ring is deliberately *not* a
//! module-level static: device state lives in the device struct, and a
//! debugger can find the ring by finding the device.
//!
//! An entry equal to the most recently recorded one is coalesced into a
//! repeat count rather than consuming another slot, so a flapping error
//! doesn't immediately evict everything else in the ring.

#![cfg_attr(not(test), no_std)]

/// One recorded event plus the number of times it repeated back-to-back.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entry<T> {
    pub event: T,
    pub count: u32,
}

/// Ring of the `N` most recent trace entries.
///
/// `T` must be `Copy + PartialEq` so entries can be stored inline and
/// coalesced by comparison.
#[derive(Clone)]
pub struct TraceBuf<T, const N: usize> {
    entries: [Option<Entry<T>>; N],
    /// Slot that the *next* distinct event will overwrite.
    next: usize,
    /// Slot most recently written, if any.
    last: Option<usize>,
}

impl<T: Copy + PartialEq, const N: usize> TraceBuf<T, N> {
    pub const fn new() -> Self {
        Self {
            entries: [None; N],
            next: 0,
            last: None,
        }
    }

    /// Records an event, coalescing it into the previous entry if it is
    /// identical.
    pub fn record(&mut self, event: T) {
        if let Some(last) = self.last {
            if let Some(entry) = &mut self.entries[last] {
                if entry.event == event {
                    entry.count = entry.count.saturating_add(1);
                    return;
                }
            }
        }

        self.entries[self.next] = Some(Entry { event, count: 1 });
        self.last = Some(self.next);
        self.next = if self.next + 1 == N { 0 } else { self.next + 1 };
    }

    /// Returns the most recently recorded entry.
    pub fn last(&self) -> Option<&Entry<T>> {
        self.last.and_then(|i| self.entries[i].as_ref())
    }

    /// Number of distinct entries currently held.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    /// Iterates entries oldest-first.
    pub fn entries(&self) -> impl Iterator<Item = &Entry<T>> + '_ {
        // Once the ring has wrapped, `next` points at the oldest entry;
        // before that, slot 0 is the oldest and the tail slots are None
        // (and filtered out).
        let (tail, head) = self.entries.split_at(self.next);
        head.iter().chain(tail.iter()).filter_map(|e| e.as_ref())
    }
}

impl<T: Copy + PartialEq, const N: usize> Default for TraceBuf<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
