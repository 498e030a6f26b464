// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integer engineering-unit newtypes.
//!
//! Telemetry in this workspace is decoded as fixed-point integers
//! (milli-units for most quantities, microwatts for power), never floats.
//! These newtypes keep a millivolt from being handed to something
//! expecting a milliamp.

#![cfg_attr(not(test), no_std)]

macro_rules! unit {
    ($(#[$attr:meta])* $name:ident, $suffix:literal) => {
        $(#[$attr])*
        #[derive(
            Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord,
        )]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(
                &self,
                f: &mut core::fmt::Formatter<'_>,
            ) -> core::fmt::Result {
                write!(f, "{} {}", self.0, $suffix)
            }
        }
    };
}

unit!(
    /// Voltage in millivolts.
    Millivolts,
    "mV"
);
unit!(
    /// Current in milliamperes.
    Milliamperes,
    "mA"
);
unit!(
    /// Power in microwatts.
    Microwatts,
    "uW"
);
unit!(
    /// Temperature in millidegrees Celsius.
    Millicelsius,
    "m\u{b0}C"
);
unit!(
    /// Fan speed in revolutions per minute.
    Rpm,
    "RPM"
);
