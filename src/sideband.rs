//! Sideband selection and signal-generator frequency planning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::LoConfig;
use crate::error::DsbsError;

/// Frequency step between adjacent correlator channels, in GHz.
pub const FREQ_INTERVAL_GHZ: f64 = 0.02;

/// Receiver sideband the calibration tone is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sideband {
    /// Upper sideband.
    #[serde(rename = "USB")]
    Usb,
    /// Lower sideband.
    #[serde(rename = "LSB")]
    Lsb,
}

impl Sideband {
    /// Sign of the offset from the LO frequency: +1 for USB, -1 for LSB.
    pub fn sign(self) -> f64 {
        match self {
            Sideband::Usb => 1.0,
            Sideband::Lsb => -1.0,
        }
    }
}

impl fmt::Display for Sideband {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sideband::Usb => write!(f, "USB"),
            Sideband::Lsb => write!(f, "LSB"),
        }
    }
}

impl FromStr for Sideband {
    type Err = DsbsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USB" => Ok(Sideband::Usb),
            "LSB" => Ok(Sideband::Lsb),
            _ => Err(DsbsError::InvalidSideband(s.to_string())),
        }
    }
}

/// Signal-generator frequency in GHz that places the calibration tone in
/// channel `signal_chan` of the requested sideband.
///
/// The tone sits `FREQ_INTERVAL_GHZ * signal_chan` above (USB) or below
/// (LSB) the LO frequency; the generator itself drives a multiplier chain,
/// so the planned value is divided by the multiplication factor.
pub fn signal_freq(lo: &LoConfig, signal_chan: u32, signal_sb: Sideband) -> f64 {
    (lo.freq_ghz + signal_sb.sign() * FREQ_INTERVAL_GHZ * f64::from(signal_chan)) / lo.multiplier
}
