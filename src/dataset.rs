//! The digital sideband measurement set.
//!
//! A [`MeasurementRecord`] is a struct-of-arrays rendition of the labeled
//! dataset produced by one calibration acquisition: a `time` dimension
//! (length 1 at assembly, grown by concatenation) and a `chan` dimension
//! (one entry per decoded correlator channel), with per-time coordinates
//! for the tone placement and per-(time, chan) correlation values.
//! Records are never mutated after assembly; concatenation consumes its
//! operands and yields a fresh record.

use chrono::{DateTime, Utc};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::decode::CorrelationColumns;
use crate::error::{AppResult, DsbsError};
use crate::sideband::Sideband;

/// Allowed integration times in milliseconds.
pub const INTEG_TIME_DOMAIN_MS: [u32; 4] = [100, 200, 500, 1000];

/// Allowed correlator input numbers.
pub const INPUT_NUM_DOMAIN: [u8; 2] = [1, 2];

/// Descriptive metadata for the serialized dataset fields.
pub mod attrs {
    /// `long_name` attribute per field, `(field, long_name)`.
    pub const LONG_NAMES: &[(&str, &str)] = &[
        ("time", "Measured time"),
        ("chan", "Channel number"),
        ("signal_chan", "Signal channel number"),
        ("signal_sb", "Signal sideband (LSB|USB)"),
        ("freq", "Signal frequency"),
        ("auto_usb", "Auto-correlation of USB"),
        ("auto_lsb", "Auto-correlation of LSB"),
        ("cross_2sb", "Cross-correlation between LSB and USB"),
    ];

    /// `units` attribute per field, `(field, units)`.
    pub const UNITS: &[(&str, &str)] = &[
        ("freq", "GHz"),
        ("auto_usb", "Arbitrary unit"),
        ("auto_lsb", "Arbitrary unit"),
        ("cross_2sb", "Arbitrary unit"),
    ];
}

/// One labeled sideband measurement set.
///
/// Dimensions are `time` (outer) and `chan` (inner): every per-channel
/// field holds one inner vector per time step, and every inner vector has
/// exactly `chan.len()` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Measurement timestamps, one per time step.
    pub time: Vec<DateTime<Utc>>,
    /// Dense channel indices `0..n`.
    pub chan: Vec<i64>,
    /// Channel the calibration tone targets, per time step.
    pub signal_chan: Vec<i64>,
    /// Sideband the tone was placed in, per time step.
    pub signal_sb: Vec<Sideband>,
    /// Measured frequency per channel in GHz, per time step.
    pub freq: Vec<Vec<f64>>,
    /// USB auto-correlation per channel, per time step.
    pub auto_usb: Vec<Vec<f64>>,
    /// LSB auto-correlation per channel, per time step.
    pub auto_lsb: Vec<Vec<f64>>,
    /// Cross-correlation between the sidebands per channel, per time step.
    pub cross_2sb: Vec<Vec<Complex64>>,
    /// Correlator input the tone was injected into (1 or 2).
    pub input_num: u8,
    /// Integration time in milliseconds.
    pub integ_time_ms: u32,
}

impl MeasurementRecord {
    /// Assemble a single-time-step record from decoded columns and the
    /// acquisition metadata.
    ///
    /// Pure construction: the `chan` coordinate is the dense sequence
    /// `0..columns.len()`; the columns' length invariant was already
    /// established by the decoder and is re-checked by the validator.
    pub fn assemble(
        timestamp: DateTime<Utc>,
        signal_chan: u32,
        signal_sb: Sideband,
        input_num: u8,
        integ_time_ms: u32,
        columns: CorrelationColumns,
    ) -> AppResult<Self> {
        let record = Self {
            time: vec![timestamp],
            chan: (0..columns.len() as i64).collect(),
            signal_chan: vec![i64::from(signal_chan)],
            signal_sb: vec![signal_sb],
            freq: vec![columns.freq],
            auto_usb: vec![columns.auto_usb],
            auto_lsb: vec![columns.auto_lsb],
            cross_2sb: vec![columns.cross_2sb],
            input_num,
            integ_time_ms,
        };
        record.validate()?;
        Ok(record)
    }

    /// Number of time steps.
    pub fn n_time(&self) -> usize {
        self.time.len()
    }

    /// Number of channels.
    pub fn n_chan(&self) -> usize {
        self.chan.len()
    }

    /// Check the record's structural invariants and attribute domains.
    ///
    /// # Errors
    ///
    /// [`DsbsError::SchemaMismatch`] when any per-channel row does not
    /// match the `chan` length or a per-time vector does not match the
    /// `time` length; [`DsbsError::Configuration`] when an attribute is
    /// outside its domain.
    pub fn validate(&self) -> AppResult<()> {
        if !INPUT_NUM_DOMAIN.contains(&self.input_num) {
            return Err(DsbsError::Configuration(format!(
                "input number {} is not one of {:?}",
                self.input_num, INPUT_NUM_DOMAIN
            )));
        }
        if !INTEG_TIME_DOMAIN_MS.contains(&self.integ_time_ms) {
            return Err(DsbsError::Configuration(format!(
                "integration time {} ms is not one of {:?}",
                self.integ_time_ms, INTEG_TIME_DOMAIN_MS
            )));
        }

        let n_time = self.n_time();
        for (name, len) in [
            ("signal_chan", self.signal_chan.len()),
            ("signal_sb", self.signal_sb.len()),
            ("freq", self.freq.len()),
            ("auto_usb", self.auto_usb.len()),
            ("auto_lsb", self.auto_lsb.len()),
            ("cross_2sb", self.cross_2sb.len()),
        ] {
            if len != n_time {
                return Err(DsbsError::SchemaMismatch(format!(
                    "{name} has {len} time steps, expected {n_time}"
                )));
            }
        }

        let n_chan = self.n_chan();
        let freq_rows = self.freq.iter().map(Vec::len);
        let usb_rows = self.auto_usb.iter().map(Vec::len);
        let lsb_rows = self.auto_lsb.iter().map(Vec::len);
        let cross_rows = self.cross_2sb.iter().map(Vec::len);
        for (name, rows) in [
            ("freq", freq_rows.collect::<Vec<_>>()),
            ("auto_usb", usb_rows.collect::<Vec<_>>()),
            ("auto_lsb", lsb_rows.collect::<Vec<_>>()),
            ("cross_2sb", cross_rows.collect::<Vec<_>>()),
        ] {
            if let Some(len) = rows.iter().find(|&&len| len != n_chan) {
                return Err(DsbsError::SchemaMismatch(format!(
                    "{name} row has {len} channels, expected {n_chan}"
                )));
            }
        }

        Ok(())
    }

    /// Concatenate two records along `time`.
    ///
    /// # Errors
    ///
    /// [`DsbsError::Merge`] unless both records target the same signal
    /// channel and share `input_num`, `integ_time_ms`, and an identical
    /// `chan` coordinate.
    pub fn concat(mut self, other: Self) -> AppResult<Self> {
        if self.chan != other.chan {
            return Err(DsbsError::Merge(format!(
                "records have {} and {} channels",
                self.n_chan(),
                other.n_chan()
            )));
        }
        let Some(&signal_chan) = self.signal_chan.first() else {
            return Err(DsbsError::Merge("record has no time steps".to_string()));
        };
        if self
            .signal_chan
            .iter()
            .chain(other.signal_chan.iter())
            .any(|&c| c != signal_chan)
        {
            return Err(DsbsError::Merge(format!(
                "records target different signal channels ({:?} vs {:?})",
                self.signal_chan, other.signal_chan
            )));
        }
        if self.input_num != other.input_num {
            return Err(DsbsError::Merge(format!(
                "records were taken from different inputs ({} vs {})",
                self.input_num, other.input_num
            )));
        }
        if self.integ_time_ms != other.integ_time_ms {
            return Err(DsbsError::Merge(format!(
                "records have different integration times ({} ms vs {} ms)",
                self.integ_time_ms, other.integ_time_ms
            )));
        }

        self.time.extend(other.time);
        self.signal_chan.extend(other.signal_chan);
        self.signal_sb.extend(other.signal_sb);
        self.freq.extend(other.freq);
        self.auto_usb.extend(other.auto_usb);
        self.auto_lsb.extend(other.auto_lsb);
        self.cross_2sb.extend(other.cross_2sb);
        Ok(self)
    }
}
