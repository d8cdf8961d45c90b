//! Decoding of the correlator's CSV output tables.
//!
//! One integration produces two header-bearing tables: a power table with
//! the per-channel frequency and the two auto-correlation outputs, and a
//! phase table with the real and imaginary parts of the cross-correlation.
//! The tables are combined positionally, row by row; a row-count mismatch
//! is an error, never silently truncated to the shorter table.

use num_complex::Complex64;

use crate::error::{AppResult, DsbsError};

/// Frequency column of the power table.
pub const FREQ_COLUMN: &str = "freq[GHz]";
/// USB auto-correlation column of the power table.
pub const AUTO_USB_COLUMN: &str = "out0";
/// LSB auto-correlation column of the power table.
pub const AUTO_LSB_COLUMN: &str = "out1";
/// Real part column of the phase table.
pub const REAL_COLUMN: &str = "real";
/// Imaginary part column of the phase table.
pub const IMAG_COLUMN: &str = "imag";

/// Parallel column arrays decoded from one integration, keyed by channel
/// index. All four vectors have equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationColumns {
    /// Measured frequency per channel, GHz.
    pub freq: Vec<f64>,
    /// USB auto-correlation magnitude per channel, arbitrary units.
    pub auto_usb: Vec<f64>,
    /// LSB auto-correlation magnitude per channel, arbitrary units.
    pub auto_lsb: Vec<f64>,
    /// Cross-correlation between the sidebands per channel.
    pub cross_2sb: Vec<Complex64>,
}

impl CorrelationColumns {
    /// Number of channels (rows) decoded.
    pub fn len(&self) -> usize {
        self.freq.len()
    }

    /// Whether no rows were decoded.
    pub fn is_empty(&self) -> bool {
        self.freq.is_empty()
    }
}

fn column_index(table: &str, headers: &csv::StringRecord, name: &str) -> AppResult<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| DsbsError::SchemaMismatch(format!("{table} table is missing column {name:?}")))
}

fn parse_cell(
    record: &csv::StringRecord,
    row: usize,
    index: usize,
    column: &str,
) -> AppResult<f64> {
    let raw = record.get(index).ok_or_else(|| {
        DsbsError::SchemaMismatch(format!("row {row} has no value for column {column:?}"))
    })?;
    raw.trim().parse::<f64>().map_err(|_| DsbsError::Decode {
        row,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Decode the power and phase tables into [`CorrelationColumns`].
///
/// # Errors
///
/// [`DsbsError::SchemaMismatch`] when a required column is absent or the
/// two tables disagree on row count; [`DsbsError::Decode`] when a cell is
/// not numeric.
pub fn decode(power_csv: &str, phase_csv: &str) -> AppResult<CorrelationColumns> {
    let mut reader = csv::ReaderBuilder::new().from_reader(power_csv.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| DsbsError::SchemaMismatch(format!("power table header unreadable: {e}")))?
        .clone();
    let freq_idx = column_index("power", &headers, FREQ_COLUMN)?;
    let usb_idx = column_index("power", &headers, AUTO_USB_COLUMN)?;
    let lsb_idx = column_index("power", &headers, AUTO_LSB_COLUMN)?;

    let mut freq = Vec::new();
    let mut auto_usb = Vec::new();
    let mut auto_lsb = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| DsbsError::SchemaMismatch(format!("power table row {row}: {e}")))?;
        freq.push(parse_cell(&record, row, freq_idx, FREQ_COLUMN)?);
        auto_usb.push(parse_cell(&record, row, usb_idx, AUTO_USB_COLUMN)?);
        auto_lsb.push(parse_cell(&record, row, lsb_idx, AUTO_LSB_COLUMN)?);
    }

    let mut reader = csv::ReaderBuilder::new().from_reader(phase_csv.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| DsbsError::SchemaMismatch(format!("phase table header unreadable: {e}")))?
        .clone();
    let real_idx = column_index("phase", &headers, REAL_COLUMN)?;
    let imag_idx = column_index("phase", &headers, IMAG_COLUMN)?;

    let mut cross_2sb = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| DsbsError::SchemaMismatch(format!("phase table row {row}: {e}")))?;
        let real = parse_cell(&record, row, real_idx, REAL_COLUMN)?;
        let imag = parse_cell(&record, row, imag_idx, IMAG_COLUMN)?;
        cross_2sb.push(Complex64::new(real, imag));
    }

    if cross_2sb.len() != freq.len() {
        return Err(DsbsError::SchemaMismatch(format!(
            "power table has {} rows but phase table has {}",
            freq.len(),
            cross_2sb.len()
        )));
    }

    Ok(CorrelationColumns {
        freq,
        auto_usb,
        auto_lsb,
        cross_2sb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const POWER: &str = "freq[GHz],out0,out1\n90.0,1.5,2.5\n90.02,1.6,2.6\n";
    const PHASE: &str = "real,imag\n0.1,0.2\n0.3,0.4\n";

    #[test]
    fn decodes_the_two_tables_positionally() {
        let columns = decode(POWER, PHASE).unwrap();
        assert_eq!(columns.freq, vec![90.0, 90.02]);
        assert_eq!(columns.auto_usb, vec![1.5, 1.6]);
        assert_eq!(columns.auto_lsb, vec![2.5, 2.6]);
        assert_eq!(
            columns.cross_2sb,
            vec![Complex64::new(0.1, 0.2), Complex64::new(0.3, 0.4)]
        );
    }

    #[test]
    fn decoding_is_deterministic() {
        let first = decode(POWER, PHASE).unwrap();
        let second = decode(POWER, PHASE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_column_names_the_column() {
        let power = "freq[GHz],out0\n90.0,1.5\n";
        let err = decode(power, PHASE).unwrap_err();
        match err {
            DsbsError::SchemaMismatch(msg) => assert!(msg.contains("out1"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn row_count_mismatch_fails_instead_of_truncating() {
        let phase = "real,imag\n0.1,0.2\n";
        let err = decode(POWER, phase).unwrap_err();
        assert!(matches!(err, DsbsError::SchemaMismatch(_)), "{err}");
    }

    #[test]
    fn non_numeric_cell_is_a_decode_error() {
        let power = "freq[GHz],out0,out1\n90.0,nan?,2.5\n";
        let err = decode(power, "real,imag\n0.1,0.2\n").unwrap_err();
        match err {
            DsbsError::Decode { row, column, value } => {
                assert_eq!(row, 0);
                assert_eq!(column, AUTO_USB_COLUMN);
                assert_eq!(value, "nan?");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn column_order_in_the_header_does_not_matter() {
        let power = "out1,freq[GHz],out0\n2.5,90.0,1.5\n";
        let phase = "imag,real\n0.2,0.1\n";
        let columns = decode(power, phase).unwrap();
        assert_eq!(columns.freq, vec![90.0]);
        assert_eq!(columns.auto_usb, vec![1.5]);
        assert_eq!(columns.auto_lsb, vec![2.5]);
        assert_eq!(columns.cross_2sb, vec![Complex64::new(0.1, 0.2)]);
    }

    #[test]
    fn empty_tables_decode_to_empty_columns() {
        let columns = decode("freq[GHz],out0,out1\n", "real,imag\n").unwrap();
        assert!(columns.is_empty());
        assert_eq!(columns.len(), 0);
    }
}
