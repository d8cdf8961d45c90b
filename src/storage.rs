//! Dataset persistence.
//!
//! The on-disk format is not part of the acquisition contract; callers get
//! a [`DatasetWriter`] seam and one concrete JSON implementation so the
//! sample binaries are runnable end-to-end. Columnar archive backends can
//! implement the same trait.

use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;

use crate::dataset::{attrs, MeasurementRecord};
use crate::error::{AppResult, DsbsError};

/// Writer for assembled measurement records.
#[async_trait]
pub trait DatasetWriter: Send {
    /// Persist one record.
    async fn write(&mut self, record: &MeasurementRecord) -> AppResult<()>;
}

/// A writer for JSON files.
///
/// Serializes the record together with the field metadata (`long_name`,
/// `units`) carried by the dataset schema.
pub struct JsonWriter {
    path: PathBuf,
}

impl JsonWriter {
    /// Create a writer targeting the given path. The file is created (or
    /// truncated) on the first `write`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DatasetWriter for JsonWriter {
    async fn write(&mut self, record: &MeasurementRecord) -> AppResult<()> {
        record.validate()?;

        let long_names: serde_json::Map<String, serde_json::Value> = attrs::LONG_NAMES
            .iter()
            .map(|(field, name)| (field.to_string(), serde_json::Value::from(*name)))
            .collect();
        let units: serde_json::Map<String, serde_json::Value> = attrs::UNITS
            .iter()
            .map(|(field, unit)| (field.to_string(), serde_json::Value::from(*unit)))
            .collect();

        let document = json!({
            "attrs": { "long_name": long_names, "units": units },
            "dataset": record,
        });

        let text = serde_json::to_string_pretty(&document)
            .map_err(|e| DsbsError::Storage(format!("failed to serialize dataset: {e}")))?;

        tokio::fs::write(&self.path, text).await.map_err(|e| {
            DsbsError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })?;

        tracing::info!(path = %self.path.display(), "Dataset written");
        Ok(())
    }
}
