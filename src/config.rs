//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RmaError, RmaResult};

/// Default index name under which every record key is filed.
pub const DEFAULT_INDEX_NAME: &str = "RMANO";

/// How updates write back a record they loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// Compare the stored version before writing; a concurrent writer makes
    /// the update fail with a conflict.
    #[default]
    Versioned,
    /// Overwrite unconditionally. A concurrent update to another section is
    /// silently lost.
    LastWriteWins,
}

/// Target of the `updateFElocation` function name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeLocationRouting {
    /// Route to the forwarder name/location update.
    #[default]
    Forwarder,
    /// Route to the proof-of-delivery update, as older deployments did.
    Legacy,
}

/// Configuration for [`crate::RecordStore`] and [`crate::Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Index name embedded in every key.
    pub index_name: String,
    /// Write-back policy for updates.
    pub concurrency: ConcurrencyMode,
    /// Routing of `updateFElocation`.
    pub fe_location_routing: FeLocationRouting,
    /// Largest encoded record accepted on write.
    pub max_record_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            concurrency: ConcurrencyMode::default(),
            fe_location_routing: FeLocationRouting::default(),
            max_record_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

impl EngineConfig {
    const MIN_RECORD_BYTES: usize = 256; // a blank record is ~150 bytes

    /// Checks the configured bounds.
    ///
    /// # Errors
    /// Returns [`RmaError::InvalidConfig`] on an empty index name or a record
    /// limit below 256 bytes.
    pub fn validate(self) -> RmaResult<Self> {
        if self.index_name.is_empty() {
            return Err(RmaError::InvalidConfig {
                message: "index_name cannot be empty".to_string(),
            });
        }
        if self.max_record_bytes < Self::MIN_RECORD_BYTES {
            return Err(RmaError::InvalidConfig {
                message: format!(
                    "max_record_bytes must be at least {} (got {})",
                    Self::MIN_RECORD_BYTES,
                    self.max_record_bytes
                ),
            });
        }
        Ok(self)
    }

    /// Parses a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns [`RmaError::InvalidConfig`] on malformed JSON or bounds.
    pub fn from_json(text: &str) -> RmaResult<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| RmaError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    /// Returns [`RmaError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> RmaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RmaError::InvalidConfig {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json(&text)
    }
}
