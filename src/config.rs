//! Store configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default zstd level for stored frames
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Configuration for a [`NestedSetStore`](crate::NestedSetStore)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// zstd level for stored frames; `None` stores every encoding raw
    pub compression_level: Option<i32>,
    /// Encodings shorter than this are stored raw even when compression is on
    pub compression_min_bytes: usize,
    /// Re-hash fetched encodings and reject any that do not match their key
    pub verify_reads: bool,
    /// Cache table size that triggers a sweep of dead weak entries
    pub cache_purge_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            compression_level: Some(DEFAULT_COMPRESSION_LEVEL),
            compression_min_bytes: 4096,
            verify_reads: true,
            cache_purge_threshold: 4096,
        }
    }
}

impl StoreConfig {
    /// Create config from defaults overridden by environment variables
    ///
    /// - `NESTSET_COMPRESSION`: `off` or a zstd level
    /// - `NESTSET_COMPRESSION_MIN_BYTES`
    /// - `NESTSET_VERIFY_READS`: `true`/`false`/`1`/`0`
    /// - `NESTSET_CACHE_PURGE_THRESHOLD`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = StoreConfig::default();

        if let Some(value) = lookup("NESTSET_COMPRESSION") {
            config.compression_level = match value.trim() {
                "off" | "none" | "0" => None,
                level => Some(level.parse().map_err(|_| {
                    Error::Config(format!("NESTSET_COMPRESSION: invalid level '{}'", level))
                })?),
            };
        }

        if let Some(value) = lookup("NESTSET_COMPRESSION_MIN_BYTES") {
            config.compression_min_bytes = parse_usize("NESTSET_COMPRESSION_MIN_BYTES", &value)?;
        }

        if let Some(value) = lookup("NESTSET_VERIFY_READS") {
            config.verify_reads = match value.trim() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(Error::Config(format!(
                        "NESTSET_VERIFY_READS: expected a boolean, got '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(value) = lookup("NESTSET_CACHE_PURGE_THRESHOLD") {
            config.cache_purge_threshold = parse_usize("NESTSET_CACHE_PURGE_THRESHOLD", &value)?;
        }

        Ok(config)
    }

    /// Disable compression
    pub fn without_compression(mut self) -> Self {
        self.compression_level = None;
        self
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{}: expected an integer, got '{}'", key, value)))
}
