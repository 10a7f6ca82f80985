//! Configuration types

use crate::{ConfigError, MessageId};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Seconds in one day; reference offsets must stay strictly inside it.
const SECONDS_PER_DAY: i32 = 86_400;

/// Message store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Ordered set holding the composite index entries.
    pub index_set_key: String,
    /// Counter backing the identity sequence.
    pub counter_key: String,
    /// Records live at `{record_key_prefix}:{id}`.
    pub record_key_prefix: String,
    /// UTC offset of the reference timezone in which calendar days are cut.
    pub reference_utc_offset_secs: i32,
    /// Leading prefix removed from recipients before they enter the index
    /// (e.g. a `+1` dialing prefix). Stored records keep the original value.
    pub strip_recipient_prefix: Option<String>,
    /// Deadline applied to every backend call. `None` waits indefinitely.
    pub backend_timeout: Option<Duration>,
    /// Write the record and its index entry as one batch.
    pub atomic_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_set_key: "message_index".to_string(),
            counter_key: "max_message_id".to_string(),
            record_key_prefix: "message".to_string(),
            reference_utc_offset_secs: 0,
            strip_recipient_prefix: None,
            backend_timeout: None,
            atomic_writes: true,
        }
    }
}

impl StoreConfig {
    /// Create StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `POSTBOX_INDEX_SET_KEY`: Ordered set for index entries (default: message_index)
    /// - `POSTBOX_COUNTER_KEY`: Identity sequence counter (default: max_message_id)
    /// - `POSTBOX_RECORD_KEY_PREFIX`: Record key prefix (default: message)
    /// - `POSTBOX_REFERENCE_UTC_OFFSET_SECS`: Day-cut timezone offset (default: 0)
    /// - `POSTBOX_STRIP_RECIPIENT_PREFIX`: Prefix removed before indexing (default: none)
    /// - `POSTBOX_BACKEND_TIMEOUT_MS`: Per-call backend deadline (default: none)
    /// - `POSTBOX_ATOMIC_WRITES`: "true" or "false" (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup, falling back to defaults for
    /// unset variables. Set-but-unparseable values are rejected.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            index_set_key: lookup("POSTBOX_INDEX_SET_KEY").unwrap_or(defaults.index_set_key),
            counter_key: lookup("POSTBOX_COUNTER_KEY").unwrap_or(defaults.counter_key),
            record_key_prefix: lookup("POSTBOX_RECORD_KEY_PREFIX")
                .unwrap_or(defaults.record_key_prefix),
            reference_utc_offset_secs: parse_var(&lookup, "POSTBOX_REFERENCE_UTC_OFFSET_SECS")?
                .unwrap_or(defaults.reference_utc_offset_secs),
            strip_recipient_prefix: lookup("POSTBOX_STRIP_RECIPIENT_PREFIX")
                .filter(|p| !p.is_empty()),
            backend_timeout: parse_var::<u64, _>(&lookup, "POSTBOX_BACKEND_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .or(defaults.backend_timeout),
            atomic_writes: parse_var(&lookup, "POSTBOX_ATOMIC_WRITES")?
                .unwrap_or(defaults.atomic_writes),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - key names are non-empty
    /// - the reference offset lies strictly within one day
    /// - a configured backend timeout is positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("index_set_key", &self.index_set_key),
            ("counter_key", &self.counter_key),
            ("record_key_prefix", &self.record_key_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: field.to_string(),
                });
            }
        }

        self.reference_offset()?;

        if let Some(timeout) = self.backend_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: "backend_timeout".to_string(),
                    value: format!("{:?}", timeout),
                    reason: "backend_timeout must be positive".to_string(),
                });
            }
        }

        Ok(())
    }

    /// The reference timezone as a chrono offset.
    pub fn reference_offset(&self) -> Result<FixedOffset, ConfigError> {
        let secs = self.reference_utc_offset_secs;
        if secs.abs() >= SECONDS_PER_DAY {
            return Err(ConfigError::InvalidValue {
                field: "reference_utc_offset_secs".to_string(),
                value: secs.to_string(),
                reason: "offset must be strictly within one day".to_string(),
            });
        }
        if secs % 60 != 0 {
            return Err(ConfigError::InvalidValue {
                field: "reference_utc_offset_secs".to_string(),
                value: secs.to_string(),
                reason: "offset must be a whole number of minutes".to_string(),
            });
        }
        FixedOffset::east_opt(secs).ok_or_else(|| ConfigError::InvalidValue {
            field: "reference_utc_offset_secs".to_string(),
            value: secs.to_string(),
            reason: "offset is out of range".to_string(),
        })
    }

    /// Key of the record holding message `id`.
    pub fn record_key(&self, id: MessageId) -> String {
        format!("{}:{}", self.record_key_prefix, id)
    }
}

/// LMDB backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmdbConfig {
    /// Directory holding the LMDB environment. Created if missing.
    pub path: PathBuf,
    /// Maximum size of the memory map in megabytes.
    pub map_size_mb: usize,
}

impl LmdbConfig {
    /// Configuration with the default map size.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map_size_mb: 64,
        }
    }

    /// Create LmdbConfig from environment variables.
    ///
    /// Environment variables:
    /// - `POSTBOX_LMDB_PATH`: Environment directory (required)
    /// - `POSTBOX_LMDB_MAP_SIZE_MB`: Map size in megabytes (default: 64)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("POSTBOX_LMDB_PATH").ok_or_else(|| ConfigError::MissingRequired {
            field: "POSTBOX_LMDB_PATH".to_string(),
        })?;
        let mut config = Self::new(path);
        if let Some(map_size_mb) = parse_var(&lookup, "POSTBOX_LMDB_MAP_SIZE_MB")? {
            config.map_size_mb = map_size_mb;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "path".to_string(),
            });
        }
        if self.map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "map_size_mb must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: "could not be parsed".to_string(),
            }),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.index_set_key, "message_index");
        assert_eq!(config.record_key(MessageId::new(12).unwrap()), "message:12");
    }

    #[test]
    fn test_from_vars_overrides() {
        let config = StoreConfig::from_vars(vars(&[
            ("POSTBOX_INDEX_SET_KEY", "sms_index"),
            ("POSTBOX_REFERENCE_UTC_OFFSET_SECS", "-18000"),
            ("POSTBOX_STRIP_RECIPIENT_PREFIX", "+1"),
            ("POSTBOX_BACKEND_TIMEOUT_MS", "250"),
            ("POSTBOX_ATOMIC_WRITES", "false"),
        ]))
        .unwrap();

        assert_eq!(config.index_set_key, "sms_index");
        assert_eq!(config.counter_key, "max_message_id");
        assert_eq!(config.reference_utc_offset_secs, -18000);
        assert_eq!(config.strip_recipient_prefix.as_deref(), Some("+1"));
        assert_eq!(config.backend_timeout, Some(Duration::from_millis(250)));
        assert!(!config.atomic_writes);
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        let err = StoreConfig::from_vars(vars(&[("POSTBOX_BACKEND_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "POSTBOX_BACKEND_TIMEOUT_MS"));
    }

    #[test]
    fn test_validate_rejects_day_sized_offset() {
        let config = StoreConfig {
            reference_utc_offset_secs: 86_400,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_offset_seconds() {
        let config = StoreConfig {
            reference_utc_offset_secs: 3_601,
            ..StoreConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "reference_utc_offset_secs"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = StoreConfig {
            backend_timeout: Some(Duration::ZERO),
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_keys() {
        let config = StoreConfig {
            counter_key: " ".to_string(),
            ..StoreConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingRequired {
                field: "counter_key".to_string()
            })
        );
    }

    #[test]
    fn test_lmdb_config_requires_path() {
        assert!(LmdbConfig::from_vars(vars(&[])).is_err());

        let config = LmdbConfig::from_vars(vars(&[
            ("POSTBOX_LMDB_PATH", "/tmp/postbox"),
            ("POSTBOX_LMDB_MAP_SIZE_MB", "16"),
        ]))
        .unwrap();
        assert_eq!(config.map_size_mb, 16);
        assert!(LmdbConfig {
            map_size_mb: 0,
            ..config
        }
        .validate()
        .is_err());
    }
}
