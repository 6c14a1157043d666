/// Engine configuration.
///
/// Every field has a default so a partial JSON file (or none at all) is
/// enough. Runtime-only: nothing here is written back.
use crate::error::{ArcError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads used when a scan is started without an explicit count.
    pub default_threads: usize,
    /// Depth of the bounded work queue between the enumerator and workers.
    pub queue_capacity: usize,
    /// Below this elapsed time, average rates are reported as zero.
    pub min_rate_interval_ms: u64,
    /// Width of the sliding window behind the "recent" rates.
    pub rate_window_ms: u64,
    /// Capacity of each change-notification subscription.
    pub notify_capacity: usize,
    /// Register the home directory at discovery time.
    pub include_home: bool,
    /// Register local drives at discovery time.
    pub include_drives: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_threads: num_cpus::get().max(1),
            queue_capacity: 1_024,
            min_rate_interval_ms: 250,
            rate_window_ms: 1_000,
            notify_capacity: 4_096,
            include_home: true,
            include_drives: true,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ArcError::invalid(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_threads == 0 {
            return Err(ArcError::invalid("default_threads must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(ArcError::invalid("queue_capacity must be at least 1"));
        }
        if self.notify_capacity == 0 {
            return Err(ArcError::invalid("notify_capacity must be at least 1"));
        }
        Ok(())
    }

    #[inline]
    pub fn min_rate_interval(&self) -> Duration {
        Duration::from_millis(self.min_rate_interval_ms)
    }

    #[inline]
    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.default_threads >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("arcmount.json");
        std::fs::write(&path, r#"{ "default_threads": 3, "include_home": false }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.default_threads, 3);
        assert!(!config.include_home);
        assert_eq!(config.queue_capacity, 1_024);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("arcmount.json");
        std::fs::write(&path, r#"{ "default_threads": 0 }"#).unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(ArcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("arcmount.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
