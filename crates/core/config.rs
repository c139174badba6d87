//! Configuration for a GeoDB index
//!
//! Cell resolution is not configurable: it is the compile-time constant
//! [`crate::compute::hasher::CELL_RESOLUTION`] shared by every node of a cluster.
use serde::de::Error;

/// Index configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Capacity of each subscriber sink before events are dropped
    #[serde(default = "Config::default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Longest protocol line accepted on the write and read ports, in bytes
    #[serde(default = "Config::default_max_line_length")]
    pub max_line_length: usize,
}

impl Config {
    const fn default_subscriber_buffer() -> usize {
        1024
    }

    const fn default_max_line_length() -> usize {
        8 * 1024
    }

    pub fn with_subscriber_buffer(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Subscriber buffer must be greater than zero");

        if capacity > 1_000_000 {
            log::warn!(
                "Subscriber buffer of {} is very large; a stalled reader may hold that many events",
                capacity
            );
        }

        self.subscriber_buffer = capacity;
        self
    }

    pub fn with_max_line_length(mut self, length: usize) -> Self {
        assert!(length > 0, "Max line length must be greater than zero");
        self.max_line_length = length;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.subscriber_buffer == 0 {
            return Err("Subscriber buffer must be greater than zero".to_string());
        }

        if self.max_line_length == 0 {
            return Err("Max line length must be greater than zero".to_string());
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subscriber_buffer: Self::default_subscriber_buffer(),
            max_line_length: Self::default_max_line_length(),
        }
    }
}

pub use geodb_types::stats::{CellStats, IndexStats};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.subscriber_buffer, 1024);
        assert_eq!(config.max_line_length, 8192);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default()
            .with_subscriber_buffer(16)
            .with_max_line_length(512);

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json(&json).unwrap();

        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config = Config::from_json(r#"{"subscriber_buffer": 4}"#).unwrap();
        assert_eq!(config.subscriber_buffer, 4);
        assert_eq!(config.max_line_length, 8192);
    }

    #[test]
    fn test_config_rejects_zero_buffer() {
        assert!(Config::from_json(r#"{"subscriber_buffer": 0}"#).is_err());
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        assert!(Config::from_json(r#"{"resolution": 6}"#).is_err());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_from_toml_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "subscriber_buffer = 32").unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();

        let config = Config::from_toml(&contents).unwrap();
        assert_eq!(config.subscriber_buffer, 32);
    }
}
