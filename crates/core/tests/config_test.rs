#![cfg(feature = "toml")]

use geodb::{Config, SpatialIndex};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_config_from_toml_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "subscriber_buffer = 16").unwrap();
    writeln!(file, "max_line_length = 512").unwrap();

    let text = std::fs::read_to_string(file.path()).unwrap();
    let config = Config::from_toml(&text).unwrap();
    assert_eq!(config.subscriber_buffer, 16);
    assert_eq!(config.max_line_length, 512);

    let index = SpatialIndex::builder().config(config).build().unwrap();
    assert_eq!(index.config().subscriber_buffer, 16);
}

#[test]
fn test_config_toml_round_trip_through_file() {
    let config = Config::default().with_subscriber_buffer(64);

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

    let text = std::fs::read_to_string(file.path()).unwrap();
    assert_eq!(Config::from_toml(&text).unwrap(), config);
}

#[test]
fn test_config_rejects_zero_buffer() {
    assert!(Config::from_toml("subscriber_buffer = 0").is_err());
    assert!(Config::from_toml("unknown_field = 1").is_err());
}
