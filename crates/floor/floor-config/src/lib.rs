mod config;

pub use config::{BusConfig, ConfigError, FloorConfig};
