use floor_bus::{Backing, BusOptions, OpenMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct FloorConfig {
    /// Directory holding the mapped queue files.
    #[serde(default = "defaults::shm_dir")]
    pub shm_dir: PathBuf,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default)]
    pub bus: BusConfig,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    #[serde(default = "defaults::bus_name")]
    pub name: String,
    #[serde(default = "defaults::queue_len")]
    pub queue_len: u64,
    #[serde(default = "defaults::slot_size")]
    pub slot_size: usize,
    #[serde(default = "defaults::poll_interval_us")]
    pub poll_interval_us: u64,
    #[serde(default = "defaults::request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 0 waits forever for stalled writers.
    #[serde(default = "defaults::claim_timeout_ms")]
    pub claim_timeout_ms: u64,
    /// The owning process resets both queues when it opens the bus.
    #[serde(default)]
    pub initialize: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: defaults::bus_name(),
            queue_len: defaults::queue_len(),
            slot_size: defaults::slot_size(),
            poll_interval_us: defaults::poll_interval_us(),
            request_timeout_ms: defaults::request_timeout_ms(),
            claim_timeout_ms: defaults::claim_timeout_ms(),
            initialize: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    use std::path::PathBuf;

    pub fn shm_dir() -> PathBuf {
        "/tmp".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn bus_name() -> String {
        "floor".into()
    }

    pub fn queue_len() -> u64 {
        1 << 20
    }

    pub fn slot_size() -> usize {
        1024
    }

    pub fn poll_interval_us() -> u64 {
        100
    }

    pub fn request_timeout_ms() -> u64 {
        1_000
    }

    pub fn claim_timeout_ms() -> u64 {
        1_000
    }
}

impl FloorConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let floor_config: FloorConfig = toml::from_str(&toml_to_str)?;
        Ok(floor_config)
    }

    /// Options for opening buses backed by files under `shm_dir`.
    pub fn bus_options(&self) -> BusOptions {
        let claim_timeout = match self.bus.claim_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        BusOptions {
            queue_len: self.bus.queue_len,
            slot_size: self.bus.slot_size,
            poll_interval: Duration::from_micros(self.bus.poll_interval_us),
            claim_timeout,
            backing: Backing::Shm {
                dir: self.shm_dir.clone(),
            },
            open_mode: OpenMode::AttachOrInitialize,
        }
    }

    /// Options for the process that owns the bus: like
    /// [`bus_options`](Self::bus_options), but resets the queues when
    /// `[bus] initialize` is set.
    pub fn owner_bus_options(&self) -> BusOptions {
        let mut options = self.bus_options();
        if self.bus.initialize {
            options.open_mode = OpenMode::Initialize;
        }
        options
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.bus.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_takes_every_default() {
        let cfg: FloorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.shm_dir, PathBuf::from("/tmp"));
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.bus.name, "floor");
        assert_eq!(cfg.bus.slot_size, 1024);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn bus_section_maps_to_options() {
        let cfg: FloorConfig = toml::from_str(
            r#"
            shm_dir = "/dev/shm"
            log_level = "debug"

            [bus]
            name = "trading"
            queue_len = 65536
            slot_size = 256
            poll_interval_us = 20
            claim_timeout_ms = 0
            "#,
        )
        .unwrap();

        let opts = cfg.bus_options();
        assert_eq!(opts.queue_len, 65536);
        assert_eq!(opts.slot_size, 256);
        assert_eq!(opts.poll_interval, Duration::from_micros(20));
        assert_eq!(opts.claim_timeout, None);
        assert_eq!(opts.backing, Backing::Shm { dir: "/dev/shm".into() });
        assert_eq!(cfg.bus.name, "trading");
    }

    #[test]
    fn unknown_keys_are_parse_errors_at_every_level() {
        let err = toml::from_str::<FloorConfig>("[bus]\nslots = 4\n").unwrap_err();
        assert!(err.to_string().contains("slots"));

        let err = toml::from_str::<FloorConfig>("shm_dirr = \"/dev/shm\"\n").unwrap_err();
        assert!(err.to_string().contains("shm_dirr"));
    }

    #[test]
    fn only_the_owner_initializes() {
        let cfg: FloorConfig = toml::from_str("[bus]\ninitialize = true\n").unwrap();
        assert_eq!(cfg.owner_bus_options().open_mode, OpenMode::Initialize);
        assert_eq!(cfg.bus_options().open_mode, OpenMode::AttachOrInitialize);

        let cfg: FloorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.owner_bus_options().open_mode, OpenMode::AttachOrInitialize);
    }

    #[test]
    fn bad_geometry_surfaces_as_a_bus_error() {
        let cfg: FloorConfig = toml::from_str("[bus]\nqueue_len = 4096\nslot_size = 4096\n").unwrap();
        let mut options = cfg.bus_options();
        options.backing = Backing::Heap;
        let err = floor_bus::Bus::open("cfg", &options).err().unwrap();
        assert!(matches!(err, floor_bus::BusError::Geometry { .. }));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"warn\"").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let cfg = FloorConfig::load(path).unwrap();
        assert_eq!(cfg.log_level, "warn");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = FloorConfig::load("/nonexistent/floor.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { ref path, .. } if path == "/nonexistent/floor.toml"));
    }
}
