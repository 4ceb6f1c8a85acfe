//! Service configuration
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. an optional TOML file (`parking.toml`, or the path in `PARKING_CONFIG`)
//! 3. environment variables prefixed with `PARKING__`, e.g.
//!    `PARKING__RATE_PER_HOUR=30`

use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;

use crate::billing::DEFAULT_RATE_PER_HOUR;
use crate::error::{ParkingError, ParkingResult};
use crate::service::ServiceSettings;

const DEFAULT_CONFIG_FILE: &str = "parking";

/// Which store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// Slot counts for one level, created at start-up on an empty store
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LevelLayout {
    pub level_number: i32,
    #[serde(default)]
    pub two_wheeler: u32,
    #[serde(default)]
    pub four_wheeler: u32,
    #[serde(default)]
    pub heavy_load: u32,
}

impl LevelLayout {
    pub fn total(&self) -> u32 {
        self.two_wheeler + self.four_wheeler + self.heavy_load
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParkingConfig {
    /// Address the HTTP server binds to
    pub listen_addr: String,
    /// Currency units charged per billable hour
    pub rate_per_hour: i64,
    /// Let vehicles park again before paying their last stay
    pub allow_parking_with_unpaid: bool,
    pub storage: StorageBackend,
    /// TTL of the cached availability snapshot when Redis is configured
    pub snapshot_cache_ttl_seconds: u64,
    #[serde(default)]
    pub layout: Vec<LevelLayout>,
}

impl ParkingConfig {
    /// Load from `PARKING_CONFIG` (or `parking.toml`) and the environment
    pub fn load() -> ParkingResult<Self> {
        let path =
            std::env::var("PARKING_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load with an explicit file path; a missing file is not an error
    pub fn load_from(path: &str) -> ParkingResult<Self> {
        let settings = Config::builder()
            .set_default("listen_addr", "0.0.0.0:3002")?
            .set_default("rate_per_hour", DEFAULT_RATE_PER_HOUR)?
            .set_default("allow_parking_with_unpaid", false)?
            .set_default("storage", "memory")?
            .set_default("snapshot_cache_ttl_seconds", 5)?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("PARKING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ParkingConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ParkingResult<()> {
        if self.rate_per_hour <= 0 {
            return Err(ParkingError::Configuration(format!(
                "rate_per_hour must be positive, got {}",
                self.rate_per_hour
            )));
        }

        let mut seen = HashSet::new();
        for level in &self.layout {
            if !seen.insert(level.level_number) {
                return Err(ParkingError::Configuration(format!(
                    "Level {} appears more than once in the layout",
                    level.level_number
                )));
            }
        }

        Ok(())
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            rate_per_hour: self.rate_per_hour,
            allow_parking_with_unpaid: self.allow_parking_with_unpaid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_KEYS: [&str; 4] = [
        "PARKING__RATE_PER_HOUR",
        "PARKING__STORAGE",
        "PARKING__ALLOW_PARKING_WITH_UNPAID",
        "PARKING__LISTEN_ADDR",
    ];

    fn clear_env() {
        unsafe {
            for key in ENV_KEYS {
                std::env::remove_var(key);
            }
        }
    }

    fn missing_file() -> String {
        std::env::temp_dir()
            .join("parking-config-that-does-not-exist")
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    #[serial]
    fn test_defaults_without_file() {
        clear_env();

        let config = ParkingConfig::load_from(&missing_file()).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3002");
        assert_eq!(config.rate_per_hour, 20);
        assert!(!config.allow_parking_with_unpaid);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.snapshot_cache_ttl_seconds, 5);
        assert!(config.layout.is_empty());
    }

    #[test]
    #[serial]
    fn test_file_layout_and_env_override() {
        clear_env();

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
rate_per_hour = 25
storage = "postgres"

[[layout]]
level_number = 0
two_wheeler = 4
four_wheeler = 10

[[layout]]
level_number = 1
heavy_load = 2
"#
        )
        .unwrap();

        unsafe {
            std::env::set_var("PARKING__RATE_PER_HOUR", "30");
            std::env::set_var("PARKING__ALLOW_PARKING_WITH_UNPAID", "true");
        }

        let path = file.path().to_string_lossy().into_owned();
        let config = ParkingConfig::load_from(&path).unwrap();

        assert_eq!(config.rate_per_hour, 30);
        assert!(config.allow_parking_with_unpaid);
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.layout.len(), 2);
        assert_eq!(config.layout[0].total(), 14);
        assert_eq!(config.layout[1].heavy_load, 2);
        assert_eq!(config.layout[1].two_wheeler, 0);

        let settings = config.service_settings();
        assert_eq!(settings.rate_per_hour, 30);
        assert!(settings.allow_parking_with_unpaid);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_rejects_non_positive_rate() {
        clear_env();
        unsafe {
            std::env::set_var("PARKING__RATE_PER_HOUR", "0");
        }

        let result = ParkingConfig::load_from(&missing_file());
        assert!(matches!(result, Err(ParkingError::Configuration(_))));

        clear_env();
    }

    #[test]
    fn test_rejects_duplicate_levels() {
        let config = ParkingConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            rate_per_hour: 20,
            allow_parking_with_unpaid: false,
            storage: StorageBackend::Memory,
            snapshot_cache_ttl_seconds: 5,
            layout: vec![
                LevelLayout {
                    level_number: 1,
                    two_wheeler: 1,
                    four_wheeler: 0,
                    heavy_load: 0,
                },
                LevelLayout {
                    level_number: 1,
                    two_wheeler: 0,
                    four_wheeler: 1,
                    heavy_load: 0,
                },
            ],
        };

        assert!(matches!(
            config.validate(),
            Err(ParkingError::Configuration(_))
        ));
    }
}
