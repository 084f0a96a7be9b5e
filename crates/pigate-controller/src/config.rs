//! Controller configuration.
//!
//! Sources, highest priority first:
//!
//! 1. `PIGATE_*` environment variables (`PIGATE_LOCATION_ID`,
//!    `PIGATE_DATABASE_PATH`, `PIGATE_GATE_OPEN_DURATION`, `PIGATE_LOG_LEVEL`)
//! 2. TOML file given with `-c/--config`
//! 3. Defaults
//!
//! ```toml
//! location_id = "building-7"
//! log_level = "info"
//!
//! [gate]
//! open_duration_secs = 30
//! relay_pin = 17
//! led_pin = 27
//!
//! [keypad]
//! mode = "nibble"          # nibble | fixed_width
//! input = "cdev"           # cdev | sysfs
//! gpio_chip = "/dev/gpiochip0"
//! d0_pin = 23
//! d1_pin = 24
//!
//! [storage]
//! backend = "sqlite"       # sqlite | memory
//! path = "/var/lib/pigate/pigate.db"
//!
//! [sync]
//! source = "snapshot"      # snapshot | feed | disabled
//! snapshot_dir = "/var/lib/pigate/objects"
//! ```

use pigate_core::constants::{
    DEFAULT_ACCESS_GROUP, DEFAULT_BADGE_FRAME_BITS, DEFAULT_BADGE_FRAME_TIMEOUT_MS,
    DEFAULT_BIT_QUEUE_CAPACITY, DEFAULT_D0_PIN, DEFAULT_D1_PIN, DEFAULT_GATE_OPEN_SECS,
    DEFAULT_INTER_KEY_TIMEOUT_MS, DEFAULT_KEY_FRAME_TIMEOUT_MS, DEFAULT_LED_PIN,
    DEFAULT_NETWORK_TIMEOUT_SECS, DEFAULT_RELAY_PIN, DEFAULT_SNAPSHOT_KEY,
    DEFAULT_STORE_TIMEOUT_SECS, DEFAULT_SYNC_COOLDOWN_SECS, DEFAULT_SYNC_INTERVAL_SECS,
};
use pigate_gate::GateConfig;
use pigate_hardware::cdev::DEFAULT_GPIO_CHIP;
use pigate_hardware::sysfs::{DEFAULT_POLL_INTERVAL, DEFAULT_SYSFS_ROOT};
use pigate_keypad::DecoderConfig;
use pigate_storage::DatabaseConfig;
use pigate_sync::SyncConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file {path} not readable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Scopes every messaging topic.
    pub location_id: String,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Replace GPIO with in-memory devices.
    pub mock_hardware: bool,
    /// Write a DENIED audit entry for refused codes.
    pub record_denied: bool,
    pub gate: GateSection,
    pub keypad: KeypadSection,
    pub storage: StorageSection,
    pub sync: SyncSection,
    pub messaging: MessagingSection,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            location_id: "default".to_string(),
            log_level: "info".to_string(),
            mock_hardware: false,
            record_denied: true,
            gate: GateSection::default(),
            keypad: KeypadSection::default(),
            storage: StorageSection::default(),
            sync: SyncSection::default(),
            messaging: MessagingSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateSection {
    pub open_duration_secs: u64,
    pub relay_pin: u32,
    /// Status LED mirroring the relay; omit for none.
    pub led_pin: Option<u32>,
    pub gpio_root: PathBuf,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            open_duration_secs: DEFAULT_GATE_OPEN_SECS,
            relay_pin: DEFAULT_RELAY_PIN,
            led_pin: Some(DEFAULT_LED_PIN),
            gpio_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypadMode {
    #[default]
    Nibble,
    FixedWidth,
}

/// Where keypad edges are read from on real hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypadInput {
    /// Kernel edge events from the GPIO character device.
    #[default]
    Cdev,
    /// Value files sampled under `gate.gpio_root`.
    Sysfs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeypadSection {
    pub mode: KeypadMode,
    pub input: KeypadInput,
    pub gpio_chip: PathBuf,
    /// Frame length in fixed-width mode.
    pub frame_bits: usize,
    pub d0_pin: u32,
    pub d1_pin: u32,
    pub key_frame_timeout_ms: u64,
    pub inter_key_timeout_ms: u64,
    pub frame_timeout_ms: u64,
    pub queue_capacity: usize,
    /// Sampling period of the sysfs input; 0 polls back to back.
    pub poll_interval_us: u64,
}

impl Default for KeypadSection {
    fn default() -> Self {
        Self {
            mode: KeypadMode::Nibble,
            input: KeypadInput::Cdev,
            gpio_chip: PathBuf::from(DEFAULT_GPIO_CHIP),
            frame_bits: DEFAULT_BADGE_FRAME_BITS,
            d0_pin: DEFAULT_D0_PIN,
            d1_pin: DEFAULT_D1_PIN,
            key_frame_timeout_ms: DEFAULT_KEY_FRAME_TIMEOUT_MS,
            inter_key_timeout_ms: DEFAULT_INTER_KEY_TIMEOUT_MS,
            frame_timeout_ms: DEFAULT_BADGE_FRAME_TIMEOUT_MS,
            queue_capacity: DEFAULT_BIT_QUEUE_CAPACITY,
            poll_interval_us: DEFAULT_POLL_INTERVAL.as_micros() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub backend: StorageBackend,
    pub path: String,
    pub max_connections: u32,
    pub store_timeout_secs: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        let database = DatabaseConfig::default();
        Self {
            backend: StorageBackend::Sqlite,
            path: database.database_path,
            max_connections: database.max_connections,
            store_timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSourceKind {
    /// JSON snapshot in an object directory.
    #[default]
    Snapshot,
    /// Tabular feed file read directly.
    Feed,
    /// No upstream; credentials are administered locally.
    #[serde(alias = "none")]
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    pub source: SyncSourceKind,
    pub interval_secs: u64,
    pub cooldown_secs: u64,
    pub timeout_secs: u64,
    pub snapshot_dir: PathBuf,
    pub snapshot_key: String,
    /// Feed file for `source = "feed"`; watched for changes.
    pub feed_path: Option<PathBuf>,
    /// Drop directory for new feed files, published as snapshots.
    pub drop_dir: Option<PathBuf>,
    pub access_group: i64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            source: SyncSourceKind::Snapshot,
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            cooldown_secs: DEFAULT_SYNC_COOLDOWN_SECS,
            timeout_secs: DEFAULT_NETWORK_TIMEOUT_SECS,
            snapshot_dir: PathBuf::from("objects"),
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
            feed_path: None,
            drop_dir: None,
            access_group: DEFAULT_ACCESS_GROUP,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessagingSection {
    pub client_id_prefix: String,
    pub timeout_secs: u64,
}

impl Default for MessagingSection {
    fn default() -> Self {
        Self {
            client_id_prefix: "gatecontroller".to_string(),
            timeout_secs: DEFAULT_NETWORK_TIMEOUT_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load from `path` (defaults when `None`), apply environment
    /// overrides, validate.
    ///
    /// # Errors
    ///
    /// `ConfigError::Io` when the file cannot be read, `ConfigError::Parse`
    /// for malformed TOML or unknown keys, `ConfigError::Invalid` when
    /// validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading controller config");
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&contents)?
            }
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `PIGATE_*` overrides read through `lookup`. Unparseable values
    /// are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(location_id) = lookup("PIGATE_LOCATION_ID") {
            debug!(location_id = %location_id, "Overriding location from environment");
            self.location_id = location_id;
        }

        if let Some(path) = lookup("PIGATE_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.path = path;
        }

        if let Some(duration) = lookup("PIGATE_GATE_OPEN_DURATION") {
            match duration.trim().parse::<u64>() {
                Ok(secs) => self.gate.open_duration_secs = secs,
                Err(_) => warn!(value = %duration, "Ignoring invalid PIGATE_GATE_OPEN_DURATION"),
            }
        }

        if let Some(level) = lookup("PIGATE_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

        if self.location_id.trim().is_empty() {
            return invalid("location_id must not be empty");
        }
        if self.location_id.contains(['/', '+', '#']) {
            return invalid("location_id must not contain '/', '+' or '#'");
        }
        if self.gate.open_duration_secs == 0 {
            return invalid("gate.open_duration_secs must be positive");
        }
        if self.gate.led_pin == Some(self.gate.relay_pin) {
            return invalid("gate.led_pin must differ from gate.relay_pin");
        }
        if self.keypad.d0_pin == self.keypad.d1_pin {
            return invalid("keypad.d0_pin and keypad.d1_pin must differ");
        }
        if self.sync.interval_secs == 0 {
            return invalid("sync.interval_secs must be positive");
        }
        if self.sync.source == SyncSourceKind::Feed && self.sync.feed_path.is_none() {
            return invalid("sync.feed_path is required when sync.source = \"feed\"");
        }
        if self.storage.backend == StorageBackend::Sqlite && self.storage.path.trim().is_empty() {
            return invalid("storage.path must not be empty");
        }

        self.decoder_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("keypad: {e}")))
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        let keypad = &self.keypad;
        let base = match keypad.mode {
            KeypadMode::Nibble => DecoderConfig::nibble(),
            KeypadMode::FixedWidth => DecoderConfig::fixed_width(keypad.frame_bits),
        };
        base.key_frame_timeout(Duration::from_millis(keypad.key_frame_timeout_ms))
            .inter_key_timeout(Duration::from_millis(keypad.inter_key_timeout_ms))
            .frame_timeout(Duration::from_millis(keypad.frame_timeout_ms))
            .queue_capacity(keypad.queue_capacity)
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig::new(Duration::from_secs(self.gate.open_duration_secs))
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.storage.path.clone()).max_connections(self.storage.max_connections)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .interval(Duration::from_secs(self.sync.interval_secs))
            .cooldown(Duration::from_secs(self.sync.cooldown_secs))
            .fetch_timeout(Duration::from_secs(self.sync.timeout_secs))
            .store_timeout(self.store_timeout())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.store_timeout_secs)
    }

    pub fn messaging_timeout(&self) -> Duration {
        Duration::from_secs(self.messaging.timeout_secs)
    }

    pub fn keypad_poll_interval(&self) -> Duration {
        Duration::from_micros(self.keypad.poll_interval_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pigate_keypad::DecoderMode;
    use rstest::rstest;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ControllerConfig::default();
        config.validate().unwrap();

        assert_eq!(config.gate.relay_pin, 17);
        assert_eq!(config.gate.led_pin, Some(27));
        assert_eq!(config.gate_config().open_duration, Duration::from_secs(30));
        assert_eq!(config.sync_config().interval, Duration::from_secs(86_400));
        assert!(config.record_denied);
        assert_eq!(config.keypad.input, KeypadInput::Cdev);
        assert_eq!(config.keypad.gpio_chip, PathBuf::from("/dev/gpiochip0"));
    }

    #[test]
    fn test_full_file() {
        let config = ControllerConfig::from_toml(
            r#"
            location_id = "building-7"
            log_level = "debug"
            record_denied = false

            [gate]
            open_duration_secs = 10
            relay_pin = 5
            led_pin = 6

            [keypad]
            mode = "fixed_width"
            frame_bits = 34
            input = "sysfs"
            poll_interval_us = 0

            [storage]
            backend = "memory"

            [sync]
            source = "feed"
            feed_path = "/srv/feed/residents.txt"
            cooldown_secs = 2
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.location_id, "building-7");
        assert!(!config.record_denied);
        assert_eq!(config.gate.led_pin, Some(6));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.sync.source, SyncSourceKind::Feed);
        assert_eq!(config.decoder_config().mode, DecoderMode::FixedWidth { bits: 34 });
        assert_eq!(config.keypad.input, KeypadInput::Sysfs);
        assert_eq!(config.keypad_poll_interval(), Duration::ZERO);
        assert_eq!(config.sync_config().cooldown, Duration::from_secs(2));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = ControllerConfig::from_toml("[gate]\nopen_secs = 5\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_none_alias_for_disabled_sync() {
        let config = ControllerConfig::from_toml("[sync]\nsource = \"none\"\n").unwrap();
        assert_eq!(config.sync.source, SyncSourceKind::Disabled);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PIGATE_LOCATION_ID", "loc-9"),
            ("PIGATE_DATABASE_PATH", "/tmp/gate.db"),
            ("PIGATE_GATE_OPEN_DURATION", "12"),
            ("PIGATE_LOG_LEVEL", "warn"),
        ]);
        let mut config = ControllerConfig::default();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.location_id, "loc-9");
        assert_eq!(config.storage.path, "/tmp/gate.db");
        assert_eq!(config.gate.open_duration_secs, 12);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_invalid_env_duration_ignored() {
        let mut config = ControllerConfig::default();
        config.apply_overrides(|key| {
            (key == "PIGATE_GATE_OPEN_DURATION").then(|| "soon".to_string())
        });
        assert_eq!(config.gate.open_duration_secs, 30);
    }

    #[rstest]
    #[case("location_id = \"\"")]
    #[case("location_id = \"a/b\"")]
    #[case("[gate]\nopen_duration_secs = 0")]
    #[case("[gate]\nrelay_pin = 4\nled_pin = 4")]
    #[case("[keypad]\nd0_pin = 3\nd1_pin = 3")]
    #[case("[keypad]\nmode = \"fixed_width\"\nframe_bits = 2")]
    #[case("[sync]\nsource = \"feed\"")]
    #[case("[sync]\ninterval_secs = 0")]
    fn test_validation_failures(#[case] contents: &str) {
        let config = ControllerConfig::from_toml(contents).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ControllerConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
