//! Reservation tuning loaded from TOML
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_hold_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_max_seats_per_hold() -> u32 {
    10
}

fn default_code_attempts() -> u32 {
    8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// How long an unconfirmed hold owns its inventory
    #[serde(default = "default_hold_ttl_secs")]
    pub hold_ttl_secs: u64,
    /// Period of the background expiry sweep
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Largest number of seats (or admissions) one hold may cover
    #[serde(default = "default_max_seats_per_hold")]
    pub max_seats_per_hold: u32,
    /// Retries when a freshly generated ticket code collides
    #[serde(default = "default_code_attempts")]
    pub code_attempts: u32,
    /// SQLite file; the host picks a platform default when absent
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            hold_ttl_secs: default_hold_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_seats_per_hold: default_max_seats_per_hold(),
            code_attempts: default_code_attempts(),
            database_path: None,
        }
    }
}

impl ReservationConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ReservationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hold_ttl_secs == 0 {
            return Err(Error::Config("hold_ttl_secs must be positive".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep_interval_secs must be positive".into()));
        }
        if self.max_seats_per_hold == 0 {
            return Err(Error::Config("max_seats_per_hold must be positive".into()));
        }
        if self.code_attempts == 0 {
            return Err(Error::Config("code_attempts must be positive".into()));
        }
        Ok(())
    }

    pub fn hold_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hold_ttl_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
