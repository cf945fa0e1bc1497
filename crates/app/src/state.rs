//! Process state: data directory, configuration and the open box office

use std::path::{Path, PathBuf};

use boxoffice_core::{BoxOffice, Database, Error, ReservationConfig, Result};
use directories::ProjectDirs;
use tracing::info;

const CONFIG_FILE: &str = "boxoffice.toml";
const DATABASE_FILE: &str = "boxoffice.db";

pub struct AppState {
    pub office: BoxOffice,
    data_dir: PathBuf,
}

impl AppState {
    /// Open using the platform data directory
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        Self::open(&Self::data_path()?, config_path.as_deref())
    }

    /// Open rooted at `data_dir`. An explicit config file must exist; the
    /// default one in `data_dir` is optional.
    pub fn open(data_dir: &Path, config_path: Option<&Path>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let config = match config_path {
            Some(path) => ReservationConfig::load(path)?,
            None => {
                let default_path = data_dir.join(CONFIG_FILE);
                if default_path.exists() {
                    ReservationConfig::load(&default_path)?
                } else {
                    ReservationConfig::default()
                }
            }
        };

        let db_path = config
            .database_path
            .clone()
            .unwrap_or_else(|| data_dir.join(DATABASE_FILE));

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        let schema_version = db.schema_version()?;
        info!(
            path = %db_path.display(),
            schema_version,
            hold_ttl_secs = config.hold_ttl_secs,
            "Database ready"
        );

        Ok(Self {
            office: BoxOffice::new(db, config)?,
            data_dir: data_dir.to_path_buf(),
        })
    }

    fn data_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "onyx", "boxoffice").ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine data directory",
            ))
        })?;

        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
