//! Data source configuration.
//!
//! [`DataSourceOptions`] is YAML-serializable so an application can keep its
//! database settings next to the rest of its configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! database: app.db
//! synchronize: true
//! logging: false
//! foreign_keys: true
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Path used for a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

fn default_true() -> bool {
    true
}

/// Settings for opening a [`DataSource`](crate::DataSource).
///
/// # Examples
///
/// ```
/// use relata_sqlite::DataSourceOptions;
///
/// let options = DataSourceOptions::in_memory().with_synchronize(true);
/// assert!(options.is_in_memory());
/// assert!(options.synchronize);
/// assert!(options.foreign_keys);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceOptions {
    /// Database file path, or `":memory:"`.
    pub database: PathBuf,
    /// Create missing tables, indices and junctions on initialize.
    #[serde(default)]
    pub synchronize: bool,
    /// Log every statement at `info` instead of `debug`.
    #[serde(default)]
    pub logging: bool,
    /// Issue `PRAGMA foreign_keys = ON` on initialize.
    #[serde(default = "default_true")]
    pub foreign_keys: bool,
}

impl Default for DataSourceOptions {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl DataSourceOptions {
    pub fn in_memory() -> Self {
        Self::file(IN_MEMORY)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            database: path.into(),
            synchronize: false,
            logging: false,
            foreign_keys: true,
        }
    }

    pub fn with_synchronize(mut self, synchronize: bool) -> Self {
        self.synchronize = synchronize;
        self
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_foreign_keys(mut self, foreign_keys: bool) -> Self {
        self.foreign_keys = foreign_keys;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database.as_os_str() == IN_MEMORY
    }

    /// Loads options from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::OrmError::Io) if the file cannot be read, or
    /// [`Config`](crate::OrmError::Config) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let options = serde_yaml::from_reader(reader)?;
        Ok(options)
    }

    /// Saves the options as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_complete() {
        let yaml = r#"
database: data/app.db
synchronize: true
logging: true
foreign_keys: false
"#;
        let options: DataSourceOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.database, PathBuf::from("data/app.db"));
        assert!(options.synchronize);
        assert!(options.logging);
        assert!(!options.foreign_keys);
    }

    #[test]
    fn test_deserialize_minimal_uses_defaults() {
        let options: DataSourceOptions = serde_yaml::from_str("database: \":memory:\"\n").unwrap();
        assert!(options.is_in_memory());
        assert!(!options.synchronize);
        assert!(!options.logging);
        assert!(options.foreign_keys);
    }

    #[test]
    fn test_missing_database_is_an_error() {
        assert!(serde_yaml::from_str::<DataSourceOptions>("logging: true\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasource.yml");
        let options = DataSourceOptions::file("app.db")
            .with_synchronize(true)
            .with_logging(true);
        options.save(&path).unwrap();
        assert_eq!(DataSourceOptions::load(&path).unwrap(), options);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DataSourceOptions::load(dir.path().join("absent.yml")).unwrap_err();
        assert!(matches!(err, crate::OrmError::Io(_)));
    }
}
