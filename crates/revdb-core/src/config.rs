//! Database configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File extension of a database's storage path
pub const DB_EXTENSION: &str = "revdb";

/// Configuration for opening a database
///
/// A database keeps a read-only copy of the configuration it was opened
/// with; mutating that copy is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    directory: PathBuf,
    #[serde(skip)]
    read_only: bool,
}

impl DatabaseConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        validate_directory(&directory)?;
        Ok(Self {
            directory,
            read_only: false,
        })
    }

    /// Parse a configuration from TOML, e.g. `directory = "/var/lib/app"`
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: DatabaseConfig =
            toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        validate_directory(&config.directory)?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) -> Result<&mut Self> {
        if self.read_only {
            return Err(Error::IllegalState(
                "configuration of an open database is read-only".into(),
            ));
        }
        let directory = directory.into();
        validate_directory(&directory)?;
        self.directory = directory;
        Ok(self)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn read_only_copy(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            read_only: true,
        }
    }

    /// Storage path of the database called `name`
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", name, DB_EXTENSION))
    }
}

fn validate_directory(directory: &Path) -> Result<()> {
    if directory.as_os_str().is_empty() {
        return Err(Error::InvalidArgument("directory cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_directory_rejected() {
        assert!(matches!(
            DatabaseConfig::new(""),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_read_only_copy() {
        let mut config = DatabaseConfig::new("/tmp/a").unwrap();
        config.set_directory("/tmp/b").unwrap();

        let mut frozen = config.read_only_copy();
        assert!(frozen.is_read_only());
        assert_eq!(frozen.directory(), Path::new("/tmp/b"));
        assert!(matches!(
            frozen.set_directory("/tmp/c"),
            Err(Error::IllegalState(_))
        ));
    }

    #[test]
    fn test_database_path() {
        let config = DatabaseConfig::new("/data").unwrap();
        assert_eq!(
            config.database_path("inventory"),
            PathBuf::from("/data/inventory.revdb")
        );
    }

    #[test]
    fn test_from_toml() {
        let config = DatabaseConfig::from_toml_str(r#"directory = "/srv/revdb""#).unwrap();
        assert_eq!(config.directory(), Path::new("/srv/revdb"));
        assert!(!config.is_read_only());

        assert!(matches!(
            DatabaseConfig::from_toml_str("directory = 3"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DatabaseConfig::from_toml_str(r#"directory = """#),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"directory = "/var/lib/revdb""#).unwrap();

        let config = DatabaseConfig::load(file.path()).unwrap();
        assert_eq!(config.directory(), Path::new("/var/lib/revdb"));
    }
}
