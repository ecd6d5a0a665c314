use crate::core::{RecdbError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Drivers that can actually open a handle.
pub const SUPPORTED_DRIVERS: &[&str] = &["sqlite", "sqlite3"];

/// Top-level configuration structure parsed from a TOML file.
///
/// Each table under `[connections]` is one named configuration:
///
/// ```toml
/// [connections.default]
/// driver = "sqlite"
/// dbname = "app.db"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub connections: BTreeMap<String, DbConfig>,
}

/// Connection parameters for one named handle.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DbConfig {
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub dbname: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl DbConfig {
    /// Configuration for a SQLite database at `dbname` (`:memory:` works too).
    pub fn sqlite(dbname: impl Into<String>) -> Self {
        DbConfig {
            driver: "sqlite".to_string(),
            dbname: dbname.into(),
            ..Default::default()
        }
    }

    /// True when there is nothing to open a handle with.
    pub fn is_empty(&self) -> bool {
        self.driver.trim().is_empty() && self.dbname.trim().is_empty()
    }

    /// Assembles the driver connection string, e.g.
    /// `sqlite:host=localhost;port=3306;dbname=test`.
    pub fn dsn(&self) -> String {
        let port = self.port.map(|p| p.to_string()).unwrap_or_default();
        format!(
            "{}:host={};port={};dbname={}",
            self.driver, self.host, port, self.dbname
        )
    }

    /// Whether any network-only parameter is set. SQLite ignores them.
    pub fn has_network_params(&self) -> bool {
        !self.host.is_empty()
            || self.port.is_some()
            || !self.user.is_empty()
            || !self.password.is_empty()
    }

    /// Checks the driver name against the drivers this crate can open.
    ///
    /// Only SQLite is supported. A configuration naming any other driver,
    /// such as the `mysql` connection of a typical web application setup,
    /// is rejected here on purpose with `RecdbError::Config` rather than
    /// being opened as a local file. Its `dsn()` is still well formed.
    pub fn check_driver(&self) -> Result<()> {
        if SUPPORTED_DRIVERS.contains(&self.driver.as_str()) {
            Ok(())
        } else {
            Err(RecdbError::Config(format!(
                "unsupported driver \"{}\" (expected one of: {})",
                self.driver,
                SUPPORTED_DRIVERS.join(", ")
            )))
        }
    }
}

impl Config {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Config> {
        Ok(toml::from_str(content)?)
    }

    /// Looks up a named configuration.
    pub fn connection(&self, name: &str) -> Option<&DbConfig> {
        self.connections.get(name)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = recdb::config::load_config("recdb.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_CONFIG: &str = r#"
[connections.default]
driver = "sqlite"
dbname = ":memory:"

[connections.reporting]
driver = "mysql"
host = "localhost"
port = 3306
dbname = "test"
user = "u"
password = "p"
"#;

    #[test]
    fn test_load_config_from_str() {
        let config = Config::from_toml_str(SAMPLE_CONFIG).expect("Failed to parse sample config");
        assert_eq!(config.connections.len(), 2);

        let default = config.connection("default").unwrap();
        assert_eq!(default, &DbConfig::sqlite(":memory:"));

        let reporting = config.connection("reporting").unwrap();
        assert_eq!(reporting.port, Some(3306));
        assert_eq!(reporting.user, "u");
        assert_eq!(reporting.dsn(), "mysql:host=localhost;port=3306;dbname=test");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = Config::from_toml_str(
            r#"
[connections.default]
driver = "sqlite"
dbname = "x.db"
charset = "utf8"
"#,
        );
        assert!(matches!(result, Err(RecdbError::Toml(_))));
    }

    #[test]
    fn test_empty_and_driver_checks() {
        assert!(DbConfig::default().is_empty());
        assert!(!DbConfig::sqlite("a.db").is_empty());
        assert!(DbConfig::sqlite("a.db").check_driver().is_ok());

        let pg = DbConfig {
            driver: "pgsql".to_string(),
            dbname: "app".to_string(),
            ..Default::default()
        };
        match pg.check_driver() {
            Err(RecdbError::Config(msg)) => assert!(msg.contains("pgsql")),
            other => panic!("Expected Config error, got {:?}", other),
        }

        let mysql = DbConfig {
            driver: "mysql".to_string(),
            host: "localhost".to_string(),
            port: Some(3306),
            dbname: "test".to_string(),
            ..Default::default()
        };
        assert_eq!(mysql.dsn(), "mysql:host=localhost;port=3306;dbname=test");
        match mysql.check_driver() {
            Err(RecdbError::Config(msg)) => assert!(msg.contains("expected one of: sqlite, sqlite3")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(config.connection("reporting").is_some());

        assert!(matches!(
            load_config("/nonexistent/recdb.toml"),
            Err(RecdbError::Io(_))
        ));
    }
}
