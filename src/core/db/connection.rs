/// Connection Management Module
///
/// This module owns the named database handles. A `Registry` is created
/// explicitly and passed to whoever needs a handle; it opens each handle
/// lazily from configuration on first request and hands back the same
/// `Rc<Db>` on every later request for that name.

use crate::config::{Config, DbConfig};
use crate::core::db::query::PreparedStatement;
use crate::core::{RecdbError, Result};
use rusqlite::Connection;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Name of the handle entities fall back to when none is supplied.
pub const DEFAULT_NAME: &str = "default";

/// A live database handle plus its statement cache.
///
/// Only positional, parameterized execution is exposed; the underlying
/// connection never leaves the handle.
pub struct Db {
    name: String,
    config: Option<DbConfig>,
    pub(crate) conn: Connection,
    pub(crate) stmts: RefCell<HashMap<String, Rc<PreparedStatement>>>,
}

impl Db {
    fn new(name: &str, config: Option<DbConfig>, conn: Connection) -> Self {
        Db {
            name: name.to_string(),
            config,
            conn,
            stmts: RefCell::new(HashMap::new()),
        }
    }

    /// Name this handle was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the handle was opened with, `None` for adopted connections.
    pub fn config(&self) -> Option<&DbConfig> {
        self.config.as_ref()
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("name", &self.name)
            .field("dsn", &self.config.as_ref().map(DbConfig::dsn))
            .field("statements", &self.stmts.borrow().len())
            .finish()
    }
}

/// Opens a handle from configuration.
fn open(config: &DbConfig) -> Result<Connection> {
    config.check_driver()?;
    if config.dbname.trim().is_empty() {
        return Err(RecdbError::Config(format!(
            "no dbname in configuration \"{}\"",
            config.dsn()
        )));
    }
    if config.has_network_params() {
        warn!("SQLite ignores host, port, user and password ({})", config.dsn());
    }

    let conn = Connection::open(&config.dbname)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Owner of every named handle.
///
/// The registry is `!Send` and `!Sync`: handles and their statement caches
/// are plain unsynchronized state, usable from the thread that built them.
#[derive(Debug, Default)]
pub struct Registry {
    config: Config,
    dbs: RefCell<HashMap<String, Rc<Db>>>,
}

impl Registry {
    /// Creates an empty registry. Every name needs explicit configuration
    /// or an explicit connection on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with named configurations.
    pub fn with_config(config: Config) -> Self {
        Registry {
            config,
            dbs: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the handle registered under `name`, creating it if needed.
    ///
    /// An existing handle is returned as-is and the other arguments are
    /// ignored. Otherwise `handle` is adopted when given; failing that the
    /// explicit `config` (or the seeded configuration for `name`) is opened.
    ///
    /// # Errors
    ///
    /// `RecdbError::Config` when there is neither a connection nor a
    /// non-empty configuration, or the driver is not supported.
    /// `RecdbError::Database` when SQLite fails to open the database.
    pub fn create(
        &self,
        name: &str,
        config: Option<&DbConfig>,
        handle: Option<Connection>,
    ) -> Result<Rc<Db>> {
        if let Some(db) = self.get(name) {
            return Ok(db);
        }

        let db = match handle {
            Some(conn) => {
                debug!("Adopting connection as \"{}\"", name);
                Db::new(name, config.cloned(), conn)
            }
            None => {
                let config = config
                    .or_else(|| self.config.connection(name))
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        RecdbError::Config(format!(
                            "Configuration options not set when creating handle \"{}\"",
                            name
                        ))
                    })?;
                debug!("Opening \"{}\" ({})", name, config.dsn());
                Db::new(name, Some(config.clone()), open(config)?)
            }
        };

        let db = Rc::new(db);
        self.dbs
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&db));
        Ok(db)
    }

    /// Returns an already created handle.
    pub fn get(&self, name: &str) -> Option<Rc<Db>> {
        self.dbs.borrow().get(name).cloned()
    }

    /// Names of all created handles, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dbs.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// The `default` handle, opened from seeded configuration on first use.
    pub fn default_db(&self) -> Result<Rc<Db>> {
        self.create(DEFAULT_NAME, None, None)
    }

    /// The supplied handle, or the `default` one when none is supplied.
    pub fn resolve(&self, db: Option<Rc<Db>>) -> Result<Rc<Db>> {
        match db {
            Some(db) => Ok(db),
            None => self.default_db(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_tracing;

    #[test]
    fn test_unseen_name_without_config_fails() {
        init_tracing();
        let registry = Registry::new();

        match registry.create("default", None, None) {
            Err(RecdbError::Config(msg)) => assert!(msg.contains("\"default\"")),
            other => panic!("Expected Config error, got {:?}", other),
        }

        let empty = DbConfig::default();
        assert!(matches!(
            registry.create("default", Some(&empty), None),
            Err(RecdbError::Config(_))
        ));
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_create_returns_cached_handle() {
        let registry = Registry::new();
        let first = registry
            .create("main", Some(&DbConfig::sqlite(":memory:")), None)
            .unwrap();

        // Arguments are ignored once the name is known
        let second = registry.create("main", None, None).unwrap();
        let third = registry
            .create("main", Some(&DbConfig::default()), Some(Connection::open_in_memory().unwrap()))
            .unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert!(Rc::ptr_eq(&first, &third));
        assert_eq!(registry.names(), vec!["main".to_string()]);
    }

    #[test]
    fn test_adopt_explicit_connection() {
        let registry = Registry::new();
        let conn = Connection::open_in_memory().unwrap();
        let db = registry.create("adopted", None, Some(conn)).unwrap();

        assert_eq!(db.name(), "adopted");
        assert!(db.config().is_none());
        assert!(Rc::ptr_eq(&db, &registry.get("adopted").unwrap()));
    }

    #[test]
    fn test_unsupported_driver() {
        let registry = Registry::new();
        let config = DbConfig {
            driver: "mysql".to_string(),
            host: "localhost".to_string(),
            port: Some(3306),
            dbname: "test".to_string(),
            user: "u".to_string(),
            password: "p".to_string(),
        };

        match registry.create("default", Some(&config), None) {
            Err(RecdbError::Config(msg)) => assert!(msg.contains("mysql")),
            other => panic!("Expected Config error, got {:?}", other),
        }
        assert!(registry.get("default").is_none());
    }

    #[test]
    fn test_open_failure_is_a_driver_error() {
        let registry = Registry::new();
        let config = DbConfig::sqlite("/nonexistent/path/database.db");

        match registry.create("broken", Some(&config), None) {
            Err(RecdbError::Database(_)) => {}
            other => panic!("Expected Database error, got {:?}", other),
        }
    }

    #[test]
    fn test_seeded_config_and_default() {
        let config = Config::from_toml_str(
            r#"
[connections.default]
driver = "sqlite"
dbname = ":memory:"
"#,
        )
        .unwrap();
        let registry = Registry::with_config(config);

        let db = registry.default_db().unwrap();
        assert_eq!(db.name(), DEFAULT_NAME);
        assert_eq!(db.config(), Some(&DbConfig::sqlite(":memory:")));

        let resolved = registry.resolve(None).unwrap();
        assert!(Rc::ptr_eq(&db, &resolved));

        let other = registry
            .create("other", Some(&DbConfig::sqlite(":memory:")), None)
            .unwrap();
        let resolved = registry.resolve(Some(Rc::clone(&other))).unwrap();
        assert!(Rc::ptr_eq(&other, &resolved));
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let registry = Registry::new();
        let db = registry
            .create("fk", Some(&DbConfig::sqlite(":memory:")), None)
            .unwrap();
        let enabled: i64 = db
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
