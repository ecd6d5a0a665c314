/// # Test Utilities Module
///
/// Fixtures shared by the unit tests: isolated in-memory handles, a
/// sample schema and a tracing subscriber that writes through the test
/// harness.

use crate::config::DbConfig;
use crate::core::db::{Db, Registry};
use crate::core::Result;
use std::rc::Rc;

/// Installs a fmt subscriber once per test binary. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// A fresh in-memory handle owned by its own registry.
///
/// The returned `Rc` keeps the handle alive after the registry is dropped.
pub fn memory_db(name: &str) -> Rc<Db> {
    init_tracing();
    Registry::new()
        .create(name, Some(&DbConfig::sqlite(":memory:")), None)
        .expect("in-memory database should open")
}

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub registry: Registry,
    pub db: Rc<Db>,
}

impl DatabaseFixture {
    /// Create a new empty in-memory database registered as `name`
    pub fn new(name: &str) -> Result<Self> {
        init_tracing();
        let registry = Registry::new();
        let db = registry.create(name, Some(&DbConfig::sqlite(":memory:")), None)?;
        Ok(DatabaseFixture { registry, db })
    }

    /// Create fixture with the sample schema and rows.
    ///
    /// Setup runs directly on the connection so the statement cache starts empty.
    pub fn with_sample_data(name: &str) -> Result<Self> {
        let fixture = Self::new(name)?;
        fixture.db.conn.execute_batch(
            "
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE
            );

            CREATE TABLE groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE memberships (
                user_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                PRIMARY KEY (user_id, group_id),
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
                FOREIGN KEY (group_id) REFERENCES groups (id) ON DELETE CASCADE
            );

            INSERT INTO users (name, email) VALUES ('Ann', 'ann@x.com');
            INSERT INTO users (name, email) VALUES ('Bo', 'bo@x.com');
            INSERT INTO users (name, email) VALUES ('Cy', 'cy@x.com');
            INSERT INTO groups (name) VALUES ('admins');
            INSERT INTO memberships (user_id, group_id, role) VALUES (1, 1, 'member');
            INSERT INTO memberships (user_id, group_id, role) VALUES (2, 1, 'member');
        ",
        )?;
        Ok(fixture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_isolation() {
        let a = DatabaseFixture::with_sample_data("a").unwrap();
        let b = DatabaseFixture::new("a").unwrap();

        assert!(!Rc::ptr_eq(&a.db, &b.db));
        assert_eq!(a.registry.names(), vec!["a".to_string()]);
        assert_eq!(a.db.statement_count(), 0);
        assert!(b
            .db
            .get_row("SELECT * FROM users", &[])
            .is_err());
    }
}
