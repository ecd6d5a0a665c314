//! Entity Module
//!
//! Record types that map onto one table row. A type implements [`Entity`]
//! by declaring its table, its key columns and the columns it writes on
//! insert and on update, plus a `store` routine that picks insert or
//! update. Loading, validation-before-store and statement generation come
//! with the trait.
//!
//! Entities are (de)serialized through `serde`. Rows hydrate through the
//! row codec, so what `insert`/`update` bind is what `load` reads back:
//! `bool` as 0/1, `Vec<u8>` as a BLOB, other collections and nested
//! structs as JSON text. Caller data arrives as a JSON mapping. Types should carry
//! `#[serde(deny_unknown_fields)]` so unexpected attribute names are
//! rejected instead of dropped.
//!
//! ```
//! use recdb::entity::Entity;
//! use recdb::{Db, Result};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! #[serde(deny_unknown_fields)]
//! struct User {
//!     #[serde(default, skip_serializing_if = "Option::is_none")]
//!     id: Option<i64>,
//!     name: String,
//!     email: String,
//! }
//!
//! impl Entity for User {
//!     const TABLE: &'static str = "users";
//!     const KEYS: &'static [&'static str] = &["id"];
//!     const INSERT_ATTRS: &'static [&'static str] = &["name", "email"];
//!     const UPDATE_ATTRS: &'static [&'static str] = &["name", "email"];
//!
//!     fn store(&mut self, db: &Db) -> Result<()> {
//!         if self.id.is_some() {
//!             self.update(db)?;
//!         } else {
//!             self.insert(db)?;
//!             self.id = Some(db.last_id());
//!         }
//!         Ok(())
//!     }
//! }
//! ```

pub mod sql;

use crate::core::db::{from_row, to_params, Attributes, Db, Registry};
use crate::core::{RecdbError, Result};
use rusqlite::types::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use tracing::debug;

/// Identifier(s) of one row, one value per declared key column.
#[derive(Debug, Clone, PartialEq)]
pub struct Key(Vec<Value>);

impl Key {
    /// A key built from values given in declared key-column order.
    pub fn composite<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Key(values.into_iter().map(Into::into).collect())
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key(vec![value])
    }
}

impl From<i64> for Key {
    fn from(id: i64) -> Self {
        Key(vec![Value::Integer(id)])
    }
}

impl From<i32> for Key {
    fn from(id: i32) -> Self {
        Key(vec![Value::Integer(i64::from(id))])
    }
}

impl From<&str> for Key {
    fn from(id: &str) -> Self {
        Key(vec![Value::Text(id.to_string())])
    }
}

impl From<String> for Key {
    fn from(id: String) -> Self {
        Key(vec![Value::Text(id)])
    }
}

impl From<Vec<Value>> for Key {
    fn from(values: Vec<Value>) -> Self {
        Key(values)
    }
}

impl<const N: usize> From<[Value; N]> for Key {
    fn from(values: [Value; N]) -> Self {
        Key(values.into())
    }
}

fn declared_table<E: Entity>() -> Result<&'static str> {
    if E::TABLE.trim().is_empty() {
        return Err(RecdbError::Config(format!(
            "{} declares an empty table name",
            std::any::type_name::<E>()
        )));
    }
    Ok(E::TABLE)
}

fn declared<E: Entity>(what: &str, names: &'static [&'static str]) -> Result<&'static [&'static str]> {
    if names.is_empty() {
        return Err(RecdbError::Config(format!(
            "entity for table \"{}\" declares no {}",
            E::TABLE,
            what
        )));
    }
    Ok(names)
}

fn param<'a>(params: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    params.iter().find(|(field, _)| field == name).map(|(_, value)| value)
}

/// Binds the named attributes in order. Absent attributes bind NULL.
fn bind(params: &[(String, Value)], names: &[&str]) -> Vec<Value> {
    names
        .iter()
        .map(|name| param(params, name).cloned().unwrap_or(Value::Null))
        .collect()
}

/// A record type persisted in one table.
pub trait Entity: Serialize + DeserializeOwned {
    /// Table holding the records.
    const TABLE: &'static str;
    /// Columns identifying one row, in the order key values are bound.
    const KEYS: &'static [&'static str];
    /// Attributes written by [`Entity::insert`], in column order.
    const INSERT_ATTRS: &'static [&'static str];
    /// Attributes written by [`Entity::update`], in column order.
    const UPDATE_ATTRS: &'static [&'static str];

    /// Writes the entity, choosing between insert and update.
    fn store(&mut self, db: &Db) -> Result<()>;

    /// Checks the entity before it is stored. Accepts everything unless
    /// overridden; return `RecdbError::Validation` to reject.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Validates, then stores. Nothing is written when validation fails.
    fn save(&mut self, db: &Db) -> Result<()> {
        self.validate()?;
        self.store(db)
    }

    /// Builds an entity from a data mapping.
    ///
    /// # Errors
    ///
    /// `RecdbError::Attribute` for unknown names, missing required
    /// attributes or values of the wrong type.
    fn from_attributes(data: Attributes) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(data))
            .map_err(|e| RecdbError::Attribute(format!("{}: {}", Self::TABLE, e)))
    }

    /// The entity's current attributes as a data mapping.
    fn attributes(&self) -> Result<Attributes> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(attrs) => Ok(attrs),
            other => Err(RecdbError::Attribute(format!(
                "{} does not serialize to a mapping: {}",
                Self::TABLE,
                other
            ))),
        }
    }

    /// Loads the row matching `key`, or `None` when no row matches.
    ///
    /// A composite key consumes one value per declared key column, in
    /// declared order.
    ///
    /// # Errors
    ///
    /// `RecdbError::Key` when the number of key values differs from the
    /// number of key columns. Hydration and driver errors propagate.
    fn load(db: &Db, key: impl Into<Key>) -> Result<Option<Self>> {
        let table = declared_table::<Self>()?;
        let keys = declared::<Self>("key attributes", Self::KEYS)?;
        let key = key.into();
        if key.len() != keys.len() {
            return Err(RecdbError::Key(format!(
                "{} is keyed by {} ({} value(s)), got {}",
                table,
                keys.join(", "),
                keys.len(),
                key.len()
            )));
        }

        let query = sql::select_by_keys(table, keys);
        match db.get_row(&query, key.values())? {
            Some(row) => from_row(&row).map(Some),
            None => {
                debug!("No {} row for {:?}", table, key.values());
                Ok(None)
            }
        }
    }

    /// Inserts the declared insert attributes. Returns the affected row count.
    fn insert(&self, db: &Db) -> Result<usize> {
        let table = declared_table::<Self>()?;
        let columns = declared::<Self>("insert attributes", Self::INSERT_ATTRS)?;
        let params = bind(&to_params(self)?, columns);

        let query = sql::insert(table, columns);
        Ok(db.execute(&query, &params)?.rows_affected())
    }

    /// Updates the declared update attributes of the row matching this
    /// entity's key attributes. Returns the affected row count.
    ///
    /// # Errors
    ///
    /// `RecdbError::Key` when a key attribute is missing or NULL.
    fn update(&self, db: &Db) -> Result<usize> {
        let table = declared_table::<Self>()?;
        let columns = declared::<Self>("update attributes", Self::UPDATE_ATTRS)?;
        let keys = declared::<Self>("key attributes", Self::KEYS)?;
        let attrs = to_params(self)?;

        let mut params = bind(&attrs, columns);
        for key in keys {
            match param(&attrs, key) {
                Some(Value::Null) | None => {
                    return Err(RecdbError::Key(format!(
                        "cannot update {}: key attribute \"{}\" is not set",
                        table, key
                    )))
                }
                Some(value) => params.push(value.clone()),
            }
        }

        let query = sql::update(table, columns, keys);
        Ok(db.execute(&query, &params)?.rows_affected())
    }
}

/// An entity together with the handle it loads from and saves to.
///
/// Derefs to the entity, so attributes are assigned directly.
#[derive(Debug)]
pub struct Bound<E> {
    entity: E,
    db: Rc<Db>,
}

impl<E: Entity> Bound<E> {
    /// Builds an entity from `data` and binds it to `db`, or to the
    /// registry's `default` handle when no handle is supplied.
    pub fn new(registry: &Registry, data: Attributes, db: Option<Rc<Db>>) -> Result<Self> {
        let entity = E::from_attributes(data)?;
        let db = registry.resolve(db)?;
        Ok(Bound { entity, db })
    }

    /// Binds an already built entity.
    pub fn from_entity(entity: E, db: Rc<Db>) -> Self {
        Bound { entity, db }
    }

    /// Loads through `db`, or through the registry's `default` handle.
    pub fn load(registry: &Registry, key: impl Into<Key>, db: Option<Rc<Db>>) -> Result<Option<Self>> {
        let db = registry.resolve(db)?;
        Ok(E::load(&db, key)?.map(|entity| Bound { entity, db }))
    }

    /// Validates, then stores through the bound handle.
    pub fn save(&mut self) -> Result<()> {
        self.entity.save(&self.db)
    }

    pub fn db(&self) -> &Rc<Db> {
        &self.db
    }

    pub fn into_inner(self) -> E {
        self.entity
    }
}

impl<E> Deref for Bound<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entity
    }
}

impl<E> DerefMut for Bound<E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.entity
    }
}
