/// Query Execution Module
///
/// This module provides the statement cache and the query helpers on `Db`.
/// Statements are cached by their exact query text for the lifetime of the
/// handle; no normalization is applied and nothing is ever evicted.

use crate::core::db::connection::Db;
use crate::core::db::value::{to_json, Attributes};
use crate::core::Result;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, trace};

/// Lower bound for SQLite's own statement cache, which is an LRU.
const DRIVER_CACHE_FLOOR: usize = 16;

/// A statement prepared once for a handle and reused for identical text.
///
/// Result columns are not recorded here: a schema change can alter what
/// `SELECT *` returns, so they are read from the live statement on every
/// execution.
#[derive(Debug)]
pub struct PreparedStatement {
    /// Exact query text, also the cache key
    pub sql: String,
    /// Number of positional parameters
    pub parameter_count: usize,
    executions: Cell<u64>,
}

impl PreparedStatement {
    /// How many times this statement has been executed.
    pub fn executions(&self) -> u64 {
        self.executions.get()
    }
}

/// One result row, with its values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Rc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Rc<[String]>, values: Vec<Value>) -> Self {
        Row { columns, values }
    }

    /// Value of the named column. With duplicate names the first one wins.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    /// The row as a name-keyed JSON mapping, ready to hydrate an entity.
    pub fn to_attributes(&self) -> Attributes {
        self.iter()
            .map(|(column, value)| (column.to_string(), to_json(value)))
            .collect()
    }
}

/// Cursor over the rows produced by one execution.
#[derive(Debug)]
pub struct ResultSet {
    columns: Rc<[String]>,
    rows: VecDeque<Row>,
    rows_affected: usize,
}

impl ResultSet {
    /// Column names of the result.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows changed by an INSERT, UPDATE or DELETE. Zero for queries.
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    /// Rows not fetched yet.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Fetches the next row.
    pub fn fetch(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    /// Fetches every remaining row.
    pub fn fetch_all(self) -> Vec<Row> {
        self.rows.into()
    }

    /// Fetches the next row and returns the value at `index`.
    ///
    /// # Errors
    ///
    /// `InvalidColumnIndex` from the driver when the result is narrower
    /// than `index`; the row is left in place.
    pub fn fetch_column(&mut self, index: usize) -> Result<Option<Value>> {
        if index >= self.columns.len() && !self.columns.is_empty() {
            return Err(rusqlite::Error::InvalidColumnIndex(index).into());
        }
        Ok(self
            .rows
            .pop_front()
            .and_then(|row| row.values.into_iter().nth(index)))
    }
}

impl Db {
    /// Returns the cached statement for `query`, preparing it on first use.
    ///
    /// # Errors
    ///
    /// `RecdbError::Database` when SQLite cannot prepare the statement.
    pub fn prepare(&self, query: &str) -> Result<Rc<PreparedStatement>> {
        if let Some(stmt) = self.stmts.borrow().get(query) {
            trace!("Statement cache hit on \"{}\"", self.name());
            return Ok(Rc::clone(stmt));
        }

        let stmt = self.conn.prepare_cached(query)?;
        let prepared = Rc::new(PreparedStatement {
            sql: query.to_string(),
            parameter_count: stmt.parameter_count(),
            executions: Cell::new(0),
        });
        drop(stmt);

        let mut stmts = self.stmts.borrow_mut();
        stmts.insert(query.to_string(), Rc::clone(&prepared));
        // Keep SQLite's LRU at least as large as ours so it never evicts
        self.conn
            .set_prepared_statement_cache_capacity(stmts.len().max(DRIVER_CACHE_FLOOR));
        debug!("Prepared statement #{} on \"{}\": {}", stmts.len(), self.name(), query);

        Ok(prepared)
    }

    /// Number of distinct query texts prepared on this handle.
    pub fn statement_count(&self) -> usize {
        self.stmts.borrow().len()
    }

    /// Executes `query` with positional parameters and returns its cursor.
    ///
    /// # Errors
    ///
    /// Any driver failure during prepare, bind or execute, unchanged.
    pub fn execute(&self, query: &str, params: &[Value]) -> Result<ResultSet> {
        let prepared = self.prepare(query)?;
        prepared.executions.set(prepared.executions.get() + 1);
        trace!("Executing on \"{}\" with {} params: {}", self.name(), params.len(), query);

        let mut stmt = self.conn.prepare_cached(&prepared.sql)?;

        if stmt.column_count() == 0 {
            let rows_affected = stmt.execute(params_from_iter(params.iter()))?;
            return Ok(ResultSet {
                columns: Rc::from(Vec::new()),
                rows: VecDeque::new(),
                rows_affected,
            });
        }

        // SQLite recompiles a statement invalidated by a schema change when
        // it is stepped, so widths and names are read after stepping.
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let width = row.as_ref().column_count();
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            fetched.push(values);
        }
        drop(rows);

        let columns: Rc<[String]> = stmt.column_names().into_iter().map(String::from).collect();
        Ok(ResultSet {
            rows: fetched
                .into_iter()
                .map(|values| Row::new(Rc::clone(&columns), values))
                .collect(),
            columns,
            rows_affected: 0,
        })
    }

    /// First row of the result, `None` when there are no rows.
    pub fn get_row(&self, query: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.execute(query, params)?.fetch())
    }

    /// Every row of the result.
    pub fn get_rows(&self, query: &str, params: &[Value]) -> Result<Vec<Row>> {
        Ok(self.execute(query, params)?.fetch_all())
    }

    /// The first column of every row. NULL, zero and empty values are kept;
    /// collection only stops at the end of the result.
    pub fn get_col(&self, query: &str, params: &[Value]) -> Result<Vec<Value>> {
        let mut result = self.execute(query, params)?;
        let mut col = Vec::with_capacity(result.remaining());
        while let Some(value) = result.fetch_column(0)? {
            col.push(value);
        }
        Ok(col)
    }

    /// First column of the first row.
    pub fn get_field(&self, query: &str, params: &[Value]) -> Result<Option<Value>> {
        self.execute(query, params)?.fetch_column(0)
    }

    /// Rowid generated by the most recent successful INSERT on this handle.
    pub fn last_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}
