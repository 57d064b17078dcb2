use std::fmt::Debug;
use std::ops::Index;

use crate::{Result, SqlVal};

/// Statement methods available on a database connection. This trait is
/// implemented by the backend connections, by transactions, and by
/// [`GuardedConnection`][crate::GuardedConnection], which checks the
/// session before forwarding each call.
pub trait ConnectionMethods: Debug {
    /// Run a literal SQL statement with no parameters and collect its rows.
    fn query(&mut self, sql: &str) -> Result<Rows>;
    /// Run a parameterized SQL statement and collect its rows.
    fn execute_query(&mut self, sql: &str, params: &[SqlVal]) -> Result<Rows>;
    /// Run a parameterized SQL statement which does not return rows.
    /// Returns the number of rows affected.
    fn execute_update(&mut self, sql: &str, params: &[SqlVal]) -> Result<usize>;
}

/// Fully materialized result of a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rows {
    columns: Vec<String>,
    rows: Vec<Vec<SqlVal>>,
}
impl Rows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlVal>>) -> Self {
        Rows { columns, rows }
    }
    /// Names of the result columns, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &[SqlVal]> {
        self.rows.iter().map(Vec::as_slice)
    }
    /// Index of the column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
    /// First cell of the first row, if any. Convenient for scalar queries.
    pub fn scalar(&self) -> Option<&SqlVal> {
        self.rows.first().and_then(|r| r.first())
    }
    pub fn into_inner(self) -> Vec<Vec<SqlVal>> {
        self.rows
    }
}
impl Index<usize> for Rows {
    type Output = [SqlVal];
    fn index(&self, idx: usize) -> &[SqlVal] {
        &self.rows[idx]
    }
}
impl IntoIterator for Rows {
    type Item = Vec<SqlVal>;
    type IntoIter = std::vec::IntoIter<Vec<SqlVal>>;
    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
