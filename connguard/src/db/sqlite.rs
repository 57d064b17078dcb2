//! SQLite database backend
use std::ops::Deref;
#[cfg(feature = "log")]
use std::sync::Once;
use std::time::Duration;

use super::{Backend, BackendConnection, BackendTransaction, Connection, ConnectionMethods};
use super::{Rows, Transaction};
use crate::options::DriverOptions;
use crate::{debug, warn, Error, Result, SqlVal};

/// The name of the sqlite backend.
pub const BACKEND_NAME: &str = "sqlite";

/// Driver option setting how long a statement waits on a locked database.
pub const BUSY_TIMEOUT_MS: &str = "busy_timeout_ms";

#[cfg(feature = "log")]
fn log_callback(error_code: std::ffi::c_int, message: &str) {
    match error_code {
        rusqlite::ffi::SQLITE_NOTICE => {
            #[cfg(feature = "debug")]
            log::trace!("{}", message)
        }
        rusqlite::ffi::SQLITE_OK
        | rusqlite::ffi::SQLITE_DONE
        | rusqlite::ffi::SQLITE_NOTICE_RECOVER_WAL
        | rusqlite::ffi::SQLITE_NOTICE_RECOVER_ROLLBACK => log::info!("{}", message),
        rusqlite::ffi::SQLITE_WARNING | rusqlite::ffi::SQLITE_WARNING_AUTOINDEX => {
            log::warn!("{}", message)
        }
        _ => log::error!("{error_code} {}", message),
    }
}

/// SQLite [`Backend`] implementation.
#[derive(Debug, Default, Clone)]
pub struct SQLiteBackend;
impl SQLiteBackend {
    pub fn new() -> SQLiteBackend {
        SQLiteBackend {}
    }
}
impl SQLiteBackend {
    /// Open a connection without boxing it.
    pub fn open(&self, path: &str, options: &DriverOptions) -> Result<SQLiteConnection> {
        let busy_timeout = options.get_u64(BUSY_TIMEOUT_MS)?.map(Duration::from_millis);
        let mut connection = SQLiteConnection {
            path: path.to_string(),
            busy_timeout,
            conn: None,
        };
        connection.connect()?;
        Ok(connection)
    }
}

impl Backend for SQLiteBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn connect(&self, path: &str, options: &DriverOptions) -> Result<Connection> {
        Ok(Connection::new(Box::new(self.open(path, options)?)))
    }
}

/// SQLite database connection.
///
/// Remembers the path it was opened with so that it can be closed and
/// reopened.
#[derive(Debug)]
pub struct SQLiteConnection {
    path: String,
    busy_timeout: Option<Duration>,
    conn: Option<rusqlite::Connection>,
}
impl SQLiteConnection {
    fn open(&self) -> Result<rusqlite::Connection> {
        #[cfg(feature = "log")]
        static INIT_SQLITE_LOGGING: Once = Once::new();

        #[cfg(feature = "log")]
        INIT_SQLITE_LOGGING.call_once(|| {
            _ = unsafe { rusqlite::trace::config_log(Some(log_callback)) };
        });

        let conn = rusqlite::Connection::open(&self.path)?;
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(conn)
    }

    /// Path or URI this connection opens.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn wrapped_connection_methods(&self) -> Result<&rusqlite::Connection> {
        self.conn.as_ref().ok_or(Error::NotConnected)
    }
}

impl ConnectionMethods for SQLiteConnection {
    fn query(&mut self, sql: &str) -> Result<Rows> {
        query_rows(self.wrapped_connection_methods()?, sql, &[])
    }
    fn execute_query(&mut self, sql: &str, params: &[SqlVal]) -> Result<Rows> {
        query_rows(self.wrapped_connection_methods()?, sql, params)
    }
    fn execute_update(&mut self, sql: &str, params: &[SqlVal]) -> Result<usize> {
        execute_update(self.wrapped_connection_methods()?, sql, params)
    }
}

impl BackendConnection for SQLiteConnection {
    fn begin_transaction(&mut self) -> Result<Transaction<'_>> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        let trans: rusqlite::Transaction<'_> = conn.transaction()?;
        let trans = Box::new(SqliteTransaction::new(trans));
        Ok(Transaction::new(trans))
    }
    fn connect(&mut self) -> Result<bool> {
        if self.conn.is_some() {
            return Ok(false);
        }
        debug!("opening sqlite database {}", self.path);
        self.conn = Some(self.open()?);
        Ok(true)
    }
    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!("closing sqlite database {}", self.path);
            if let Err((_, _e)) = conn.close() {
                warn!("error closing sqlite database {}: {}", self.path, _e);
            }
        }
    }
    fn is_connected(&self) -> Result<bool> {
        Ok(self.conn.is_some())
    }
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

fn query_rows(conn: &rusqlite::Connection, sql: &str, params: &[SqlVal]) -> Result<Rows> {
    if cfg!(feature = "log") {
        debug!("query sql {}", sql);
    }
    #[cfg(feature = "debug")]
    debug!("values {:?}", params);
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut vals = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            vals.push(sql_val_from_rusqlite(row.get_ref(idx)?));
        }
        out.push(vals);
    }
    Ok(Rows::new(columns, out))
}

fn execute_update(conn: &rusqlite::Connection, sql: &str, params: &[SqlVal]) -> Result<usize> {
    if cfg!(feature = "log") {
        debug!("update sql {}", sql);
    }
    #[cfg(feature = "debug")]
    debug!("values {:?}", params);
    let mut stmt = conn.prepare(sql)?;
    Ok(stmt.execute(rusqlite::params_from_iter(params.iter()))?)
}

#[derive(Debug)]
struct SqliteTransaction<'c> {
    trans: Option<rusqlite::Transaction<'c>>,
}
impl<'c> SqliteTransaction<'c> {
    fn new(trans: rusqlite::Transaction<'c>) -> Self {
        SqliteTransaction { trans: Some(trans) }
    }
    fn get(&self) -> Result<&rusqlite::Transaction<'c>> {
        self.trans.as_ref().ok_or(Error::TransactionConsumed)
    }
    fn wrapped_connection_methods(&self) -> Result<&rusqlite::Connection> {
        Ok(self.get()?.deref())
    }
}
impl ConnectionMethods for SqliteTransaction<'_> {
    fn query(&mut self, sql: &str) -> Result<Rows> {
        query_rows(self.wrapped_connection_methods()?, sql, &[])
    }
    fn execute_query(&mut self, sql: &str, params: &[SqlVal]) -> Result<Rows> {
        query_rows(self.wrapped_connection_methods()?, sql, params)
    }
    fn execute_update(&mut self, sql: &str, params: &[SqlVal]) -> Result<usize> {
        execute_update(self.wrapped_connection_methods()?, sql, params)
    }
}
impl<'c> BackendTransaction<'c> for SqliteTransaction<'c> {
    fn commit(&mut self) -> Result<()> {
        match self.trans.take() {
            None => Err(Error::TransactionConsumed),
            Some(trans) => Ok(trans.commit()?),
        }
    }
    fn rollback(&mut self) -> Result<()> {
        match self.trans.take() {
            None => Err(Error::TransactionConsumed),
            Some(trans) => Ok(trans.rollback()?),
        }
    }
}

impl rusqlite::ToSql for SqlVal {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput::Borrowed, ToSqlOutput::Owned, Value, ValueRef};
        use SqlVal::*;
        Ok(match self {
            Bool(b) => Owned(Value::Integer(*b as i64)),
            Int(i) => Owned(Value::Integer(*i as i64)),
            BigInt(i) => Owned(Value::Integer(*i)),
            Real(r) => Owned(Value::Real(*r)),
            Text(t) => Borrowed(ValueRef::Text(t.as_bytes())),
            Blob(b) => Borrowed(ValueRef::Blob(b)),
            Null => Owned(Value::Null),
        })
    }
}

fn sql_val_from_rusqlite(val: rusqlite::types::ValueRef<'_>) -> SqlVal {
    use rusqlite::types::ValueRef;
    match val {
        ValueRef::Null => SqlVal::Null,
        ValueRef::Integer(i) => SqlVal::BigInt(i),
        ValueRef::Real(r) => SqlVal::Real(r),
        ValueRef::Text(t) => SqlVal::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlVal::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_sql_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let params = [
            SqlVal::Null,
            SqlVal::Bool(true),
            SqlVal::Int(7),
            SqlVal::Real(1.5),
            SqlVal::Text("hi".into()),
            SqlVal::Blob(vec![1, 2]),
        ];
        let rows = query_rows(&conn, "SELECT ?, ?, ?, ?, ?, ?", &params).unwrap();
        assert_eq!(rows.columns().len(), 6);
        assert_eq!(
            &rows[0],
            &[
                SqlVal::Null,
                SqlVal::BigInt(1),
                SqlVal::BigInt(7),
                SqlVal::Real(1.5),
                SqlVal::Text("hi".into()),
                SqlVal::Blob(vec![1, 2]),
            ][..]
        );
    }

    #[test]
    fn close_then_connect() {
        let mut conn = SQLiteBackend::new()
            .open(":memory:", &DriverOptions::new())
            .unwrap();
        assert!(conn.is_connected().unwrap());
        assert!(!conn.connect().unwrap());
        conn.close();
        assert!(!conn.is_connected().unwrap());
        assert!(matches!(conn.query("SELECT 1"), Err(Error::NotConnected)));
        assert!(conn.connect().unwrap());
        assert_eq!(conn.query("SELECT 1").unwrap().scalar(), Some(&SqlVal::BigInt(1)));
    }

    #[test]
    fn invalid_busy_timeout() {
        let mut options = DriverOptions::new();
        options.insert(BUSY_TIMEOUT_MS, "later");
        let err = SQLiteBackend::new().open(":memory:", &options).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
    }
}
