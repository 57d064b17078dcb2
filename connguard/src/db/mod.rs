//! Types, traits, and methods for interacting with a database.
//!
//! The different ways of referring to a database handle may present
//! some initial confusion.
//! * `ConnectionMethods` is a trait containing the statement methods available on a database
//!   connection or a transaction. These are the operations a
//!   [GuardedConnection][crate::GuardedConnection] intercepts.
//! * `BackendConnection` is a trait representing a direct connection to a database backend. It is a superset
//!   of `ConnectionMethods` and adds the session lifecycle (connect, close, liveness) and the ability to
//!   start a transaction.
//! * `Pingable` is an optional capability of a `BackendConnection` with a native liveness probe.
//! * `Transaction` is a struct representing a database transaction. It implements `ConnectionMethods`.
//! * `Connection` is a convenience struct containing a boxed `BackendConnection`. It cannot do anything other than
//!   what a `BackendConnection` can do, but allows using a single concrete type that is not tied to a particular
//!   database backend. It is returned by the `connect` method.

use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::options::DriverOptions;
use crate::{Error, Result};

mod connmethods;
mod macros;
#[cfg(feature = "pg")]
pub mod pg;
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Macros are always exported at the root of the crate
use crate::connection_method_wrapper;

pub use connmethods::{ConnectionMethods, Rows};

/// Statement used to probe a connection that has no native ping.
pub const DEFAULT_DUMMY_SELECT: &str = "SELECT 1";

/// Database connection.
pub trait BackendConnection: ConnectionMethods + Send {
    /// Begin a database transaction. The transaction object must be
    /// used in place of this connection until it is committed or rolled back.
    fn begin_transaction(&mut self) -> Result<Transaction<'_>>;
    /// Open the underlying session. Returns `false` if it was already
    /// open and nothing was done.
    fn connect(&mut self) -> Result<bool>;
    /// Close the underlying session. Closing a closed connection does nothing.
    fn close(&mut self);
    /// Whether the connection believes its session is open. This is
    /// the client-side view; it does not talk to the server.
    fn is_connected(&self) -> Result<bool>;
    fn backend_name(&self) -> &'static str;
    /// Trivial statement whose successful execution shows the session is usable.
    fn dummy_select_sql(&self) -> &'static str {
        DEFAULT_DUMMY_SELECT
    }
    /// Access the native liveness probe, for connections which have one.
    fn as_pingable(&mut self) -> Option<&mut dyn Pingable> {
        None
    }
}

/// Connection capable of a lightweight liveness probe distinct from
/// running a full query.
pub trait Pingable {
    /// Probe the session. `Ok(false)` means the server answered but the
    /// session cannot be used.
    fn ping(&mut self) -> Result<bool>;
}

/// Database connection. May be a connection to any type of database
/// as it is a boxed abstraction over a specific connection.
#[derive(Debug)]
pub struct Connection {
    conn: Box<dyn BackendConnection>,
}
impl Connection {
    pub fn new(conn: Box<dyn BackendConnection>) -> Self {
        Connection { conn }
    }
    // For use with connection_method_wrapper macro
    #[allow(clippy::unnecessary_wraps)]
    fn wrapped_connection_methods(&mut self) -> Result<&mut dyn BackendConnection> {
        Ok(self.conn.as_mut())
    }
}
impl BackendConnection for Connection {
    fn begin_transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn.begin_transaction()
    }
    fn connect(&mut self) -> Result<bool> {
        self.conn.connect()
    }
    fn close(&mut self) {
        self.conn.close()
    }
    fn is_connected(&self) -> Result<bool> {
        self.conn.is_connected()
    }
    fn backend_name(&self) -> &'static str {
        self.conn.backend_name()
    }
    fn dummy_select_sql(&self) -> &'static str {
        self.conn.dummy_select_sql()
    }
    fn as_pingable(&mut self) -> Option<&mut dyn Pingable> {
        self.conn.as_pingable()
    }
}
connection_method_wrapper!(Connection);

/// Connection specification. Contains the name of a database backend,
/// the backend-specific connection string and any driver options.
/// See [connect][crate::db::connect] to make a [Connection][crate::db::Connection]
/// from a `ConnectionSpec`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConnectionSpec {
    pub backend_name: String,
    pub conn_str: String,
    #[serde(default, skip_serializing_if = "DriverOptions::is_empty")]
    pub driver_options: DriverOptions,
}
impl ConnectionSpec {
    pub fn new(backend_name: impl Into<String>, conn_str: impl Into<String>) -> Self {
        ConnectionSpec {
            backend_name: backend_name.into(),
            conn_str: conn_str.into(),
            driver_options: DriverOptions::default(),
        }
    }
    pub fn with_driver_options(mut self, driver_options: DriverOptions) -> Self {
        self.driver_options = driver_options;
        self
    }
    /// Save the connection spec to the filesystem for later use.
    pub fn save(&self, path: &Path) -> Result<()> {
        let path = conn_complete_if_dir(path);
        let mut f = fs::File::create(path)?;
        f.write_all(serde_json::to_string(self)?.as_bytes())
            .map_err(|e| e.into())
    }
    /// Load a previously saved connection spec
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = conn_complete_if_dir(path.as_ref());
        serde_json::from_reader(fs::File::open(path)?).map_err(|e| e.into())
    }
    pub fn get_backend(&self) -> Result<Box<dyn Backend>> {
        match get_backend(&self.backend_name) {
            Some(backend) => Ok(backend),
            None => Err(Error::UnknownBackend(self.backend_name.clone())),
        }
    }
}

fn conn_complete_if_dir(path: &Path) -> Cow<'_, Path> {
    if path.is_dir() {
        Cow::from(path.join("connection.json"))
    } else {
        Cow::from(path)
    }
}

/// Database backend. A boxed implementation can be returned by name via [get_backend][crate::db::get_backend].
pub trait Backend {
    fn name(&self) -> &'static str;
    /// Open a connection. Options the backend does not understand are ignored.
    fn connect(&self, conn_str: &str, options: &DriverOptions) -> Result<Connection>;
}

/// Find a backend by name.
pub fn get_backend(name: &str) -> Option<Box<dyn Backend>> {
    match name {
        #[cfg(feature = "sqlite")]
        sqlite::BACKEND_NAME => Some(Box::new(sqlite::SQLiteBackend::new())),
        #[cfg(feature = "pg")]
        pg::BACKEND_NAME => Some(Box::new(pg::PgBackend::new())),
        _ => None,
    }
}

/// Connect to a database. For non-boxed connections, see individual
/// [Backend][crate::db::Backend] implementations.
pub fn connect(spec: &ConnectionSpec) -> Result<Connection> {
    spec.get_backend()?
        .connect(&spec.conn_str, &spec.driver_options)
}

/// Backend side of a [`Transaction`].
pub trait BackendTransaction<'c>: ConnectionMethods {
    /// Commit the transaction. Unfortunately because we use this as a
    /// trait object, we can't consume self. It should be understood
    /// that no methods should be called after commit. That behavior is
    /// enforced by Transaction.
    fn commit(&mut self) -> Result<()>;
    /// Roll back the transaction. Same comment about consuming self as above.
    fn rollback(&mut self) -> Result<()>;
}

/// Database transaction.
///
/// Begin a transaction using the `BackendConnection`
/// [`begin_transaction`][crate::db::BackendConnection::begin_transaction] method.
/// Dropping a transaction without committing it rolls it back.
#[derive(Debug)]
pub struct Transaction<'c> {
    trans: Box<dyn BackendTransaction<'c> + 'c>,
}
impl<'c> Transaction<'c> {
    pub fn new(trans: Box<dyn BackendTransaction<'c> + 'c>) -> Self {
        Transaction { trans }
    }
    /// Commit the transaction
    pub fn commit(mut self) -> Result<()> {
        self.trans.commit()
    }
    /// Roll back the transaction. Equivalent to dropping it.
    pub fn rollback(mut self) -> Result<()> {
        self.trans.rollback()
    }
    // For use with connection_method_wrapper macro
    #[allow(clippy::unnecessary_wraps)]
    fn wrapped_connection_methods(&mut self) -> Result<&mut (dyn BackendTransaction<'c> + 'c)> {
        Ok(self.trans.as_mut())
    }
}

connection_method_wrapper!(['c] Transaction<'c>);
