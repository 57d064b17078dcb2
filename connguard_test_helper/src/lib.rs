//! Test helpers for connguard.
//!
//! [`MockConnection`] is a scripted [`BackendConnection`] which records
//! every call made on it, for checking exactly what a decorator did.
//! With the `sqlite` feature, [`SqliteFile`] provides a throwaway
//! on-disk SQLite database. With the `pg` feature, [`pg_connstr`] points
//! at a temporary PostgreSQL server.
#![deny(missing_docs)]

use std::cell::RefCell;

use connguard::db::{Backend, BackendConnection, BackendTransaction, ConnectionMethods, Pingable};
use connguard::db::{Connection, Rows, Transaction};
use connguard::{DriverOptions, Error, Result, SqlVal};

#[cfg(feature = "pg")]
pub mod pg;
#[cfg(feature = "pg")]
pub use pg::pg_connstr;
#[cfg(feature = "sqlite")]
pub use sqlite_file::SqliteFile;

/// Set up logging for a test. Safe to call more than once.
pub fn setup() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// A call made on a [`MockConnection`] or one of its transactions.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    IsConnected,
    Ping,
    Query(String),
    ExecuteQuery(String, Vec<SqlVal>),
    ExecuteUpdate(String, Vec<SqlVal>),
    BeginTransaction,
    Commit,
    Rollback,
    Close,
    Connect,
}

/// Scripted connection.
///
/// The client-side state (`connected`) and the server-side session
/// (`alive`) are tracked separately, so a connection can believe it is
/// open while its session has been dropped. Statements fail unless both
/// are true. A successful `connect` restores both.
#[derive(Debug)]
pub struct MockConnection {
    connected: bool,
    alive: bool,
    native_ping: bool,
    fail_is_connected: bool,
    fail_connect: bool,
    calls: RefCell<Vec<Call>>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::healthy()
    }
}

impl MockConnection {
    /// Connected with a live session and no native ping.
    pub fn healthy() -> Self {
        MockConnection {
            connected: true,
            alive: true,
            native_ping: false,
            fail_is_connected: false,
            fail_connect: false,
            calls: RefCell::new(Vec::new()),
        }
    }
    /// Reports itself as not connected.
    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }
    /// Reports itself as connected, but the server has dropped the session.
    pub fn dead_session(mut self) -> Self {
        self.alive = false;
        self
    }
    /// Expose a native ping.
    pub fn with_native_ping(mut self) -> Self {
        self.native_ping = true;
        self
    }
    /// `is_connected` returns an error.
    pub fn failing_is_connected(mut self) -> Self {
        self.fail_is_connected = true;
        self
    }
    /// `connect` returns an error.
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }
    /// Simulate the server dropping the session.
    pub fn kill_session(&mut self) {
        self.alive = false;
    }
    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
    /// Number of calls equal to `call`.
    pub fn count(&self, call: &Call) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }
    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }
    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
    fn check_session(&self) -> Result<()> {
        if !self.connected {
            Err(Error::NotConnected)
        } else if !self.alive {
            Err(Error::Generic("server has gone away".into()))
        } else {
            Ok(())
        }
    }
}

impl ConnectionMethods for MockConnection {
    fn query(&mut self, sql: &str) -> Result<Rows> {
        self.record(Call::Query(sql.to_string()));
        self.check_session()?;
        Ok(Rows::new(vec!["1".to_string()], vec![vec![SqlVal::BigInt(1)]]))
    }
    fn execute_query(&mut self, sql: &str, params: &[SqlVal]) -> Result<Rows> {
        self.record(Call::ExecuteQuery(sql.to_string(), params.to_vec()));
        self.check_session()?;
        let columns = (0..params.len()).map(|i| format!("p{i}")).collect();
        Ok(Rows::new(columns, vec![params.to_vec()]))
    }
    fn execute_update(&mut self, sql: &str, params: &[SqlVal]) -> Result<usize> {
        self.record(Call::ExecuteUpdate(sql.to_string(), params.to_vec()));
        self.check_session()?;
        Ok(params.len())
    }
}

impl BackendConnection for MockConnection {
    fn begin_transaction(&mut self) -> Result<Transaction<'_>> {
        self.record(Call::BeginTransaction);
        self.check_session()?;
        Ok(Transaction::new(Box::new(MockTransaction {
            calls: &self.calls,
        })))
    }
    fn connect(&mut self) -> Result<bool> {
        self.record(Call::Connect);
        if self.fail_connect {
            return Err(Error::Generic("connection refused".into()));
        }
        let opened = !self.connected;
        self.connected = true;
        self.alive = true;
        Ok(opened)
    }
    fn close(&mut self) {
        self.record(Call::Close);
        self.connected = false;
    }
    fn is_connected(&self) -> Result<bool> {
        self.record(Call::IsConnected);
        if self.fail_is_connected {
            return Err(Error::Generic("socket state unknown".into()));
        }
        Ok(self.connected)
    }
    fn backend_name(&self) -> &'static str {
        "mock"
    }
    fn as_pingable(&mut self) -> Option<&mut dyn Pingable> {
        if self.native_ping {
            Some(self)
        } else {
            None
        }
    }
}

impl Pingable for MockConnection {
    fn ping(&mut self) -> Result<bool> {
        self.record(Call::Ping);
        if !self.connected {
            return Err(Error::NotConnected);
        }
        Ok(self.alive)
    }
}

/// Backend handing out healthy [`MockConnection`]s and remembering the
/// driver options each connection was opened with.
#[derive(Debug, Default)]
pub struct MockBackend {
    received: RefCell<Vec<DriverOptions>>,
}

impl MockBackend {
    /// Create a backend which has opened nothing yet.
    pub fn new() -> Self {
        Self::default()
    }
    /// Driver options passed to each `connect`, in order.
    pub fn received_options(&self) -> Vec<DriverOptions> {
        self.received.borrow().clone()
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }
    fn connect(&self, _conn_str: &str, options: &DriverOptions) -> Result<Connection> {
        self.received.borrow_mut().push(options.clone());
        Ok(Connection::new(Box::new(MockConnection::healthy())))
    }
}

#[derive(Debug)]
struct MockTransaction<'c> {
    calls: &'c RefCell<Vec<Call>>,
}

impl ConnectionMethods for MockTransaction<'_> {
    fn query(&mut self, sql: &str) -> Result<Rows> {
        self.calls.borrow_mut().push(Call::Query(sql.to_string()));
        Ok(Rows::default())
    }
    fn execute_query(&mut self, sql: &str, params: &[SqlVal]) -> Result<Rows> {
        self.calls
            .borrow_mut()
            .push(Call::ExecuteQuery(sql.to_string(), params.to_vec()));
        Ok(Rows::default())
    }
    fn execute_update(&mut self, sql: &str, params: &[SqlVal]) -> Result<usize> {
        self.calls
            .borrow_mut()
            .push(Call::ExecuteUpdate(sql.to_string(), params.to_vec()));
        Ok(params.len())
    }
}

impl<'c> BackendTransaction<'c> for MockTransaction<'c> {
    fn commit(&mut self) -> Result<()> {
        self.calls.borrow_mut().push(Call::Commit);
        Ok(())
    }
    fn rollback(&mut self) -> Result<()> {
        self.calls.borrow_mut().push(Call::Rollback);
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_file {
    use std::path::{Path, PathBuf};

    use connguard::db::{sqlite, ConnectionSpec};
    use tempfile::TempDir;

    /// SQLite database file in a temporary directory, removed on drop.
    #[derive(Debug)]
    pub struct SqliteFile {
        _dir: TempDir,
        path: PathBuf,
    }

    impl SqliteFile {
        /// Reserve a database path. The file is created on first connect.
        pub fn new() -> Self {
            let dir = tempfile::tempdir().expect("could not create temporary directory");
            let path = dir.path().join("connguard-test.db");
            log::info!("using sqlite database {}", path.display());
            SqliteFile { _dir: dir, path }
        }
        /// Path of the database file.
        pub fn path(&self) -> &Path {
            &self.path
        }
        /// Connection spec for the database, with no driver options.
        pub fn spec(&self) -> ConnectionSpec {
            ConnectionSpec::new(sqlite::BACKEND_NAME, self.path.to_string_lossy())
        }
    }

    impl Default for SqliteFile {
        fn default() -> Self {
            Self::new()
        }
    }
}
