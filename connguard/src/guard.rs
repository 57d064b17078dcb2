use crate::check;
use crate::connection_method_wrapper;
use crate::db::{Backend, BackendConnection, Connection, ConnectionSpec, Pingable, Transaction};
use crate::options::{DriverOptions, CHECK_CONNECTION_BEFOREHAND};
use crate::{debug, Result};

/// Connection decorator which can verify the session is alive before
/// each query, update or transaction start.
///
/// When enabled, each of [`query`][crate::db::ConnectionMethods::query],
/// [`execute_query`][crate::db::ConnectionMethods::execute_query],
/// [`execute_update`][crate::db::ConnectionMethods::execute_update] and
/// [`begin_transaction`][BackendConnection::begin_transaction] first runs
/// [`check::reconnect_if_needed`] on the wrapped connection, then
/// forwards the call unchanged. When disabled it is a plain pass-through.
///
/// Lifecycle methods (`connect`, `close`, `is_connected`) and
/// [`ping`][Self::ping] go straight to the wrapped connection.
#[derive(Debug)]
pub struct GuardedConnection<C> {
    conn: C,
    check_connection_beforehand: bool,
}

impl<C> GuardedConnection<C>
where
    C: BackendConnection,
{
    /// Wrap `conn`. `check_connection_beforehand` is fixed for the
    /// lifetime of the decorator.
    pub fn new(conn: C, check_connection_beforehand: bool) -> Self {
        GuardedConnection {
            conn,
            check_connection_beforehand,
        }
    }

    /// Wrap `conn`, taking the check flag from the
    /// [`CHECK_CONNECTION_BEFOREHAND`] driver option. The option is
    /// removed from `options`; when absent the check is disabled.
    pub fn from_options(conn: C, options: &mut DriverOptions) -> Self {
        let check = take_check_option(options);
        Self::new(conn, check)
    }

    pub fn checks_connection_beforehand(&self) -> bool {
        self.check_connection_beforehand
    }

    pub fn get_ref(&self) -> &C {
        &self.conn
    }

    /// Mutable access to the wrapped connection. Calls made through it
    /// bypass the check.
    pub fn get_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Probe the wrapped connection without going through the check,
    /// so it can never re-enter it.
    pub fn ping(&mut self) -> Result<bool> {
        check::ping(&mut self.conn)
    }

    fn handle_connection_beforehand(&mut self) -> Result<()> {
        if self.check_connection_beforehand {
            check::reconnect_if_needed(&mut self.conn)?;
        }
        Ok(())
    }

    // For use with connection_method_wrapper macro
    fn wrapped_connection_methods(&mut self) -> Result<&mut C> {
        self.handle_connection_beforehand()?;
        Ok(&mut self.conn)
    }
}

impl GuardedConnection<Connection> {
    /// Box the decorator into a backend-agnostic [`Connection`].
    pub fn into_connection(self) -> Connection {
        Connection::new(Box::new(self))
    }
}

connection_method_wrapper!([C: BackendConnection] GuardedConnection<C>);

impl<C> BackendConnection for GuardedConnection<C>
where
    C: BackendConnection,
{
    fn begin_transaction(&mut self) -> Result<Transaction<'_>> {
        self.handle_connection_beforehand()?;
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
        Some(self)
    }
}

impl<C> Pingable for GuardedConnection<C>
where
    C: BackendConnection,
{
    fn ping(&mut self) -> Result<bool> {
        GuardedConnection::ping(self)
    }
}

fn take_check_option(options: &mut DriverOptions) -> bool {
    let check = options
        .take_bool(CHECK_CONNECTION_BEFOREHAND)
        .unwrap_or(false);
    debug!("{CHECK_CONNECTION_BEFOREHAND} = {check}");
    check
}

/// Connect to a database as [`connect`][crate::db::connect] does, wrapped in a
/// [`GuardedConnection`] configured from the spec's driver options.
///
/// The [`CHECK_CONNECTION_BEFOREHAND`] option is consumed here and not
/// passed on to the backend.
pub fn connect_guarded(spec: &ConnectionSpec) -> Result<GuardedConnection<Connection>> {
    connect_guarded_with(
        spec.get_backend()?.as_ref(),
        &spec.conn_str,
        &spec.driver_options,
    )
}

/// Like [`connect_guarded`], with an explicit backend rather than one
/// looked up by name.
pub fn connect_guarded_with(
    backend: &dyn Backend,
    conn_str: &str,
    options: &DriverOptions,
) -> Result<GuardedConnection<Connection>> {
    let mut options = options.clone();
    let check = take_check_option(&mut options);
    let conn = backend.connect(conn_str, &options)?;
    Ok(GuardedConnection::new(conn, check))
}
