//! Postgresql database backend
//!
//! The connection owns a small tokio runtime and blocks on the async
//! client, so it must not be used or dropped from within an async context.
//!
//! Result columns are decoded into [`SqlVal`] for `bool`, `int2`, `int4`,
//! `int8`, `float4`, `float8`, `text`, `varchar`, `bpchar`, `name` and
//! `bytea`. Any other column type (`numeric`, `timestamptz`, `uuid`,
//! `json` and so on) fails the whole query; cast such columns in SQL,
//! e.g. `SELECT now()::text`.
use std::fmt::Debug;

use tokio_postgres as postgres;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::GenericClient;

use super::{Backend, BackendConnection, BackendTransaction, Connection, ConnectionMethods};
use super::{Pingable, Rows, Transaction};
use crate::options::DriverOptions;
use crate::{debug, warn, Error, Result, SqlVal};

/// Postgres backend name.
pub const BACKEND_NAME: &str = "pg";

/// Statement sent by the native ping. Uses the simple query protocol, so
/// nothing is prepared and no rows are decoded.
const PING_SQL: &str = "SELECT 1";

/// Postgres [`Backend`] implementation.
#[derive(Debug, Default, Clone)]
pub struct PgBackend;
impl PgBackend {
    pub fn new() -> PgBackend {
        PgBackend {}
    }
    /// Open a connection without boxing it.
    pub fn open(&self, params: &str, _options: &DriverOptions) -> Result<PgConnection> {
        let mut conn = PgConnection::new(params)?;
        conn.connect()?;
        Ok(conn)
    }
}

impl Backend for PgBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn connect(&self, params: &str, options: &DriverOptions) -> Result<Connection> {
        Ok(Connection::new(Box::new(self.open(params, options)?)))
    }
}

/// Pg database connection.
pub struct PgConnection {
    params: Box<str>,
    runtime: tokio::runtime::Runtime,
    client: Option<postgres::Client>,
}

impl PgConnection {
    fn new(params: &str) -> Result<Self> {
        debug!("Creating tokio runtime for postgres connection");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        Ok(PgConnection {
            params: params.into(),
            runtime,
            client: None,
        })
    }

    fn open_client(&self) -> Result<postgres::Client> {
        self.runtime.block_on(async {
            cfg_if::cfg_if! {
                if #[cfg(feature = "tls")] {
                    let connector = native_tls::TlsConnector::new()?;
                    let connector = postgres_native_tls::MakeTlsConnector::new(connector);
                } else {
                    let connector = postgres::NoTls;
                }
            }
            let (client, conn) = postgres::connect(&self.params, connector).await?;
            tokio::spawn(async move {
                #[allow(unused_variables)] // used only when logging is enabled
                if let Err(e) = conn.await {
                    warn!("Postgres connection error {}", e);
                }
            });
            Ok::<_, Error>(client)
        })
    }

    fn client(&self) -> Result<&postgres::Client> {
        self.client.as_ref().ok_or(Error::NotConnected)
    }
}

impl ConnectionMethods for PgConnection {
    fn query(&mut self, sql: &str) -> Result<Rows> {
        self.runtime.block_on(pg_query(self.client()?, sql, &[]))
    }
    fn execute_query(&mut self, sql: &str, params: &[SqlVal]) -> Result<Rows> {
        self.runtime.block_on(pg_query(self.client()?, sql, params))
    }
    fn execute_update(&mut self, sql: &str, params: &[SqlVal]) -> Result<usize> {
        self.runtime.block_on(pg_execute(self.client()?, sql, params))
    }
}

impl BackendConnection for PgConnection {
    fn begin_transaction(&mut self) -> Result<Transaction<'_>> {
        let runtime = &self.runtime;
        let client = self.client.as_mut().ok_or(Error::NotConnected)?;
        let trans: postgres::Transaction<'_> = runtime.block_on(client.transaction())?;
        Ok(Transaction::new(Box::new(PgTransaction {
            runtime,
            trans: Some(trans),
        })))
    }
    fn connect(&mut self) -> Result<bool> {
        if self.client.as_ref().is_some_and(|c| !c.is_closed()) {
            return Ok(false);
        }
        debug!("Postgres connecting");
        self.client = Some(self.open_client()?);
        Ok(true)
    }
    fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("Postgres connection closed");
        }
    }
    fn is_connected(&self) -> Result<bool> {
        Ok(self.client.as_ref().is_some_and(|c| !c.is_closed()))
    }
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
    fn as_pingable(&mut self) -> Option<&mut dyn Pingable> {
        Some(self)
    }
}

impl Pingable for PgConnection {
    fn ping(&mut self) -> Result<bool> {
        let client = self.client()?;
        if client.is_closed() {
            return Ok(false);
        }
        self.runtime.block_on(client.batch_execute(PING_SQL))?;
        Ok(true)
    }
}

impl Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("PgConnection");
        // params may hold a password
        #[cfg(feature = "debug")]
        d.field("params", &self.params);
        // postgres::Client doesnt expose any internal state
        d.field("conn", &self.is_connected().unwrap_or(false));
        d.finish()
    }
}

type DynToSqlPg<'a> = dyn ToSql + Sync + 'a;

async fn pg_query<C>(client: &C, sql: &str, params: &[SqlVal]) -> Result<Rows>
where
    C: GenericClient + Sync,
{
    if cfg!(feature = "log") {
        debug!("query sql {sql}");
    }
    #[cfg(feature = "debug")]
    debug!("values {:?}", params);
    let types: Vec<Type> = params.iter().map(pgtype_for_val).collect();
    let stmt = client.prepare_typed(sql, &types).await?;
    let columns: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let values: Vec<&DynToSqlPg> = params.iter().map(|v| v as &DynToSqlPg).collect();
    let rows = client.query(&stmt, values.as_slice()).await?;
    let rows = rows
        .iter()
        .map(|row| {
            (0..row.len())
                .map(|idx| row.try_get::<_, SqlVal>(idx))
                .collect::<std::result::Result<Vec<SqlVal>, _>>()
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Rows::new(columns, rows))
}

async fn pg_execute<C>(client: &C, sql: &str, params: &[SqlVal]) -> Result<usize>
where
    C: GenericClient + Sync,
{
    if cfg!(feature = "log") {
        debug!("update sql {sql}");
    }
    #[cfg(feature = "debug")]
    debug!("values {:?}", params);
    let types: Vec<Type> = params.iter().map(pgtype_for_val).collect();
    let stmt = client.prepare_typed(sql, &types).await?;
    let values: Vec<&DynToSqlPg> = params.iter().map(|v| v as &DynToSqlPg).collect();
    let cnt = client.execute(&stmt, values.as_slice()).await?;
    Ok(cnt as usize)
}

struct PgTransaction<'c> {
    runtime: &'c tokio::runtime::Runtime,
    trans: Option<postgres::Transaction<'c>>,
}
impl<'c> PgTransaction<'c> {
    fn get(&self) -> Result<&postgres::Transaction<'c>> {
        self.trans.as_ref().ok_or(Error::TransactionConsumed)
    }
}
impl Debug for PgTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction")
            // postgres::Transaction doesnt expose any internal state
            .field("trans", &self.trans.is_some())
            .finish()
    }
}

impl ConnectionMethods for PgTransaction<'_> {
    fn query(&mut self, sql: &str) -> Result<Rows> {
        self.runtime.block_on(pg_query(self.get()?, sql, &[]))
    }
    fn execute_query(&mut self, sql: &str, params: &[SqlVal]) -> Result<Rows> {
        self.runtime.block_on(pg_query(self.get()?, sql, params))
    }
    fn execute_update(&mut self, sql: &str, params: &[SqlVal]) -> Result<usize> {
        self.runtime.block_on(pg_execute(self.get()?, sql, params))
    }
}

impl<'c> BackendTransaction<'c> for PgTransaction<'c> {
    fn commit(&mut self) -> Result<()> {
        match self.trans.take() {
            None => Err(Error::TransactionConsumed),
            Some(trans) => Ok(self.runtime.block_on(trans.commit())?),
        }
    }
    fn rollback(&mut self) -> Result<()> {
        match self.trans.take() {
            None => Err(Error::TransactionConsumed),
            Some(trans) => Ok(self.runtime.block_on(trans.rollback())?),
        }
    }
}

impl ToSql for SqlVal {
    fn to_sql(
        &self,
        requested_ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> std::result::Result<postgres::types::IsNull, Box<dyn std::error::Error + 'static + Sync + Send>>
    {
        use SqlVal::*;
        match self {
            Bool(b) => b.to_sql_checked(requested_ty, out),
            Int(i) => i.to_sql_checked(requested_ty, out),
            BigInt(i) => i.to_sql_checked(requested_ty, out),
            Real(r) => r.to_sql_checked(requested_ty, out),
            Text(t) => t.to_sql_checked(requested_ty, out),
            Blob(b) => b.to_sql_checked(requested_ty, out),
            Null => Ok(postgres::types::IsNull::Yes),
        }
    }
    fn accepts(_ty: &Type) -> bool {
        // Unfortunately this is a type method rather than an instance
        // method.  Declare acceptance of all the types we can support
        // and do the actual checking in the to_sql method
        true
    }
    postgres::types::to_sql_checked!();
}

impl<'a> FromSql<'a> for SqlVal {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + 'static + Sync + Send>> {
        match *ty {
            Type::BOOL => Ok(SqlVal::Bool(bool::from_sql(ty, raw)?)),
            Type::INT2 => Ok(SqlVal::Int(i16::from_sql(ty, raw)? as i32)),
            Type::INT4 => Ok(SqlVal::Int(i32::from_sql(ty, raw)?)),
            Type::INT8 => Ok(SqlVal::BigInt(i64::from_sql(ty, raw)?)),
            Type::FLOAT4 => Ok(SqlVal::Real(f32::from_sql(ty, raw)? as f64)),
            Type::FLOAT8 => Ok(SqlVal::Real(f64::from_sql(ty, raw)?)),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                Ok(SqlVal::Text(String::from_sql(ty, raw)?))
            }
            Type::BYTEA => Ok(SqlVal::Blob(Vec::<u8>::from_sql(ty, raw)?)),
            _ => Err(format!("unsupported postgres type {ty}, cast it to text").into()),
        }
    }

    fn from_sql_null(
        _ty: &Type,
    ) -> std::result::Result<Self, Box<dyn std::error::Error + 'static + Sync + Send>> {
        Ok(SqlVal::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        // Declare acceptance of all and do any actual type checking in from_sql.
        true
    }
}

fn pgtype_for_val(val: &SqlVal) -> Type {
    match val {
        SqlVal::Null => Type::UNKNOWN,
        SqlVal::Bool(_) => Type::BOOL,
        SqlVal::Int(_) => Type::INT4,
        SqlVal::BigInt(_) => Type::INT8,
        SqlVal::Real(_) => Type::FLOAT8,
        SqlVal::Text(_) => Type::TEXT,
        SqlVal::Blob(_) => Type::BYTEA,
    }
}
