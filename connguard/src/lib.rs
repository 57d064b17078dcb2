//! Connection decorator which makes sure the database session behind a
//! connection is still alive before it is used.
//!
//! Long-lived connections are routinely dropped by the server side
//! (idle timeouts, restarts, proxies). [`GuardedConnection`] wraps any
//! [`BackendConnection`][db::BackendConnection] and, when
//! `check_connection_beforehand` is enabled in the connection's driver
//! options, probes the session before each query, update or transaction
//! start. A dead session is closed and reopened once; if reopening fails
//! the error is returned to the caller.
//!
//! ```no_run
//! use connguard::db::{ConnectionMethods, ConnectionSpec};
//!
//! # fn main() -> connguard::Result<()> {
//! let mut spec = ConnectionSpec::new("sqlite", "app.db");
//! spec.driver_options.insert("check_connection_beforehand", true);
//! let mut conn = connguard::connect_guarded(&spec)?;
//! let rows = conn.query("SELECT 1")?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

use thiserror::Error as ThisError;

pub mod check;
pub mod db;
pub mod options;
pub mod sqlval;

mod guard;

pub use guard::{connect_guarded, connect_guarded_with, GuardedConnection};
pub use options::{DriverOptions, CHECK_CONNECTION_BEFOREHAND};
pub use sqlval::SqlVal;

/// Result type that uses [`crate::Error`].
pub type Result<T> = std::result::Result<T, crate::Error>;

/// Connguard errors.
#[allow(missing_docs)]
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Connection is not open")]
    NotConnected,
    #[error("Unknown backend {0}")]
    UnknownBackend(String),
    #[error("Type mismatch converting SqlVal. Expected {0}, found value {1:?}")]
    CannotConvertSqlVal(&'static str, SqlVal),
    #[error("Transaction has already been consumed")]
    TransactionConsumed,
    #[error("Invalid driver option {key}: {detail}")]
    InvalidOption { key: String, detail: String },
    #[error("(De)serialization error {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("IO error {0}")]
    IO(#[from] std::io::Error),
    #[cfg(feature = "sqlite")]
    #[error("Sqlite error {0}")]
    SQLite(#[from] rusqlite::Error),
    #[cfg(feature = "pg")]
    #[error("Postgres error {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[cfg(feature = "tls")]
    #[error("TLS error {0}")]
    TLS(#[from] native_tls::Error),
    #[error("Generic error {0}")]
    Generic(#[from] Box<dyn std::error::Error + Sync + Send>),
}

#[cfg(feature = "log")]
pub use log::debug;
#[cfg(feature = "log")]
pub use log::error;
#[cfg(feature = "log")]
pub use log::info;
#[cfg(feature = "log")]
pub use log::warn;

#[cfg(not(feature = "log"))]
mod cglog {
    // this module is just for grouping -- macro_export puts them in the crate root

    /// Noop for when feature log is not enabled.
    #[macro_export]
    macro_rules! debug {
        (target: $target:expr, $($arg:tt)+) => {};
        ($($arg:tt)+) => {};
    }

    /// Noop for when feature log is not enabled.
    #[macro_export]
    macro_rules! info {
        (target: $target:expr, $($arg:tt)+) => {};
        ($($arg:tt)+) => {};
    }

    /// Noop for when feature log is not enabled.
    #[macro_export]
    macro_rules! warn {
        (target: $target:expr, $($arg:tt)+) => {};
        ($($arg:tt)+) => {};
    }

    /// Noop for when feature log is not enabled.
    #[macro_export]
    macro_rules! error {
        (target: $target:expr, $($arg:tt)+) => {};
        ($($arg:tt)+) => {};
    }
}
