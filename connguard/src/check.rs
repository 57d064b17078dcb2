//! Liveness checks and reconnection for a [`BackendConnection`].
//!
//! Probing is split in two tiers. The probes ([`is_connected`],
//! [`is_pingable`], [`is_truly_connected`]) never fail: any error is
//! logged and reported as an unhealthy connection. Reconnecting
//! ([`reconnect`], [`reconnect_if_needed`]) returns the error from
//! reopening the session, since the caller cannot proceed without it.
//!
//! Messages go through the [`log`](https://docs.rs/log) facade and are
//! discarded when no logger is installed.
#![deny(missing_docs)]

use crate::db::BackendConnection;
use crate::{error, info, warn, Result};

/// Reconnect `conn` unless it is connected and answers a ping.
///
/// At most one close/reopen is attempted. An error reopening the
/// session is logged and returned.
pub fn reconnect_if_needed<C>(conn: &mut C) -> Result<()>
where
    C: BackendConnection + ?Sized,
{
    if !is_truly_connected(conn) {
        reconnect(conn)?;
    }
    Ok(())
}

/// Close the session and open it again.
pub fn reconnect<C>(conn: &mut C) -> Result<()>
where
    C: BackendConnection + ?Sized,
{
    conn.close();
    match conn.connect() {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("An error has occurred while reconnecting. {}", e);
            Err(e)
        }
    }
}

/// Whether `conn` is connected and can be pinged. The ping is only
/// sent when the connection reports itself connected.
pub fn is_truly_connected<C>(conn: &mut C) -> bool
where
    C: BackendConnection + ?Sized,
{
    is_connected(conn) && is_pingable(conn)
}

/// Whether `conn` reports its session as open. Errors count as not connected.
pub fn is_connected<C>(conn: &C) -> bool
where
    C: BackendConnection + ?Sized,
{
    match conn.is_connected() {
        Ok(true) => {
            info!("Connection is still connected.");
            true
        }
        Ok(false) => {
            info!("Connection is not connected anymore.");
            false
        }
        #[allow(unused_variables)] // used only when logging is enabled
        Err(e) => {
            warn!("Connection check failed. {}", e);
            false
        }
    }
}

/// Whether `conn` answers a [`ping`]. Errors count as not pingable.
pub fn is_pingable<C>(conn: &mut C) -> bool
where
    C: BackendConnection + ?Sized,
{
    match ping(conn) {
        Ok(true) => {
            info!("Connection is still pingable.");
            true
        }
        Ok(false) => {
            warn!("Connection is not pingable anymore.");
            false
        }
        #[allow(unused_variables)] // used only when logging is enabled
        Err(e) => {
            warn!("Connection could not be pinged. {}", e);
            false
        }
    }
}

/// Probe the session behind `conn`.
///
/// Uses the connection's native [`Pingable`][crate::db::Pingable] probe
/// when it has one, and otherwise runs its
/// [`dummy_select_sql`][BackendConnection::dummy_select_sql] directly on
/// `conn`. Any error from the dummy statement is returned as is; no
/// attempt is made to tell a dead session apart from other failures.
pub fn ping<C>(conn: &mut C) -> Result<bool>
where
    C: BackendConnection + ?Sized,
{
    if let Some(pingable) = conn.as_pingable() {
        return pingable.ping();
    }
    let sql = conn.dummy_select_sql();
    conn.query(sql)?;
    Ok(true)
}
