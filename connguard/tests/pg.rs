use std::thread;
use std::time::Duration;

use connguard::check;
use connguard::db::pg::{PgBackend, BACKEND_NAME};
use connguard::db::{connect, BackendConnection, ConnectionMethods, ConnectionSpec, Pingable};
use connguard::{connect_guarded, DriverOptions, SqlVal, CHECK_CONNECTION_BEFOREHAND};
use connguard_test_helper::{pg_connstr, setup};
use pretty_assertions::assert_eq;

fn spec(connstr: &str, guarded: bool) -> ConnectionSpec {
    let mut options = DriverOptions::new();
    if guarded {
        options.insert(CHECK_CONNECTION_BEFOREHAND, true);
    }
    ConnectionSpec::new(BACKEND_NAME, connstr).with_driver_options(options)
}

fn backend_pid(conn: &mut impl ConnectionMethods) -> i32 {
    conn.query("SELECT pg_backend_pid()")
        .unwrap()
        .scalar()
        .unwrap()
        .integer()
        .unwrap()
}

/// Kill the server process behind `pid` from a separate session.
fn terminate_backend(connstr: &str, pid: i32) {
    let mut admin = connect(&spec(connstr, false)).unwrap();
    let rows = admin
        .execute_query("SELECT pg_terminate_backend($1)", &[SqlVal::Int(pid)])
        .unwrap();
    assert_eq!(rows.scalar(), Some(&SqlVal::Bool(true)));
}

/// The client notices the closed socket asynchronously.
fn wait_for_disconnect(conn: &impl BackendConnection) {
    for _ in 0..100 {
        if !conn.is_connected().unwrap() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("server did not close the session");
}

#[test]
fn terminated_session_is_replaced() {
    setup();
    let Some(connstr) = pg_connstr() else {
        return;
    };
    let mut conn = connect_guarded(&spec(&connstr, true)).unwrap();
    let before = backend_pid(&mut conn);

    terminate_backend(&connstr, before);
    wait_for_disconnect(&conn);

    let after = backend_pid(&mut conn);
    assert_ne!(before, after);
    assert!(conn.is_connected().unwrap());
}

#[test]
fn terminated_session_fails_unguarded() {
    setup();
    let Some(connstr) = pg_connstr() else {
        return;
    };
    let mut conn = connect_guarded(&spec(&connstr, false)).unwrap();
    let pid = backend_pid(&mut conn);

    terminate_backend(&connstr, pid);
    wait_for_disconnect(&conn);

    assert!(conn.query("SELECT 1").is_err());
    assert!(!conn.is_connected().unwrap());
}

#[test]
fn native_ping_reports_terminated_session() {
    setup();
    let Some(connstr) = pg_connstr() else {
        return;
    };
    let mut conn = PgBackend::new()
        .open(&connstr, &DriverOptions::new())
        .unwrap();
    assert!(conn.ping().unwrap());
    assert!(check::is_truly_connected(&mut conn));
    let pid = backend_pid(&mut conn);

    terminate_backend(&connstr, pid);
    wait_for_disconnect(&conn);

    assert!(!conn.ping().unwrap());
    assert!(!check::is_truly_connected(&mut conn));
    check::reconnect_if_needed(&mut conn).unwrap();
    assert!(conn.ping().unwrap());
    assert_ne!(backend_pid(&mut conn), pid);
}

#[test]
fn guarded_transaction_with_params() {
    setup();
    let Some(connstr) = pg_connstr() else {
        return;
    };
    let mut conn = connect_guarded(&spec(&connstr, true)).unwrap();
    let pid = backend_pid(&mut conn);
    terminate_backend(&connstr, pid);
    wait_for_disconnect(&conn);

    let mut tr = conn.begin_transaction().unwrap();
    tr.execute_update(
        "CREATE TEMPORARY TABLE post (id INTEGER PRIMARY KEY, title TEXT NOT NULL)",
        &[],
    )
    .unwrap();
    let n = tr
        .execute_update(
            "INSERT INTO post (id, title) VALUES ($1, $2), ($3, $4)",
            &[SqlVal::Int(1), "first".into(), SqlVal::Int(2), "second".into()],
        )
        .unwrap();
    assert_eq!(n, 2);
    tr.commit().unwrap();

    let rows = conn
        .execute_query("SELECT title FROM post WHERE id = $1", &[SqlVal::Int(2)])
        .unwrap();
    assert_eq!(rows.scalar(), Some(&SqlVal::Text("second".to_string())));
}

#[test]
fn unmapped_column_types_need_a_cast() {
    setup();
    let Some(connstr) = pg_connstr() else {
        return;
    };
    let mut conn = connect_guarded(&spec(&connstr, true)).unwrap();
    assert!(conn.query("SELECT 1.5").is_err());
    assert_eq!(
        conn.query("SELECT 1.5::text").unwrap().scalar(),
        Some(&SqlVal::Text("1.5".to_string()))
    );
}
