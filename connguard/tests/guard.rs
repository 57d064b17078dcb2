use assert_matches::assert_matches;
use connguard::db::{BackendConnection, ConnectionMethods};
use connguard::{connect_guarded_with, DriverOptions, Error, GuardedConnection, SqlVal};
use connguard::CHECK_CONNECTION_BEFOREHAND;
use connguard_test_helper::{Call, MockBackend, MockConnection};
use pretty_assertions::assert_eq;

fn guarded(conn: MockConnection) -> GuardedConnection<MockConnection> {
    GuardedConnection::new(conn, true)
}

#[test_log::test]
fn healthy_connection_is_not_reconnected() {
    let mut conn = guarded(MockConnection::healthy());
    conn.query("SELECT name FROM users").unwrap();

    let inner = conn.get_ref();
    assert_eq!(
        inner.calls(),
        vec![
            Call::IsConnected,
            Call::Query("SELECT 1".to_string()),
            Call::Query("SELECT name FROM users".to_string()),
        ]
    );
    assert_eq!(inner.count(&Call::Close), 0);
    assert_eq!(inner.count(&Call::Connect), 0);
}

#[test_log::test]
fn healthy_connection_with_native_ping() {
    let mut conn = guarded(MockConnection::healthy().with_native_ping());
    conn.execute_update("DELETE FROM users", &[]).unwrap();

    assert_eq!(
        conn.get_ref().calls(),
        vec![
            Call::IsConnected,
            Call::Ping,
            Call::ExecuteUpdate("DELETE FROM users".to_string(), vec![]),
        ]
    );
}

#[test_log::test]
fn disconnected_connection_is_reopened_once() {
    let mut conn = guarded(MockConnection::healthy().disconnected());
    conn.query("SELECT 2").unwrap();

    let inner = conn.get_ref();
    // not connected, so no ping is attempted
    assert_eq!(
        inner.calls(),
        vec![
            Call::IsConnected,
            Call::Close,
            Call::Connect,
            Call::Query("SELECT 2".to_string()),
        ]
    );
}

#[test_log::test]
fn dead_session_is_reopened_once() {
    let mut conn = guarded(MockConnection::healthy().dead_session());
    let rows = conn.query("SELECT 2").unwrap();
    assert_eq!(rows.len(), 1);

    let inner = conn.get_ref();
    assert_eq!(inner.count(&Call::Close), 1);
    assert_eq!(inner.count(&Call::Connect), 1);
    assert_eq!(
        inner.calls().last(),
        Some(&Call::Query("SELECT 2".to_string()))
    );
}

#[test_log::test]
fn native_ping_false_is_reopened_once() {
    let mut conn = guarded(MockConnection::healthy().dead_session().with_native_ping());
    conn.query("SELECT 2").unwrap();

    assert_eq!(
        conn.get_ref().calls(),
        vec![
            Call::IsConnected,
            Call::Ping,
            Call::Close,
            Call::Connect,
            Call::Query("SELECT 2".to_string()),
        ]
    );
}

#[test_log::test]
fn failing_is_connected_counts_as_disconnected() {
    let mut conn = guarded(MockConnection::healthy().failing_is_connected());
    conn.query("SELECT 2").unwrap();

    let inner = conn.get_ref();
    assert_eq!(inner.count(&Call::Close), 1);
    assert_eq!(inner.count(&Call::Connect), 1);
}

#[test_log::test]
fn reconnect_failure_propagates() {
    let mut conn = guarded(MockConnection::healthy().disconnected().failing_connect());
    let err = conn.query("SELECT 2").unwrap_err();
    assert_matches!(err, Error::Generic(e) if e.to_string() == "connection refused");

    let inner = conn.get_ref();
    assert_eq!(inner.count(&Call::Connect), 1);
    assert_eq!(inner.count(&Call::Query("SELECT 2".to_string())), 0);
}

#[test_log::test]
fn reconnect_failure_is_not_retried_within_a_call() {
    let mut conn = guarded(MockConnection::healthy().dead_session().failing_connect());
    conn.execute_update("UPDATE t SET a = 1", &[]).unwrap_err();
    assert_eq!(conn.get_ref().count(&Call::Connect), 1);

    // each guarded call gets its own single attempt
    conn.execute_update("UPDATE t SET a = 1", &[]).unwrap_err();
    assert_eq!(conn.get_ref().count(&Call::Connect), 2);
}

#[test_log::test]
fn disabled_check_never_probes() {
    let mut conn = GuardedConnection::new(MockConnection::healthy().disconnected(), false);
    let err = conn.query("SELECT 2").unwrap_err();
    assert_matches!(err, Error::NotConnected);
    conn.execute_query("SELECT ?", &[SqlVal::Int(1)]).unwrap_err();
    conn.execute_update("DELETE FROM t", &[]).unwrap_err();
    conn.begin_transaction().unwrap_err();

    assert_eq!(
        conn.get_ref().calls(),
        vec![
            Call::Query("SELECT 2".to_string()),
            Call::ExecuteQuery("SELECT ?".to_string(), vec![SqlVal::Int(1)]),
            Call::ExecuteUpdate("DELETE FROM t".to_string(), vec![]),
            Call::BeginTransaction,
        ]
    );
}

#[test_log::test]
fn absent_option_disables_check() {
    let mut options = DriverOptions::new();
    options.insert("unrelated", "value");
    let conn = GuardedConnection::from_options(MockConnection::healthy(), &mut options);
    assert!(!conn.checks_connection_beforehand());
    assert_eq!(options.len(), 1);
}

#[test_log::test]
fn option_enables_check_and_is_removed() {
    let mut options = DriverOptions::new();
    options.insert(CHECK_CONNECTION_BEFOREHAND, "yes");
    options.insert("unrelated", "value");
    let mut conn =
        GuardedConnection::from_options(MockConnection::healthy().disconnected(), &mut options);
    assert!(conn.checks_connection_beforehand());
    assert!(!options.contains_key(CHECK_CONNECTION_BEFOREHAND));
    assert!(options.contains_key("unrelated"));

    conn.query("SELECT 2").unwrap();
    assert_eq!(conn.get_ref().count(&Call::Connect), 1);
}

#[test_log::test]
fn false_option_disables_check() {
    let mut options = DriverOptions::new();
    options.insert(CHECK_CONNECTION_BEFOREHAND, false);
    let conn = GuardedConnection::from_options(MockConnection::healthy(), &mut options);
    assert!(!conn.checks_connection_beforehand());
    assert!(options.is_empty());
}

#[test_log::test]
fn backend_never_sees_check_option() {
    let backend = MockBackend::new();
    let mut options = DriverOptions::new();
    options.insert(CHECK_CONNECTION_BEFOREHAND, "yes");
    options.insert("unrelated", "value");

    let conn = connect_guarded_with(&backend, "mock://", &options).unwrap();
    assert!(conn.checks_connection_beforehand());
    assert_eq!(conn.backend_name(), "mock");

    let received = backend.received_options();
    assert_eq!(received.len(), 1);
    assert!(!received[0].contains_key(CHECK_CONNECTION_BEFOREHAND));
    assert!(received[0].contains_key("unrelated"));
    // the caller's options are left alone
    assert_eq!(options.len(), 2);
}

#[test_log::test]
fn arguments_and_results_pass_through_unchanged() {
    let mut conn = guarded(MockConnection::healthy());
    let params = vec![SqlVal::from("alice"), SqlVal::from(42i64), SqlVal::Null];
    let rows = conn.execute_query("SELECT ?, ?, ?", &params).unwrap();
    assert_eq!(&rows[0], params.as_slice());
    assert_eq!(conn.execute_update("INSERT", &params).unwrap(), 3);

    let calls = conn.get_ref().calls();
    assert!(calls.contains(&Call::ExecuteQuery("SELECT ?, ?, ?".to_string(), params.clone())));
    assert!(calls.contains(&Call::ExecuteUpdate("INSERT".to_string(), params)));
}

#[test_log::test]
fn begin_transaction_is_guarded() {
    let mut conn = guarded(MockConnection::healthy().dead_session());
    {
        let mut tr = conn.begin_transaction().unwrap();
        tr.execute_update("INSERT", &[SqlVal::Int(1)]).unwrap();
        tr.commit().unwrap();
    }

    assert_eq!(
        conn.get_ref().calls()[2..].to_vec(),
        vec![
            Call::Close,
            Call::Connect,
            Call::BeginTransaction,
            Call::ExecuteUpdate("INSERT".to_string(), vec![SqlVal::Int(1)]),
            Call::Commit,
        ]
    );
}

#[test_log::test]
fn ping_bypasses_check() {
    let mut conn = guarded(MockConnection::healthy().dead_session());
    // dummy query fails on the dead session and is reported, not repaired
    conn.ping().unwrap_err();
    assert_eq!(
        conn.get_ref().calls(),
        vec![Call::Query("SELECT 1".to_string())]
    );
}

#[test_log::test]
fn nested_guards_do_not_recurse() {
    let inner = guarded(MockConnection::healthy().dead_session());
    let mut outer = GuardedConnection::new(inner, true);
    outer.query("SELECT 2").unwrap();

    let mock = outer.get_ref().get_ref();
    // the outer probe reaches the mock through the inner guard's ping,
    // so the session is repaired by the outer check and the inner check
    // then finds it healthy
    assert_eq!(mock.count(&Call::Connect), 1);
    assert_eq!(
        mock.calls().last(),
        Some(&Call::Query("SELECT 2".to_string()))
    );
}

#[test_log::test]
fn session_dropped_between_calls() {
    let mut conn = guarded(MockConnection::healthy());
    conn.query("SELECT 2").unwrap();
    assert_eq!(conn.get_ref().count(&Call::Connect), 0);

    conn.get_mut().kill_session();
    conn.get_ref().clear_calls();
    conn.query("SELECT 3").unwrap();
    assert_eq!(conn.get_ref().count(&Call::Connect), 1);
    assert!(conn.is_connected().unwrap());
}
