//! Temporary PostgreSQL server for tests.
//!
//! A single server is created on first use with `initdb` and `postgres`,
//! listening only on a unix socket in a temporary directory, and torn
//! down when the test process exits. Set `CONNGUARD_PG_CONNSTR` to use
//! an existing server instead.

use std::io::{BufRead, BufReader, Read};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{LazyLock, Mutex};

use tempfile::TempDir;

/// Environment variable overriding the temporary server.
pub const PG_CONNSTR_ENV: &str = "CONNGUARD_PG_CONNSTR";

/// Error starting the temporary server.
#[derive(Debug, thiserror::Error)]
pub enum PgServerError {
    /// IO errors, including a missing binary.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// `initdb` could not be located.
    #[error("initdb not found in PATH or via pg_config")]
    InitdbNotFound,
    /// `initdb` ran but failed.
    #[error("initdb failed: {0}")]
    Initdb(String),
    /// The server exited before accepting connections.
    #[error("postgres process died: {0}")]
    ServerDied(String),
}

/// A running temporary server. The process is killed and its files
/// removed on drop.
#[derive(Debug)]
pub struct PgServer {
    dir: TempDir,
    proc: Child,
}

impl PgServer {
    /// Run `initdb` in a fresh directory and start `postgres` on it.
    pub fn start() -> Result<Self, PgServerError> {
        let bindir = find_bindir()?;
        let dir = tempfile::tempdir()?;
        let datadir = dir.path().join("data");

        log::info!("running initdb in {}", datadir.display());
        let output = Command::new(bindir.join("initdb"))
            .arg("-D")
            .arg(&datadir)
            .arg("-U")
            .arg("postgres")
            .arg("--auth=trust")
            .output()?;
        if !output.status.success() {
            return Err(PgServerError::Initdb(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        let sockdir = dir.path().join("socket");
        std::fs::create_dir(&sockdir)?;

        let mut proc = Command::new(bindir.join("postgres"))
            .arg("-c")
            .arg("logging_collector=false")
            .arg("-D")
            .arg(&datadir)
            .arg("-k")
            .arg(&sockdir)
            .arg("-h")
            .arg("")
            .stderr(Stdio::piped())
            .spawn()?;
        let Some(stderr) = proc.stderr.take() else {
            proc.kill().ok();
            return Err(PgServerError::ServerDied("no stderr".to_string()));
        };
        let mut stderr = BufReader::new(stderr);
        let mut buf = String::new();
        loop {
            buf.clear();
            if stderr.read_line(&mut buf)? == 0 || proc.try_wait()?.is_some() {
                stderr.read_to_string(&mut buf).ok();
                proc.kill().ok();
                return Err(PgServerError::ServerDied(buf));
            }
            log::debug!("postgres: {}", buf.trim_end());
            if buf.contains("ready to accept connections") {
                break;
            }
        }
        // keep draining so the server never blocks on a full pipe
        std::thread::spawn(move || {
            for line in stderr.lines().map_while(std::result::Result::ok) {
                log::debug!("postgres: {line}");
            }
        });
        log::info!("created temporary postgres server");
        Ok(PgServer { dir, proc })
    }

    /// Directory holding the server's unix socket.
    pub fn sockdir(&self) -> PathBuf {
        self.dir.path().join("socket")
    }

    /// Connection string for the `postgres` database as the `postgres` user.
    pub fn connstr(&self) -> String {
        connstr_for(&self.sockdir())
    }
}

impl Drop for PgServer {
    fn drop(&mut self) {
        self.proc.kill().ok();
        self.proc.wait().ok();
    }
}

fn connstr_for(sockdir: &Path) -> String {
    format!("host={} user=postgres dbname=postgres", sockdir.display())
}

fn find_bindir() -> Result<PathBuf, PgServerError> {
    if let Some(dir) = which::which("initdb")
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        return Ok(dir);
    }
    // Debian and friends keep the server binaries off PATH
    let output = Command::new("pg_config").arg("--bindir").output();
    match output {
        Ok(output) if output.status.success() => {
            let dir = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
            if dir.join("initdb").exists() {
                Ok(dir)
            } else {
                Err(PgServerError::InitdbNotFound)
            }
        }
        _ => Err(PgServerError::InitdbNotFound),
    }
}

extern "C" fn pg_server_teardown() {
    if let Ok(mut server) = TMP_SERVER.deref().lock() {
        drop(server.take());
    }
}

static TMP_SERVER: LazyLock<Mutex<Option<PgServer>>> = LazyLock::new(|| {
    let server = match PgServer::start() {
        Ok(server) => server,
        Err(e) => {
            log::warn!("could not start temporary postgres server: {e}");
            return Mutex::new(None);
        }
    };
    unsafe {
        // Try to delete all the pg files when the process exits
        libc::atexit(pg_server_teardown);
    }
    Mutex::new(Some(server))
});

/// Connection string for a test server.
///
/// Uses [`PG_CONNSTR_ENV`] when set, and otherwise the shared temporary
/// server. Returns `None` when neither is available, after printing why,
/// so the calling test can skip itself.
pub fn pg_connstr() -> Option<String> {
    if let Ok(connstr) = std::env::var(PG_CONNSTR_ENV) {
        return Some(connstr);
    }
    let connstr = TMP_SERVER
        .deref()
        .lock()
        .ok()
        .and_then(|server| server.as_ref().map(PgServer::connstr));
    if connstr.is_none() {
        eprintln!("Skipping test: no postgres server available (set {PG_CONNSTR_ENV} or install initdb)");
    }
    connstr
}
