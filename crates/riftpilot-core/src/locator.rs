// Credential discovery for the two local control planes.
//
// The game client writes `name:pid:port:password:protocol` into a lockfile
// next to its install; the launcher writes the same format under the per-user
// local data directory. When the game client's lockfile cannot be used we fall
// back to reading the running UX process's command line.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

/// Protocol assumed when credentials come from a process command line.
pub const DEFAULT_PROTOCOL: &str = "https";

const LOCKFILE_FIELDS: usize = 5;

/// Upper bound on how long a process listing may take.
const PROCESS_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

static APP_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--app-port=(\d+)").expect("valid app-port pattern"));
static AUTH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--remoting-auth-token=([\w-]+)").expect("valid auth-token pattern")
});

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Connection secrets for one control-plane endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub port: u16,
    pub password: String,
    pub protocol: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("protocol", &self.protocol)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockfileError {
    #[error("lockfile has {found} fields, expected at least 5")]
    TooFewFields { found: usize },

    #[error("invalid port `{0}`")]
    InvalidPort(String),

    #[error("lockfile password is empty")]
    EmptyPassword,
}

/// Parse a colon-delimited lockfile record, taking fields 3-5 as
/// port/password/protocol.
pub fn parse_lockfile(content: &str) -> Result<Credentials, LockfileError> {
    let parts: Vec<&str> = content.trim().split(':').collect();
    if parts.len() < LOCKFILE_FIELDS {
        return Err(LockfileError::TooFewFields { found: parts.len() });
    }

    let raw_port = parts[2].trim();
    let port = raw_port
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| LockfileError::InvalidPort(raw_port.to_string()))?;

    let password = parts[3].trim();
    if password.is_empty() {
        return Err(LockfileError::EmptyPassword);
    }

    let protocol = match parts[4].trim() {
        "" => DEFAULT_PROTOCOL,
        p => p,
    };

    Ok(Credentials {
        port,
        password: password.to_string(),
        protocol: protocol.to_string(),
    })
}

/// Extract `--app-port=<port>` and `--remoting-auth-token=<token>` from a
/// process command line. Both must be present.
pub fn parse_process_args(cmdline: &str) -> Option<Credentials> {
    let port = APP_PORT
        .captures(cmdline)?
        .get(1)?
        .as_str()
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)?;
    let password = AUTH_TOKEN.captures(cmdline)?.get(1)?.as_str().to_string();

    Some(Credentials {
        port,
        password,
        protocol: DEFAULT_PROTOCOL.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Locate trait
// ---------------------------------------------------------------------------

/// A discovery strategy for one control plane. Stateless per call; never
/// fails loudly, absence means "not running".
#[async_trait]
pub trait Locate: Send + Sync {
    /// Human-readable endpoint name for logs.
    fn name(&self) -> &str;

    async fn locate(&self) -> Option<Credentials>;
}

async fn read_lockfile(path: &Path) -> Option<Credentials> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => {
            debug!("could not read lockfile {}: {e}", path.display());
            return None;
        }
    };
    match parse_lockfile(&content) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            debug!("malformed lockfile {}: {e}", path.display());
            None
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Game client
// ---------------------------------------------------------------------------

/// Locator for the primary control plane (game client).
#[derive(Debug, Clone)]
pub struct LeagueClientLocator {
    lockfile_paths: Vec<PathBuf>,
    /// Process whose command line is scanned when no lockfile is usable.
    /// `None` disables the fallback.
    process_name: Option<String>,
}

impl LeagueClientLocator {
    pub fn new(lockfile_paths: Vec<PathBuf>, process_name: Option<String>) -> Self {
        Self {
            lockfile_paths,
            process_name,
        }
    }

    /// Install locations checked when the config does not list any.
    pub fn default_lockfile_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(r"C:\Riot Games\League of Legends\lockfile"),
            PathBuf::from(r"D:\Riot Games\League of Legends\lockfile"),
        ]
    }

    /// Only the first lockfile that exists is considered.
    async fn from_lockfiles(&self) -> Option<Credentials> {
        for path in &self.lockfile_paths {
            if path_exists(path).await {
                return read_lockfile(path).await;
            }
        }
        None
    }

    async fn from_process(&self) -> Option<Credentials> {
        let name = self.process_name.as_deref()?;
        let cmdline = process_command_lines(name).await?;
        let credentials = parse_process_args(&cmdline);
        if credentials.is_none() {
            debug!("{name} is running but its command line has no connection flags");
        }
        credentials
    }
}

#[async_trait]
impl Locate for LeagueClientLocator {
    fn name(&self) -> &str {
        "league client"
    }

    async fn locate(&self) -> Option<Credentials> {
        if let Some(credentials) = self.from_lockfiles().await {
            return Some(credentials);
        }
        self.from_process().await
    }
}

/// Command lines of every running process whose listing mentions
/// `process_name`, joined by newlines.
async fn process_command_lines(process_name: &str) -> Option<String> {
    #[cfg(windows)]
    let mut command = {
        let mut c = tokio::process::Command::new("wmic");
        c.args([
            "process",
            "where",
            &format!("name='{process_name}'"),
            "get",
            "commandline",
        ]);
        c
    };
    #[cfg(not(windows))]
    let mut command = {
        let mut c = tokio::process::Command::new("ps");
        c.args(["-A", "-ww", "-o", "args="]);
        c
    };
    command.kill_on_drop(true);

    let output = match tokio::time::timeout(PROCESS_SCAN_TIMEOUT, command.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!("process listing exited with {}", output.status);
            return None;
        }
        Ok(Err(e)) => {
            debug!("process listing failed: {e}");
            return None;
        }
        Err(_) => {
            warn!("process listing timed out after {PROCESS_SCAN_TIMEOUT:?}");
            return None;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let matching: Vec<&str> = stdout
        .lines()
        .filter(|line| line.contains(process_name))
        .collect();
    if matching.is_empty() {
        None
    } else {
        Some(matching.join("\n"))
    }
}

// ---------------------------------------------------------------------------
// Launcher
// ---------------------------------------------------------------------------

/// Locator for the companion control plane (launcher).
#[derive(Debug, Clone)]
pub struct RiotClientLocator {
    lockfile: Option<PathBuf>,
}

impl RiotClientLocator {
    /// Use `lockfile` when given, otherwise the per-user default location.
    pub fn new(lockfile: Option<PathBuf>) -> Self {
        Self {
            lockfile: lockfile.or_else(Self::default_lockfile),
        }
    }

    /// `<local data dir>/Riot Games/Riot Client/Config/lockfile`
    /// (`%LOCALAPPDATA%` on Windows).
    pub fn default_lockfile() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| {
            dirs.data_local_dir()
                .join("Riot Games")
                .join("Riot Client")
                .join("Config")
                .join("lockfile")
        })
    }

    pub fn lockfile(&self) -> Option<&Path> {
        self.lockfile.as_deref()
    }
}

#[async_trait]
impl Locate for RiotClientLocator {
    fn name(&self) -> &str {
        "riot client"
    }

    async fn locate(&self) -> Option<Credentials> {
        let path = self.lockfile.as_deref()?;
        if !path_exists(path).await {
            return None;
        }
        read_lockfile(path).await
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("riftpilot_locator_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parses_well_formed_lockfile() {
        let creds = parse_lockfile("LeagueClient:1234:54321:s3cr3t-Token:https").unwrap();
        assert_eq!(creds.port, 54321);
        assert_eq!(creds.password, "s3cr3t-Token");
        assert_eq!(creds.protocol, "https");
    }

    #[test]
    fn tolerates_trailing_newline() {
        let creds = parse_lockfile("Riot Client:99:6000:pw:https\r\n").unwrap();
        assert_eq!(creds.port, 6000);
        assert_eq!(creds.protocol, "https");
    }

    #[test]
    fn empty_protocol_defaults_to_https() {
        let creds = parse_lockfile("LeagueClient:1:2999:pw:").unwrap();
        assert_eq!(creds.protocol, DEFAULT_PROTOCOL);
    }

    #[test]
    fn rejects_short_records() {
        assert_eq!(
            parse_lockfile("LeagueClient:1234:54321"),
            Err(LockfileError::TooFewFields { found: 3 })
        );
        assert_eq!(
            parse_lockfile(""),
            Err(LockfileError::TooFewFields { found: 1 })
        );
    }

    #[test]
    fn rejects_bad_port() {
        assert_eq!(
            parse_lockfile("LeagueClient:1:notaport:pw:https"),
            Err(LockfileError::InvalidPort("notaport".into()))
        );
        assert_eq!(
            parse_lockfile("LeagueClient:1:70000:pw:https"),
            Err(LockfileError::InvalidPort("70000".into()))
        );
        assert_eq!(
            parse_lockfile("LeagueClient:1:0:pw:https"),
            Err(LockfileError::InvalidPort("0".into()))
        );
    }

    #[test]
    fn rejects_empty_password() {
        assert_eq!(
            parse_lockfile("LeagueClient:1:2999::https"),
            Err(LockfileError::EmptyPassword)
        );
    }

    #[test]
    fn garbage_never_panics() {
        let inputs = [
            ":::::",
            "\0\0\0",
            "a:b:c:d:e:f:g",
            "💥:💥:💥:💥:💥",
            "LeagueClient:1:-5:pw:https",
        ];
        for input in inputs {
            assert!(parse_lockfile(input).is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn extracts_flags_from_command_line() {
        let cmdline = r#""C:/Riot Games/League of Legends/LeagueClientUx.exe" "--riotclient-auth-token=abc" "--app-port=61234" "--remoting-auth-token=Xy_z-9" "--locale=en_US""#;
        let creds = parse_process_args(cmdline).unwrap();
        assert_eq!(creds.port, 61234);
        assert_eq!(creds.password, "Xy_z-9");
        assert_eq!(creds.protocol, "https");
    }

    #[test]
    fn command_line_without_token_is_absent() {
        assert!(parse_process_args("LeagueClientUx.exe --app-port=61234").is_none());
        assert!(parse_process_args("LeagueClientUx.exe --remoting-auth-token=abc").is_none());
        assert!(parse_process_args("").is_none());
    }

    #[test]
    fn debug_output_redacts_password() {
        let creds = parse_lockfile("LeagueClient:1:2999:hunter2:https").unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("2999"));
    }

    #[tokio::test]
    async fn riot_client_reads_lockfile() {
        let dir = scratch_dir("riot_ok");
        let path = dir.join("lockfile");
        fs::write(&path, "Riot Client:4242:51000:launcherpw:https").unwrap();

        let locator = RiotClientLocator::new(Some(path));
        let creds = locator.locate().await.unwrap();
        assert_eq!(creds.port, 51000);
        assert_eq!(creds.password, "launcherpw");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn riot_client_missing_or_malformed_is_absent() {
        let dir = scratch_dir("riot_bad");
        let path = dir.join("lockfile");

        let locator = RiotClientLocator::new(Some(path.clone()));
        assert!(locator.locate().await.is_none());

        fs::write(&path, "Riot Client:4242").unwrap();
        assert!(locator.locate().await.is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn repeated_malformed_lockfile_stays_quiet_at_warn() {
        let dir = scratch_dir("riot_quiet");
        let path = dir.join("lockfile");
        fs::write(&path, "Riot Client:4242").unwrap();

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        // One lookup per poll tick while the launcher rewrites its lockfile.
        let locator = RiotClientLocator::new(Some(path));
        for _ in 0..3 {
            assert!(locator.locate().await.is_none());
        }
        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.is_empty(), "unexpected warn output: {output}");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn league_client_uses_first_existing_lockfile() {
        let dir = scratch_dir("league_first");
        let missing = dir.join("missing").join("lockfile");
        let first = dir.join("first");
        let second = dir.join("second");
        fs::write(&first, "LeagueClient:1:50001:first:https").unwrap();
        fs::write(&second, "LeagueClient:1:50002:second:https").unwrap();

        let locator = LeagueClientLocator::new(vec![missing, first, second], None);
        let creds = locator.locate().await.unwrap();
        assert_eq!(creds.port, 50001);
        assert_eq!(creds.password, "first");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn league_client_malformed_lockfile_without_fallback_is_absent() {
        let dir = scratch_dir("league_malformed");
        let path = dir.join("lockfile");
        fs::write(&path, "garbage").unwrap();

        let locator = LeagueClientLocator::new(vec![path], None);
        assert!(locator.locate().await.is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn league_client_process_fallback_finds_nothing_for_unknown_process() {
        let locator = LeagueClientLocator::new(
            vec![],
            Some("riftpilot-no-such-process-4f1c".to_string()),
        );
        assert!(locator.locate().await.is_none());
    }
}
