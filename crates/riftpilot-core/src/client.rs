// Authenticated request client for a single local control plane.
//
// Each `Connector` owns one discovery strategy and the credentials it last
// produced. Requests go to `127.0.0.1:<port>` with basic auth; the endpoints
// present self-signed certificates, so certificate verification is disabled
// and the lockfile password is the trust boundary. A transport failure drops
// the credentials so the next request rediscovers them.

use std::error::Error as StdError;
use std::io::ErrorKind;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::locator::{Credentials, Locate};
use crate::protocol::{ApiResponse, Method};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

const AUTH_USER: &str = "riot";
const LOOPBACK: &str = "127.0.0.1";

// ---------------------------------------------------------------------------
// ControlPlane trait
// ---------------------------------------------------------------------------

/// One local control-plane endpoint as seen by the automation layer.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the last discovery or request succeeded. Advisory only.
    fn is_connected(&self) -> bool;

    /// Run discovery now, replacing any held credentials wholesale.
    async fn connect(&self) -> bool;

    /// Issue one request. Discovers credentials first when disconnected.
    /// `None` when discovery fails or the transport errors.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Option<ApiResponse>;
}

// ---------------------------------------------------------------------------
// Transport error classification
// ---------------------------------------------------------------------------

/// Whether a transport error is routine lifecycle noise from the local
/// process (starting, stopping, resetting sessions) or worth an operator's
/// attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportNoise {
    Expected,
    Unexpected,
}

/// Walk the error chain looking for refused/reset/half-closed sockets.
pub fn classify_transport_error(err: &(dyn StdError + 'static)) -> TransportNoise {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::NotConnected
            ) {
                return TransportNoise::Expected;
            }
        }
        let message = e.to_string().to_lowercase();
        if message.contains("connection closed before message completed")
            || message.contains("connection reset")
            || message.contains("connection refused")
        {
            return TransportNoise::Expected;
        }
        current = e.source();
    }
    TransportNoise::Unexpected
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ConnectionState {
    credentials: Option<Credentials>,
    connected: bool,
}

/// Request client for one control plane, parameterized by its discovery
/// strategy.
pub struct Connector<L> {
    locator: L,
    http: reqwest::Client,
    state: Mutex<ConnectionState>,
}

impl<L: Locate> Connector<L> {
    /// Build a connector that starts disconnected. `timeout` bounds every
    /// request end to end.
    pub fn new(locator: L, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self {
            locator,
            http,
            state: Mutex::new(ConnectionState::default()),
        })
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, credentials: Credentials) {
        let mut state = self.state();
        let previous_port = state.credentials.as_ref().map(|c| c.port);
        if previous_port != Some(credentials.port) {
            info!(
                port = credentials.port,
                "{} connected on port {}",
                self.locator.name(),
                credentials.port
            );
        }
        state.credentials = Some(credentials);
        state.connected = true;
    }

    fn mark_disconnected(&self) {
        let mut state = self.state();
        state.connected = false;
        state.credentials = None;
    }

    /// Credentials to use for the next request, discovering them at most
    /// once when not connected.
    async fn usable_credentials(&self) -> Option<Credentials> {
        {
            let state = self.state();
            if state.connected {
                if let Some(credentials) = &state.credentials {
                    return Some(credentials.clone());
                }
            }
        }
        if self.connect().await {
            self.state().credentials.clone()
        } else {
            None
        }
    }

    async fn send(
        &self,
        credentials: &Credentials,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(u16, String), reqwest::Error> {
        let url = format!(
            "{}://{LOOPBACK}:{}{path}",
            credentials.protocol, credentials.port
        );
        let mut request = self
            .http
            .request(method.into(), &url)
            .basic_auth(AUTH_USER, Some(&credentials.password))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }
}

#[async_trait]
impl<L: Locate> ControlPlane for Connector<L> {
    fn name(&self) -> &str {
        self.locator.name()
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn connect(&self) -> bool {
        match self.locator.locate().await {
            Some(credentials) => {
                self.install(credentials);
                true
            }
            None => {
                self.mark_disconnected();
                false
            }
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Option<ApiResponse> {
        let credentials = self.usable_credentials().await?;

        match self.send(&credentials, method, path, body).await {
            Ok((status, text)) => {
                debug!(?method, path, status, "{} request complete", self.name());
                Some(ApiResponse::from_parts(status, &text))
            }
            Err(e) => {
                self.mark_disconnected();
                match classify_transport_error(&e) {
                    TransportNoise::Expected => {
                        debug!(?method, path, "{} unavailable: {e}", self.name());
                    }
                    TransportNoise::Unexpected => {
                        warn!(?method, path, "{} request error: {e}", self.name());
                    }
                }
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Locator that hands out fixed credentials and counts calls.
    struct FixedLocator {
        credentials: Option<Credentials>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Locate for FixedLocator {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn locate(&self) -> Option<Credentials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.credentials.clone()
        }
    }

    fn http_credentials(port: u16) -> Credentials {
        Credentials {
            port,
            password: "secret".to_string(),
            protocol: "http".to_string(),
        }
    }

    fn connector_for(
        credentials: Option<Credentials>,
    ) -> (Connector<FixedLocator>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let locator = FixedLocator {
            credentials,
            calls: calls.clone(),
        };
        let connector = Connector::new(locator, Duration::from_millis(500)).unwrap();
        (connector, calls)
    }

    /// Read one HTTP request (headers plus Content-Length body).
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    /// Serve `count` requests with the same canned response, returning the
    /// raw requests received.
    async fn serve(
        count: usize,
        status_line: &'static str,
        body: &'static str,
    ) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for _ in 0..count {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
            requests
        });
        (port, handle)
    }

    #[tokio::test]
    async fn ok_response_is_parsed_and_authenticated() {
        let (port, server) = serve(1, "200 OK", r#""ChampSelect""#).await;
        let (connector, calls) = connector_for(Some(http_credentials(port)));

        let resp = connector
            .request(Method::Get, "/lol-gameflow/v1/gameflow-phase", None)
            .await
            .expect("response");
        assert!(resp.ok);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, Value::String("ChampSelect".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let requests = server.await.unwrap();
        let request = requests[0].to_lowercase();
        assert!(request.starts_with("get /lol-gameflow/v1/gameflow-phase http/1.1"));
        // base64("riot:secret")
        assert!(request.contains(&"authorization: basic cmlvdDpzZWNyZXQ=".to_lowercase()));
        assert!(request.contains("accept: application/json"));
    }

    #[tokio::test]
    async fn non_2xx_status_still_returns_response() {
        let (port, server) = serve(1, "404 Not Found", "no such resource").await;
        let (connector, _) = connector_for(Some(http_credentials(port)));

        let resp = connector
            .request(Method::Get, "/lol-champ-select/v1/session", None)
            .await
            .expect("response");
        assert!(!resp.ok);
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, Value::String("no such resource".into()));
        assert!(connector.is_connected());
        let _ = server.await;
    }

    #[tokio::test]
    async fn patch_body_is_sent_as_json() {
        let (port, server) = serve(1, "204 No Content", "").await;
        let (connector, _) = connector_for(Some(http_credentials(port)));

        let body = serde_json::json!({ "championId": 64, "completed": true });
        let resp = connector
            .request(
                Method::Patch,
                "/lol-champ-select/v1/session/actions/3",
                Some(&body),
            )
            .await
            .expect("response");
        assert!(resp.ok);
        assert_eq!(resp.status, 204);

        let requests = server.await.unwrap();
        let request = &requests[0];
        assert!(request.starts_with("PATCH /lol-champ-select/v1/session/actions/3 "));
        let payload = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let sent: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(sent, body);
    }

    #[tokio::test]
    async fn discovery_happens_inside_the_first_request() {
        let (port, server) = serve(1, "200 OK", "{}").await;
        let (connector, calls) = connector_for(Some(http_credentials(port)));
        assert!(!connector.is_connected());

        let resp = connector.request(Method::Get, "/x", None).await;
        assert!(resp.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(connector.is_connected());
        let _ = server.await;
    }

    #[tokio::test]
    async fn connected_connector_reuses_credentials() {
        let (port, server) = serve(2, "200 OK", "{}").await;
        let (connector, calls) = connector_for(Some(http_credentials(port)));

        assert!(connector.request(Method::Get, "/a", None).await.is_some());
        assert!(connector.request(Method::Get, "/b", None).await.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn failed_discovery_returns_none() {
        let (connector, calls) = connector_for(None);
        assert!(connector.request(Method::Get, "/x", None).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn refused_connection_disconnects_and_rediscovers_next_time() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (connector, calls) = connector_for(Some(http_credentials(port)));
        assert!(connector.request(Method::Get, "/x", None).await.is_none());
        assert!(!connector.is_connected());

        assert!(connector.request(Method::Get, "/x", None).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn half_closed_socket_is_absorbed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let (connector, _) = connector_for(Some(http_credentials(port)));
        assert!(connector.request(Method::Get, "/x", None).await.is_none());
        assert!(!connector.is_connected());
        let _ = server.await;
    }

    #[tokio::test]
    async fn unresponsive_endpoint_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(3)).await;
            drop(socket);
        });

        let (connector, _) = connector_for(Some(http_credentials(port)));
        let started = std::time::Instant::now();
        assert!(connector.request(Method::Get, "/x", None).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
        server.abort();
    }

    #[tokio::test]
    async fn connect_replaces_credentials() {
        let (connector, calls) = connector_for(Some(http_credentials(1234)));
        assert!(connector.connect().await);
        assert!(connector.connect().await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(connector.is_connected());
    }

    #[test]
    fn reset_and_refused_are_expected() {
        for kind in [
            ErrorKind::ConnectionRefused,
            ErrorKind::ConnectionReset,
            ErrorKind::UnexpectedEof,
        ] {
            let err = std::io::Error::new(kind, "boom");
            assert_eq!(classify_transport_error(&err), TransportNoise::Expected);
        }
    }

    #[test]
    fn hang_up_message_is_expected() {
        let err = std::io::Error::other("connection closed before message completed");
        assert_eq!(classify_transport_error(&err), TransportNoise::Expected);
    }

    #[test]
    fn other_errors_are_unexpected() {
        let err = std::io::Error::new(ErrorKind::PermissionDenied, "tls handshake eof");
        assert_eq!(classify_transport_error(&err), TransportNoise::Unexpected);
    }
}
