//! Browser consent session for desktop hosts: the consent page is opened in
//! the system browser and the redirect is caught by a one-shot listener on
//! the loopback interface.

use async_trait::async_trait;
use services::auth::{BrowserError, BrowserOutcome, BrowserSessionOpener, DeepLinkResolver};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

const SUCCESS_HTML: &str =
    "<html><body><h1>Signed in</h1><p>You may close this window.</p></body></html>";
const NOT_FOUND_HTML: &str = "<html><body><h1>Not found</h1></body></html>";

/// How long an accepted connection may take to send its request line
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Hands a URL to whatever displays it to the user
pub type Launcher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

pub struct LoopbackBrowser {
    listener: Mutex<TcpListener>,
    port: u16,
    timeout: Duration,
    launcher: Launcher,
}

impl LoopbackBrowser {
    /// Bind the callback listener on `127.0.0.1:port` (0 picks a free port)
    pub async fn bind(port: u16, timeout: Duration) -> Result<Self, BrowserError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| BrowserError::Listener(format!("bind 127.0.0.1:{port} failed: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| BrowserError::Listener(format!("local_addr failed: {e}")))?
            .port();

        debug!(port, "OAuth callback listener bound");
        Ok(Self {
            listener: Mutex::new(listener),
            port,
            timeout,
            launcher: Arc::new(|url: &str| open::that_detached(url)),
        })
    }

    /// Replace the system browser launcher
    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept connections until one carries a `GET` on `expected_path`.
    /// Each connection is served on its own task, so a client that connects
    /// and never sends a request cannot hold up the callback.
    async fn wait_for_redirect(
        &self,
        listener: &TcpListener,
        expected_path: &str,
    ) -> Result<String, BrowserError> {
        let (found_tx, mut found_rx) = mpsc::channel::<String>(1);

        loop {
            tokio::select! {
                Some(callback_url) = found_rx.recv() => return Ok(callback_url),
                accepted = listener.accept() => {
                    let (socket, _) = accepted
                        .map_err(|e| BrowserError::Listener(format!("accept failed: {e}")))?;
                    let found_tx = found_tx.clone();
                    let port = self.port;
                    let expected_path = expected_path.to_string();
                    tokio::spawn(async move {
                        let served = serve_connection(socket, port, &expected_path).await;
                        if let Some(callback_url) = served {
                            let _ = found_tx.send(callback_url).await;
                        }
                    });
                }
            }
        }
    }
}

impl DeepLinkResolver for LoopbackBrowser {
    fn create_callback_url(&self, path: &str) -> String {
        format!(
            "http://127.0.0.1:{}/{}",
            self.port,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl BrowserSessionOpener for LoopbackBrowser {
    async fn open(&self, url: &Url, redirect_uri: &str) -> Result<BrowserOutcome, BrowserError> {
        let Ok(listener) = self.listener.try_lock() else {
            return Ok(BrowserOutcome::Locked);
        };

        let expected_path = Url::parse(redirect_uri)
            .map_err(|e| BrowserError::Listener(format!("invalid redirect URI: {e}")))?
            .path()
            .to_string();

        (self.launcher)(url.as_str()).map_err(|e| BrowserError::Launch(e.to_string()))?;
        info!(port = self.port, "Waiting for OAuth redirect");

        match tokio::time::timeout(self.timeout, self.wait_for_redirect(&listener, &expected_path))
            .await
        {
            Ok(Ok(callback_url)) => Ok(BrowserOutcome::Success { url: callback_url }),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "OAuth redirect timed out");
                Ok(BrowserOutcome::Dismiss)
            }
        }
    }
}

/// Answer one connection; returns the callback URL when it is the redirect
async fn serve_connection(mut socket: TcpStream, port: u16, expected_path: &str) -> Option<String> {
    let read = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_target(&mut socket));
    let target = match read.await {
        Ok(Ok(target)) => target,
        Ok(Err(e)) => {
            warn!(error = %e, "Ignoring malformed callback request");
            respond(&mut socket, "400 Bad Request", NOT_FOUND_HTML).await;
            return None;
        }
        Err(_) => {
            debug!("Dropping idle connection on callback listener");
            return None;
        }
    };

    match Url::parse(&format!("http://127.0.0.1:{port}{target}")) {
        Ok(url) if url.path() == expected_path => {
            respond(&mut socket, "200 OK", SUCCESS_HTML).await;
            Some(url.to_string())
        }
        _ => {
            debug!(target = %target, "Request outside the callback path");
            respond(&mut socket, "404 Not Found", NOT_FOUND_HTML).await;
            None
        }
    }
}

async fn read_request_target(socket: &mut TcpStream) -> Result<String, String> {
    let mut buffer = vec![0u8; 8192];
    let size = socket
        .read(&mut buffer)
        .await
        .map_err(|e| format!("read failed: {e}"))?;
    if size == 0 {
        return Err("empty request".to_string());
    }

    let request = String::from_utf8_lossy(&buffer[..size]);
    let first = request.lines().next().unwrap_or_default();
    let mut parts = first.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) if target.starts_with('/') => Ok(target.to_string()),
        _ => Err(format!("unexpected request line: {first}")),
    }
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}
