//! Capturing the authorization redirect.
//!
//! The consent page redirects the browser to the registered redirect URI with
//! `code` and `state` (or `error`) in the query string. When that URI points
//! at this machine, [`LoopbackAgent`] answers the redirect itself. Otherwise
//! [`ConsoleAgent`] asks the operator to paste the address the browser landed
//! on.

use std::borrow::Cow;
use std::io::BufRead;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

/// Largest request head read from the loopback socket.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// How long one loopback connection may take to send its request line.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters carried by the authorization redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Anti-forgery state echoed by the provider.
    pub state: Option<String>,
    /// Error code, when the user or provider refused.
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

impl RedirectParams {
    /// Extracts the parameters from a redirect URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }

    fn from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }

    /// Parses operator input: either the full redirected URL or just its
    /// query string.
    #[must_use]
    pub fn parse_input(input: &str) -> Option<Self> {
        let value = input.trim();
        if value.is_empty() {
            return None;
        }

        let params = match Url::parse(value) {
            Ok(url) => Self::from_url(&url),
            Err(_) if value.contains('=') => {
                let query = value.trim_start_matches('?');
                Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
            }
            Err(_) => return None,
        };

        params.is_complete().then_some(params)
    }

    /// Parses the request line of an HTTP request, returning the request
    /// path and the redirect parameters.
    #[must_use]
    pub fn from_request(request: &str) -> Option<(String, Self)> {
        let line = request.lines().next()?;
        let mut parts = line.split_whitespace();
        let _method = parts.next()?;
        let target = parts.next()?;

        let url = Url::parse("http://localhost").ok()?.join(target).ok()?;
        Some((url.path().to_string(), Self::from_url(&url)))
    }

    /// True once the redirect carries either a code or an error.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// Shows the consent page to the user and captures where it redirects.
#[async_trait]
pub trait AuthorizationAgent: Send + Sync {
    /// Sends the user to `authorization_url` and waits for the redirect.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect cannot be captured.
    async fn capture(&self, authorization_url: &Url) -> Result<RedirectParams>;
}

/// Picks the agent suited to the registered redirect URI.
///
/// # Errors
///
/// Returns an error if the redirect URI is not a valid URL.
pub fn agent_for(redirect_uri: &str) -> Result<Box<dyn AuthorizationAgent>> {
    let redirect = Url::parse(redirect_uri)?;
    if LoopbackAgent::is_loopback(&redirect) {
        Ok(Box::new(LoopbackAgent::new(redirect)))
    } else {
        Ok(Box::new(ConsoleAgent))
    }
}

fn open_in_browser(url: &Url) {
    info!("Opening authorization page in the browser");
    if let Err(e) = opener::open(url.as_str()) {
        warn!("Could not open the browser automatically: {e}");
    }
    eprintln!("If the browser did not open, visit:\n\n  {url}\n");
}

/// Answers the redirect on a local port.
#[derive(Debug, Clone)]
pub struct LoopbackAgent {
    redirect: Url,
}

impl LoopbackAgent {
    /// Creates an agent listening on the redirect URI's port.
    #[must_use]
    pub const fn new(redirect: Url) -> Self {
        Self { redirect }
    }

    /// True if the URL targets this machine.
    #[must_use]
    pub fn is_loopback(url: &Url) -> bool {
        matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
    }

    /// Serves connections concurrently until one carries the redirect.
    ///
    /// Browsers open speculative connections that never send a request, so
    /// no single socket may hold up the others.
    async fn accept_redirect(&self, listener: TcpListener) -> Result<RedirectParams> {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!("Redirect connection from {peer}");
                    connections.spawn(serve_connection(stream, self.redirect.path().to_string()));
                }
                Some(joined) = connections.join_next() => {
                    if let Ok(Some(params)) = joined {
                        return Ok(params);
                    }
                }
            }
        }
    }
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut request = Vec::with_capacity(1024);
    let mut chunk = [0_u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&chunk[..n]);
        if request.windows(2).any(|w| w == b"\r\n") || request.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(request)
}

/// Answers one loopback connection, returning the redirect parameters when
/// it was the redirect.
async fn serve_connection(mut stream: TcpStream, redirect_path: String) -> Option<RedirectParams> {
    let request = match tokio::time::timeout(CONNECTION_READ_TIMEOUT, read_request_head(&mut stream))
        .await
    {
        Ok(Ok(request)) => request,
        Ok(Err(e)) => {
            debug!("Dropping redirect connection: {e}");
            return None;
        }
        Err(_) => {
            debug!("Dropping idle redirect connection");
            return None;
        }
    };

    let request = String::from_utf8_lossy(&request);
    match RedirectParams::from_request(&request) {
        Some((path, params)) if path == redirect_path && params.is_complete() => {
            let page = if params.code.is_some() {
                SUCCESS_PAGE
            } else {
                FAILURE_PAGE
            };
            let _ = stream.write_all(http_response("200 OK", page).as_bytes()).await;
            Some(params)
        }
        _ => {
            // Browsers also ask for /favicon.ico and the like.
            let _ = stream
                .write_all(http_response("404 Not Found", NOT_FOUND_PAGE).as_bytes())
                .await;
            None
        }
    }
}

#[async_trait]
impl AuthorizationAgent for LoopbackAgent {
    async fn capture(&self, authorization_url: &Url) -> Result<RedirectParams> {
        let port = self.redirect.port_or_known_default().unwrap_or(80);
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| Error::Redirect(format!("cannot listen on port {port}: {e}")))?;
        info!("Listening for the authorization redirect on port {port}");

        open_in_browser(authorization_url);
        self.accept_redirect(listener).await
    }
}

/// Asks the operator to paste the redirected address.
///
/// Used when the redirect URI is not served by this machine (MYOB desktop
/// apps register `http://desktop`): the browser shows an error page, but its
/// address bar holds the code and state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleAgent;

impl ConsoleAgent {
    /// Reads lines from `reader` on a dedicated thread.
    ///
    /// The thread is detached: a blocked read never holds up the runtime, so
    /// dropping the receiver after a timeout lets the process exit. The
    /// channel closes when the input ends.
    pub fn spawn_line_reader<R>(reader: R) -> mpsc::UnboundedReceiver<String>
    where
        R: BufRead + Send + 'static,
    {
        let (lines, received) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if lines.send(line).is_err() {
                    break;
                }
            }
        });
        received
    }

    /// Takes lines until one parses as a redirect.
    ///
    /// # Errors
    ///
    /// Returns `Error::Redirect` if the input ends first.
    pub async fn read_redirect(
        lines: &mut mpsc::UnboundedReceiver<String>,
    ) -> Result<RedirectParams> {
        while let Some(line) = lines.recv().await {
            if let Some(params) = RedirectParams::parse_input(&line) {
                return Ok(params);
            }
            eprintln!("That does not look like the redirected address; paste the full URL.");
        }
        Err(Error::Redirect("input closed before a redirect was pasted".into()))
    }
}

#[async_trait]
impl AuthorizationAgent for ConsoleAgent {
    async fn capture(&self, authorization_url: &Url) -> Result<RedirectParams> {
        open_in_browser(authorization_url);
        eprintln!("After signing in, paste the address the browser was redirected to:");

        let mut lines = Self::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
        Self::read_redirect(&mut lines).await
    }
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization received</h1>\
<p>You can close this tab and return to arledger.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h1>Authorization was not granted</h1>\
<p>Return to arledger for details.</p></body></html>";

const NOT_FOUND_PAGE: &str = "<html><body><h1>Not found</h1></body></html>";

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_url() {
        let params =
            RedirectParams::parse_input("http://desktop/?code=abc%21123&state=xyz\n").unwrap();
        assert_eq!(params.code.as_deref(), Some("abc!123"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_parse_query_string() {
        let params = RedirectParams::parse_input("?code=abc&state=xyz").unwrap();
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_parse_rejects_noise() {
        assert!(RedirectParams::parse_input("").is_none());
        assert!(RedirectParams::parse_input("hello").is_none());
        assert!(RedirectParams::parse_input("http://desktop/").is_none());
    }

    #[test]
    fn test_parse_error_redirect() {
        let params =
            RedirectParams::parse_input("http://desktop/?error=access_denied&state=s").unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert!(params.code.is_none());
    }

    #[test]
    fn test_from_request_line() {
        let request = "GET /callback?code=c1&state=s1 HTTP/1.1\r\nHost: localhost:8080\r\n\r\n";
        let (path, params) = RedirectParams::from_request(request).unwrap();
        assert_eq!(path, "/callback");
        assert_eq!(params.code.as_deref(), Some("c1"));
        assert_eq!(params.state.as_deref(), Some("s1"));
    }

    #[test]
    fn test_is_loopback() {
        assert!(LoopbackAgent::is_loopback(&Url::parse("http://localhost:8080/cb").unwrap()));
        assert!(LoopbackAgent::is_loopback(&Url::parse("http://127.0.0.1:9000").unwrap()));
        assert!(!LoopbackAgent::is_loopback(&Url::parse("http://desktop").unwrap()));
    }

    /// Input that never delivers a line, like a terminal nobody types in.
    struct SilentTerminal;

    impl std::io::Read for SilentTerminal {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            loop {
                std::thread::park();
            }
        }
    }

    #[tokio::test]
    async fn test_console_agent_skips_noise() {
        let input = std::io::Cursor::new("not a url\nhttp://desktop/?code=pasted&state=st\n");
        let mut lines = ConsoleAgent::spawn_line_reader(input);
        let params = ConsoleAgent::read_redirect(&mut lines).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("pasted"));
        assert_eq!(params.state.as_deref(), Some("st"));
    }

    #[tokio::test]
    async fn test_console_agent_input_closed() {
        let mut lines = ConsoleAgent::spawn_line_reader(std::io::Cursor::new("junk\n"));
        let err = ConsoleAgent::read_redirect(&mut lines).await.unwrap_err();
        assert!(matches!(err, Error::Redirect(_)));
    }

    #[test]
    fn test_console_agent_waits_for_a_redirect() {
        let (lines, mut received) = mpsc::unbounded_channel();
        let mut waiting = tokio_test::task::spawn(ConsoleAgent::read_redirect(&mut received));

        lines.send("not a url".to_string()).unwrap();
        tokio_test::assert_pending!(waiting.poll());

        lines
            .send("http://desktop/?code=late&state=st".to_string())
            .unwrap();
        let params = tokio_test::assert_ready_ok!(waiting.poll());
        assert_eq!(params.code.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_console_wait_is_abandoned_on_timeout() {
        // The runtime shuts down at the end of this test; a read still
        // pending on the blocking pool would hang it.
        let mut lines =
            ConsoleAgent::spawn_line_reader(std::io::BufReader::new(SilentTerminal));
        let started = std::time::Instant::now();

        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            ConsoleAgent::read_redirect(&mut lines),
        )
        .await;

        assert!(waited.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_loopback_agent_ignores_idle_connection() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let agent = LoopbackAgent::new(
            Url::parse(&format!("http://127.0.0.1:{}/callback", addr.port())).unwrap(),
        );

        // A preconnected socket that never sends anything.
        let _idle = TcpStream::connect(addr).await.unwrap();
        let browser = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /callback?code=c&state=s HTTP/1.1\r\nHost: x\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await.unwrap();
            reply
        });

        let params = tokio::time::timeout(Duration::from_secs(3), agent.accept_redirect(listener))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(params.code.as_deref(), Some("c"));
        assert!(browser.await.unwrap().starts_with("HTTP/1.1 200 OK"));
    }

    #[tokio::test]
    async fn test_loopback_agent_captures_redirect() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let agent = LoopbackAgent::new(
            Url::parse(&format!("http://127.0.0.1:{}/callback", addr.port())).unwrap(),
        );

        let browser = tokio::spawn(async move {
            // A stray request first, as browsers do.
            let mut favicon = TcpStream::connect(addr).await.unwrap();
            favicon
                .write_all(b"GET /favicon.ico HTTP/1.1\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            favicon.read_to_string(&mut reply).await.unwrap();
            assert!(reply.starts_with("HTTP/1.1 404"));

            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /callback?code=loop-code&state=loop-state HTTP/1.1\r\nHost: x\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await.unwrap();
            reply
        });

        let params = agent.accept_redirect(listener).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("loop-code"));
        assert_eq!(params.state.as_deref(), Some("loop-state"));

        let reply = browser.await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
    }
}
