//! Loopback listener receiving the OAuth redirect.
//!
//! Each authorization attempt owns one [`CallbackListener`]. It binds a local
//! port, answers browser requests on `/`, and hands the first authorization
//! code carrying the expected CSRF state to the waiting flow through a
//! single-slot channel. Requests with a wrong state get an error page and
//! never reach the flow.
//!
//! The redirect URI names `localhost`, so the listener binds the IPv4
//! loopback and, when available, the IPv6 loopback on the same port.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{GoogleError, GoogleResult};

/// Port the redirect URI points at unless configured otherwise.
pub const DEFAULT_CALLBACK_PORT: u16 = 8066;

/// How long the listener gets to stop once the code has been received.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Idle connections (browser pre-connects) are dropped after this long.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_HEADER_LINES: usize = 100;

/// What the listener delivers to the flow: a code, or the user's refusal.
type CallbackOutcome = GoogleResult<String>;

/// A local HTTP listener waiting for a single OAuth redirect.
#[derive(Debug)]
pub struct CallbackListener {
    local_addr: SocketAddr,
    local_addr_v6: Option<SocketAddr>,
    shared: Arc<CallbackState>,
    code_rx: Option<oneshot::Receiver<CallbackOutcome>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Binds `127.0.0.1:<port>` (plus `[::1]:<port>` when possible) and
    /// starts accepting redirects whose `state` equals `expected_state`.
    /// Port 0 picks a free port.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleError::ListenerBind`] if the IPv4 port is unavailable.
    pub async fn bind(port: u16, expected_state: impl Into<String>) -> GoogleResult<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GoogleError::ListenerBind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GoogleError::ListenerBind { addr, source })?;
        debug!("OAuth callback listener bound on {}", local_addr);

        let addr_v6 = SocketAddr::from((Ipv6Addr::LOCALHOST, local_addr.port()));
        let listener_v6 = match TcpListener::bind(addr_v6).await {
            Ok(listener) => {
                debug!("OAuth callback listener bound on {}", addr_v6);
                Some(listener)
            }
            Err(e) => {
                debug!("IPv6 loopback unavailable for OAuth callback: {}", e);
                None
            }
        };
        let local_addr_v6 = listener_v6
            .as_ref()
            .and_then(|listener| listener.local_addr().ok());

        let (code_tx, code_rx) = oneshot::channel();
        let shared = Arc::new(CallbackState {
            expected_state: expected_state.into(),
            sender: Mutex::new(Some(code_tx)),
            rejected: AtomicUsize::new(0),
        });
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            listener_v6,
            Arc::clone(&shared),
            shutdown.clone(),
        ));

        Ok(Self {
            local_addr,
            local_addr_v6,
            shared,
            code_rx: Some(code_rx),
            shutdown,
            task: Some(task),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The redirect URI to register in the authorization request.
    ///
    /// The token exchange must send this exact value again.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.local_addr.port())
    }

    /// Number of callbacks refused because of a state mismatch.
    pub fn rejected_callbacks(&self) -> usize {
        self.shared.rejected.load(Ordering::SeqCst)
    }

    /// Suspends until a valid callback arrives, `cancel` fires, or the
    /// optional `deadline` elapses.
    ///
    /// Only one value is ever delivered; calling this again afterwards is an
    /// error. If the deadline elapses after at least one callback was refused
    /// for a wrong state, [`GoogleError::StateMismatch`] is returned instead
    /// of [`GoogleError::CallbackTimeout`].
    pub async fn wait_for_code(
        &mut self,
        cancel: &CancellationToken,
        deadline: Option<Duration>,
    ) -> GoogleResult<String> {
        let code_rx = self.code_rx.take().ok_or_else(|| {
            GoogleError::Internal("authorization callback already consumed".to_string())
        })?;

        let expired = async {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            received = code_rx => match received {
                Ok(outcome) => outcome,
                Err(_) => Err(GoogleError::Internal(
                    "callback listener stopped before a code arrived".to_string(),
                )),
            },
            _ = cancel.cancelled() => Err(GoogleError::Cancelled),
            _ = expired => {
                if self.rejected_callbacks() > 0 {
                    Err(GoogleError::StateMismatch)
                } else {
                    Err(GoogleError::CallbackTimeout(deadline.unwrap_or_default()))
                }
            }
        }
    }

    /// Stops accepting connections, waiting at most [`SHUTDOWN_GRACE`].
    ///
    /// Problems while stopping are logged, never returned.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        let abort = task.abort_handle();
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(())) => debug!("OAuth callback listener stopped"),
            Ok(Err(e)) => warn!("OAuth callback listener shutdown: {}", e),
            Err(_) => {
                warn!(
                    "OAuth callback listener did not stop within {:?}, aborting",
                    SHUTDOWN_GRACE
                );
                abort.abort();
            }
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// State shared between the listener handle and its connection tasks.
#[derive(Debug)]
struct CallbackState {
    expected_state: String,
    sender: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
    rejected: AtomicUsize,
}

/// A value to hand to the flow once the browser has its answer.
type Delivery = (oneshot::Sender<CallbackOutcome>, CallbackOutcome);

impl CallbackState {
    /// Decides how to answer a request and whether it completes the flow.
    fn handle(&self, method: &str, target: &str) -> (Reply, Option<Delivery>) {
        if method != "GET" {
            return (Reply::MethodNotAllowed, None);
        }

        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        if path != "/" {
            return (Reply::NotFound, None);
        }

        let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        if params.get("state").map(String::as_str) != Some(self.expected_state.as_str()) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            warn!("rejected OAuth callback: state parameter does not match this authorization");
            return (Reply::StateMismatch, None);
        }

        let (reply, outcome) = if let Some(error) = params.get("error") {
            (
                Reply::Denied(error.clone()),
                Err(GoogleError::Denied(error.clone())),
            )
        } else if let Some(code) = params.get("code").filter(|c| !c.is_empty()) {
            (Reply::Success, Ok(code.clone()))
        } else {
            return (Reply::MissingCode, None);
        };

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => (reply, Some((tx, outcome))),
            None => {
                debug!("ignoring repeated OAuth callback");
                (Reply::AlreadyReceived, None)
            }
        }
    }
}

/// The page sent back to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Success,
    AlreadyReceived,
    Denied(String),
    StateMismatch,
    MissingCode,
    NotFound,
    MethodNotAllowed,
}

impl Reply {
    fn status_line(&self) -> &'static str {
        match self {
            Self::Success | Self::AlreadyReceived => "200 OK",
            Self::Denied(_) | Self::StateMismatch | Self::MissingCode => "400 Bad Request",
            Self::NotFound => "404 Not Found",
            Self::MethodNotAllowed => "405 Method Not Allowed",
        }
    }

    fn body(&self) -> String {
        let (title, detail) = match self {
            Self::Success => (
                "Authorization Successful",
                "Received authentication code. You can close this page now.".to_string(),
            ),
            Self::AlreadyReceived => (
                "Authorization Already Completed",
                "You can close this page now.".to_string(),
            ),
            Self::Denied(error) => (
                "Authorization Failed",
                format!("The authorization was refused ({}).", html_escape(error)),
            ),
            Self::StateMismatch => (
                "Authorization Failed",
                "The state parameter does not match this authorization request.".to_string(),
            ),
            Self::MissingCode => (
                "Authorization Failed",
                "The redirect did not carry an authorization code.".to_string(),
            ),
            Self::NotFound => ("Not Found", String::new()),
            Self::MethodNotAllowed => ("Method Not Allowed", String::new()),
        };
        format!("<html><body><h1>{title}</h1><p>{detail}</p></body></html>")
    }

    fn to_http(&self) -> String {
        let body = self.body();
        format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status_line(),
            body.len(),
            body
        )
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn accept_loop(
    listener: TcpListener,
    listener_v6: Option<TcpListener>,
    state: Arc<CallbackState>,
    shutdown: CancellationToken,
) {
    let mut connections = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
            accepted = accept_optional(listener_v6.as_ref()) => accepted,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!("OAuth callback connection from {}", peer);
                let state = Arc::clone(&state);
                connections.spawn(async move {
                    match tokio::time::timeout(REQUEST_READ_TIMEOUT, serve_connection(stream, &state)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => debug!("OAuth callback connection error: {}", e),
                        Err(_) => debug!("OAuth callback connection timed out"),
                    }
                });
            }
            Err(e) => error!("failed to accept connection: {}", e),
        }
    }
    // Dropping the listeners closes the port; in-flight connections are aborted.
    drop(listener);
    drop(listener_v6);
    connections.shutdown().await;
}

async fn accept_optional(
    listener: Option<&TcpListener>,
) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

async fn serve_connection(mut stream: TcpStream, state: &CallbackState) -> std::io::Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(());
    }

    let mut header = String::new();
    for _ in 0..MAX_HEADER_LINES {
        header.clear();
        let read = reader.read_line(&mut header).await?;
        if read == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    // GET /?code=...&state=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();

    let (reply, delivery) = state.handle(method, target);

    let written = async {
        writer.write_all(reply.to_http().as_bytes()).await?;
        writer.flush().await
    }
    .await;

    // The browser has its page; now resume the waiting flow.
    if let Some((tx, outcome)) = delivery {
        let _ = tx.send(outcome);
    }

    written
}
