//! Public tunnel provisioning
//!
//! The server only needs "a public URL, eventually, maybe". Providers hide
//! how that URL is obtained.

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Shortest auth token worth trying
const MIN_TOKEN_LENGTH: usize = 5;

/// How long to wait for the agent to report a tunnel
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between agent API polls
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tunnel-related errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Invalid ngrok token: token too short or missing")]
    InvalidToken,

    #[error("Failed to start ngrok agent: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ngrok agent exited: {0}")]
    Exited(ExitStatus),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No tunnel URL after {0:?}")]
    Timeout(Duration),
}

/// Something that can expose the local port publicly
pub trait TunnelProvider: Send + Sync {
    /// Start the tunnel for `port`; `None` when no URL could be obtained
    fn start(&self, port: u16) -> impl Future<Output = Option<String>> + Send;
}

/// Provider used when no tunnel is configured
pub struct NoTunnel;

impl TunnelProvider for NoTunnel {
    async fn start(&self, _port: u16) -> Option<String> {
        None
    }
}

/// Public URL state reported by `/public-url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelStatus {
    /// No token configured (or tunnel disabled)
    NoToken,
    /// Provider is starting
    Starting,
    /// Tunnel is up
    Active(String),
    /// Provider gave up
    Failed,
}

impl TunnelStatus {
    pub fn url(&self) -> Option<&str> {
        match self {
            TunnelStatus::Active(url) => Some(url),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TunnelStatus::NoToken => "no-token",
            TunnelStatus::Starting => "starting",
            TunnelStatus::Active(_) => "active",
            TunnelStatus::Failed => "failed",
        }
    }
}

/// Start `provider` in the background and publish the outcome to `status`
pub fn spawn_tunnel<P>(provider: Arc<P>, port: u16, status: Arc<RwLock<TunnelStatus>>)
where
    P: TunnelProvider + 'static,
{
    *status.write() = TunnelStatus::Starting;

    tokio::spawn(async move {
        match provider.start(port).await {
            Some(url) => {
                let url = url.trim().to_string();
                info!("Public URL: {}", url);
                *status.write() = TunnelStatus::Active(url);
            }
            None => {
                error!("Tunnel failed: no public URL");
                *status.write() = TunnelStatus::Failed;
            }
        }
    });
}

/// Tunnels listed by the agent API
#[derive(Debug, Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<TunnelEntry>,
}

#[derive(Debug, Deserialize)]
struct TunnelEntry {
    public_url: String,
}

/// Runs the ngrok agent as a child process and reads the public URL from
/// its local API. The agent is killed when this value is dropped.
pub struct NgrokTunnel {
    authtoken: String,
    binary: String,
    api_url: String,
    startup_timeout: Duration,
    child: Mutex<Option<Child>>,
}

impl NgrokTunnel {
    pub fn new(authtoken: impl Into<String>, binary: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            authtoken: authtoken.into(),
            binary: binary.into(),
            api_url: api_url.into(),
            startup_timeout: STARTUP_TIMEOUT,
            child: Mutex::new(None),
        }
    }

    /// Override how long to wait for the agent
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    async fn try_start(&self, port: u16) -> Result<String, TunnelError> {
        if self.authtoken.len() < MIN_TOKEN_LENGTH {
            return Err(TunnelError::InvalidToken);
        }

        let token_prefix: String = self.authtoken.chars().take(8).collect();
        info!("Starting ngrok tunnel to port {} (token {}...)", port, token_prefix);

        self.stop();
        let child = Command::new(&self.binary)
            .arg("http")
            .arg(port.to_string())
            .arg("--authtoken")
            .arg(&self.authtoken)
            .arg("--log")
            .arg("stdout")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        *self.child.lock() = Some(child);

        self.wait_for_url().await
    }

    /// Poll the agent API until a tunnel shows up
    async fn wait_for_url(&self) -> Result<String, TunnelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        let deadline = Instant::now() + self.startup_timeout;

        loop {
            if let Some(url) = self.fetch_public_url(&client).await {
                return Ok(url);
            }
            if let Some(status) = self.exit_status() {
                return Err(TunnelError::Exited(status));
            }
            if Instant::now() >= deadline {
                return Err(TunnelError::Timeout(self.startup_timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Prefer the https tunnel when the agent reports several
    async fn fetch_public_url(&self, client: &reqwest::Client) -> Option<String> {
        let resp = client.get(&self.api_url).send().await.ok()?;
        let list: TunnelList = resp.json().await.ok()?;
        debug!("ngrok agent reports {} tunnels", list.tunnels.len());

        let urls: Vec<String> = list.tunnels.into_iter().map(|t| t.public_url).collect();
        urls.iter()
            .find(|url| url.starts_with("https://"))
            .or_else(|| urls.first())
            .cloned()
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        let mut child = self.child.lock();
        child.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }

    /// Kill the agent if it is running
    pub fn stop(&self) {
        if let Some(mut child) = self.child.lock().take() {
            info!("Closing ngrok tunnel");
            let _ = child.start_kill();
        }
    }
}

impl TunnelProvider for NgrokTunnel {
    async fn start(&self, port: u16) -> Option<String> {
        match self.try_start(port).await {
            Ok(url) => Some(url),
            Err(e) => {
                error!("ngrok connection failed: {}", e);
                self.stop();
                None
            }
        }
    }
}

impl Drop for NgrokTunnel {
    fn drop(&mut self) {
        self.stop();
    }
}
