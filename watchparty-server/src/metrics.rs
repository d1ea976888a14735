//! Runtime statistics for the watch party server

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use watchparty_core::sync::{Dispatch, HubEvent};

/// Maximum number of activity entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// An activity entry reported by `/stats`
#[derive(Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Connection,
    Host,
}

/// Server metrics
pub struct Metrics {
    /// Server start time
    pub start_time: DateTime<Local>,

    /// Current number of connected peers
    pub connected_peers: usize,

    /// Total connections since start
    pub total_connections: u64,

    /// Peak simultaneous connections
    pub peak_connections: usize,

    /// Current host
    pub host_id: Option<String>,

    /// Times a peer was made host, counting the first host of each
    /// non-empty session; the session emptying is not a designation
    pub host_changes: u64,

    /// Transport events mirrored to viewers
    pub events_relayed: u64,

    /// Point-to-point reconciliation messages delivered
    pub events_forwarded: u64,

    /// Events discarded (non-host senders, stale requesters)
    pub events_dropped: u64,

    /// Responses started by `/video`
    pub video_requests: u64,

    /// Activity log
    pub logs: VecDeque<LogEntry>,
}

/// JSON body of `/stats`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub uptime: String,
    pub started_at: DateTime<Local>,
    pub connected_peers: usize,
    pub total_connections: u64,
    pub peak_connections: usize,
    pub host_id: Option<String>,
    pub host_changes: u64,
    pub events_relayed: u64,
    pub events_forwarded: u64,
    pub events_dropped: u64,
    pub video_requests: u64,
    pub recent_activity: Vec<LogEntry>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Local::now(),
            connected_peers: 0,
            total_connections: 0,
            peak_connections: 0,
            host_id: None,
            host_changes: 0,
            events_relayed: 0,
            events_forwarded: 0,
            events_dropped: 0,
            video_requests: 0,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
    }

    /// Apply one hub event
    pub fn record(&mut self, event: &HubEvent) {
        match event {
            HubEvent::PeerJoined(peer) => {
                self.connected_peers += 1;
                self.total_connections += 1;
                if self.connected_peers > self.peak_connections {
                    self.peak_connections = self.connected_peers;
                }
                let short_id = truncate_peer_id(peer.id.as_str());
                self.log(LogLevel::Connection, format!("Connected: {}", short_id));
            }
            HubEvent::PeerLeft { peer_id } => {
                self.connected_peers = self.connected_peers.saturating_sub(1);
                let short_id = truncate_peer_id(peer_id.as_str());
                self.log(LogLevel::Connection, format!("Disconnected: {}", short_id));
            }
            HubEvent::HostChanged { host_id } => {
                self.host_id = host_id.as_ref().map(|id| id.to_string());
                match host_id {
                    Some(id) => {
                        self.host_changes += 1;
                        let short_id = truncate_peer_id(id.as_str());
                        self.log(LogLevel::Host, format!("Host: {}", short_id));
                    }
                    None => self.log(LogLevel::Host, "No host (session empty)"),
                }
            }
            HubEvent::Routed { dispatch, .. } => match dispatch {
                Dispatch::Relayed { .. } => self.events_relayed += 1,
                Dispatch::Forwarded { .. } => self.events_forwarded += 1,
                Dispatch::Dropped(_) => self.events_dropped += 1,
            },
        }
    }

    /// Record a `/video` response
    pub fn video_request(&mut self) {
        self.video_requests += 1;
    }

    /// Get uptime as formatted string
    pub fn uptime(&self) -> String {
        let duration = Local::now().signed_duration_since(self.start_time);
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            let hours = secs / 3600;
            let mins = (secs % 3600) / 60;
            format!("{}h {}m", hours, mins)
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.uptime(),
            started_at: self.start_time,
            connected_peers: self.connected_peers,
            total_connections: self.total_connections,
            peak_connections: self.peak_connections,
            host_id: self.host_id.clone(),
            host_changes: self.host_changes,
            events_relayed: self.events_relayed,
            events_forwarded: self.events_forwarded,
            events_dropped: self.events_dropped,
            video_requests: self.video_requests,
            recent_activity: self.logs.iter().cloned().collect(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed hub events into the shared metrics until the hub stops
pub async fn track_hub_events(
    mut events: mpsc::UnboundedReceiver<HubEvent>,
    metrics: Arc<RwLock<Metrics>>,
) {
    while let Some(event) = events.recv().await {
        metrics.write().record(&event);
    }
    debug!("Hub event stream ended");
}

/// Truncate peer ID for display (show first and last few chars)
pub fn truncate_peer_id(peer_id: &str) -> String {
    if peer_id.len() > 16 && peer_id.is_ascii() {
        format!("{}...{}", &peer_id[..8], &peer_id[peer_id.len() - 4..])
    } else {
        peer_id.to_string()
    }
}
