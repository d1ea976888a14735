//! Sync Protocol Messages
//!
//! Every frame is a JSON object `{"event": "<name>", "data": <payload>}`.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated peer ids
const PEER_ID_LENGTH: usize = 20;

/// Opaque identifier of a connected peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a random id
    pub fn random() -> Self {
        let id = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PEER_ID_LENGTH)
            .map(char::from)
            .collect();
        PeerId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        PeerId(id.to_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a peer in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Viewer,
}

/// A connected peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    pub id: PeerId,
    pub role: Role,
}

impl Peer {
    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

/// Messages sent by a peer to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum TransportEvent {
    /// Playback started at `time` seconds
    Play(f64),

    /// Playback paused at `time` seconds
    Pause(f64),

    /// Playhead moved to `time` seconds
    Seek(f64),

    /// A viewer asks the host for its current state
    SyncRequest,

    /// The host answers a sync request
    SyncState {
        #[serde(default, rename = "requesterId")]
        requester_id: Option<PeerId>,
        #[serde(default)]
        time: f64,
        #[serde(default, rename = "isPlaying")]
        is_playing: bool,
    },
}

impl TransportEvent {
    /// Check if this event is only honored when sent by the host
    pub fn requires_host(&self) -> bool {
        !matches!(self, TransportEvent::SyncRequest)
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Play(_) => "play",
            TransportEvent::Pause(_) => "pause",
            TransportEvent::Seek(_) => "seek",
            TransportEvent::SyncRequest => "sync-request",
            TransportEvent::SyncState { .. } => "sync-state",
        }
    }
}

/// Messages sent by the server to a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Current host (null when the session is empty)
    Role {
        #[serde(rename = "hostId")]
        host_id: Option<PeerId>,
    },

    // === Relayed from the host ===
    Play(f64),
    Pause(f64),
    Seek(f64),

    // === Reconciliation ===
    /// Forwarded to the host on behalf of a viewer
    SyncRequest {
        #[serde(rename = "requesterId")]
        requester_id: PeerId,
    },

    /// Delivered only to the viewer that asked
    SyncState {
        time: f64,
        #[serde(rename = "isPlaying")]
        is_playing: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_frames() {
        let seek: TransportEvent =
            serde_json::from_value(json!({"event": "seek", "data": 120.5})).unwrap();
        assert_eq!(seek, TransportEvent::Seek(120.5));

        let request: TransportEvent =
            serde_json::from_value(json!({"event": "sync-request"})).unwrap();
        assert_eq!(request, TransportEvent::SyncRequest);

        let state: TransportEvent = serde_json::from_value(json!({
            "event": "sync-state",
            "data": {"requesterId": "abc", "time": 12.0, "isPlaying": true}
        }))
        .unwrap();
        assert_eq!(
            state,
            TransportEvent::SyncState {
                requester_id: Some(PeerId::from("abc")),
                time: 12.0,
                is_playing: true,
            }
        );
    }

    #[test]
    fn test_sync_state_defaults() {
        let state: TransportEvent = serde_json::from_value(json!({
            "event": "sync-state",
            "data": {"requesterId": "abc"}
        }))
        .unwrap();
        assert_eq!(
            state,
            TransportEvent::SyncState {
                requester_id: Some(PeerId::from("abc")),
                time: 0.0,
                is_playing: false,
            }
        );
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result: Result<TransportEvent, _> =
            serde_json::from_value(json!({"event": "skip", "data": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_frame_format() {
        let role = ServerMessage::Role {
            host_id: Some(PeerId::from("host1")),
        };
        assert_eq!(
            serde_json::to_value(&role).unwrap(),
            json!({"event": "role", "data": {"hostId": "host1"}})
        );

        let vacant = ServerMessage::Role { host_id: None };
        assert_eq!(
            serde_json::to_value(&vacant).unwrap(),
            json!({"event": "role", "data": {"hostId": null}})
        );

        let request = ServerMessage::SyncRequest {
            requester_id: PeerId::from("v1"),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"event": "sync-request", "data": {"requesterId": "v1"}})
        );

        assert_eq!(
            serde_json::to_value(ServerMessage::Pause(3.5)).unwrap(),
            json!({"event": "pause", "data": 3.5})
        );
    }

    #[test]
    fn test_random_peer_ids() {
        let a = PeerId::random();
        let b = PeerId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), PEER_ID_LENGTH);
    }
}
