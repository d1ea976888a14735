//! Sync Hub
//!
//! Owns the [`Session`] inside a single task. Connects, disconnects and
//! event routing arrive as commands on one channel and are applied one at
//! a time, so reading the host, picking recipients and sending is atomic
//! with respect to host changes.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::protocol::{Peer, PeerId, ServerMessage, TransportEvent};
use super::state::{Dispatch, HostChange, Session};

/// Hub-related errors
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Sync hub task closed")]
    Closed,
}

/// Events emitted by the hub for observers (logging, statistics)
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// A peer connected
    PeerJoined(Peer),
    /// A peer disconnected
    PeerLeft { peer_id: PeerId },
    /// The host designation changed (None = session is empty)
    HostChanged { host_id: Option<PeerId> },
    /// An inbound event was routed
    Routed { from: PeerId, dispatch: Dispatch },
}

/// Commands sent to the hub task
#[derive(Debug)]
pub enum HubCommand {
    /// Register a new peer
    Connect {
        reply: oneshot::Sender<PeerConnection>,
    },
    /// Remove a peer
    Disconnect { peer_id: PeerId },
    /// Route an event received from a peer
    Message { from: PeerId, event: TransportEvent },
    /// Ask for the current host
    CurrentHost {
        reply: oneshot::Sender<Option<PeerId>>,
    },
    /// Ask for the connected peers in connection order
    Snapshot { reply: oneshot::Sender<Vec<Peer>> },
    /// Stop the hub
    Shutdown,
}

/// A freshly registered peer and the queue of messages addressed to it.
/// The first queued message is always the `role` notification.
#[derive(Debug)]
pub struct PeerConnection {
    pub peer: Peer,
    pub outbox: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Handle to communicate with the running hub
#[derive(Clone)]
pub struct HubHandle {
    command_tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    pub async fn connect(&self) -> Result<PeerConnection, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Connect { reply })?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub fn disconnect(&self, peer_id: &PeerId) -> Result<(), HubError> {
        self.send(HubCommand::Disconnect {
            peer_id: peer_id.clone(),
        })
    }

    /// Hand an inbound event to the hub; delivery is not awaited
    pub fn submit(&self, from: &PeerId, event: TransportEvent) -> Result<(), HubError> {
        self.send(HubCommand::Message {
            from: from.clone(),
            event,
        })
    }

    pub async fn current_host(&self) -> Result<Option<PeerId>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::CurrentHost { reply })?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub async fn snapshot(&self) -> Result<Vec<Peer>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot { reply })?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(HubCommand::Shutdown);
    }

    fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.command_tx.send(command).map_err(|_| HubError::Closed)
    }
}

/// Runs the session in a background task
#[derive(Default)]
pub struct SyncHub {
    session: Session,
}

impl SyncHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the hub and return a handle plus the observer event stream.
    /// Dropping the event receiver is fine; events are then discarded.
    pub fn start(self) -> (HubHandle, mpsc::UnboundedReceiver<HubEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(self.run(command_rx, event_tx));

        (HubHandle { command_tx }, event_rx)
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<HubCommand>,
        event_tx: mpsc::UnboundedSender<HubEvent>,
    ) {
        info!("Sync hub started");

        while let Some(command) = command_rx.recv().await {
            match command {
                HubCommand::Connect { reply } => {
                    let (outbox_tx, outbox) = mpsc::unbounded_channel();
                    let had_host = self.session.current_host().is_some();
                    let peer = self.session.connect(outbox_tx);

                    info!("Peer connected: {} ({:?})", peer.id, peer.role);
                    let _ = event_tx.send(HubEvent::PeerJoined(peer.clone()));
                    if !had_host {
                        let _ = event_tx.send(HubEvent::HostChanged {
                            host_id: Some(peer.id.clone()),
                        });
                    }

                    if let Err(rejected) = reply.send(PeerConnection { peer, outbox }) {
                        debug!("Connect caller went away, dropping {}", rejected.peer.id);
                        self.depart(&rejected.peer.id, &event_tx);
                    }
                }

                HubCommand::Disconnect { peer_id } => self.depart(&peer_id, &event_tx),

                HubCommand::Message { from, event } => {
                    let dispatch = self.session.handle(&from, event);
                    let _ = event_tx.send(HubEvent::Routed { from, dispatch });
                }

                HubCommand::CurrentHost { reply } => {
                    let _ = reply.send(self.session.current_host().cloned());
                }

                HubCommand::Snapshot { reply } => {
                    let _ = reply.send(self.session.peers());
                }

                HubCommand::Shutdown => break,
            }
        }

        info!("Sync hub stopped ({} peers dropped)", self.session.len());
    }

    /// Remove a peer and report the departure to observers
    fn depart(&mut self, peer_id: &PeerId, event_tx: &mpsc::UnboundedSender<HubEvent>) {
        let Some(departure) = self.session.disconnect(peer_id) else {
            debug!("Disconnect for unknown peer {}", peer_id);
            return;
        };

        info!("Peer disconnected: {}", peer_id);
        let _ = event_tx.send(HubEvent::PeerLeft {
            peer_id: departure.peer.id,
        });
        let host_id = match departure.host {
            HostChange::Unchanged => return,
            HostChange::Promoted(id) => Some(id),
            HostChange::Vacant => None,
        };
        let _ = event_tx.send(HubEvent::HostChanged { host_id });
    }
}
