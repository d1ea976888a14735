//! Session State Management

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::protocol::{Peer, PeerId, Role, ServerMessage, TransportEvent};

/// Outbound message queue of one peer
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// A registered peer and its queue
struct PeerSlot {
    peer: Peer,
    outbox: Outbox,
}

/// Effect of a peer leaving on the host designation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostChange {
    /// The departing peer was a viewer
    Unchanged,
    /// The host left and this peer took over
    Promoted(PeerId),
    /// The host left and nobody remains
    Vacant,
}

/// Result of removing a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub peer: Peer,
    pub host: HostChange,
}

/// Why an inbound event produced no delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Sender is not registered (already disconnected)
    UnknownPeer,
    /// Host-only event from a viewer
    NotHost,
    /// Sync request while no host is assigned
    NoHost,
    /// The host asked itself
    SelfRequest,
    /// Sync state without a requester id
    MissingRequester,
    /// The requester disconnected in the meantime
    RequesterGone,
}

/// Outcome of routing one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Transport event mirrored to this many viewers
    Relayed { recipients: usize },
    /// Point-to-point delivery
    Forwarded { to: PeerId },
    /// Silently discarded
    Dropped(DropReason),
}

/// The single session of this process: peers in connection order plus the
/// current host.
///
/// Invariant: `host_id` is `None` exactly when no peer is connected, and
/// otherwise names a connected peer whose role is `Host`.
#[derive(Default)]
pub struct Session {
    host_id: Option<PeerId>,
    peers: Vec<PeerSlot>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current host, if any peer is connected
    pub fn current_host(&self) -> Option<&PeerId> {
        self.host_id.as_ref()
    }

    /// Connected peers in connection order
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.iter().map(|slot| slot.peer.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.slot(peer_id).is_some()
    }

    /// Role of a connected peer
    pub fn role_of(&self, peer_id: &PeerId) -> Option<Role> {
        self.slot(peer_id).map(|slot| slot.peer.role)
    }

    /// Register a new peer with a fresh id.
    ///
    /// The first peer becomes host. Every peer, the new one included, is
    /// then told who the host is.
    pub fn connect(&mut self, outbox: Outbox) -> Peer {
        let id = loop {
            let candidate = PeerId::random();
            if !self.contains(&candidate) {
                break candidate;
            }
        };
        self.connect_with_id(id, outbox)
    }

    /// Register a peer under a caller-chosen id. An id that is already
    /// connected keeps its slot and role.
    pub fn connect_with_id(&mut self, id: PeerId, outbox: Outbox) -> Peer {
        if let Some(existing) = self.slot(&id) {
            debug!("Peer {} already connected", id);
            return existing.peer.clone();
        }

        let role = if self.host_id.is_none() {
            info!("New host: {}", id);
            self.host_id = Some(id.clone());
            Role::Host
        } else {
            Role::Viewer
        };

        let peer = Peer { id, role };
        self.peers.push(PeerSlot {
            peer: peer.clone(),
            outbox,
        });

        self.broadcast_role();
        peer
    }

    /// Remove a peer. Unknown ids are a no-op so duplicate disconnect
    /// signals are harmless.
    ///
    /// When the host leaves, the earliest-connected remaining peer is
    /// promoted and everyone left is told the new host.
    pub fn disconnect(&mut self, peer_id: &PeerId) -> Option<Departure> {
        let index = self.peers.iter().position(|slot| &slot.peer.id == peer_id)?;
        let removed = self.peers.remove(index);

        if !removed.peer.is_host() {
            return Some(Departure {
                peer: removed.peer,
                host: HostChange::Unchanged,
            });
        }

        let host = match self.peers.first_mut() {
            Some(next) => {
                next.peer.role = Role::Host;
                self.host_id = Some(next.peer.id.clone());
                info!("Host {} left, promoted {}", peer_id, next.peer.id);
                HostChange::Promoted(next.peer.id.clone())
            }
            None => {
                self.host_id = None;
                info!("Host {} left, session is empty", peer_id);
                HostChange::Vacant
            }
        };

        self.broadcast_role();
        Some(Departure {
            peer: removed.peer,
            host,
        })
    }

    /// Route one event received from `from`
    pub fn handle(&self, from: &PeerId, event: TransportEvent) -> Dispatch {
        if !self.contains(from) {
            return self.drop_event(from, &event, DropReason::UnknownPeer);
        }

        let from_host = self.host_id.as_ref() == Some(from);
        if event.requires_host() && !from_host {
            return self.drop_event(from, &event, DropReason::NotHost);
        }

        match event {
            TransportEvent::Play(time) => self.relay(from, ServerMessage::Play(time)),
            TransportEvent::Pause(time) => self.relay(from, ServerMessage::Pause(time)),
            TransportEvent::Seek(time) => self.relay(from, ServerMessage::Seek(time)),

            TransportEvent::SyncRequest => match &self.host_id {
                None => self.drop_event(from, &event, DropReason::NoHost),
                Some(host) if host == from => {
                    self.drop_event(from, &event, DropReason::SelfRequest)
                }
                Some(host) => {
                    self.send_to(
                        host,
                        ServerMessage::SyncRequest {
                            requester_id: from.clone(),
                        },
                    );
                    Dispatch::Forwarded { to: host.clone() }
                }
            },

            TransportEvent::SyncState {
                ref requester_id,
                time,
                is_playing,
            } => {
                let Some(requester) = requester_id.clone() else {
                    return self.drop_event(from, &event, DropReason::MissingRequester);
                };
                if !self.contains(&requester) {
                    return self.drop_event(from, &event, DropReason::RequesterGone);
                }

                self.send_to(&requester, ServerMessage::SyncState { time, is_playing });
                Dispatch::Forwarded { to: requester }
            }
        }
    }

    /// Send to every peer except `sender`, in connection order
    fn relay(&self, sender: &PeerId, message: ServerMessage) -> Dispatch {
        let mut recipients = 0;
        for slot in self.peers.iter().filter(|slot| &slot.peer.id != sender) {
            Self::deliver(slot, message.clone());
            recipients += 1;
        }
        trace!("Relayed {:?} from {} to {} peers", message, sender, recipients);
        Dispatch::Relayed { recipients }
    }

    fn broadcast_role(&self) {
        let message = ServerMessage::Role {
            host_id: self.host_id.clone(),
        };
        for slot in &self.peers {
            Self::deliver(slot, message.clone());
        }
    }

    fn send_to(&self, peer_id: &PeerId, message: ServerMessage) {
        if let Some(slot) = self.slot(peer_id) {
            Self::deliver(slot, message);
        }
    }

    /// Fire-and-forget: a closed queue means the transport is going away
    /// and its disconnect is already on the way.
    fn deliver(slot: &PeerSlot, message: ServerMessage) {
        if slot.outbox.send(message).is_err() {
            trace!("Outbox of {} is closed", slot.peer.id);
        }
    }

    fn drop_event(&self, from: &PeerId, event: &TransportEvent, reason: DropReason) -> Dispatch {
        debug!("Dropped {} from {}: {:?}", event.name(), from, reason);
        Dispatch::Dropped(reason)
    }

    fn slot(&self, peer_id: &PeerId) -> Option<&PeerSlot> {
        self.peers.iter().find(|slot| &slot.peer.id == peer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Inbox = mpsc::UnboundedReceiver<ServerMessage>;

    fn join(session: &mut Session, id: &str) -> (PeerId, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = session.connect_with_id(PeerId::from(id), tx);
        (peer.id, rx)
    }

    fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn role(id: Option<&str>) -> ServerMessage {
        ServerMessage::Role {
            host_id: id.map(PeerId::from),
        }
    }

    #[test]
    fn test_first_peer_becomes_host() {
        let mut session = Session::new();
        assert!(session.current_host().is_none());

        let (a, mut rx_a) = join(&mut session, "a");
        assert_eq!(session.current_host(), Some(&a));
        assert_eq!(session.role_of(&a), Some(Role::Host));
        assert_eq!(drain(&mut rx_a), vec![role(Some("a"))]);
    }

    #[test]
    fn test_every_peer_learns_host_on_connect() {
        let mut session = Session::new();
        let (_, mut rx_a) = join(&mut session, "a");
        let (b, mut rx_b) = join(&mut session, "b");

        assert_eq!(session.role_of(&b), Some(Role::Viewer));
        assert_eq!(drain(&mut rx_a), vec![role(Some("a")), role(Some("a"))]);
        assert_eq!(drain(&mut rx_b), vec![role(Some("a"))]);
    }

    #[test]
    fn test_host_events_relay_to_others_only() {
        let mut session = Session::new();
        let (a, mut rx_a) = join(&mut session, "a");
        let (b, mut rx_b) = join(&mut session, "b");
        let (_, mut rx_c) = join(&mut session, "c");
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        // Viewer events go nowhere
        let result = session.handle(&b, TransportEvent::Seek(50.0));
        assert_eq!(result, Dispatch::Dropped(DropReason::NotHost));
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_c).is_empty());

        let result = session.handle(&a, TransportEvent::Seek(120.0));
        assert_eq!(result, Dispatch::Relayed { recipients: 2 });
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![ServerMessage::Seek(120.0)]);
        assert_eq!(drain(&mut rx_c), vec![ServerMessage::Seek(120.0)]);
    }

    #[test]
    fn test_relay_preserves_order() {
        let mut session = Session::new();
        let (a, _rx_a) = join(&mut session, "a");
        let (_, mut rx_b) = join(&mut session, "b");
        drain(&mut rx_b);

        session.handle(&a, TransportEvent::Play(1.0));
        session.handle(&a, TransportEvent::Seek(30.0));
        session.handle(&a, TransportEvent::Pause(31.0));

        assert_eq!(
            drain(&mut rx_b),
            vec![
                ServerMessage::Play(1.0),
                ServerMessage::Seek(30.0),
                ServerMessage::Pause(31.0),
            ]
        );
    }

    #[test]
    fn test_sync_request_goes_to_host_only() {
        let mut session = Session::new();
        let (a, mut rx_a) = join(&mut session, "a");
        let (b, mut rx_b) = join(&mut session, "b");
        let (_, mut rx_c) = join(&mut session, "c");
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        let result = session.handle(&b, TransportEvent::SyncRequest);
        assert_eq!(result, Dispatch::Forwarded { to: a.clone() });
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerMessage::SyncRequest {
                requester_id: b.clone()
            }]
        );
        assert!(drain(&mut rx_b).is_empty());
        assert!(drain(&mut rx_c).is_empty());

        // The host asking itself is a no-op
        let result = session.handle(&a, TransportEvent::SyncRequest);
        assert_eq!(result, Dispatch::Dropped(DropReason::SelfRequest));
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_sync_state_is_point_to_point() {
        let mut session = Session::new();
        let (a, mut rx_a) = join(&mut session, "a");
        let (b, mut rx_b) = join(&mut session, "b");
        let (c, mut rx_c) = join(&mut session, "c");
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        let reply = TransportEvent::SyncState {
            requester_id: Some(c.clone()),
            time: 42.0,
            is_playing: true,
        };
        assert_eq!(session.handle(&a, reply), Dispatch::Forwarded { to: c });
        assert_eq!(
            drain(&mut rx_c),
            vec![ServerMessage::SyncState {
                time: 42.0,
                is_playing: true
            }]
        );
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());

        // Only the host may answer
        let forged = TransportEvent::SyncState {
            requester_id: Some(a.clone()),
            time: 0.0,
            is_playing: false,
        };
        assert_eq!(session.handle(&b, forged), Dispatch::Dropped(DropReason::NotHost));
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_sync_state_for_departed_requester_is_dropped() {
        let mut session = Session::new();
        let (a, _rx_a) = join(&mut session, "a");
        let (b, _rx_b) = join(&mut session, "b");
        session.disconnect(&b);

        let reply = TransportEvent::SyncState {
            requester_id: Some(b),
            time: 1.0,
            is_playing: false,
        };
        assert_eq!(
            session.handle(&a, reply),
            Dispatch::Dropped(DropReason::RequesterGone)
        );

        let anonymous = TransportEvent::SyncState {
            requester_id: None,
            time: 1.0,
            is_playing: false,
        };
        assert_eq!(
            session.handle(&a, anonymous),
            Dispatch::Dropped(DropReason::MissingRequester)
        );
    }

    #[test]
    fn test_host_failover_promotes_earliest_peer() {
        let mut session = Session::new();
        let (a, _rx_a) = join(&mut session, "a");
        let (b, mut rx_b) = join(&mut session, "b");
        let (c, mut rx_c) = join(&mut session, "c");
        drain(&mut rx_b);
        drain(&mut rx_c);

        let departure = session.disconnect(&a).unwrap();
        assert_eq!(departure.host, HostChange::Promoted(b.clone()));
        assert_eq!(session.current_host(), Some(&b));
        assert_eq!(session.role_of(&b), Some(Role::Host));
        assert_eq!(session.role_of(&c), Some(Role::Viewer));

        assert_eq!(drain(&mut rx_b), vec![role(Some("b"))]);
        assert_eq!(drain(&mut rx_c), vec![role(Some("b"))]);

        // The new host can drive playback
        assert_eq!(
            session.handle(&b, TransportEvent::Play(5.0)),
            Dispatch::Relayed { recipients: 1 }
        );
    }

    #[test]
    fn test_viewer_leaving_keeps_host_without_broadcast() {
        let mut session = Session::new();
        let (a, mut rx_a) = join(&mut session, "a");
        let (b, _rx_b) = join(&mut session, "b");
        drain(&mut rx_a);

        let departure = session.disconnect(&b).unwrap();
        assert_eq!(departure.host, HostChange::Unchanged);
        assert_eq!(session.current_host(), Some(&a));
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_last_peer_leaving_vacates_host() {
        let mut session = Session::new();
        let (a, _rx_a) = join(&mut session, "a");

        let departure = session.disconnect(&a).unwrap();
        assert_eq!(departure.host, HostChange::Vacant);
        assert!(session.current_host().is_none());
        assert!(session.is_empty());

        // The next peer becomes host
        let (d, mut rx_d) = join(&mut session, "d");
        assert_eq!(session.current_host(), Some(&d));
        assert_eq!(drain(&mut rx_d), vec![role(Some("d"))]);
    }

    #[test]
    fn test_duplicate_disconnect_is_noop() {
        let mut session = Session::new();
        let (a, _rx_a) = join(&mut session, "a");
        let (_, mut rx_b) = join(&mut session, "b");
        drain(&mut rx_b);

        assert!(session.disconnect(&a).is_some());
        drain(&mut rx_b);
        assert!(session.disconnect(&a).is_none());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_events_from_unknown_peer_are_dropped() {
        let session = Session::new();
        let ghost = PeerId::from("ghost");
        assert_eq!(
            session.handle(&ghost, TransportEvent::SyncRequest),
            Dispatch::Dropped(DropReason::UnknownPeer)
        );
    }

    #[test]
    fn test_exactly_one_host_at_all_times() {
        let mut session = Session::new();
        let mut inboxes = Vec::new();
        let mut ids = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            let (id, rx) = join(&mut session, name);
            ids.push(id);
            inboxes.push(rx);
        }

        for id in [&ids[2], &ids[0], &ids[4], &ids[1]] {
            session.disconnect(id);
            let hosts = session.peers().iter().filter(|p| p.is_host()).count();
            assert_eq!(hosts, 1);
            let host = session.current_host().unwrap();
            assert_eq!(session.role_of(host), Some(Role::Host));
        }
        assert_eq!(session.current_host(), Some(&ids[3]));
    }

    #[test]
    fn test_closed_outbox_does_not_break_relay() {
        let mut session = Session::new();
        let (a, _rx_a) = join(&mut session, "a");
        let (_, rx_b) = join(&mut session, "b");
        let (_, mut rx_c) = join(&mut session, "c");
        drop(rx_b);
        drain(&mut rx_c);

        assert_eq!(
            session.handle(&a, TransportEvent::Pause(9.0)),
            Dispatch::Relayed { recipients: 2 }
        );
        assert_eq!(drain(&mut rx_c), vec![ServerMessage::Pause(9.0)]);
    }
}
